//! Built-in templates written in the slot language. Each one is an entry
//! page; the project scaffold and apply page are shared.

use super::render::{Mode, RenderContext, flatten_preview, render_source};
use super::{TemplateInfo, TemplateSource};
use crate::generate::scaffold::scaffold;
use crate::models::{FileMap, SiteConfig};

pub const ENTRY_PAGE: &str = "src/pages/index.astro";
pub const APPLY_PAGE: &str = "src/pages/apply.astro";

const APPLY_SOURCE: &str = include_str!("../../templates/apply.astro");

#[derive(Debug)]
pub struct ModuleTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub badge: &'static str,
    pub category: &'static str,
    pub entry: &'static str,
}

pub static MODULE_TEMPLATES: &[ModuleTemplate] = &[
    ModuleTemplate {
        id: "classic",
        name: "Classic LP",
        description: "Current production LP flow (HTML + Astro generator)",
        badge: "Stable",
        category: "general",
        entry: include_str!("../../templates/classic/index.astro"),
    },
    ModuleTemplate {
        id: "pdl-loans-v1",
        name: "PDL Loans V1",
        description: "Payday/PDL loan template with hero form, trust badges, calculator, FAQ",
        badge: "Popular",
        category: "pdl",
        entry: include_str!("../../templates/pdl-loans-v1/index.astro"),
    },
    ModuleTemplate {
        id: "pdl-loans-v3",
        name: "PDL Loans V3",
        description: "Enhanced PDL template with modern design, dark mode, and improved UX",
        badge: "New",
        category: "pdl",
        entry: include_str!("../../templates/pdl-loans-v3/index.astro"),
    },
    ModuleTemplate {
        id: "simple-lp",
        name: "Simple LP",
        description: "Minimal landing page with full tracking support",
        badge: "Simple",
        category: "general",
        entry: include_str!("../../templates/simple-lp/index.astro"),
    },
];

pub fn find(id: &str) -> Option<&'static ModuleTemplate> {
    MODULE_TEMPLATES.iter().find(|t| t.id == id)
}

impl ModuleTemplate {
    pub fn info(&self) -> TemplateInfo {
        TemplateInfo {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            badge: self.badge.to_string(),
            category: self.category.to_string(),
            source: TemplateSource::Module,
        }
    }

    /// Entry page as a self-contained HTML document.
    pub fn preview(&self, site: &SiteConfig) -> String {
        let page = render_source(self.entry, &RenderContext::new(site, Mode::Preview));
        flatten_preview(&page)
    }

    /// Complete Astro project.
    pub fn project(&self, site: &SiteConfig) -> FileMap {
        let ctx = RenderContext::new(site, Mode::Astro);
        let mut files = scaffold(site, self.name);
        files.insert(ENTRY_PAGE.to_string(), render_source(self.entry, &ctx));
        files.insert(APPLY_PAGE.to_string(), render_source(APPLY_SOURCE, &ctx));
        files
    }
}

/// Apply page carrying the lead form.
pub fn apply_page(site: &SiteConfig, mode: Mode) -> String {
    let page = render_source(APPLY_SOURCE, &RenderContext::new(site, mode));
    match mode {
        Mode::Preview => flatten_preview(&page),
        Mode::Astro => page,
    }
}
