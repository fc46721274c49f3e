//! # Generation
//!
//! Dispatches a resolved template to its generator. Nothing here writes file
//! contents of its own: module templates render their slot sources, legacy
//! templates call their generator functions and custom templates hand back
//! their stored files.

pub mod assets;
pub mod scaffold;
pub mod theme;

use tracing::warn;

use crate::errors::GenerateError;
use crate::models::{FileMap, SiteConfig};
use crate::templates::module::{self, ENTRY_PAGE};
use crate::templates::render::{Mode, RenderContext, flatten_preview, render_source};
use crate::templates::{CustomTemplate, DEFAULT_TEMPLATE_ID, Resolution, ResolvedTemplate};

/// Entry files tried, in order, when previewing a custom template.
const CUSTOM_ENTRIES: &[&str] = &[ENTRY_PAGE, "index.html"];

/// Single self-contained HTML document for the resolved template.
pub fn preview_html(resolution: &Resolution, site: &SiteConfig) -> Result<String, GenerateError> {
    match &resolution.template {
        ResolvedTemplate::Module(template) => Ok(template.preview(site)),
        ResolvedTemplate::Legacy(template) => Ok((template.html)(site)),
        ResolvedTemplate::Custom(template) => custom_preview(template, site),
    }
}

/// Preview that always produces a page: a failing generator is replaced by
/// the default template.
pub fn preview_or_default(resolution: &Resolution, site: &SiteConfig) -> String {
    match preview_html(resolution, site) {
        Ok(html) => html,
        Err(e) => {
            warn!(template = resolution.id(), error = %e, "Preview failed, using default template");
            default_preview(site)
        }
    }
}

fn default_preview(site: &SiteConfig) -> String {
    match module::find(DEFAULT_TEMPLATE_ID) {
        Some(template) => template.preview(site),
        None => module::MODULE_TEMPLATES[0].preview(site),
    }
}

fn custom_preview(template: &CustomTemplate, site: &SiteConfig) -> Result<String, GenerateError> {
    let entry = CUSTOM_ENTRIES
        .iter()
        .find_map(|path| template.files.get(*path))
        .ok_or_else(|| GenerateError::MissingEntry(template.id.clone()))?;
    let page = render_source(entry, &RenderContext::new(site, Mode::Preview));
    Ok(flatten_preview(&page))
}

/// Full project tree for the resolved template.
pub fn project_files(resolution: &Resolution, site: &SiteConfig) -> FileMap {
    match &resolution.template {
        ResolvedTemplate::Module(template) => template.project(site),
        ResolvedTemplate::Legacy(template) => (template.astro)(site),
        ResolvedTemplate::Custom(template) => template.files.clone(),
    }
}

/// Standalone `apply.html` carrying the lead form.
pub fn apply_html(site: &SiteConfig) -> String {
    module::apply_page(site, Mode::Preview)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::resolve;
    use std::sync::Arc;

    fn test_site() -> SiteConfig {
        SiteConfig {
            brand: "TestBrand".to_string(),
            domain: "testbrand.com".to_string(),
            template_id: Some("classic".to_string()),
            amount_min: 100.0,
            amount_max: 5000.0,
            cta: "Apply Now".to_string(),
            ..SiteConfig::default()
        }
    }

    fn custom(files: &[(&str, &str)]) -> Arc<CustomTemplate> {
        Arc::new(CustomTemplate {
            id: "mine".to_string(),
            db_id: None,
            name: "Mine".to_string(),
            description: String::new(),
            badge: "Custom".to_string(),
            category: "custom".to_string(),
            files: files.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        })
    }

    #[test]
    fn classic_preview_carries_site_values() {
        let site = test_site();
        let resolution = resolve(site.template_id.as_deref(), &[]);
        let html = preview_html(&resolution, &site).unwrap();
        for needle in ["TestBrand", "testbrand.com", "100", "5000", "Apply Now"] {
            assert!(html.contains(needle), "missing {needle}");
        }
    }

    #[test]
    fn every_builtin_previews_and_projects() {
        let site = test_site();
        for info in crate::templates::builtin_templates() {
            let resolution = resolve(Some(&info.id), &[]);
            let html = preview_html(&resolution, &site).unwrap();
            assert!(html.contains("TestBrand"), "{}", info.id);
            let files = project_files(&resolution, &site);
            assert!(files.contains_key("package.json"), "{}", info.id);
            assert!(files.contains_key(ENTRY_PAGE), "{}", info.id);
        }
    }

    #[test]
    fn custom_template_renders_its_entry_page() {
        let template = custom(&[("src/pages/index.astro", "---\nconst x = 1;\n---\n<h1>{{brand}}</h1>")]);
        let resolution = resolve(Some("mine"), &[template.clone()]);

        let html = preview_html(&resolution, &test_site()).unwrap();
        assert_eq!(html.trim(), "<h1>TestBrand</h1>");
        assert_eq!(project_files(&resolution, &test_site()), template.files);
    }

    #[test]
    fn custom_template_without_entry_falls_back() {
        let template = custom(&[("README.md", "hi")]);
        let resolution = resolve(Some("mine"), &[template]);

        let err = preview_html(&resolution, &test_site()).unwrap_err();
        assert!(matches!(err, GenerateError::MissingEntry(id) if id == "mine"));

        let html = preview_or_default(&resolution, &test_site());
        assert!(html.contains("TestBrand"));
    }

    #[test]
    fn apply_html_embeds_lead_form() {
        let html = apply_html(&test_site());
        assert!(html.contains("14881"));
        assert!(!html.contains("{{"));
    }
}
