//! # Templates
//!
//! A template turns a [`SiteConfig`](crate::models::SiteConfig) into files.
//! Three sources exist:
//!
//! * **module**: built-in pages written in the slot language ([`slots`]),
//!   rendered by [`render`].
//! * **legacy**: older templates with hand-written generator functions.
//! * **api**: custom templates stored by the app's API, fetched and cached by
//!   [`catalog::TemplateCatalog`].
//!
//! ## Resolution
//!
//! [`resolve`] maps a site's `templateId` to one of those in a fixed order:
//! alias table, module ids, legacy ids, cached custom templates, then the
//! default (`classic`). It never fails. When the default is used in place of
//! what was asked for, the [`Resolution`] says so through
//! [`Resolution::fallback`].

pub mod catalog;
pub mod legacy;
mod markup;
pub mod module;
pub mod render;
pub mod slots;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::FileMap;
use legacy::LegacyTemplate;
use module::ModuleTemplate;

pub const DEFAULT_TEMPLATE_ID: &str = "classic";

/// Renamed template ids: old id -> current id.
pub const ALIASES: &[(&str, &str)] = &[("pdl-loansv1", "pdl-loans-v1")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateSource {
    Module,
    Legacy,
    Api,
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TemplateSource::Module => "module",
            TemplateSource::Legacy => "legacy",
            TemplateSource::Api => "api",
        })
    }
}

/// Catalog entry as listed to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub badge: String,
    pub category: String,
    pub source: TemplateSource,
}

/// Template stored through the API: a fixed file map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTemplate {
    pub id: String,
    /// Row id in the API's table
    pub db_id: Option<i64>,
    pub name: String,
    pub description: String,
    pub badge: String,
    pub category: String,
    pub files: FileMap,
}

impl CustomTemplate {
    pub fn info(&self) -> TemplateInfo {
        TemplateInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            badge: self.badge.clone(),
            category: self.category.clone(),
            source: TemplateSource::Api,
        }
    }
}

/// Generation strategy picked for a site.
#[derive(Debug, Clone)]
pub enum ResolvedTemplate {
    Module(&'static ModuleTemplate),
    Legacy(&'static LegacyTemplate),
    Custom(Arc<CustomTemplate>),
}

impl ResolvedTemplate {
    pub fn id(&self) -> &str {
        match self {
            ResolvedTemplate::Module(t) => t.id,
            ResolvedTemplate::Legacy(t) => t.id,
            ResolvedTemplate::Custom(t) => &t.id,
        }
    }

    pub fn source(&self) -> TemplateSource {
        match self {
            ResolvedTemplate::Module(_) => TemplateSource::Module,
            ResolvedTemplate::Legacy(_) => TemplateSource::Legacy,
            ResolvedTemplate::Custom(_) => TemplateSource::Api,
        }
    }

    pub fn info(&self) -> TemplateInfo {
        match self {
            ResolvedTemplate::Module(t) => t.info(),
            ResolvedTemplate::Legacy(t) => t.info(),
            ResolvedTemplate::Custom(t) => t.info(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No template id on the site
    Unset,
    /// Id matched nothing in the catalog
    Unknown,
}

/// Why the default template stands in for the requested one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub requested: Option<String>,
    pub reason: FallbackReason,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub template: ResolvedTemplate,
    pub fallback: Option<Fallback>,
}

impl Resolution {
    pub fn id(&self) -> &str {
        self.template.id()
    }

    /// Logs an unknown template id. An unset id is expected and stays quiet.
    pub fn warn_on_fallback(&self) {
        if let Some(Fallback {
            requested: Some(requested),
            reason: FallbackReason::Unknown,
        }) = &self.fallback
        {
            warn!(requested = %requested, using = self.id(), "Unknown template id, using default");
        }
    }
}

/// Applies the alias table.
pub fn canonical_id(id: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == id)
        .map_or(id, |(_, canonical)| canonical)
}

/// Module or legacy template for an id, after aliasing.
pub fn builtin(id: &str) -> Option<ResolvedTemplate> {
    let id = canonical_id(id);
    module::find(id)
        .map(ResolvedTemplate::Module)
        .or_else(|| legacy::find(id).map(ResolvedTemplate::Legacy))
}

/// Every built-in template, module ones first.
pub fn builtin_templates() -> Vec<TemplateInfo> {
    module::MODULE_TEMPLATES
        .iter()
        .map(ModuleTemplate::info)
        .chain(legacy::LEGACY_TEMPLATES.iter().map(LegacyTemplate::info))
        .collect()
}

fn default_template() -> ResolvedTemplate {
    match module::find(DEFAULT_TEMPLATE_ID) {
        Some(template) => ResolvedTemplate::Module(template),
        None => ResolvedTemplate::Module(&module::MODULE_TEMPLATES[0]),
    }
}

/// Maps a template id to a generation strategy. Total: any input, including
/// `None` and garbage, yields a template.
pub fn resolve(template_id: Option<&str>, custom: &[Arc<CustomTemplate>]) -> Resolution {
    let requested = template_id.map(str::trim).filter(|id| !id.is_empty());

    let Some(requested) = requested else {
        return Resolution {
            template: default_template(),
            fallback: Some(Fallback {
                requested: None,
                reason: FallbackReason::Unset,
            }),
        };
    };

    if let Some(template) = builtin(requested) {
        return Resolution {
            template,
            fallback: None,
        };
    }

    let id = canonical_id(requested);
    if let Some(template) = custom.iter().find(|t| t.id == id) {
        return Resolution {
            template: ResolvedTemplate::Custom(Arc::clone(template)),
            fallback: None,
        };
    }

    Resolution {
        template: default_template(),
        fallback: Some(Fallback {
            requested: Some(requested.to_string()),
            reason: FallbackReason::Unknown,
        }),
    }
}
