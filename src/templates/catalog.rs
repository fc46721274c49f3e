//! Custom templates stored through the app's API, cached per application
//! context.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{CustomTemplate, Resolution, TemplateInfo, builtin, builtin_templates, resolve};
use crate::api::ApiClient;
use crate::errors::ApiError;
use crate::models::{FileMap, non_empty};

/// Row shape of `GET /templates`.
#[derive(Debug, Deserialize)]
struct TemplateRow {
    template_id: Option<String>,
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    badge: Option<String>,
    #[serde(default)]
    category: Option<String>,
    /// File map serialised as a JSON string
    #[serde(default)]
    files: Option<String>,
}

impl TemplateRow {
    fn into_template(self) -> Option<CustomTemplate> {
        let db_id = self.id.as_ref().and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });
        let id = self
            .template_id
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.id.as_ref().and_then(|v| v.as_str().map(str::to_string)))?;

        let files = match self.files.as_deref().and_then(non_empty) {
            Some(raw) => match serde_json::from_str::<FileMap>(raw) {
                Ok(files) => files,
                Err(e) => {
                    warn!(template = %id, error = %e, "Custom template has unreadable files");
                    FileMap::new()
                }
            },
            None => FileMap::new(),
        };

        Some(CustomTemplate {
            name: self.name.unwrap_or_else(|| id.clone()),
            description: self.description.unwrap_or_default(),
            badge: self.badge.filter(|b| !b.is_empty()).unwrap_or_else(|| "Custom".to_string()),
            category: self.category.filter(|c| !c.is_empty()).unwrap_or_else(|| "custom".to_string()),
            id,
            db_id,
            files,
        })
    }
}

/// Body of `POST /templates`.
#[derive(Debug, Clone, Serialize)]
pub struct NewTemplate {
    pub template_id: String,
    pub name: String,
    pub description: String,
    pub badge: String,
    pub category: String,
    /// File map serialised as a JSON string
    pub files: String,
}

impl NewTemplate {
    pub fn new(template_id: &str, name: &str, files: &FileMap) -> Self {
        Self {
            template_id: template_id.to_string(),
            name: name.to_string(),
            description: String::new(),
            badge: "Custom".to_string(),
            category: "custom".to_string(),
            files: serde_json::to_string(files).unwrap_or_else(|_| "{}".to_string()),
        }
    }
}

pub struct TemplateCatalog {
    api: ApiClient,
    cache: RwLock<Option<Vec<Arc<CustomTemplate>>>>,
}

impl TemplateCatalog {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            cache: RwLock::new(None),
        }
    }

    /// Cached custom templates, fetched on first use. A failed fetch logs and
    /// yields an empty list without populating the cache.
    pub async fn custom(&self) -> Vec<Arc<CustomTemplate>> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return cached.clone();
        }
        match self.fetch().await {
            Ok(templates) => {
                *self.cache.write().await = Some(templates.clone());
                templates
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch custom templates");
                Vec::new()
            }
        }
    }

    /// Refetches regardless of the cache.
    pub async fn refresh(&self) -> Result<Vec<Arc<CustomTemplate>>, ApiError> {
        let templates = self.fetch().await?;
        *self.cache.write().await = Some(templates.clone());
        Ok(templates)
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn fetch(&self) -> Result<Vec<Arc<CustomTemplate>>, ApiError> {
        let rows: Vec<TemplateRow> = self.api.get("/templates").await?;
        let templates: Vec<_> = rows
            .into_iter()
            .filter_map(TemplateRow::into_template)
            .map(Arc::new)
            .collect();
        info!("Loaded {} custom templates", templates.len());
        Ok(templates)
    }

    /// Built-in templates followed by the custom ones.
    pub async fn all(&self) -> Vec<TemplateInfo> {
        let mut all = builtin_templates();
        all.extend(self.custom().await.iter().map(|t| t.info()));
        all
    }

    /// Resolves a template id, only touching the API when the id is not a
    /// built-in one.
    pub async fn resolve(&self, template_id: Option<&str>) -> Resolution {
        let wanted = template_id.map(str::trim).filter(|id| !id.is_empty());
        match wanted {
            Some(id) if builtin(id).is_none() => resolve(Some(id), &self.custom().await),
            _ => resolve(wanted, &[]),
        }
    }

    pub async fn save(&self, template: &NewTemplate) -> Result<Value, ApiError> {
        let result = self.api.post("/templates", template).await;
        self.invalidate().await;
        result
    }

    pub async fn delete(&self, template_id: &str) -> Result<Value, ApiError> {
        let path = format!("/templates/{}", urlencoding::encode(template_id));
        let result = self.api.delete(&path).await;
        self.invalidate().await;
        result
    }
}
