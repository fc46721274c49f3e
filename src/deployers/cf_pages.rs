//! Cloudflare Pages direct upload.
//!
//! 1. ensure the project exists
//! 2. get an upload JWT
//! 3. ask which file hashes are missing
//! 4. upload the missing files (base64)
//! 5. register every hash
//! 6. create a deployment from the path -> hash manifest
//!
//! Files are keyed by their MD5 hex digest.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use reqwest::Client;
use reqwest::multipart::Form;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{cloudflare_credentials, failure_message, json_body, str_at};
use crate::dispatcher::{DeployContent, DeployStatus, DeployTarget, Deployed, StatusReport};
use crate::errors::DeployError;
use crate::models::{Settings, SiteConfig};
use crate::traits::Deployer;

pub struct CfPages {
    client: Client,
    base: String,
}

/// `lp-{slug}-{id}` project name.
pub fn project_name(site: &SiteConfig) -> String {
    format!("lp-{}-{}", site.compact_slug(40), site.short_id(6))
}

fn content_type(path: &str) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

/// Maps a deployment's latest stage to a status.
pub fn stage_status(stage_status: &str) -> DeployStatus {
    match stage_status {
        "success" => DeployStatus::Live,
        "active" => DeployStatus::Building,
        "idle" => DeployStatus::Pending,
        "failure" | "canceled" => DeployStatus::Failed,
        _ => DeployStatus::Unknown,
    }
}

impl CfPages {
    pub fn new(client: Client, base: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn projects_url(&self, account: &str) -> String {
        format!("{}/accounts/{account}/pages/projects", self.base)
    }

    async fn ensure_project(&self, token: &str, projects: &str, name: &str) -> Result<(), DeployError> {
        let existing = self
            .client
            .get(format!("{projects}/{name}"))
            .bearer_auth(token)
            .send()
            .await?;
        if existing.status().is_success() {
            return Ok(());
        }

        info!("Creating Pages project {}", name);
        let created = self
            .client
            .post(projects)
            .bearer_auth(token)
            .json(&json!({ "name": name, "production_branch": "main" }))
            .send()
            .await?;
        let status = created.status();
        if status.is_success() || status.as_u16() == 409 {
            Ok(())
        } else {
            Err(DeployError::api("Create project", failure_message(created).await))
        }
    }

    async fn assets_call(&self, jwt: &str, path: &str, body: &Value) -> Result<reqwest::Response, DeployError> {
        Ok(self
            .client
            .post(format!("{}/pages/assets/{path}", self.base))
            .bearer_auth(jwt)
            .json(body)
            .send()
            .await?)
    }
}

#[async_trait]
impl Deployer for CfPages {
    fn target(&self) -> DeployTarget {
        DeployTarget::CfPages
    }

    async fn deploy(
        &self,
        content: &DeployContent,
        site: &SiteConfig,
        settings: &Settings,
    ) -> Result<Deployed, DeployError> {
        let (token, account) = cloudflare_credentials(settings)?;
        let name = project_name(site);
        let projects = self.projects_url(account);

        self.ensure_project(token, &projects, &name).await?;

        let files = content.files();
        let hashes: BTreeMap<&str, String> = files
            .iter()
            .map(|(path, body)| (path.as_str(), format!("{:x}", md5::compute(body.as_bytes()))))
            .collect();
        let all_hashes: Vec<&String> = hashes.values().collect();

        let response = self
            .client
            .get(format!("{projects}/{name}/upload-token"))
            .bearer_auth(token)
            .send()
            .await?;
        let status = response.status();
        let body = json_body(response).await;
        let jwt = match str_at(&body, "/result/jwt") {
            Some(jwt) if status.is_success() => jwt.to_string(),
            _ => {
                let message = str_at(&body, "/errors/0/message")
                    .map_or_else(|| status.as_u16().to_string(), str::to_string);
                return Err(DeployError::api("Upload token", message));
            }
        };

        let missing = json_body(
            self.assets_call(&jwt, "check-missing", &json!({ "hashes": all_hashes }))
                .await?,
        )
        .await;
        let missing: Vec<&str> = missing
            .get("result")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        debug!("{} of {} files need uploading", missing.len(), hashes.len());

        if !missing.is_empty() {
            let payload: Vec<Value> = hashes
                .iter()
                .filter(|(_, hash)| missing.contains(&hash.as_str()))
                .map(|(path, hash)| {
                    json!({
                        "key": hash,
                        "value": STANDARD.encode(files[*path].as_bytes()),
                        "metadata": { "contentType": content_type(path) },
                        "base64": true,
                    })
                })
                .collect();
            let uploaded = self.assets_call(&jwt, "upload", &Value::Array(payload)).await?;
            if !uploaded.status().is_success() {
                return Err(DeployError::api("File upload", failure_message(uploaded).await));
            }
        }

        let upsert = self
            .assets_call(&jwt, "upsert-hashes", &json!({ "hashes": all_hashes }))
            .await?;
        if !upsert.status().is_success() {
            warn!("Pages upsert-hashes returned {}", upsert.status());
        }

        let manifest: BTreeMap<String, &String> =
            hashes.iter().map(|(path, hash)| (format!("/{path}"), hash)).collect();
        let manifest = serde_json::to_string(&manifest).map_err(|e| DeployError::Content(e.to_string()))?;
        let form = Form::new()
            .text("manifest", manifest)
            .text("branch", "main")
            .text(
                "commit_message",
                format!("Deploy {} - {}", site.display_name(), Utc::now().to_rfc3339()),
            );

        let response = self
            .client
            .post(format!("{projects}/{name}/deployments"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeployError::api("Deploy", failure_message(response).await));
        }

        let body = json_body(response).await;
        let url = str_at(&body, "/result/url")
            .map_or_else(|| format!("https://{name}.pages.dev"), str::to_string);
        Ok(Deployed::live(url, str_at(&body, "/result/id").map(str::to_string)))
    }

    async fn check_status(&self, site: &SiteConfig, settings: &Settings) -> Result<StatusReport, DeployError> {
        let (token, account) = cloudflare_credentials(settings)?;
        let name = project_name(site);
        let response = self
            .client
            .get(format!("{}/{name}/deployments?per_page=1", self.projects_url(account)))
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeployError::api("Status", failure_message(response).await));
        }

        let body = json_body(response).await;
        let Some(latest) = body.pointer("/result/0") else {
            return Ok(StatusReport::new(DeployTarget::CfPages, DeployStatus::NoDeploys));
        };
        let status = str_at(latest, "/latest_stage/status").map_or(DeployStatus::Unknown, stage_status);
        Ok(StatusReport {
            url: str_at(latest, "/url").map(str::to_string),
            deploy_id: str_at(latest, "/id").map(str::to_string),
            created_at: str_at(latest, "/created_on").map(str::to_string),
            ..StatusReport::new(DeployTarget::CfPages, status)
        })
    }

    async fn teardown(&self, site: &SiteConfig, settings: &Settings) -> Result<(), DeployError> {
        let (token, account) = cloudflare_credentials(settings)?;
        let name = project_name(site);
        let response = self
            .client
            .delete(format!("{}/{name}", self.projects_url(account)))
            .bearer_auth(token)
            .send()
            .await?;
        if response.status().is_success() || response.status().as_u16() == 404 {
            Ok(())
        } else {
            Err(DeployError::api("Delete project", failure_message(response).await))
        }
    }
}
