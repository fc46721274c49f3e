//! Netlify: create (or find) a site by slug, then deploy a ZIP of the files.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use tracing::info;

use super::{failure_message, json_body, short_project_name, str_at};
use crate::archive;
use crate::dispatcher::{DeployContent, DeployStatus, DeployTarget, Deployed, StatusReport};
use crate::errors::DeployError;
use crate::models::{Settings, SiteConfig};
use crate::traits::Deployer;

pub fn deploy_state(state: &str) -> DeployStatus {
    match state {
        "ready" => DeployStatus::Live,
        "building" | "uploading" | "processing" | "preparing" => DeployStatus::Building,
        "new" | "enqueued" | "uploaded" | "prepared" => DeployStatus::Pending,
        "error" | "rejected" => DeployStatus::Failed,
        _ => DeployStatus::Unknown,
    }
}

pub struct Netlify {
    client: Client,
    base: String,
}

impl Netlify {
    pub fn new(client: Client, base: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn token(settings: &Settings) -> Result<&str, DeployError> {
        match Settings::secret(&settings.netlify_token) {
            "" => Err(DeployError::NotConfigured(
                "Missing Netlify token. Configure in Settings.".to_string(),
            )),
            token => Ok(token),
        }
    }

    async fn find_site(&self, token: &str, name: &str) -> Result<Option<Value>, DeployError> {
        let response = self
            .client
            .get(format!("{}/sites", self.base))
            .query(&[("name", name), ("per_page", "1")])
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeployError::api("Find site", failure_message(response).await));
        }
        let sites = json_body(response).await;
        Ok(sites.as_array().and_then(|s| s.first()).cloned())
    }

    async fn create_or_find_site(&self, token: &str, name: &str) -> Result<Value, DeployError> {
        let created = self
            .client
            .post(format!("{}/sites", self.base))
            .bearer_auth(token)
            .json(&json!({ "name": name }))
            .send()
            .await?;
        if created.status().is_success() {
            info!("Created Netlify site {}", name);
            return Ok(json_body(created).await);
        }

        self.find_site(token, name)
            .await?
            .ok_or_else(|| DeployError::api("Create site", "Failed to create or find Netlify site"))
    }
}

#[async_trait]
impl Deployer for Netlify {
    fn target(&self) -> DeployTarget {
        DeployTarget::Netlify
    }

    async fn deploy(
        &self,
        content: &DeployContent,
        site: &SiteConfig,
        settings: &Settings,
    ) -> Result<Deployed, DeployError> {
        let token = Self::token(settings)?;
        let name = short_project_name(site);

        let netlify_site = self.create_or_find_site(token, &name).await?;
        let site_id = str_at(&netlify_site, "/id")
            .ok_or_else(|| DeployError::api("Create site", "Netlify returned a site without an id"))?;

        let zip = archive::zip_files(&content.files())?;
        let response = self
            .client
            .post(format!("{}/sites/{site_id}/deploys", self.base))
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/zip")
            .body(zip)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeployError::api("Deploy", failure_message(response).await));
        }
        let deploy = json_body(response).await;

        let url = str_at(&netlify_site, "/ssl_url")
            .or_else(|| str_at(&netlify_site, "/url"))
            .map_or_else(
                || {
                    let site_name = str_at(&netlify_site, "/name").unwrap_or(&name);
                    format!("https://{site_name}.netlify.app")
                },
                str::to_string,
            );
        Ok(Deployed::live(url, str_at(&deploy, "/id").map(str::to_string)))
    }

    async fn check_status(&self, site: &SiteConfig, settings: &Settings) -> Result<StatusReport, DeployError> {
        let token = Self::token(settings)?;
        let Some(netlify_site) = self.find_site(token, &short_project_name(site)).await? else {
            return Ok(StatusReport::new(DeployTarget::Netlify, DeployStatus::NoDeploys));
        };
        let site_id = str_at(&netlify_site, "/id").unwrap_or_default();

        let response = self
            .client
            .get(format!("{}/sites/{site_id}/deploys", self.base))
            .query(&[("per_page", "1")])
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeployError::api("Status", failure_message(response).await));
        }
        let deploys = json_body(response).await;
        let Some(latest) = deploys.get(0) else {
            return Ok(StatusReport::new(DeployTarget::Netlify, DeployStatus::NoDeploys));
        };

        Ok(StatusReport {
            url: str_at(latest, "/ssl_url")
                .or_else(|| str_at(latest, "/deploy_ssl_url"))
                .map(str::to_string),
            deploy_id: str_at(latest, "/id").map(str::to_string),
            created_at: str_at(latest, "/created_at").map(str::to_string),
            ..StatusReport::new(
                DeployTarget::Netlify,
                str_at(latest, "/state").map_or(DeployStatus::Unknown, deploy_state),
            )
        })
    }

    async fn teardown(&self, site: &SiteConfig, settings: &Settings) -> Result<(), DeployError> {
        let token = Self::token(settings)?;
        let Some(netlify_site) = self.find_site(token, &short_project_name(site)).await? else {
            return Ok(());
        };
        let site_id = str_at(&netlify_site, "/id").unwrap_or_default();

        let response = self
            .client
            .delete(format!("{}/sites/{site_id}", self.base))
            .bearer_auth(token)
            .send()
            .await?;
        if response.status().is_success() || response.status().as_u16() == 404 {
            Ok(())
        } else {
            Err(DeployError::api("Delete site", failure_message(response).await))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployers::mock;
    use axum::body::Bytes;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{delete, post};
    use axum::{Json, Router};
    use std::collections::HashMap;

    fn settings() -> Settings {
        Settings {
            netlify_token: "nf".to_string(),
            ..Settings::default()
        }
    }

    fn site() -> SiteConfig {
        SiteConfig {
            id: "a1b2c3".to_string(),
            domain: "testbrand.com".to_string(),
            ..SiteConfig::default()
        }
    }

    fn existing_site_app() -> Router {
        Router::new()
            .route(
                "/sites",
                post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"errors": "name taken"}))) }).get(
                    |Query(q): Query<HashMap<String, String>>| async move {
                        assert_eq!(q["name"], "testbrand-com-a1b2");
                        Json(json!([{"id": "site-9", "name": "testbrand-com-a1b2", "ssl_url": "https://testbrand-com-a1b2.netlify.app"}]))
                    },
                ),
            )
            .route(
                "/sites/site-9/deploys",
                post(|headers: HeaderMap, body: Bytes| async move {
                    assert_eq!(headers["content-type"], "application/zip");
                    assert_eq!(&body[..4], &[0x50, 0x4b, 0x03, 0x04]);
                    Json(json!({"id": "deploy-1", "state": "uploaded"}))
                })
                .get(|| async { Json(json!([{"id": "deploy-1", "state": "ready", "ssl_url": "https://x.netlify.app"}])) }),
            )
            .route("/sites/site-9", delete(|| async { StatusCode::NO_CONTENT }))
    }

    #[tokio::test]
    async fn falls_back_to_existing_site_and_uploads_zip() {
        let base = mock::serve(existing_site_app()).await;
        let netlify = Netlify::new(mock::client(), &base);

        let deployed = netlify
            .deploy(&DeployContent::Html("<h1>hi</h1>".to_string()), &site(), &settings())
            .await
            .unwrap();
        assert_eq!(deployed.url, "https://testbrand-com-a1b2.netlify.app");
        assert_eq!(deployed.deploy_id.as_deref(), Some("deploy-1"));

        let report = netlify.check_status(&site(), &settings()).await.unwrap();
        assert_eq!(report.status, DeployStatus::Live);

        netlify.teardown(&site(), &settings()).await.unwrap();
    }

    #[tokio::test]
    async fn missing_site_is_an_error() {
        let app = Router::new().route(
            "/sites",
            post(|| async { StatusCode::UNAUTHORIZED }).get(|| async { Json(json!([])) }),
        );
        let base = mock::serve(app).await;
        let err = Netlify::new(mock::client(), &base)
            .deploy(&DeployContent::Html(String::new()), &site(), &settings())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Create site failed: Failed to create or find Netlify site");
    }

    #[test]
    fn state_mapping() {
        assert_eq!(deploy_state("ready"), DeployStatus::Live);
        assert_eq!(deploy_state("processing"), DeployStatus::Building);
        assert_eq!(deploy_state("enqueued"), DeployStatus::Pending);
        assert_eq!(deploy_state("error"), DeployStatus::Failed);
    }
}
