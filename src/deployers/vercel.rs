//! Vercel: inline-files deployment, then an optional custom domain link.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::warn;

use super::{failure_message, json_body, short_project_name, str_at};
use crate::dispatcher::{DeployContent, DeployStatus, DeployTarget, Deployed, StatusReport};
use crate::errors::DeployError;
use crate::models::{Settings, SiteConfig, non_empty};
use crate::traits::Deployer;

pub fn deployment_state(state: &str) -> DeployStatus {
    match state {
        "READY" => DeployStatus::Live,
        "BUILDING" | "INITIALIZING" => DeployStatus::Building,
        "QUEUED" => DeployStatus::Pending,
        "ERROR" | "CANCELED" => DeployStatus::Failed,
        _ => DeployStatus::Unknown,
    }
}

pub struct Vercel {
    client: Client,
    base: String,
}

impl Vercel {
    pub fn new(client: Client, base: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn token(settings: &Settings) -> Result<&str, DeployError> {
        match Settings::secret(&settings.vercel_token) {
            "" => Err(DeployError::NotConfigured(
                "Missing Vercel token. Configure in Settings.".to_string(),
            )),
            token => Ok(token),
        }
    }

    fn team(settings: &Settings) -> Vec<(&'static str, String)> {
        non_empty(&settings.vercel_team_id)
            .map(|team| vec![("teamId", team.to_string())])
            .unwrap_or_default()
    }

    async fn link_domain(&self, token: &str, project: &str, domain: &str, settings: &Settings) {
        let linked = self
            .client
            .post(format!("{}/v9/projects/{project}/domains", self.base))
            .query(&Self::team(settings))
            .bearer_auth(token)
            .json(&json!({ "name": domain }))
            .send()
            .await;
        match linked {
            Ok(response) if !response.status().is_success() => {
                warn!("Failed to link {} to Vercel project: {}", domain, response.status());
            }
            Err(e) => warn!("Failed to link {} to Vercel project: {}", domain, e),
            Ok(_) => {}
        }
    }
}

#[async_trait]
impl Deployer for Vercel {
    fn target(&self) -> DeployTarget {
        DeployTarget::Vercel
    }

    async fn deploy(
        &self,
        content: &DeployContent,
        site: &SiteConfig,
        settings: &Settings,
    ) -> Result<Deployed, DeployError> {
        let token = Self::token(settings)?;
        let name = short_project_name(site);

        let files: Vec<Value> = content
            .files()
            .into_iter()
            .map(|(file, data)| json!({ "file": file, "data": data, "encoding": "utf-8" }))
            .collect();

        let mut query = vec![("skipAutoDetectionConfirmation", "1".to_string())];
        query.extend(Self::team(settings));

        let response = self
            .client
            .post(format!("{}/v13/deployments", self.base))
            .query(&query)
            .bearer_auth(token)
            .json(&json!({ "name": name, "files": files, "target": "production" }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeployError::api("Vercel API", failure_message(response).await));
        }
        let body = json_body(response).await;

        let domain = non_empty(&site.domain);
        if let Some(domain) = domain {
            self.link_domain(token, &name, domain, settings).await;
        }

        let url = match (domain, str_at(&body, "/url")) {
            (Some(domain), _) => format!("https://{domain}"),
            (None, Some(url)) => format!("https://{url}"),
            (None, None) => format!("https://{name}.vercel.app"),
        };
        Ok(Deployed::live(url, str_at(&body, "/id").map(str::to_string)))
    }

    async fn check_status(&self, site: &SiteConfig, settings: &Settings) -> Result<StatusReport, DeployError> {
        let token = Self::token(settings)?;
        let mut query = Self::team(settings);
        query.push(("projectId", short_project_name(site)));
        query.push(("limit", "1".to_string()));

        let response = self
            .client
            .get(format!("{}/v13/deployments", self.base))
            .query(&query)
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeployError::api("Vercel API", response.status().as_u16().to_string()));
        }
        let body = json_body(response).await;
        let Some(latest) = body.pointer("/deployments/0") else {
            return Ok(StatusReport::new(DeployTarget::Vercel, DeployStatus::NoDeploys));
        };

        let created_at = latest
            .get("createdAt")
            .and_then(Value::as_i64)
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|t| t.to_rfc3339());
        Ok(StatusReport {
            url: str_at(latest, "/url").map(|u| format!("https://{u}")),
            deploy_id: str_at(latest, "/uid").map(str::to_string),
            created_at,
            ..StatusReport::new(
                DeployTarget::Vercel,
                str_at(latest, "/state").map_or(DeployStatus::Unknown, deployment_state),
            )
        })
    }

    async fn teardown(&self, site: &SiteConfig, settings: &Settings) -> Result<(), DeployError> {
        let token = Self::token(settings)?;
        let response = self
            .client
            .delete(format!("{}/v9/projects/{}", self.base, short_project_name(site)))
            .query(&Self::team(settings))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployers::mock;
    use axum::extract::Query;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn settings() -> Settings {
        Settings {
            vercel_token: "vt".to_string(),
            vercel_team_id: "team_1".to_string(),
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn deploys_inline_files_and_links_domain() {
        let linked = Arc::new(Mutex::new(None::<String>));
        let seen = linked.clone();
        let app = Router::new()
            .route(
                "/v13/deployments",
                post(|Query(q): Query<HashMap<String, String>>, Json(body): Json<Value>| async move {
                    assert_eq!(q["teamId"], "team_1");
                    assert_eq!(q["skipAutoDetectionConfirmation"], "1");
                    assert_eq!(body["name"], "testbrand-com-abcd");
                    assert_eq!(body["files"][0]["file"], "index.html");
                    assert_eq!(body["files"][0]["encoding"], "utf-8");
                    Json(json!({"id": "dpl_1", "url": "testbrand-com-abcd.vercel.app"}))
                }),
            )
            .route(
                "/v9/projects/testbrand-com-abcd/domains",
                post(move |Json(body): Json<Value>| async move {
                    *seen.lock().unwrap() = body["name"].as_str().map(str::to_string);
                    Json(json!({}))
                }),
            );
        let base = mock::serve(app).await;
        let site = SiteConfig {
            id: "abcdef".to_string(),
            domain: "testbrand.com".to_string(),
            ..SiteConfig::default()
        };

        let deployed = Vercel::new(mock::client(), &base)
            .deploy(&DeployContent::Html("<h1>x</h1>".to_string()), &site, &settings())
            .await
            .unwrap();
        assert_eq!(deployed.url, "https://testbrand.com");
        assert_eq!(deployed.deploy_id.as_deref(), Some("dpl_1"));
        assert_eq!(linked.lock().unwrap().as_deref(), Some("testbrand.com"));
    }

    #[tokio::test]
    async fn status_maps_latest_deployment() {
        let app = Router::new().route(
            "/v13/deployments",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q["projectId"], "lp-x");
                Json(json!({"deployments": [{"uid": "dpl_2", "state": "BUILDING", "url": "p.vercel.app", "createdAt": 1735787045000i64}]}))
            }),
        );
        let base = mock::serve(app).await;
        let report = Vercel::new(mock::client(), &base)
            .check_status(&SiteConfig::default(), &settings())
            .await
            .unwrap();
        assert_eq!(report.status, DeployStatus::Building);
        assert_eq!(report.url.as_deref(), Some("https://p.vercel.app"));
        assert_eq!(report.created_at.as_deref(), Some("2025-01-02T03:04:05+00:00"));
    }

    #[test]
    fn state_mapping() {
        assert_eq!(deployment_state("READY"), DeployStatus::Live);
        assert_eq!(deployment_state("QUEUED"), DeployStatus::Pending);
        assert_eq!(deployment_state("CANCELED"), DeployStatus::Failed);
        assert_eq!(deployment_state("???"), DeployStatus::Unknown);
    }
}
