//! VPS over SSH. The copy itself runs in the deploy worker, which holds the
//! SSH client; this side only hands over files and credentials.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;

use super::{json_body, message_from_body, str_at};
use crate::dispatcher::{DeployContent, DeployTarget, Deployed};
use crate::errors::DeployError;
use crate::models::{FileMap, Settings, SiteConfig, non_empty};
use crate::traits::Deployer;

const DEFAULT_PORT: u16 = 22;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VpsRequest<'a> {
    html: Option<&'a str>,
    files: FileMap,
    host: &'a str,
    port: u16,
    user: &'a str,
    remote_path: &'a str,
    auth_method: &'a str,
    key: &'a str,
    site_name: String,
}

pub struct VpsSsh {
    client: Client,
    worker_base: String,
}

impl VpsSsh {
    pub fn new(client: Client, worker_base: &str) -> Self {
        Self {
            client,
            worker_base: worker_base.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, settings: &Settings) -> String {
        let worker = non_empty(&settings.vps_worker_url)
            .map(|w| w.trim_end_matches('/'))
            .unwrap_or(&self.worker_base);
        format!("{worker}/api/deploy/vps")
    }
}

/// Public URL for a path on the VPS, always ending in `/`.
pub fn public_url(host: &str, path: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        format!("http://{host}/")
    } else {
        format!("http://{host}/{path}/")
    }
}

#[async_trait]
impl Deployer for VpsSsh {
    fn target(&self) -> DeployTarget {
        DeployTarget::VpsSsh
    }

    async fn deploy(
        &self,
        content: &DeployContent,
        site: &SiteConfig,
        settings: &Settings,
    ) -> Result<Deployed, DeployError> {
        let host = settings.vps_host.trim();
        let user = settings.vps_user.trim();
        let remote_path = settings.vps_path.trim();
        if host.is_empty() || user.is_empty() || remote_path.is_empty() {
            return Err(DeployError::NotConfigured(
                "Missing VPS host, user or path. Configure in Settings.".to_string(),
            ));
        }

        let request = VpsRequest {
            html: content.index_html(),
            files: content.files(),
            host,
            port: settings.vps_port.unwrap_or(DEFAULT_PORT),
            user,
            remote_path,
            auth_method: non_empty(&settings.vps_auth_method).unwrap_or("key"),
            key: Settings::secret(&settings.vps_key),
            site_name: site.display_name().to_string(),
        };

        let response = self.client.post(self.endpoint(settings)).json(&request).send().await?;
        let status = response.status();
        let body = json_body(response).await;
        if !status.is_success() || body.get("success").and_then(|s| s.as_bool()) == Some(false) {
            let message = str_at(&body, "/error")
                .map(str::to_string)
                .unwrap_or_else(|| message_from_body(status, &body.to_string()));
            return Err(DeployError::api("VPS deploy", message));
        }

        let url = str_at(&body, "/url").map_or_else(|| public_url(host, remote_path), str::to_string);
        Ok(Deployed::live(url, Some(format!("vps-{}", Utc::now().timestamp_millis()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployers::mock;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    fn settings(worker: &str) -> Settings {
        Settings {
            vps_host: "203.0.113.7".to_string(),
            vps_user: "deploy".to_string(),
            vps_path: "/var/www/lp".to_string(),
            vps_key: "-----BEGIN KEY-----".to_string(),
            vps_worker_url: worker.to_string(),
            ..Settings::default()
        }
    }

    #[test]
    fn public_urls_end_in_slash() {
        assert_eq!(public_url("h", "/var/www/lp"), "http://h/var/www/lp/");
        assert_eq!(public_url("h", "/"), "http://h/");
    }

    #[tokio::test]
    async fn hands_files_to_worker() {
        let app = Router::new().route(
            "/api/deploy/vps",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["host"], "203.0.113.7");
                assert_eq!(body["port"], 22);
                assert_eq!(body["remotePath"], "/var/www/lp");
                assert_eq!(body["authMethod"], "key");
                assert_eq!(body["siteName"], "Acme");
                assert_eq!(body["html"], "<h1>x</h1>");
                assert_eq!(body["files"]["index.html"], "<h1>x</h1>");
                Json(json!({"success": true}))
            }),
        );
        let base = mock::serve(app).await;
        let site = SiteConfig {
            brand: "Acme".to_string(),
            ..SiteConfig::default()
        };

        let deployed = VpsSsh::new(mock::client(), "http://unused.invalid")
            .deploy(&DeployContent::Html("<h1>x</h1>".to_string()), &site, &settings(&base))
            .await
            .unwrap();
        assert_eq!(deployed.url, "http://203.0.113.7/var/www/lp/");
        assert!(deployed.deploy_id.unwrap().starts_with("vps-"));
    }

    #[tokio::test]
    async fn worker_error_is_reported() {
        let app = Router::new().route(
            "/api/deploy/vps",
            post(|| async { (StatusCode::BAD_GATEWAY, Json(json!({"error": "SSH auth failed"}))) }),
        );
        let base = mock::serve(app).await;
        let err = VpsSsh::new(mock::client(), &base)
            .deploy(&DeployContent::Html(String::new()), &SiteConfig::default(), &settings(""))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "VPS deploy failed: SSH auth failed");
    }
}
