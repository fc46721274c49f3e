//! Cloudflare Workers: a module Worker that serves the generated files from
//! an embedded asset map, published on the account's `workers.dev`
//! subdomain.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde_json::json;
use tracing::warn;

use super::{cloudflare_credentials, failure_message, json_body, str_at};
use crate::dispatcher::{DeployContent, DeployTarget, Deployed};
use crate::errors::DeployError;
use crate::models::{Settings, SiteConfig};
use crate::traits::Deployer;

pub const COMPATIBILITY_DATE: &str = "2024-09-23";
const MAIN_MODULE: &str = "worker.js";

const WORKER_TEMPLATE: &str = r#"// Generated Worker: serves the landing page with edge headers
const ASSETS = __ASSETS__;

const TYPES = {
  ".css": "text/css",
  ".js": "application/javascript",
  ".json": "application/json",
  ".png": "image/png",
  ".jpg": "image/jpeg",
  ".svg": "image/svg+xml",
};

export default {
  async fetch(request) {
    const path = new URL(request.url).pathname;
    if (path === "/__health") {
      return new Response("ok", { status: 200 });
    }

    let content = ASSETS[path];
    if (content === undefined && path.endsWith("/")) {
      content = ASSETS[path + "index.html"];
    }
    if (content === undefined) {
      return new Response("Not Found", { status: 404 });
    }

    const ext = Object.keys(TYPES).find((e) => path.endsWith(e));
    return new Response(content, {
      status: 200,
      headers: {
        "Content-Type": ext ? TYPES[ext] : "text/html;charset=UTF-8",
        "Cache-Control": "public, max-age=3600, s-maxage=86400",
        "X-Frame-Options": "DENY",
        "X-Content-Type-Options": "nosniff",
        "Referrer-Policy": "strict-origin-when-cross-origin",
        "X-Edge-Country": request.cf?.country || "US",
      },
    });
  },
};
"#;

/// `lp-worker-{slug}-{id}` script name.
pub fn script_name(site: &SiteConfig) -> String {
    format!("lp-worker-{}-{}", site.compact_slug(40), site.short_id(6))
}

/// Worker module source embedding `content`. Paths gain a leading `/` and
/// `/index.html` is also served at `/`.
pub fn worker_script(content: &DeployContent) -> String {
    let mut assets = BTreeMap::new();
    for (path, body) in content.files() {
        let key = format!("/{path}");
        if key == "/index.html" {
            assets.insert("/".to_string(), body.clone());
        }
        assets.insert(key, body);
    }
    let embedded = serde_json::to_string(&assets).unwrap_or_else(|_| "{}".to_string());
    WORKER_TEMPLATE.replace("__ASSETS__", &embedded)
}

pub struct CfWorkers {
    client: Client,
    base: String,
}

impl CfWorkers {
    pub fn new(client: Client, base: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn script_url(&self, account: &str, name: &str) -> String {
        format!("{}/accounts/{account}/workers/scripts/{name}", self.base)
    }

    async fn account_subdomain(&self, token: &str, account: &str) -> Option<String> {
        let response = self
            .client
            .get(format!("{}/accounts/{account}/workers/subdomain", self.base))
            .bearer_auth(token)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        str_at(&json_body(response).await, "/result/subdomain").map(str::to_string)
    }
}

#[async_trait]
impl Deployer for CfWorkers {
    fn target(&self) -> DeployTarget {
        DeployTarget::CfWorkers
    }

    async fn deploy(
        &self,
        content: &DeployContent,
        site: &SiteConfig,
        settings: &Settings,
    ) -> Result<Deployed, DeployError> {
        let (token, account) = cloudflare_credentials(settings)?;
        let name = script_name(site);

        let metadata = json!({
            "main_module": MAIN_MODULE,
            "compatibility_date": COMPATIBILITY_DATE,
            "compatibility_flags": ["nodejs_compat"],
        });
        let form = Form::new()
            .part(
                "metadata",
                Part::text(metadata.to_string()).mime_str("application/json")?,
            )
            .part(
                MAIN_MODULE,
                Part::text(worker_script(content))
                    .file_name(MAIN_MODULE)
                    .mime_str("application/javascript+module")?,
            );

        let response = self
            .client
            .put(self.script_url(account, &name))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeployError::api("Worker upload", failure_message(response).await));
        }

        let url = match self.account_subdomain(token, account).await {
            Some(subdomain) => format!("https://{name}.{subdomain}.workers.dev"),
            None => format!("https://{name}.workers.dev"),
        };

        let enabled = self
            .client
            .post(format!("{}/subdomain", self.script_url(account, &name)))
            .bearer_auth(token)
            .json(&json!({ "enabled": true }))
            .send()
            .await;
        if let Err(e) = enabled {
            warn!("Could not enable workers.dev route for {}: {}", name, e);
        }

        Ok(Deployed::live(url, Some(name)))
    }

    async fn teardown(&self, site: &SiteConfig, settings: &Settings) -> Result<(), DeployError> {
        let (token, account) = cloudflare_credentials(settings)?;
        let response = self
            .client
            .delete(self.script_url(account, &script_name(site)))
            .bearer_auth(token)
            .send()
            .await?;
        if response.status().is_success() || response.status().as_u16() == 404 {
            Ok(())
        } else {
            Err(DeployError::api("Delete worker", failure_message(response).await))
        }
    }
}
