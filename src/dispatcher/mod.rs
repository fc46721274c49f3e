//! # Deploy Dispatcher
//!
//! Routes a deploy, status check or teardown to the deployer registered for
//! a [`DeployTarget`]. The dispatcher keeps no state between calls: the same
//! target, content and provider responses always produce the same
//! [`DeployOutcome`].
//!
//! Failures never escape as errors. A missing credential, an unknown target
//! or a provider rejection all come back as `DeployOutcome { success: false,
//! error }`, and status checks fold errors into a [`StatusReport`] with
//! [`DeployStatus::Unknown`]. Nothing is retried.

mod target;

pub use target::{DeployTarget, TargetInfo, available_targets};

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::deployers::{
    cf_pages::CfPages, cf_workers::CfWorkers, git_push::GitPush, netlify::Netlify, s3::S3Cloudfront,
    vercel::Vercel, vps::VpsSsh,
};
use crate::errors::DeployError;
use crate::models::{FileMap, Settings, SiteConfig};
use crate::traits::Deployer;

/// Upper bound for one provider request; uploads can be slow.
const DEPLOY_TIMEOUT: Duration = Duration::from_secs(120);
const USER_AGENT: &str = concat!("lp-factory/", env!("CARGO_PKG_VERSION"));

/// What gets published.
#[derive(Debug, Clone, PartialEq)]
pub enum DeployContent {
    /// A single page served as `index.html`
    Html(String),
    /// A file tree
    Files(FileMap),
}

impl DeployContent {
    /// Content as a file map with relative paths.
    pub fn files(&self) -> FileMap {
        match self {
            DeployContent::Html(html) => FileMap::from([("index.html".to_string(), html.clone())]),
            DeployContent::Files(files) => files
                .iter()
                .map(|(path, body)| (path.trim_start_matches('/').to_string(), body.clone()))
                .collect(),
        }
    }

    /// The entry page, if the content has one.
    pub fn index_html(&self) -> Option<&str> {
        match self {
            DeployContent::Html(html) => Some(html),
            DeployContent::Files(files) => files
                .get("index.html")
                .or_else(|| files.get("/index.html"))
                .map(String::as_str),
        }
    }
}

/// A deployer's success result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployed {
    pub url: String,
    pub deploy_id: Option<String>,
    /// Accepted but built asynchronously (CI)
    pub queued: bool,
}

impl Deployed {
    pub fn live(url: impl Into<String>, deploy_id: Option<String>) -> Self {
        Self {
            url: url.into(),
            deploy_id,
            queued: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub target: DeployTarget,
    pub success: bool,
    pub url: Option<String>,
    pub deploy_id: Option<String>,
    pub queued: bool,
    pub error: Option<String>,
}

impl DeployOutcome {
    fn failed(target: DeployTarget, error: String) -> Self {
        Self {
            target,
            success: false,
            url: None,
            deploy_id: None,
            queued: false,
            error: Some(error),
        }
    }

    fn from_result(target: DeployTarget, result: Result<Deployed, DeployError>) -> Self {
        match result {
            Ok(deployed) => Self {
                target,
                success: true,
                url: Some(deployed.url),
                deploy_id: deployed.deploy_id,
                queued: deployed.queued,
                error: None,
            },
            Err(e) => Self::failed(target, e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Live,
    Building,
    Pending,
    Failed,
    Unknown,
    NoDeploys,
}

impl DeployStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployStatus::Live => "live",
            DeployStatus::Building => "building",
            DeployStatus::Pending => "pending",
            DeployStatus::Failed => "failed",
            DeployStatus::Unknown => "unknown",
            DeployStatus::NoDeploys => "no_deploys",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub target: DeployTarget,
    pub status: DeployStatus,
    pub url: Option<String>,
    pub deploy_id: Option<String>,
    pub created_at: Option<String>,
    pub error: Option<String>,
}

impl StatusReport {
    pub fn new(target: DeployTarget, status: DeployStatus) -> Self {
        Self {
            target,
            status,
            url: None,
            deploy_id: None,
            created_at: None,
            error: None,
        }
    }

    fn errored(target: DeployTarget, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(target, DeployStatus::Unknown)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownFailure {
    pub target: DeployTarget,
    pub error: String,
}

/// Result of removing a site from several targets. Failures do not undo the
/// removals that succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub succeeded: Vec<DeployTarget>,
    pub failed: Vec<TeardownFailure>,
}

pub struct Dispatcher {
    deployers: BTreeMap<DeployTarget, Box<dyn Deployer>>,
}

impl Dispatcher {
    /// Every provider, pointed at the API bases in `config`.
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.http_timeout)
            .timeout(DEPLOY_TIMEOUT)
            .build()?;
        let endpoints = &config.endpoints;

        Ok(Self::from_deployers(vec![
            Box::new(CfPages::new(client.clone(), &endpoints.cloudflare)),
            Box::new(CfWorkers::new(client.clone(), &endpoints.cloudflare)),
            Box::new(Netlify::new(client.clone(), &endpoints.netlify)),
            Box::new(Vercel::new(client.clone(), &endpoints.vercel)),
            Box::new(S3Cloudfront::new(
                client.clone(),
                endpoints.s3.as_deref(),
                &endpoints.cloudfront,
            )),
            Box::new(VpsSsh::new(client.clone(), &config.worker_base)),
            Box::new(GitPush::new(client, &config.worker_base, &endpoints.github)),
        ]))
    }

    pub fn from_deployers(deployers: Vec<Box<dyn Deployer>>) -> Self {
        Self {
            deployers: deployers.into_iter().map(|d| (d.target(), d)).collect(),
        }
    }

    fn deployer(&self, target: DeployTarget) -> Result<&dyn Deployer, DeployError> {
        self.deployers
            .get(&target)
            .map(Box::as_ref)
            .ok_or_else(|| DeployError::NotConfigured(format!("Unknown deploy target: {target}")))
    }

    fn ensure_configured(target: DeployTarget, settings: &Settings) -> Result<(), DeployError> {
        let missing = target.missing_fields(settings);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DeployError::NotConfigured(format!(
                "Missing {} settings: {}. Configure in Settings.",
                target.label(),
                missing.join(", ")
            )))
        }
    }

    /// Publishes `content` to `target`.
    pub async fn deploy(
        &self,
        target: DeployTarget,
        content: &DeployContent,
        site: &SiteConfig,
        settings: &Settings,
    ) -> DeployOutcome {
        info!("Deploying {} to {}", site.display_name(), target.label());

        let result = match Self::ensure_configured(target, settings).and_then(|()| self.deployer(target)) {
            Ok(deployer) => deployer.deploy(content, site, settings).await,
            Err(e) => Err(e),
        };
        let outcome = DeployOutcome::from_result(target, result);

        match (&outcome.url, &outcome.error) {
            (Some(url), _) => info!("Deployed {} to {}: {}", site.display_name(), target, url),
            (_, Some(error)) => warn!("Deploy of {} to {} failed: {}", site.display_name(), target, error),
            _ => {}
        }
        outcome
    }

    /// Latest provider-side state of `site` on `target`.
    pub async fn check_status(&self, target: DeployTarget, site: &SiteConfig, settings: &Settings) -> StatusReport {
        let result = match self.deployer(target) {
            Ok(deployer) => deployer.check_status(site, settings).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| StatusReport::errored(target, e.to_string()))
    }

    /// Status of several targets, checked concurrently.
    pub async fn check_all(&self, targets: &[DeployTarget], site: &SiteConfig, settings: &Settings) -> Vec<StatusReport> {
        join_all(targets.iter().map(|t| self.check_status(*t, site, settings))).await
    }

    /// Removes `site` from one target.
    pub async fn teardown(&self, target: DeployTarget, site: &SiteConfig, settings: &Settings) -> Result<(), DeployError> {
        Self::ensure_configured(target, settings)?;
        self.deployer(target)?.teardown(site, settings).await
    }

    /// Removes `site` from each target in turn, collecting what worked and
    /// what did not.
    pub async fn teardown_all(&self, targets: &[DeployTarget], site: &SiteConfig, settings: &Settings) -> TeardownReport {
        let mut report = TeardownReport::default();
        for &target in targets {
            match self.teardown(target, site, settings).await {
                Ok(()) => {
                    info!("Removed {} from {}", site.display_name(), target);
                    report.succeeded.push(target);
                }
                Err(e) => {
                    warn!("Failed to remove {} from {}: {}", site.display_name(), target, e);
                    report.failed.push(TeardownFailure {
                        target,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployers::mock;
    use async_trait::async_trait;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::json;

    struct Canned {
        target: DeployTarget,
        fail_teardown: bool,
    }

    #[async_trait]
    impl Deployer for Canned {
        fn target(&self) -> DeployTarget {
            self.target
        }

        async fn deploy(&self, content: &DeployContent, _: &SiteConfig, _: &Settings) -> Result<Deployed, DeployError> {
            match content.index_html() {
                Some(_) => Ok(Deployed::live("https://canned.example", Some("d1".to_string()))),
                None => Err(DeployError::Content("no index.html".to_string())),
            }
        }

        async fn teardown(&self, _: &SiteConfig, _: &Settings) -> Result<(), DeployError> {
            if self.fail_teardown {
                Err(DeployError::api("Delete", "still in use"))
            } else {
                Ok(())
            }
        }
    }

    fn netlify_settings() -> Settings {
        Settings {
            netlify_token: "tok".to_string(),
            vercel_token: "tok".to_string(),
            ..Settings::default()
        }
    }

    fn canned() -> Dispatcher {
        Dispatcher::from_deployers(vec![
            Box::new(Canned {
                target: DeployTarget::Netlify,
                fail_teardown: false,
            }),
            Box::new(Canned {
                target: DeployTarget::Vercel,
                fail_teardown: true,
            }),
        ])
    }

    #[test]
    fn html_content_becomes_index_page() {
        let content = DeployContent::Html("<h1>x</h1>".to_string());
        assert_eq!(content.files()["index.html"], "<h1>x</h1>");

        let files = DeployContent::Files(FileMap::from([("/apply.html".to_string(), "a".to_string())]));
        assert!(files.files().contains_key("apply.html"));
        assert_eq!(files.index_html(), None);
    }

    #[tokio::test]
    async fn unconfigured_target_fails_without_calling_provider() {
        let outcome = canned()
            .deploy(
                DeployTarget::Netlify,
                &DeployContent::Html(String::new()),
                &SiteConfig::default(),
                &Settings::default(),
            )
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("netlifyToken"));
    }

    #[tokio::test]
    async fn deployer_errors_are_folded_into_outcome() {
        let outcome = canned()
            .deploy(
                DeployTarget::Netlify,
                &DeployContent::Files(FileMap::new()),
                &SiteConfig::default(),
                &netlify_settings(),
            )
            .await;
        assert_eq!(outcome.error.as_deref(), Some("Invalid deploy content: no index.html"));

        let settings = Settings {
            cf_api_token: "t".to_string(),
            cf_account_id: "a".to_string(),
            ..Settings::default()
        };
        let missing = canned()
            .deploy(DeployTarget::CfPages, &DeployContent::Html(String::new()), &SiteConfig::default(), &settings)
            .await;
        assert_eq!(missing.error.as_deref(), Some("Unknown deploy target: cf-pages"));
    }

    #[tokio::test]
    async fn unsupported_status_reads_as_unknown() {
        let report = canned()
            .check_status(DeployTarget::Netlify, &SiteConfig::default(), &netlify_settings())
            .await;
        assert_eq!(report.status, DeployStatus::Unknown);
        assert!(report.error.unwrap().contains("not supported"));
    }

    #[tokio::test]
    async fn bulk_teardown_reports_both_lists() {
        let report = canned()
            .teardown_all(
                &[DeployTarget::Netlify, DeployTarget::Vercel, DeployTarget::S3Cloudfront],
                &SiteConfig::default(),
                &netlify_settings(),
            )
            .await;
        assert_eq!(report.succeeded, [DeployTarget::Netlify]);
        let failed: Vec<_> = report.failed.iter().map(|f| f.target).collect();
        assert_eq!(failed, [DeployTarget::Vercel, DeployTarget::S3Cloudfront]);
        assert_eq!(report.failed[0].error, "Delete failed: still in use");
    }

    #[tokio::test]
    async fn same_response_gives_same_outcome() {
        let app = Router::new().route(
            "/v13/deployments",
            post(|| async { (StatusCode::OK, Json(json!({"id": "dpl_1", "url": "lp-x.vercel.app"}))) }),
        );
        let base = mock::serve(app).await;
        let dispatcher = Dispatcher::from_deployers(vec![Box::new(Vercel::new(mock::client(), &base))]);
        let site = SiteConfig {
            id: "abcdef".to_string(),
            brand: "TestBrand".to_string(),
            ..SiteConfig::default()
        };
        let content = DeployContent::Html("<h1>x</h1>".to_string());

        let first = dispatcher.deploy(DeployTarget::Vercel, &content, &site, &netlify_settings()).await;
        let second = dispatcher.deploy(DeployTarget::Vercel, &content, &site, &netlify_settings()).await;
        assert!(first.success);
        assert_eq!(first.url.as_deref(), Some("https://lp-x.vercel.app"));
        assert_eq!(first, second);

        let failing = Router::new().route(
            "/v13/deployments",
            post(|| async { (StatusCode::FORBIDDEN, Json(json!({"error": {"message": "Not authorized"}}))) }),
        );
        let base = mock::serve(failing).await;
        let dispatcher = Dispatcher::from_deployers(vec![Box::new(Vercel::new(mock::client(), &base))]);
        for _ in 0..2 {
            let outcome = dispatcher.deploy(DeployTarget::Vercel, &content, &site, &netlify_settings()).await;
            assert!(!outcome.success);
            assert_eq!(outcome.url, None);
            assert_eq!(outcome.error.as_deref(), Some("Vercel API failed: Not authorized"));
        }
    }
}
