//! Provider connectivity checks and live-page verification.
//!
//! Each check is bounded by the configured health timeout and all of them run
//! concurrently. A check never fails: unreachable hosts read as `offline`,
//! rejections and timeouts as `error`, missing credentials as
//! `unconfigured`.

use std::time::Instant;

use anyhow::{Result, anyhow};
use futures::future::join_all;
use reqwest::{Client, RequestBuilder};
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::deployers::message_from_body;
use crate::dispatcher::DeployTarget;
use crate::models::{Settings, non_empty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Online,
    Offline,
    Error,
    Unconfigured,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Online => "online",
            HealthStatus::Offline => "offline",
            HealthStatus::Error => "error",
            HealthStatus::Unconfigured => "unconfigured",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Service {
    Worker,
    Cloudflare,
    Netlify,
    Vercel,
    Aws,
    Vps,
    Github,
}

impl Service {
    pub const ALL: [Service; 7] = [
        Service::Worker,
        Service::Cloudflare,
        Service::Netlify,
        Service::Vercel,
        Service::Aws,
        Service::Vps,
        Service::Github,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Service::Worker => "Worker API",
            Service::Cloudflare => "Cloudflare",
            Service::Netlify => "Netlify",
            Service::Vercel => "Vercel",
            Service::Aws => "AWS S3",
            Service::Vps => "VPS",
            Service::Github => "GitHub",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub service: Service,
    pub status: HealthStatus,
    pub detail: String,
    pub ms: u64,
}

impl HealthReport {
    fn new(service: Service, status: HealthStatus, detail: impl Into<String>) -> Self {
        Self {
            service,
            status,
            detail: detail.into(),
            ms: 0,
        }
    }
}

pub struct HealthChecker {
    client: Client,
    config: AppConfig,
}

impl HealthChecker {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("lp-factory/", env!("CARGO_PKG_VERSION")))
            .timeout(config.health_timeout)
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Every service, checked concurrently.
    pub async fn check_all(&self, settings: &Settings) -> Vec<HealthReport> {
        join_all(Service::ALL.iter().map(|s| self.check(*s, settings))).await
    }

    pub async fn check(&self, service: Service, settings: &Settings) -> HealthReport {
        let endpoints = &self.config.endpoints;
        match service {
            Service::Worker => {
                let request = self.client.get(format!("{}/api/settings", self.config.worker_base));
                self.timed(service, request, "Connected").await
            }
            Service::Cloudflare => {
                let token = Settings::secret(&settings.cf_api_token);
                let account = settings.cf_account_id.trim();
                if token.is_empty() || account.is_empty() {
                    return HealthReport::new(service, HealthStatus::Unconfigured, "Token or Account ID missing");
                }
                if account.len() != 32 || !account.chars().all(|c| c.is_ascii_hexdigit()) {
                    return HealthReport::new(
                        service,
                        HealthStatus::Error,
                        format!("Invalid Account ID ({}/32 chars)", account.chars().count()),
                    );
                }
                let request = self
                    .client
                    .get(format!("{}/accounts/{account}/pages/projects", endpoints.cloudflare))
                    .query(&[("per_page", "1")])
                    .bearer_auth(token);
                self.timed(service, request, "Pages + Workers OK").await
            }
            Service::Netlify => match non_empty(Settings::secret(&settings.netlify_token)) {
                None => HealthReport::new(service, HealthStatus::Unconfigured, "Token not set"),
                Some(token) => {
                    let request = self
                        .client
                        .get(format!("{}/sites", endpoints.netlify))
                        .query(&[("per_page", "1")])
                        .bearer_auth(token);
                    self.timed(service, request, "Connected").await
                }
            },
            Service::Vercel => match non_empty(Settings::secret(&settings.vercel_token)) {
                None => HealthReport::new(service, HealthStatus::Unconfigured, "Token not set"),
                Some(token) => {
                    let request = self.client.get(format!("{}/v2/user", endpoints.vercel)).bearer_auth(token);
                    self.timed(service, request, "Connected").await
                }
            },
            // Without a signed request the best we can report is configuration
            Service::Aws if DeployTarget::S3Cloudfront.configured(settings) => {
                HealthReport::new(service, HealthStatus::Online, format!("Bucket: {}", settings.s3_bucket.trim()))
            }
            Service::Aws => HealthReport::new(service, HealthStatus::Unconfigured, "Credentials not set"),
            Service::Vps => match non_empty(&settings.vps_host) {
                None => HealthReport::new(service, HealthStatus::Unconfigured, "Host not set"),
                Some(host) => HealthReport::new(service, HealthStatus::Online, host),
            },
            Service::Github => {
                let token = Settings::secret(&settings.github_token);
                let (Some(owner), Some(repo)) = (
                    non_empty(&settings.github_repo_owner),
                    non_empty(&settings.github_repo_name),
                ) else {
                    return HealthReport::new(service, HealthStatus::Unconfigured, "Repository not set");
                };
                if token.is_empty() {
                    return HealthReport::new(service, HealthStatus::Unconfigured, "Token not set");
                }
                let request = self
                    .client
                    .get(format!("{}/repos/{owner}/{repo}", endpoints.github))
                    .bearer_auth(token)
                    .header("Accept", "application/vnd.github+json");
                self.timed(service, request, format!("{owner}/{repo}")).await
            }
        }
    }

    async fn timed(&self, service: Service, request: RequestBuilder, online: impl Into<String>) -> HealthReport {
        let started = Instant::now();
        let result = tokio::time::timeout(self.config.health_timeout, request.send()).await;
        let ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!("{} health check took {}ms", service.label(), ms);

        let (status, detail) = match result {
            Err(_) => (HealthStatus::Error, "Timeout".to_string()),
            Ok(Err(e)) if e.is_timeout() => (HealthStatus::Error, "Timeout".to_string()),
            Ok(Err(e)) => (HealthStatus::Offline, e.to_string()),
            Ok(Ok(response)) if response.status().is_success() => (HealthStatus::Online, online.into()),
            Ok(Ok(response)) => {
                let code = response.status();
                let message = message_from_body(code, &response.text().await.unwrap_or_default());
                match code.as_u16() {
                    401 | 403 => (HealthStatus::Error, format!("Auth failed: {message}")),
                    _ => (HealthStatus::Error, message),
                }
            }
        };
        HealthReport { ms, ..HealthReport::new(service, status, detail) }
    }
}

/// What a deployed page showed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageCheck {
    pub url: String,
    pub status: u16,
    pub title: Option<String>,
    pub heading: Option<String>,
    pub brand_found: bool,
}

/// Title and first heading of a page, and whether either mentions `brand`.
pub fn inspect_page(html: &str, brand: &str) -> (Option<String>, Option<String>, bool) {
    let document = Html::parse_document(html);
    let first_text = |css: &str| {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())
    };
    let title = first_text("title");
    let heading = first_text("h1");

    let needle = brand.trim().to_lowercase();
    let found = !needle.is_empty()
        && [title.as_deref(), heading.as_deref()]
            .into_iter()
            .flatten()
            .any(|t| t.to_lowercase().contains(&needle));
    (title, heading, found)
}

/// Fetches a deployed page and checks the brand shows up in it.
pub async fn verify_live(client: &Client, url: &str, brand: &str) -> Result<PageCheck> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("{} returned {}", url, status));
    }
    let html = response.text().await?;
    let (title, heading, brand_found) = inspect_page(&html, brand);

    Ok(PageCheck {
        url: url.to_string(),
        status: status.as_u16(),
        title,
        heading,
        brand_found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;
    use crate::deployers::mock;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::time::Duration;

    fn config(base: &str, timeout: Duration) -> AppConfig {
        AppConfig {
            worker_base: base.to_string(),
            endpoints: Endpoints::all_at(base),
            health_timeout: timeout,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn classifies_each_service() {
        let app = Router::new()
            .route("/api/settings", get(|| async { Json(json!({})) }))
            .route("/sites", get(|| async { StatusCode::UNAUTHORIZED }))
            .route(
                "/v2/user",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Json(json!({}))
                }),
            );
        let base = mock::serve(app).await;
        let checker = HealthChecker::new(&config(&base, Duration::from_millis(300))).unwrap();
        let settings = Settings {
            netlify_token: "nf".to_string(),
            vercel_token: "vt".to_string(),
            cf_api_token: "cf".to_string(),
            cf_account_id: "short".to_string(),
            vps_host: "203.0.113.7".to_string(),
            ..Settings::default()
        };

        let reports = checker.check_all(&settings).await;
        let status = |s: Service| reports.iter().find(|r| r.service == s).unwrap();

        assert_eq!(status(Service::Worker).status, HealthStatus::Online);
        assert_eq!(status(Service::Netlify).status, HealthStatus::Error);
        assert!(status(Service::Netlify).detail.starts_with("Auth failed"));
        assert_eq!(status(Service::Vercel).detail, "Timeout");
        assert_eq!(status(Service::Cloudflare).detail, "Invalid Account ID (5/32 chars)");
        assert_eq!(status(Service::Aws).status, HealthStatus::Unconfigured);
        assert_eq!(status(Service::Vps).status, HealthStatus::Online);
        assert_eq!(status(Service::Github).status, HealthStatus::Unconfigured);
    }

    #[tokio::test]
    async fn unreachable_worker_is_offline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let checker = HealthChecker::new(&config(&format!("http://{addr}"), Duration::from_secs(2))).unwrap();
        let report = checker.check(Service::Worker, &Settings::default()).await;
        assert_eq!(report.status, HealthStatus::Offline);
    }

    #[test]
    fn brand_in_title_or_heading() {
        let html = "<html><head><title>Acme Loans | Fast</title></head><body><h1>Get  cash\n today</h1></body></html>";
        let (title, heading, found) = inspect_page(html, "acme loans");
        assert_eq!(title.as_deref(), Some("Acme Loans | Fast"));
        assert_eq!(heading.as_deref(), Some("Get cash today"));
        assert!(found);

        let (_, _, found) = inspect_page(html, "Other Brand");
        assert!(!found);
    }

    #[tokio::test]
    async fn verify_live_page() {
        let app = Router::new()
            .route("/", get(|| async { axum::response::Html("<title>x</title><h1>TestBrand</h1>") }))
            .route("/gone", get(|| async { StatusCode::NOT_FOUND }));
        let base = mock::serve(app).await;

        let check = verify_live(&mock::client(), &format!("{base}/"), "TestBrand").await.unwrap();
        assert!(check.brand_found);
        assert!(verify_live(&mock::client(), &format!("{base}/gone"), "TestBrand").await.is_err());
    }
}
