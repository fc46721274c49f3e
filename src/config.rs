use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://lp-factory-api.songsawat-w.workers.dev/api";
pub const DEFAULT_WORKER_BASE: &str = "https://lp-factory-api.songsawat-w.workers.dev";

/// Process-wide configuration read from the environment (after `.env` has
/// been loaded).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// The app's own JSON API (custom template catalog)
    pub api_base: String,
    /// Worker that fronts the VPS and git-push deploy endpoints
    pub worker_base: String,
    pub endpoints: Endpoints,
    pub http_timeout: Duration,
    pub health_timeout: Duration,
    pub watch_cron: String,
    pub discord_webhook_url: Option<String>,
}

/// Provider API bases. Overridable so tests and proxies can stand in for the
/// real services.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub cloudflare: String,
    pub netlify: String,
    pub vercel: String,
    pub github: String,
    /// Path-style S3 endpoint; `None` means virtual-hosted AWS URLs
    pub s3: Option<String>,
    pub cloudfront: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            cloudflare: "https://api.cloudflare.com/client/v4".to_string(),
            netlify: "https://api.netlify.com/api/v1".to_string(),
            vercel: "https://api.vercel.com".to_string(),
            github: "https://api.github.com".to_string(),
            s3: None,
            cloudfront: "https://cloudfront.amazonaws.com".to_string(),
        }
    }
}

impl Endpoints {
    /// Every provider pointed at one base URL.
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            cloudflare: base.clone(),
            netlify: base.clone(),
            vercel: base.clone(),
            github: base.clone(),
            s3: Some(base.clone()),
            cloudfront: base,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/lp-factory.db".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            worker_base: DEFAULT_WORKER_BASE.to_string(),
            endpoints: Endpoints::default(),
            http_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_millis(8000),
            watch_cron: "0 */5 * * * *".to_string(),
            discord_webhook_url: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Self {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            eprintln!("Error loading .env: {e}");
        }

        let defaults = Self::default();
        let endpoints = Endpoints {
            cloudflare: var_or("LPF_CF_API_BASE", &defaults.endpoints.cloudflare),
            netlify: var_or("LPF_NETLIFY_API_BASE", &defaults.endpoints.netlify),
            vercel: var_or("LPF_VERCEL_API_BASE", &defaults.endpoints.vercel),
            github: var_or("LPF_GITHUB_API_BASE", &defaults.endpoints.github),
            s3: optional_var("LPF_S3_ENDPOINT"),
            cloudfront: var_or("LPF_CLOUDFRONT_API_BASE", &defaults.endpoints.cloudfront),
        };

        Self {
            database_url: var_or("LPF_DATABASE_URL", &defaults.database_url),
            api_base: var_or("LPF_API_BASE", &defaults.api_base),
            worker_base: var_or("LPF_WORKER_BASE", &defaults.worker_base),
            endpoints,
            http_timeout: Duration::from_secs(parse_var("LPF_HTTP_TIMEOUT_SECS", 10)),
            health_timeout: Duration::from_millis(parse_var("LPF_HEALTH_TIMEOUT_MS", 8000)),
            watch_cron: var_or("LPF_WATCH_CRON", &defaults.watch_cron),
            discord_webhook_url: optional_var("LPF_DISCORD_WEBHOOK_URL"),
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    optional_var(name)
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
