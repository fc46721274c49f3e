use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::archive;
use crate::config::AppConfig;
use crate::database::Database;
use crate::discord::DiscordNotifier;
use crate::dispatcher::{
    DeployContent, DeployOutcome, DeployStatus, DeployTarget, Dispatcher, StatusReport, TeardownReport,
};
use crate::generate;
use crate::health::{self, HealthChecker, HealthReport, PageCheck};
use crate::models::{
    DeployMark, DeployRecord, FileMap, Settings, SiteConfig, migrate_deploy_urls, uid,
};
use crate::templates::catalog::TemplateCatalog;
use crate::templates::{Resolution, ResolvedTemplate};

/// Counts from a legacy state import.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub settings: usize,
    pub sites: usize,
    pub skipped_sites: usize,
    pub deploy_urls: usize,
}

/// Application context: the store, the deploy dispatcher, the template
/// catalog and the notifier, wired from one [`AppConfig`].
pub struct LpFactory {
    database: Database,
    dispatcher: Dispatcher,
    catalog: TemplateCatalog,
    discord: DiscordNotifier,
    health: HealthChecker,
    client: Client,
    /// Last status seen per `site/target`, for the watcher
    seen: Mutex<HashMap<String, DeployStatus>>,
}

impl LpFactory {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let database = Database::connect(&config.database_url)
            .await
            .with_context(|| format!("Failed to open database {}", config.database_url))?;
        let dispatcher = Dispatcher::new(config).context("Failed to build deploy client")?;
        let api = ApiClient::new(&config.api_base, config.http_timeout)?;
        let client = Client::builder().timeout(config.http_timeout).build()?;

        Ok(Self {
            database,
            dispatcher,
            catalog: TemplateCatalog::new(api),
            discord: DiscordNotifier::new(client.clone(), config.discord_webhook_url.clone()),
            health: HealthChecker::new(config)?,
            client,
            seen: Mutex::new(HashMap::new()),
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Stored settings over `LPF_*` environment variables.
    pub async fn settings(&self) -> Result<Settings> {
        let stored = self.database.load_settings().await.context("Failed to load settings")?;
        Ok(Settings::from_env().merge(&stored))
    }

    /// Sets one settings key. Unknown keys are rejected.
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let stored = self.database.load_settings().await?;
        let mut rows = stored.to_rows();
        let Some(current) = rows.get(key) else {
            bail!("Unknown setting: {key}");
        };
        let value = match current {
            Value::String(_) => Value::String(value.to_string()),
            _ if value.trim().is_empty() => Value::Null,
            _ => value
                .trim()
                .parse::<u64>()
                .map(Value::from)
                .map_err(|_| anyhow!("{key} must be a number"))?,
        };
        rows.insert(key.to_string(), value);
        self.database.save_settings(&Settings::from_rows(&rows)).await?;
        info!("Updated setting {}", key);
        Ok(())
    }

    /// Site by id or domain from the store, or read from a JSON file.
    pub async fn load_site(&self, key: &str) -> Result<SiteConfig> {
        let path = Path::new(key);
        if path.is_file() {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return serde_json::from_str(&raw).with_context(|| format!("Invalid site JSON in {}", path.display()));
        }
        self.database
            .find_site(key)
            .await?
            .ok_or_else(|| anyhow!("No site with id or domain {key}"))
    }

    /// Validates (unless `force`) and stores a site. A missing id is filled in.
    pub async fn save_site(&self, mut site: SiteConfig, force: bool) -> Result<SiteConfig> {
        ensure_valid(&site, force)?;
        if site.id.trim().is_empty() {
            site.id = uid();
        }
        if site.favicon_data_url.is_empty() || site.og_image_data_url.is_empty() {
            site.touch_assets();
        }
        site.updated_at = Some(Utc::now());
        site.created_at.get_or_insert_with(Utc::now);

        self.database.save_site(&site).await?;
        info!("Saved site {} ({})", site.display_name(), site.id);
        Ok(site)
    }

    pub async fn resolve(&self, site: &SiteConfig) -> Resolution {
        let resolution = self.catalog.resolve(site.template_id.as_deref()).await;
        resolution.warn_on_fallback();
        resolution
    }

    pub async fn preview(&self, site: &SiteConfig) -> String {
        generate::preview_or_default(&self.resolve(site).await, site)
    }

    pub async fn project(&self, site: &SiteConfig) -> FileMap {
        generate::project_files(&self.resolve(site).await, site)
    }

    /// ZIP of the preview page, or of the whole project.
    pub async fn zip(&self, site: &SiteConfig, project: bool) -> Result<Vec<u8>> {
        let bytes = if project {
            archive::zip_files(&self.project(site).await)?
        } else {
            archive::zip_single("index.html", self.preview(site).await.as_bytes())?
        };
        Ok(bytes)
    }

    /// What `target` publishes: the project sources for git-push (built by
    /// CI), the rendered pages everywhere else.
    pub async fn deploy_content(&self, target: DeployTarget, site: &SiteConfig) -> DeployContent {
        let resolution = self.resolve(site).await;
        if target == DeployTarget::GitPush {
            return DeployContent::Files(generate::project_files(&resolution, site));
        }

        let mut files = FileMap::new();
        files.insert("index.html".to_string(), generate::preview_or_default(&resolution, site));
        if !matches!(resolution.template, ResolvedTemplate::Custom(_)) {
            files.insert("apply.html".to_string(), generate::apply_html(site));
        }
        DeployContent::Files(files)
    }

    /// Deploys to each target in turn and records every attempt.
    pub async fn deploy(&self, site: &SiteConfig, targets: &[DeployTarget], force: bool) -> Result<Vec<DeployOutcome>> {
        ensure_valid(site, force)?;
        let settings = self.settings().await?;

        let mut outcomes = Vec::with_capacity(targets.len());
        for &target in targets {
            let content = self.deploy_content(target, site).await;
            let outcome = self.dispatcher.deploy(target, &content, site, &settings).await;
            if let Err(e) = self.record(site, &outcome).await {
                warn!("Deploy to {} not recorded: {:#}", target, e);
            }

            if let Err(e) = self.discord.notify_deploy(site, &outcome).await {
                warn!("Discord notification failed: {}", e);
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn record(&self, site: &SiteConfig, outcome: &DeployOutcome) -> Result<()> {
        let now = Utc::now();
        let status = match (outcome.success, outcome.queued) {
            (true, false) => "live",
            (true, true) => "queued",
            (false, _) => "failed",
        };
        self.database
            .record_deploy(&DeployRecord {
                id: uid(),
                site_id: site.id.clone(),
                target: outcome.target.id().to_string(),
                url: outcome.url.clone().unwrap_or_default(),
                status: status.to_string(),
                brand: site.brand.clone(),
                created_at: now,
            })
            .await
            .context("Failed to record deploy history")?;

        if let (true, Some(url)) = (outcome.success, &outcome.url) {
            let mark = DeployMark {
                url: url.clone(),
                ts: Some(now),
            };
            self.database
                .mark_deployed(&site.id, outcome.target.id(), &mark)
                .await
                .context("Failed to record deploy URL")?;
        }
        Ok(())
    }

    /// Targets the site has been deployed to, by priority.
    pub async fn deployed_targets(&self, site: &SiteConfig) -> Result<Vec<DeployTarget>> {
        let deploys = self.database.site_deploys(&site.id).await?;
        let mut targets: Vec<DeployTarget> = deploys.keys().filter_map(|t| t.parse().ok()).collect();
        targets.sort_by_key(|t| t.priority());
        Ok(targets)
    }

    pub async fn status(&self, site: &SiteConfig, targets: &[DeployTarget]) -> Result<Vec<StatusReport>> {
        let settings = self.settings().await?;
        Ok(self.dispatcher.check_all(targets, site, &settings).await)
    }

    /// Best-effort removal from every target. Only the targets that were
    /// actually removed leave the deploy map.
    pub async fn teardown(&self, site: &SiteConfig, targets: &[DeployTarget]) -> Result<TeardownReport> {
        let settings = self.settings().await?;
        let report = self.dispatcher.teardown_all(targets, site, &settings).await;

        let removed: Vec<&str> = report.succeeded.iter().map(|t| t.id()).collect();
        self.database.remove_deploys(&site.id, &removed).await?;
        Ok(report)
    }

    pub async fn health(&self) -> Result<Vec<HealthReport>> {
        let settings = self.settings().await?;
        Ok(self.health.check_all(&settings).await)
    }

    /// Fetches each recorded deploy URL of `site` and looks for its brand.
    pub async fn verify(&self, site: &SiteConfig) -> Result<Vec<(DeployTarget, Result<PageCheck>)>> {
        let mut checks = Vec::new();
        for (target, mark) in self.database.site_deploys(&site.id).await? {
            let Ok(target) = target.parse::<DeployTarget>() else {
                continue;
            };
            let check = health::verify_live(&self.client, &mark.url, site.display_name()).await;
            checks.push((target, check));
        }
        Ok(checks)
    }

    /// One watcher pass: checks every recorded deploy and reports the ones
    /// whose status changed since the previous pass.
    pub async fn poll_deployments(&self) -> Result<Vec<(SiteConfig, StatusReport)>> {
        let settings = self.settings().await?;
        let deploy_urls = self.database.deploy_urls().await?;
        let sites: BTreeMap<String, SiteConfig> = self
            .database
            .sites()
            .await?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        let mut changed = Vec::new();
        let mut seen = self.seen.lock().await;
        for (site_id, targets) in deploy_urls {
            let Some(site) = sites.get(&site_id) else {
                continue;
            };
            let targets: Vec<DeployTarget> = targets.keys().filter_map(|t| t.parse().ok()).collect();

            for report in self.dispatcher.check_all(&targets, site, &settings).await {
                if report.status == DeployStatus::Unknown {
                    continue;
                }
                let key = format!("{site_id}/{}", report.target);
                let before = seen.insert(key, report.status);
                if before.is_some_and(|b| b != report.status) {
                    info!(
                        "{} on {} changed to {}",
                        site.display_name(),
                        report.target,
                        report.status.as_str()
                    );
                    let embed = DiscordNotifier::status_embed(site, report.target, before, report.status);
                    if let Err(e) = self.discord.send(embed).await {
                        warn!("Discord notification failed: {}", e);
                    }
                    changed.push((site.clone(), report));
                }
            }
        }
        Ok(changed)
    }

    /// Imports the dashboard's localStorage export: `settings`, `sites` and
    /// `deployUrls`, each either a JSON value or a JSON-encoded string.
    pub async fn import_state(&self, state: &Value) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();

        if let Some(Value::Object(map)) = blob(state, "settings") {
            let rows: BTreeMap<String, Value> = map.into_iter().collect();
            let imported = Settings::from_rows(&rows);
            let merged = self.database.load_settings().await?.merge(&imported);
            self.database.save_settings(&merged).await?;
            summary.settings = rows.len();
        }

        if let Some(Value::Array(sites)) = blob(state, "sites") {
            for raw in sites {
                match serde_json::from_value::<SiteConfig>(raw) {
                    Ok(site) if !site.id.trim().is_empty() => {
                        self.database.save_site(&site).await?;
                        summary.sites += 1;
                    }
                    Ok(_) => summary.skipped_sites += 1,
                    Err(e) => {
                        warn!("Skipping unreadable site: {}", e);
                        summary.skipped_sites += 1;
                    }
                }
            }
        }

        if let Some(stored) = blob(state, "deployUrls") {
            let urls = migrate_deploy_urls(&stored);
            summary.deploy_urls = self.database.import_deploy_urls(&urls).await?;
        }

        info!(
            "Imported {} settings, {} sites, {} deploy URLs",
            summary.settings, summary.sites, summary.deploy_urls
        );
        Ok(summary)
    }
}

/// A localStorage entry, decoding it when it was stored as a JSON string.
fn blob(state: &Value, key: &str) -> Option<Value> {
    match state.get(key)? {
        Value::String(encoded) => serde_json::from_str(encoded).ok(),
        Value::Null => None,
        other => Some(other.clone()),
    }
}

fn ensure_valid(site: &SiteConfig, force: bool) -> Result<()> {
    let errors = site.validate();
    if errors.is_empty() {
        return Ok(());
    }
    if force {
        warn!("Ignoring {} validation errors for {}", errors.len(), site.display_name());
        return Ok(());
    }
    bail!(
        "Site {} is not valid:\n  - {}",
        site.display_name(),
        errors.join("\n  - ")
    )
}

/// Writes a file map under `dir`. Paths that would escape `dir` are refused.
pub async fn write_files(dir: &Path, files: &FileMap) -> Result<usize> {
    for (name, body) in files {
        let relative = Path::new(name.trim_start_matches('/'));
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("Refusing to write outside the output directory: {name}");
        }
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(files.len())
}

/// Reads every UTF-8 file under `dir` into a file map keyed by relative
/// `/`-separated path. Binary files are skipped.
pub async fn read_tree(dir: &Path) -> Result<FileMap> {
    let mut files = FileMap::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .with_context(|| format!("Failed to read {}", current.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }
            let Ok(body) = tokio::fs::read_to_string(&path).await else {
                warn!("Skipping non-text file {}", path.display());
                continue;
            };
            let relative = path.strip_prefix(dir)?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(key, body);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;
    use crate::deployers::mock;
    use axum::http::StatusCode;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use serde_json::json;

    fn valid_site() -> SiteConfig {
        SiteConfig {
            id: "a1b2c3".to_string(),
            redirect_url: "https://offers.example/apply".to_string(),
            ..SiteConfig::new("TestBrand", "testbrand.com")
        }
    }

    async fn factory(base: &str) -> LpFactory {
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            api_base: format!("{base}/api"),
            worker_base: base.to_string(),
            endpoints: Endpoints::all_at(base),
            ..AppConfig::default()
        };
        LpFactory::new(&config).await.unwrap()
    }

    fn netlify_app() -> Router {
        Router::new()
            .route(
                "/sites",
                post(|| async { Json(json!({"id": "s-1", "name": "testbrand-com-a1b2", "ssl_url": "https://testbrand-com-a1b2.netlify.app"})) })
                    .get(|| async { Json(json!([{"id": "s-1"}])) }),
            )
            .route("/sites/s-1/deploys", post(|| async { Json(json!({"id": "d-1"})) }))
            .route("/sites/s-1", delete(|| async { StatusCode::NO_CONTENT }))
            .route("/v9/projects/testbrand-com-a1b2", delete(|| async { (StatusCode::FORBIDDEN, "nope") }))
            .route("/api/templates", get(|| async { Json(json!([])) }))
    }

    #[tokio::test]
    async fn deploy_records_history_and_url() {
        let base = mock::serve(netlify_app()).await;
        let lpf = factory(&base).await;
        lpf.database()
            .save_settings(&Settings {
                netlify_token: "nf".to_string(),
                ..Settings::default()
            })
            .await
            .unwrap();
        let site = lpf.save_site(valid_site(), false).await.unwrap();

        let outcomes = lpf
            .deploy(&site, &[DeployTarget::Netlify, DeployTarget::Vercel], false)
            .await
            .unwrap();
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert!(outcomes[1].error.as_deref().unwrap().contains("vercelToken"));

        let history = lpf.database().history(Some(site.id.as_str()), 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().any(|r| r.target == "vercel" && r.status == "failed"));

        let deploys = lpf.database().site_deploys(&site.id).await.unwrap();
        assert_eq!(deploys["netlify"].url, "https://testbrand-com-a1b2.netlify.app");
        assert!(!deploys.contains_key("vercel"));
        assert_eq!(lpf.deployed_targets(&site).await.unwrap(), [DeployTarget::Netlify]);
    }

    #[tokio::test]
    async fn store_failures_do_not_hide_outcomes() {
        let base = mock::serve(netlify_app()).await;
        let lpf = factory(&base).await;
        lpf.database()
            .save_settings(&Settings {
                netlify_token: "nf".to_string(),
                ..Settings::default()
            })
            .await
            .unwrap();
        let site = valid_site();
        sqlx::query("DROP TABLE deploy_history")
            .execute(lpf.database().pool())
            .await
            .unwrap();

        let outcomes = lpf
            .deploy(&site, &[DeployTarget::Netlify, DeployTarget::Vercel], false)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].url.as_deref(), Some("https://testbrand-com-a1b2.netlify.app"));
        assert_eq!(outcomes[1].target, DeployTarget::Vercel);
    }

    #[tokio::test]
    async fn invalid_site_is_refused_unless_forced() {
        let base = mock::serve(netlify_app()).await;
        let lpf = factory(&base).await;
        let site = SiteConfig::new("", "not a domain");

        let err = lpf.deploy(&site, &[DeployTarget::Netlify], false).await.unwrap_err();
        assert!(err.to_string().contains("Brand Name is required"));

        let outcomes = lpf.deploy(&site, &[DeployTarget::Netlify], true).await.unwrap();
        assert!(!outcomes[0].success);
    }

    #[tokio::test]
    async fn teardown_keeps_failed_targets_listed() {
        let base = mock::serve(netlify_app()).await;
        let lpf = factory(&base).await;
        lpf.database()
            .save_settings(&Settings {
                netlify_token: "nf".to_string(),
                vercel_token: "vt".to_string(),
                ..Settings::default()
            })
            .await
            .unwrap();
        let site = valid_site();
        for target in ["netlify", "vercel"] {
            let mark = DeployMark {
                url: format!("https://{target}.example"),
                ts: None,
            };
            lpf.database().mark_deployed(&site.id, target, &mark).await.unwrap();
        }

        let report = lpf
            .teardown(&site, &[DeployTarget::Netlify, DeployTarget::Vercel])
            .await
            .unwrap();
        assert_eq!(report.succeeded, [DeployTarget::Netlify]);
        assert_eq!(report.failed[0].target, DeployTarget::Vercel);

        let left = lpf.database().site_deploys(&site.id).await.unwrap();
        assert_eq!(left.keys().collect::<Vec<_>>(), ["vercel"]);
    }

    #[tokio::test]
    async fn content_per_target() {
        let base = mock::serve(netlify_app()).await;
        let lpf = factory(&base).await;
        let site = valid_site();

        let DeployContent::Files(pages) = lpf.deploy_content(DeployTarget::CfPages, &site).await else {
            panic!("expected files");
        };
        assert_eq!(pages.keys().collect::<Vec<_>>(), ["apply.html", "index.html"]);
        assert!(pages["index.html"].contains("TestBrand"));

        let DeployContent::Files(project) = lpf.deploy_content(DeployTarget::GitPush, &site).await else {
            panic!("expected files");
        };
        assert!(project.contains_key("package.json"));
        assert!(project.contains_key("src/pages/index.astro"));
    }

    #[tokio::test]
    async fn imports_legacy_local_storage() {
        let base = mock::serve(netlify_app()).await;
        let lpf = factory(&base).await;
        let site = valid_site();
        let state = json!({
            "settings": json!({"netlifyToken": "nf", "unknownKey": 1}).to_string(),
            "sites": [
                serde_json::to_value(&site).unwrap(),
                {"id": "f1", "brand": "Fraction", "domain": "fraction.test", "amountMin": 99.5, "amountMax": 5000},
                {"brand": "No id"}
            ],
            "deployUrls": {"a1b2c3": "https://old.netlify.app"}
        });

        let summary = lpf.import_state(&state).await.unwrap();
        assert_eq!(summary.sites, 2);
        assert_eq!(summary.skipped_sites, 1);
        let fraction = lpf.database().find_site("f1").await.unwrap().unwrap();
        assert_eq!(fraction.amount_min, 99.5);
        assert_eq!(summary.deploy_urls, 1);
        assert_eq!(lpf.settings().await.unwrap().netlify_token, "nf");

        let deploys = lpf.database().site_deploys("a1b2c3").await.unwrap();
        assert_eq!(deploys["netlify"].url, "https://old.netlify.app");
    }

    #[tokio::test]
    async fn settings_keys_are_checked() {
        let base = mock::serve(netlify_app()).await;
        let lpf = factory(&base).await;
        lpf.set_setting("vpsPort", "2222").await.unwrap();
        lpf.set_setting("vpsHost", "203.0.113.7").await.unwrap();
        let settings = lpf.database().load_settings().await.unwrap();
        assert_eq!(settings.vps_port, Some(2222));
        assert_eq!(settings.vps_host, "203.0.113.7");

        assert!(lpf.set_setting("nope", "x").await.is_err());
        assert!(lpf.set_setting("vpsPort", "abc").await.is_err());
    }

    #[tokio::test]
    async fn write_files_refuses_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileMap::from([("src/pages/index.astro".to_string(), "---\n---".to_string())]);
        assert_eq!(write_files(dir.path(), &files).await.unwrap(), 1);
        assert!(dir.path().join("src/pages/index.astro").exists());

        let evil = FileMap::from([("../evil".to_string(), String::new())]);
        assert!(write_files(dir.path(), &evil).await.is_err());
    }

    #[tokio::test]
    async fn tree_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileMap::from([
            ("index.html".to_string(), "<h1>{{brand}}</h1>".to_string()),
            ("src/pages/apply.astro".to_string(), "---\n---".to_string()),
        ]);
        write_files(dir.path(), &files).await.unwrap();
        assert_eq!(read_tree(dir.path()).await.unwrap(), files);
    }
}
