use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::{info, warn};

use crate::models::{DeployMark, DeployRecord, DeployUrls, Settings, SiteConfig};

/// SQLite store for settings, sites and deploy bookkeeping.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("Invalid database URL: {db_url}"))?;
        let in_memory = db_url.contains(":memory:") || db_url.contains("mode=memory");

        if !in_memory {
            if let Some(dir) = options.clone().get_filename().parent()
                && !dir.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(dir).await?;
            }
            if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
                info!("Creating database file");
                Sqlite::create_database(db_url).await?;
            }
        }

        // Every in-memory connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await?;

        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn load_settings(&self) -> Result<Settings> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        let mut stored = BTreeMap::new();
        for row in rows {
            let key: String = row.get("key");
            let raw: String = row.get("value");
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            stored.insert(key, value);
        }
        Ok(Settings::from_rows(&stored))
    }

    /// Upserts every settings field.
    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for (key, value) in settings.to_rows() {
            sqlx::query(
                r"
                INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                ",
            )
            .bind(&key)
            .bind(value.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn save_site(&self, site: &SiteConfig) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r"
            INSERT INTO sites (id, data, created_at, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            ",
        )
        .bind(&site.id)
        .bind(serde_json::to_string(site)?)
        .bind(site.created_at.unwrap_or(now))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn sites(&self) -> Result<Vec<SiteConfig>> {
        let rows = sqlx::query("SELECT id, data FROM sites ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id: String = row.get("id");
                let data: String = row.get("data");
                serde_json::from_str(&data)
                    .map_err(|e| warn!("Skipping unreadable site {}: {}", id, e))
                    .ok()
            })
            .collect())
    }

    /// Site by id, or by domain when no id matches.
    pub async fn find_site(&self, key: &str) -> Result<Option<SiteConfig>> {
        let sites = self.sites().await?;
        let by_id = sites.iter().position(|s| s.id == key);
        let index = by_id.or_else(|| sites.iter().position(|s| s.domain.eq_ignore_ascii_case(key)));
        Ok(index.map(|i| sites[i].clone()))
    }

    /// Deletes the site and its deploy URLs. History is kept.
    pub async fn delete_site(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM sites WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM deploy_urls WHERE site_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(deleted > 0)
    }

    pub async fn record_deploy(&self, record: &DeployRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO deploy_history (id, site_id, target, url, status, brand, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&record.id)
        .bind(&record.site_id)
        .bind(&record.target)
        .bind(&record.url)
        .bind(&record.status)
        .bind(&record.brand)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent history first, optionally for one site.
    pub async fn history(&self, site_id: Option<&str>, limit: u32) -> Result<Vec<DeployRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, site_id, target, url, status, brand, created_at FROM deploy_history
            WHERE ?1 IS NULL OR site_id = ?1
            ORDER BY created_at DESC LIMIT ?2
            ",
        )
        .bind(site_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DeployRecord {
                id: row.get("id"),
                site_id: row.get("site_id"),
                target: row.get("target"),
                url: row.get("url"),
                status: row.get("status"),
                brand: row.get("brand"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    pub async fn mark_deployed(&self, site_id: &str, target: &str, mark: &DeployMark) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO deploy_urls (site_id, target, url, ts) VALUES (?, ?, ?, ?)
            ON CONFLICT(site_id, target) DO UPDATE SET url = excluded.url, ts = excluded.ts
            ",
        )
        .bind(site_id)
        .bind(target)
        .bind(&mark.url)
        .bind(mark.ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn deploy_urls(&self) -> Result<DeployUrls> {
        let rows = sqlx::query("SELECT site_id, target, url, ts FROM deploy_urls")
            .fetch_all(&self.pool)
            .await?;

        let mut urls = DeployUrls::new();
        for row in rows {
            let ts: Option<DateTime<Utc>> = row.get("ts");
            urls.entry(row.get("site_id"))
                .or_default()
                .insert(row.get("target"), DeployMark { url: row.get("url"), ts });
        }
        Ok(urls)
    }

    pub async fn site_deploys(&self, site_id: &str) -> Result<BTreeMap<String, DeployMark>> {
        Ok(self.deploy_urls().await?.remove(site_id).unwrap_or_default())
    }

    pub async fn remove_deploys(&self, site_id: &str, targets: &[&str]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for target in targets {
            sqlx::query("DELETE FROM deploy_urls WHERE site_id = ? AND target = ?")
                .bind(site_id)
                .bind(target)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Writes a whole deploy URL map, replacing entries with the same key.
    pub async fn import_deploy_urls(&self, urls: &DeployUrls) -> Result<usize> {
        let mut count = 0;
        for (site_id, targets) in urls {
            for (target, mark) in targets {
                self.mark_deployed(site_id, target, mark).await?;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn memory() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let db = memory().await;
        let settings = Settings {
            netlify_token: "nf".to_string(),
            vps_port: Some(2222),
            ..Settings::default()
        };
        db.save_settings(&settings).await.unwrap();
        assert_eq!(db.load_settings().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn sites_upsert_and_lookup() {
        let db = memory().await;
        let mut site = SiteConfig::new("Acme", "acme.test");
        db.save_site(&site).await.unwrap();
        site.tagline = "Fast loans".to_string();
        db.save_site(&site).await.unwrap();

        let all = db.sites().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].tagline, "Fast loans");
        assert_eq!(db.find_site("ACME.test").await.unwrap().unwrap().id, site.id);
        assert!(db.find_site("nope").await.unwrap().is_none());

        db.mark_deployed(&site.id, "netlify", &DeployMark { url: "https://a".to_string(), ts: None })
            .await
            .unwrap();
        assert!(db.delete_site(&site.id).await.unwrap());
        assert!(db.deploy_urls().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deploy_urls_and_partial_removal() {
        let db = memory().await;
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        for target in ["netlify", "vercel", "cf-pages"] {
            let mark = DeployMark {
                url: format!("https://{target}.example"),
                ts: Some(ts),
            };
            db.mark_deployed("s1", target, &mark).await.unwrap();
        }
        db.remove_deploys("s1", &["netlify", "cf-pages"]).await.unwrap();

        let left = db.site_deploys("s1").await.unwrap();
        assert_eq!(left.keys().collect::<Vec<_>>(), ["vercel"]);
        assert_eq!(left["vercel"].ts, Some(ts));
    }

    #[tokio::test]
    async fn history_newest_first() {
        let db = memory().await;
        for (i, site) in ["a", "b", "a"].iter().enumerate() {
            db.record_deploy(&DeployRecord {
                id: format!("r{i}"),
                site_id: site.to_string(),
                target: "netlify".to_string(),
                url: String::new(),
                status: "live".to_string(),
                brand: "B".to_string(),
                created_at: Utc.with_ymd_and_hms(2025, 1, 1, i as u32, 0, 0).unwrap(),
            })
            .await
            .unwrap();
        }
        let for_a = db.history(Some("a"), 10).await.unwrap();
        assert_eq!(for_a.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["r2", "r0"]);
        assert_eq!(db.history(None, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn file_database_is_created_with_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}/nested/lp.db", dir.path().display());
        let db = Database::connect(&url).await.unwrap();
        db.save_site(&SiteConfig::new("X", "x.test")).await.unwrap();
        assert!(dir.path().join("nested/lp.db").exists());
    }
}
