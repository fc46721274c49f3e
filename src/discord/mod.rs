//! # Discord Deploy Notifications
//!
//! Posts a rich embed to a Discord webhook after each deploy attempt and when
//! the status watcher sees a deploy change state. Without a webhook URL
//! (`LPF_DISCORD_WEBHOOK_URL`) every call is a logged no-op.
//!
//! One embed per message: title, site, target, a link to the live URL and
//! the error text for failures. Discord caps embed fields at 1024 characters,
//! so long provider errors are cut.

use anyhow::Result;
use chrono::Utc;
use reqwest::Client;
use tracing::{error, info, warn};

use crate::dispatcher::{DeployOutcome, DeployStatus, DeployTarget};
use crate::models::{DiscordEmbed, DiscordField, DiscordMessage, SiteConfig, non_empty};

const COLOR_SUCCESS: u32 = 0x0057_F287;
const COLOR_QUEUED: u32 = 0x00FE_E75C;
const COLOR_FAILURE: u32 = 0x00ED_4245;
const FIELD_LIMIT: usize = 1024;

/// Discord webhook client for deploy events.
///
/// Cloning shares the underlying connection pool.
#[derive(Clone)]
pub struct DiscordNotifier {
    client: Client,
    /// `None` disables notifications
    webhook_url: Option<String>,
}

fn field(name: &str, value: impl Into<String>, inline: bool) -> DiscordField {
    let value: String = value.into();
    DiscordField {
        name: name.to_string(),
        value: value.chars().take(FIELD_LIMIT).collect(),
        inline,
    }
}

impl DiscordNotifier {
    pub fn new(client: Client, webhook_url: Option<String>) -> Self {
        if webhook_url.is_none() {
            info!("LPF_DISCORD_WEBHOOK_URL not set - Discord notifications are disabled");
        }
        Self { client, webhook_url }
    }

    pub fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Embed describing one deploy attempt.
    pub fn deploy_embed(site: &SiteConfig, outcome: &DeployOutcome) -> DiscordEmbed {
        let target = outcome.target;
        let (title, color) = match (outcome.success, outcome.queued) {
            (true, false) => (format!("🚀 Deployed to {}", target.label()), COLOR_SUCCESS),
            (true, true) => (format!("⏳ Deploy queued on {}", target.label()), COLOR_QUEUED),
            (false, _) => (format!("❌ Deploy to {} failed", target.label()), COLOR_FAILURE),
        };

        let mut fields = vec![
            field("Site", site.display_name(), true),
            field("Target", target.id(), true),
        ];
        if let Some(url) = &outcome.url {
            fields.push(field("Link", format!("[Open site]({url})"), false));
        }
        if let Some(error) = &outcome.error {
            fields.push(field("Error", error.as_str(), false));
        }

        DiscordEmbed {
            title,
            description: non_empty(&site.domain).unwrap_or("(no domain)").to_string(),
            url: outcome.url.clone(),
            color,
            timestamp: Utc::now().to_rfc3339(),
            fields,
        }
    }

    /// Embed for a deploy whose provider status changed.
    pub fn status_embed(site: &SiteConfig, target: DeployTarget, before: Option<DeployStatus>, now: DeployStatus) -> DiscordEmbed {
        let color = match now {
            DeployStatus::Live => COLOR_SUCCESS,
            DeployStatus::Failed => COLOR_FAILURE,
            _ => COLOR_QUEUED,
        };
        let from = before.map_or("unseen", DeployStatus::as_str);
        DiscordEmbed {
            title: format!("{} on {} is {}", site.display_name(), target.label(), now.as_str()),
            description: format!("{} → {}", from, now.as_str()),
            url: None,
            color,
            timestamp: Utc::now().to_rfc3339(),
            fields: vec![field("Target", target.id(), true)],
        }
    }

    pub async fn notify_deploy(&self, site: &SiteConfig, outcome: &DeployOutcome) -> Result<()> {
        self.send(Self::deploy_embed(site, outcome)).await
    }

    pub async fn send(&self, embed: DiscordEmbed) -> Result<()> {
        let Some(webhook_url) = &self.webhook_url else {
            return Ok(());
        };
        let title = embed.title.clone();
        let message = DiscordMessage { embeds: vec![embed] };

        let response = self.client.post(webhook_url).json(&message).send().await?;
        if response.status().is_success() {
            info!("Discord notification sent: {}", title);
        } else if response.status().as_u16() == 429 {
            warn!("Discord rate limited the notification: {}", title);
        } else {
            error!("Failed to send Discord notification: {}", response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployers::mock;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    fn outcome(success: bool) -> DeployOutcome {
        DeployOutcome {
            target: DeployTarget::Netlify,
            success,
            url: success.then(|| "https://acme.netlify.app".to_string()),
            deploy_id: None,
            queued: false,
            error: (!success).then(|| "x".repeat(2000)),
        }
    }

    #[test]
    fn failure_embed_truncates_error() {
        let site = SiteConfig::new("Acme", "acme.test");
        let embed = DiscordNotifier::deploy_embed(&site, &outcome(false));
        assert_eq!(embed.color, COLOR_FAILURE);
        assert!(embed.title.contains("Netlify"));
        let error = embed.fields.iter().find(|f| f.name == "Error").unwrap();
        assert_eq!(error.value.len(), FIELD_LIMIT);
    }

    #[tokio::test]
    async fn posts_one_embed() {
        let received = Arc::new(Mutex::new(Vec::<Value>::new()));
        let sink = received.clone();
        let app = Router::new().route(
            "/webhook",
            post(move |Json(body): Json<Value>| async move {
                sink.lock().unwrap().push(body);
                axum::http::StatusCode::NO_CONTENT
            }),
        );
        let base = mock::serve(app).await;
        let notifier = DiscordNotifier::new(mock::client(), Some(format!("{base}/webhook")));

        let site = SiteConfig::new("Acme", "acme.test");
        notifier.notify_deploy(&site, &outcome(true)).await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["embeds"][0]["url"], "https://acme.netlify.app");
        assert_eq!(received[0]["embeds"][0]["fields"][0]["value"], "Acme");
    }

    #[tokio::test]
    async fn disabled_without_webhook() {
        let notifier = DiscordNotifier::new(mock::client(), None);
        assert!(!notifier.enabled());
        notifier
            .notify_deploy(&SiteConfig::default(), &outcome(true))
            .await
            .unwrap();
    }
}
