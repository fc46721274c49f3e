//! Data models for landing page configuration, deploy bookkeeping and
//! Discord webhook payloads

pub mod design;
pub mod settings;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

pub use settings::Settings;

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9][a-z0-9-]{0,61}[a-z0-9]$")
        .expect("domain pattern")
});

static EMBED_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(script|div|iframe)").expect("embed pattern"));

/// Generated file map: relative path to text content.
pub type FileMap = BTreeMap<String, String>;

/// One landing page being built.
///
/// Serialised in the camelCase shape the dashboard stored, so exported site
/// JSON can be loaded as-is. Empty strings mean "unset" everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteConfig {
    pub id: String,

    pub brand: String,
    pub domain: String,
    pub tagline: String,
    pub email: String,

    pub template_id: Option<String>,

    pub color_id: String,
    pub font_id: String,
    pub radius: String,
    pub layout: String,
    pub trust_badge_style: String,
    pub trust_badge_icon_tone: String,

    pub loan_type: String,
    #[serde(serialize_with = "serialize_amount")]
    pub amount_min: f64,
    #[serde(serialize_with = "serialize_amount")]
    pub amount_max: f64,
    pub apr_min: f64,
    pub apr_max: f64,

    pub h1: String,
    pub badge: String,
    pub cta: String,
    pub sub: String,

    pub conversion_id: String,
    pub form_start_label: String,
    pub form_submit_label: String,
    pub gtm_id: String,
    pub voluum_id: String,
    pub voluum_domain: String,
    pub aid: String,
    pub network: String,
    pub redirect_url: String,
    pub form_embed: String,

    pub favicon_data_url: String,
    pub og_image_data_url: String,

    pub noindex: bool,
    pub lang: String,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            brand: String::new(),
            domain: String::new(),
            tagline: String::new(),
            email: String::new(),
            template_id: None,
            color_id: "ocean".to_string(),
            font_id: "dm-sans".to_string(),
            radius: "rounded".to_string(),
            layout: "hero-left".to_string(),
            trust_badge_style: "both".to_string(),
            trust_badge_icon_tone: "primary".to_string(),
            loan_type: "personal".to_string(),
            amount_min: 100.0,
            amount_max: 5000.0,
            apr_min: 5.99,
            apr_max: 35.99,
            h1: String::new(),
            badge: String::new(),
            cta: String::new(),
            sub: String::new(),
            conversion_id: String::new(),
            form_start_label: String::new(),
            form_submit_label: String::new(),
            gtm_id: String::new(),
            voluum_id: String::new(),
            voluum_domain: String::new(),
            aid: "14881".to_string(),
            network: "LeadsGate".to_string(),
            redirect_url: String::new(),
            form_embed: String::new(),
            favicon_data_url: String::new(),
            og_image_data_url: String::new(),
            noindex: false,
            lang: "English".to_string(),
            created_at: None,
            updated_at: None,
        }
    }
}

impl SiteConfig {
    /// A fresh site with a new id and creation timestamp.
    pub fn new(brand: &str, domain: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uid(),
            brand: brand.to_string(),
            domain: domain.to_string(),
            created_at: Some(now),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Checks the wizard rules. Returns one message per violation; an empty
    /// list means the site can be saved and deployed.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.brand.trim().is_empty() {
            errors.push("Brand Name is required".to_string());
        }
        let domain = self.domain.trim();
        if domain.is_empty() {
            errors.push("Domain is required".to_string());
        } else if !DOMAIN_RE.is_match(domain) {
            errors.push("Invalid domain format (e.g., example.com)".to_string());
        }

        if self.loan_type.trim().is_empty() {
            errors.push("Loan Type is required".to_string());
        }
        if self.amount_min < 0.0 {
            errors.push("Min Amount cannot be negative".to_string());
        }
        if self.amount_max < 0.0 {
            errors.push("Max Amount cannot be negative".to_string());
        }
        if self.amount_min >= self.amount_max {
            errors.push("Min Amount must be less than Max Amount".to_string());
        }
        if self.apr_min < 0.0 {
            errors.push("Min APR cannot be negative".to_string());
        }
        if self.apr_max < 0.0 {
            errors.push("Max APR cannot be negative".to_string());
        }
        if self.apr_min >= self.apr_max {
            errors.push("Min APR must be less than Max APR".to_string());
        }

        if self.color_id.trim().is_empty() {
            errors.push("Color Scheme is required".to_string());
        }

        let redirect = self.redirect_url.trim();
        let embed = self.form_embed.trim();
        if redirect.is_empty() && embed.is_empty() && self.aid.trim().is_empty() {
            errors.push(
                "At least one destination required: Redirect URL, Form Embed or AID".to_string(),
            );
        }
        if !redirect.is_empty() && reqwest::Url::parse(redirect).is_err() {
            errors.push("Redirect URL must be a valid URL (e.g., https://example.com)".to_string());
        }
        if !embed.is_empty() && !EMBED_TAG_RE.is_match(embed) {
            errors.push("Form Embed should contain <script>, <div>, or <iframe> tags".to_string());
        }

        errors
    }

    /// Hostname-safe slug from the domain (or brand), used for provider
    /// project names. Every character outside `[a-z0-9]` becomes one `-` per
    /// UTF-16 unit, so names match the ones the dashboard already created.
    pub fn slug(&self, max_len: usize) -> String {
        let source = [self.domain.as_str(), self.brand.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or("lp");
        let mut slug = String::with_capacity(source.len());
        for ch in source.to_lowercase().chars() {
            if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
                slug.push(ch);
            } else {
                slug.extend(std::iter::repeat_n('-', ch.len_utf16()));
            }
        }
        slug.truncate(max_len);
        slug
    }

    /// [`slug`](Self::slug) with runs of `-` collapsed, as Cloudflare names use.
    pub fn compact_slug(&self, max_len: usize) -> String {
        let mut slug = String::new();
        for ch in self.slug(usize::MAX).chars() {
            if ch == '-' && slug.ends_with('-') {
                continue;
            }
            slug.push(ch);
        }
        slug.truncate(max_len);
        slug
    }

    /// Midpoint of the amount range, rounded to a whole number.
    pub fn amount_mid(&self) -> f64 {
        (self.amount_min / 2.0 + self.amount_max / 2.0).round()
    }

    /// First `n` characters of the id, `x` when the site has none.
    pub fn short_id(&self, n: usize) -> String {
        let id = if self.id.is_empty() { "x" } else { self.id.as_str() };
        id.chars().take(n).collect()
    }

    /// Label to show in logs and notifications.
    pub fn display_name(&self) -> &str {
        non_empty(&self.brand)
            .or_else(|| non_empty(&self.domain))
            .unwrap_or("LP")
    }
}

/// JSON number for a money amount: whole amounts stay integers (`5000`, not
/// `5000.0`).
pub fn amount_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn serialize_amount<S: Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    amount_value(*n).serialize(serializer)
}

/// Returns `Some` for strings with visible content.
pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Short opaque id: 16 hex characters of a v4 UUID.
pub fn uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// Where and when a site was last published on one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployMark {
    pub url: String,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
}

/// site id -> target id -> last deploy.
pub type DeployUrls = BTreeMap<String, BTreeMap<String, DeployMark>>;

/// Reads a stored deploy URL map, accepting both the current per-target
/// shape and the legacy shape where each site mapped to a bare Netlify URL.
pub fn migrate_deploy_urls(stored: &Value) -> DeployUrls {
    let mut migrated = DeployUrls::new();
    let Some(sites) = stored.as_object() else {
        return migrated;
    };

    for (site_id, value) in sites {
        let mut targets = BTreeMap::new();
        match value {
            Value::String(url) => {
                targets.insert(
                    "netlify".to_string(),
                    DeployMark {
                        url: url.clone(),
                        ts: None,
                    },
                );
            }
            Value::Object(per_target) => {
                for (target, entry) in per_target {
                    let mark = match entry {
                        Value::String(url) => Some(DeployMark {
                            url: url.clone(),
                            ts: None,
                        }),
                        other => serde_json::from_value::<DeployMark>(other.clone()).ok(),
                    };
                    if let Some(mark) = mark {
                        targets.insert(target.clone(), mark);
                    }
                }
            }
            _ => continue,
        }
        migrated.insert(site_id.clone(), targets);
    }

    migrated
}

/// One row of deploy history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRecord {
    pub id: String,
    pub site_id: String,
    pub target: String,
    pub url: String,
    pub status: String,
    pub brand: String,
    pub created_at: DateTime<Utc>,
}

/// Discord embed structure for rich notifications
#[derive(Debug, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    pub timestamp: String,
    pub fields: Vec<DiscordField>,
}

/// Key-value field for Discord embeds
#[derive(Debug, Serialize)]
pub struct DiscordField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Discord webhook message payload
#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    pub embeds: Vec<DiscordEmbed>,
}
