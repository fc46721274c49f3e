use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Settings;

/// The seven hosting providers a site can be published to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum DeployTarget {
    CfPages,
    CfWorkers,
    Netlify,
    Vercel,
    #[value(name = "s3-cloudfront")]
    S3Cloudfront,
    VpsSsh,
    GitPush,
}

impl DeployTarget {
    pub const ALL: [DeployTarget; 7] = [
        DeployTarget::CfPages,
        DeployTarget::CfWorkers,
        DeployTarget::Netlify,
        DeployTarget::Vercel,
        DeployTarget::S3Cloudfront,
        DeployTarget::VpsSsh,
        DeployTarget::GitPush,
    ];

    pub fn id(self) -> &'static str {
        match self {
            DeployTarget::CfPages => "cf-pages",
            DeployTarget::CfWorkers => "cf-workers",
            DeployTarget::Netlify => "netlify",
            DeployTarget::Vercel => "vercel",
            DeployTarget::S3Cloudfront => "s3-cloudfront",
            DeployTarget::VpsSsh => "vps-ssh",
            DeployTarget::GitPush => "git-push",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeployTarget::CfPages => "Cloudflare Pages",
            DeployTarget::CfWorkers => "CF Workers Sites",
            DeployTarget::Netlify => "Netlify",
            DeployTarget::Vercel => "Vercel",
            DeployTarget::S3Cloudfront => "S3 + CloudFront",
            DeployTarget::VpsSsh => "VPS (SSH)",
            DeployTarget::GitPush => "Git Push",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            DeployTarget::CfPages => "☁️",
            DeployTarget::CfWorkers => "⚡",
            DeployTarget::Netlify => "🔺",
            DeployTarget::Vercel => "▲",
            DeployTarget::S3Cloudfront => "🪣",
            DeployTarget::VpsSsh => "🖥️",
            DeployTarget::GitPush => "🐙",
        }
    }

    /// Lower is preferred.
    pub fn priority(self) -> u8 {
        match self {
            DeployTarget::CfPages => 1,
            DeployTarget::Netlify => 2,
            DeployTarget::Vercel => 3,
            DeployTarget::CfWorkers => 4,
            DeployTarget::S3Cloudfront => 5,
            DeployTarget::VpsSsh => 6,
            DeployTarget::GitPush => 7,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DeployTarget::CfPages => "Primary: fast, free, CF integration",
            DeployTarget::CfWorkers => "Edge logic: A/B test, geo-redirect",
            DeployTarget::Netlify => "Backup: diversify footprint",
            DeployTarget::Vercel => "Reliable standard static hosting",
            DeployTarget::S3Cloudfront => "AWS: US-focused, low latency",
            DeployTarget::VpsSsh => "Self-managed server, full control",
            DeployTarget::GitPush => "Commit to GitHub and build with Actions",
        }
    }

    /// Settings keys that must hold a value before a deploy is attempted.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            DeployTarget::CfPages | DeployTarget::CfWorkers => &["cfApiToken", "cfAccountId"],
            DeployTarget::Netlify => &["netlifyToken"],
            DeployTarget::Vercel => &["vercelToken"],
            DeployTarget::S3Cloudfront => &["awsAccessKey", "awsSecretKey", "s3Bucket"],
            DeployTarget::VpsSsh => &["vpsHost", "vpsUser", "vpsPath"],
            DeployTarget::GitPush => &["githubRepoOwner", "githubRepoName"],
        }
    }

    /// Required fields that are empty or masked in `settings`.
    pub fn missing_fields(self, settings: &Settings) -> Vec<&'static str> {
        let rows = settings.to_rows();
        self.required_fields()
            .iter()
            .copied()
            .filter(|key| match rows.get(*key) {
                Some(Value::String(s)) => Settings::secret(s).is_empty(),
                Some(Value::Null) | None => true,
                Some(_) => false,
            })
            .collect()
    }

    pub fn configured(self, settings: &Settings) -> bool {
        self.missing_fields(settings).is_empty()
    }

    /// Every target sorted by priority.
    pub fn by_priority() -> Vec<DeployTarget> {
        let mut all = Self::ALL.to_vec();
        all.sort_by_key(|t| t.priority());
        all
    }
}

impl fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.id())
    }
}

impl FromStr for DeployTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.id() == s.trim())
            .ok_or_else(|| format!("Unknown deploy target: {s}"))
    }
}

/// Target descriptor as listed to the user.
#[derive(Debug, Clone, Serialize)]
pub struct TargetInfo {
    pub id: DeployTarget,
    pub label: &'static str,
    pub icon: &'static str,
    pub priority: u8,
    pub description: &'static str,
    pub configured: bool,
    pub missing: Vec<&'static str>,
}

/// All targets with their configuration state, by priority.
pub fn available_targets(settings: &Settings) -> Vec<TargetInfo> {
    DeployTarget::by_priority()
        .into_iter()
        .map(|t| {
            let missing = t.missing_fields(settings);
            TargetInfo {
                id: t,
                label: t.label(),
                icon: t.icon(),
                priority: t.priority(),
                description: t.description(),
                configured: missing.is_empty(),
                missing,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_serde_and_from_str() {
        for target in DeployTarget::ALL {
            let json = serde_json::to_value(target).unwrap();
            assert_eq!(json, target.id());
            assert_eq!(target.id().parse::<DeployTarget>().unwrap(), target);
        }
        assert!("ftp".parse::<DeployTarget>().is_err());
    }

    #[test]
    fn configured_needs_every_required_field() {
        let mut settings = Settings {
            cf_api_token: "tok".to_string(),
            ..Settings::default()
        };
        assert!(!DeployTarget::CfPages.configured(&settings));
        assert_eq!(DeployTarget::CfPages.missing_fields(&settings), ["cfAccountId"]);

        settings.cf_account_id = "0123456789abcdef0123456789abcdef".to_string();
        assert!(DeployTarget::CfPages.configured(&settings));
        assert!(DeployTarget::CfWorkers.configured(&settings));
        assert!(!DeployTarget::Netlify.configured(&settings));
    }

    #[test]
    fn masked_token_is_not_configured() {
        let settings = Settings {
            netlify_token: "••••".to_string(),
            ..Settings::default()
        };
        assert!(!DeployTarget::Netlify.configured(&settings));
    }

    #[test]
    fn listing_is_priority_ordered() {
        let listed = available_targets(&Settings::default());
        let priorities: Vec<_> = listed.iter().map(|t| t.priority).collect();
        assert_eq!(priorities, [1, 2, 3, 4, 5, 6, 7]);
        assert!(listed.iter().all(|t| !t.configured));
    }
}
