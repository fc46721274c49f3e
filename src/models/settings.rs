//! Provider credentials and ids.
//!
//! Stored as individual rows of the `settings` table (camelCase keys, the
//! names the dashboard used) and overlaid on `LPF_*` environment variables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub cf_api_token: String,
    pub cf_account_id: String,

    pub netlify_token: String,

    pub vercel_token: String,
    pub vercel_team_id: String,

    pub aws_access_key: String,
    pub aws_secret_key: String,
    pub aws_region: String,
    pub s3_bucket: String,
    pub cloudfront_dist_id: String,

    pub vps_host: String,
    pub vps_user: String,
    pub vps_path: String,
    pub vps_port: Option<u16>,
    pub vps_auth_method: String,
    pub vps_key: String,
    pub vps_worker_url: String,

    pub github_token: String,
    pub github_repo_owner: String,
    pub github_repo_name: String,
    pub github_repo_branch: String,
    pub github_deploy_workflow: String,

    pub user_email: String,
}

/// Environment variable for each settings key.
const ENV_KEYS: &[(&str, &str)] = &[
    ("cfApiToken", "LPF_CF_API_TOKEN"),
    ("cfAccountId", "LPF_CF_ACCOUNT_ID"),
    ("netlifyToken", "LPF_NETLIFY_TOKEN"),
    ("vercelToken", "LPF_VERCEL_TOKEN"),
    ("vercelTeamId", "LPF_VERCEL_TEAM_ID"),
    ("awsAccessKey", "LPF_AWS_ACCESS_KEY"),
    ("awsSecretKey", "LPF_AWS_SECRET_KEY"),
    ("awsRegion", "LPF_AWS_REGION"),
    ("s3Bucket", "LPF_S3_BUCKET"),
    ("cloudfrontDistId", "LPF_CLOUDFRONT_DIST_ID"),
    ("vpsHost", "LPF_VPS_HOST"),
    ("vpsUser", "LPF_VPS_USER"),
    ("vpsPath", "LPF_VPS_PATH"),
    ("vpsAuthMethod", "LPF_VPS_AUTH_METHOD"),
    ("vpsKey", "LPF_VPS_KEY"),
    ("vpsWorkerUrl", "LPF_VPS_WORKER_URL"),
    ("githubToken", "LPF_GITHUB_TOKEN"),
    ("githubRepoOwner", "LPF_GITHUB_REPO_OWNER"),
    ("githubRepoName", "LPF_GITHUB_REPO_NAME"),
    ("githubRepoBranch", "LPF_GITHUB_REPO_BRANCH"),
    ("githubDeployWorkflow", "LPF_GITHUB_DEPLOY_WORKFLOW"),
    ("userEmail", "LPF_USER_EMAIL"),
];

impl Settings {
    /// Settings taken from `LPF_*` environment variables only.
    pub fn from_env() -> Self {
        let mut map = serde_json::Map::new();
        for (key, var) in ENV_KEYS {
            if let Ok(value) = std::env::var(var) {
                map.insert((*key).to_string(), Value::String(value));
            }
        }
        if let Some(port) = std::env::var("LPF_VPS_PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            map.insert("vpsPort".to_string(), Value::from(port));
        }
        serde_json::from_value(Value::Object(map)).unwrap_or_default()
    }

    /// Builds settings from stored key/value rows. Unknown keys are ignored
    /// and values of the wrong type fall back to defaults.
    pub fn from_rows(rows: &BTreeMap<String, Value>) -> Self {
        let map: serde_json::Map<String, Value> =
            rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        serde_json::from_value(Value::Object(map)).unwrap_or_default()
    }

    /// Flattens into key/value rows for storage.
    pub fn to_rows(&self) -> BTreeMap<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Overlays every non-empty field of `other` onto `self`.
    pub fn merge(mut self, other: &Settings) -> Self {
        let mut base = self.to_rows();
        for (key, value) in other.to_rows() {
            let present = match &value {
                Value::String(s) => !s.trim().is_empty(),
                Value::Null => false,
                _ => true,
            };
            if present {
                base.insert(key, value);
            }
        }
        self = Self::from_rows(&base);
        self
    }

    /// Trimmed secret value; masked placeholders (`••••`, `****`) read as
    /// unset.
    pub fn secret(value: &str) -> &str {
        let trimmed = value.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c == '•' || c == '*') {
            ""
        } else {
            trimmed
        }
    }

    /// Copy with every credential replaced by a mask, for display.
    pub fn masked(&self) -> Self {
        let mut rows = self.to_rows();
        for (key, value) in rows.iter_mut() {
            let sensitive = key.ends_with("Token") || key.ends_with("Key");
            if let Value::String(s) = value
                && sensitive
                && !s.is_empty()
            {
                *s = "••••".to_string();
            }
        }
        Self::from_rows(&rows)
    }
}
