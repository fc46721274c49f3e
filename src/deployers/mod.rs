//! Provider deployers, one module per hosting target, plus the response
//! helpers they share.

pub mod cf_pages;
pub mod cf_workers;
pub mod git_push;
pub mod netlify;
pub mod s3;
pub mod sigv4;
pub mod vercel;
pub mod vps;

use std::sync::LazyLock;

use regex::Regex;
use reqwest::{Response, StatusCode};
use serde_json::Value;

use crate::errors::DeployError;
use crate::models::{Settings, SiteConfig};

static ACCOUNT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[0-9a-f]{32}$").expect("account id pattern"));

/// Most specific error text a provider response offers: Cloudflare's
/// `errors[0].message`, Vercel's `error.message`, a bare `error` or
/// `message`, else the start of the body, else the status code.
pub(crate) fn message_from_body(status: StatusCode, text: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(text) {
        let found = json
            .pointer("/errors/0/message")
            .or_else(|| json.pointer("/error/message"))
            .or_else(|| json.get("error"))
            .or_else(|| json.get("message"))
            .and_then(Value::as_str);
        return match found {
            Some(message) => message.to_string(),
            None => format!("HTTP {}", status.as_u16()),
        };
    }
    let snippet: String = text.trim().chars().take(200).collect();
    if snippet.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        snippet
    }
}

/// Consumes a failed response into its error text.
pub(crate) async fn failure_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    message_from_body(status, &text)
}

/// JSON body, or `Null` when there is none.
pub(crate) async fn json_body(response: Response) -> Value {
    response.json().await.unwrap_or(Value::Null)
}

pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Cloudflare token and account id, the latter checked for shape.
pub(crate) fn cloudflare_credentials(settings: &Settings) -> Result<(&str, &str), DeployError> {
    let token = Settings::secret(&settings.cf_api_token);
    let account = settings.cf_account_id.trim();
    if token.is_empty() || account.is_empty() {
        return Err(DeployError::NotConfigured(
            "Missing Cloudflare API Token or Account ID. Configure in Settings.".to_string(),
        ));
    }
    if !ACCOUNT_ID_RE.is_match(account) {
        return Err(DeployError::InvalidSettings(format!(
            "Invalid Account ID: must be exactly 32 hex characters (got {}). Check Settings.",
            account.chars().count()
        )));
    }
    Ok((token, account))
}

/// `{slug}-{id}` name used for Netlify sites and Vercel projects.
pub(crate) fn short_project_name(site: &SiteConfig) -> String {
    format!("{}-{}", site.slug(40), site.short_id(4))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_prefers_structured_messages() {
        let cf = r#"{"success":false,"errors":[{"code":8000007,"message":"Project not found"}]}"#;
        assert_eq!(message_from_body(StatusCode::NOT_FOUND, cf), "Project not found");

        let vercel = r#"{"error":{"code":"forbidden","message":"Not authorized"}}"#;
        assert_eq!(message_from_body(StatusCode::FORBIDDEN, vercel), "Not authorized");

        assert_eq!(message_from_body(StatusCode::BAD_REQUEST, r#"{"error":"bad"}"#), "bad");
        assert_eq!(message_from_body(StatusCode::BAD_REQUEST, "{}"), "HTTP 400");
        assert_eq!(message_from_body(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
        assert_eq!(message_from_body(StatusCode::BAD_GATEWAY, "upstream"), "upstream");
    }

    #[test]
    fn cloudflare_account_id_must_be_hex() {
        let mut settings = Settings {
            cf_api_token: "tok".to_string(),
            cf_account_id: "abc".to_string(),
            ..Settings::default()
        };
        let err = cloudflare_credentials(&settings).unwrap_err();
        assert!(err.to_string().contains("got 3"));

        settings.cf_account_id = "0123456789ABCDEF0123456789abcdef".to_string();
        assert!(cloudflare_credentials(&settings).is_ok());

        settings.cf_api_token = "••••".to_string();
        assert!(matches!(cloudflare_credentials(&settings), Err(DeployError::NotConfigured(_))));
    }

    #[test]
    fn netlify_and_vercel_names_keep_repeated_dashes() {
        let site = SiteConfig {
            id: "ab12cd34".to_string(),
            domain: "fast -- cash.com".to_string(),
            ..SiteConfig::default()
        };
        assert_eq!(short_project_name(&site), "fast----cash-com-ab12");
        assert_eq!(cf_pages::project_name(&site), "lp-fast-cash-com-ab12cd");
        assert_eq!(cf_workers::script_name(&site), "lp-worker-fast-cash-com-ab12cd");
    }
}
