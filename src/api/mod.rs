//! Client for the app's own JSON API (`LPF_API_BASE`).
//!
//! Failures never surface as transport errors: every helper returns an
//! [`ApiError`] carrying `{error, detail, url}`.

use std::time::Duration;

use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::errors::ApiError;

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base: String,
}

impl ApiClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    /// Joins `path` onto the base, dropping a leading `/api` from the path
    /// when the base already ends in `/api`.
    pub fn url(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let path = if self.base.ends_with("/api") && (path == "/api" || path.starts_with("/api/")) {
            &path[4..]
        } else {
            path.as_str()
        };
        format!("{}{}", self.base, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None::<&()>).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::DELETE, path, None::<&()>).await
    }

    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(%method, %url, "API request");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ApiError {
            error: if e.is_timeout() { "Request timed out" } else { "Network error" }.to_string(),
            detail: e.to_string(),
            url: url.clone(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ApiError {
            error: "Failed to read response".to_string(),
            detail: e.to_string(),
            url: url.clone(),
        })?;

        if !status.is_success() {
            let parsed: Option<Value> = serde_json::from_str(&text).ok();
            let field = |name: &str| {
                parsed
                    .as_ref()
                    .and_then(|v| v.get(name))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            return Err(ApiError {
                error: field("error").unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
                detail: field("detail")
                    .or_else(|| field("message"))
                    .unwrap_or_else(|| text.chars().take(500).collect()),
                url,
            });
        }

        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| ApiError {
            error: "Invalid JSON response".to_string(),
            detail: e.to_string(),
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::get};
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    #[test]
    fn url_joining_avoids_double_api() {
        let client = ApiClient::new("https://host/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/templates"), "https://host/api/templates");
        assert_eq!(client.url("/api/templates"), "https://host/api/templates");
        assert_eq!(client.url("templates"), "https://host/api/templates");
        assert_eq!(client.url("/apix"), "https://host/api/apix");

        let bare = ApiClient::new("https://host", Duration::from_secs(1)).unwrap();
        assert_eq!(bare.url("/api/templates"), "https://host/api/templates");
    }

    #[tokio::test]
    async fn success_and_error_shapes() {
        let app = Router::new()
            .route("/api/templates", get(|| async { Json(json!([{"id": 1}])) }))
            .route(
                "/api/broken",
                get(|| async { (StatusCode::BAD_REQUEST, Json(json!({"error": "Bad input", "detail": "name missing"}))) }),
            )
            .route("/api/plain", get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }))
            .route("/api/html", get(|| async { "<html>" }));
        let base = serve(app).await;
        let client = ApiClient::new(&base, Duration::from_secs(5)).unwrap();

        let ok: Value = client.get("/templates").await.unwrap();
        assert_eq!(ok[0]["id"], 1);

        let err = client.get::<Value>("/broken").await.unwrap_err();
        assert_eq!(err.error, "Bad input");
        assert_eq!(err.detail, "name missing");
        assert!(err.url.ends_with("/api/broken"));

        let err = client.get::<Value>("/plain").await.unwrap_err();
        assert_eq!(err.error, "HTTP 502");
        assert_eq!(err.detail, "upstream down");

        let err = client.get::<Value>("/html").await.unwrap_err();
        assert_eq!(err.error, "Invalid JSON response");
    }

    #[tokio::test]
    async fn write_verbs_send_json_bodies() {
        use axum::routing::put;

        let app = Router::new().route(
            "/api/templates/7",
            put(|Json(body): Json<Value>| async move { Json(json!({"method": "PUT", "name": body["name"]})) })
                .patch(|Json(body): Json<Value>| async move { Json(json!({"method": "PATCH", "name": body["name"]})) })
                .delete(|| async { StatusCode::NO_CONTENT }),
        );
        let base = serve(app).await;
        let client = ApiClient::new(&base, Duration::from_secs(5)).unwrap();

        let put: Value = client.put("/templates/7", &json!({"name": "a"})).await.unwrap();
        assert_eq!(put, json!({"method": "PUT", "name": "a"}));
        let patched: Value = client.patch("/templates/7", &json!({"name": "b"})).await.unwrap();
        assert_eq!(patched["method"], "PATCH");
        let deleted: Value = client.delete("/templates/7").await.unwrap();
        assert_eq!(deleted, Value::Null);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = client.get::<Value>("/x").await.unwrap_err();
        assert_eq!(err.error, "Network error");
    }
}
