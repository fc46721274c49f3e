//! S3 + CloudFront: a SigV4-signed `PutObject` per file, then an optional
//! CloudFront invalidation of the uploaded paths.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::{Client, Method, Url};
use tracing::{debug, warn};

use super::failure_message;
use super::sigv4::{self, Credentials};
use crate::dispatcher::{DeployContent, DeployTarget, Deployed};
use crate::errors::DeployError;
use crate::models::{Settings, SiteConfig, non_empty};
use crate::traits::Deployer;

const DEFAULT_REGION: &str = "us-east-1";
const CLOUDFRONT_API_VERSION: &str = "2020-05-31";

static INVALIDATION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Id>([^<]+)</Id>").expect("invalidation id pattern"));

pub struct S3Cloudfront {
    client: Client,
    /// Path-style endpoint; `None` means virtual-hosted AWS URLs
    endpoint: Option<String>,
    cloudfront: String,
}

fn content_type(key: &str) -> String {
    let mime = mime_guess::from_path(key).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}

/// CloudFront invalidation request body for `paths`.
pub fn invalidation_batch(caller_reference: &str, paths: &[String]) -> String {
    let items: String = paths.iter().map(|p| format!("<Path>{p}</Path>")).collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<InvalidationBatch xmlns="http://cloudfront.amazonaws.com/doc/{CLOUDFRONT_API_VERSION}/">
  <CallerReference>{caller_reference}</CallerReference>
  <Paths><Quantity>{}</Quantity><Items>{items}</Items></Paths>
</InvalidationBatch>"#,
        paths.len()
    )
}

impl S3Cloudfront {
    pub fn new(client: Client, endpoint: Option<&str>, cloudfront: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            cloudfront: cloudfront.trim_end_matches('/').to_string(),
        }
    }

    pub fn object_url(&self, bucket: &str, region: &str, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{endpoint}/{bucket}/{key}"),
            None => format!("https://{bucket}.s3.{region}.amazonaws.com/{key}"),
        }
    }

    async fn signed(
        &self,
        method: Method,
        url: &str,
        headers: BTreeMap<String, String>,
        body: Vec<u8>,
        credentials: &Credentials<'_>,
    ) -> Result<reqwest::Response, DeployError> {
        let parsed = Url::parse(url).map_err(|e| DeployError::InvalidSettings(format!("Invalid S3 URL {url}: {e}")))?;
        let headers = sigv4::sign(method.as_str(), &parsed, headers, &body, credentials, Utc::now());

        let mut request = self.client.request(method, parsed).body(body);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        Ok(request.send().await?)
    }

    async fn invalidate(&self, distribution: &str, paths: Vec<String>, access_key: &str, secret_key: &str) -> Option<String> {
        let url = format!(
            "{}/{CLOUDFRONT_API_VERSION}/distribution/{distribution}/invalidation",
            self.cloudfront
        );
        let body = invalidation_batch(&format!("lp-{}", Utc::now().timestamp_millis()), &paths);
        let credentials = Credentials {
            access_key,
            secret_key,
            region: DEFAULT_REGION,
            service: "cloudfront",
        };
        let headers = BTreeMap::from([("content-type".to_string(), "application/xml".to_string())]);

        match self.signed(Method::POST, &url, headers, body.into_bytes(), &credentials).await {
            Ok(response) if response.status().is_success() => {
                let text = response.text().await.unwrap_or_default();
                INVALIDATION_ID_RE.captures(&text).map(|c| c[1].to_string())
            }
            Ok(response) => {
                warn!("CloudFront invalidation returned {}", response.status());
                None
            }
            Err(e) => {
                warn!("CloudFront invalidation failed: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl Deployer for S3Cloudfront {
    fn target(&self) -> DeployTarget {
        DeployTarget::S3Cloudfront
    }

    async fn deploy(
        &self,
        content: &DeployContent,
        _site: &SiteConfig,
        settings: &Settings,
    ) -> Result<Deployed, DeployError> {
        let access_key = Settings::secret(&settings.aws_access_key);
        let secret_key = Settings::secret(&settings.aws_secret_key);
        let bucket = settings.s3_bucket.trim();
        if access_key.is_empty() || secret_key.is_empty() || bucket.is_empty() {
            return Err(DeployError::NotConfigured(
                "Missing AWS credentials or S3 bucket. Configure in Settings.".to_string(),
            ));
        }
        let region = non_empty(&settings.aws_region).unwrap_or(DEFAULT_REGION);
        let credentials = Credentials {
            access_key,
            secret_key,
            region,
            service: "s3",
        };

        let files = content.files();
        for (key, body) in &files {
            let headers = BTreeMap::from([
                ("content-type".to_string(), content_type(key)),
                ("cache-control".to_string(), "public, max-age=3600".to_string()),
                ("x-amz-acl".to_string(), "public-read".to_string()),
            ]);
            let url = self.object_url(bucket, region, key);
            debug!("PUT {}", url);

            let response = self
                .signed(Method::PUT, &url, headers, body.clone().into_bytes(), &credentials)
                .await?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                return Err(DeployError::api(
                    "S3 upload",
                    format!("({status}) {key}: {}", failure_message(response).await),
                ));
            }
        }

        let distribution = non_empty(&settings.cloudfront_dist_id);
        let deploy_id = match distribution {
            Some(distribution) => {
                let paths = files.keys().map(|k| format!("/{k}")).collect();
                self.invalidate(distribution, paths, access_key, secret_key).await
            }
            None => None,
        };

        let url = match distribution {
            Some(distribution) => format!("https://{distribution}.cloudfront.net/"),
            None => self.object_url(bucket, region, "index.html"),
        };
        Ok(Deployed::live(
            url,
            deploy_id.or_else(|| Some(format!("s3-{}", Utc::now().timestamp_millis()))),
        ))
    }
}
