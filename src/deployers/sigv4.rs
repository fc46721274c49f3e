//! AWS Signature Version 4 request signing.
//!
//! HMAC-SHA256 is built directly on `sha2`; headers are kept lower-cased in
//! a `BTreeMap` so canonical ordering falls out of iteration order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::Url;
use sha2::{Digest, Sha256};

const BLOCK_LEN: usize = 64;
const ALGORITHM: &str = "AWS4-HMAC-SHA256";

pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut block = [0u8; BLOCK_LEN];
    if key.len() > BLOCK_LEN {
        block[..32].copy_from_slice(&Sha256::digest(key));
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let mut inner = Sha256::new();
    inner.update(block.map(|b| b ^ 0x36));
    inner.update(message);
    let inner = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(block.map(|b| b ^ 0x5c));
    outer.update(inner);
    outer.finalize().into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// `kSigning` derived from the secret key and credential scope.
pub fn signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> [u8; 32] {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

#[derive(Debug, Clone)]
pub struct Credentials<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
}

/// `Host` header value as the HTTP client will send it.
pub fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<&str> = url.query().unwrap_or_default().split('&').filter(|p| !p.is_empty()).collect();
    pairs.sort_unstable();
    pairs
        .into_iter()
        .map(|pair| if pair.contains('=') { pair.to_string() } else { format!("{pair}=") })
        .collect::<Vec<_>>()
        .join("&")
}

/// Canonical request and its signed-headers list. `headers` must have
/// lower-case names.
pub fn canonical_request(
    method: &str,
    url: &Url,
    headers: &BTreeMap<String, String>,
    payload_hash: &str,
) -> (String, String) {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect();
    let signed_headers = headers.keys().map(String::as_str).collect::<Vec<_>>().join(";");
    let path = if url.path().is_empty() { "/" } else { url.path() };

    let request = [
        method,
        path,
        &canonical_query(url),
        &canonical_headers,
        &signed_headers,
        payload_hash,
    ]
    .join("\n");
    (request, signed_headers)
}

/// `Authorization` header for an already canonicalised request.
pub fn authorization(
    credentials: &Credentials<'_>,
    amz_date: &str,
    canonical_request: &str,
    signed_headers: &str,
) -> String {
    let date_stamp = &amz_date[..8];
    let scope = format!(
        "{date_stamp}/{}/{}/aws4_request",
        credentials.region, credentials.service
    );
    let string_to_sign = [
        ALGORITHM,
        amz_date,
        &scope,
        &sha256_hex(canonical_request.as_bytes()),
    ]
    .join("\n");

    let key = signing_key(credentials.secret_key, date_stamp, credentials.region, credentials.service);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        credentials.access_key
    )
}

/// Adds `x-amz-date`, `x-amz-content-sha256` and `authorization` to
/// `headers`. The `host` header is signed but left out of the returned map;
/// the HTTP client sets it from the URL.
pub fn sign(
    method: &str,
    url: &Url,
    mut headers: BTreeMap<String, String>,
    body: &[u8],
    credentials: &Credentials<'_>,
    now: DateTime<Utc>,
) -> BTreeMap<String, String> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = sha256_hex(body);

    headers = headers.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect();
    headers.insert("x-amz-date".to_string(), amz_date.clone());
    headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
    headers.insert("host".to_string(), host_header(url));

    let (request, signed_headers) = canonical_request(method, url, &headers, &payload_hash);
    let auth = authorization(credentials, &amz_date, &request, &signed_headers);

    headers.remove("host");
    headers.insert("authorization".to_string(), auth);
    headers
}
