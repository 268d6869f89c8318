//! AWS Signature Version 4 query-string presigning, as accepted by MinIO and S3.

use super::{ObjectResult, ObjectStoreError, PresignMethod};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Access key pair
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

/// What to sign
#[derive(Debug, Clone)]
pub struct PresignRequest<'a> {
    pub method: PresignMethod,
    /// `http` or `https`
    pub scheme: &'a str,
    /// Host header value, including a non-default port
    pub host: &'a str,
    /// Unencoded absolute path (`/bucket/key`)
    pub path: &'a str,
    pub region: &'a str,
    pub expires: Duration,
    pub now: DateTime<Utc>,
}

/// Build a presigned URL for `request`
pub fn presign(credentials: &Credentials, request: &PresignRequest<'_>) -> ObjectResult<String> {
    let amz_date = request.now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = request.now.format("%Y%m%d").to_string();
    let scope = format!("{}/{}/{}/aws4_request", date, request.region, SERVICE);
    let credential = format!("{}/{}", credentials.access_key, scope);

    let query = [
        ("X-Amz-Algorithm", ALGORITHM.to_string()),
        ("X-Amz-Credential", credential),
        ("X-Amz-Date", amz_date.clone()),
        ("X-Amz-Expires", request.expires.as_secs().to_string()),
        ("X-Amz-SignedHeaders", "host".to_string()),
    ]
    .iter()
    .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
    .collect::<Vec<_>>()
    .join("&");

    let canonical_uri = encode_path(request.path);

    let canonical_request = format!(
        "{}\n{}\n{}\nhost:{}\n\nhost\n{}",
        request.method.as_str(),
        canonical_uri,
        query,
        request.host,
        UNSIGNED_PAYLOAD
    );

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let signing_key = signing_key(&credentials.secret_key, &date, request.region)?;
    let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes())?);

    Ok(format!(
        "{}://{}{}?{}&X-Amz-Signature={}",
        request.scheme, request.host, canonical_uri, query, signature
    ))
}

/// RFC 3986 encoding of every path segment, keeping the separators
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn signing_key(secret_key: &str, date: &str, region: &str) -> ObjectResult<Vec<u8>> {
    let date_key = hmac(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes())?;
    let region_key = hmac(&date_key, region.as_bytes())?;
    let service_key = hmac(&region_key, SERVICE.as_bytes())?;
    hmac(&service_key, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> ObjectResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| ObjectStoreError::Signing {
        message: format!("Invalid HMAC key: {}", e),
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
