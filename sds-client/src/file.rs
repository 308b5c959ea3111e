//! File provider: bucket and file listings backed by S3-compatible object
//! storage.
//!
//! Listings run under the static service credentials; policy changes run
//! under the project's own credentials, which is what makes the grant
//! meaningful — the project allows this service to read the bucket.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use sds_core::config::S3Config;
use sds_core::AppError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error};
use url::Url;

use crate::keystone::Ec2Credentials;

/// Metadata of one object in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketFile {
    pub path: String,
    pub bytes: i64,
}

/// Capability consumed by the publication orchestrator and the bucket
/// handlers.
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Buckets visible to the given project credentials.
    async fn list_buckets(&self, credentials: &Ec2Credentials) -> Result<Vec<String>, AppError>;

    /// Files in a bucket; a bucket without the read policy is a user error
    /// and an empty bucket is NotFound.
    async fn list_files(&self, bucket: &str) -> Result<Vec<BucketFile>, AppError>;

    /// Size of a file, or `None` when it does not exist.
    async fn verify_file(&self, bucket: &str, path: &str) -> Result<Option<i64>, AppError>;

    /// Attach the read policy that lets this service list the bucket.
    async fn grant_read_policy(
        &self,
        bucket: &str,
        credentials: &Ec2Credentials,
    ) -> Result<(), AppError>;

    /// Whether the read policy is in place.
    async fn verify_read_policy(&self, bucket: &str) -> Result<bool, AppError>;
}

// SigV4 signing
//

type HmacSha256 = Hmac<Sha256>;

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn uri_encode(value: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// AWS Signature Version 4 headers for one request.
fn sign_request(
    method: &Method,
    url: &Url,
    region: &str,
    credentials: (&str, &str),
    payload: &[u8],
) -> Vec<(String, String)> {
    let (access_key, secret_key) = credentials;
    let now = Utc::now();
    let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let payload_hash = sha256_hex(payload);

    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    };

    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    query.sort();
    let canonical_query = query
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
        .collect::<Vec<_>>()
        .join("&");

    let canonical_headers = format!(
        "host:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{timestamp}\n"
    );
    let signed_headers = "host;x-amz-content-sha256;x-amz-date";

    // The url crate already percent-encodes the path; signing it again
    // would double-encode.
    let canonical_request = format!(
        "{method}\n{path}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
        path = url.path(),
    );

    let scope = format!("{date}/{region}/s3/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{timestamp}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let key = hmac(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let key = hmac(&key, region.as_bytes());
    let key = hmac(&key, b"s3");
    let key = hmac(&key, b"aws4_request");
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

    vec![
        ("x-amz-date".into(), timestamp),
        ("x-amz-content-sha256".into(), payload_hash),
        (
            "Authorization".into(),
            format!(
                "AWS4-HMAC-SHA256 Credential={access_key}/{scope}, \
                 SignedHeaders={signed_headers}, Signature={signature}"
            ),
        ),
    ]
}

// Provider implementation
//

pub struct S3FileProvider {
    config: S3Config,
    http: Client,
}

impl S3FileProvider {
    pub fn new(config: S3Config) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.config.endpoint)
            .map_err(|e| AppError::Config(format!("Invalid S3_ENDPOINT: {e}")))?;
        url.set_path(path);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        credentials: (&str, &str),
        body: Option<String>,
    ) -> Result<reqwest::Response, AppError> {
        let payload = body.clone().unwrap_or_default();
        let headers = sign_request(
            &method,
            &url,
            &self.config.region,
            credentials,
            payload.as_bytes(),
        );
        let mut request = self.http.request(method, url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        request.send().await.map_err(|e| {
            error!(error = %e, "object storage request failed");
            AppError::UpstreamServer("s3 error: Could not reach object storage.".into())
        })
    }

    fn static_credentials(&self) -> (&str, &str) {
        (
            self.config.access_key_id.as_str(),
            self.config.secret_access_key.as_str(),
        )
    }
}

fn parse_xml(body: &str) -> Result<roxmltree::Document<'_>, AppError> {
    roxmltree::Document::parse(body)
        .map_err(|e| AppError::UpstreamServer(format!("s3 error: Invalid XML response: {e}")))
}

#[async_trait]
impl FileProvider for S3FileProvider {
    async fn list_buckets(&self, credentials: &Ec2Credentials) -> Result<Vec<String>, AppError> {
        let url = self.endpoint("/", &[])?;
        let resp = self
            .execute(
                Method::GET,
                url,
                (&credentials.access, &credentials.secret),
                None,
            )
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::User(format!(
                "Failed to list buckets: {}",
                resp.status()
            )));
        }
        let body = resp.text().await.unwrap_or_default();
        let doc = parse_xml(&body)?;
        let buckets: Vec<String> = doc
            .descendants()
            .filter(|n| n.has_tag_name("Bucket"))
            .filter_map(|bucket| {
                bucket
                    .children()
                    .find(|c| c.has_tag_name("Name"))
                    .and_then(|n| n.text())
                    .map(str::to_string)
            })
            .collect();
        if buckets.is_empty() {
            return Err(AppError::NotFound("No buckets found.".into()));
        }
        Ok(buckets)
    }

    async fn list_files(&self, bucket: &str) -> Result<Vec<BucketFile>, AppError> {
        if !self.verify_read_policy(bucket).await? {
            return Err(AppError::User(format!(
                "Bucket {bucket} is not accessible in project {}.",
                self.config.project_id
            )));
        }

        let mut files = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut query = vec![("list-type", "2")];
            if let Some(token) = &continuation {
                query.push(("continuation-token", token));
            }
            let url = self.endpoint(&format!("/{bucket}"), &query)?;
            let resp = self
                .execute(Method::GET, url, self.static_credentials(), None)
                .await?;
            if !resp.status().is_success() {
                return Err(AppError::UpstreamServer(format!(
                    "s3 error: Listing '{bucket}' failed with {}",
                    resp.status()
                )));
            }
            let body = resp.text().await.unwrap_or_default();
            let doc = parse_xml(&body)?;
            for contents in doc.descendants().filter(|n| n.has_tag_name("Contents")) {
                let key = contents
                    .children()
                    .find(|c| c.has_tag_name("Key"))
                    .and_then(|n| n.text());
                let size = contents
                    .children()
                    .find(|c| c.has_tag_name("Size"))
                    .and_then(|n| n.text())
                    .and_then(|s| s.parse::<i64>().ok());
                if let (Some(key), Some(size)) = (key, size) {
                    files.push(BucketFile {
                        path: key.to_string(),
                        bytes: size,
                    });
                }
            }
            continuation = doc
                .descendants()
                .find(|n| n.has_tag_name("NextContinuationToken"))
                .and_then(|n| n.text())
                .map(str::to_string);
            if continuation.is_none() {
                break;
            }
        }

        if files.is_empty() {
            return Err(AppError::NotFound(format!("No files found in '{bucket}'.")));
        }
        debug!(%bucket, count = files.len(), "listed bucket files");
        Ok(files)
    }

    async fn verify_file(&self, bucket: &str, path: &str) -> Result<Option<i64>, AppError> {
        let url = self.endpoint(&format!("/{bucket}/{path}"), &[])?;
        let resp = self
            .execute(Method::HEAD, url, self.static_credentials(), None)
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(AppError::UpstreamServer(format!(
                "s3 error: HEAD '{bucket}/{path}' failed with {}",
                resp.status()
            )));
        }
        Ok(resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok()))
    }

    async fn grant_read_policy(
        &self,
        bucket: &str,
        credentials: &Ec2Credentials,
    ) -> Result<(), AppError> {
        let policy = serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Sid": "sd-submit-read",
                "Effect": "Allow",
                "Principal": {"AWS": [format!("arn:aws:iam:::user/{}", self.config.project_id)]},
                "Action": ["s3:GetObject", "s3:ListBucket"],
                "Resource": [
                    format!("arn:aws:s3:::{bucket}"),
                    format!("arn:aws:s3:::{bucket}/*"),
                ],
            }],
        });
        let url = self.endpoint(&format!("/{bucket}"), &[("policy", "")])?;
        let resp = self
            .execute(
                Method::PUT,
                url,
                (&credentials.access, &credentials.secret),
                Some(policy.to_string()),
            )
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::User(format!(
                "Failed to update the policy of bucket '{bucket}': {}",
                resp.status()
            )));
        }
        debug!(%bucket, "read policy granted");
        Ok(())
    }

    async fn verify_read_policy(&self, bucket: &str) -> Result<bool, AppError> {
        let url = self.endpoint(&format!("/{bucket}"), &[("list-type", "2"), ("max-keys", "1")])?;
        let resp = self
            .execute(Method::GET, url, self.static_credentials(), None)
            .await?;
        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(false),
            status => Err(AppError::UpstreamServer(format!(
                "s3 error: Policy check on '{bucket}' failed with {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_encoding_rules() {
        assert_eq!(uri_encode("a b/c", false), "a%20b/c");
        assert_eq!(uri_encode("a b/c", true), "a%20b%2Fc");
        assert_eq!(uri_encode("unreserved-._~09AZaz", true), "unreserved-._~09AZaz");
    }

    #[test]
    fn signature_headers_are_complete() {
        let url = Url::parse("https://object.example:9000/bucket?list-type=2&max-keys=1").unwrap();
        let headers = sign_request(&Method::GET, &url, "regionOne", ("AK", "SK"), b"");
        let names: Vec<&str> = headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["x-amz-date", "x-amz-content-sha256", "Authorization"]);
        let authorization = &headers[2].1;
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AK/"));
        assert!(authorization.contains("/regionOne/s3/aws4_request"));
        assert!(authorization.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
    }

    #[test]
    fn list_objects_xml_parses() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
                <Name>bucket</Name>
                <Contents><Key>data/a.c4gh</Key><Size>42</Size></Contents>
                <Contents><Key>data/b.c4gh</Key><Size>7</Size></Contents>
            </ListBucketResult>"#;
        let doc = parse_xml(xml).unwrap();
        let keys: Vec<&str> = doc
            .descendants()
            .filter(|n| n.has_tag_name("Key"))
            .filter_map(|n| n.text())
            .collect();
        assert_eq!(keys, ["data/a.c4gh", "data/b.c4gh"]);
    }
}
