//! S3-compatible object storage backend.
//!
//! Grounded on `original_source/backends/s3.py`: authenticates via
//! access/secret/region/bucket, sets a long `Cache-Control` header on
//! store, and validates credentials with a disposable write-read-delete
//! probe (provided generically by [`BlobBackend::test_credentials`]).
//!
//! No AWS SDK crate is used here — none of the retrieved example repos
//! pull one in for S3 object access (only an optional DynamoDB client, for
//! an unrelated concern), so a full SDK dependency would be an invention
//! rather than something learned from the corpus. Instead requests are
//! signed with AWS Signature Version 4 by hand, using `hmac`/`sha2` (the
//! same signing primitives `adk-awp`/`adk-payments` use for their own
//! request signatures) and sent with `reqwest`, which the crate already
//! depends on for webhook delivery. See DESIGN.md for the full rationale.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::backend::{BlobBackend, BlobError};
use async_trait::async_trait;
use bytes::Bytes;

type HmacSha256 = Hmac<Sha256>;

/// Settings for an S3-compatible bucket, matching the original Python
/// backend's settings form shape.
#[derive(Debug, Clone)]
pub struct ObjectStoreSettings {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    /// Override for S3-compatible providers; defaults to AWS's virtual-
    /// hosted-style endpoint when `None`.
    pub endpoint: Option<String>,
}

pub struct ObjectBlobBackend {
    settings: ObjectStoreSettings,
    client: reqwest::Client,
}

const CACHE_CONTROL_MAX_AGE_SECONDS: u64 = 365 * 24 * 60 * 60;

impl ObjectBlobBackend {
    pub fn new(settings: ObjectStoreSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    fn host(&self) -> String {
        self.settings.endpoint.clone().unwrap_or_else(|| {
            format!(
                "{}.s3.{}.amazonaws.com",
                self.settings.bucket, self.settings.region
            )
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://{}/{}", self.host(), urlencode_path(key))
    }

    /// Build the signed headers for a request, per AWS Signature Version 4.
    fn sign(
        &self,
        method: &str,
        key: &str,
        payload: &[u8],
    ) -> Vec<(String, String)> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let host = self.host();
        let payload_hash = hex::encode(Sha256::digest(payload));
        let canonical_uri = format!("/{}", urlencode_path(key));

        let canonical_headers = format!(
            "host:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n"
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        );

        let credential_scope =
            format!("{date_stamp}/{}/s3/aws4_request", self.settings.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = derive_signing_key(
            &self.settings.secret_key,
            &date_stamp,
            &self.settings.region,
            "s3",
        );
        let signature = hex::encode(hmac_bytes(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.settings.access_key
        );

        vec![
            ("Host".to_string(), host),
            ("X-Amz-Date".to_string(), amz_date),
            ("X-Amz-Content-Sha256".to_string(), payload_hash),
            ("Authorization".to_string(), authorization),
        ]
    }
}

fn derive_signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_bytes(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_bytes(&k_date, region.as_bytes());
    let k_service = hmac_bytes(&k_region, service.as_bytes());
    hmac_bytes(&k_service, b"aws4_request")
}

fn hmac_bytes(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn urlencode_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding_segment(segment))
        .collect::<Vec<_>>()
        .join("/")
}

fn urlencoding_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[async_trait]
impl BlobBackend for ObjectBlobBackend {
    async fn store(&self, key: &str, data: Bytes) -> Result<(), BlobError> {
        if self.settings.access_key.is_empty() || self.settings.bucket.is_empty() {
            return Err(BlobError::Misconfigured {
                message: "access key and bucket must be set".to_string(),
            });
        }
        let headers = self.sign("PUT", key, &data);
        let mut request = self
            .client
            .put(self.object_url(key))
            .header(
                "Cache-Control",
                format!("max-age={CACHE_CONTROL_MAX_AGE_SECONDS}, public"),
            )
            .body(data.clone());
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(reqwest_to_blob_error)?;
        if !response.status().is_success() {
            return Err(BlobError::Backend {
                message: format!("S3 PUT failed with status {}", response.status()),
                source: None,
            });
        }
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Bytes, BlobError> {
        let headers = self.sign("GET", key, b"");
        let mut request = self.client.get(self.object_url(key));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(reqwest_to_blob_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound {
                key: key.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(BlobError::Backend {
                message: format!("S3 GET failed with status {}", response.status()),
                source: None,
            });
        }
        response.bytes().await.map_err(reqwest_to_blob_error)
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let headers = self.sign("DELETE", key, b"");
        let mut request = self.client.delete(self.object_url(key));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(reqwest_to_blob_error)?;
        // S3 DELETE is idempotent: a missing key returns 204/404, both fine.
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND
        {
            return Err(BlobError::Backend {
                message: format!("S3 DELETE failed with status {}", response.status()),
                source: None,
            });
        }
        Ok(())
    }
}

fn reqwest_to_blob_error(err: reqwest::Error) -> BlobError {
    BlobError::Backend {
        message: err.to_string(),
        source: Some(Box::new(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ObjectStoreSettings {
        ObjectStoreSettings {
            access_key: "AKIDEXAMPLE".to_string(),
            secret_key: "secret".to_string(),
            bucket: "my-bucket".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
        }
    }

    #[test]
    fn object_url_uses_virtual_hosted_style() {
        let backend = ObjectBlobBackend::new(settings());
        assert_eq!(
            backend.object_url("photo.abc123.png"),
            "https://my-bucket.s3.us-east-1.amazonaws.com/photo.abc123.png"
        );
    }

    #[test]
    fn signing_produces_a_well_formed_authorization_header() {
        let backend = ObjectBlobBackend::new(settings());
        let headers = backend.sign("PUT", "k", b"data");
        let auth = headers
            .iter()
            .find(|(name, _)| name == "Authorization")
            .unwrap();
        assert!(auth.1.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(auth.1.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        assert_eq!(urlencode_path("a b/c.png"), "a%20b/c.png");
    }
}
