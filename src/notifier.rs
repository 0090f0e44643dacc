//! Signed webhook delivery, grounded on `original_source/workers/tasks.py`'s
//! `post_notification`: the signature is `SHA-1(timestamp ∥ body ∥
//! api_key)`, not an HMAC — the api key is concatenated directly into the
//! hashed material rather than used as a MAC key. Delivery failures are
//! swallowed; a caller waiting on the task's own terminal event already
//! knows whether the task finished.

use sha1::{Digest, Sha1};

pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the `X-H51-Timestamp` / `X-H51-Signature` pair for a given body
/// and account api key, at the given unix-epoch-seconds timestamp.
pub fn sign(timestamp_secs: i64, body: &[u8], api_key: &str) -> (String, String) {
    let timestamp = timestamp_secs.to_string();
    let mut hasher = Sha1::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(body);
    hasher.update(api_key.as_bytes());
    let signature = hex::encode(hasher.finalize());
    (timestamp, signature)
}

impl WebhookNotifier {
    /// POST `body` to `notification_url` with the signature headers. Best
    /// effort: network errors and non-2xx responses are logged and
    /// swallowed, matching the original's bare `except HTTPError: pass`.
    pub async fn notify(&self, notification_url: &str, api_key: &str, body: Vec<u8>) {
        let (timestamp, signature) = sign(chrono::Utc::now().timestamp(), &body, api_key);

        let result = self
            .client
            .post(notification_url)
            .header("X-H51-Timestamp", timestamp)
            .header("X-H51-Signature", signature)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    status = %response.status(),
                    url = notification_url,
                    "webhook notification rejected by receiver"
                );
            }
            Err(error) => {
                tracing::warn!(%error, url = notification_url, "webhook notification failed");
            }
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_sha1_of_concatenation() {
        let (timestamp, signature) = sign(1_700_000_000, b"{\"ok\":true}", "secret-key");
        assert_eq!(timestamp, "1700000000");

        let mut hasher = Sha1::new();
        hasher.update(b"1700000000");
        hasher.update(b"{\"ok\":true}");
        hasher.update(b"secret-key");
        let expected = hex::encode(hasher.finalize());
        assert_eq!(signature, expected);
    }

    #[test]
    fn different_api_keys_produce_different_signatures() {
        let (_, sig_a) = sign(1_700_000_000, b"body", "key-a");
        let (_, sig_b) = sign(1_700_000_000, b"body", "key-b");
        assert_ne!(sig_a, sig_b);
    }
}
