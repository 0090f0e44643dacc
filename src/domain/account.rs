//! Account — the identity unit that owns assets and is charged against the
//! rate limiter.

use std::collections::HashSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A backend configuration slot on an account: either unset, or a tagged
/// configuration for one of the supported blob backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSettings {
    Local {
        root: String,
    },
    Object {
        access_key: String,
        secret_key: String,
        bucket: String,
        region: String,
        endpoint: Option<String>,
    },
}

/// An account: the top-level identity that owns assets, carries an API key,
/// and is the unit charged against the rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    /// Empty means any source IP is allowed.
    pub allowed_ips: HashSet<IpAddr>,
    /// `None` falls back to the process-wide default.
    pub api_rate_limit_per_second: Option<u32>,
    pub public_backend: Option<BackendSettings>,
    pub secure_backend: Option<BackendSettings>,
}

impl Account {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            api_key: api_key.into(),
            allowed_ips: HashSet::new(),
            api_rate_limit_per_second: None,
            public_backend: None,
            secure_backend: None,
        }
    }

    /// Whether `ip` is permitted to authenticate as this account. An empty
    /// allow-list means any source IP is permitted.
    pub fn ip_allowed(&self, ip: IpAddr) -> bool {
        self.allowed_ips.is_empty() || self.allowed_ips.contains(&ip)
    }

    /// Replace the API key, returning the previous one for the caller to
    /// log. Rotation is a replace-and-log operation, never an append.
    pub fn rotate_api_key(&mut self, new_key: impl Into<String>) -> String {
        std::mem::replace(&mut self.api_key, new_key.into())
    }

    /// The backend settings to use for a given security class.
    pub fn backend_for(&self, secure: bool) -> Option<&BackendSettings> {
        if secure {
            self.secure_backend.as_ref()
        } else {
            self.public_backend.as_ref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_permits_any_ip() {
        let account = Account::new("acme", "key123");
        assert!(account.ip_allowed("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn non_empty_allow_list_restricts() {
        let mut account = Account::new("acme", "key123");
        account.allowed_ips.insert("10.0.0.1".parse().unwrap());
        assert!(account.ip_allowed("10.0.0.1".parse().unwrap()));
        assert!(!account.ip_allowed("10.0.0.2".parse().unwrap()));
    }

    #[test]
    fn rotate_returns_previous_key() {
        let mut account = Account::new("acme", "old-key");
        let previous = account.rotate_api_key("new-key");
        assert_eq!(previous, "old-key");
        assert_eq!(account.api_key, "new-key");
    }
}
