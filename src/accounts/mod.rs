//! The minimal slice of account storage the core needs.
//!
//! The administrative back-office (CRUD for accounts/users, dashboards,
//! change logs) is out of scope. What the core does need is a way to look
//! an [`Account`] up by its API key during authentication — this module
//! provides that lookup behind a trait so the API layer is not wedded to a
//! storage technology, following the same "dumb backend behind a narrow
//! trait" shape used throughout the storage and queue layers.

pub mod assets;
pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

pub use assets::{AssetRepository, AssetRepositoryError, InMemoryAssetRepository, RedisAssetRepository};
pub use stats::{record, InMemoryStatsSink, RedisStatsSink, StatsSink};

use crate::domain::Account;

/// Errors a repository implementation can report.
#[derive(Debug, thiserror::Error)]
pub enum AccountRepositoryError {
    #[error("account not found")]
    NotFound,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Read/write access to accounts, keyed by id or by API key.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn by_api_key(&self, api_key: &str) -> Result<Account, AccountRepositoryError>;
    async fn by_id(&self, id: Uuid) -> Result<Account, AccountRepositoryError>;
    async fn put(&self, account: Account) -> Result<(), AccountRepositoryError>;
}

/// Thread-safe in-memory account repository, suitable for tests and for
/// single-process deployments that seed accounts at startup.
#[derive(Default)]
pub struct InMemoryAccountRepository {
    by_id: RwLock<HashMap<Uuid, Account>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn by_api_key(&self, api_key: &str) -> Result<Account, AccountRepositoryError> {
        self.by_id
            .read()
            .values()
            .find(|account| account.api_key == api_key)
            .cloned()
            .ok_or(AccountRepositoryError::NotFound)
    }

    async fn by_id(&self, id: Uuid) -> Result<Account, AccountRepositoryError> {
        self.by_id
            .read()
            .get(&id)
            .cloned()
            .ok_or(AccountRepositoryError::NotFound)
    }

    async fn put(&self, account: Account) -> Result<(), AccountRepositoryError> {
        self.by_id.write().insert(account.id, account);
        Ok(())
    }
}

/// Redis-backed account store, grounded on [`stats::RedisStatsSink`]'s
/// "hold a cloneable `MultiplexedConnection`" shape.
///
/// # Key schema
///
/// | Key | Type | Purpose |
/// |-----|------|---------|
/// | `h51:account:{id}` | String | JSON-encoded [`Account`] |
/// | `h51:account:by_key:{api_key}` | String | account id, for the auth lookup |
pub struct RedisAccountRepository {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisAccountRepository {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl AccountRepository for RedisAccountRepository {
    async fn by_api_key(&self, api_key: &str) -> Result<Account, AccountRepositoryError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let id: Option<String> = conn
            .get(format!("h51:account:by_key:{api_key}"))
            .await
            .map_err(|e| AccountRepositoryError::Backend(e.to_string()))?;
        let id = id.ok_or(AccountRepositoryError::NotFound)?;
        let id = Uuid::parse_str(&id).map_err(|e| AccountRepositoryError::Backend(e.to_string()))?;
        self.by_id(id).await
    }

    async fn by_id(&self, id: Uuid) -> Result<Account, AccountRepositoryError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(format!("h51:account:{id}"))
            .await
            .map_err(|e| AccountRepositoryError::Backend(e.to_string()))?;
        let raw = raw.ok_or(AccountRepositoryError::NotFound)?;
        serde_json::from_str(&raw).map_err(|e| AccountRepositoryError::Backend(e.to_string()))
    }

    async fn put(&self, account: Account) -> Result<(), AccountRepositoryError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(&account).map_err(|e| AccountRepositoryError::Backend(e.to_string()))?;
        conn.set::<_, _, ()>(format!("h51:account:{}", account.id), raw)
            .await
            .map_err(|e| AccountRepositoryError::Backend(e.to_string()))?;
        conn.set::<_, _, ()>(format!("h51:account:by_key:{}", account.api_key), account.id.to_string())
            .await
            .map_err(|e| AccountRepositoryError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_by_api_key_round_trips() {
        let repo = InMemoryAccountRepository::new();
        let account = Account::new("acme", "secret-key");
        let id = account.id;
        repo.put(account).await.unwrap();

        let found = repo.by_api_key("secret-key").await.unwrap();
        assert_eq!(found.id, id);

        assert!(matches!(
            repo.by_api_key("unknown").await,
            Err(AccountRepositoryError::NotFound)
        ));
    }
}
