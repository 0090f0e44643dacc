//! Asset row storage — the minimal repository the worker and API need to
//! load and update an [`Asset`] by its account-scoped uid, behind the same
//! narrow-trait shape as [`super::AccountRepository`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::Asset;

#[derive(Debug, thiserror::Error)]
pub enum AssetRepositoryError {
    #[error("asset not found")]
    NotFound,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Read/write access to assets, scoped by account id plus uid (uniqueness
/// is per-account, not global, per the data model).
#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn by_account_and_uid(
        &self,
        account_id: Uuid,
        uid: &str,
    ) -> Result<Asset, AssetRepositoryError>;
    async fn by_id(&self, id: Uuid) -> Result<Asset, AssetRepositoryError>;
    /// Overwrite the row wholesale. Two concurrent read-modify-writes of
    /// the same asset (e.g. an analyze task and an `expire` call racing)
    /// resolve last-writer-wins — there is no version check here, matching
    /// the original's plain document replace.
    async fn put(&self, asset: Asset) -> Result<(), AssetRepositoryError>;
    async fn delete(&self, id: Uuid) -> Result<(), AssetRepositoryError>;
    /// Every asset owned by `account_id`, in no particular order; callers
    /// needing a paged/filtered view sort and slice the result themselves.
    async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<Asset>, AssetRepositoryError>;
    /// Every asset across every account, in no particular order. Used only
    /// by the `purge` maintenance job, which must scan expiry cluster-wide.
    async fn list_all(&self) -> Result<Vec<Asset>, AssetRepositoryError>;
}

#[derive(Default)]
pub struct InMemoryAssetRepository {
    by_id: RwLock<HashMap<Uuid, Asset>>,
}

impl InMemoryAssetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl AssetRepository for InMemoryAssetRepository {
    async fn by_account_and_uid(
        &self,
        account_id: Uuid,
        uid: &str,
    ) -> Result<Asset, AssetRepositoryError> {
        self.by_id
            .read()
            .values()
            .find(|asset| asset.account_id == account_id && asset.uid == uid)
            .cloned()
            .ok_or(AssetRepositoryError::NotFound)
    }

    async fn by_id(&self, id: Uuid) -> Result<Asset, AssetRepositoryError> {
        self.by_id
            .read()
            .get(&id)
            .cloned()
            .ok_or(AssetRepositoryError::NotFound)
    }

    async fn put(&self, asset: Asset) -> Result<(), AssetRepositoryError> {
        self.by_id.write().insert(asset.id, asset);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AssetRepositoryError> {
        self.by_id.write().remove(&id);
        Ok(())
    }

    async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<Asset>, AssetRepositoryError> {
        Ok(self
            .by_id
            .read()
            .values()
            .filter(|asset| asset.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Asset>, AssetRepositoryError> {
        Ok(self.by_id.read().values().cloned().collect())
    }
}

/// Redis-backed asset store, same key-schema style as
/// [`super::RedisAccountRepository`].
///
/// # Key schema
///
/// | Key | Type | Purpose |
/// |-----|------|---------|
/// | `h51:asset:{id}` | String | JSON-encoded [`Asset`] |
/// | `h51:asset:by_uid:{account_id}:{uid}` | String | asset id |
/// | `h51:asset:idx:{account_id}` | Set | every asset id owned by the account |
/// | `h51:asset:idx:all` | Set | every known asset id, for the purge scan |
pub struct RedisAssetRepository {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisAssetRepository {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl AssetRepository for RedisAssetRepository {
    async fn by_account_and_uid(
        &self,
        account_id: Uuid,
        uid: &str,
    ) -> Result<Asset, AssetRepositoryError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let id: Option<String> = conn
            .get(format!("h51:asset:by_uid:{account_id}:{uid}"))
            .await
            .map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        let id = id.ok_or(AssetRepositoryError::NotFound)?;
        let id = Uuid::parse_str(&id).map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        self.by_id(id).await
    }

    async fn by_id(&self, id: Uuid) -> Result<Asset, AssetRepositoryError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(format!("h51:asset:{id}"))
            .await
            .map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        let raw = raw.ok_or(AssetRepositoryError::NotFound)?;
        serde_json::from_str(&raw).map_err(|e| AssetRepositoryError::Backend(e.to_string()))
    }

    async fn put(&self, asset: Asset) -> Result<(), AssetRepositoryError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(&asset).map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        conn.set::<_, _, ()>(format!("h51:asset:{}", asset.id), raw)
            .await
            .map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        conn.set::<_, _, ()>(format!("h51:asset:by_uid:{}:{}", asset.account_id, asset.uid), asset.id.to_string())
            .await
            .map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        conn.sadd::<_, _, ()>(format!("h51:asset:idx:{}", asset.account_id), asset.id.to_string())
            .await
            .map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        conn.sadd::<_, _, ()>("h51:asset:idx:all", asset.id.to_string())
            .await
            .map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AssetRepositoryError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let asset = match self.by_id(id).await {
            Ok(asset) => asset,
            Err(AssetRepositoryError::NotFound) => return Ok(()),
            Err(other) => return Err(other),
        };
        conn.del::<_, ()>(format!("h51:asset:{id}"))
            .await
            .map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        conn.del::<_, ()>(format!("h51:asset:by_uid:{}:{}", asset.account_id, asset.uid))
            .await
            .map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        conn.srem::<_, _, ()>(format!("h51:asset:idx:{}", asset.account_id), id.to_string())
            .await
            .map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        conn.srem::<_, _, ()>("h51:asset:idx:all", id.to_string())
            .await
            .map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<Asset>, AssetRepositoryError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(format!("h51:asset:idx:{account_id}"))
            .await
            .map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        self.load_many(ids).await
    }

    async fn list_all(&self) -> Result<Vec<Asset>, AssetRepositoryError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers("h51:asset:idx:all")
            .await
            .map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
        self.load_many(ids).await
    }
}

impl RedisAssetRepository {
    async fn load_many(&self, ids: Vec<String>) -> Result<Vec<Asset>, AssetRepositoryError> {
        let mut assets = Vec::with_capacity(ids.len());
        for id in ids {
            let id = Uuid::parse_str(&id).map_err(|e| AssetRepositoryError::Backend(e.to_string()))?;
            match self.by_id(id).await {
                Ok(asset) => assets.push(asset),
                Err(AssetRepositoryError::NotFound) => continue,
                Err(other) => return Err(other),
            }
        }
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_by_account_and_uid_round_trips() {
        let repo = InMemoryAssetRepository::new();
        let account_id = Uuid::new_v4();
        let asset = Asset::new(
            account_id,
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let uid = asset.uid.clone();
        repo.put(asset).await.unwrap();

        let found = repo.by_account_and_uid(account_id, &uid).await.unwrap();
        assert_eq!(found.uid, uid);

        assert!(matches!(
            repo.by_account_and_uid(Uuid::new_v4(), &uid).await,
            Err(AssetRepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let repo = InMemoryAssetRepository::new();
        repo.delete(Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn list_by_account_excludes_other_accounts() {
        let repo = InMemoryAssetRepository::new();
        let account_a = Uuid::new_v4();
        let account_b = Uuid::new_v4();
        repo.put(Asset::new(account_a, false, "a1".to_string(), "png".to_string(), "image/png".to_string()))
            .await
            .unwrap();
        repo.put(Asset::new(account_a, false, "a2".to_string(), "png".to_string(), "image/png".to_string()))
            .await
            .unwrap();
        repo.put(Asset::new(account_b, false, "b1".to_string(), "png".to_string(), "image/png".to_string()))
            .await
            .unwrap();

        let listed = repo.list_by_account(account_a).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|a| a.account_id == account_a));
    }
}
