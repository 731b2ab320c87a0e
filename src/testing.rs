//! Store doubles for failure-path tests.

use crate::db::error::RepositoryError;
use crate::db::memory::MemoryStore;
use crate::db::models::refresh_token::{NewRefreshToken, RefreshToken};
use crate::db::models::user::{NewUser, User};
use crate::db::{RefreshTokenStore, Stores, UserStore};
use crate::ephemeral::{EphemeralStore, MemoryEphemeralStore};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateUser,
    SetVerified,
    CreateToken,
    RevokeAll,
    Rotate,
}

/// Memory store whose operations can be switched to time out one by one.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<StoreOp>>,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, op: StoreOp) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: StoreOp) {
        self.failing.lock().unwrap().remove(&op);
    }

    /// Store handles backed by this store and a fresh ephemeral store.
    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            users: self.clone(),
            refresh_tokens: self.clone(),
            ephemeral: Arc::new(MemoryEphemeralStore::new()),
        }
    }

    fn guard(&self, op: StoreOp) -> Result<(), RepositoryError> {
        if self.failing.lock().unwrap().contains(&op) {
            return Err(RepositoryError::Timeout(STORE_TIMEOUT));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for FaultyStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, RepositoryError> {
        self.guard(StoreOp::CreateUser)?;
        self.inner.create_user(new_user).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.inner.find_by_email(email).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn set_verified(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.guard(StoreOp::SetVerified)?;
        self.inner.set_verified(id).await
    }
}

#[async_trait]
impl RefreshTokenStore for FaultyStore {
    async fn create(&self, new_token: NewRefreshToken) -> Result<RefreshToken, RepositoryError> {
        self.guard(StoreOp::CreateToken)?;
        self.inner.create(new_token).await
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        self.inner.find_by_hash(hash).await
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.inner.revoke(id).await
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        self.guard(StoreOp::RevokeAll)?;
        self.inner.revoke_all_for_user(user_id).await
    }

    async fn rotate(
        &self,
        parent_id: Uuid,
        child: NewRefreshToken,
    ) -> Result<Option<RefreshToken>, RepositoryError> {
        self.guard(StoreOp::Rotate)?;
        self.inner.rotate(parent_id, child).await
    }
}

/// Memory ephemeral store whose reads stall after fetching, like a store
/// across the network.
#[derive(Default)]
pub struct SlowReads(MemoryEphemeralStore);

#[async_trait]
impl EphemeralStore for SlowReads {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), RepositoryError> {
        self.0.set_with_ttl(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let value = self.0.get(key).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        value
    }

    async fn delete(&self, key: &str) -> Result<bool, RepositoryError> {
        self.0.delete(key).await
    }
}
