//! In-process implementation of the durable store traits.
//!
//! Used by `STORE_BACKEND=memory` for local development and by the test
//! suites. It honours the same contracts as the Postgres repositories,
//! including the unique email constraint and the conditional revoke in
//! [`RefreshTokenStore::rotate`].

use super::error::RepositoryError;
use super::models::refresh_token::{NewRefreshToken, RefreshToken};
use super::models::user::{NewUser, User};
use super::repositories::{RefreshTokenStore, UserStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
}

impl Tables {
    fn insert_token(&mut self, new_token: NewRefreshToken) -> Result<RefreshToken, RepositoryError> {
        if !self.users.contains_key(&new_token.user_id) {
            return Err(RepositoryError::ForeignKeyViolation(format!(
                "user {} does not exist",
                new_token.user_id
            )));
        }
        if self
            .refresh_tokens
            .values()
            .any(|t| t.token_hash == new_token.token_hash)
        {
            return Err(RepositoryError::UniqueViolation(
                "refresh_tokens.token_hash".to_string(),
            ));
        }

        let row = RefreshToken {
            id: Uuid::new_v4(),
            user_id: new_token.user_id,
            token_hash: new_token.token_hash,
            device_id: new_token.device_id,
            expires_at: new_token.expires_at,
            absolute_expires_at: new_token.absolute_expires_at,
            revoked_at: None,
            created_at: Utc::now(),
        };
        self.refresh_tokens.insert(row.id, row.clone());
        Ok(row)
    }

    fn revoke_if_active(&mut self, id: Uuid) -> bool {
        match self.refresh_tokens.get_mut(&id) {
            Some(row) if row.revoked_at.is_none() => {
                row.revoked_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.email == new_user.email) {
            return Err(RepositoryError::UniqueViolation("users.email".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            username: new_user.username,
            password_hash: new_user.password_hash,
            email_verified: false,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn set_verified(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {id}")))?;
        user.email_verified = true;
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn create(&self, new_token: NewRefreshToken) -> Result<RefreshToken, RepositoryError> {
        self.tables.lock().await.insert_token(new_token)
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == hash)
            .cloned())
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.tables.lock().await.revoke_if_active(id))
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let mut revoked = 0;
        for row in tables.refresh_tokens.values_mut() {
            if row.user_id == user_id && row.revoked_at.is_none() {
                row.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn rotate(
        &self,
        parent_id: Uuid,
        child: NewRefreshToken,
    ) -> Result<Option<RefreshToken>, RepositoryError> {
        // One lock section stands in for the database transaction.
        let mut tables = self.tables.lock().await;
        if !tables.revoke_if_active(parent_id) {
            return Ok(None);
        }
        match tables.insert_token(child) {
            Ok(row) => Ok(Some(row)),
            Err(e) => {
                if let Some(parent) = tables.refresh_tokens.get_mut(&parent_id) {
                    parent.revoked_at = None;
                }
                Err(e)
            }
        }
    }
}
