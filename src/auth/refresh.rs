//! Refresh token ledger.
//!
//! Raw tokens leave the process exactly once (in the cookie); only their
//! SHA-256 is stored. Rotation revokes the presented row and inserts its
//! descendant in a single conditional write, so one parent yields at most
//! one child. Presenting a revoked token is treated as theft: every session
//! of that user is revoked.

use crate::auth::jwt::JwtManager;
use crate::db::models::refresh_token::{NewRefreshToken, RefreshToken, TokenState};
use crate::db::{RefreshTokenStore, UserStore};
use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

const RAW_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    pub sliding: Duration,
    pub absolute: Duration,
}

impl RefreshPolicy {
    pub fn from_days(sliding_days: i64, absolute_days: i64) -> Self {
        Self {
            sliding: Duration::days(sliding_days),
            absolute: Duration::days(absolute_days),
        }
    }

    fn sliding_expiry(&self, now: DateTime<Utc>, absolute: DateTime<Utc>) -> DateTime<Utc> {
        (now + self.sliding).min(absolute)
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::from_days(28, 90)
    }
}

/// A freshly minted refresh token. `raw` is never persisted.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub raw: String,
    pub record: RefreshToken,
}

#[derive(Debug, Clone)]
pub struct RotatedSession {
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh: IssuedRefreshToken,
}

pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn generate_raw_token() -> Result<String, AppError> {
    let mut bytes = [0u8; RAW_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AppError::TokenGenerationFailed(e.to_string()))?;
    Ok(hex::encode(bytes))
}

#[derive(Clone)]
pub struct RefreshLedger {
    tokens: Arc<dyn RefreshTokenStore>,
    users: Arc<dyn UserStore>,
    jwt: JwtManager,
    policy: RefreshPolicy,
}

impl RefreshLedger {
    pub fn new(
        tokens: Arc<dyn RefreshTokenStore>,
        users: Arc<dyn UserStore>,
        jwt: JwtManager,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            tokens,
            users,
            jwt,
            policy,
        }
    }

    pub async fn issue(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<IssuedRefreshToken, AppError> {
        let now = Utc::now();
        let absolute = now + self.policy.absolute;
        let raw = generate_raw_token()?;

        let record = self
            .tokens
            .create(NewRefreshToken {
                user_id,
                token_hash: hash_token(&raw),
                device_id: device_id.to_string(),
                expires_at: self.policy.sliding_expiry(now, absolute),
                absolute_expires_at: absolute,
            })
            .await?;

        tracing::debug!(%user_id, token_id = %record.id, device_id, "Refresh token issued");
        Ok(IssuedRefreshToken { raw, record })
    }

    pub async fn rotate(&self, raw: &str, device_id: &str) -> Result<RotatedSession, AppError> {
        if raw.is_empty() {
            return Err(AppError::InvalidRefreshToken);
        }

        let presented = self
            .tokens
            .find_by_hash(&hash_token(raw))
            .await?
            .ok_or(AppError::InvalidRefreshToken)?;

        let now = Utc::now();
        match presented.state_at(now) {
            TokenState::Revoked => {
                let revoked = self.tokens.revoke_all_for_user(presented.user_id).await?;
                tracing::warn!(
                    user_id = %presented.user_id,
                    token_id = %presented.id,
                    device_id,
                    revoked,
                    "Refresh token reuse detected; all sessions revoked"
                );
                return Err(AppError::TokenReuseDetected);
            }
            TokenState::Expired => return Err(AppError::RefreshTokenExpired),
            TokenState::Active => {}
        }

        if presented.device_id != device_id {
            tracing::info!(
                token_id = %presented.id,
                bound_device = %presented.device_id,
                presented_device = device_id,
                "Refresh presented from a different device id"
            );
        }

        let user = self
            .users
            .find_by_id(presented.user_id)
            .await?
            .ok_or(AppError::InvalidRefreshToken)?;

        let raw_child = generate_raw_token()?;
        let child = NewRefreshToken {
            user_id: presented.user_id,
            token_hash: hash_token(&raw_child),
            device_id: presented.device_id.clone(),
            expires_at: self
                .policy
                .sliding_expiry(now, presented.absolute_expires_at),
            absolute_expires_at: presented.absolute_expires_at,
        };

        let Some(record) = self.tokens.rotate(presented.id, child).await? else {
            tracing::info!(token_id = %presented.id, "Lost a concurrent rotation");
            return Err(AppError::InvalidRefreshToken);
        };

        let access_token = self.jwt.mint(user.id, &user.username)?;
        tracing::debug!(user_id = %user.id, parent = %presented.id, child = %record.id, "Refresh token rotated");

        Ok(RotatedSession {
            user_id: user.id,
            access_token,
            refresh: IssuedRefreshToken {
                raw: raw_child,
                record,
            },
        })
    }

    /// Revokes a single row. Revoking twice is a no-op.
    pub async fn revoke(&self, token_id: Uuid) -> Result<bool, AppError> {
        Ok(self.tokens.revoke(token_id).await?)
    }

    /// Revokes the row behind a raw token, if there is one.
    pub async fn revoke_presented(&self, raw: &str) -> Result<bool, AppError> {
        match self.tokens.find_by_hash(&hash_token(raw)).await? {
            Some(row) => self.revoke(row.id).await,
            None => Ok(false),
        }
    }

    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.tokens.revoke_all_for_user(user_id).await?;
        tracing::info!(%user_id, revoked, "All refresh tokens revoked");
        Ok(revoked)
    }
}
