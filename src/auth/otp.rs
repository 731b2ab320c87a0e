use crate::db::error::RepositoryError;
use crate::ephemeral::EphemeralStore;
use rand::Rng;
use rand::rngs::OsRng;
use std::sync::Arc;
use std::time::Duration;

const KEY_PREFIX: &str = "verif:";

/// Outcome of checking a submitted verification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Valid,
    /// No code is pending for this email (never issued, consumed, or past TTL).
    Expired,
    Mismatch,
}

/// Six-digit email verification codes held in the ephemeral store.
#[derive(Clone)]
pub struct CodeVerifier {
    store: Arc<dyn EphemeralStore>,
    ttl: Duration,
}

impl CodeVerifier {
    pub fn new(store: Arc<dyn EphemeralStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn storage_key(email: &str) -> String {
        format!("{KEY_PREFIX}{email}")
    }

    /// Issues a fresh code, replacing any pending one and restarting the TTL.
    pub async fn issue(&self, email: &str) -> Result<String, RepositoryError> {
        let code = OsRng.gen_range(100_000..=999_999_u32).to_string();
        self.store
            .set_with_ttl(&Self::storage_key(email), &code, self.ttl)
            .await?;
        tracing::debug!(email, "Verification code issued");
        Ok(code)
    }

    /// Compares `code` with the pending one without consuming it.
    pub async fn compare(&self, email: &str, code: &str) -> Result<CodeCheck, RepositoryError> {
        match self.store.get(&Self::storage_key(email)).await? {
            None => Ok(CodeCheck::Expired),
            Some(expected) if expected == code.trim() => Ok(CodeCheck::Valid),
            Some(_) => Ok(CodeCheck::Mismatch),
        }
    }

    /// Removes the pending code. Only one caller ever gets `true`.
    pub async fn consume(&self, email: &str) -> Result<bool, RepositoryError> {
        self.store.delete(&Self::storage_key(email)).await
    }

    /// A matching code is consumed; a mismatch leaves the pending code intact.
    /// Of several concurrent callers with the right code, only the one whose
    /// delete removed the entry sees `Valid`.
    pub async fn check(&self, email: &str, code: &str) -> Result<CodeCheck, RepositoryError> {
        let outcome = self.compare(email, code).await?;
        if outcome == CodeCheck::Valid && !self.consume(email).await? {
            return Ok(CodeCheck::Expired);
        }
        Ok(outcome)
    }
}
