use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use std::sync::Arc;

pub const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
pub const DEFAULT_ITERATIONS: u32 = 3;
pub const DEFAULT_PARALLELISM: u32 = 2;
const SALT_LEN: usize = 16;
const OUTPUT_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Invalid Argon2 parameters: {0}")]
    InvalidParams(argon2::Error),
    #[error("Salt generation failed: {0}")]
    SaltGeneration(String),
    #[error("Password hashing failed: {0}")]
    HashingFailed(argon2::password_hash::Error),
}

/// Argon2id credential hasher producing PHC strings
/// (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`).
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
    /// Hash of a random secret under the configured params. Checked on the
    /// unknown-account path so it costs the same as a real verification.
    dummy_hash: Arc<str>,
}

impl PasswordHasher {
    pub fn new() -> Result<Self, PasswordError> {
        Self::with_params(DEFAULT_MEMORY_KIB, DEFAULT_ITERATIONS, DEFAULT_PARALLELISM)
    }

    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, PasswordError> {
        let params = Params::new(memory_kib, iterations, parallelism, Some(OUTPUT_LEN))
            .map_err(PasswordError::InvalidParams)?;

        let mut secret = [0u8; SALT_LEN];
        OsRng
            .try_fill_bytes(&mut secret)
            .map_err(|e| PasswordError::SaltGeneration(e.to_string()))?;
        let dummy_hash = hash_with(&params, &hex::encode(secret))?;

        Ok(Self {
            params,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        hash_with(&self.params, password)
    }

    /// Runs a full verification that can never match. Always `false`.
    pub fn verify_dummy(&self, password: &str) -> bool {
        let _ = self.verify(password, &self.dummy_hash);
        false
    }

    /// Checks `password` against a stored PHC string. Cost parameters come
    /// from the stored string, so hashes made under older settings keep
    /// verifying. A malformed string never matches.
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        let parsed = match PasswordHash::new(encoded) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(error = %e, "Stored password hash is malformed");
                return false;
            }
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

fn hash_with(params: &Params, password: &str) -> Result<String, PasswordError> {
    let mut salt_bytes = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt_bytes)
        .map_err(|e| PasswordError::SaltGeneration(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| PasswordError::SaltGeneration(e.to_string()))?;

    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(PasswordError::HashingFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_hasher() -> PasswordHasher {
        PasswordHasher::with_params(1024, 1, 1).expect("valid params")
    }

    #[test]
    fn verify_returns_true_when_password_matches() {
        let hasher = cheap_hasher();
        let hashed = hasher.hash("secure_password_@123P").expect("Hashing failed");

        assert!(hasher.verify("secure_password_@123P", &hashed));
    }

    #[test]
    fn cross_verify_rejects_mismatched_password_and_hash() {
        let hasher = cheap_hasher();
        let hash1 = hasher.hash("user1_password").unwrap();
        let hash2 = hasher.hash("user2_password").unwrap();

        assert!(!hasher.verify("user1_password", &hash2));
        assert!(!hasher.verify("user2_password", &hash1));
    }

    #[test]
    fn same_password_gets_a_fresh_salt_each_time() {
        let hasher = cheap_hasher();
        assert_ne!(hasher.hash("Password1").unwrap(), hasher.hash("Password1").unwrap());
    }

    #[test]
    fn encoded_hash_carries_algorithm_and_params() {
        let hasher = PasswordHasher::with_params(2048, 2, 1).unwrap();
        let hashed = hasher.hash("Password1").unwrap();

        assert!(hashed.starts_with("$argon2id$v=19$m=2048,t=2,p=1$"));
    }

    #[test]
    fn verification_uses_params_from_the_stored_hash() {
        let hashed = cheap_hasher().hash("Password1").unwrap();
        let other = PasswordHasher::with_params(4096, 2, 1).unwrap();

        assert!(other.verify("Password1", &hashed));
    }

    #[test]
    fn malformed_hash_is_a_mismatch_not_an_error() {
        let hasher = cheap_hasher();
        assert!(!hasher.verify("Password1", "not-a-phc-string"));
        assert!(!hasher.verify("Password1", ""));
    }

    #[test]
    fn verify_fails_when_case_differs() {
        let hasher = cheap_hasher();
        let hash = hasher.hash("MyPassword").unwrap();

        assert!(!hasher.verify("mypassword", &hash));
    }

    #[test]
    fn dummy_hash_uses_the_configured_params() {
        let hasher = PasswordHasher::with_params(2048, 2, 1).unwrap();
        assert!(hasher.dummy_hash.starts_with("$argon2id$v=19$m=2048,t=2,p=1$"));
    }

    #[test]
    fn dummy_verification_never_matches() {
        let hasher = cheap_hasher();
        assert!(!hasher.verify_dummy("Password1"));
        assert!(!hasher.verify_dummy(""));
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(matches!(
            PasswordHasher::with_params(1, 0, 0),
            Err(PasswordError::InvalidParams(_))
        ));
    }
}
