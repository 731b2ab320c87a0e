//! Short-lived key/value entries with a time-to-live.
//!
//! Only three operations are used: put with TTL, get, delete. An expired
//! entry behaves exactly like an absent one, including for `delete`.

mod memory;
mod postgres;

pub use memory::MemoryEphemeralStore;
pub use postgres::PgEphemeralStore;

use crate::db::error::RepositoryError;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Inserts or overwrites `key`, restarting its TTL.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration)
    -> Result<(), RepositoryError>;

    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;

    /// Removes `key`. Returns whether a live entry was removed, so two
    /// concurrent callers cannot both consume the same value.
    async fn delete(&self, key: &str) -> Result<bool, RepositoryError>;
}
