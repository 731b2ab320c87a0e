use super::error::RepositoryError;
use super::DbPool;
use anyhow::{Result, anyhow};
use diesel::PgConnection;
use diesel::r2d2::ConnectionManager;
use std::time::Duration;

/// Builds the r2d2 pool once at startup. The pool is handed to every
/// repository explicitly; there is no process-wide handle.
pub fn create_pool(database_url: &str, max_size: u32, timeout: Duration) -> Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);

    diesel::r2d2::Pool::builder()
        .max_size(max_size)
        .connection_timeout(timeout)
        .build(manager)
        .map_err(|e| anyhow!("Failed to create database pool: {}", e))
}

/// Runs a diesel closure on the blocking pool, bounded by `timeout`.
///
/// The blocking task is not cancelled when the timeout fires or the caller is
/// dropped: a write already in flight runs to completion.
pub async fn run_blocking<T, F>(pool: &DbPool, timeout: Duration, f: F) -> Result<T, RepositoryError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, RepositoryError> + Send + 'static,
{
    let pool = pool.clone();
    let task = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined?,
        Err(_) => {
            tracing::error!(timeout_ms = timeout.as_millis() as u64, "database call timed out");
            Err(RepositoryError::Timeout(timeout))
        }
    }
}
