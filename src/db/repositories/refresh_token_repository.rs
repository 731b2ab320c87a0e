use crate::db::DbPool;
use crate::db::connection::run_blocking;
use crate::db::error::RepositoryError;
use crate::db::models::refresh_token::{NewRefreshToken, RefreshToken};
use crate::db::schema::refresh_tokens;
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use std::time::Duration;
use uuid::Uuid;

/// Durable refresh-token rows. Rows are never deleted; revocation only sets
/// `revoked_at`, and only when it is still null.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn create(&self, new_token: NewRefreshToken) -> Result<RefreshToken, RepositoryError>;

    /// Looks a row up by hash regardless of its state.
    async fn find_by_hash(&self, hash: &str) -> Result<Option<RefreshToken>, RepositoryError>;

    /// Revokes one row. Returns `false` when it was already revoked (or absent).
    async fn revoke(&self, id: Uuid) -> Result<bool, RepositoryError>;

    /// Revokes every active row of the user and returns how many changed.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, RepositoryError>;

    /// Revokes `parent_id` only if it is still active, and inserts `child` only
    /// if that conditional update touched exactly one row. `None` means the
    /// parent had already been revoked by someone else.
    async fn rotate(
        &self,
        parent_id: Uuid,
        child: NewRefreshToken,
    ) -> Result<Option<RefreshToken>, RepositoryError>;
}

#[derive(Clone)]
pub struct RefreshTokenRepository {
    pool: DbPool,
    timeout: Duration,
}

impl RefreshTokenRepository {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

fn revoke_if_active(conn: &mut PgConnection, id: Uuid) -> QueryResult<usize> {
    diesel::update(
        refresh_tokens::table
            .filter(refresh_tokens::id.eq(id))
            .filter(refresh_tokens::revoked_at.is_null()),
    )
    .set(refresh_tokens::revoked_at.eq(Some(Utc::now())))
    .execute(conn)
}

#[async_trait]
impl RefreshTokenStore for RefreshTokenRepository {
    async fn create(&self, new_token: NewRefreshToken) -> Result<RefreshToken, RepositoryError> {
        run_blocking(&self.pool, self.timeout, move |conn| {
            diesel::insert_into(refresh_tokens::table)
                .values(&new_token)
                .returning(RefreshToken::as_returning())
                .get_result(conn)
                .map_err(Into::into)
        })
        .await
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        let hash = hash.to_string();
        run_blocking(&self.pool, self.timeout, move |conn| {
            refresh_tokens::table
                .filter(refresh_tokens::token_hash.eq(hash))
                .select(RefreshToken::as_select())
                .first(conn)
                .optional()
                .map_err(Into::into)
        })
        .await
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, RepositoryError> {
        run_blocking(&self.pool, self.timeout, move |conn| {
            Ok(revoke_if_active(conn, id)? == 1)
        })
        .await
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        run_blocking(&self.pool, self.timeout, move |conn| {
            let revoked = diesel::update(
                refresh_tokens::table
                    .filter(refresh_tokens::user_id.eq(user_id))
                    .filter(refresh_tokens::revoked_at.is_null()),
            )
            .set(refresh_tokens::revoked_at.eq(Some(Utc::now())))
            .execute(conn)?;
            Ok(revoked as u64)
        })
        .await
    }

    async fn rotate(
        &self,
        parent_id: Uuid,
        child: NewRefreshToken,
    ) -> Result<Option<RefreshToken>, RepositoryError> {
        run_blocking(&self.pool, self.timeout, move |conn| {
            conn.transaction::<_, RepositoryError, _>(|conn| {
                if revoke_if_active(conn, parent_id)? != 1 {
                    return Ok(None);
                }

                let created = diesel::insert_into(refresh_tokens::table)
                    .values(&child)
                    .returning(RefreshToken::as_returning())
                    .get_result(conn)?;
                Ok(Some(created))
            })
        })
        .await
    }
}
