use crate::db::DbPool;
use crate::db::connection::run_blocking;
use crate::db::error::RepositoryError;
use crate::db::models::user::{NewUser, User};
use crate::db::schema::users;
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use std::time::Duration;
use uuid::Uuid;

/// Durable user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `UniqueViolation` when the email is taken.
    async fn create_user(&self, new_user: NewUser) -> Result<User, RepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;

    /// Flips `email_verified`. Fails with `NotFound` for an unknown id.
    async fn set_verified(&self, id: Uuid) -> Result<(), RepositoryError>;
}

#[derive(Clone)]
pub struct UserRepository {
    pool: DbPool,
    timeout: Duration,
}

impl UserRepository {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn create_user(&self, new_user: NewUser) -> Result<User, RepositoryError> {
        run_blocking(&self.pool, self.timeout, move |conn| {
            diesel::insert_into(users::table)
                .values(&new_user)
                .returning(User::as_returning())
                .get_result(conn)
                .map_err(Into::into)
        })
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let email = email.to_string();
        run_blocking(&self.pool, self.timeout, move |conn| {
            users::table
                .filter(users::email.eq(email))
                .select(User::as_select())
                .first(conn)
                .optional()
                .map_err(Into::into)
        })
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        run_blocking(&self.pool, self.timeout, move |conn| {
            users::table
                .filter(users::id.eq(id))
                .select(User::as_select())
                .first(conn)
                .optional()
                .map_err(Into::into)
        })
        .await
    }

    async fn set_verified(&self, id: Uuid) -> Result<(), RepositoryError> {
        run_blocking(&self.pool, self.timeout, move |conn| {
            let updated = diesel::update(users::table.filter(users::id.eq(id)))
                .set((
                    users::email_verified.eq(true),
                    users::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

            if updated == 0 {
                return Err(RepositoryError::NotFound(format!("user {id}")));
            }
            Ok(())
        })
        .await
    }
}
