use super::EphemeralStore;
use crate::db::DbPool;
use crate::db::connection::run_blocking;
use crate::db::error::RepositoryError;
use crate::db::schema::ephemeral_entries;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use std::time::Duration;

#[derive(Insertable, Debug)]
#[diesel(table_name = ephemeral_entries)]
struct NewEntry {
    key: String,
    value: String,
    expires_at: DateTime<Utc>,
}

/// TTL entries kept in the `ephemeral_entries` table. Rows past
/// `expires_at` are ignored by reads and deleted by the next write.
#[derive(Clone)]
pub struct PgEphemeralStore {
    pool: DbPool,
    timeout: Duration,
}

impl PgEphemeralStore {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl EphemeralStore for PgEphemeralStore {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), RepositoryError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| RepositoryError::DatabaseError(format!("invalid ttl: {e}")))?;
        let entry = NewEntry {
            key: key.to_string(),
            value: value.to_string(),
            expires_at: Utc::now() + ttl,
        };

        run_blocking(&self.pool, self.timeout, move |conn| {
            let swept = sweep_expired(conn)?;
            if swept > 0 {
                tracing::debug!(swept, "Expired ephemeral entries removed");
            }

            diesel::insert_into(ephemeral_entries::table)
                .values(&entry)
                .on_conflict(ephemeral_entries::key)
                .do_update()
                .set((
                    ephemeral_entries::value.eq(excluded(ephemeral_entries::value)),
                    ephemeral_entries::expires_at.eq(excluded(ephemeral_entries::expires_at)),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let key = key.to_string();
        run_blocking(&self.pool, self.timeout, move |conn| {
            ephemeral_entries::table
                .filter(ephemeral_entries::key.eq(key))
                .filter(ephemeral_entries::expires_at.gt(Utc::now()))
                .select(ephemeral_entries::value)
                .first::<String>(conn)
                .optional()
                .map_err(Into::into)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, RepositoryError> {
        let key = key.to_string();
        run_blocking(&self.pool, self.timeout, move |conn| {
            let removed = diesel::delete(
                ephemeral_entries::table
                    .filter(ephemeral_entries::key.eq(key))
                    .filter(ephemeral_entries::expires_at.gt(Utc::now())),
            )
            .execute(conn)?;
            Ok(removed == 1)
        })
        .await
    }
}

fn sweep_expired(conn: &mut PgConnection) -> Result<usize, RepositoryError> {
    Ok(diesel::delete(
        ephemeral_entries::table.filter(ephemeral_entries::expires_at.le(Utc::now())),
    )
    .execute(conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::create_pool;

    #[tokio::test]
    #[ignore = "requires a Postgres database at DATABASE_URL"]
    async fn upsert_overwrites_previous_value() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = create_pool(&url, 2, Duration::from_secs(5)).expect("pool");
        let store = PgEphemeralStore::new(pool, Duration::from_secs(5));
        let key = format!("test:{}", uuid::Uuid::new_v4());

        store.set_with_ttl(&key, "111111", Duration::from_secs(60)).await.unwrap();
        store.set_with_ttl(&key, "222222", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("222222"));

        assert!(store.delete(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert!(!store.delete(&key).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires a Postgres database at DATABASE_URL"]
    async fn next_write_sweeps_expired_rows() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = create_pool(&url, 2, Duration::from_secs(5)).expect("pool");
        let store = PgEphemeralStore::new(pool.clone(), Duration::from_secs(5));
        let stale = format!("test:{}", uuid::Uuid::new_v4());

        store.set_with_ttl(&stale, "1", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        store
            .set_with_ttl(&format!("test:{}", uuid::Uuid::new_v4()), "2", Duration::from_secs(60))
            .await
            .unwrap();

        let mut conn = pool.get().expect("connection");
        let left: i64 = ephemeral_entries::table
            .filter(ephemeral_entries::key.eq(&stale))
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(left, 0);
    }
}
