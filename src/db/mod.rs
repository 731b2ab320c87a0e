pub mod connection;
pub mod error;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod schema;

use diesel::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use std::sync::Arc;
use std::time::Duration;

use crate::ephemeral::{EphemeralStore, MemoryEphemeralStore, PgEphemeralStore};
pub use repositories::{RefreshTokenStore, UserStore};

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Store handles built once at startup and passed into every component.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub ephemeral: Arc<dyn EphemeralStore>,
}

impl Stores {
    pub fn postgres(pool: DbPool, timeout: Duration) -> Self {
        Self {
            users: Arc::new(repositories::UserRepository::new(pool.clone(), timeout)),
            refresh_tokens: Arc::new(repositories::RefreshTokenRepository::new(
                pool.clone(),
                timeout,
            )),
            ephemeral: Arc::new(PgEphemeralStore::new(pool, timeout)),
        }
    }

    pub fn memory() -> Self {
        let durable = Arc::new(memory::MemoryStore::new());
        Self {
            users: durable.clone(),
            refresh_tokens: durable,
            ephemeral: Arc::new(MemoryEphemeralStore::new()),
        }
    }
}
