//! Persistence for security events, alerts and accounts.
//!
//! Callers work against the [`Store`] traits; [`PgStore`] backs them with
//! Postgres and [`MemoryStore`] keeps everything in process.

pub mod error;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

pub use sqlx;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use repositories::PgStore;
pub use store::{AccountStore, AlertStore, EventStore, Guarded, Store, Transition};

use shield_config::DatabaseConfig;
use std::sync::Arc;

/// Open the configured backend: Postgres (migrated) when a URL is set,
/// otherwise an empty in-memory store.
pub async fn connect(config: &DatabaseConfig) -> StoreResult<Arc<dyn Store>> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
