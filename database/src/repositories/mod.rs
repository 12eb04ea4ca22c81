//! Postgres backend. One `PgStore` implements every store trait; each
//! table's queries live in their own module.

pub mod account;
pub mod alert;
pub mod event;

use async_trait::async_trait;
use shield_config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::error::StoreResult;
use crate::store::Store;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections = config.max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
