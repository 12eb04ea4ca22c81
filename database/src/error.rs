use thiserror::Error;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored row: {0}")]
    InvalidRow(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        StoreError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Map a unique-constraint violation to `Conflict`, anything else to `Unavailable`.
    pub(crate) fn from_write(err: sqlx::Error, conflict: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                StoreError::Conflict(conflict.to_string())
            }
            _ => StoreError::Unavailable(err),
        }
    }
}

impl From<shield_models::ParseEnumError> for StoreError {
    fn from(err: shield_models::ParseEnumError) -> Self {
        StoreError::InvalidRow(err.to_string())
    }
}
