use chrono::{DateTime, Utc};
use shield_models::Account;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::StoreError;

pub const ACCOUNT_COLUMNS: &str = "id, username, email, credential_hash, role, is_active, \
     failed_attempt_count, locked_until, last_login_at, created_at";

#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub credential_hash: String,
    pub role: String,
    pub is_active: bool,
    pub failed_attempt_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: row.id,
            username: row.username,
            email: row.email,
            credential_hash: row.credential_hash,
            role: row.role.parse()?,
            is_active: row.is_active,
            failed_attempt_count: row.failed_attempt_count,
            locked_until: row.locked_until,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
        })
    }
}
