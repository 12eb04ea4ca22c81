use chrono::{DateTime, Utc};
use shield_models::Alert;
use sqlx::{types::Json, FromRow};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::StoreError;

pub const ALERT_COLUMNS: &str = "id, title, message, category, severity, status, notification_sent, \
     metadata, created_at, resolved_at";

#[derive(Debug, Clone, FromRow)]
pub struct AlertRow {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub category: String,
    pub severity: String,
    pub status: String,
    pub notification_sent: bool,
    pub metadata: Json<BTreeMap<String, String>>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Alert {
            id: row.id,
            title: row.title,
            message: row.message,
            category: row.category.parse()?,
            severity: row.severity.parse()?,
            status: row.status.parse()?,
            notification_sent: row.notification_sent,
            metadata: row.metadata.0,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}
