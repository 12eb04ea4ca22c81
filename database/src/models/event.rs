use chrono::{DateTime, Utc};
use shield_models::Event;
use sqlx::{types::Json, FromRow};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::StoreError;

pub const EVENT_COLUMNS: &str = "id, event_type, severity, source_address, account_id, user_agent, \
     description, metadata, occurred_at, resolved";

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub event_type: String,
    pub severity: String,
    pub source_address: String,
    pub account_id: Option<Uuid>,
    pub user_agent: Option<String>,
    pub description: String,
    pub metadata: Json<BTreeMap<String, String>>,
    pub occurred_at: DateTime<Utc>,
    pub resolved: bool,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            event_type: row.event_type.parse()?,
            severity: row.severity.parse()?,
            source_address: row.source_address,
            account_id: row.account_id,
            user_agent: row.user_agent,
            description: row.description,
            metadata: row.metadata.0,
            timestamp: row.occurred_at,
            resolved: row.resolved,
        })
    }
}
