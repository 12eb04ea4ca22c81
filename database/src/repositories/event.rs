use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shield_models::{
    effective_limit, Event, EventFilter, EventSeverity, EventType, NewEvent, SourceCount, TypeCount,
};
use sqlx::types::Json;
use uuid::Uuid;

use super::PgStore;
use crate::error::{StoreError, StoreResult};
use crate::models::event::{EventRow, EVENT_COLUMNS};
use crate::store::EventStore;

#[async_trait]
impl EventStore for PgStore {
    async fn append_event(&self, event: NewEvent) -> StoreResult<Event> {
        let sql = format!(
            "INSERT INTO security_events \
                 (id, event_type, severity, source_address, account_id, user_agent, description, metadata, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {EVENT_COLUMNS}"
        );

        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(event.event_type.as_str())
            .bind(event.severity.as_str())
            .bind(&event.source_address)
            .bind(event.account_id)
            .bind(&event.user_agent)
            .bind(&event.description)
            .bind(Json(&event.metadata))
            .bind(Utc::now())
            .fetch_one(self.pool())
            .await?;

        row.try_into()
    }

    async fn list_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM security_events \
             WHERE ($1::text IS NULL OR severity = $1) \
               AND ($2::text IS NULL OR event_type = $2) \
             ORDER BY occurred_at DESC \
             LIMIT $3"
        );

        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(filter.severity.map(|s| s.as_str()))
            .bind(filter.event_type.map(|t| t.as_str()))
            .bind(effective_limit(filter.limit))
            .fetch_all(self.pool())
            .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    async fn count_by_source(
        &self,
        since: DateTime<Utc>,
        event_type: Option<EventType>,
        min_count: i64,
    ) -> StoreResult<Vec<SourceCount>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT source_address, COUNT(*) AS count FROM security_events \
             WHERE occurred_at >= $1 AND ($2::text IS NULL OR event_type = $2) \
             GROUP BY source_address \
             HAVING COUNT(*) >= $3 \
             ORDER BY count DESC, source_address",
        )
        .bind(since)
        .bind(event_type.map(|t| t.as_str()))
        .bind(min_count)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(source_address, count)| SourceCount { source_address, count })
            .collect())
    }

    async fn count_by_type(&self, since: DateTime<Utc>) -> StoreResult<Vec<TypeCount>> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            "SELECT event_type, COUNT(*) AS count, \
                    COUNT(*) FILTER (WHERE severity = 'critical') AS critical_count \
             FROM security_events \
             WHERE occurred_at >= $1 \
             GROUP BY event_type \
             ORDER BY count DESC, event_type",
        )
        .bind(since)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|(event_type, count, critical_count)| -> StoreResult<TypeCount> {
                Ok(TypeCount {
                    event_type: event_type.parse()?,
                    count,
                    critical_count,
                })
            })
            .collect()
    }

    async fn count_since(
        &self,
        since: DateTime<Utc>,
        event_type: Option<EventType>,
        severity: Option<EventSeverity>,
    ) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM security_events \
             WHERE occurred_at >= $1 \
               AND ($2::text IS NULL OR event_type = $2) \
               AND ($3::text IS NULL OR severity = $3)",
        )
        .bind(since)
        .bind(event_type.map(|t| t.as_str()))
        .bind(severity.map(|s| s.as_str()))
        .fetch_one(self.pool())
        .await?;

        Ok(count)
    }

    async fn distinct_sources(&self, event_type: EventType, since: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let sources = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT source_address FROM security_events \
             WHERE event_type = $1 AND occurred_at >= $2 \
             ORDER BY source_address",
        )
        .bind(event_type.as_str())
        .bind(since)
        .fetch_all(self.pool())
        .await?;

        Ok(sources)
    }

    async fn mark_event_resolved(&self, id: Uuid) -> StoreResult<Event> {
        let sql = format!("UPDATE security_events SET resolved = TRUE WHERE id = $1 RETURNING {EVENT_COLUMNS}");

        sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StoreError::not_found("Event", id))?
            .try_into()
    }
}
