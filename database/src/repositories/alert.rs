use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shield_models::{
    alert::meta, effective_limit, Alert, AlertFilter, AlertSeverity, AlertStatus, NewAlert, SeverityCount,
};
use sqlx::types::Json;
use uuid::Uuid;

use super::PgStore;
use crate::error::{StoreError, StoreResult};
use crate::models::alert::{AlertRow, ALERT_COLUMNS};
use crate::store::{AlertStore, Transition};

#[async_trait]
impl AlertStore for PgStore {
    async fn insert_alert(&self, alert: NewAlert) -> StoreResult<Alert> {
        let sql = format!(
            "INSERT INTO alerts (id, title, message, category, severity, status, notification_sent, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, 'active', FALSE, $6, $7) \
             RETURNING {ALERT_COLUMNS}"
        );

        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&alert.title)
            .bind(&alert.message)
            .bind(alert.category.as_str())
            .bind(alert.severity.as_str())
            .bind(Json(&alert.metadata))
            .bind(Utc::now())
            .fetch_one(self.pool())
            .await?;

        row.try_into()
    }

    async fn get_alert(&self, id: Uuid) -> StoreResult<Alert> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = $1");

        sqlx::query_as::<_, AlertRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StoreError::not_found("Alert", id))?
            .try_into()
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> StoreResult<Vec<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::text IS NULL OR severity = $2) \
             ORDER BY created_at DESC \
             LIMIT $3"
        );

        let rows = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.severity.map(|s| s.as_str()))
            .bind(effective_limit(filter.limit))
            .fetch_all(self.pool())
            .await?;

        rows.into_iter().map(Alert::try_from).collect()
    }

    async fn transition_alert(&self, id: Uuid, target: AlertStatus, now: DateTime<Utc>) -> StoreResult<Transition> {
        let sources: Vec<String> = AlertStatus::sources_for(target)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let sql = format!(
            "UPDATE alerts \
             SET status = $2::text, \
                 resolved_at = CASE WHEN $2::text = 'resolved' THEN $3 ELSE resolved_at END \
             WHERE id = $1 AND status = ANY($4) \
             RETURNING {ALERT_COLUMNS}"
        );

        let updated = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(id)
            .bind(target.as_str())
            .bind(now)
            .bind(&sources)
            .fetch_optional(self.pool())
            .await?;

        match updated {
            Some(row) => Ok(Transition::Applied(row.try_into()?)),
            None => Ok(Transition::NotApplied(self.get_alert(id).await?)),
        }
    }

    async fn claim_notification(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE alerts SET notification_claimed_at = $2 \
             WHERE id = $1 \
               AND notification_sent = FALSE \
               AND (notification_claimed_at IS NULL OR notification_claimed_at < $3)",
        )
        .bind(id)
        .bind(now)
        .bind(stale_before)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_notification_sent(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("UPDATE alerts SET notification_sent = TRUE WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Alert", id));
        }
        Ok(())
    }

    async fn release_notification_claim(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE alerts SET notification_claimed_at = NULL WHERE id = $1 AND notification_sent = FALSE")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn severity_counts_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<SeverityCount>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT severity, COUNT(*) FROM alerts WHERE created_at >= $1 GROUP BY severity",
        )
        .bind(since)
        .fetch_all(self.pool())
        .await?;

        let mut counts = rows
            .into_iter()
            .map(|(severity, count)| -> StoreResult<SeverityCount> {
                Ok(SeverityCount {
                    severity: severity.parse()?,
                    count,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        counts.sort_by_key(|c| c.severity);
        Ok(counts)
    }

    async fn count_by_status(&self, status: AlertStatus, severity: Option<AlertSeverity>) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM alerts WHERE status = $1 AND ($2::text IS NULL OR severity = $2)",
        )
        .bind(status.as_str())
        .bind(severity.map(|s| s.as_str()))
        .fetch_one(self.pool())
        .await?;

        Ok(count)
    }

    async fn exists_for_source(&self, rule: &str, source: &str, since: DateTime<Utc>) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (\
                 SELECT 1 FROM alerts \
                 WHERE metadata ->> $1::text = $2 \
                   AND metadata ->> $3::text = $4 \
                   AND created_at >= $5 \
                   AND status <> $6)",
        )
        .bind(meta::RULE)
        .bind(rule)
        .bind(meta::IP_ADDRESS)
        .bind(source)
        .bind(since)
        .bind(AlertStatus::Resolved.as_str())
        .fetch_one(self.pool())
        .await?;

        Ok(exists)
    }
}
