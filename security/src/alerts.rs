use chrono::{DateTime, Duration, Utc};
use shield_database::{Store, Transition};
use shield_models::{alert::meta, Alert, AlertFilter, AlertSeverity, AlertStats, AlertStatus, NewAlert};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{ServiceError, ServiceResult};
use crate::notification::NotificationDispatcher;

/// Creates alerts, drives their lifecycle and fans critical ones out to the
/// emergency contact.
pub struct AlertService {
    store: Arc<dyn Store>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl AlertService {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Persist a new active alert. Critical alerts are dispatched before
    /// returning; the result reflects whether the notification went out.
    pub async fn create_alert(&self, alert: NewAlert) -> ServiceResult<Alert> {
        let alert = alert.meta(meta::EMERGENCY_CONTACT, self.dispatcher.destination());
        let mut created = self.store.insert_alert(alert).await?;

        info!(
            alert_id = %created.id,
            severity = %created.severity,
            category = %created.category,
            title = %created.title,
            "Alert created"
        );

        if created.severity == AlertSeverity::Critical && self.dispatcher.notify(&created).await {
            created.notification_sent = true;
        }
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<Alert> {
        Ok(self.store.get_alert(id).await?)
    }

    pub async fn list(&self, filter: &AlertFilter) -> ServiceResult<Vec<Alert>> {
        Ok(self.store.list_alerts(filter).await?)
    }

    /// Acknowledging twice is harmless and returns the alert unchanged.
    pub async fn acknowledge(&self, id: Uuid) -> ServiceResult<Alert> {
        self.transition(id, AlertStatus::Acknowledged, Utc::now()).await
    }

    pub async fn resolve(&self, id: Uuid) -> ServiceResult<Alert> {
        self.transition(id, AlertStatus::Resolved, Utc::now()).await
    }

    async fn transition(&self, id: Uuid, target: AlertStatus, now: DateTime<Utc>) -> ServiceResult<Alert> {
        match self.store.transition_alert(id, target, now).await? {
            Transition::Applied(alert) => {
                info!(alert_id = %id, status = %alert.status, "Alert status changed");
                Ok(alert)
            }
            Transition::NotApplied(alert)
                if target == AlertStatus::Acknowledged && alert.status == AlertStatus::Acknowledged =>
            {
                Ok(alert)
            }
            Transition::NotApplied(alert) => {
                warn!(alert_id = %id, from = %alert.status, to = %target, "Rejected alert transition");
                Err(ServiceError::InvalidTransition(format!(
                    "Alert is {} and cannot become {}",
                    alert.status, target
                )))
            }
        }
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> ServiceResult<AlertStats> {
        let active_alerts = self.store.count_by_status(AlertStatus::Active, None).await?;
        let critical_alerts = self
            .store
            .count_by_status(AlertStatus::Active, Some(AlertSeverity::Critical))
            .await?;
        let last_24_hours = self.store.severity_counts_since(now - Duration::hours(24)).await?;

        Ok(AlertStats {
            active_alerts,
            critical_alerts,
            last_24_hours,
            emergency_contact: self.dispatcher.destination().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::tests::RecordingTransport;
    use shield_config::NotificationConfig;
    use shield_database::MemoryStore;
    use shield_models::AlertCategory;
    use std::sync::atomic::Ordering;

    fn service(store: Arc<MemoryStore>, transport: Arc<RecordingTransport>) -> AlertService {
        let dispatcher = NotificationDispatcher::new(store.clone(), transport, &NotificationConfig::default(), true);
        AlertService::new(store, Arc::new(dispatcher))
    }

    fn warning() -> NewAlert {
        NewAlert::new("Port scan", "Scan from 10.0.0.9", AlertCategory::Intrusion, AlertSeverity::Warning)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = Arc::new(MemoryStore::new());
        let alerts = service(store, Arc::new(RecordingTransport::default()));

        let created = alerts.create_alert(warning().meta(meta::IP_ADDRESS, "10.0.0.9")).await.unwrap();
        let fetched = alerts.get(created.id).await.unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.status, AlertStatus::Active);
        assert_eq!(fetched.metadata_value(meta::IP_ADDRESS), Some("10.0.0.9"));
        assert_eq!(fetched.metadata_value(meta::EMERGENCY_CONTACT), Some("7004398297"));
    }

    #[tokio::test]
    async fn only_critical_alerts_notify() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::default());
        let alerts = service(store, transport.clone());

        let plain = alerts.create_alert(warning()).await.unwrap();
        assert!(!plain.notification_sent);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 0);

        let critical = alerts
            .create_alert(NewAlert::new("Breach", "Data exfiltration", AlertCategory::Security, AlertSeverity::Critical))
            .await
            .unwrap();
        assert!(critical.notification_sent);
        assert!(alerts.get(critical.id).await.unwrap().notification_sent);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_notification_keeps_the_alert() {
        let store = Arc::new(MemoryStore::new());
        let failing = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let alerts = service(store, failing);

        let critical = alerts
            .create_alert(NewAlert::new("Breach", "Data exfiltration", AlertCategory::Security, AlertSeverity::Critical))
            .await
            .unwrap();
        assert!(!critical.notification_sent);
        assert_eq!(alerts.get(critical.id).await.unwrap().title, "Breach");
    }

    #[tokio::test]
    async fn transitions_are_monotonic() {
        let store = Arc::new(MemoryStore::new());
        let alerts = service(store, Arc::new(RecordingTransport::default()));
        let alert = alerts.create_alert(warning()).await.unwrap();

        let acked = alerts.acknowledge(alert.id).await.unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(alerts.acknowledge(alert.id).await.unwrap().status, AlertStatus::Acknowledged);

        let resolved = alerts.resolve(alert.id).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        assert!(matches!(alerts.acknowledge(alert.id).await, Err(ServiceError::InvalidTransition(_))));
        assert!(matches!(alerts.resolve(alert.id).await, Err(ServiceError::InvalidTransition(_))));
        assert_eq!(alerts.get(alert.id).await.unwrap().resolved_at, resolved.resolved_at);
    }

    #[tokio::test]
    async fn missing_alert_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let alerts = service(store, Arc::new(RecordingTransport::default()));

        let err = alerts.resolve(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(err.to_string(), "Alert not found");
    }

    #[tokio::test]
    async fn stats_count_active_and_critical() {
        let store = Arc::new(MemoryStore::new());
        let alerts = service(store, Arc::new(RecordingTransport::default()));

        let first = alerts.create_alert(warning()).await.unwrap();
        alerts.create_alert(warning()).await.unwrap();
        alerts
            .create_alert(NewAlert::new("Breach", "x", AlertCategory::Security, AlertSeverity::Critical))
            .await
            .unwrap();
        alerts.resolve(first.id).await.unwrap();

        let stats = alerts.stats(Utc::now()).await.unwrap();
        assert_eq!(stats.active_alerts, 2);
        assert_eq!(stats.critical_alerts, 1);
        let warnings = stats
            .last_24_hours
            .iter()
            .find(|c| c.severity == AlertSeverity::Warning)
            .map(|c| c.count);
        assert_eq!(warnings, Some(2));
        assert_eq!(stats.emergency_contact, "7004398297");
    }
}
