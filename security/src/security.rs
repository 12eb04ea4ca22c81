use chrono::{DateTime, Duration, Utc};
use shield_database::Store;
use shield_models::{
    ComponentHealth, DashboardStats, Event, EventFilter, EventSeverity, EventType, FirewallRule, FirewallStatus,
    HealthReport,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::ServiceResult;

pub const SERVICE_NAME: &str = "Cyber Security Shield";

/// What the dashboard reports about the running process.
#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub monitor_enabled: bool,
    pub notifications_enabled: bool,
    pub rate_limiting_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
}

/// Read models over the event log plus event resolution.
pub struct SecurityService {
    store: Arc<dyn Store>,
    status: RuntimeStatus,
}

impl SecurityService {
    pub fn new(store: Arc<dyn Store>, status: RuntimeStatus) -> Self {
        Self { store, status }
    }

    pub async fn dashboard(&self, now: DateTime<Utc>) -> ServiceResult<DashboardStats> {
        let since = now - Duration::hours(24);

        Ok(DashboardStats {
            total_threats: self.store.count_since(since, None, None).await?,
            critical_threats: self
                .store
                .count_since(since, None, Some(EventSeverity::Critical))
                .await?,
            blocked_ips: self.store.distinct_sources(EventType::FirewallBlock, since).await?.len(),
            threats_by_type: self.store.count_by_type(since).await?,
            firewall_status: self.firewall_state().to_string(),
            last_scan: now,
        })
    }

    pub async fn logs(&self, filter: &EventFilter) -> ServiceResult<Vec<Event>> {
        Ok(self.store.list_events(filter).await?)
    }

    pub async fn firewall(&self, now: DateTime<Utc>) -> ServiceResult<FirewallStatus> {
        let since = now - Duration::hours(24);

        let blocked_requests = self
            .store
            .count_since(since, Some(EventType::FirewallBlock), None)
            .await?;
        let blocked_ips = self.store.distinct_sources(EventType::FirewallBlock, since).await?.len();

        Ok(FirewallStatus {
            status: self.firewall_state().to_string(),
            blocked_requests,
            blocked_ips,
            rules: FirewallRule::standard_rules(self.status.rate_limit_requests, self.status.rate_limit_window_secs),
        })
    }

    /// Never fails; an unreachable store is reported as degraded.
    pub async fn health(&self, now: DateTime<Utc>) -> HealthReport {
        let database = match self.store.ping().await {
            Ok(()) => "connected",
            Err(e) => {
                warn!(backend = self.store.backend_name(), error = %e, "Health check could not reach the store");
                "disconnected"
            }
        };

        HealthReport {
            status: if database == "connected" { "healthy" } else { "degraded" }.to_string(),
            service: SERVICE_NAME.to_string(),
            timestamp: now,
            services: ComponentHealth {
                database: database.to_string(),
                firewall: self.firewall_state().to_string(),
                monitoring: active_or_disabled(self.status.monitor_enabled).to_string(),
                alerts: active_or_disabled(self.status.notifications_enabled).to_string(),
            },
        }
    }

    pub async fn resolve_event(&self, id: Uuid) -> ServiceResult<Event> {
        let event = self.store.mark_event_resolved(id).await?;
        info!(event_id = %id, "Security event resolved");
        Ok(event)
    }

    fn firewall_state(&self) -> &'static str {
        active_or_disabled(self.status.rate_limiting_enabled)
    }
}

fn active_or_disabled(enabled: bool) -> &'static str {
    if enabled {
        "active"
    } else {
        "disabled"
    }
}
