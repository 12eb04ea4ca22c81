//! Storage traits shared by the Postgres and in-memory backends.
//!
//! Every mutation that other writers may race on is a single conditional
//! statement: failed-attempt increments, alert transitions and notification
//! claims never read-then-write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shield_models::{
    Account, Alert, AlertFilter, AlertSeverity, AlertStatus, Event, EventFilter, EventSeverity,
    EventType, FailedAttempt, NewAccount, NewAlert, NewEvent, SeverityCount, SourceCount, TypeCount,
};
use uuid::Uuid;

use crate::error::StoreResult;

/// Outcome of a conditional alert status update.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The alert was in an allowed source status and now has the target status.
    Applied(Alert),
    /// The current status does not allow the move; the alert is unchanged.
    NotApplied(Alert),
}

/// Outcome of an account write that only applies while no lock is in force.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded<T> {
    Applied(T),
    /// The account was locked until the given instant; nothing was written.
    Locked(DateTime<Utc>),
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event; the store assigns id and timestamp.
    async fn append_event(&self, event: NewEvent) -> StoreResult<Event>;

    /// Newest first.
    async fn list_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>>;

    /// Sources with at least `min_count` events since `since`, optionally of one type.
    async fn count_by_source(
        &self,
        since: DateTime<Utc>,
        event_type: Option<EventType>,
        min_count: i64,
    ) -> StoreResult<Vec<SourceCount>>;

    async fn count_by_type(&self, since: DateTime<Utc>) -> StoreResult<Vec<TypeCount>>;

    async fn count_since(
        &self,
        since: DateTime<Utc>,
        event_type: Option<EventType>,
        severity: Option<EventSeverity>,
    ) -> StoreResult<i64>;

    async fn distinct_sources(&self, event_type: EventType, since: DateTime<Utc>) -> StoreResult<Vec<String>>;

    async fn mark_event_resolved(&self, id: Uuid) -> StoreResult<Event>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Insert as `active` with `notification_sent = false`.
    async fn insert_alert(&self, alert: NewAlert) -> StoreResult<Alert>;

    async fn get_alert(&self, id: Uuid) -> StoreResult<Alert>;

    /// Newest first.
    async fn list_alerts(&self, filter: &AlertFilter) -> StoreResult<Vec<Alert>>;

    /// Move to `target` only from `AlertStatus::sources_for(target)`. Entering
    /// `Resolved` sets `resolved_at = now`.
    async fn transition_alert(&self, id: Uuid, target: AlertStatus, now: DateTime<Utc>) -> StoreResult<Transition>;

    /// Take the exclusive right to send this alert's notification. Fails when
    /// the notification was sent or another claim newer than `stale_before` exists.
    async fn claim_notification(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn mark_notification_sent(&self, id: Uuid) -> StoreResult<()>;

    async fn release_notification_claim(&self, id: Uuid) -> StoreResult<()>;

    async fn severity_counts_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<SeverityCount>>;

    async fn count_by_status(&self, status: AlertStatus, severity: Option<AlertSeverity>) -> StoreResult<i64>;

    /// Whether `rule` has an unresolved alert on `source` created since `since`.
    async fn exists_for_source(&self, rule: &str, source: &str, since: DateTime<Utc>) -> StoreResult<bool>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// `Conflict` when the email or username is taken.
    async fn create_account(&self, account: NewAccount) -> StoreResult<Account>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    async fn get_account(&self, id: Uuid) -> StoreResult<Account>;

    /// Increment the failed-attempt counter and, when it reaches `threshold`,
    /// set `locked_until = lock_until`. Nothing is written while a lock is in
    /// force at `now`.
    async fn record_failed_attempt(
        &self,
        id: Uuid,
        threshold: i32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Guarded<FailedAttempt>>;

    /// Reset the counter, clear the lock and stamp `last_login_at`, unless a
    /// lock is in force at `now`.
    async fn record_success(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Guarded<Account>>;

    async fn unlock_account(&self, id: Uuid) -> StoreResult<Account>;
}

/// A complete backend.
#[async_trait]
pub trait Store: EventStore + AlertStore + AccountStore {
    /// Cheap reachability probe for health reporting.
    async fn ping(&self) -> StoreResult<()>;

    fn backend_name(&self) -> &'static str;
}
