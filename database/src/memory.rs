//! In-process backend used by tests and by the service when no database URL
//! is configured. Row-level atomicity comes from holding a `DashMap` entry
//! (or the event log lock) for the whole conditional update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use shield_models::{
    alert::meta, effective_limit, Account, Alert, AlertFilter, AlertSeverity, AlertStatus, Event, EventFilter,
    EventSeverity, EventType, FailedAttempt, NewAccount, NewAlert, NewEvent, SeverityCount, SourceCount, TypeCount,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::{AccountStore, AlertStore, EventStore, Guarded, Store, Transition};

#[derive(Debug, Clone)]
struct AlertEntry {
    alert: Alert,
    seq: u64,
    claimed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryStore {
    events: RwLock<Vec<Event>>,
    alerts: DashMap<Uuid, AlertEntry>,
    alert_seq: AtomicU64,
    accounts: DashMap<Uuid, Account>,
    // Serialises account creation so the email/username check and insert are atomic.
    registration: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append with an explicit timestamp, for replaying history.
    pub fn append_event_at(&self, event: NewEvent, timestamp: DateTime<Utc>) -> Event {
        let event = Event {
            id: Uuid::new_v4(),
            event_type: event.event_type,
            severity: event.severity,
            source_address: event.source_address,
            account_id: event.account_id,
            user_agent: event.user_agent,
            description: event.description,
            metadata: event.metadata,
            timestamp,
            resolved: false,
        };
        self.events.write().push(event.clone());
        event
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    /// Every stored alert, newest first.
    pub fn all_alerts(&self) -> Vec<Alert> {
        let mut entries: Vec<AlertEntry> = self.alerts.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| {
            b.alert
                .created_at
                .cmp(&a.alert.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        entries.into_iter().map(|e| e.alert).collect()
    }

    /// Every stored event, newest first.
    pub fn all_events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.read().iter().rev().cloned().collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events
    }

    fn events_since(&self, since: DateTime<Utc>) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append_event(&self, event: NewEvent) -> StoreResult<Event> {
        Ok(self.append_event_at(event, Utc::now()))
    }

    async fn list_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let limit = effective_limit(filter.limit) as usize;
        Ok(self
            .all_events()
            .into_iter()
            .filter(|e| filter.severity.map_or(true, |s| e.severity == s))
            .filter(|e| filter.event_type.map_or(true, |t| e.event_type == t))
            .take(limit)
            .collect())
    }

    async fn count_by_source(
        &self,
        since: DateTime<Utc>,
        event_type: Option<EventType>,
        min_count: i64,
    ) -> StoreResult<Vec<SourceCount>> {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for event in self.events_since(since) {
            if event_type.map_or(true, |t| event.event_type == t) {
                *counts.entry(event.source_address).or_default() += 1;
            }
        }

        let mut result: Vec<SourceCount> = counts
            .into_iter()
            .filter(|(_, count)| *count >= min_count)
            .map(|(source_address, count)| SourceCount { source_address, count })
            .collect();
        result.sort_by(|a, b| b.count.cmp(&a.count).then(a.source_address.cmp(&b.source_address)));
        Ok(result)
    }

    async fn count_by_type(&self, since: DateTime<Utc>) -> StoreResult<Vec<TypeCount>> {
        let mut counts: HashMap<EventType, (i64, i64)> = HashMap::new();
        for event in self.events_since(since) {
            let entry = counts.entry(event.event_type).or_default();
            entry.0 += 1;
            if event.severity == EventSeverity::Critical {
                entry.1 += 1;
            }
        }

        let mut result: Vec<TypeCount> = counts
            .into_iter()
            .map(|(event_type, (count, critical_count))| TypeCount {
                event_type,
                count,
                critical_count,
            })
            .collect();
        result.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.event_type.as_str().cmp(b.event_type.as_str()))
        });
        Ok(result)
    }

    async fn count_since(
        &self,
        since: DateTime<Utc>,
        event_type: Option<EventType>,
        severity: Option<EventSeverity>,
    ) -> StoreResult<i64> {
        Ok(self
            .events_since(since)
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| severity.map_or(true, |s| e.severity == s))
            .count() as i64)
    }

    async fn distinct_sources(&self, event_type: EventType, since: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let mut sources: Vec<String> = self
            .events_since(since)
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .map(|e| e.source_address)
            .collect();
        sources.sort();
        sources.dedup();
        Ok(sources)
    }

    async fn mark_event_resolved(&self, id: Uuid) -> StoreResult<Event> {
        let mut events = self.events.write();
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::not_found("Event", id))?;
        event.resolved = true;
        Ok(event.clone())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert_alert(&self, alert: NewAlert) -> StoreResult<Alert> {
        let stored = Alert {
            id: Uuid::new_v4(),
            title: alert.title,
            message: alert.message,
            category: alert.category,
            severity: alert.severity,
            status: AlertStatus::Active,
            notification_sent: false,
            metadata: alert.metadata,
            created_at: Utc::now(),
            resolved_at: None,
        };

        self.alerts.insert(
            stored.id,
            AlertEntry {
                alert: stored.clone(),
                seq: self.alert_seq.fetch_add(1, Ordering::SeqCst),
                claimed_at: None,
            },
        );
        Ok(stored)
    }

    async fn get_alert(&self, id: Uuid) -> StoreResult<Alert> {
        self.alerts
            .get(&id)
            .map(|e| e.alert.clone())
            .ok_or_else(|| StoreError::not_found("Alert", id))
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> StoreResult<Vec<Alert>> {
        let limit = effective_limit(filter.limit) as usize;
        Ok(self
            .all_alerts()
            .into_iter()
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| filter.severity.map_or(true, |s| a.severity == s))
            .take(limit)
            .collect())
    }

    async fn transition_alert(&self, id: Uuid, target: AlertStatus, now: DateTime<Utc>) -> StoreResult<Transition> {
        let mut entry = self
            .alerts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Alert", id))?;

        if !entry.alert.status.can_transition_to(target) {
            return Ok(Transition::NotApplied(entry.alert.clone()));
        }

        entry.alert.status = target;
        if target == AlertStatus::Resolved {
            entry.alert.resolved_at = Some(now);
        }
        Ok(Transition::Applied(entry.alert.clone()))
    }

    async fn claim_notification(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let Some(mut entry) = self.alerts.get_mut(&id) else {
            return Ok(false);
        };

        let claimable = !entry.alert.notification_sent
            && entry.claimed_at.map_or(true, |claimed| claimed < stale_before);
        if claimable {
            entry.claimed_at = Some(now);
        }
        Ok(claimable)
    }

    async fn mark_notification_sent(&self, id: Uuid) -> StoreResult<()> {
        let mut entry = self
            .alerts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Alert", id))?;
        entry.alert.notification_sent = true;
        Ok(())
    }

    async fn release_notification_claim(&self, id: Uuid) -> StoreResult<()> {
        if let Some(mut entry) = self.alerts.get_mut(&id) {
            if !entry.alert.notification_sent {
                entry.claimed_at = None;
            }
        }
        Ok(())
    }

    async fn severity_counts_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<SeverityCount>> {
        let mut counts: BTreeMap<AlertSeverity, i64> = BTreeMap::new();
        for entry in self.alerts.iter() {
            if entry.alert.created_at >= since {
                *counts.entry(entry.alert.severity).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(severity, count)| SeverityCount { severity, count })
            .collect())
    }

    async fn count_by_status(&self, status: AlertStatus, severity: Option<AlertSeverity>) -> StoreResult<i64> {
        Ok(self
            .alerts
            .iter()
            .filter(|e| e.alert.status == status)
            .filter(|e| severity.map_or(true, |s| e.alert.severity == s))
            .count() as i64)
    }

    async fn exists_for_source(&self, rule: &str, source: &str, since: DateTime<Utc>) -> StoreResult<bool> {
        Ok(self.alerts.iter().any(|e| {
            e.alert.created_at >= since
                && e.alert.status != AlertStatus::Resolved
                && e.alert.metadata_value(meta::RULE) == Some(rule)
                && e.alert.metadata_value(meta::IP_ADDRESS) == Some(source)
        }))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        let _guard = self.registration.lock();

        let taken = self.accounts.iter().any(|a| {
            a.email.eq_ignore_ascii_case(&account.email) || a.username == account.username
        });
        if taken {
            return Err(StoreError::Conflict("User already exists".to_string()));
        }

        let stored = Account {
            id: Uuid::new_v4(),
            username: account.username,
            email: account.email,
            credential_hash: account.credential_hash,
            role: account.role,
            is_active: true,
            failed_attempt_count: 0,
            locked_until: None,
            last_login_at: None,
            created_at: Utc::now(),
        };
        self.accounts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .accounts
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .map(|a| a.value().clone()))
    }

    async fn get_account(&self, id: Uuid) -> StoreResult<Account> {
        self.accounts
            .get(&id)
            .map(|a| a.value().clone())
            .ok_or_else(|| StoreError::not_found("Account", id))
    }

    async fn record_failed_attempt(
        &self,
        id: Uuid,
        threshold: i32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Guarded<FailedAttempt>> {
        let mut account = self
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Account", id))?;
        if let Some(until) = lock_in_force(&account, now) {
            return Ok(Guarded::Locked(until));
        }

        account.failed_attempt_count += 1;
        let newly_locked = account.failed_attempt_count >= threshold;
        if newly_locked {
            account.locked_until = Some(lock_until);
        }

        Ok(Guarded::Applied(FailedAttempt {
            count: account.failed_attempt_count,
            locked_until: account.locked_until,
            newly_locked,
        }))
    }

    async fn record_success(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Guarded<Account>> {
        let mut account = self
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Account", id))?;
        if let Some(until) = lock_in_force(&account, now) {
            return Ok(Guarded::Locked(until));
        }

        account.failed_attempt_count = 0;
        account.locked_until = None;
        account.last_login_at = Some(now);
        Ok(Guarded::Applied(account.clone()))
    }

    async fn unlock_account(&self, id: Uuid) -> StoreResult<Account> {
        let mut account = self
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Account", id))?;
        account.failed_attempt_count = 0;
        account.locked_until = None;
        Ok(account.clone())
    }
}

fn lock_in_force(account: &Account, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    account.locked_until.filter(|until| *until > now)
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shield_models::{AlertCategory, UserRole};
    use std::sync::Arc;

    fn new_account(name: &str) -> NewAccount {
        NewAccount {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            credential_hash: "hash".to_string(),
            role: UserRole::User,
        }
    }

    fn failure(source: &str) -> NewEvent {
        NewEvent::new(EventType::LoginFailure, EventSeverity::High, source)
    }

    #[tokio::test]
    async fn duplicate_email_or_username_conflicts() {
        let store = MemoryStore::new();
        store.create_account(new_account("alice")).await.unwrap();

        let mut same_email = new_account("alice2");
        same_email.email = "ALICE@example.com".into();
        assert!(matches!(
            store.create_account(same_email).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.create_account(new_account("alice")).await,
            Err(StoreError::Conflict(_))
        ));
    }

    fn applied<T: std::fmt::Debug>(result: Guarded<T>) -> T {
        match result {
            Guarded::Applied(value) => value,
            other => panic!("expected an applied write, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn lock_applies_exactly_once_at_threshold() {
        let store = MemoryStore::new();
        let account = store.create_account(new_account("alice")).await.unwrap();
        let now = Utc::now();
        let lock_until = now + Duration::minutes(30);

        for expected in 1..5 {
            let attempt = applied(store.record_failed_attempt(account.id, 5, lock_until, now).await.unwrap());
            assert_eq!(attempt.count, expected);
            assert!(!attempt.newly_locked);
            assert!(attempt.locked_until.is_none());
        }

        let fifth = applied(store.record_failed_attempt(account.id, 5, lock_until, now).await.unwrap());
        assert!(fifth.newly_locked);
        assert_eq!(fifth.locked_until, Some(lock_until));

        let sixth = store
            .record_failed_attempt(account.id, 5, now + Duration::minutes(31), now)
            .await
            .unwrap();
        assert_eq!(sixth, Guarded::Locked(lock_until));
        assert_eq!(store.get_account(account.id).await.unwrap().failed_attempt_count, 5);
    }

    #[tokio::test]
    async fn concurrent_failures_stop_counting_at_the_lock() {
        let store = Arc::new(MemoryStore::new());
        let account = store.create_account(new_account("bob")).await.unwrap();
        let now = Utc::now();
        let lock_until = now + Duration::minutes(30);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.record_failed_attempt(account.id, 5, lock_until, now).await.unwrap()
            }));
        }

        let (mut locks, mut refused) = (0, 0);
        for handle in handles {
            match handle.await.unwrap() {
                Guarded::Applied(attempt) if attempt.newly_locked => locks += 1,
                Guarded::Applied(_) => {}
                Guarded::Locked(_) => refused += 1,
            }
        }
        assert_eq!(locks, 1);
        assert_eq!(refused, 5);
        assert_eq!(store.get_account(account.id).await.unwrap().failed_attempt_count, 5);
    }

    #[tokio::test]
    async fn success_resets_counter_and_lock() {
        let store = MemoryStore::new();
        let account = store.create_account(new_account("carol")).await.unwrap();
        let now = Utc::now();
        for _ in 0..3 {
            store
                .record_failed_attempt(account.id, 5, now + Duration::minutes(30), now)
                .await
                .unwrap();
        }

        let account = applied(store.record_success(account.id, now).await.unwrap());
        assert_eq!(account.failed_attempt_count, 0);
        assert!(account.locked_until.is_none());
        assert_eq!(account.last_login_at, Some(now));
    }

    #[tokio::test]
    async fn success_cannot_clear_a_lock_in_force() {
        let store = MemoryStore::new();
        let account = store.create_account(new_account("dan")).await.unwrap();
        let now = Utc::now();
        let lock_until = now + Duration::minutes(30);
        for _ in 0..5 {
            store.record_failed_attempt(account.id, 5, lock_until, now).await.unwrap();
        }

        let during = now + Duration::minutes(10);
        assert!(matches!(
            store.record_success(account.id, during).await.unwrap(),
            Guarded::Locked(until) if until == lock_until
        ));
        let stored = store.get_account(account.id).await.unwrap();
        assert_eq!(stored.locked_until, Some(lock_until));
        assert!(stored.last_login_at.is_none());

        let after = now + Duration::minutes(31);
        let account = applied(store.record_success(account.id, after).await.unwrap());
        assert!(account.locked_until.is_none());
    }

    #[tokio::test]
    async fn failure_after_expiry_locks_again() {
        let store = MemoryStore::new();
        let account = store.create_account(new_account("erin")).await.unwrap();
        let now = Utc::now();
        for _ in 0..5 {
            store
                .record_failed_attempt(account.id, 5, now + Duration::minutes(30), now)
                .await
                .unwrap();
        }

        let after = now + Duration::minutes(31);
        let attempt = applied(
            store
                .record_failed_attempt(account.id, 5, after + Duration::minutes(30), after)
                .await
                .unwrap(),
        );
        assert_eq!(attempt.count, 6);
        assert!(attempt.newly_locked);
    }

    #[tokio::test]
    async fn resolved_alerts_never_move() {
        let store = MemoryStore::new();
        let alert = store
            .insert_alert(NewAlert::new("t", "m", AlertCategory::System, AlertSeverity::Info))
            .await
            .unwrap();
        let now = Utc::now();

        let resolved = store.transition_alert(alert.id, AlertStatus::Resolved, now).await.unwrap();
        match resolved {
            Transition::Applied(a) => {
                assert_eq!(a.status, AlertStatus::Resolved);
                assert_eq!(a.resolved_at, Some(now));
            }
            other => panic!("unexpected {:?}", other),
        }

        for target in [AlertStatus::Active, AlertStatus::Acknowledged, AlertStatus::Resolved] {
            let result = store.transition_alert(alert.id, target, Utc::now()).await.unwrap();
            assert!(matches!(result, Transition::NotApplied(a) if a.resolved_at == Some(now)));
        }
    }

    #[tokio::test]
    async fn notification_claim_is_exclusive() {
        let store = MemoryStore::new();
        let alert = store
            .insert_alert(NewAlert::new("t", "m", AlertCategory::Security, AlertSeverity::Critical))
            .await
            .unwrap();
        let now = Utc::now();
        let stale_before = now - Duration::seconds(60);

        assert!(store.claim_notification(alert.id, now, stale_before).await.unwrap());
        assert!(!store.claim_notification(alert.id, now, stale_before).await.unwrap());

        // An abandoned claim can be taken over once it is older than the TTL.
        let later = now + Duration::seconds(120);
        assert!(store
            .claim_notification(alert.id, later, later - Duration::seconds(60))
            .await
            .unwrap());

        store.mark_notification_sent(alert.id).await.unwrap();
        store.release_notification_claim(alert.id).await.unwrap();
        let far_later = later + Duration::hours(1);
        assert!(!store.claim_notification(alert.id, far_later, far_later).await.unwrap());
        assert!(store.get_alert(alert.id).await.unwrap().notification_sent);
    }

    #[tokio::test]
    async fn count_by_source_respects_window_type_and_threshold() {
        let store = MemoryStore::new();
        let now = Utc::now();

        for _ in 0..3 {
            store.append_event_at(failure("10.0.0.5"), now - Duration::minutes(1));
        }
        store.append_event_at(failure("10.0.0.6"), now - Duration::minutes(1));
        store.append_event_at(failure("10.0.0.6"), now - Duration::minutes(1));
        store.append_event_at(failure("10.0.0.6"), now - Duration::minutes(10));
        store.append_event_at(
            NewEvent::new(EventType::LoginSuccess, EventSeverity::Low, "10.0.0.6"),
            now - Duration::minutes(1),
        );

        let since = now - Duration::minutes(5);
        let hits = store
            .count_by_source(since, Some(EventType::LoginFailure), 3)
            .await
            .unwrap();
        assert_eq!(
            hits,
            vec![SourceCount {
                source_address: "10.0.0.5".into(),
                count: 3
            }]
        );

        let all_types = store.count_by_source(since, None, 3).await.unwrap();
        assert_eq!(all_types.len(), 2);
    }

    #[tokio::test]
    async fn list_events_is_newest_first_and_filtered() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.append_event_at(failure("a"), now - Duration::minutes(2));
        store.append_event_at(failure("b"), now - Duration::minutes(1));
        store.append_event_at(
            NewEvent::new(EventType::FirewallBlock, EventSeverity::High, "c"),
            now,
        );

        let failures = store
            .list_events(&EventFilter {
                event_type: Some(EventType::LoginFailure),
                ..Default::default()
            })
            .await
            .unwrap();
        let sources: Vec<&str> = failures.iter().map(|e| e.source_address.as_str()).collect();
        assert_eq!(sources, vec!["b", "a"]);

        let resolved = store.mark_event_resolved(failures[0].id).await.unwrap();
        assert!(resolved.resolved);
        assert_eq!(resolved.timestamp, failures[0].timestamp);
    }
}
