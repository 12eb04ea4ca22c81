//! Per-account lockout after repeated credential failures.

use chrono::{DateTime, Utc};
use shield_config::LockoutConfig;
use shield_database::{Guarded, Store};
use shield_models::{alert::meta, Account, AlertCategory, AlertSeverity, FailedAttempt, NewAlert};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::alerts::AlertService;
use crate::errors::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Success(Account),
    InvalidCredential { attempt: FailedAttempt },
    /// A lock was in force; nothing was verified or changed.
    Locked { until: DateTime<Utc> },
}

pub struct LockoutGuard {
    store: Arc<dyn Store>,
    alerts: Arc<AlertService>,
    threshold: i32,
    duration: chrono::Duration,
}

impl LockoutGuard {
    pub fn new(store: Arc<dyn Store>, alerts: Arc<AlertService>, config: &LockoutConfig) -> Self {
        Self {
            store,
            alerts,
            threshold: config.threshold,
            duration: chrono::Duration::from_std(config.duration).unwrap_or_else(|_| chrono::Duration::minutes(30)),
        }
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    pub async fn attempt_login(
        &self,
        account: &Account,
        credential: &str,
        source_address: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<LoginOutcome> {
        // The snapshot may predate a lock; the store writes below re-check it.
        if let Some(until) = account.locked_until.filter(|until| *until > now) {
            return Ok(self.refuse(account, source_address, until).await);
        }

        if verify_credential(credential, &account.credential_hash).await? {
            return match self.store.record_success(account.id, now).await? {
                Guarded::Applied(account) => Ok(LoginOutcome::Success(account)),
                Guarded::Locked(until) => Ok(self.refuse(account, source_address, until).await),
            };
        }

        let attempt = match self
            .store
            .record_failed_attempt(account.id, self.threshold, now + self.duration, now)
            .await?
        {
            Guarded::Applied(attempt) => attempt,
            Guarded::Locked(until) => return Ok(self.refuse(account, source_address, until).await),
        };

        if attempt.newly_locked {
            warn!(
                account_id = %account.id,
                attempts = attempt.count,
                source = source_address,
                "Account locked after repeated failed logins"
            );
            self.raise(
                NewAlert::new(
                    "Account Locked",
                    format!(
                        "Account {} locked due to multiple failed login attempts",
                        account.email
                    ),
                    AlertCategory::Security,
                    AlertSeverity::Danger,
                )
                .meta(meta::ATTEMPTS, attempt.count.to_string()),
                account,
                source_address,
            )
            .await;
        } else {
            info!(account_id = %account.id, attempts = attempt.count, "Failed login attempt");
        }

        Ok(LoginOutcome::InvalidCredential { attempt })
    }

    async fn refuse(&self, account: &Account, source_address: &str, until: DateTime<Utc>) -> LoginOutcome {
        warn!(account_id = %account.id, source = source_address, "Login attempt on locked account");
        self.raise(
            NewAlert::new(
                "Account Lockout Attempt",
                format!("Locked account login attempt for {}", account.email),
                AlertCategory::Security,
                AlertSeverity::Warning,
            ),
            account,
            source_address,
        )
        .await;
        LoginOutcome::Locked { until }
    }

    // The login outcome stands even if the alert cannot be stored.
    async fn raise(&self, alert: NewAlert, account: &Account, source_address: &str) {
        let alert = alert
            .meta(meta::EMAIL, account.email.as_str())
            .meta(meta::ACCOUNT_ID, account.id.to_string())
            .meta(meta::IP_ADDRESS, source_address);
        if let Err(e) = self.alerts.create_alert(alert).await {
            error!(account_id = %account.id, error = %e, "Failed to record lockout alert");
        }
    }
}

/// bcrypt is deliberately slow; keep it off the async workers.
async fn verify_credential(credential: &str, hash: &str) -> ServiceResult<bool> {
    let credential = credential.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(credential, &hash))
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?
        .map_err(|e| ServiceError::Internal(format!("credential check failed: {}", e)))
}

pub async fn hash_credential(credential: &str, cost: u32) -> ServiceResult<String> {
    let credential = credential.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(credential, cost))
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?
        .map_err(|e| ServiceError::Internal(format!("credential hashing failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{tests::RecordingTransport, NotificationDispatcher};
    use shield_config::NotificationConfig;
    use shield_database::{AccountStore, MemoryStore};
    use shield_models::{NewAccount, UserRole};
    use std::time::Duration;

    const COST: u32 = 4;

    struct Fixture {
        store: Arc<MemoryStore>,
        guard: LockoutGuard,
        account: Account,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            Arc::new(RecordingTransport::default()),
            &NotificationConfig::default(),
            true,
        );
        let alerts = Arc::new(AlertService::new(store.clone(), Arc::new(dispatcher)));
        let guard = LockoutGuard::new(store.clone(), alerts, &LockoutConfig::default());
        let account = store
            .create_account(NewAccount {
                username: "alice".into(),
                email: "alice@example.com".into(),
                credential_hash: hash_credential("correct horse", COST).await.unwrap(),
                role: UserRole::User,
            })
            .await
            .unwrap();
        Fixture { store, guard, account }
    }

    impl Fixture {
        async fn attempt(&self, credential: &str, now: DateTime<Utc>) -> LoginOutcome {
            let account = self.store.get_account(self.account.id).await.unwrap();
            self.guard
                .attempt_login(&account, credential, "192.0.2.10", now)
                .await
                .unwrap()
        }

        fn danger_alerts(&self) -> usize {
            self.store
                .all_alerts()
                .iter()
                .filter(|a| a.severity == AlertSeverity::Danger)
                .count()
        }
    }

    #[tokio::test]
    async fn fifth_failure_locks_for_thirty_minutes() {
        let f = fixture().await;
        let now = Utc::now();

        for expected in 1..=4 {
            match f.attempt("wrong", now).await {
                LoginOutcome::InvalidCredential { attempt } => {
                    assert_eq!(attempt.count, expected);
                    assert!(!attempt.newly_locked);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(f.danger_alerts(), 0);

        match f.attempt("wrong", now).await {
            LoginOutcome::InvalidCredential { attempt } => {
                assert!(attempt.newly_locked);
                assert_eq!(attempt.locked_until, Some(now + chrono::Duration::minutes(30)));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let alerts = f.store.all_alerts();
        assert_eq!(f.danger_alerts(), 1);
        assert_eq!(alerts[0].metadata_value(meta::IP_ADDRESS), Some("192.0.2.10"));
        assert_eq!(alerts[0].metadata_value(meta::EMAIL), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn locked_account_rejects_correct_password_without_mutation() {
        let f = fixture().await;
        let now = Utc::now();
        for _ in 0..5 {
            f.attempt("wrong", now).await;
        }

        let later = now + chrono::Duration::minutes(1);
        assert!(matches!(f.attempt("correct horse", later).await, LoginOutcome::Locked { .. }));
        assert!(matches!(f.attempt("wrong", later).await, LoginOutcome::Locked { .. }));

        let account = f.store.get_account(f.account.id).await.unwrap();
        assert_eq!(account.failed_attempt_count, 5);
        assert_eq!(f.danger_alerts(), 1);
        let warnings = f
            .store
            .all_alerts()
            .iter()
            .filter(|a| a.severity == AlertSeverity::Warning && a.title == "Account Lockout Attempt")
            .count();
        assert_eq!(warnings, 2);
    }

    #[tokio::test]
    async fn stale_snapshot_cannot_bypass_a_lock() {
        let f = fixture().await;
        let now = Utc::now();
        for _ in 0..4 {
            f.attempt("wrong", now).await;
        }
        let stale = f.store.get_account(f.account.id).await.unwrap();
        assert!(stale.locked_until.is_none());
        f.attempt("wrong", now).await;

        for credential in ["wrong", "correct horse"] {
            let outcome = f
                .guard
                .attempt_login(&stale, credential, "192.0.2.10", now)
                .await
                .unwrap();
            assert!(matches!(outcome, LoginOutcome::Locked { until } if until == now + chrono::Duration::minutes(30)));
        }

        let account = f.store.get_account(f.account.id).await.unwrap();
        assert_eq!(account.failed_attempt_count, 5);
        assert_eq!(account.locked_until, Some(now + chrono::Duration::minutes(30)));
        assert!(account.last_login_at.is_none());
    }

    #[tokio::test]
    async fn success_resets_count_and_lock() {
        let f = fixture().await;
        let now = Utc::now();
        f.attempt("wrong", now).await;
        f.attempt("wrong", now).await;

        match f.attempt("correct horse", now).await {
            LoginOutcome::Success(account) => {
                assert_eq!(account.failed_attempt_count, 0);
                assert!(account.locked_until.is_none());
                assert_eq!(account.last_login_at, Some(now));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn expired_lock_allows_login() {
        let f = fixture().await;
        let now = Utc::now();
        for _ in 0..5 {
            f.attempt("wrong", now).await;
        }

        let after_lock = now + chrono::Duration::from_std(Duration::from_secs(31 * 60)).unwrap();
        assert!(matches!(f.attempt("correct horse", after_lock).await, LoginOutcome::Success(_)));
    }
}
