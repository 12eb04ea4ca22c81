use chrono::{DateTime, Utc};
use shield_config::AuthConfig;
use shield_database::{Store, StoreError};
use shield_middleware::JwtKeys;
use shield_models::{
    Account, AccountProfile, AuthResponse, Claims, EventSeverity, EventType, LoginRequest, NewAccount, NewEvent,
    RegisterRequest, UserRole,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::errors::{ServiceError, ServiceResult};
use crate::lockout::{hash_credential, LockoutGuard, LoginOutcome};

pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const ACCOUNT_LOCKED: &str = "Account is locked. Please try again later.";

/// Where a request came from, for event records.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub source_address: String,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(source_address: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            source_address: source_address.into(),
            user_agent,
        }
    }
}

/// What `login` produced. A lock is an outcome, not an error.
#[derive(Debug)]
pub enum LoginResult {
    Authenticated(AuthResponse),
    Locked { until: DateTime<Utc> },
}

pub struct AuthService {
    store: Arc<dyn Store>,
    guard: Arc<LockoutGuard>,
    keys: Arc<JwtKeys>,
    bcrypt_cost: u32,
    admin_emails: Vec<String>,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, guard: Arc<LockoutGuard>, keys: Arc<JwtKeys>, config: &AuthConfig) -> Self {
        Self {
            store,
            guard,
            keys,
            bcrypt_cost: config.bcrypt_cost,
            admin_emails: config.admin_emails.clone(),
        }
    }

    pub async fn register(&self, request: RegisterRequest, client: &ClientInfo) -> ServiceResult<AuthResponse> {
        request.validate()?;

        let email = request.email.trim().to_lowercase();
        let role = if self.admin_emails.contains(&email) {
            UserRole::Admin
        } else {
            UserRole::User
        };
        let credential_hash = hash_credential(&request.password, self.bcrypt_cost).await?;

        let account = self
            .store
            .create_account(NewAccount {
                username: request.username.trim().to_string(),
                email,
                credential_hash,
                role,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => ServiceError::Validation("User already exists".to_string()),
                other => other.into(),
            })?;

        info!(account_id = %account.id, role = %account.role, "Account registered");
        self.record_event(
            NewEvent::new(EventType::LoginSuccess, EventSeverity::Low, client.source_address.as_str())
                .account(account.id)
                .user_agent(client.user_agent.clone())
                .description("New user registration"),
        )
        .await;

        self.respond("User registered successfully", &account)
    }

    pub async fn login(&self, request: LoginRequest, client: &ClientInfo) -> ServiceResult<LoginResult> {
        request.validate()?;

        let email = request.email.trim().to_lowercase();
        let account = match self.store.find_by_email(&email).await? {
            Some(account) if account.is_active => account,
            _ => {
                self.record_event(
                    NewEvent::new(EventType::LoginFailure, EventSeverity::Medium, client.source_address.as_str())
                        .user_agent(client.user_agent.clone())
                        .description(format!("Failed login attempt for {}", email)),
                )
                .await;
                return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
            }
        };

        let now = Utc::now();
        match self
            .guard
            .attempt_login(&account, &request.password, &client.source_address, now)
            .await?
        {
            LoginOutcome::Success(account) => {
                self.record_event(
                    NewEvent::new(EventType::LoginSuccess, EventSeverity::Low, client.source_address.as_str())
                        .account(account.id)
                        .user_agent(client.user_agent.clone())
                        .description("Successful login"),
                )
                .await;
                info!(account_id = %account.id, "Login succeeded");
                Ok(LoginResult::Authenticated(self.respond("Login successful", &account)?))
            }
            LoginOutcome::InvalidCredential { attempt } => {
                let severity = if attempt.count > 1 {
                    EventSeverity::High
                } else {
                    EventSeverity::Medium
                };
                self.record_event(
                    NewEvent::new(EventType::LoginFailure, severity, client.source_address.as_str())
                        .account(account.id)
                        .user_agent(client.user_agent.clone())
                        .description(format!("Invalid password for {}", account.email))
                        .meta("attempts", attempt.count.to_string()),
                )
                .await;
                Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()))
            }
            LoginOutcome::Locked { until } => {
                self.record_event(
                    NewEvent::new(EventType::LoginFailure, EventSeverity::High, client.source_address.as_str())
                        .account(account.id)
                        .user_agent(client.user_agent.clone())
                        .description(format!("Login attempt on locked account {}", account.email)),
                )
                .await;
                Ok(LoginResult::Locked { until })
            }
        }
    }

    /// Resolve the token subject to an active account.
    pub async fn authenticated_account(&self, claims: &Claims) -> ServiceResult<Account> {
        let id = claims
            .account_id()
            .ok_or_else(|| ServiceError::Unauthorized("Invalid token subject".to_string()))?;

        match self.store.get_account(id).await {
            Ok(account) if account.is_active => Ok(account),
            Ok(_) => Err(ServiceError::Unauthorized("Account is inactive".to_string())),
            Err(e) if e.is_not_found() => Err(ServiceError::Unauthorized("Account no longer exists".to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn me(&self, claims: &Claims) -> ServiceResult<AccountProfile> {
        let account = self.authenticated_account(claims).await?;
        Ok(AccountProfile::from(&account))
    }

    pub async fn unlock(&self, id: Uuid) -> ServiceResult<AccountProfile> {
        let account = self.store.unlock_account(id).await?;
        warn!(account_id = %id, "Account unlocked by administrator");
        Ok(AccountProfile::from(&account))
    }

    fn respond(&self, message: &str, account: &Account) -> ServiceResult<AuthResponse> {
        let token = self
            .keys
            .issue(account, Utc::now())
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        Ok(AuthResponse {
            message: message.to_string(),
            token,
            user: AccountProfile::from(account),
        })
    }

    // Audit events never fail the request they describe.
    async fn record_event(&self, event: NewEvent) {
        if let Err(e) = self.store.append_event(event).await {
            error!(error = %e, "Failed to record security event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertService;
    use crate::notification::{tests::RecordingTransport, NotificationDispatcher};
    use shield_config::{LockoutConfig, NotificationConfig};
    use shield_database::{AccountStore, MemoryStore};
    use shield_models::AlertSeverity;

    fn service(store: Arc<MemoryStore>, admin_emails: Vec<String>) -> AuthService {
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            Arc::new(RecordingTransport::default()),
            &NotificationConfig::default(),
            true,
        );
        let alerts = Arc::new(AlertService::new(store.clone(), Arc::new(dispatcher)));
        let guard = Arc::new(LockoutGuard::new(store.clone(), alerts, &LockoutConfig::default()));
        let config = AuthConfig {
            bcrypt_cost: 4,
            admin_emails,
            ..AuthConfig::default()
        };
        let keys = Arc::new(JwtKeys::from_config(&config));
        AuthService::new(store, guard, keys, &config)
    }

    fn client() -> ClientInfo {
        ClientInfo::new("198.51.100.7", Some("tests".to_string()))
    }

    fn register_request(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: "s3cret!".into(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn register_issues_token_and_records_event() {
        let store = Arc::new(MemoryStore::new());
        let auth = service(store.clone(), vec![]);

        let response = auth.register(register_request("alice", "Alice@Example.com"), &client()).await.unwrap();
        assert_eq!(response.user.email, "alice@example.com");
        assert_eq!(response.user.role, UserRole::User);
        assert!(!response.token.is_empty());

        let events = store.all_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::LoginSuccess);
        assert_eq!(events[0].severity, EventSeverity::Low);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let auth = service(store, vec![]);
        auth.register(register_request("alice", "alice@example.com"), &client()).await.unwrap();

        let err = auth
            .register(register_request("alice2", "alice@example.com"), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m == "User already exists"));
    }

    #[tokio::test]
    async fn configured_admin_email_gets_admin_role() {
        let store = Arc::new(MemoryStore::new());
        let auth = service(store, vec!["root@example.com".to_string()]);

        let response = auth.register(register_request("root", "root@example.com"), &client()).await.unwrap();
        assert_eq!(response.user.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_the_same() {
        let store = Arc::new(MemoryStore::new());
        let auth = service(store.clone(), vec![]);
        auth.register(register_request("alice", "alice@example.com"), &client()).await.unwrap();

        let unknown = auth.login(login_request("nobody@example.com", "x"), &client()).await.unwrap_err();
        let wrong = auth.login(login_request("alice@example.com", "x"), &client()).await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());

        let failures: Vec<_> = store
            .all_events()
            .into_iter()
            .filter(|e| e.event_type == EventType::LoginFailure)
            .collect();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|e| e.severity == EventSeverity::Medium));
    }

    #[tokio::test]
    async fn repeated_failures_escalate_then_lock() {
        let store = Arc::new(MemoryStore::new());
        let auth = service(store.clone(), vec![]);
        auth.register(register_request("alice", "alice@example.com"), &client()).await.unwrap();

        for _ in 0..5 {
            let err = auth.login(login_request("alice@example.com", "nope"), &client()).await.unwrap_err();
            assert!(matches!(err, ServiceError::Unauthorized(_)));
        }

        let result = auth
            .login(login_request("alice@example.com", "s3cret!"), &client())
            .await
            .unwrap();
        assert!(matches!(result, LoginResult::Locked { .. }));

        let high = store
            .all_events()
            .into_iter()
            .filter(|e| e.event_type == EventType::LoginFailure && e.severity == EventSeverity::High)
            .count();
        // Failures two to five, plus the attempt on the locked account.
        assert_eq!(high, 5);

        let danger = store
            .all_alerts()
            .into_iter()
            .filter(|a| a.severity == AlertSeverity::Danger)
            .count();
        assert_eq!(danger, 1);
    }

    #[tokio::test]
    async fn unlock_restores_login() {
        let store = Arc::new(MemoryStore::new());
        let auth = service(store.clone(), vec![]);
        let registered = auth.register(register_request("alice", "alice@example.com"), &client()).await.unwrap();
        for _ in 0..5 {
            let _ = auth.login(login_request("alice@example.com", "nope"), &client()).await;
        }

        let profile = auth.unlock(registered.user.id).await.unwrap();
        assert_eq!(profile.id, registered.user.id);
        assert_eq!(store.get_account(profile.id).await.unwrap().failed_attempt_count, 0);

        let result = auth
            .login(login_request("alice@example.com", "s3cret!"), &client())
            .await
            .unwrap();
        assert!(matches!(result, LoginResult::Authenticated(_)));
    }

    #[tokio::test]
    async fn token_subject_resolves_to_profile() {
        let store = Arc::new(MemoryStore::new());
        let auth = service(store, vec![]);
        let registered = auth.register(register_request("alice", "alice@example.com"), &client()).await.unwrap();

        let claims = auth.keys.verify(&registered.token).unwrap();
        let profile = auth.me(&claims).await.unwrap();
        assert_eq!(profile, registered.user);
    }
}
