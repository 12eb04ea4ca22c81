use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

wire_enum!(UserRole, "role", {
    User => "user",
    Admin => "admin",
});

impl Default for UserRole {
    fn default() -> Self {
        Self::User
    }
}

/// Authentication subject together with its lockout state.
///
/// `failed_attempt_count >= lockout threshold` implies `locked_until` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub credential_hash: String,
    pub role: UserRole,
    pub is_active: bool,
    pub failed_attempt_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// True while a lock is set and still in the future at `now`.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map_or(false, |until| until > now)
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub credential_hash: String,
    pub role: UserRole,
}

/// Result of the atomic failed-attempt increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedAttempt {
    pub count: i32,
    pub locked_until: Option<DateTime<Utc>>,
    /// This increment is the one that applied the lock.
    pub newly_locked: bool,
}

/// Public view of an account, safe to return to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

impl From<&Account> for AccountProfile {
    fn from(account: &Account) -> Self {
        AccountProfile {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            role: account.role,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: AccountProfile,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
}

impl Claims {
    pub fn account_id(&self) -> Option<Uuid> {
        self.sub.parse().ok()
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(locked_until: Option<DateTime<Utc>>) -> Account {
        Account {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            credential_hash: "hash".into(),
            role: UserRole::User,
            is_active: true,
            failed_attempt_count: 0,
            locked_until,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn lock_only_counts_while_in_future() {
        let now = Utc::now();
        assert!(!account(None).is_locked_at(now));
        assert!(account(Some(now + Duration::minutes(1))).is_locked_at(now));
        assert!(!account(Some(now - Duration::minutes(1))).is_locked_at(now));
    }

    #[test]
    fn credential_hash_is_never_serialized() {
        let json = serde_json::to_value(account(None)).unwrap();
        assert!(json.get("credential_hash").is_none());
    }

    #[test]
    fn register_request_validation() {
        let ok = RegisterRequest {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "secret1".into(),
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterRequest {
            username: "al".into(),
            email: "not-an-email".into(),
            password: "123".into(),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }
}
