pub mod feature_toggles;

use feature_toggles::FeatureToggles;

use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_EMERGENCY_CONTACT: &str = "7004398297";
pub const DEV_JWT_SECRET: &str = "cyber_security_shield_development_secret";

// Read `key` and parse it, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring malformed configuration value");
                default
            }
        },
        _ => default,
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn secs_or(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_or(key, default))
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            rate_limit_requests: 100,
            rate_limit_window: Duration::from_secs(15 * 60),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            port: env_or("SECURITY_SERVICE_PORT", d.port),
            rate_limit_requests: env_or("API_RATE_LIMIT_REQUESTS", d.rate_limit_requests),
            rate_limit_window: secs_or("API_RATE_LIMIT_WINDOW_SECS", d.rate_limit_window.as_secs()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Postgres URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            database_url: env_opt("DATABASE_URL"),
            max_connections: env_or("DB_MAX_CONNECTIONS", d.max_connections),
            connect_timeout: secs_or("DB_CONNECT_TIMEOUT", d.connect_timeout.as_secs()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_expiry_hours: i64,
    pub bcrypt_cost: u32,
    /// Lowercased emails that receive the admin role on registration.
    pub admin_emails: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_issuer: "cyber-security-shield".to_string(),
            jwt_expiry_hours: 24,
            bcrypt_cost: 12,
            admin_emails: Vec::new(),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let jwt_secret = env_opt("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set, using the development secret");
            d.jwt_secret.clone()
        });
        Self {
            jwt_secret,
            jwt_issuer: d.jwt_issuer,
            jwt_expiry_hours: env_or("JWT_EXPIRY_HOURS", d.jwt_expiry_hours),
            bcrypt_cost: env_or("BCRYPT_COST", d.bcrypt_cost),
            admin_emails: env_opt("ADMIN_EMAILS")
                .map(|raw| {
                    raw.split(',')
                        .map(|email| email.trim().to_lowercase())
                        .filter(|email| !email.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LockoutConfig {
    pub threshold: i32,
    pub duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            duration: Duration::from_secs(30 * 60),
        }
    }
}

impl LockoutConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            threshold: env_or("LOCKOUT_THRESHOLD", d.threshold).max(1),
            duration: Duration::from_secs(
                env_or("LOCKOUT_DURATION_MINUTES", d.duration.as_secs() / 60) * 60,
            ),
        }
    }
}

/// Lookback, threshold and schedule of one threshold rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleConfig {
    pub window: Duration,
    pub threshold: i64,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub failed_logins: RuleConfig,
    pub request_rate: RuleConfig,
    pub daily_report_window: Duration,
    /// Skip an address that already has an alert from the same rule inside
    /// the rule's lookback window.
    pub suppress_repeat_alerts: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            failed_logins: RuleConfig {
                window: Duration::from_secs(5 * 60),
                threshold: 3,
                interval: Duration::from_secs(5 * 60),
            },
            request_rate: RuleConfig {
                window: Duration::from_secs(60),
                threshold: 50,
                interval: Duration::from_secs(60),
            },
            daily_report_window: Duration::from_secs(24 * 60 * 60),
            suppress_repeat_alerts: false,
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            failed_logins: RuleConfig {
                window: secs_or("FAILED_LOGIN_WINDOW_SECS", d.failed_logins.window.as_secs()),
                threshold: env_or("FAILED_LOGIN_THRESHOLD", d.failed_logins.threshold),
                interval: secs_or("FAILED_LOGIN_INTERVAL_SECS", d.failed_logins.interval.as_secs()),
            },
            request_rate: RuleConfig {
                window: secs_or("REQUEST_RATE_WINDOW_SECS", d.request_rate.window.as_secs()),
                threshold: env_or("REQUEST_RATE_THRESHOLD", d.request_rate.threshold),
                interval: secs_or("REQUEST_RATE_INTERVAL_SECS", d.request_rate.interval.as_secs()),
            },
            daily_report_window: secs_or("DAILY_REPORT_WINDOW_SECS", d.daily_report_window.as_secs()),
            suppress_repeat_alerts: env_or("SUPPRESS_REPEAT_ALERTS", d.suppress_repeat_alerts),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Emergency contact the notification is addressed to.
    pub destination: String,
    /// HTTP gateway for outbound notifications. `None` logs them instead.
    pub webhook_url: Option<String>,
    pub timeout: Duration,
    /// A claim older than this is considered abandoned and may be re-claimed.
    pub claim_ttl: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            destination: DEFAULT_EMERGENCY_CONTACT.to_string(),
            webhook_url: None,
            timeout: Duration::from_secs(10),
            claim_ttl: Duration::from_secs(60),
        }
    }
}

impl NotificationConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            destination: env_opt("NOTIFICATION_DESTINATION").unwrap_or(d.destination),
            webhook_url: env_opt("NOTIFICATION_WEBHOOK_URL"),
            timeout: secs_or("NOTIFICATION_TIMEOUT_SECS", d.timeout.as_secs()),
            claim_ttl: secs_or("NOTIFICATION_CLAIM_TTL_SECS", d.claim_ttl.as_secs()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub lockout: LockoutConfig,
    pub monitor: MonitorConfig,
    pub notification: NotificationConfig,
    pub feature_toggles: FeatureToggles,
}

impl AppConfig {
    /// Load `.env` if present, then read every section from the environment.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            auth: AuthConfig::from_env(),
            lockout: LockoutConfig::from_env(),
            monitor: MonitorConfig::from_env(),
            notification: NotificationConfig::from_env(),
            feature_toggles: FeatureToggles::from_env_path(),
        }
    }
}
