use shield_config::AppConfig;
use shield_database::Store;
use shield_middleware::{JwtKeys, RateLimitConfig, RateLimitMiddleware};
use std::sync::Arc;

use crate::alerts::AlertService;
use crate::auth::AuthService;
use crate::lockout::LockoutGuard;
use crate::monitor::ThresholdMonitor;
use crate::notification::{transport_from_config, NotificationDispatcher, NotificationTransport};
use crate::security::{RuntimeStatus, SecurityService};

/// Services shared by every worker, wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub keys: Arc<JwtKeys>,
    pub alerts: Arc<AlertService>,
    pub auth: Arc<AuthService>,
    pub security: Arc<SecurityService>,
    pub monitor: Arc<ThresholdMonitor>,
    pub rate_limit: RateLimitConfig,
}

impl AppState {
    pub fn new(config: &AppConfig, store: Arc<dyn Store>) -> Self {
        Self::with_transport(config, store, transport_from_config(&config.notification))
    }

    /// Same wiring with an explicit notification transport.
    pub fn with_transport(config: &AppConfig, store: Arc<dyn Store>, transport: Arc<dyn NotificationTransport>) -> Self {
        let toggles = &config.feature_toggles;
        let keys = Arc::new(JwtKeys::from_config(&config.auth));

        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            transport,
            &config.notification,
            toggles.notifications_enabled(),
        ));
        let alerts = Arc::new(AlertService::new(store.clone(), dispatcher));
        let guard = Arc::new(LockoutGuard::new(store.clone(), alerts.clone(), &config.lockout));
        let auth = Arc::new(AuthService::new(store.clone(), guard, keys.clone(), &config.auth));
        let security = Arc::new(SecurityService::new(
            store.clone(),
            RuntimeStatus {
                monitor_enabled: toggles.monitor_enabled(),
                notifications_enabled: toggles.notifications_enabled(),
                rate_limiting_enabled: toggles.rate_limiting_enabled(),
                rate_limit_requests: config.server.rate_limit_requests,
                rate_limit_window_secs: config.server.rate_limit_window.as_secs(),
            },
        ));
        let monitor = Arc::new(ThresholdMonitor::new(store.clone(), alerts.clone(), config.monitor.clone()));

        Self {
            store,
            keys,
            alerts,
            auth,
            security,
            monitor,
            rate_limit: RateLimitConfig::from_server_config(&config.server, toggles.rate_limiting_enabled()),
        }
    }

    pub fn rate_limiter(&self) -> RateLimitMiddleware {
        RateLimitMiddleware::new(self.rate_limit.clone())
    }
}
