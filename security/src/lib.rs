//! Cyber Security Shield service.
//!
//! Account lockout, threshold monitoring over security events, alert
//! lifecycle with emergency notifications, and the HTTP API over them.

pub mod alerts;
pub mod auth;
pub mod errors;
pub mod handlers;
pub mod lockout;
pub mod monitor;
pub mod notification;
pub mod scheduler;
pub mod security;
pub mod state;

pub use alerts::AlertService;
pub use auth::{AuthService, ClientInfo, LoginResult};
pub use errors::{ServiceError, ServiceResult};
pub use lockout::{LockoutGuard, LoginOutcome};
pub use monitor::{Rule, RuleReport, ThresholdMonitor};
pub use notification::{
    LogTransport, NotificationDispatcher, NotificationMessage, NotificationTransport, TransportError, WebhookTransport,
};
pub use scheduler::{MonitorHandle, MonitorScheduler};
pub use security::SecurityService;
pub use state::AppState;
