//! Tracing initialization for the shield services.
//!
//! Standardized subscriber setup with JSON or pretty formatting.

use std::env;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name for log attribution
    pub service_name: String,
    /// Environment (dev, staging, prod)
    pub environment: String,
    /// Log format: "json" or "pretty"
    pub format: String,
    /// Log level filter (e.g., "info", "shield_security=debug,info")
    pub level: String,
    /// Whether to log span events (enter/exit)
    pub log_spans: bool,
    /// Whether to include file/line in logs
    pub include_location: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "cyber-security-shield".to_string(),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_spans: env::var("LOG_SPANS").map(|v| v == "true").unwrap_or(false),
            include_location: env::var("LOG_LOCATION").map(|v| v == "true").unwrap_or(false),
        }
    }
}

impl TracingConfig {
    /// Create config for a specific service
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn json(mut self) -> Self {
        self.format = "json".to_string();
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = "pretty".to_string();
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Initialize tracing with the given configuration.
///
/// Returns `false` when a global subscriber was already installed, which
/// happens when several tests in one binary initialise logging.
///
/// # Example
/// ```ignore
/// use shield_observability::{init_tracing, TracingConfig};
///
/// init_tracing(TracingConfig::for_service("security-service"));
/// ```
pub fn init_tracing(config: TracingConfig) -> bool {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let span_events = if config.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let installed = if config.is_json() {
        let layer = fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_current_span(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_target(true);

        tracing_subscriber::registry().with(filter).with(layer).try_init().is_ok()
    } else {
        let layer = fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_target(true);

        tracing_subscriber::registry().with(filter).with(layer).try_init().is_ok()
    };

    if installed {
        tracing::info!(
            service = %config.service_name,
            environment = %config.environment,
            format = %config.format,
            "Tracing initialized"
        );
    }
    installed
}

/// Quick initialization with defaults for a service
pub fn init_tracing_for(service_name: &str) -> bool {
    init_tracing(TracingConfig::for_service(service_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::for_service("test")
            .with_level("debug")
            .json()
            .with_spans();

        assert_eq!(config.service_name, "test");
        assert_eq!(config.level, "debug");
        assert!(config.is_json());
        assert!(config.log_spans);
        assert!(!config.pretty().is_json());
    }

    #[test]
    fn second_init_is_reported() {
        init_tracing(TracingConfig::for_service("test").with_level("warn"));
        assert!(!init_tracing(TracingConfig::for_service("test")));
    }
}
