use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// EVENT ENUMS
// ============================================================================

/// Kind of security-relevant occurrence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LoginSuccess,
    LoginFailure,
    SuspiciousActivity,
    FirewallBlock,
    MalwareDetected,
    DdosAttempt,
    UnauthorizedAccess,
}

wire_enum!(EventType, "event type", {
    LoginSuccess => "login_success",
    LoginFailure => "login_failure",
    SuspiciousActivity => "suspicious_activity",
    FirewallBlock => "firewall_block",
    MalwareDetected => "malware_detected",
    DdosAttempt => "ddos_attempt",
    UnauthorizedAccess => "unauthorized_access",
});

/// Event severity. Ordered from `Low` to `Critical`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Low,
    Medium,
    High,
    Critical,
}

wire_enum!(EventSeverity, "event severity", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

impl Default for EventSeverity {
    fn default() -> Self {
        Self::Medium
    }
}

// ============================================================================
// EVENT RECORDS
// ============================================================================

/// An append-only record of one observed occurrence.
///
/// `timestamp` is assigned by the store on insert and never changes; the only
/// mutable field is `resolved`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub severity: EventSeverity,
    pub source_address: String,
    pub account_id: Option<Uuid>,
    pub user_agent: Option<String>,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
}

/// Input for [`Event`] creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub severity: EventSeverity,
    pub source_address: String,
    pub account_id: Option<Uuid>,
    pub user_agent: Option<String>,
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl NewEvent {
    pub fn new(event_type: EventType, severity: EventSeverity, source_address: impl Into<String>) -> Self {
        Self {
            event_type,
            severity,
            source_address: source_address.into(),
            account_id: None,
            user_agent: None,
            description: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// QUERIES AND AGGREGATES
// ============================================================================

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 500;

/// Clamp a caller-supplied page size into `1..=MAX_LIST_LIMIT`.
pub fn effective_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// Filter for `GET /api/security/logs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    pub severity: Option<EventSeverity>,
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    pub limit: Option<i64>,
}

/// Number of events sharing one source address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceCount {
    pub source_address: String,
    pub count: i64,
}

/// Number of events sharing one type, with the critical subset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub count: i64,
    pub critical_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordered() {
        assert!(EventSeverity::Low < EventSeverity::Medium);
        assert!(EventSeverity::High < EventSeverity::Critical);
    }

    #[test]
    fn event_type_wire_names_match_serde() {
        for event_type in EventType::ALL {
            let json = serde_json::to_value(event_type).unwrap();
            assert_eq!(json, serde_json::Value::String(event_type.as_str().to_string()));
            assert_eq!(event_type.as_str().parse::<EventType>().unwrap(), *event_type);
        }
        assert!("failed_login".parse::<EventType>().is_err());
    }

    #[test]
    fn builder_collects_metadata() {
        let event = NewEvent::new(EventType::FirewallBlock, EventSeverity::High, "10.0.0.5")
            .description("blocked")
            .meta("attempts", "3");
        assert_eq!(event.metadata.get("attempts").map(String::as_str), Some("3"));
        assert_eq!(event.source_address, "10.0.0.5");
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(effective_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(effective_limit(Some(0)), 1);
        assert_eq!(effective_limit(Some(10_000)), MAX_LIST_LIMIT);
    }
}
