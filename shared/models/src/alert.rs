use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// ALERT ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Security,
    Firewall,
    Malware,
    Intrusion,
    System,
}

wire_enum!(AlertCategory, "alert category", {
    Security => "security",
    Firewall => "firewall",
    Malware => "malware",
    Intrusion => "intrusion",
    System => "system",
});

/// Alert severity. A separate, ordered scale from event severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Danger,
    Critical,
}

wire_enum!(AlertSeverity, "alert severity", {
    Info => "info",
    Warning => "warning",
    Danger => "danger",
    Critical => "critical",
});

impl Default for AlertSeverity {
    fn default() -> Self {
        Self::Warning
    }
}

/// Lifecycle of an alert: `active -> acknowledged -> resolved` or
/// `active -> resolved`. Never moves backwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

wire_enum!(AlertStatus, "alert status", {
    Active => "active",
    Acknowledged => "acknowledged",
    Resolved => "resolved",
});

impl AlertStatus {
    /// Statuses from which `target` may be entered.
    pub fn sources_for(target: AlertStatus) -> &'static [AlertStatus] {
        match target {
            AlertStatus::Active => &[],
            AlertStatus::Acknowledged => &[AlertStatus::Active],
            AlertStatus::Resolved => &[AlertStatus::Active, AlertStatus::Acknowledged],
        }
    }

    pub fn can_transition_to(self, target: AlertStatus) -> bool {
        Self::sources_for(target).contains(&self)
    }
}

// ============================================================================
// ALERT RECORDS
// ============================================================================

/// Well-known alert metadata keys.
pub mod meta {
    pub const IP_ADDRESS: &str = "ipAddress";
    pub const ATTEMPTS: &str = "attempts";
    pub const REQUEST_COUNT: &str = "requestCount";
    pub const TOTAL_INCIDENTS: &str = "totalIncidents";
    pub const REPORT_DATE: &str = "reportDate";
    pub const RULE: &str = "rule";
    pub const EMAIL: &str = "email";
    pub const ACCOUNT_ID: &str = "accountId";
    pub const EMERGENCY_CONTACT: &str = "emergencyContact";
}

/// An actionable notification derived from one or more events.
///
/// Invariants: `resolved_at.is_some()` iff `status == Resolved`, and
/// `notification_sent` only ever moves from `false` to `true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub notification_sent: bool,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAlert {
    pub title: String,
    pub message: String,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub metadata: BTreeMap<String, String>,
}

impl NewAlert {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        category: AlertCategory,
        severity: AlertSeverity,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            category,
            severity,
            metadata: BTreeMap::new(),
        }
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Body of `POST /api/alerts`.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateAlertRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 2000, message = "Message must be between 1 and 2000 characters"))]
    pub message: String,
    #[serde(rename = "type")]
    pub category: AlertCategory,
    #[serde(default)]
    pub severity: AlertSeverity,
}

impl From<CreateAlertRequest> for NewAlert {
    fn from(request: CreateAlertRequest) -> Self {
        NewAlert::new(request.title, request.message, request.category, request.severity)
    }
}

/// Query for `GET /api/alerts`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub severity: Option<AlertSeverity>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityCount {
    pub severity: AlertSeverity,
    pub count: i64,
}

/// Response of `GET /api/alerts/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    pub active_alerts: i64,
    pub critical_alerts: i64,
    pub last_24_hours: Vec<SeverityCount>,
    pub emergency_contact: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_monotonic() {
        assert!(AlertStatus::Active.can_transition_to(AlertStatus::Acknowledged));
        assert!(AlertStatus::Active.can_transition_to(AlertStatus::Resolved));
        assert!(AlertStatus::Acknowledged.can_transition_to(AlertStatus::Resolved));

        assert!(!AlertStatus::Resolved.can_transition_to(AlertStatus::Active));
        assert!(!AlertStatus::Resolved.can_transition_to(AlertStatus::Acknowledged));
        assert!(!AlertStatus::Resolved.can_transition_to(AlertStatus::Resolved));
        assert!(!AlertStatus::Acknowledged.can_transition_to(AlertStatus::Active));
    }

    #[test]
    fn create_request_uses_type_field_and_default_severity() {
        let request: CreateAlertRequest = serde_json::from_value(serde_json::json!({
            "title": "Port scan",
            "message": "Scan from 10.0.0.9",
            "type": "intrusion"
        }))
        .unwrap();

        assert_eq!(request.category, AlertCategory::Intrusion);
        assert_eq!(request.severity, AlertSeverity::Warning);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn empty_title_fails_validation() {
        let request = CreateAlertRequest {
            title: String::new(),
            message: "x".into(),
            category: AlertCategory::System,
            severity: AlertSeverity::Info,
        };
        assert!(request.validate().is_err());
    }
}
