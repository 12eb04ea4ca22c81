//! Read models for the security dashboard endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::TypeCount;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_threats: i64,
    pub critical_threats: i64,
    #[serde(rename = "blockedIPs")]
    pub blocked_ips: usize,
    pub threats_by_type: Vec<TypeCount>,
    pub firewall_status: String,
    pub last_scan: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FirewallRule {
    pub name: String,
    pub status: String,
    pub description: String,
}

impl FirewallRule {
    fn active(name: &str, description: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: "active".to_string(),
            description: description.into(),
        }
    }

    /// Protection rules reported by `GET /api/security/firewall`.
    pub fn standard_rules(rate_limit_requests: u32, rate_limit_window_secs: u64) -> Vec<Self> {
        vec![
            Self::active(
                "Rate Limiting",
                format!(
                    "{} requests per {} minutes",
                    rate_limit_requests,
                    rate_limit_window_secs / 60
                ),
            ),
            Self::active("SQL Injection Protection", "Blocks malicious SQL patterns"),
            Self::active("XSS Protection", "Prevents cross-site scripting"),
            Self::active("DDoS Protection", "Monitors for DDoS patterns"),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallStatus {
    pub status: String,
    pub blocked_requests: i64,
    #[serde(rename = "blockedIPs")]
    pub blocked_ips: usize,
    pub rules: Vec<FirewallRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub database: String,
    pub firewall: String,
    pub monitoring: String,
    pub alerts: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub services: ComponentHealth,
}
