//! Threshold rules evaluated over recent security events.
//!
//! Each evaluation is stateless: it re-derives candidates from the events in
//! the rule's lookback window, so re-running over an unchanged window yields
//! the same candidates.

use chrono::{DateTime, Utc};
use shield_config::{MonitorConfig, RuleConfig};
use shield_database::Store;
use shield_models::{alert::meta, Alert, AlertCategory, AlertSeverity, EventSeverity, EventType, NewAlert, NewEvent};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::alerts::AlertService;
use crate::errors::ServiceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    FailedLogins,
    RequestRate,
    DailyReport,
}

impl Rule {
    pub const ALL: [Rule; 3] = [Rule::FailedLogins, Rule::RequestRate, Rule::DailyReport];

    pub fn name(&self) -> &'static str {
        match self {
            Rule::FailedLogins => "failed_logins",
            Rule::RequestRate => "request_rate",
            Rule::DailyReport => "daily_report",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What one rule execution produced.
#[derive(Debug, Clone)]
pub struct RuleReport {
    pub rule: Rule,
    pub alerts: Vec<Alert>,
    pub events: usize,
    /// Addresses over threshold that were skipped because they already alerted.
    pub skipped: usize,
    /// Addresses whose alert or event could not be stored.
    pub failed: usize,
}

impl RuleReport {
    fn new(rule: Rule) -> Self {
        Self {
            rule,
            alerts: Vec::new(),
            events: 0,
            skipped: 0,
            failed: 0,
        }
    }
}

pub struct ThresholdMonitor {
    store: Arc<dyn Store>,
    alerts: Arc<AlertService>,
    config: MonitorConfig,
}

impl ThresholdMonitor {
    pub fn new(store: Arc<dyn Store>, alerts: Arc<AlertService>, config: MonitorConfig) -> Self {
        Self { store, alerts, config }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Rule 1: addresses with too many failed logins get a warning alert and a
    /// firewall block event.
    pub async fn check_failed_logins(&self, now: DateTime<Utc>) -> ServiceResult<RuleReport> {
        let rule = Rule::FailedLogins;
        let RuleConfig { window, threshold, .. } = self.config.failed_logins;
        let since = now - to_chrono(window);
        let mut report = RuleReport::new(rule);

        let offenders = self
            .store
            .count_by_source(since, Some(EventType::LoginFailure), threshold)
            .await?;

        for offender in offenders {
            let address = offender.source_address;
            let alert = NewAlert::new(
                "Multiple Failed Login Attempts",
                format!(
                    "IP {} has {} failed login attempts in the last {}",
                    address,
                    offender.count,
                    describe_window(window)
                ),
                AlertCategory::Security,
                AlertSeverity::Warning,
            )
            .meta(meta::RULE, rule.name())
            .meta(meta::IP_ADDRESS, address.as_str())
            .meta(meta::ATTEMPTS, offender.count.to_string());
            let event = NewEvent::new(EventType::FirewallBlock, EventSeverity::High, address.as_str())
                .description(format!("Blocked due to {} failed login attempts", offender.count))
                .meta(meta::RULE, rule.name());

            if self.flag_address(&mut report, &address, since, alert, event).await {
                info!(rule = %rule, address = %address, count = offender.count, "Repeated failed logins detected");
            }
        }

        Ok(report)
    }

    /// Rule 2: addresses producing events of any type above the rate threshold
    /// get a critical alert and a DDoS event.
    pub async fn check_request_rate(&self, now: DateTime<Utc>) -> ServiceResult<RuleReport> {
        let rule = Rule::RequestRate;
        let RuleConfig { window, threshold, .. } = self.config.request_rate;
        let since = now - to_chrono(window);
        let mut report = RuleReport::new(rule);

        let offenders = self.store.count_by_source(since, None, threshold).await?;

        for offender in offenders {
            let address = offender.source_address;
            let alert = NewAlert::new(
                "Possible DDoS Attack",
                format!(
                    "IP {} made {} requests in the last {}",
                    address,
                    offender.count,
                    describe_window(window)
                ),
                AlertCategory::Security,
                AlertSeverity::Critical,
            )
            .meta(meta::RULE, rule.name())
            .meta(meta::IP_ADDRESS, address.as_str())
            .meta(meta::REQUEST_COUNT, offender.count.to_string());
            let event = NewEvent::new(EventType::DdosAttempt, EventSeverity::Critical, address.as_str())
                .description(format!(
                    "Potential DDoS: {} requests per {}",
                    offender.count,
                    describe_window(window)
                ))
                .meta(meta::RULE, rule.name());

            if self.flag_address(&mut report, &address, since, alert, event).await {
                info!(rule = %rule, address = %address, count = offender.count, "High request rate detected");
            }
        }

        Ok(report)
    }

    /// Rule 3: one informational rollup of every event in the report window.
    pub async fn daily_report(&self, now: DateTime<Utc>) -> ServiceResult<RuleReport> {
        let rule = Rule::DailyReport;
        let since = now - to_chrono(self.config.daily_report_window);
        let mut report = RuleReport::new(rule);

        let total: i64 = self
            .store
            .count_by_type(since)
            .await?
            .iter()
            .map(|bucket| bucket.count)
            .sum();

        let alert = self
            .alerts
            .create_alert(
                NewAlert::new(
                    "Daily Security Report",
                    format!(
                        "Total security incidents in last {}: {}",
                        describe_window(self.config.daily_report_window),
                        total
                    ),
                    AlertCategory::System,
                    AlertSeverity::Info,
                )
                .meta(meta::RULE, rule.name())
                .meta(meta::TOTAL_INCIDENTS, total.to_string())
                .meta(meta::REPORT_DATE, now.to_rfc3339()),
            )
            .await?;

        info!(rule = %rule, total, "Daily security report generated");
        report.alerts.push(alert);
        Ok(report)
    }

    /// Evaluate one rule, logging instead of propagating failures.
    pub async fn run_rule(&self, rule: Rule, now: DateTime<Utc>) -> Option<RuleReport> {
        let result = match rule {
            Rule::FailedLogins => self.check_failed_logins(now).await,
            Rule::RequestRate => self.check_request_rate(now).await,
            Rule::DailyReport => self.daily_report(now).await,
        };

        match result {
            Ok(report) => {
                debug!(
                    rule = %rule,
                    alerts = report.alerts.len(),
                    skipped = report.skipped,
                    failed = report.failed,
                    "Rule evaluated"
                );
                Some(report)
            }
            Err(e) => {
                error!(rule = %rule, error = %e, "Rule evaluation failed");
                None
            }
        }
    }

    /// Evaluate every rule in order. Stops before the next rule once
    /// `shutdown` reads true; a failing rule does not stop the others.
    pub async fn run_all(&self, now: DateTime<Utc>, shutdown: &watch::Receiver<bool>) -> Vec<RuleReport> {
        let mut reports = Vec::with_capacity(Rule::ALL.len());
        for rule in Rule::ALL {
            if *shutdown.borrow() {
                info!(rule = %rule, "Shutdown requested, skipping remaining rules");
                break;
            }
            if let Some(report) = self.run_rule(rule, now).await {
                reports.push(report);
            }
        }
        reports
    }

    /// Raise the alert and append the event for one offending address.
    /// Failures are logged and counted so the remaining addresses still run.
    async fn flag_address(
        &self,
        report: &mut RuleReport,
        address: &str,
        since: DateTime<Utc>,
        alert: NewAlert,
        event: NewEvent,
    ) -> bool {
        let rule = report.rule;
        match self.already_alerted(rule, address, since).await {
            Ok(true) => {
                report.skipped += 1;
                return false;
            }
            Ok(false) => {}
            Err(e) => {
                error!(rule = %rule, address, error = %e, "Suppression check failed");
                report.failed += 1;
                return false;
            }
        }

        let alert = match self.alerts.create_alert(alert).await {
            Ok(alert) => alert,
            Err(e) => {
                error!(rule = %rule, address, error = %e, "Failed to raise alert");
                report.failed += 1;
                return false;
            }
        };
        report.alerts.push(alert);

        if let Err(e) = self.store.append_event(event).await {
            error!(rule = %rule, address, error = %e, "Failed to record monitor event");
            report.failed += 1;
            return false;
        }
        report.events += 1;
        true
    }

    async fn already_alerted(&self, rule: Rule, address: &str, since: DateTime<Utc>) -> ServiceResult<bool> {
        if !self.config.suppress_repeat_alerts {
            return Ok(false);
        }
        let exists = self.store.exists_for_source(rule.name(), address, since).await?;
        if exists {
            debug!(rule = %rule, address, "Address already alerted in this window");
        }
        Ok(exists)
    }
}

fn to_chrono(window: Duration) -> chrono::Duration {
    chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero())
}

/// "minute", "5 minutes", "24 hours", "90 seconds".
fn describe_window(window: Duration) -> String {
    let secs = window.as_secs();
    let (count, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };

    if count == 1 {
        unit.to_string()
    } else {
        format!("{} {}s", count, unit)
    }
}
