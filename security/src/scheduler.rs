//! Timer-driven execution of the threshold rules.

use chrono::{DateTime, Days, TimeZone, Utc};
use shield_config::MonitorConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::monitor::{Rule, ThresholdMonitor};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Running rule tasks. Dropping the handle also stops them, without waiting.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Signal every task and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Monitor task ended abnormally");
            }
        }
        info!("Security monitor stopped");
    }
}

pub struct MonitorScheduler;

impl MonitorScheduler {
    /// Rule 1 and rule 2 fire one period after start and then every period;
    /// the daily report fires at each 00:00 UTC.
    pub fn start(monitor: Arc<ThresholdMonitor>, config: &MonitorConfig) -> MonitorHandle {
        let (shutdown, signal) = watch::channel(false);
        let now = Instant::now();

        let failed_logins = config.failed_logins.interval;
        let request_rate = config.request_rate.interval;
        let midnight = until_next_midnight(Utc::now());

        let tasks = vec![
            tokio::spawn(run_periodic(
                monitor.clone(),
                Rule::FailedLogins,
                now + failed_logins,
                failed_logins,
                signal.clone(),
            )),
            tokio::spawn(run_periodic(
                monitor.clone(),
                Rule::RequestRate,
                now + request_rate,
                request_rate,
                signal.clone(),
            )),
            tokio::spawn(run_periodic(monitor, Rule::DailyReport, now + midnight, DAY, signal)),
        ];

        info!(
            failed_logins_secs = failed_logins.as_secs(),
            request_rate_secs = request_rate.as_secs(),
            daily_report_in_secs = midnight.as_secs(),
            "Security monitor started"
        );

        MonitorHandle { shutdown, tasks }
    }
}

async fn run_periodic(
    monitor: Arc<ThresholdMonitor>,
    rule: Rule,
    first: Instant,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(first, period.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                monitor.run_rule(rule, Utc::now()).await;
            }
        }
    }
}

/// Time left until the next 00:00 UTC after `now`.
pub fn until_next_midnight(now: DateTime<Utc>) -> Duration {
    let next = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| Utc.from_utc_datetime(&midnight));

    match next {
        Some(next) => (next - now).to_std().unwrap_or(DAY),
        None => DAY,
    }
}
