//! In-process driver for the sweep
//!
//! Reminders run on every tick. Escalation and retention run once per local
//! day, on the first tick at or after the end-of-day time.

use chrono::{NaiveDate, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{policy::LifecyclePolicy, sweep::SweepService};

pub struct SweepScheduler {
    sweep: SweepService,
    policy: LifecyclePolicy,
    interval: Duration,
    shutdown: CancellationToken,
}

impl SweepScheduler {
    pub fn new(
        sweep: SweepService,
        policy: LifecyclePolicy,
        interval_minutes: u64,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sweep,
            policy,
            interval: Duration::from_secs(interval_minutes.max(1) * 60),
            shutdown,
        }
    }

    pub async fn run(self) {
        tracing::info!(
            interval_minutes = self.interval.as_secs() / 60,
            "Sweep scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_daily_run: Option<NaiveDate> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Sweep scheduler received shutdown signal");
                    break;
                }
            }

            let now = Utc::now();
            if let Err(e) = self.sweep.run_reminders(now).await {
                tracing::error!("Reminder sweep failed: {}", e);
            }

            let today = self.policy.local_date(now);
            if self.policy.is_after_end_of_day(now) && last_daily_run != Some(today) {
                match self.sweep.run_escalation(now).await {
                    Ok(_) => last_daily_run = Some(today),
                    Err(e) => tracing::error!("Escalation sweep failed: {}", e),
                }
                if let Err(e) = self.sweep.purge_expired(now).await {
                    tracing::error!("Retention purge failed: {}", e);
                }
            }
        }

        tracing::info!("Sweep scheduler stopped");
    }
}
