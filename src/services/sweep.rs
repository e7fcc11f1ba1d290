//! Periodic reminder, escalation and retention passes

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::lifecycle::LifecycleService;
use crate::{error::AppResult, models::notification::DeliveryStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct ReminderReport {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
    /// Due visits whose reminder was claimed by a concurrent run
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct EscalationReport {
    pub escalated: usize,
    pub digests_sent: usize,
    pub digests_failed: usize,
}

#[derive(Clone)]
pub struct SweepService {
    lifecycle: LifecycleService,
}

impl SweepService {
    pub fn new(lifecycle: LifecycleService) -> Self {
        Self { lifecycle }
    }

    /// Remind hosts of visits that crossed a reminder interval.
    /// A failed reminder is not retried within its window; the visit is
    /// reminded again at the next interval.
    pub async fn run_reminders(&self, now: DateTime<Utc>) -> AppResult<ReminderReport> {
        let candidates = self.lifecycle.evaluate_reminders(now).await?;
        let mut report = ReminderReport {
            due: candidates.len(),
            ..Default::default()
        };

        for candidate in &candidates {
            match self.lifecycle.notify_reminder(candidate, now).await {
                Ok(Some(DeliveryStatus::Sent)) => report.sent += 1,
                Ok(Some(_)) => report.failed += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(visit_id = candidate.visit.id, "Reminder failed: {}", e);
                }
            }
        }

        if report.due > 0 {
            tracing::info!(
                due = report.due,
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                "Reminder sweep finished"
            );
        }
        Ok(report)
    }

    /// Escalate today's open visits and send the supervisor digest
    pub async fn run_escalation(&self, now: DateTime<Utc>) -> AppResult<EscalationReport> {
        let escalated = self.lifecycle.escalate(now).await?;
        let (digests_sent, digests_failed) =
            self.lifecycle.notify_supervisors(&escalated, now).await?;

        let report = EscalationReport {
            escalated: escalated.len(),
            digests_sent,
            digests_failed,
        };
        if report.escalated > 0 {
            tracing::info!(
                escalated = report.escalated,
                digests_sent,
                digests_failed,
                "Escalation sweep finished"
            );
        }
        Ok(report)
    }

    /// Delete departed visits older than the retention period
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let Some(retention) = self.lifecycle.policy().retention else {
            return Ok(0);
        };
        let purged = self
            .lifecycle
            .store()
            .purge_departed_before(now - retention)
            .await?;
        if purged > 0 {
            tracing::info!(purged, "Purged departed visits past retention");
        }
        Ok(purged)
    }
}
