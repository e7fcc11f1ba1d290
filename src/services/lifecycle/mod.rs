//! Visitor lifecycle: check-in, checkout, reminders, escalation and host decisions.
//!
//! All state lives in the [`VisitStore`]; every transition is a conditional
//! write there, so concurrent callers (kiosk, host link, sweep, admin) cannot
//! both apply the same transition. Every operation takes `now` explicitly.


use chrono::{DateTime, Duration, Utc};
use std::{collections::HashSet, sync::Arc};
use unicode_normalization::UnicodeNormalization;
use validator::Validate;

use super::{
    dispatcher::{Links, Notification, NotificationDispatcher, VisitDigest},
    policy::LifecyclePolicy,
    tokens,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        action_token::{
            HostDecision, HostDecisionOutcome, HostDecisionResult, HostMutation, Redemption,
        },
        notification::{DeliveryStatus, NewNotification, NotificationKind},
        visit::{
            CheckInForm, CheckoutOutcome, CheckoutRequest, CheckoutTarget, NewVisit, Visit,
            VisitStatus, VisitSummary, VisitorIdentity,
        },
    },
    repository::VisitStore,
};

/// Visit created at the kiosk, with the URL encoded in its QR code
#[derive(Debug, Clone)]
pub struct CheckInReceipt {
    pub visit: Visit,
    pub checkout_url: String,
}

/// Visit due for a host reminder
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderCandidate {
    pub visit: Visit,
    pub interval_minutes: i64,
    pub elapsed_minutes: i64,
}

/// Select the visits owed a reminder at `now`.
///
/// A visit matches interval `i` when `i <= elapsed < i + window`; the first
/// matching interval wins. Visits in `recently_reminded` are skipped.
pub fn reminder_candidates(
    visits: &[Visit],
    recently_reminded: &HashSet<i64>,
    policy: &LifecyclePolicy,
    now: DateTime<Utc>,
) -> Vec<ReminderCandidate> {
    visits
        .iter()
        .filter(|v| v.status == VisitStatus::CheckedIn && !recently_reminded.contains(&v.id))
        .filter_map(|visit| {
            let elapsed = visit.elapsed_minutes(now);
            policy
                .reminder_intervals
                .iter()
                .find(|&&i| i <= elapsed && elapsed < i + policy.reminder_window_minutes)
                .map(|&interval| ReminderCandidate {
                    visit: visit.clone(),
                    interval_minutes: interval,
                    elapsed_minutes: elapsed,
                })
        })
        .collect()
}

fn normalize(value: &str) -> String {
    value.trim().nfc().collect()
}

fn normalize_optional(value: Option<&str>) -> Option<String> {
    value.map(normalize).filter(|v| !v.is_empty())
}

fn normalize_identity(identity: &VisitorIdentity) -> VisitorIdentity {
    VisitorIdentity {
        first_name: normalize(&identity.first_name),
        last_name: normalize(&identity.last_name),
        company: normalize(&identity.company),
    }
}

fn validation_error(errors: validator::ValidationErrors) -> AppError {
    let mut fields: Vec<String> = errors
        .field_errors()
        .keys()
        .map(|field| field.to_string())
        .collect();
    fields.sort();
    AppError::Validation(format!("Invalid or missing fields: {}", fields.join(", ")))
}

#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<dyn VisitStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    policy: Arc<LifecyclePolicy>,
    links: Links,
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn VisitStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        policy: LifecyclePolicy,
        links: Links,
    ) -> Self {
        Self {
            store,
            dispatcher,
            policy: Arc::new(policy),
            links,
        }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn VisitStore> {
        &self.store
    }

    pub fn links(&self) -> &Links {
        &self.links
    }

    // =========================================================================
    // Check-in
    // =========================================================================

    /// Register a kiosk arrival. The host arrival mail is sent in the background.
    pub async fn check_in(&self, form: CheckInForm, now: DateTime<Utc>) -> AppResult<CheckInReceipt> {
        let form = CheckInForm {
            first_name: normalize(&form.first_name),
            last_name: normalize(&form.last_name),
            company: normalize(&form.company),
            reason: normalize(&form.reason),
            host_email: form.host_email.trim().to_string(),
            host_name: normalize_optional(form.host_name.as_deref()),
            visitor_email: normalize_optional(form.visitor_email.as_deref()),
            expected_duration: form.expected_duration,
        };
        form.validate().map_err(validation_error)?;

        // The directory name wins over whatever was typed at the kiosk
        let host_name = match self.store.find_host_by_email(&form.host_email).await? {
            Some(host) => Some(host.name),
            None => form.host_name,
        };

        let qr_token = self
            .unique_qr_token(|| tokens::generate_qr_token(self.policy.qr_token_bytes))
            .await?;

        let visit = self
            .store
            .insert_visit(NewVisit {
                first_name: form.first_name,
                last_name: form.last_name,
                company: form.company,
                reason: form.reason,
                host_email: form.host_email,
                host_name,
                visitor_email: form.visitor_email,
                arrival_time: now,
                expected_duration: self.policy.clamp_duration(form.expected_duration),
                qr_token,
            })
            .await?;

        tracing::info!(
            target: "audit",
            event = "check_in",
            visit_id = visit.id,
            host = %visit.host_email,
            expected_duration = visit.expected_duration,
            "Visitor checked in"
        );

        let service = self.clone();
        let arrived = visit.clone();
        tokio::spawn(async move {
            if let Err(e) = service.notify_arrival(&arrived, now).await {
                tracing::warn!(visit_id = arrived.id, "Arrival notification failed: {}", e);
            }
        });

        let checkout_url = self.links.checkout(&visit.qr_token);
        Ok(CheckInReceipt { visit, checkout_url })
    }

    /// Draw tokens from `generate` until one is not already issued
    pub(crate) async fn unique_qr_token<F>(&self, mut generate: F) -> AppResult<String>
    where
        F: FnMut() -> String,
    {
        for attempt in 1..=self.policy.max_token_attempts {
            let token = generate();
            if !self.store.qr_token_exists(&token).await? {
                return Ok(token);
            }
            tracing::warn!(attempt, "QR token collision, regenerating");
        }
        tracing::error!(
            attempts = self.policy.max_token_attempts,
            "Could not generate a unique QR token"
        );
        Err(AppError::TokenExhaustion(self.policy.max_token_attempts))
    }

    // =========================================================================
    // QR verification and checkout
    // =========================================================================

    /// Visit details shown to the visitor when the QR code is scanned
    pub async fn verify_qr(&self, token: &str, now: DateTime<Utc>) -> AppResult<VisitSummary> {
        let visit = self
            .store
            .find_by_qr_token(token.trim())
            .await?
            .ok_or_else(|| AppError::NotFound("Unknown QR code".to_string()))?;

        match visit.status {
            VisitStatus::CheckedOut => Err(AppError::AlreadyCheckedOut(visit.id)),
            VisitStatus::Unconfirmed => Err(AppError::VisitUnconfirmed(visit.id)),
            VisitStatus::CheckedIn => Ok(VisitSummary::from_visit(&visit, now)),
        }
    }

    pub async fn check_out(
        &self,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> AppResult<CheckoutOutcome> {
        let (visit, allowed): (Visit, &[VisitStatus]) = match &request.target {
            CheckoutTarget::QrToken(token) => {
                let visit = self
                    .store
                    .find_by_qr_token(token.trim())
                    .await?
                    .ok_or_else(|| AppError::NotFound("Unknown QR code".to_string()))?;
                (visit, &[VisitStatus::CheckedIn][..])
            }
            CheckoutTarget::Identity(identity) => {
                let identity = normalize_identity(identity);
                let visit = self
                    .store
                    .find_active_by_identity(&identity, self.policy.day_window(now))
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound("No visitor on site matches this name".to_string())
                    })?;
                (visit, &[VisitStatus::CheckedIn][..])
            }
            CheckoutTarget::VisitId(id) => {
                let visit = self
                    .store
                    .get_visit(*id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Visit {} not found", id)))?;
                (visit, &[VisitStatus::CheckedIn, VisitStatus::Unconfirmed][..])
            }
        };

        if visit.status == VisitStatus::CheckedOut {
            return Err(AppError::AlreadyCheckedOut(visit.id));
        }
        if !allowed.contains(&visit.status) {
            return Err(AppError::VisitUnconfirmed(visit.id));
        }

        let visit = match self
            .store
            .check_out(visit.id, allowed, request.method, now)
            .await?
        {
            Some(visit) => visit,
            None => return Err(self.checkout_conflict(visit.id).await),
        };

        let duration_minutes = visit.duration_minutes().unwrap_or(0);
        tracing::info!(
            target: "audit",
            event = "check_out",
            visit_id = visit.id,
            method = request.method.as_str(),
            duration_minutes,
            "Visitor checked out"
        );

        self.spawn_checkout_confirmation(&visit, duration_minutes, now);
        Ok(CheckoutOutcome {
            visit,
            duration_minutes,
        })
    }

    /// Error for a conditional checkout that lost against another writer
    async fn checkout_conflict(&self, id: i64) -> AppError {
        match self.store.get_visit(id).await {
            Ok(Some(visit)) => match visit.status {
                VisitStatus::Unconfirmed => AppError::VisitUnconfirmed(id),
                _ => AppError::AlreadyCheckedOut(id),
            },
            Ok(None) => AppError::NotFound(format!("Visit {} not found", id)),
            Err(e) => e,
        }
    }

    fn spawn_checkout_confirmation(&self, visit: &Visit, duration_minutes: i64, now: DateTime<Utc>) {
        let Some(recipient) = visit.visitor_email.clone() else {
            return;
        };
        let service = self.clone();
        let notification = Notification::Checkout {
            visit: VisitDigest::new(visit, self.policy.timezone),
            departed_at: self
                .policy
                .format_local(visit.departure_time.unwrap_or(now), "%H:%M"),
            duration_minutes,
        };
        let visit_id = visit.id;
        tokio::spawn(async move {
            if let Err(e) = service
                .deliver(visit_id, &recipient, &notification, now)
                .await
            {
                tracing::warn!(visit_id, "Checkout confirmation failed: {}", e);
            }
        });
    }

    // =========================================================================
    // Reminders and escalation
    // =========================================================================

    /// Visits owed a host reminder at `now`. Nothing is written.
    pub async fn evaluate_reminders(&self, now: DateTime<Utc>) -> AppResult<Vec<ReminderCandidate>> {
        let Some(&first_interval) = self.policy.reminder_intervals.first() else {
            return Ok(Vec::new());
        };

        let visits = self
            .store
            .list_checked_in_before(now - Duration::minutes(first_interval))
            .await?;
        if visits.is_empty() {
            return Ok(Vec::new());
        }

        let recently_reminded = self
            .store
            .visits_notified_since(
                NotificationKind::Reminder,
                now - Duration::minutes(self.policy.reminder_window_minutes),
            )
            .await?;

        Ok(reminder_candidates(
            &visits,
            &recently_reminded,
            &self.policy,
            now,
        ))
    }

    /// Flip today's open visits to unconfirmed once the end of day has passed.
    /// Returns only the visits this call transitioned.
    pub async fn escalate(&self, now: DateTime<Utc>) -> AppResult<Vec<Visit>> {
        if !self.policy.is_after_end_of_day(now) {
            return Ok(Vec::new());
        }

        let escalated = self
            .store
            .escalate_day(self.policy.day_window(now), now)
            .await?;

        for visit in &escalated {
            tracing::info!(
                target: "audit",
                event = "escalate",
                visit_id = visit.id,
                host = %visit.host_email,
                "Visit marked unconfirmed"
            );
        }
        Ok(escalated)
    }

    // =========================================================================
    // Host action links
    // =========================================================================

    /// Issue a host action token; only its digest is stored
    pub async fn issue_action_token(
        &self,
        visit_id: i64,
        validity: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<String> {
        let token = tokens::generate_action_token(self.policy.action_token_bytes);
        self.store
            .insert_action_token(visit_id, &tokens::hash_token(&token), now + validity, now)
            .await?;
        Ok(token)
    }

    /// Redeem a host action link
    pub async fn apply_host_decision(
        &self,
        raw_token: &str,
        decision: HostDecision,
        now: DateTime<Utc>,
    ) -> AppResult<HostDecisionOutcome> {
        let token = self
            .store
            .find_action_token(&tokens::hash_token(raw_token.trim()))
            .await?
            .ok_or(AppError::InvalidToken)?;

        if token.is_used() {
            return Err(AppError::TokenAlreadyUsed);
        }
        if token.is_expired(now) {
            return Err(AppError::TokenExpired);
        }

        // A newer link for the same visit supersedes this one
        match self
            .store
            .latest_valid_action_token(token.visit_id, now)
            .await?
        {
            Some(latest) if latest.id != token.id => return Err(AppError::InvalidToken),
            _ => {}
        }

        let mutation = match decision {
            HostDecision::Left => HostMutation::CheckOut,
            HostDecision::StillHere => HostMutation::ExtendDuration {
                minutes: self.policy.still_here_extension_minutes,
                cap: self.policy.max_duration_minutes,
            },
        };

        let duration_before = match decision {
            HostDecision::StillHere => self
                .store
                .get_visit(token.visit_id)
                .await?
                .map(|visit| visit.expected_duration),
            HostDecision::Left => None,
        };

        let (result, visit) = match self.store.redeem_action_token(&token, mutation, now).await? {
            Redemption::Applied(visit) => match decision {
                HostDecision::Left => (HostDecisionResult::CheckedOut, visit),
                HostDecision::StillHere if duration_before == Some(visit.expected_duration) => {
                    (HostDecisionResult::DurationAtMaximum, visit)
                }
                HostDecision::StillHere => (HostDecisionResult::DurationExtended, visit),
            },
            Redemption::AlreadyResolved(visit) => (HostDecisionResult::AlreadyResolved, visit),
            Redemption::TokenAlreadyUsed => return Err(AppError::TokenAlreadyUsed),
        };

        tracing::info!(
            target: "audit",
            event = "host_decision",
            visit_id = visit.id,
            decision = decision.as_str(),
            result = ?result,
            expected_duration = visit.expected_duration,
            "Host decision applied"
        );

        if result == HostDecisionResult::CheckedOut {
            let duration_minutes = visit.duration_minutes().unwrap_or(0);
            self.spawn_checkout_confirmation(&visit, duration_minutes, now);
        }

        Ok(HostDecisionOutcome { result, visit })
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Issue the arrival action token, then mail the host
    pub async fn notify_arrival(&self, visit: &Visit, now: DateTime<Utc>) -> AppResult<DeliveryStatus> {
        let token = self
            .issue_action_token(visit.id, self.policy.arrival_token_validity, now)
            .await?;
        let notification = Notification::Arrival {
            visit: VisitDigest::new(visit, self.policy.timezone),
            links: self.links.host_actions(&token),
        };
        self.deliver(visit.id, &visit.host_email, &notification, now)
            .await
    }

    /// Issue a reminder action token, then mail the host
    ///
    /// The reminder slot is claimed in the store before anything is issued or
    /// sent. `None` means a concurrent sweep already holds it.
    pub async fn notify_reminder(
        &self,
        candidate: &ReminderCandidate,
        now: DateTime<Utc>,
    ) -> AppResult<Option<DeliveryStatus>> {
        let visit = &candidate.visit;
        let claim = self
            .store
            .claim_notification(
                NewNotification {
                    visit_id: visit.id,
                    kind: NotificationKind::Reminder,
                    recipient: visit.host_email.clone(),
                    status: DeliveryStatus::Pending,
                    sent_at: now,
                },
                now - Duration::minutes(self.policy.reminder_window_minutes),
            )
            .await?;
        let Some(claim_id) = claim else {
            tracing::debug!(visit_id = visit.id, "Reminder already claimed");
            return Ok(None);
        };

        let status = match self
            .issue_action_token(visit.id, self.policy.reminder_token_validity, now)
            .await
        {
            Ok(token) => {
                let notification = Notification::Reminder {
                    visit: VisitDigest::new(visit, self.policy.timezone),
                    elapsed_minutes: candidate.elapsed_minutes,
                    links: self.links.host_actions(&token),
                };
                self.dispatch(visit.id, &visit.host_email, &notification)
                    .await
            }
            Err(e) => {
                tracing::warn!(visit_id = visit.id, "Reminder token not issued: {}", e);
                DeliveryStatus::Failed
            }
        };

        self.store.complete_notification(claim_id, status).await?;
        Ok(Some(status))
    }

    /// Send one digest of the escalated visits to every supervisor.
    /// One log record is written per visit and recipient. Returns (sent, failed).
    pub async fn notify_supervisors(
        &self,
        visits: &[Visit],
        now: DateTime<Utc>,
    ) -> AppResult<(usize, usize)> {
        if visits.is_empty() {
            return Ok((0, 0));
        }
        if self.policy.supervisor_emails.is_empty() {
            tracing::warn!(
                escalated = visits.len(),
                "No supervisor configured, escalation digest not sent"
            );
            return Ok((0, 0));
        }

        let notification = Notification::Escalation {
            day: self.policy.format_local(now, "%Y-%m-%d"),
            visits: visits
                .iter()
                .map(|v| VisitDigest::new(v, self.policy.timezone))
                .collect(),
        };

        let (mut sent, mut failed) = (0, 0);
        for recipient in &self.policy.supervisor_emails {
            let status = match self.dispatcher.send(recipient, &notification).await {
                Ok(()) => {
                    sent += 1;
                    DeliveryStatus::Sent
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(recipient = %recipient, "Escalation digest failed: {}", e);
                    DeliveryStatus::Failed
                }
            };
            for visit in visits {
                self.store
                    .log_notification(NewNotification {
                        visit_id: visit.id,
                        kind: NotificationKind::Escalation,
                        recipient: recipient.clone(),
                        status,
                        sent_at: now,
                    })
                    .await?;
            }
        }
        Ok((sent, failed))
    }

    /// Send one notification and record the attempt in the notification log.
    /// A delivery failure is logged and reported as `Failed`, not as an error.
    async fn dispatch(
        &self,
        visit_id: i64,
        recipient: &str,
        notification: &Notification,
    ) -> DeliveryStatus {
        match self.dispatcher.send(recipient, notification).await {
            Ok(()) => DeliveryStatus::Sent,
            Err(e) => {
                tracing::warn!(
                    visit_id,
                    recipient,
                    kind = notification.kind().as_str(),
                    "Notification delivery failed: {}",
                    e
                );
                DeliveryStatus::Failed
            }
        }
    }

    pub async fn deliver(
        &self,
        visit_id: i64,
        recipient: &str,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> AppResult<DeliveryStatus> {
        let status = self.dispatch(visit_id, recipient, notification).await;

        self.store
            .log_notification(NewNotification {
                visit_id,
                kind: notification.kind(),
                recipient: recipient.to_string(),
                status,
                sent_at: now,
            })
            .await?;
        Ok(status)
    }
}
