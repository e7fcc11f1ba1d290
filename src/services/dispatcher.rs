//! Notification content and the delivery seam

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::{
    error::AppResult,
    models::{action_token::HostDecision, notification::NotificationKind, visit::Visit},
};

/// Builds the absolute URLs placed in mails and QR codes
#[derive(Debug, Clone)]
pub struct Links {
    public_url: String,
}

impl Links {
    pub fn new(public_url: &str) -> Self {
        Self {
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn host_action(&self, token: &str, decision: HostDecision) -> String {
        format!(
            "{}/host-action?token={}&action={}",
            self.public_url,
            token,
            decision.as_str()
        )
    }

    /// Badge QR target: the served verify endpoint for the visit
    pub fn checkout(&self, qr_token: &str) -> String {
        format!("{}/api/v1/visits/verify?token={}", self.public_url, qr_token)
    }

    pub fn host_actions(&self, token: &str) -> HostActionLinks {
        HostActionLinks {
            still_here: self.host_action(token, HostDecision::StillHere),
            left: self.host_action(token, HostDecision::Left),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostActionLinks {
    pub still_here: String,
    pub left: String,
}

/// Visit fields shown in every message, with times already in local time
#[derive(Debug, Clone, PartialEq)]
pub struct VisitDigest {
    pub visit_id: i64,
    pub visitor: String,
    pub company: String,
    pub reason: String,
    pub host: String,
    pub arrived_at: String,
}

impl VisitDigest {
    pub fn new(visit: &Visit, tz: Tz) -> Self {
        Self {
            visit_id: visit.id,
            visitor: visit.full_name(),
            company: visit.company.clone(),
            reason: visit.reason.clone(),
            host: visit
                .host_name
                .clone()
                .unwrap_or_else(|| visit.host_email.clone()),
            arrived_at: local_time(visit.arrival_time, tz),
        }
    }
}

pub fn local_time(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%H:%M").to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Arrival {
        visit: VisitDigest,
        links: HostActionLinks,
    },
    Reminder {
        visit: VisitDigest,
        elapsed_minutes: i64,
        links: HostActionLinks,
    },
    Escalation {
        day: String,
        visits: Vec<VisitDigest>,
    },
    Checkout {
        visit: VisitDigest,
        departed_at: String,
        duration_minutes: i64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Arrival { .. } => NotificationKind::Arrival,
            Notification::Reminder { .. } => NotificationKind::Reminder,
            Notification::Escalation { .. } => NotificationKind::Escalation,
            Notification::Checkout { .. } => NotificationKind::Checkout,
        }
    }

    pub fn render(&self) -> RenderedMessage {
        match self {
            Notification::Arrival { visit, links } => RenderedMessage {
                subject: format!("Your visitor {} has arrived", visit.visitor),
                body: format!(
                    "{visitor} ({company}) checked in at {arrived} to see {host}.\n\
                     Reason: {reason}\n\n\
                     Visitor still with you: {still_here}\n\
                     Visitor has left: {left}\n",
                    visitor = visit.visitor,
                    company = visit.company,
                    arrived = visit.arrived_at,
                    host = visit.host,
                    reason = visit.reason,
                    still_here = links.still_here,
                    left = links.left,
                ),
            },
            Notification::Reminder {
                visit,
                elapsed_minutes,
                links,
            } => RenderedMessage {
                subject: format!("Is {} still on site?", visit.visitor),
                body: format!(
                    "{visitor} ({company}) arrived at {arrived}, {hours}h{minutes:02} ago, \
                     and has not checked out yet.\n\n\
                     Visitor still with you: {still_here}\n\
                     Visitor has left: {left}\n",
                    visitor = visit.visitor,
                    company = visit.company,
                    arrived = visit.arrived_at,
                    hours = elapsed_minutes / 60,
                    minutes = elapsed_minutes % 60,
                    still_here = links.still_here,
                    left = links.left,
                ),
            },
            Notification::Escalation { day, visits } => {
                let mut body = format!(
                    "{} visitor(s) checked in on {} never checked out:\n\n",
                    visits.len(),
                    day
                );
                for visit in visits {
                    body.push_str(&format!(
                        "- {} ({}), arrived {}, host {}\n",
                        visit.visitor, visit.company, visit.arrived_at, visit.host
                    ));
                }
                RenderedMessage {
                    subject: format!("Unconfirmed visitors for {}", day),
                    body,
                }
            }
            Notification::Checkout {
                visit,
                departed_at,
                duration_minutes,
            } => RenderedMessage {
                subject: "Thank you for your visit".to_string(),
                body: format!(
                    "Hello {visitor},\n\n\
                     Your checkout was recorded at {departed}. \
                     You arrived at {arrived} and stayed {duration} minutes.\n",
                    visitor = visit.visitor,
                    departed = departed_at,
                    arrived = visit.arrived_at,
                    duration = duration_minutes,
                ),
            },
        }
    }
}

/// Delivery channel for lifecycle notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, recipient: &str, notification: &Notification) -> AppResult<()>;
}

/// Dispatcher used when outbound mail is disabled
#[derive(Debug, Clone, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send(&self, recipient: &str, notification: &Notification) -> AppResult<()> {
        let message = notification.render();
        tracing::info!(
            kind = notification.kind().as_str(),
            recipient,
            subject = %message.subject,
            "Email disabled, notification not sent"
        );
        tracing::debug!(body = %message.body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_strip_trailing_slash() {
        let links = Links::new("https://kiosk.example.com/");
        assert_eq!(
            links.host_action("abc", HostDecision::Left),
            "https://kiosk.example.com/host-action?token=abc&action=left"
        );
        assert_eq!(
            links.checkout("qr"),
            "https://kiosk.example.com/api/v1/visits/verify?token=qr"
        );
    }

    #[test]
    fn test_reminder_mentions_both_links() {
        let links = Links::new("http://localhost").host_actions("tok");
        let notification = Notification::Reminder {
            visit: VisitDigest {
                visit_id: 1,
                visitor: "Ana Smith".to_string(),
                company: "Acme Corp".to_string(),
                reason: "Audit".to_string(),
                host: "Bob".to_string(),
                arrived_at: "10:00".to_string(),
            },
            elapsed_minutes: 125,
            links,
        };
        let message = notification.render();
        assert_eq!(notification.kind(), NotificationKind::Reminder);
        assert!(message.body.contains("2h05"));
        assert!(message.body.contains("action=still_here"));
        assert!(message.body.contains("action=left"));
    }
}
