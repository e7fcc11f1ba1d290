//! Data models for the kiosk server

pub mod action_token;
pub mod admin;
pub mod host;
pub mod notification;
pub mod visit;

// Re-export commonly used types
pub use host::Host;
pub use action_token::{ActionToken, HostDecision, HostDecisionOutcome, Redemption};
pub use notification::{DeliveryStatus, NotificationKind};
pub use visit::{CheckoutMethod, Visit, VisitStatus};
