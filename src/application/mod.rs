//! Application layer containing the business operations.
//!
//! Services own their storage ports and never hold state of their own, so one
//! instance can be shared across concurrent requests behind an `Arc`.

pub mod lifecycle;
pub mod payments;
pub mod wallet;

use crate::domain::notification::Notification;
use crate::domain::ports::Notifier;

/// The result of an operation plus any non-fatal problems hit on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }
}

/// Sends `notification`, downgrading a delivery failure to a warning on `outcome`.
pub(crate) async fn notify<T>(
    notifier: &dyn Notifier,
    notification: Notification,
    outcome: &mut Outcome<T>,
) {
    let kind = notification.kind;
    let user = notification.user_id;
    if let Err(e) = notifier.send(notification).await {
        tracing::warn!(%user, ?kind, error = %e, "notification not delivered");
        outcome.warnings.push(format!("notification to {user} not delivered: {e}"));
    }
}
