//! Mail delivery abstraction.
//!
//! The [`Mailer`] trait decouples the outbox from the transport. The default
//! [`LogMailer`] only emits a `tracing` event; tests use recording mailers.

use anyhow::Result;
use tracing::info;

use crate::model::Notification;

/// Abstraction over mail transports.
pub trait Mailer {
    /// Deliver one outbox entry to `to`. An error leaves the entry pending.
    fn deliver(&self, to: &str, notification: &Notification) -> Result<()>;
}

/// Mailer that logs each message and always succeeds.
#[derive(Debug, Clone)]
pub struct LogMailer {
    pub sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

impl Mailer for LogMailer {
    fn deliver(&self, to: &str, notification: &Notification) -> Result<()> {
        info!(
            from = %self.sender,
            to,
            notification = %notification.id,
            kind = %notification.kind,
            subject = %notification.subject,
            "mail delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DeliveryStatus, NotificationId, OwnerId, Recipient};
    use crate::test_support::fixed_now;

    #[test]
    fn log_mailer_always_succeeds() {
        let mailer = LogMailer::new("postventa@localhost");
        let entry = Notification {
            id: NotificationId(1),
            claim: None,
            recipient: Recipient::Owner(OwnerId(1)),
            kind: "visit_reminder".to_string(),
            subject: "Recordatorio".to_string(),
            body: String::new(),
            created_at: fixed_now(),
            status: DeliveryStatus::Pending,
            sent_at: None,
            read: false,
        };
        assert!(mailer.deliver("ana@correo.cl", &entry).is_ok());
    }
}
