//! Notification templates and the persisted outbox.
//!
//! Messages are rendered when queued and stored with `pending` delivery
//! status; a [`Mailer`] delivers them later (`dispatch_pending`).

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use minijinja::Environment;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::types::{ClaimId, DeliveryStatus, NotificationId, Recipient};
use crate::io::mailer::Mailer;
use crate::model::{Claim, Notification, Store};

macro_rules! kinds {
    ($($variant:ident => $name:literal,)*) => {
        /// Every message the service can send.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum NotificationKind {
            $($variant,)*
        }

        impl NotificationKind {
            pub const ALL: &'static [NotificationKind] = &[$(NotificationKind::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(NotificationKind::$variant => $name,)*
                }
            }

            fn source(self) -> &'static str {
                match self {
                    $(NotificationKind::$variant => include_str!(concat!("templates/", $name, ".txt")),)*
                }
            }
        }
    };
}

kinds! {
    ClaimReceivedWithTechnician => "claim_received_with_technician",
    ClaimReceivedWithoutTechnician => "claim_received_without_technician",
    TechnicianAssigned => "technician_assigned",
    AppointmentConfirmed => "appointment_confirmed",
    AppointmentRescheduledOwner => "appointment_rescheduled_owner",
    AppointmentRescheduledTechnician => "appointment_rescheduled_technician",
    ClaimInProgress => "claim_in_progress",
    ClaimResolved => "claim_resolved",
    NewClaimAssigned => "new_claim_assigned",
    VisitReminder => "visit_reminder",
    MaterialsApproved => "materials_approved",
    DebrisApproved => "debris_approved",
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MaterialItem {
    pub name: String,
    pub quantity: u32,
    pub unit: String,
}

/// Values a template may reference. Unset fields are left undefined so
/// they render as empty text.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageContext {
    pub recipient: String,
    pub folio: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technician: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survey_link: Option<String>,
    pub materials: Vec<MaterialItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debris_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debris_volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
}

impl MessageContext {
    /// Claim-level fields filled from the store; the caller adds the rest.
    pub fn for_claim(store: &Store, claim: &Claim, recipient: Recipient) -> Self {
        let owner = store.owner(claim.owner);
        Self {
            recipient: recipient_name(store, recipient),
            folio: claim.folio.clone(),
            description: claim.description.clone(),
            category: claim
                .category
                .and_then(|id| store.specialty(id))
                .map(|s| s.name.clone()),
            location: claim.location.clone(),
            technician: claim
                .technician
                .and_then(|id| store.technician(id))
                .map(|t| t.name.clone()),
            owner_name: owner.map(|o| o.name.clone()),
            owner_phone: owner.and_then(|o| o.phone.clone()),
            ..Self::default()
        }
    }
}

pub fn format_when(at: NaiveDateTime) -> String {
    at.format("%d-%m-%Y %H:%M").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

fn truncate_text(value: String, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value;
    }
    let mut cut: String = value.chars().take(limit).collect();
    cut.push_str("...");
    cut
}

static ENGINE: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_filter("truncate_text", truncate_text);
    for kind in NotificationKind::ALL {
        env.add_template(kind.as_str(), kind.source())
            .expect("notification template should be valid");
    }
    env
});

/// Render a message. The first template line is the subject.
pub fn render(kind: NotificationKind, ctx: &MessageContext) -> Result<RenderedMessage, minijinja::Error> {
    let rendered = ENGINE.get_template(kind.as_str())?.render(ctx)?;
    let (subject, body) = rendered.split_once('\n').unwrap_or((rendered.as_str(), ""));
    Ok(RenderedMessage {
        subject: subject.trim().to_string(),
        body: body.trim_start_matches('\n').to_string(),
    })
}

/// Render and append a pending outbox entry.
pub fn queue(
    store: &mut Store,
    recipient: Recipient,
    claim: Option<ClaimId>,
    kind: NotificationKind,
    ctx: &MessageContext,
    now: NaiveDateTime,
) -> Result<NotificationId, minijinja::Error> {
    let message = render(kind, ctx)?;
    let id = store.next_notification_id();
    store.notifications.push(Notification {
        id,
        claim,
        recipient,
        kind: kind.as_str().to_string(),
        subject: message.subject,
        body: message.body,
        created_at: now,
        status: DeliveryStatus::Pending,
        sent_at: None,
        read: false,
    });
    debug!(notification = %id, kind = kind.as_str(), ?recipient, "queued notification");
    Ok(id)
}

pub fn recipient_name(store: &Store, recipient: Recipient) -> String {
    match recipient {
        Recipient::Owner(id) => store.owner(id).map(|o| o.name.clone()),
        Recipient::Technician(id) => store.technician(id).map(|t| t.name.clone()),
    }
    .unwrap_or_default()
}

pub fn recipient_email(store: &Store, recipient: Recipient) -> Option<String> {
    match recipient {
        Recipient::Owner(id) => store.owner(id).map(|o| o.email.clone()),
        Recipient::Technician(id) => store.technician(id).and_then(|t| t.email.clone()),
    }
    .filter(|email| !email.trim().is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    /// Pending entries whose recipient has no email address.
    pub skipped: usize,
}

/// Deliver every pending outbox entry. Failed deliveries stay pending.
pub fn dispatch_pending(store: &mut Store, mailer: &dyn Mailer, now: NaiveDateTime) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    let pending: Vec<(NotificationId, Recipient)> = store
        .notifications
        .iter()
        .filter(|n| n.status == DeliveryStatus::Pending)
        .map(|n| (n.id, n.recipient))
        .collect();
    for (id, recipient) in pending {
        let Some(address) = recipient_email(store, recipient) else {
            summary.skipped += 1;
            continue;
        };
        let Some(entry) = store.notification_mut(id) else {
            continue;
        };
        match mailer.deliver(&address, entry) {
            Ok(()) => {
                entry.status = DeliveryStatus::Sent;
                entry.sent_at = Some(now);
                summary.sent += 1;
            }
            Err(err) => {
                warn!(notification = %id, error = %err, "delivery failed");
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Copy delivery outcomes recorded in `from` onto the same entries in `into`.
///
/// Used when the store changed on disk while a dispatch was running: the
/// mails are out, so a fresh copy of the store must learn about them.
pub fn carry_deliveries(from: &Store, into: &mut Store) -> usize {
    let mut carried = 0;
    for sent in from
        .notifications
        .iter()
        .filter(|n| n.status == DeliveryStatus::Sent)
    {
        if let Some(entry) = into.notification_mut(sent.id)
            && entry.status == DeliveryStatus::Pending
        {
            entry.status = DeliveryStatus::Sent;
            entry.sent_at = sent.sent_at;
            carried += 1;
        }
    }
    carried
}

/// Notifications addressed to `recipient`, newest first.
pub fn inbox(store: &Store, recipient: Recipient) -> Vec<&Notification> {
    let mut found: Vec<&Notification> = store
        .notifications
        .iter()
        .filter(|n| n.recipient == recipient)
        .collect();
    found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    found
}
