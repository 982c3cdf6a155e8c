//! Day-before visit reminders.

use chrono::NaiveDate;
use tracing::info;

use super::{ActionError, Ctx, notify};
use crate::core::types::{AppointmentId, Recipient};
use crate::model::Store;
use crate::notifications::{NotificationKind, format_when};

/// Queue one reminder per active appointment on `date` that has not had one.
///
/// The technician receives the reminder. Returns the reminded appointments
/// in schedule order.
pub fn send_reminders(
    store: &mut Store,
    ctx: &Ctx<'_>,
    date: NaiveDate,
) -> Result<Vec<AppointmentId>, ActionError> {
    let mut due: Vec<_> = store
        .appointments
        .iter()
        .filter(|a| a.scheduled_at.date() == date && a.status.is_active() && !a.reminder_sent)
        .map(|a| (a.scheduled_at, a.id, a.claim, a.technician))
        .collect();
    due.sort();

    let mut sent = Vec::new();
    for (scheduled_at, id, claim, technician) in due {
        notify(
            store,
            ctx,
            claim,
            Recipient::Technician(technician),
            NotificationKind::VisitReminder,
            |m| m.scheduled_at = Some(format_when(scheduled_at)),
        )?;
        if let Some(appointment) = store.appointment_mut(id) {
            appointment.reminder_sent = true;
        }
        sent.push(id);
    }
    info!(%date, reminded = sent.len(), "reminders queued");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Actor;
    use crate::core::status::AppointmentStatus;
    use crate::core::types::TechnicianId;
    use crate::io::config::PostventaConfig;
    use crate::test_support::{appointment, date, fixed_now, sample_store};

    #[test]
    fn reminders_go_out_once() {
        let mut store = sample_store();
        store.appointments.push(appointment(
            5,
            2,
            2,
            "2025-03-20 09:00",
            AppointmentStatus::Cancelled,
        ));
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), Actor::System);

        let sent = send_reminders(&mut store, &ctx, date("2025-03-20")).expect("send");
        assert_eq!(sent, vec![AppointmentId(3)]);
        let message = store.notifications.last().expect("reminder");
        assert_eq!(message.recipient, Recipient::Technician(TechnicianId(2)));
        assert!(message.subject.contains("20-03-2025 15:00"));

        let again = send_reminders(&mut store, &ctx, date("2025-03-20")).expect("send");
        assert!(again.is_empty());
        assert_eq!(store.notifications.len(), 1);
    }
}
