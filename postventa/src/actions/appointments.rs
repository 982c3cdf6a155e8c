//! Booking, confirming, rescheduling and cancelling appointments.

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::info;

use super::{ActionError, Actor, Ctx, claim_ref, notify};
use crate::core::schedule::check_booking;
use crate::core::status::{AppointmentEvent, AppointmentStatus, VisitStatus};
use crate::core::types::{AppointmentId, ClaimId, Recipient, TechnicianId};
use crate::model::{Appointment, Store};
use crate::notifications::{NotificationKind, format_when};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Booking {
    pub scheduled_at: NaiveDateTime,
    pub duration_minutes: Option<u32>,
    pub kind: Option<String>,
}

fn appointment_ref(store: &Store, id: AppointmentId) -> Result<&Appointment, ActionError> {
    store
        .appointment(id)
        .ok_or_else(|| ActionError::not_found("appointment", id))
}

/// Owner of the claim, the appointment's technician, or staff managing the project.
fn require_party(store: &Store, ctx: &Ctx<'_>, appointment: &Appointment) -> Result<(), ActionError> {
    let allowed = match ctx.actor {
        Actor::Owner { owner, .. } => appointment.owner == owner,
        Actor::Technician { technician, .. } => appointment.technician == technician,
        _ => {
            let claim = claim_ref(store, appointment.claim)?;
            ctx.actor.manages_project(claim.project)
        }
    };
    if allowed {
        Ok(())
    } else {
        Err(ActionError::Forbidden(format!(
            "appointment {} is not yours",
            appointment.id
        )))
    }
}

fn validate_booking(
    store: &Store,
    ctx: &Ctx<'_>,
    technician: TechnicianId,
    booking: &Booking,
    ignore: Option<AppointmentId>,
) -> Result<(), ActionError> {
    if booking.scheduled_at < ctx.now {
        return Err(ActionError::Invalid(format!(
            "{} is in the past",
            format_when(booking.scheduled_at)
        )));
    }
    if booking.duration_minutes == Some(0) {
        return Err(ActionError::Invalid("duration must be positive".to_string()));
    }
    check_booking(
        store,
        technician,
        booking.scheduled_at,
        booking.duration_minutes,
        ignore,
        &ctx.cfg.schedule,
    )?;
    Ok(())
}

fn push_appointment(
    store: &mut Store,
    claim: ClaimId,
    template: &Appointment,
    booking: Booking,
    reason: Option<String>,
) -> AppointmentId {
    let id = store.next_appointment_id();
    store.appointments.push(Appointment {
        id,
        claim,
        technician: template.technician,
        owner: template.owner,
        scheduled_at: booking.scheduled_at,
        confirmed_at: None,
        status: AppointmentStatus::Pending,
        kind: booking.kind.or_else(|| template.kind.clone()),
        reschedule_reason: reason,
        reminder_sent: false,
        duration_minutes: booking.duration_minutes.or(template.duration_minutes),
    });
    id
}

/// Book a visit for an open claim with its assigned technician.
pub fn book_appointment(
    store: &mut Store,
    ctx: &Ctx<'_>,
    claim_id: ClaimId,
    booking: Booking,
) -> Result<AppointmentId, ActionError> {
    let claim = claim_ref(store, claim_id)?;
    if !claim.status.is_open() {
        return Err(ActionError::Conflict(format!(
            "claim {} is {}",
            claim.folio, claim.status
        )));
    }
    let technician = claim.technician.ok_or_else(|| {
        ActionError::Conflict(format!("claim {} has no technician", claim.folio))
    })?;
    let template = Appointment {
        id: AppointmentId(0),
        claim: claim_id,
        technician,
        owner: claim.owner,
        scheduled_at: booking.scheduled_at,
        confirmed_at: None,
        status: AppointmentStatus::Pending,
        kind: None,
        reschedule_reason: None,
        reminder_sent: false,
        duration_minutes: None,
    };
    require_party(store, ctx, &template)?;
    validate_booking(store, ctx, technician, &booking, None)?;
    let id = push_appointment(store, claim_id, &template, booking, None);
    info!(appointment = %id, claim = %claim_id, technician = %technician, "appointment booked");
    Ok(id)
}

pub fn confirm_appointment(
    store: &mut Store,
    ctx: &Ctx<'_>,
    id: AppointmentId,
) -> Result<(), ActionError> {
    let appointment = appointment_ref(store, id)?;
    require_party(store, ctx, appointment)?;
    let next = appointment.status.apply(AppointmentEvent::Confirm)?;
    let (claim, owner, scheduled_at) = (appointment.claim, appointment.owner, appointment.scheduled_at);
    if let Some(appointment) = store.appointment_mut(id) {
        appointment.status = next;
        appointment.confirmed_at = Some(ctx.now);
    }
    info!(appointment = %id, "appointment confirmed");
    notify(
        store,
        ctx,
        claim,
        Recipient::Owner(owner),
        NotificationKind::AppointmentConfirmed,
        |m| m.scheduled_at = Some(format_when(scheduled_at)),
    )
}

/// Retire the appointment and book a new one at `booking.scheduled_at`.
///
/// Allowed for the claim's owner and the assigned technician. Both are told.
pub fn reschedule_appointment(
    store: &mut Store,
    ctx: &Ctx<'_>,
    id: AppointmentId,
    booking: Booking,
    reason: Option<String>,
) -> Result<AppointmentId, ActionError> {
    let appointment = appointment_ref(store, id)?.clone();
    if !matches!(ctx.actor, Actor::Owner { .. } | Actor::Technician { .. }) {
        return Err(ActionError::Forbidden(
            "only the owner or the technician reschedule".to_string(),
        ));
    }
    require_party(store, ctx, &appointment)?;
    let retired = appointment.status.apply(AppointmentEvent::Reschedule)?;
    validate_booking(store, ctx, appointment.technician, &booking, Some(id))?;

    if let Some(old) = store.appointment_mut(id) {
        old.status = retired;
    }
    let new_at = booking.scheduled_at;
    let new_id = push_appointment(store, appointment.claim, &appointment, booking, reason.clone());
    info!(appointment = %id, replacement = %new_id, "appointment rescheduled");

    let previous_at = format_when(appointment.scheduled_at);
    let scheduled_at = format_when(new_at);
    for (recipient, kind) in [
        (
            Recipient::Owner(appointment.owner),
            NotificationKind::AppointmentRescheduledOwner,
        ),
        (
            Recipient::Technician(appointment.technician),
            NotificationKind::AppointmentRescheduledTechnician,
        ),
    ] {
        notify(store, ctx, appointment.claim, recipient, kind, |m| {
            m.previous_at = Some(previous_at.clone());
            m.scheduled_at = Some(scheduled_at.clone());
            m.reason = reason.clone();
        })?;
    }
    Ok(new_id)
}

/// Owner cancels a pending or confirmed appointment.
pub fn cancel_appointment(
    store: &mut Store,
    ctx: &Ctx<'_>,
    id: AppointmentId,
    reason: Option<String>,
) -> Result<(), ActionError> {
    let appointment = appointment_ref(store, id)?;
    if !matches!(ctx.actor, Actor::Owner { .. }) {
        return Err(ActionError::Forbidden(
            "only the owner cancels appointments".to_string(),
        ));
    }
    require_party(store, ctx, appointment)?;
    let next = appointment.status.apply(AppointmentEvent::Cancel)?;
    if let Some(appointment) = store.appointment_mut(id) {
        appointment.status = next;
        if reason.is_some() {
            appointment.reschedule_reason = reason;
        }
    }
    info!(appointment = %id, "appointment cancelled");
    Ok(())
}

/// Technician books the next visit while the current one is running.
pub fn book_follow_up(
    store: &mut Store,
    ctx: &Ctx<'_>,
    current: AppointmentId,
    booking: Booking,
) -> Result<AppointmentId, ActionError> {
    let appointment = appointment_ref(store, current)?.clone();
    let Actor::Technician { technician, .. } = ctx.actor else {
        return Err(ActionError::Forbidden(
            "only technicians book follow-ups".to_string(),
        ));
    };
    if appointment.technician != technician {
        return Err(ActionError::Forbidden(format!(
            "appointment {current} is not yours"
        )));
    }
    let running = store.visits.iter().any(|visit| {
        visit.appointment == Some(current) && visit.status == VisitStatus::InCourse
    });
    if !running {
        return Err(ActionError::Conflict(format!(
            "appointment {current} has no visit in progress"
        )));
    }
    validate_booking(store, ctx, technician, &booking, Some(current))?;
    let booking = Booking {
        kind: booking.kind.or_else(|| Some("seguimiento".to_string())),
        ..booking
    };
    let id = push_appointment(store, appointment.claim, &appointment, booking, None);
    if let Some(visit) = store
        .visits
        .iter_mut()
        .find(|visit| visit.appointment == Some(current))
    {
        visit.requires_follow_up = true;
    }
    info!(appointment = %id, follows = %current, "follow-up booked");
    Ok(id)
}

/// Appointments visible to the actor, soonest first.
pub fn visible_appointments<'s>(store: &'s Store, actor: &Actor) -> Vec<&'s Appointment> {
    let mut found: Vec<&Appointment> = store
        .appointments
        .iter()
        .filter(|appointment| match *actor {
            Actor::Owner { owner, .. } => appointment.owner == owner,
            Actor::Technician { technician, .. } => appointment.technician == technician,
            _ => store
                .claim(appointment.claim)
                .is_some_and(|claim| actor.manages_project(claim.project)),
        })
        .collect();
    found.sort_by_key(|appointment| (appointment.scheduled_at, appointment.id));
    found
}
