//! Filing, assigning, cancelling and closing claims.

use chrono::{Datelike, NaiveDateTime};
use serde::Deserialize;
use tracing::info;

use super::{
    ActionError, Actor, Ctx, claim_ref, notify, require_claim_manager, require_claim_owner,
    transition_claim,
};
use crate::core::assignment::suggest_technicians;
use crate::core::folio::next_folio;
use crate::core::schedule::check_booking;
use crate::core::status::{
    AppointmentEvent, AppointmentStatus, ClaimEvent, ClaimStatus, VisitStatus,
};
use crate::core::types::{
    AppointmentId, AssignmentMethod, ClaimId, OwnerId, ProjectId, Recipient, SpecialtyId,
    TechnicianId, UnitId,
};
use crate::model::{Appointment, Assignment, Claim, HistoryEntry, Store};
use crate::notifications::{NotificationKind, format_when};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewClaim {
    /// Required when staff files on behalf of an owner; ignored for owners.
    pub owner: Option<OwnerId>,
    pub project: Option<ProjectId>,
    pub unit: Option<UnitId>,
    pub description: String,
    pub location: Option<String>,
    pub category: Option<SpecialtyId>,
    pub priority: Option<String>,
    pub estimated_hours: Option<u32>,
    pub technician: Option<TechnicianId>,
    /// First appointment; needs a technician.
    pub first_visit: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiledClaim {
    pub claim: ClaimId,
    pub appointment: Option<AppointmentId>,
}

pub fn file_claim(store: &mut Store, ctx: &Ctx<'_>, input: NewClaim) -> Result<FiledClaim, ActionError> {
    let owner_id = match ctx.actor {
        Actor::Owner { owner, .. } => owner,
        Actor::Technician { .. } => {
            return Err(ActionError::Forbidden(
                "technicians cannot file claims".to_string(),
            ));
        }
        _ => input
            .owner
            .ok_or_else(|| ActionError::Invalid("owner is required".to_string()))?,
    };
    let owner = store
        .owner(owner_id)
        .ok_or_else(|| ActionError::not_found("owner", owner_id))?;
    let description = input.description.trim().to_string();
    if description.is_empty() {
        return Err(ActionError::Invalid("description must not be empty".to_string()));
    }
    let unit = match input.unit {
        Some(id) => Some(store.unit(id).ok_or_else(|| ActionError::not_found("unit", id))?),
        None => None,
    };
    let project = unit
        .map(|unit| unit.project)
        .or(input.project)
        .or(owner.project)
        .ok_or_else(|| ActionError::Invalid("claim needs a project".to_string()))?;
    if store.project(project).is_none() {
        return Err(ActionError::not_found("project", project));
    }
    if ctx.actor.is_staff() && !ctx.actor.manages_project(project) {
        return Err(ActionError::Forbidden(format!(
            "{} does not manage project {project}",
            ctx.actor.role_name()
        )));
    }
    if let Some(unit) = unit
        && unit.owner.is_some_and(|unit_owner| unit_owner != owner_id)
    {
        return Err(ActionError::Forbidden(format!(
            "unit {} belongs to another owner",
            unit.id
        )));
    }
    if let Some(category) = input.category
        && store.specialty(category).is_none()
    {
        return Err(ActionError::not_found("specialty", category));
    }
    if let Some(technician) = input.technician {
        let tech = store
            .technician(technician)
            .ok_or_else(|| ActionError::not_found("technician", technician))?;
        if !tech.active {
            return Err(ActionError::Conflict(format!(
                "technician {technician} is inactive"
            )));
        }
    }
    if let Some(start) = input.first_visit {
        let technician = input.technician.ok_or_else(|| {
            ActionError::Invalid("a first visit needs a technician".to_string())
        })?;
        if start < ctx.now {
            return Err(ActionError::Invalid("first visit is in the past".to_string()));
        }
        check_booking(store, technician, start, None, None, &ctx.cfg.schedule)?;
    }

    let folio = next_folio(
        store.claims.iter().map(|claim| claim.folio.as_str()),
        &ctx.cfg.folio.prefix,
        ctx.now.year(),
    );
    let id = store.next_claim_id();
    store.claims.push(Claim {
        id,
        folio: folio.clone(),
        description,
        resolution: None,
        unit: input.unit,
        location: input.location.filter(|l| !l.trim().is_empty()),
        filed_at: ctx.now,
        assigned_at: None,
        resolved_at: None,
        closed_at: None,
        estimated_hours: input.estimated_hours,
        status: ClaimStatus::Filed,
        priority: input.priority,
        category: input.category,
        owner: owner_id,
        project,
        technician: None,
        requires_debris_removal: false,
    });
    let history_id = store.next_history_id();
    store.history.push(HistoryEntry {
        id: history_id,
        claim: id,
        actor: ctx.actor.account(),
        from: None,
        to: ClaimStatus::Filed,
        at: ctx.now,
        reason: None,
    });
    info!(claim = %id, %folio, owner = %owner_id, "claim filed");

    let mut appointment = None;
    if let Some(technician) = input.technician {
        record_assignment(store, ctx, id, technician, AssignmentMethod::Manual, None)?;
        if let Some(start) = input.first_visit {
            let appointment_id = store.next_appointment_id();
            store.appointments.push(Appointment {
                id: appointment_id,
                claim: id,
                technician,
                owner: owner_id,
                scheduled_at: start,
                confirmed_at: None,
                status: AppointmentStatus::Pending,
                kind: Some("inspeccion".to_string()),
                reschedule_reason: None,
                reminder_sent: false,
                duration_minutes: None,
            });
            appointment = Some(appointment_id);
        }
        let scheduled_at = input.first_visit.map(format_when);
        let for_owner = scheduled_at.clone();
        notify(
            store,
            ctx,
            id,
            Recipient::Owner(owner_id),
            NotificationKind::ClaimReceivedWithTechnician,
            |m| m.scheduled_at = for_owner,
        )?;
        notify(
            store,
            ctx,
            id,
            Recipient::Technician(technician),
            NotificationKind::NewClaimAssigned,
            |m| m.scheduled_at = scheduled_at,
        )?;
    } else {
        notify(
            store,
            ctx,
            id,
            Recipient::Owner(owner_id),
            NotificationKind::ClaimReceivedWithoutTechnician,
            |_| {},
        )?;
    }
    Ok(FiledClaim {
        claim: id,
        appointment,
    })
}

/// Deactivate the previous assignment, record the new one and apply `Assign`.
fn record_assignment(
    store: &mut Store,
    ctx: &Ctx<'_>,
    claim: ClaimId,
    technician: TechnicianId,
    method: AssignmentMethod,
    match_score: Option<u32>,
) -> Result<(), ActionError> {
    transition_claim(store, ctx, claim, ClaimEvent::Assign, None)?;
    for assignment in store
        .assignments
        .iter_mut()
        .filter(|a| a.claim == claim && a.active)
    {
        assignment.active = false;
    }
    let id = store.next_assignment_id();
    store.assignments.push(Assignment {
        id,
        claim,
        technician,
        assigned_at: ctx.now,
        method,
        match_score,
        active: true,
    });
    if let Some(claim) = store.claim_mut(claim) {
        claim.technician = Some(technician);
        claim.assigned_at = Some(ctx.now);
    }
    Ok(())
}

/// Assign (or reassign) a technician. Pending and confirmed appointments move
/// to the new technician.
pub fn assign_technician(
    store: &mut Store,
    ctx: &Ctx<'_>,
    claim_id: ClaimId,
    technician: TechnicianId,
    method: AssignmentMethod,
) -> Result<(), ActionError> {
    let claim = claim_ref(store, claim_id)?;
    require_claim_manager(ctx, claim)?;
    claim.status.apply(ClaimEvent::Assign)?;
    let previous = claim.technician;
    if previous == Some(technician) {
        return Err(ActionError::Conflict(format!(
            "technician {technician} is already assigned to {}",
            claim.folio
        )));
    }
    let tech = store
        .technician(technician)
        .ok_or_else(|| ActionError::not_found("technician", technician))?;
    if !tech.active {
        return Err(ActionError::Conflict(format!(
            "technician {technician} is inactive"
        )));
    }
    let match_score = match method {
        AssignmentMethod::Manual => None,
        AssignmentMethod::Suggested => Some(
            suggest_technicians(store, claim)
                .into_iter()
                .find(|s| s.technician == technician)
                .map(|s| s.match_score)
                .ok_or_else(|| {
                    ActionError::Invalid(format!(
                        "technician {technician} is not a suggestion for {}",
                        claim.folio
                    ))
                })?,
        ),
    };
    let moving: Vec<&Appointment> = store
        .appointments
        .iter()
        .filter(|a| {
            a.claim == claim_id
                && matches!(a.status, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
        })
        .collect();
    for appointment in &moving {
        check_booking(
            store,
            technician,
            appointment.scheduled_at,
            appointment.duration_minutes,
            None,
            &ctx.cfg.schedule,
        )?;
    }
    let moving: Vec<AppointmentId> = moving.iter().map(|a| a.id).collect();

    record_assignment(store, ctx, claim_id, technician, method, match_score)?;
    for id in moving {
        if let Some(appointment) = store.appointment_mut(id) {
            appointment.technician = technician;
        }
    }
    info!(claim = %claim_id, technician = %technician, previous = ?previous, "technician assigned");

    let owner = claim_ref(store, claim_id)?.owner;
    notify(
        store,
        ctx,
        claim_id,
        Recipient::Owner(owner),
        NotificationKind::TechnicianAssigned,
        |_| {},
    )?;
    notify(
        store,
        ctx,
        claim_id,
        Recipient::Technician(technician),
        NotificationKind::NewClaimAssigned,
        |_| {},
    )?;
    Ok(())
}

/// Owner withdraws an open claim; its pending and confirmed appointments are cancelled.
pub fn cancel_claim(
    store: &mut Store,
    ctx: &Ctx<'_>,
    claim_id: ClaimId,
    reason: Option<String>,
) -> Result<(), ActionError> {
    let claim = claim_ref(store, claim_id)?;
    require_claim_owner(ctx, claim)?;
    if store
        .visits
        .iter()
        .any(|visit| visit.claim == claim_id && visit.status == VisitStatus::InCourse)
    {
        return Err(ActionError::Conflict(format!(
            "claim {} has a visit in course",
            claim.folio
        )));
    }
    transition_claim(store, ctx, claim_id, ClaimEvent::Cancel, reason)?;
    for appointment in store.appointments.iter_mut().filter(|a| {
        a.claim == claim_id
            && matches!(a.status, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }) {
        appointment.status = appointment.status.apply(AppointmentEvent::Cancel)?;
    }
    for assignment in store
        .assignments
        .iter_mut()
        .filter(|a| a.claim == claim_id && a.active)
    {
        assignment.active = false;
    }
    Ok(())
}

/// Documentary closure of a resolved claim.
pub fn close_claim(
    store: &mut Store,
    ctx: &Ctx<'_>,
    claim_id: ClaimId,
    note: Option<String>,
) -> Result<(), ActionError> {
    let claim = claim_ref(store, claim_id)?;
    if !ctx.actor.is_staff() {
        return Err(ActionError::Forbidden(
            "only supervisors and administrators close claims".to_string(),
        ));
    }
    require_claim_manager(ctx, claim)?;
    transition_claim(store, ctx, claim_id, ClaimEvent::Close, note)?;
    Ok(())
}

/// Claims visible to the actor: owners see their own, technicians their
/// assigned ones, supervisors their projects. Newest first.
pub fn visible_claims<'s>(store: &'s Store, actor: &Actor) -> Vec<&'s Claim> {
    let mut claims: Vec<&Claim> = store
        .claims
        .iter()
        .filter(|claim| match *actor {
            Actor::Owner { owner, .. } => claim.owner == owner,
            Actor::Technician { technician, .. } => claim.technician == Some(technician),
            _ => actor.manages_project(claim.project),
        })
        .collect();
    claims.sort_by(|a, b| b.filed_at.cmp(&a.filed_at).then(b.id.cmp(&a.id)));
    claims
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AccountId, AssignmentId};
    use crate::io::config::PostventaConfig;
    use crate::test_support::{at, fixed_now, sample_store};

    fn owner_actor() -> Actor {
        Actor::Owner {
            account: AccountId(2),
            owner: OwnerId(1),
        }
    }

    fn supervisor() -> Actor {
        Actor::Supervisor {
            account: AccountId(1),
            project: None,
        }
    }

    fn count_kind(store: &Store, kind: &str) -> usize {
        store.notifications.iter().filter(|n| n.kind == kind).count()
    }

    #[test]
    fn owner_files_claim_without_technician() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), owner_actor());
        let filed = file_claim(
            &mut store,
            &ctx,
            NewClaim {
                unit: Some(UnitId(1)),
                description: "  Humedad en muro del dormitorio ".to_string(),
                category: Some(SpecialtyId(1)),
                ..NewClaim::default()
            },
        )
        .expect("file");
        let claim = store.claim(filed.claim).expect("claim");
        assert_eq!(claim.folio, "PV-2025-0005");
        assert_eq!(claim.status, ClaimStatus::Filed);
        assert_eq!(claim.description, "Humedad en muro del dormitorio");
        assert_eq!(claim.project, ProjectId(1));
        assert_eq!(filed.appointment, None);
        assert_eq!(count_kind(&store, "claim_received_without_technician"), 1);
        let entry = store.history.last().expect("history");
        assert_eq!((entry.from, entry.to), (None, ClaimStatus::Filed));
    }

    #[test]
    fn staff_files_with_technician_and_first_visit() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor());
        let filed = file_claim(
            &mut store,
            &ctx,
            NewClaim {
                owner: Some(OwnerId(2)),
                description: "Enchufe sin corriente".to_string(),
                technician: Some(TechnicianId(1)),
                first_visit: Some(at("2025-03-17 09:00")),
                ..NewClaim::default()
            },
        )
        .expect("file");
        let claim = store.claim(filed.claim).expect("claim");
        assert_eq!(claim.status, ClaimStatus::Assigned);
        assert_eq!(claim.technician, Some(TechnicianId(1)));
        let appointment = store
            .appointment(filed.appointment.expect("appointment"))
            .expect("stored");
        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert_eq!(appointment.owner, OwnerId(2));
        assert_eq!(count_kind(&store, "claim_received_with_technician"), 1);
        assert_eq!(count_kind(&store, "new_claim_assigned"), 1);
        let to_technician = store.notifications.last().expect("notification");
        assert!(to_technician.body.contains("17-03-2025 09:00"));
    }

    #[test]
    fn first_visit_without_technician_is_rejected() {
        let mut store = sample_store();
        let before = store.clone();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), owner_actor());
        let err = file_claim(
            &mut store,
            &ctx,
            NewClaim {
                description: "Grieta".to_string(),
                first_visit: Some(at("2025-03-17 09:00")),
                ..NewClaim::default()
            },
        )
        .expect_err("needs technician");
        assert!(matches!(err, ActionError::Invalid(_)));
        assert_eq!(store, before);
    }

    #[test]
    fn reassignment_deactivates_previous_and_moves_appointments() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor());
        assign_technician(
            &mut store,
            &ctx,
            ClaimId(2),
            TechnicianId(1),
            AssignmentMethod::Manual,
        )
        .expect("reassign");
        assert!(!store.assignment(AssignmentId(2)).expect("old").active);
        let active: Vec<_> = store
            .assignments
            .iter()
            .filter(|a| a.claim == ClaimId(2) && a.active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].technician, TechnicianId(1));
        let moved = store.appointment(AppointmentId(3)).expect("appointment");
        assert_eq!(moved.technician, TechnicianId(1));
        assert_eq!(
            store.claim(ClaimId(2)).expect("claim").technician,
            Some(TechnicianId(1))
        );
    }

    #[test]
    fn suggested_assignment_records_match_score() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor());
        assign_technician(
            &mut store,
            &ctx,
            ClaimId(3),
            TechnicianId(1),
            AssignmentMethod::Suggested,
        )
        .expect("assign");
        let latest = store.assignments.last().expect("assignment");
        assert_eq!(latest.method, AssignmentMethod::Suggested);
        assert!(latest.match_score.is_some());
        assert_eq!(
            store.claim(ClaimId(3)).expect("claim").status,
            ClaimStatus::Assigned
        );

        let err = assign_technician(
            &mut store,
            &ctx,
            ClaimId(3),
            TechnicianId(2),
            AssignmentMethod::Suggested,
        )
        .expect_err("wrong specialty");
        assert!(matches!(err, ActionError::Invalid(_)));
    }

    #[test]
    fn owner_cancels_open_claim_but_not_resolved_one() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), owner_actor());
        cancel_claim(&mut store, &ctx, ClaimId(2), Some("Ya no aplica".to_string()))
            .expect("cancel");
        assert_eq!(
            store.claim(ClaimId(2)).expect("claim").status,
            ClaimStatus::Cancelled
        );
        assert_eq!(
            store.appointment(AppointmentId(3)).expect("appointment").status,
            AppointmentStatus::Cancelled
        );

        let err = cancel_claim(&mut store, &ctx, ClaimId(1), None).expect_err("resolved");
        assert!(matches!(err, ActionError::Transition(_)));
    }

    #[test]
    fn claim_with_visit_in_course_cannot_be_cancelled() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let technician = Actor::Technician {
            account: AccountId(9),
            technician: TechnicianId(2),
        };
        let tech_ctx = Ctx::new(&cfg, fixed_now(), technician);
        crate::actions::visits::start_visit(&mut store, &tech_ctx, AppointmentId(3))
            .expect("start");

        let ctx = Ctx::new(&cfg, fixed_now(), owner_actor());
        let before = store.clone();
        let err = cancel_claim(&mut store, &ctx, ClaimId(2), None).expect_err("visit running");
        assert!(matches!(err, ActionError::Conflict(_)));
        assert_eq!(store, before);
    }

    #[test]
    fn only_staff_close_resolved_claims() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let owner_ctx = Ctx::new(&cfg, fixed_now(), owner_actor());
        assert!(matches!(
            close_claim(&mut store, &owner_ctx, ClaimId(1), None),
            Err(ActionError::Forbidden(_))
        ));
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor());
        close_claim(&mut store, &ctx, ClaimId(1), None).expect("close");
        assert_eq!(
            store.claim(ClaimId(1)).expect("claim").status,
            ClaimStatus::Closed
        );
    }

    #[test]
    fn visibility_follows_role() {
        let store = sample_store();
        let technician = Actor::Technician {
            account: AccountId(3),
            technician: TechnicianId(1),
        };
        let ids: Vec<ClaimId> = visible_claims(&store, &technician)
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![ClaimId(1), ClaimId(4)]);
        assert_eq!(visible_claims(&store, &owner_actor()).len(), 4);
    }
}
