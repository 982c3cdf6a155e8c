//! Running a technician visit: start, material usage, debris, evidence, close.

use serde::Deserialize;
use tracing::{info, warn};

use super::{ActionError, Actor, Ctx, claim_ref, notify, transition_claim};
use crate::core::status::{AppointmentEvent, ClaimEvent, DebrisStatus, VisitEvent, VisitStatus};
use crate::core::types::{
    AppointmentId, DebrisKind, EvidenceKind, MaterialId, Recipient, TechnicianId, Uploader,
    VisitId,
};
use crate::model::{Debris, Evidence, MaterialUsage, Store, Survey, Visit};
use crate::notifications::{MaterialItem, NotificationKind};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MaterialLine {
    pub material: MaterialId,
    pub quantity: u32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DebrisReport {
    pub kind: DebrisKind,
    pub volume_m3: f64,
    pub location: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EvidenceUpload {
    pub kind: EvidenceKind,
    pub original_name: String,
    pub size_kb: u64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VisitReport {
    pub resolved: bool,
    pub resolution: Option<String>,
    pub notes: Option<String>,
    pub work_type: Option<String>,
    pub materials: Vec<MaterialLine>,
    pub debris: Option<DebrisReport>,
    pub evidence: Vec<EvidenceUpload>,
}

fn acting_technician(ctx: &Ctx<'_>) -> Result<TechnicianId, ActionError> {
    match ctx.actor {
        Actor::Technician { technician, .. } => Ok(technician),
        _ => Err(ActionError::Forbidden(
            "only technicians run visits".to_string(),
        )),
    }
}

/// Technician arrives: the appointment goes `en_curso` and a visit opens.
pub fn start_visit(
    store: &mut Store,
    ctx: &Ctx<'_>,
    appointment_id: AppointmentId,
) -> Result<VisitId, ActionError> {
    let technician = acting_technician(ctx)?;
    let appointment = store
        .appointment(appointment_id)
        .ok_or_else(|| ActionError::not_found("appointment", appointment_id))?;
    if appointment.technician != technician {
        return Err(ActionError::Forbidden(format!(
            "appointment {appointment_id} is not yours"
        )));
    }
    let claim = claim_ref(store, appointment.claim)?;
    if !claim.status.is_open() {
        return Err(ActionError::Conflict(format!(
            "claim {} is {}",
            claim.folio, claim.status
        )));
    }
    let next = appointment.status.apply(AppointmentEvent::Start)?;
    let claim_id = appointment.claim;

    if let Some(appointment) = store.appointment_mut(appointment_id) {
        appointment.status = next;
    }
    let id = store.next_visit_id();
    store.visits.push(Visit {
        id,
        appointment: Some(appointment_id),
        claim: claim_id,
        technician,
        started_at: ctx.now,
        closed_at: None,
        status: VisitStatus::InCourse,
        notes: None,
        duration_minutes: None,
        work_type: None,
        requires_follow_up: false,
    });
    info!(visit = %id, appointment = %appointment_id, claim = %claim_id, "visit started");
    Ok(id)
}

/// Technician closes the running visit of `appointment_id`.
///
/// Records materials (stock never drops below zero), an optional debris
/// request and evidence metadata, completes the appointment and moves the
/// claim to `en_proceso` or `resuelto`. A resolved claim gets a pending survey.
pub fn complete_visit(
    store: &mut Store,
    ctx: &Ctx<'_>,
    appointment_id: AppointmentId,
    report: VisitReport,
) -> Result<VisitId, ActionError> {
    let technician = acting_technician(ctx)?;
    let appointment = store
        .appointment(appointment_id)
        .ok_or_else(|| ActionError::not_found("appointment", appointment_id))?;
    if appointment.technician != technician {
        return Err(ActionError::Forbidden(format!(
            "appointment {appointment_id} is not yours"
        )));
    }
    let visit = store
        .visits
        .iter()
        .find(|v| v.appointment == Some(appointment_id) && v.status == VisitStatus::InCourse)
        .ok_or_else(|| {
            ActionError::Conflict(format!("appointment {appointment_id} has no visit in progress"))
        })?;
    let claim = claim_ref(store, appointment.claim)?;

    let next_appointment = appointment.status.apply(AppointmentEvent::Complete)?;
    let next_visit = visit.status.apply(VisitEvent::Close)?;
    claim.status.apply(ClaimEvent::VisitCompleted {
        resolved: report.resolved,
    })?;
    for line in &report.materials {
        if line.quantity == 0 {
            return Err(ActionError::Invalid(format!(
                "material {} has zero quantity",
                line.material
            )));
        }
        if store.material(line.material).is_none() {
            return Err(ActionError::Invalid(format!(
                "unknown material {}",
                line.material
            )));
        }
    }
    if let Some(debris) = &report.debris
        && (debris.volume_m3.is_nan() || debris.volume_m3 <= 0.0)
    {
        return Err(ActionError::Invalid(
            "debris volume must be positive".to_string(),
        ));
    }
    if report
        .evidence
        .iter()
        .any(|upload| upload.original_name.trim().is_empty())
    {
        return Err(ActionError::Invalid("evidence needs a file name".to_string()));
    }

    let visit_id = visit.id;
    let claim_id = claim.id;
    let owner = claim.owner;
    let started_at = visit.started_at;

    let mut items = Vec::new();
    for line in &report.materials {
        let usage_id = store.next_material_usage_id();
        store.material_usages.push(MaterialUsage {
            id: usage_id,
            visit: visit_id,
            material: line.material,
            quantity: line.quantity,
            used_at: ctx.now,
            notes: line.notes.clone(),
        });
        if let Some(material) = store.material_mut(line.material) {
            if let Some(stock) = material.stock.as_mut() {
                if *stock < line.quantity {
                    warn!(
                        material = %material.code,
                        stock = *stock,
                        requested = line.quantity,
                        "stock exhausted"
                    );
                }
                *stock = stock.saturating_sub(line.quantity);
            }
            items.push(MaterialItem {
                name: material.name.clone(),
                quantity: line.quantity,
                unit: material.unit_of_measure.clone().unwrap_or_default(),
            });
        }
    }

    if let Some(debris) = report.debris {
        let debris_id = store.next_debris_id();
        store.debris.push(Debris {
            id: debris_id,
            claim: claim_id,
            visit: Some(visit_id),
            kind: debris.kind,
            volume_m3: debris.volume_m3,
            location: debris.location,
            scheduled_on: None,
            removed_on: None,
            status: DebrisStatus::Pending,
            removal_company: None,
            cost_cents: 0,
            notes: debris.notes,
        });
        if let Some(claim) = store.claim_mut(claim_id) {
            claim.requires_debris_removal = true;
        }
        info!(debris = %debris_id, claim = %claim_id, "debris removal requested");
    }

    for upload in report.evidence {
        let evidence_id = store.next_evidence_id();
        store.evidence.push(Evidence {
            id: evidence_id,
            claim: claim_id,
            kind: upload.kind,
            original_name: upload.original_name,
            size_kb: upload.size_kb,
            uploaded_at: ctx.now,
            description: upload.description,
            uploaded_by: Uploader::Technician,
        });
    }

    if let Some(visit) = store.visit_mut(visit_id) {
        visit.status = next_visit;
        visit.closed_at = Some(ctx.now);
        visit.duration_minutes = u32::try_from((ctx.now - started_at).num_minutes()).ok();
        visit.notes = report.notes;
        visit.work_type = report.work_type;
    }
    if let Some(appointment) = store.appointment_mut(appointment_id) {
        appointment.status = next_appointment;
    }
    if report.resolved
        && let Some(claim) = store.claim_mut(claim_id)
    {
        claim.resolution = report.resolution;
    }
    transition_claim(
        store,
        ctx,
        claim_id,
        ClaimEvent::VisitCompleted {
            resolved: report.resolved,
        },
        None,
    )?;
    info!(visit = %visit_id, claim = %claim_id, resolved = report.resolved, "visit completed");

    if !items.is_empty() {
        notify(
            store,
            ctx,
            claim_id,
            Recipient::Owner(owner),
            NotificationKind::MaterialsApproved,
            |m| m.materials = items,
        )?;
    }
    if report.resolved {
        if !store.surveys.iter().any(|survey| survey.claim == claim_id) {
            let survey_id = store.next_survey_id();
            store.surveys.push(Survey {
                id: survey_id,
                claim: claim_id,
                visit: Some(visit_id),
                score: None,
                technician_score: None,
                timeliness_score: None,
                solution_score: None,
                comments: None,
                answered_at: None,
            });
        }
        let link = ctx.cfg.survey_link_for(claim_id.0);
        notify(
            store,
            ctx,
            claim_id,
            Recipient::Owner(owner),
            NotificationKind::ClaimResolved,
            |m| m.survey_link = Some(link),
        )?;
    } else {
        notify(
            store,
            ctx,
            claim_id,
            Recipient::Owner(owner),
            NotificationKind::ClaimInProgress,
            |_| {},
        )?;
    }
    Ok(visit_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::{AppointmentStatus, ClaimStatus};
    use crate::core::types::{AccountId, ClaimId};
    use crate::io::config::PostventaConfig;
    use crate::test_support::{at, sample_store};

    fn daniela() -> Actor {
        Actor::Technician {
            account: AccountId(9),
            technician: TechnicianId(2),
        }
    }

    fn started(store: &mut Store, cfg: &PostventaConfig) -> VisitId {
        let ctx = Ctx::new(cfg, at("2025-03-20 15:10"), daniela());
        start_visit(store, &ctx, AppointmentId(3)).expect("start")
    }

    #[test]
    fn start_visit_moves_appointment_to_in_course() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let visit = started(&mut store, &cfg);
        assert_eq!(
            store.appointment(AppointmentId(3)).expect("appointment").status,
            AppointmentStatus::InCourse
        );
        let visit = store.visit(visit).expect("visit");
        assert_eq!(visit.status, VisitStatus::InCourse);
        assert_eq!(visit.claim, ClaimId(2));
    }

    #[test]
    fn other_technician_cannot_start() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let carlos = Actor::Technician {
            account: AccountId(3),
            technician: TechnicianId(1),
        };
        let ctx = Ctx::new(&cfg, at("2025-03-20 15:10"), carlos);
        assert!(matches!(
            start_visit(&mut store, &ctx, AppointmentId(3)),
            Err(ActionError::Forbidden(_))
        ));
    }

    #[test]
    fn resolving_visit_records_everything() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let visit_id = started(&mut store, &cfg);
        let ctx = Ctx::new(&cfg, at("2025-03-20 16:40"), daniela());
        let report = VisitReport {
            resolved: true,
            resolution: Some("Se cambió el automático".to_string()),
            materials: vec![MaterialLine {
                material: MaterialId(2),
                quantity: 3,
                notes: None,
            }],
            debris: Some(DebrisReport {
                kind: DebrisKind::Mixed,
                volume_m3: 0.5,
                location: "Pasillo".to_string(),
                notes: None,
            }),
            evidence: vec![EvidenceUpload {
                kind: EvidenceKind::Image,
                original_name: "tablero.jpg".to_string(),
                size_kb: 320,
                description: None,
            }],
            ..VisitReport::default()
        };
        let closed = complete_visit(&mut store, &ctx, AppointmentId(3), report).expect("complete");
        assert_eq!(closed, visit_id);

        let visit = store.visit(visit_id).expect("visit");
        assert_eq!(visit.status, VisitStatus::Completed);
        assert_eq!(visit.duration_minutes, Some(90));
        let claim = store.claim(ClaimId(2)).expect("claim");
        assert_eq!(claim.status, ClaimStatus::Resolved);
        assert_eq!(claim.resolved_at, Some(at("2025-03-20 16:40")));
        assert!(claim.requires_debris_removal);
        assert_eq!(store.material(MaterialId(2)).expect("material").stock, Some(7));
        assert_eq!(store.visit_material_cost(visit_id), 1_350_000);
        assert!(store.surveys.iter().any(|s| s.claim == ClaimId(2) && s.answered_at.is_none()));
        assert_eq!(store.evidence.len(), 1);
        let kinds: Vec<&str> = store.notifications.iter().map(|n| n.kind.as_str()).collect();
        assert_eq!(kinds, vec!["materials_approved", "claim_resolved"]);
        assert!(store.notifications[1].body.contains("/encuesta/2"));
    }

    #[test]
    fn unresolved_visit_keeps_claim_in_progress() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        started(&mut store, &cfg);
        let ctx = Ctx::new(&cfg, at("2025-03-20 16:00"), daniela());
        complete_visit(&mut store, &ctx, AppointmentId(3), VisitReport::default())
            .expect("complete");
        assert_eq!(
            store.claim(ClaimId(2)).expect("claim").status,
            ClaimStatus::InProgress
        );
        assert_eq!(
            store.notifications.last().map(|n| n.kind.as_str()),
            Some("claim_in_progress")
        );
        assert!(!store.surveys.iter().any(|s| s.claim == ClaimId(2)));
    }

    #[test]
    fn stock_never_goes_negative() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        started(&mut store, &cfg);
        let ctx = Ctx::new(&cfg, at("2025-03-20 16:00"), daniela());
        let report = VisitReport {
            materials: vec![MaterialLine {
                material: MaterialId(2),
                quantity: 25,
                notes: None,
            }],
            ..VisitReport::default()
        };
        complete_visit(&mut store, &ctx, AppointmentId(3), report).expect("complete");
        assert_eq!(store.material(MaterialId(2)).expect("material").stock, Some(0));
    }

    #[test]
    fn bad_material_lines_reject_the_whole_report() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        started(&mut store, &cfg);
        let before = store.clone();
        let ctx = Ctx::new(&cfg, at("2025-03-20 16:00"), daniela());
        for line in [
            MaterialLine {
                material: MaterialId(99),
                quantity: 1,
                notes: None,
            },
            MaterialLine {
                material: MaterialId(1),
                quantity: 0,
                notes: None,
            },
        ] {
            let report = VisitReport {
                resolved: true,
                materials: vec![line],
                ..VisitReport::default()
            };
            assert!(matches!(
                complete_visit(&mut store, &ctx, AppointmentId(3), report),
                Err(ActionError::Invalid(_))
            ));
            assert_eq!(store, before);
        }
    }

    #[test]
    fn completing_without_running_visit_conflicts() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, at("2025-03-20 16:00"), daniela());
        assert!(matches!(
            complete_visit(&mut store, &ctx, AppointmentId(3), VisitReport::default()),
            Err(ActionError::Conflict(_))
        ));
    }
}
