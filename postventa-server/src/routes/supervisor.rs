//! Supervisor endpoints. Administrators may use them too; the action layer
//! limits supervisors to their project.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use serde::Deserialize;

use postventa::actions::Actor;
use postventa::actions::availability::{
    WindowInput, add_availability, delete_availability, free_slots,
};
use postventa::actions::claims::{
    NewClaim, assign_technician, close_claim, file_claim, visible_claims,
};
use postventa::actions::debris::{
    DebrisApproval, approve_debris, complete_debris, reject_debris, visible_debris,
};
use postventa::actions::reports::{
    EvidenceReport, MaterialControl, claim_evidence, material_control,
};
use postventa::core::assignment::{Suggestion, suggest_technicians};
use postventa::core::schedule::Slot;
use postventa::core::types::{AssignmentMethod, AvailabilityId, ClaimId, DebrisId, TechnicianId};
use postventa::model::{Claim, Debris, Store};

use super::{
    ClaimDetail, Created, ProjectQuery, ReasonBody, RemovalDone, SlotQuery, claim_detail, ctx,
};
use crate::error::ApiError;
use crate::session::StaffSession;
use crate::state::{AppState, ChangeEvent};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/supervisor/claims", get(list_claims).post(create_claim))
        .route("/supervisor/claims/{id}", get(get_claim))
        .route("/supervisor/claims/{id}/evidence", get(evidence))
        .route("/supervisor/claims/{id}/materials", get(claim_materials))
        .route("/supervisor/claims/{id}/suggestions", get(suggestions))
        .route("/supervisor/claims/{id}/assign", post(assign))
        .route("/supervisor/claims/{id}/close", post(close))
        .route("/supervisor/materials", get(materials))
        .route("/supervisor/debris", get(list_debris))
        .route("/supervisor/debris/{id}/approve", post(approve))
        .route("/supervisor/debris/{id}/reject", post(reject))
        .route("/supervisor/debris/{id}/complete", post(debris_done))
        .route("/supervisor/technicians/{id}/slots", get(slots))
        .route("/supervisor/availability", post(add_window))
        .route("/supervisor/availability/{id}", delete(remove_window))
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
    pub technician: TechnicianId,
    #[serde(default = "manual")]
    pub method: AssignmentMethod,
}

fn manual() -> AssignmentMethod {
    AssignmentMethod::Manual
}

/// Claim in the supervisor's scope; others read as missing.
fn managed_claim<'s>(store: &'s Store, actor: &Actor, id: ClaimId) -> Result<&'s Claim, ApiError> {
    store
        .claim(id)
        .filter(|claim| actor.manages_project(claim.project))
        .ok_or_else(|| ApiError::not_found(format!("claim {id} not found")))
}

/// GET /api/supervisor/claims - claims of the supervised projects, newest first.
async fn list_claims(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
) -> Json<Vec<Claim>> {
    let store = state.read().await;
    Json(
        visible_claims(&store, &session.actor)
            .into_iter()
            .cloned()
            .collect(),
    )
}

/// POST /api/supervisor/claims - file a claim on behalf of an owner.
async fn create_claim(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Json(input): Json<NewClaim>,
) -> Result<(StatusCode, Json<ClaimDetail>), ApiError> {
    let ctx = ctx(&state, session.actor);
    let filed = state.mutate(|store| file_claim(store, &ctx, input)).await?;
    state.publish(ChangeEvent::ClaimChanged { claim: filed.claim });
    if let Some(appointment) = filed.appointment {
        state.publish(ChangeEvent::AppointmentChanged { appointment });
    }
    let store = state.read().await;
    let claim = managed_claim(&store, &session.actor, filed.claim)?;
    Ok((StatusCode::CREATED, Json(claim_detail(&store, claim))))
}

/// GET /api/supervisor/claims/{id}
async fn get_claim(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Path(id): Path<ClaimId>,
) -> Result<Json<ClaimDetail>, ApiError> {
    let store = state.read().await;
    let claim = managed_claim(&store, &session.actor, id)?;
    Ok(Json(claim_detail(&store, claim)))
}

/// GET /api/supervisor/claims/{id}/evidence - grouped by uploader.
async fn evidence(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Path(id): Path<ClaimId>,
) -> Result<Json<EvidenceReport>, ApiError> {
    let ctx = ctx(&state, session.actor);
    let store = state.read().await;
    Ok(Json(claim_evidence(&store, &ctx, id)?))
}

/// GET /api/supervisor/claims/{id}/materials
async fn claim_materials(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Path(id): Path<ClaimId>,
) -> Result<Json<MaterialControl>, ApiError> {
    let ctx = ctx(&state, session.actor);
    let store = state.read().await;
    Ok(Json(material_control(&store, &ctx, Some(id), None)?))
}

/// GET /api/supervisor/materials?project=N - material usage across visits.
async fn materials(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<MaterialControl>, ApiError> {
    let ctx = ctx(&state, session.actor);
    let store = state.read().await;
    Ok(Json(material_control(&store, &ctx, None, query.project)?))
}

/// GET /api/supervisor/claims/{id}/suggestions - ranked technicians for the claim.
async fn suggestions(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Path(id): Path<ClaimId>,
) -> Result<Json<Vec<Suggestion>>, ApiError> {
    let store = state.read().await;
    let claim = managed_claim(&store, &session.actor, id)?;
    Ok(Json(suggest_technicians(&store, claim)))
}

/// POST /api/supervisor/claims/{id}/assign - assign or reassign a technician.
async fn assign(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Path(id): Path<ClaimId>,
    Json(body): Json<AssignBody>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    state
        .mutate(|store| assign_technician(store, &ctx, id, body.technician, body.method))
        .await?;
    state.publish(ChangeEvent::ClaimChanged { claim: id });
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/supervisor/claims/{id}/close - documentary closure.
async fn close(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Path(id): Path<ClaimId>,
    Json(body): Json<ReasonBody>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    state
        .mutate(|store| close_claim(store, &ctx, id, body.reason))
        .await?;
    state.publish(ChangeEvent::ClaimChanged { claim: id });
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/supervisor/debris
async fn list_debris(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
) -> Json<Vec<Debris>> {
    let store = state.read().await;
    Json(
        visible_debris(&store, &session.actor)
            .into_iter()
            .cloned()
            .collect(),
    )
}

/// POST /api/supervisor/debris/{id}/approve - schedule the removal.
async fn approve(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Path(id): Path<DebrisId>,
    Json(approval): Json<DebrisApproval>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    state
        .mutate(|store| approve_debris(store, &ctx, id, approval))
        .await?;
    state.publish(ChangeEvent::DebrisChanged { debris: id });
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/supervisor/debris/{id}/reject
async fn reject(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Path(id): Path<DebrisId>,
    Json(body): Json<ReasonBody>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    state
        .mutate(|store| reject_debris(store, &ctx, id, body.reason))
        .await?;
    state.publish(ChangeEvent::DebrisChanged { debris: id });
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/supervisor/debris/{id}/complete
async fn debris_done(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Path(id): Path<DebrisId>,
    Json(body): Json<RemovalDone>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    let removed_on = body.removed_on.unwrap_or_else(|| ctx.now.date());
    state
        .mutate(|store| complete_debris(store, &ctx, id, removed_on))
        .await?;
    state.publish(ChangeEvent::DebrisChanged { debris: id });
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/supervisor/technicians/{id}/slots - free slots for booking on an owner's behalf.
async fn slots(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Path(id): Path<TechnicianId>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Vec<Slot>>, ApiError> {
    let ctx = ctx(&state, session.actor);
    let from = query.from.unwrap_or_else(|| ctx.now.date());
    let store = state.read().await;
    Ok(Json(free_slots(&store, &ctx, id, from, query.days)?))
}

/// POST /api/supervisor/availability - add a window for a named technician.
async fn add_window(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Json(input): Json<WindowInput>,
) -> Result<(StatusCode, Json<Created<AvailabilityId>>), ApiError> {
    let ctx = ctx(&state, session.actor);
    let id = state
        .mutate(|store| add_availability(store, &ctx, input))
        .await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// DELETE /api/supervisor/availability/{id}
async fn remove_window(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Path(id): Path<AvailabilityId>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    state
        .mutate(|store| delete_availability(store, &ctx, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
