use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, patch, post};

use postventa::actions::admin::{
    AccountSummary, NewSupervisor, NewTechnician, RosterEntry, TechnicianUpdate,
    create_supervisor, create_technician, deactivate_technician, list_accounts,
    remove_supervisor, technician_roster, update_technician,
};
use postventa::actions::reports::{CostSummary, cost_summary};
use postventa::core::types::{AccountId, TechnicianId};

use super::{Created, ProjectQuery, ctx};
use crate::error::ApiError;
use crate::session::{AdminSession, StaffSession};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/technicians", get(roster).post(add_technician))
        .route(
            "/admin/technicians/{id}",
            patch(edit_technician).delete(retire_technician),
        )
        .route("/admin/accounts", get(accounts))
        .route("/admin/supervisors", post(add_supervisor))
        .route("/admin/supervisors/{id}", delete(retire_supervisor))
        .route("/admin/costs", get(costs))
}

/// GET /api/admin/technicians - roster with current load. Supervisors may read it.
async fn roster(State(state): State<AppState>, _session: StaffSession) -> Json<Vec<RosterEntry>> {
    let store = state.read().await;
    Json(technician_roster(&store))
}

/// POST /api/admin/technicians
async fn add_technician(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    Json(input): Json<NewTechnician>,
) -> Result<(StatusCode, Json<Created<TechnicianId>>), ApiError> {
    let ctx = ctx(&state, session.actor);
    let id = state
        .mutate(|store| create_technician(store, &ctx, input))
        .await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// PATCH /api/admin/technicians/{id}
async fn edit_technician(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    Path(id): Path<TechnicianId>,
    Json(update): Json<TechnicianUpdate>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    state
        .mutate(|store| update_technician(store, &ctx, id, update))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/admin/technicians/{id} - deactivates; history keeps the record.
async fn retire_technician(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    Path(id): Path<TechnicianId>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    state
        .mutate(|store| deactivate_technician(store, &ctx, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/accounts
async fn accounts(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
) -> Result<Json<Vec<AccountSummary>>, ApiError> {
    let ctx = ctx(&state, session.actor);
    let store = state.read().await;
    Ok(Json(list_accounts(&store, &ctx)?))
}

/// POST /api/admin/supervisors
async fn add_supervisor(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    Json(input): Json<NewSupervisor>,
) -> Result<(StatusCode, Json<Created<AccountId>>), ApiError> {
    let ctx = ctx(&state, session.actor);
    let id = state
        .mutate(|store| create_supervisor(store, &ctx, input))
        .await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// DELETE /api/admin/supervisors/{id}
async fn retire_supervisor(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    Path(id): Path<AccountId>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    state
        .mutate(|store| remove_supervisor(store, &ctx, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/costs?project=N
async fn costs(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<CostSummary>, ApiError> {
    let ctx = ctx(&state, session.actor);
    let store = state.read().await;
    Ok(Json(cost_summary(&store, &ctx, query.project)?))
}
