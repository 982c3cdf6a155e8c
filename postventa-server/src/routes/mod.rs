//! HTTP route handlers, grouped by role.
//!
//! Each group uses its role extractor from [`crate::session`]; the action
//! layer still checks ownership and project scope.

use axum::Router;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use postventa::actions::inbox::{list_notifications, mark_read};
use postventa::actions::{Actor, Ctx};
use postventa::core::types::{NotificationId, ProjectId};
use postventa::model::{
    Appointment, Claim, Debris, HistoryEntry, Notification, Store, Survey, Visit,
};

use crate::error::ApiError;
use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod kpis;
pub mod owner;
pub mod supervisor;
pub mod technician;

/// Build the API router (mounted under `/api`).
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(owner::router())
        .merge(technician::router())
        .merge(supervisor::router())
        .merge(kpis::router())
        .merge(admin::router())
}

async fn health() -> &'static str {
    "ok"
}

pub(crate) fn ctx(state: &AppState, actor: Actor) -> Ctx<'_> {
    Ctx::new(&state.cfg, state.now(), actor)
}

/// Optional free-text reason or note sent with a transition.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReasonBody {
    pub reason: Option<String>,
}

/// `?from=YYYY-MM-DD&days=N` for slot listings; `from` defaults to today.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SlotQuery {
    pub from: Option<NaiveDate>,
    pub days: Option<u32>,
}

/// `?project=N` narrows a report to one project.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectQuery {
    pub project: Option<ProjectId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RemovalDone {
    /// Defaults to today.
    pub removed_on: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct Created<T> {
    pub id: T,
}

/// A claim with everything recorded against it.
#[derive(Debug, Serialize)]
pub struct ClaimDetail {
    pub claim: Claim,
    pub appointments: Vec<Appointment>,
    pub visits: Vec<Visit>,
    pub history: Vec<HistoryEntry>,
    pub debris: Vec<Debris>,
    pub survey: Option<Survey>,
}

pub(crate) fn claim_detail(store: &Store, claim: &Claim) -> ClaimDetail {
    let id = claim.id;
    ClaimDetail {
        claim: claim.clone(),
        appointments: store.appointments_of(id).into_iter().cloned().collect(),
        visits: store.visits_of(id).into_iter().cloned().collect(),
        history: store
            .history
            .iter()
            .filter(|entry| entry.claim == id)
            .cloned()
            .collect(),
        debris: store
            .debris
            .iter()
            .filter(|debris| debris.claim == id)
            .cloned()
            .collect(),
        survey: store.surveys.iter().find(|survey| survey.claim == id).cloned(),
    }
}

pub(crate) async fn inbox(
    state: &AppState,
    actor: &Actor,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let store = state.read().await;
    let entries = list_notifications(&store, actor)?;
    Ok(Json(entries.into_iter().cloned().collect()))
}

pub(crate) async fn mark_notification(
    state: &AppState,
    actor: &Actor,
    id: NotificationId,
) -> Result<StatusCode, ApiError> {
    state.mutate(|store| mark_read(store, actor, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
