//! Technician endpoints: the agenda, visits, availability and debris crews.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};

use postventa::actions::ActionError;
use postventa::actions::appointments::{
    Booking, book_follow_up, confirm_appointment, reschedule_appointment, visible_appointments,
};
use postventa::actions::availability::{
    WindowInput, add_availability, delete_availability, free_slots, windows_of,
};
use postventa::actions::debris::{complete_debris, visible_debris};
use postventa::actions::visits::{VisitReport, complete_visit, start_visit};
use postventa::core::schedule::Slot;
use postventa::core::types::{AppointmentId, AvailabilityId, DebrisId, NotificationId, VisitId};
use postventa::model::{Appointment, Availability, Debris, Notification};

use super::owner::RescheduleBody;
use super::{Created, RemovalDone, SlotQuery, ctx, inbox, mark_notification};
use crate::error::ApiError;
use crate::session::TechnicianSession;
use crate::state::{AppState, ChangeEvent};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/technician/appointments", get(list_appointments))
        .route("/technician/appointments/{id}/confirm", post(confirm))
        .route("/technician/appointments/{id}/start", post(start))
        .route("/technician/appointments/{id}/complete", post(complete))
        .route("/technician/appointments/{id}/follow-up", post(follow_up))
        .route("/technician/appointments/{id}/reschedule", post(reschedule))
        .route("/technician/availability", get(list_windows).post(add_window))
        .route("/technician/availability/{id}", delete(remove_window))
        .route("/technician/slots", get(own_slots))
        .route("/technician/debris", get(list_debris))
        .route("/technician/debris/{id}/complete", post(debris_done))
        .route("/technician/notifications", get(notifications))
        .route("/technician/notifications/{id}/read", post(read_notification))
}

/// GET /api/technician/appointments - the technician's agenda.
async fn list_appointments(
    State(state): State<AppState>,
    TechnicianSession(session): TechnicianSession,
) -> Json<Vec<Appointment>> {
    let store = state.read().await;
    Json(
        visible_appointments(&store, &session.actor)
            .into_iter()
            .cloned()
            .collect(),
    )
}

/// POST /api/technician/appointments/{id}/confirm
async fn confirm(
    State(state): State<AppState>,
    TechnicianSession(session): TechnicianSession,
    Path(id): Path<AppointmentId>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    state
        .mutate(|store| confirm_appointment(store, &ctx, id))
        .await?;
    state.publish(ChangeEvent::AppointmentChanged { appointment: id });
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/technician/appointments/{id}/start - open a visit.
async fn start(
    State(state): State<AppState>,
    TechnicianSession(session): TechnicianSession,
    Path(id): Path<AppointmentId>,
) -> Result<(StatusCode, Json<Created<VisitId>>), ApiError> {
    let ctx = ctx(&state, session.actor);
    let visit = state.mutate(|store| start_visit(store, &ctx, id)).await?;
    state.publish(ChangeEvent::AppointmentChanged { appointment: id });
    Ok((StatusCode::CREATED, Json(Created { id: visit })))
}

/// POST /api/technician/appointments/{id}/complete - close the running visit.
async fn complete(
    State(state): State<AppState>,
    TechnicianSession(session): TechnicianSession,
    Path(id): Path<AppointmentId>,
    Json(report): Json<VisitReport>,
) -> Result<Json<Created<VisitId>>, ApiError> {
    let ctx = ctx(&state, session.actor);
    let (visit, claim) = state
        .mutate(|store| {
            let visit = complete_visit(store, &ctx, id, report)?;
            let claim = store.appointment(id).map(|appointment| appointment.claim);
            Ok::<_, ActionError>((visit, claim))
        })
        .await?;
    state.publish(ChangeEvent::AppointmentChanged { appointment: id });
    if let Some(claim) = claim {
        state.publish(ChangeEvent::ClaimChanged { claim });
    }
    Ok(Json(Created { id: visit }))
}

/// POST /api/technician/appointments/{id}/follow-up - book the next visit of the claim.
async fn follow_up(
    State(state): State<AppState>,
    TechnicianSession(session): TechnicianSession,
    Path(id): Path<AppointmentId>,
    Json(booking): Json<Booking>,
) -> Result<(StatusCode, Json<Created<AppointmentId>>), ApiError> {
    let ctx = ctx(&state, session.actor);
    let appointment = state
        .mutate(|store| book_follow_up(store, &ctx, id, booking))
        .await?;
    state.publish(ChangeEvent::AppointmentChanged { appointment });
    Ok((StatusCode::CREATED, Json(Created { id: appointment })))
}

/// POST /api/technician/appointments/{id}/reschedule
async fn reschedule(
    State(state): State<AppState>,
    TechnicianSession(session): TechnicianSession,
    Path(id): Path<AppointmentId>,
    Json(body): Json<RescheduleBody>,
) -> Result<(StatusCode, Json<Created<AppointmentId>>), ApiError> {
    let ctx = ctx(&state, session.actor);
    let appointment = state
        .mutate(|store| reschedule_appointment(store, &ctx, id, body.booking, body.reason))
        .await?;
    state.publish(ChangeEvent::AppointmentChanged { appointment: id });
    state.publish(ChangeEvent::AppointmentChanged { appointment });
    Ok((StatusCode::CREATED, Json(Created { id: appointment })))
}

/// GET /api/technician/availability - own windows.
async fn list_windows(
    State(state): State<AppState>,
    session: TechnicianSession,
) -> Result<Json<Vec<Availability>>, ApiError> {
    let technician = session.technician()?;
    let store = state.read().await;
    Ok(Json(windows_of(&store, technician).into_iter().cloned().collect()))
}

/// POST /api/technician/availability - add a recurring or one-off window.
async fn add_window(
    State(state): State<AppState>,
    TechnicianSession(session): TechnicianSession,
    Json(input): Json<WindowInput>,
) -> Result<(StatusCode, Json<Created<AvailabilityId>>), ApiError> {
    let ctx = ctx(&state, session.actor);
    let id = state
        .mutate(|store| add_availability(store, &ctx, input))
        .await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// DELETE /api/technician/availability/{id}
async fn remove_window(
    State(state): State<AppState>,
    TechnicianSession(session): TechnicianSession,
    Path(id): Path<AvailabilityId>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    state
        .mutate(|store| delete_availability(store, &ctx, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/technician/slots - own free slots.
async fn own_slots(
    State(state): State<AppState>,
    session: TechnicianSession,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Vec<Slot>>, ApiError> {
    let technician = session.technician()?;
    let ctx = ctx(&state, session.0.actor);
    let from = query.from.unwrap_or_else(|| ctx.now.date());
    let store = state.read().await;
    Ok(Json(free_slots(&store, &ctx, technician, from, query.days)?))
}

/// GET /api/technician/debris - removals the technician crews.
async fn list_debris(
    State(state): State<AppState>,
    TechnicianSession(session): TechnicianSession,
) -> Json<Vec<Debris>> {
    let store = state.read().await;
    Json(
        visible_debris(&store, &session.actor)
            .into_iter()
            .cloned()
            .collect(),
    )
}

/// POST /api/technician/debris/{id}/complete
async fn debris_done(
    State(state): State<AppState>,
    TechnicianSession(session): TechnicianSession,
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

/// GET /api/technician/notifications
async fn notifications(
    State(state): State<AppState>,
    TechnicianSession(session): TechnicianSession,
) -> Result<Json<Vec<Notification>>, ApiError> {
    inbox(&state, &session.actor).await
}

/// POST /api/technician/notifications/{id}/read
async fn read_notification(
    State(state): State<AppState>,
    TechnicianSession(session): TechnicianSession,
    Path(id): Path<NotificationId>,
) -> Result<StatusCode, ApiError> {
    mark_notification(&state, &session.actor, id).await
}
