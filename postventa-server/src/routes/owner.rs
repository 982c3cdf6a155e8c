//! Owner endpoints: claims, appointments, surveys and the inbox.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::Deserialize;

use postventa::actions::appointments::{
    Booking, book_appointment, cancel_appointment, reschedule_appointment, visible_appointments,
};
use postventa::actions::claims::{NewClaim, cancel_claim, file_claim, visible_claims};
use postventa::actions::surveys::{SurveyAnswers, submit_survey};
use postventa::core::types::{AppointmentId, ClaimId, NotificationId, SurveyId};
use postventa::model::{Appointment, Claim, Notification};

use super::{ClaimDetail, Created, ReasonBody, claim_detail, ctx, inbox, mark_notification};
use crate::error::ApiError;
use crate::session::OwnerSession;
use crate::state::{AppState, ChangeEvent};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/owner/claims", get(list_claims).post(create_claim))
        .route("/owner/claims/{id}", get(get_claim))
        .route("/owner/claims/{id}/cancel", post(cancel))
        .route("/owner/claims/{id}/appointments", post(book))
        .route("/owner/claims/{id}/survey", post(survey))
        .route("/owner/appointments", get(list_appointments))
        .route("/owner/appointments/{id}/reschedule", post(reschedule))
        .route("/owner/appointments/{id}/cancel", post(cancel_visit))
        .route("/owner/notifications", get(notifications))
        .route("/owner/notifications/{id}/read", post(read_notification))
}

#[derive(Debug, Deserialize)]
pub struct RescheduleBody {
    #[serde(flatten)]
    pub booking: Booking,
    pub reason: Option<String>,
}

/// GET /api/owner/claims - the owner's claims, newest first.
async fn list_claims(
    State(state): State<AppState>,
    OwnerSession(session): OwnerSession,
) -> Json<Vec<Claim>> {
    let store = state.read().await;
    Json(
        visible_claims(&store, &session.actor)
            .into_iter()
            .cloned()
            .collect(),
    )
}

/// POST /api/owner/claims - file a new claim.
async fn create_claim(
    State(state): State<AppState>,
    OwnerSession(session): OwnerSession,
    Json(input): Json<NewClaim>,
) -> Result<(StatusCode, Json<ClaimDetail>), ApiError> {
    let ctx = ctx(&state, session.actor);
    let filed = state.mutate(|store| file_claim(store, &ctx, input)).await?;
    state.publish(ChangeEvent::ClaimChanged { claim: filed.claim });
    if let Some(appointment) = filed.appointment {
        state.publish(ChangeEvent::AppointmentChanged { appointment });
    }
    let store = state.read().await;
    let claim = store
        .claim(filed.claim)
        .ok_or_else(|| ApiError::internal(format!("claim {} vanished", filed.claim)))?;
    Ok((StatusCode::CREATED, Json(claim_detail(&store, claim))))
}

/// GET /api/owner/claims/{id} - one of the owner's claims with its history.
async fn get_claim(
    State(state): State<AppState>,
    OwnerSession(session): OwnerSession,
    Path(id): Path<ClaimId>,
) -> Result<Json<ClaimDetail>, ApiError> {
    let store = state.read().await;
    // Other owners' claims are reported as missing.
    let claim = visible_claims(&store, &session.actor)
        .into_iter()
        .find(|claim| claim.id == id)
        .ok_or_else(|| ApiError::not_found(format!("claim {id} not found")))?;
    Ok(Json(claim_detail(&store, claim)))
}

/// POST /api/owner/claims/{id}/cancel - withdraw an open claim.
async fn cancel(
    State(state): State<AppState>,
    OwnerSession(session): OwnerSession,
    Path(id): Path<ClaimId>,
    Json(body): Json<ReasonBody>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    state
        .mutate(|store| cancel_claim(store, &ctx, id, body.reason))
        .await?;
    state.publish(ChangeEvent::ClaimChanged { claim: id });
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/owner/claims/{id}/appointments - book a visit with the assigned technician.
async fn book(
    State(state): State<AppState>,
    OwnerSession(session): OwnerSession,
    Path(id): Path<ClaimId>,
    Json(booking): Json<Booking>,
) -> Result<(StatusCode, Json<Created<AppointmentId>>), ApiError> {
    let ctx = ctx(&state, session.actor);
    let appointment = state
        .mutate(|store| book_appointment(store, &ctx, id, booking))
        .await?;
    state.publish(ChangeEvent::AppointmentChanged { appointment });
    Ok((StatusCode::CREATED, Json(Created { id: appointment })))
}

/// POST /api/owner/claims/{id}/survey - answer the satisfaction survey.
async fn survey(
    State(state): State<AppState>,
    OwnerSession(session): OwnerSession,
    Path(id): Path<ClaimId>,
    Json(answers): Json<SurveyAnswers>,
) -> Result<Json<Created<SurveyId>>, ApiError> {
    let ctx = ctx(&state, session.actor);
    let survey = state
        .mutate(|store| submit_survey(store, &ctx, id, answers))
        .await?;
    state.publish(ChangeEvent::ClaimChanged { claim: id });
    Ok(Json(Created { id: survey }))
}

/// GET /api/owner/appointments - appointments on the owner's claims.
async fn list_appointments(
    State(state): State<AppState>,
    OwnerSession(session): OwnerSession,
) -> Json<Vec<Appointment>> {
    let store = state.read().await;
    Json(
        visible_appointments(&store, &session.actor)
            .into_iter()
            .cloned()
            .collect(),
    )
}

/// POST /api/owner/appointments/{id}/reschedule - move a visit to a new time.
async fn reschedule(
    State(state): State<AppState>,
    OwnerSession(session): OwnerSession,
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

/// POST /api/owner/appointments/{id}/cancel - cancel a pending or confirmed visit.
async fn cancel_visit(
    State(state): State<AppState>,
    OwnerSession(session): OwnerSession,
    Path(id): Path<AppointmentId>,
    Json(body): Json<ReasonBody>,
) -> Result<StatusCode, ApiError> {
    let ctx = ctx(&state, session.actor);
    state
        .mutate(|store| cancel_appointment(store, &ctx, id, body.reason))
        .await?;
    state.publish(ChangeEvent::AppointmentChanged { appointment: id });
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/owner/notifications - the owner's inbox.
async fn notifications(
    State(state): State<AppState>,
    OwnerSession(session): OwnerSession,
) -> Result<Json<Vec<Notification>>, ApiError> {
    inbox(&state, &session.actor).await
}

/// POST /api/owner/notifications/{id}/read
async fn read_notification(
    State(state): State<AppState>,
    OwnerSession(session): OwnerSession,
    Path(id): Path<NotificationId>,
) -> Result<StatusCode, ApiError> {
    mark_notification(&state, &session.actor, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use postventa::core::status::ClaimStatus;
    use postventa::core::types::{OwnerId, SpecialtyId, UnitId};

    use crate::routes::testing;

    #[tokio::test]
    async fn filing_a_claim_returns_its_detail_and_broadcasts() {
        let (_temp, state) = testing::state();
        let mut events = state.event_tx.subscribe();
        let input = NewClaim {
            unit: Some(UnitId(1)),
            category: Some(SpecialtyId(1)),
            description: "Filtración bajo el lavaplatos".to_string(),
            ..NewClaim::default()
        };
        let (status, Json(detail)) = create_claim(State(state.clone()), testing::ana(), Json(input))
            .await
            .expect("file");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(detail.claim.folio, "PV-2025-0005");
        assert_eq!(detail.claim.status, ClaimStatus::Filed);
        assert_eq!(detail.history.len(), 1);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&ChangeEvent::ClaimChanged {
            claim: detail.claim.id
        }));
    }

    #[tokio::test]
    async fn claims_of_other_owners_are_not_found() {
        let (_temp, state) = testing::state();
        state
            .mutate(|store| {
                if let Some(claim) = store.claims.iter_mut().find(|c| c.id == ClaimId(3)) {
                    claim.owner = OwnerId(2);
                }
                Ok::<_, ApiError>(())
            })
            .await
            .expect("hand claim 3 to Bruno");

        let err = get_claim(State(state.clone()), testing::ana(), Path(ClaimId(3)))
            .await
            .expect_err("hidden");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let Json(own) = list_claims(State(state), testing::ana()).await;
        let ids: Vec<_> = own.iter().map(|claim| claim.id).collect();
        assert_eq!(ids, [ClaimId(2), ClaimId(1), ClaimId(4)]);
    }

    #[tokio::test]
    async fn booking_in_the_past_is_rejected() {
        let (_temp, state) = testing::state();
        let claim = state.read().await.appointments[2].claim;
        let booking = Booking {
            scheduled_at: NaiveDateTime::parse_from_str("2025-03-01 10:00", "%Y-%m-%d %H:%M")
                .expect("datetime"),
            ..Booking::default()
        };
        let err = book(State(state), testing::ana(), Path(claim), Json(booking))
            .await
            .expect_err("past");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn reschedule_body_flattens_the_booking() {
        let body: RescheduleBody = serde_json::from_str(
            r#"{"scheduled_at":"2025-03-21T09:00:00","reason":"viaje"}"#,
        )
        .expect("parse");
        assert_eq!(body.reason.as_deref(), Some("viaje"));
        assert_eq!(body.booking.duration_minutes, None);
    }
}
