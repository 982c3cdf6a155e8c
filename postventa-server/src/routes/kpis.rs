use axum::Router;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;

use postventa::actions::Actor;
use postventa::core::kpi::{KpiCalculator, KpiFilter, KpiReport};

use crate::error::ApiError;
use crate::session::StaffSession;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/kpis", get(kpis_json))
        .route("/kpis.csv", get(kpis_csv))
}

/// Pin a project-scoped supervisor to their project.
fn scoped_filter(actor: &Actor, mut filter: KpiFilter) -> Result<KpiFilter, ApiError> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from > to
    {
        return Err(ApiError::invalid(format!("from {from} is after to {to}")));
    }
    if let Actor::Supervisor {
        project: Some(scope),
        ..
    } = *actor
    {
        match filter.project {
            Some(project) if project != scope => {
                return Err(ApiError::forbidden(format!(
                    "project {project} is outside your scope"
                )));
            }
            _ => filter.project = Some(scope),
        }
    }
    Ok(filter)
}

async fn report(state: &AppState, actor: &Actor, filter: KpiFilter) -> Result<KpiReport, ApiError> {
    let filter = scoped_filter(actor, filter)?;
    let store = state.read().await;
    Ok(KpiCalculator::new(&store, &state.cfg.kpi, &filter).all_kpis())
}

/// GET /api/kpis - every KPI for `?project&from&to`.
async fn kpis_json(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Query(filter): Query<KpiFilter>,
) -> Result<Json<KpiReport>, ApiError> {
    Ok(Json(report(&state, &session.actor, filter).await?))
}

/// GET /api/kpis.csv - scalar KPIs as CSV.
async fn kpis_csv(
    State(state): State<AppState>,
    StaffSession(session): StaffSession,
    Query(filter): Query<KpiFilter>,
) -> Result<Response, ApiError> {
    let csv = report(&state, &session.actor, filter).await?.to_csv();
    Ok(([(CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use chrono::NaiveDate;
    use postventa::core::types::{AccountId, ProjectId};

    use crate::routes::testing;

    #[test]
    fn scoped_supervisor_is_pinned_to_their_project() {
        let actor = testing::supervisor().0.actor;
        let filter = scoped_filter(&actor, KpiFilter::default()).expect("scoped");
        assert_eq!(filter.project, Some(ProjectId(1)));

        let foreign = KpiFilter {
            project: Some(ProjectId(2)),
            ..KpiFilter::default()
        };
        let err = scoped_filter(&actor, foreign).expect_err("outside scope");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let admin = Actor::Administrator {
            account: AccountId(4),
        };
        assert_eq!(
            scoped_filter(&admin, KpiFilter::default()).expect("admin"),
            KpiFilter::default()
        );
    }

    #[test]
    fn inverted_range_is_invalid() {
        let filter = KpiFilter {
            from: NaiveDate::from_ymd_opt(2025, 3, 31),
            to: NaiveDate::from_ymd_opt(2025, 3, 1),
            ..KpiFilter::default()
        };
        let err = scoped_filter(&testing::admin().0.actor, filter).expect_err("range");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn csv_is_served_as_text() {
        let (_temp, state) = testing::state();
        let response = kpis_csv(State(state), testing::supervisor(), Query(KpiFilter::default()))
            .await
            .expect("csv");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/csv; charset=utf-8")
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let text = String::from_utf8(bytes.to_vec()).expect("utf8");
        assert!(text.starts_with("kpi,key,status,value,unit\n"));
    }
}
