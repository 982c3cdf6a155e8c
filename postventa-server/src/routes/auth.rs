use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::post;
use serde::{Deserialize, Serialize};
use tracing::info;

use postventa::actions::Actor;
use postventa::auth;
use postventa::core::types::{AccountId, Role};

use crate::error::ApiError;
use crate::session::Session;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username, email or RUT.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub account: AccountId,
    pub username: String,
    pub role: Role,
    pub provisioned: bool,
}

/// POST /api/auth/login - exchange credentials for a bearer token.
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let outcome = state
        .mutate(|store| auth::login(store, &body.identifier, &body.password))
        .await?;
    let (username, role) = {
        let store = state.read().await;
        let account = store
            .account(outcome.account)
            .ok_or_else(|| ApiError::internal(format!("account {} vanished", outcome.account)))?;
        Actor::from_account(account)?;
        (account.username.clone(), account.role)
    };
    let token = state.sessions.issue(outcome.account);
    info!(account = %outcome.account, provisioned = outcome.provisioned, "login");
    Ok(Json(LoginResponse {
        token,
        account: outcome.account,
        username,
        role,
        provisioned: outcome.provisioned,
    }))
}

/// POST /api/auth/logout - drop the current token.
async fn logout(State(state): State<AppState>, session: Session) -> StatusCode {
    if state.sessions.revoke(&session.token) {
        info!(account = %session.account, "logout");
    }
    StatusCode::NO_CONTENT
}
