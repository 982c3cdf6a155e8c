//! Bearer-token sessions and the per-role request extractors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use rand::RngCore;

use postventa::actions::Actor;
use postventa::core::types::{AccountId, TechnicianId};

use crate::error::ApiError;
use crate::state::AppState;

/// In-memory token table. Sessions do not survive a restart.
#[derive(Clone, Default)]
pub struct Sessions {
    tokens: Arc<Mutex<HashMap<String, AccountId>>>,
}

impl Sessions {
    pub fn issue(&self, account: AccountId) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), account);
        token
    }

    pub fn lookup(&self, token: &str) -> Option<AccountId> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .copied()
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .is_some()
    }
}

/// Any logged-in account.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub account: AccountId,
    pub actor: Actor,
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
        let account_id = state
            .sessions
            .lookup(token)
            .ok_or_else(|| ApiError::unauthorized("unknown or expired session"))?;
        let store = state.read().await;
        let account = store
            .account(account_id)
            .filter(|account| account.active)
            .ok_or_else(|| ApiError::unauthorized("account is no longer active"))?;
        let actor = Actor::from_account(account)?;
        Ok(Session {
            token: token.to_string(),
            account: account_id,
            actor,
        })
    }
}

macro_rules! role_session {
    ($(#[$meta:meta])* $name:ident, $who:literal, $pattern:pat) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub Session);

        impl FromRequestParts<AppState> for $name {
            type Rejection = ApiError;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &AppState,
            ) -> Result<Self, Self::Rejection> {
                let session = Session::from_request_parts(parts, state).await?;
                if matches!(session.actor, $pattern) {
                    Ok(Self(session))
                } else {
                    Err(ApiError::forbidden(concat!("only ", $who, " may use this endpoint")))
                }
            }
        }
    };
}

role_session!(OwnerSession, "owners", Actor::Owner { .. });
role_session!(TechnicianSession, "technicians", Actor::Technician { .. });
role_session!(
    /// Supervisor or administrator.
    StaffSession,
    "supervisors and administrators",
    Actor::Supervisor { .. } | Actor::Administrator { .. }
);
role_session!(AdminSession, "administrators", Actor::Administrator { .. });

impl TechnicianSession {
    pub fn technician(&self) -> Result<TechnicianId, ApiError> {
        match self.0.actor {
            Actor::Technician { technician, .. } => Ok(technician),
            _ => Err(ApiError::forbidden("not a technician session")),
        }
    }
}
