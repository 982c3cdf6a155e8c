//! Orchestration of user-facing operations over a [`Store`].
//!
//! Actions check the caller's role and ownership, validate input, then
//! mutate the store only through the status transition functions. Every
//! claim status change appends a history entry, and notifications are
//! queued in the outbox.
//!
//! Input is validated up front, but a late failure (a notification that does
//! not render, say) can leave an action half applied. Callers therefore run
//! actions through [`atomically`], or on a draft of their own, and keep the
//! result only on success.

use chrono::NaiveDateTime;
use tracing::info;

use crate::core::schedule::ScheduleError;
use crate::core::status::{ClaimEvent, ClaimStatus, TransitionError};
use crate::core::types::{AccountId, ClaimId, OwnerId, ProjectId, Recipient, Role, TechnicianId};
use crate::io::config::PostventaConfig;
use crate::model::{Account, Claim, HistoryEntry, Store};
use crate::notifications::{self, MessageContext, NotificationKind};

pub mod admin;
pub mod appointments;
pub mod availability;
pub mod claims;
pub mod debris;
pub mod inbox;
pub mod reminders;
pub mod reports;
pub mod surveys;
pub mod visits;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("render notification: {0}")]
    Template(#[from] minijinja::Error),
}

impl ActionError {
    pub fn not_found(entity: &'static str, id: impl Into<u64>) -> Self {
        ActionError::NotFound {
            entity,
            id: id.into(),
        }
    }

    fn forbidden(message: impl Into<String>) -> Self {
        ActionError::Forbidden(message.into())
    }
}

/// Who is performing an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Owner {
        account: AccountId,
        owner: OwnerId,
    },
    Technician {
        account: AccountId,
        technician: TechnicianId,
    },
    /// `project: None` supervises every project.
    Supervisor {
        account: AccountId,
        project: Option<ProjectId>,
    },
    Administrator {
        account: AccountId,
    },
    /// Scheduled jobs and CLI maintenance.
    System,
}

impl Actor {
    /// Build the actor for a logged-in account.
    ///
    /// Owner and technician accounts must be linked to their directory record.
    pub fn from_account(account: &Account) -> Result<Self, ActionError> {
        match account.role {
            Role::Owner => account
                .owner
                .map(|owner| Actor::Owner {
                    account: account.id,
                    owner,
                })
                .ok_or_else(|| ActionError::forbidden("account is not linked to an owner")),
            Role::Technician => account
                .technician
                .map(|technician| Actor::Technician {
                    account: account.id,
                    technician,
                })
                .ok_or_else(|| ActionError::forbidden("account is not linked to a technician")),
            Role::Supervisor => Ok(Actor::Supervisor {
                account: account.id,
                project: account.project,
            }),
            Role::Administrator => Ok(Actor::Administrator {
                account: account.id,
            }),
        }
    }

    pub fn account(&self) -> Option<AccountId> {
        match *self {
            Actor::Owner { account, .. }
            | Actor::Technician { account, .. }
            | Actor::Supervisor { account, .. }
            | Actor::Administrator { account } => Some(account),
            Actor::System => None,
        }
    }

    pub fn role_name(&self) -> &'static str {
        match self {
            Actor::Owner { .. } => Role::Owner.as_str(),
            Actor::Technician { .. } => Role::Technician.as_str(),
            Actor::Supervisor { .. } => Role::Supervisor.as_str(),
            Actor::Administrator { .. } => Role::Administrator.as_str(),
            Actor::System => "sistema",
        }
    }

    /// Supervisor in scope, administrator, or the system.
    pub fn manages_project(&self, project: ProjectId) -> bool {
        match *self {
            Actor::Supervisor { project: scope, .. } => scope.is_none_or(|p| p == project),
            Actor::Administrator { .. } | Actor::System => true,
            _ => false,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(
            self,
            Actor::Supervisor { .. } | Actor::Administrator { .. } | Actor::System
        )
    }
}

/// Per-call environment of an action.
#[derive(Debug, Clone, Copy)]
pub struct Ctx<'a> {
    pub cfg: &'a PostventaConfig,
    pub now: NaiveDateTime,
    pub actor: Actor,
}

impl<'a> Ctx<'a> {
    pub fn new(cfg: &'a PostventaConfig, now: NaiveDateTime, actor: Actor) -> Self {
        Self { cfg, now, actor }
    }
}

/// Run `action` on a copy of `store` and keep the copy only if it succeeds.
pub fn atomically<T, E>(
    store: &mut Store,
    action: impl FnOnce(&mut Store) -> Result<T, E>,
) -> Result<T, E> {
    let mut draft = store.clone();
    let out = action(&mut draft)?;
    *store = draft;
    Ok(out)
}

pub(crate) fn claim_ref(store: &Store, id: ClaimId) -> Result<&Claim, ActionError> {
    store
        .claim(id)
        .ok_or_else(|| ActionError::not_found("claim", id))
}

/// The acting owner must own `claim`.
pub(crate) fn require_claim_owner(ctx: &Ctx<'_>, claim: &Claim) -> Result<(), ActionError> {
    match ctx.actor {
        Actor::Owner { owner, .. } if owner == claim.owner => Ok(()),
        Actor::Owner { .. } => Err(ActionError::forbidden(format!(
            "claim {} belongs to another owner",
            claim.folio
        ))),
        _ => Err(ActionError::forbidden("only the owner may do this")),
    }
}

/// The acting supervisor must manage the claim's project.
pub(crate) fn require_claim_manager(ctx: &Ctx<'_>, claim: &Claim) -> Result<(), ActionError> {
    if ctx.actor.manages_project(claim.project) {
        return Ok(());
    }
    Err(ActionError::forbidden(format!(
        "{} may not manage claim {}",
        ctx.actor.role_name(),
        claim.folio
    )))
}

/// Apply `event` to a claim, stamp the matching timestamp and append history.
pub(crate) fn transition_claim(
    store: &mut Store,
    ctx: &Ctx<'_>,
    id: ClaimId,
    event: ClaimEvent,
    reason: Option<String>,
) -> Result<ClaimStatus, ActionError> {
    let from = claim_ref(store, id)?.status;
    let to = from.apply(event)?;
    let history_id = store.next_history_id();
    let claim = store
        .claim_mut(id)
        .ok_or_else(|| ActionError::not_found("claim", id))?;
    claim.status = to;
    match to {
        ClaimStatus::Assigned if claim.assigned_at.is_none() => claim.assigned_at = Some(ctx.now),
        ClaimStatus::Resolved => claim.resolved_at = Some(ctx.now),
        ClaimStatus::Closed => claim.closed_at = Some(ctx.now),
        _ => {}
    }
    info!(claim = %id, folio = %claim.folio, %from, %to, "claim transition");
    store.history.push(HistoryEntry {
        id: history_id,
        claim: id,
        actor: ctx.actor.account(),
        from: Some(from),
        to,
        at: ctx.now,
        reason,
    });
    Ok(to)
}

/// Render `kind` for `recipient` with the claim's fields, adjusted by `fill`.
pub(crate) fn notify(
    store: &mut Store,
    ctx: &Ctx<'_>,
    claim: ClaimId,
    recipient: Recipient,
    kind: NotificationKind,
    fill: impl FnOnce(&mut MessageContext),
) -> Result<(), ActionError> {
    let message = {
        let claim = claim_ref(store, claim)?;
        let mut message = MessageContext::for_claim(store, claim, recipient);
        fill(&mut message);
        message
    };
    notifications::queue(store, recipient, Some(claim), kind, &message, ctx.now)?;
    Ok(())
}
