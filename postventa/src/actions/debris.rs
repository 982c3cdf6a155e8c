//! Debris-removal approval and follow-through.

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use super::{ActionError, Actor, Ctx, claim_ref, notify, require_claim_manager};
use crate::core::status::DebrisEvent;
use crate::core::types::{DebrisId, Recipient, RemovalCompanyId, TechnicianId};
use crate::model::{Debris, DebrisCrew, Store};
use crate::notifications::NotificationKind;

/// Who carries the debris away. Approving again replaces the previous
/// handler, crew included.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebrisHandler {
    Company(RemovalCompanyId),
    Crew(Vec<TechnicianId>),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DebrisApproval {
    pub handler: DebrisHandler,
    pub scheduled_on: Option<NaiveDate>,
    pub cost_cents: Option<u64>,
}

fn debris_ref(store: &Store, id: DebrisId) -> Result<&Debris, ActionError> {
    store
        .debris_request(id)
        .ok_or_else(|| ActionError::not_found("debris", id))
}

fn require_manager(store: &Store, ctx: &Ctx<'_>, debris: &Debris) -> Result<(), ActionError> {
    if !ctx.actor.is_staff() {
        return Err(ActionError::Forbidden(
            "only supervisors handle debris requests".to_string(),
        ));
    }
    require_claim_manager(ctx, claim_ref(store, debris.claim)?)
}

pub fn approve_debris(
    store: &mut Store,
    ctx: &Ctx<'_>,
    id: DebrisId,
    approval: DebrisApproval,
) -> Result<(), ActionError> {
    let debris = debris_ref(store, id)?;
    require_manager(store, ctx, debris)?;
    let next = debris.status.apply(DebrisEvent::Approve)?;
    let claim = claim_ref(store, debris.claim)?;
    let (claim_id, owner) = (claim.id, claim.owner);

    let handler_name = match &approval.handler {
        DebrisHandler::Company(company_id) => {
            let company = store
                .removal_company(*company_id)
                .ok_or_else(|| ActionError::not_found("removal company", *company_id))?;
            if !company.active {
                return Err(ActionError::Conflict(format!(
                    "removal company {} is inactive",
                    company.name
                )));
            }
            company.name.clone()
        }
        DebrisHandler::Crew(members) => {
            if members.is_empty() {
                return Err(ActionError::Invalid("crew must not be empty".to_string()));
            }
            let company = store
                .project(claim.project)
                .and_then(|project| project.company);
            let mut names = Vec::new();
            for member in members {
                let tech = store
                    .technician(*member)
                    .ok_or_else(|| ActionError::not_found("technician", *member))?;
                if !tech.active || company.is_none() || tech.company != company {
                    return Err(ActionError::Invalid(format!(
                        "technician {} is not available for this project",
                        tech.name
                    )));
                }
                names.push(tech.name.clone());
            }
            format!("Cuadrilla interna ({})", names.join(", "))
        }
    };

    store.seed_id_counters();
    store.debris_crews.retain(|crew| crew.debris != id);
    if let DebrisHandler::Crew(members) = &approval.handler {
        for member in members {
            let crew_id = store.next_debris_crew_id();
            store.debris_crews.push(DebrisCrew {
                id: crew_id,
                debris: id,
                technician: *member,
                assigned_at: ctx.now,
            });
        }
    }
    let (kind, volume) = {
        let debris = store
            .debris_request_mut(id)
            .ok_or_else(|| ActionError::not_found("debris", id))?;
        debris.status = next;
        debris.scheduled_on = approval.scheduled_on;
        if let Some(cost) = approval.cost_cents {
            debris.cost_cents = cost;
        }
        debris.removal_company = match approval.handler {
            DebrisHandler::Company(company) => Some(company),
            DebrisHandler::Crew(_) => None,
        };
        (debris.kind, debris.volume_m3)
    };
    info!(debris = %id, claim = %claim_id, handler = %handler_name, "debris approved");

    notify(
        store,
        ctx,
        claim_id,
        Recipient::Owner(owner),
        NotificationKind::DebrisApproved,
        |m| {
            m.debris_kind = Some(kind.label().to_string());
            m.debris_volume = Some(volume);
            m.scheduled_on = approval
                .scheduled_on
                .map(|day| day.format("%d-%m-%Y").to_string());
            m.handler = Some(handler_name);
        },
    )
}

pub fn reject_debris(
    store: &mut Store,
    ctx: &Ctx<'_>,
    id: DebrisId,
    reason: Option<String>,
) -> Result<(), ActionError> {
    let debris = debris_ref(store, id)?;
    require_manager(store, ctx, debris)?;
    let next = debris.status.apply(DebrisEvent::Reject)?;
    if let Some(debris) = store.debris_request_mut(id) {
        debris.status = next;
        if reason.is_some() {
            debris.notes = reason;
        }
    }
    info!(debris = %id, "debris rejected");
    Ok(())
}

/// Mark a scheduled removal done. Staff or a member of the crew may do it.
pub fn complete_debris(
    store: &mut Store,
    ctx: &Ctx<'_>,
    id: DebrisId,
    removed_on: NaiveDate,
) -> Result<(), ActionError> {
    let debris = debris_ref(store, id)?;
    match ctx.actor {
        Actor::Technician { technician, .. } => {
            let in_crew = store
                .debris_crews
                .iter()
                .any(|crew| crew.debris == id && crew.technician == technician);
            if !in_crew {
                return Err(ActionError::Forbidden(format!(
                    "technician {technician} is not in the crew of debris {id}"
                )));
            }
        }
        _ => require_manager(store, ctx, debris)?,
    }
    let next = debris.status.apply(DebrisEvent::Complete)?;
    if let Some(debris) = store.debris_request_mut(id) {
        debris.status = next;
        debris.removed_on = Some(removed_on);
    }
    info!(debris = %id, "debris removed");
    Ok(())
}

/// Debris requests a technician crews, or that a supervisor manages.
pub fn visible_debris<'s>(store: &'s Store, actor: &Actor) -> Vec<&'s Debris> {
    store
        .debris
        .iter()
        .filter(|debris| match *actor {
            Actor::Technician { technician, .. } => store
                .debris_crews
                .iter()
                .any(|crew| crew.debris == debris.id && crew.technician == technician),
            Actor::Owner { owner, .. } => store
                .claim(debris.claim)
                .is_some_and(|claim| claim.owner == owner),
            _ => store
                .claim(debris.claim)
                .is_some_and(|claim| actor.manages_project(claim.project)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::DebrisStatus;
    use crate::core::types::{AccountId, CompanyId};
    use crate::io::config::PostventaConfig;
    use crate::test_support::{date, fixed_now, sample_store};

    fn supervisor() -> Actor {
        Actor::Supervisor {
            account: AccountId(1),
            project: None,
        }
    }

    fn crew(members: Vec<u64>) -> DebrisApproval {
        DebrisApproval {
            handler: DebrisHandler::Crew(members.into_iter().map(TechnicianId).collect()),
            scheduled_on: Some(date("2025-03-18")),
            cost_cents: None,
        }
    }

    #[test]
    fn approve_with_company_notifies_owner() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor());
        approve_debris(
            &mut store,
            &ctx,
            DebrisId(1),
            DebrisApproval {
                handler: DebrisHandler::Company(RemovalCompanyId(1)),
                scheduled_on: Some(date("2025-03-18")),
                cost_cents: Some(8_000_000),
            },
        )
        .expect("approve");
        let debris = store.debris_request(DebrisId(1)).expect("debris");
        assert_eq!(debris.status, DebrisStatus::Scheduled);
        assert_eq!(debris.removal_company, Some(RemovalCompanyId(1)));
        assert_eq!(debris.cost_cents, 8_000_000);
        let message = store.notifications.last().expect("notification");
        assert_eq!(message.kind, "debris_approved");
        assert!(message.body.contains("Retiros Sur"));
        assert!(message.body.contains("18-03-2025"));
    }

    #[test]
    fn crew_replaces_previous_crew() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor());
        approve_debris(&mut store, &ctx, DebrisId(1), crew(vec![1, 2])).expect("first");
        approve_debris(&mut store, &ctx, DebrisId(1), crew(vec![2])).expect("second");
        let members: Vec<TechnicianId> = store
            .debris_crews
            .iter()
            .filter(|c| c.debris == DebrisId(1))
            .map(|c| c.technician)
            .collect();
        assert_eq!(members, vec![TechnicianId(2)]);
    }

    #[test]
    fn company_takes_over_from_crew() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor());
        approve_debris(&mut store, &ctx, DebrisId(1), crew(vec![1, 2])).expect("crew");
        let company = DebrisApproval {
            handler: DebrisHandler::Company(RemovalCompanyId(1)),
            scheduled_on: Some(date("2025-03-19")),
            cost_cents: None,
        };
        approve_debris(&mut store, &ctx, DebrisId(1), company).expect("company");
        assert!(store.debris_crews.iter().all(|c| c.debris != DebrisId(1)));

        let former = Actor::Technician {
            account: AccountId(3),
            technician: TechnicianId(1),
        };
        assert!(visible_debris(&store, &former).is_empty());
        let ctx = Ctx::new(&cfg, fixed_now(), former);
        assert!(matches!(
            complete_debris(&mut store, &ctx, DebrisId(1), date("2025-03-19")),
            Err(ActionError::Forbidden(_))
        ));
    }

    #[test]
    fn crew_must_belong_to_project_company() {
        let mut store = sample_store();
        store.technicians[1].company = Some(CompanyId(7));
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor());
        assert!(matches!(
            approve_debris(&mut store, &ctx, DebrisId(1), crew(vec![2])),
            Err(ActionError::Invalid(_))
        ));
        assert!(matches!(
            approve_debris(&mut store, &ctx, DebrisId(1), crew(vec![])),
            Err(ActionError::Invalid(_))
        ));
    }

    #[test]
    fn inactive_company_conflicts() {
        let mut store = sample_store();
        store.removal_companies[0].active = false;
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor());
        let approval = DebrisApproval {
            handler: DebrisHandler::Company(RemovalCompanyId(1)),
            scheduled_on: None,
            cost_cents: None,
        };
        assert!(matches!(
            approve_debris(&mut store, &ctx, DebrisId(1), approval),
            Err(ActionError::Conflict(_))
        ));
    }

    #[test]
    fn crew_member_completes_and_others_cannot() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor());
        approve_debris(&mut store, &ctx, DebrisId(1), crew(vec![1])).expect("approve");

        let outsider = Actor::Technician {
            account: AccountId(9),
            technician: TechnicianId(2),
        };
        let ctx = Ctx::new(&cfg, fixed_now(), outsider);
        assert!(matches!(
            complete_debris(&mut store, &ctx, DebrisId(1), date("2025-03-18")),
            Err(ActionError::Forbidden(_))
        ));
        let member = Actor::Technician {
            account: AccountId(3),
            technician: TechnicianId(1),
        };
        let ctx = Ctx::new(&cfg, fixed_now(), member);
        assert_eq!(visible_debris(&store, &member).len(), 1);
        complete_debris(&mut store, &ctx, DebrisId(1), date("2025-03-18")).expect("complete");
        assert_eq!(
            store.debris_request(DebrisId(1)).expect("debris").status,
            DebrisStatus::Completed
        );
    }

    #[test]
    fn rejected_request_cannot_complete() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor());
        reject_debris(&mut store, &ctx, DebrisId(1), Some("Volumen menor".to_string()))
            .expect("reject");
        assert!(matches!(
            complete_debris(&mut store, &ctx, DebrisId(1), date("2025-03-18")),
            Err(ActionError::Transition(_))
        ));
    }
}
