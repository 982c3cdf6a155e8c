//! Read-only staff reports: claim evidence, material usage and costs.
//!
//! Everything here is scoped by [`Actor::manages_project`]; claims outside
//! the actor's scope read as missing.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{ActionError, Actor, Ctx, claim_ref};
use crate::core::types::{ClaimId, MaterialId, ProjectId, TechnicianId, Uploader, VisitId};
use crate::model::{Claim, Evidence, Store};

/// Evidence of one claim grouped by who uploaded it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceReport {
    pub claim: ClaimId,
    pub owner: Vec<Evidence>,
    pub technician: Vec<Evidence>,
    pub system: Vec<Evidence>,
}

impl EvidenceReport {
    pub fn total(&self) -> usize {
        self.owner.len() + self.technician.len() + self.system.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageLine {
    pub material: MaterialId,
    pub code: String,
    pub name: String,
    pub unit_of_measure: Option<String>,
    pub quantity: u32,
    pub unit_cost_cents: u64,
    pub cost_cents: u64,
}

/// A visit that consumed materials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitMaterials {
    pub visit: VisitId,
    pub claim: ClaimId,
    pub folio: String,
    pub technician: TechnicianId,
    pub lines: Vec<UsageLine>,
    pub cost_cents: u64,
}

/// Per-material totals across the reported visits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialTotal {
    pub material: MaterialId,
    pub name: String,
    pub quantity: u64,
    pub uses: usize,
    pub cost_cents: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaterialControl {
    pub visits: Vec<VisitMaterials>,
    /// Most used first.
    pub totals: Vec<MaterialTotal>,
    pub cost_cents: u64,
}

/// Administrator cost overview.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostSummary {
    pub materials: MaterialControl,
    /// Σ stock × unit cost over the catalog.
    pub stock_value_cents: u64,
    pub below_min_stock: Vec<MaterialId>,
}

fn require_staff(ctx: &Ctx<'_>) -> Result<(), ActionError> {
    if ctx.actor.is_staff() {
        Ok(())
    } else {
        Err(ActionError::forbidden("staff only"))
    }
}

fn scoped_claim<'s>(store: &'s Store, actor: &Actor, id: ClaimId) -> Result<&'s Claim, ActionError> {
    claim_ref(store, id)
        .ok()
        .filter(|claim| actor.manages_project(claim.project))
        .ok_or_else(|| ActionError::not_found("claim", id))
}

pub fn claim_evidence(
    store: &Store,
    ctx: &Ctx<'_>,
    id: ClaimId,
) -> Result<EvidenceReport, ActionError> {
    require_staff(ctx)?;
    scoped_claim(store, &ctx.actor, id)?;
    let mut items: Vec<&Evidence> = store.evidence.iter().filter(|e| e.claim == id).collect();
    items.sort_by_key(|e| (e.uploaded_at, e.id));

    let mut report = EvidenceReport {
        claim: id,
        owner: Vec::new(),
        technician: Vec::new(),
        system: Vec::new(),
    };
    for item in items {
        let bucket = match item.uploaded_by {
            Uploader::Owner => &mut report.owner,
            Uploader::Technician => &mut report.technician,
            Uploader::System => &mut report.system,
        };
        bucket.push(item.clone());
    }
    Ok(report)
}

/// Material usage of the visits in scope, optionally narrowed to one claim
/// or one project. Visits without usage are left out.
pub fn material_control(
    store: &Store,
    ctx: &Ctx<'_>,
    claim: Option<ClaimId>,
    project: Option<ProjectId>,
) -> Result<MaterialControl, ActionError> {
    require_staff(ctx)?;
    if let Some(id) = claim {
        scoped_claim(store, &ctx.actor, id)?;
    }

    let mut visits: Vec<VisitMaterials> = Vec::new();
    for visit in &store.visits {
        let Some(owning) = store.claim(visit.claim) else {
            continue;
        };
        if !ctx.actor.manages_project(owning.project)
            || claim.is_some_and(|id| id != owning.id)
            || project.is_some_and(|p| p != owning.project)
        {
            continue;
        }
        let lines: Vec<UsageLine> = store
            .material_usages
            .iter()
            .filter(|usage| usage.visit == visit.id)
            .filter_map(|usage| {
                let material = store.material(usage.material)?;
                Some(UsageLine {
                    material: material.id,
                    code: material.code.clone(),
                    name: material.name.clone(),
                    unit_of_measure: material.unit_of_measure.clone(),
                    quantity: usage.quantity,
                    unit_cost_cents: material.unit_cost_cents,
                    cost_cents: store.usage_cost(usage),
                })
            })
            .collect();
        if lines.is_empty() {
            continue;
        }
        visits.push(VisitMaterials {
            visit: visit.id,
            claim: owning.id,
            folio: owning.folio.clone(),
            technician: visit.technician,
            cost_cents: lines.iter().map(|line| line.cost_cents).sum(),
            lines,
        });
    }
    visits.sort_by(|a, b| b.visit.cmp(&a.visit));

    let mut totals: BTreeMap<MaterialId, MaterialTotal> = BTreeMap::new();
    for line in visits.iter().flat_map(|v| &v.lines) {
        let total = totals.entry(line.material).or_insert_with(|| MaterialTotal {
            material: line.material,
            name: line.name.clone(),
            quantity: 0,
            uses: 0,
            cost_cents: 0,
        });
        total.quantity += u64::from(line.quantity);
        total.uses += 1;
        total.cost_cents += line.cost_cents;
    }
    let mut totals: Vec<MaterialTotal> = totals.into_values().collect();
    totals.sort_by(|a, b| b.quantity.cmp(&a.quantity).then(a.material.cmp(&b.material)));

    Ok(MaterialControl {
        cost_cents: visits.iter().map(|v| v.cost_cents).sum(),
        visits,
        totals,
    })
}

pub fn cost_summary(
    store: &Store,
    ctx: &Ctx<'_>,
    project: Option<ProjectId>,
) -> Result<CostSummary, ActionError> {
    if !matches!(ctx.actor, Actor::Administrator { .. } | Actor::System) {
        return Err(ActionError::forbidden("administrators only"));
    }
    let materials = material_control(store, ctx, None, project)?;
    let stock_value_cents = store
        .materials
        .iter()
        .map(|m| u64::from(m.stock.unwrap_or(0)) * m.unit_cost_cents)
        .sum();
    let below_min_stock = store
        .materials
        .iter()
        .filter(|m| matches!((m.stock, m.min_stock), (Some(stock), Some(min)) if stock <= min))
        .map(|m| m.id)
        .collect();
    Ok(CostSummary {
        materials,
        stock_value_cents,
        below_min_stock,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AccountId, EvidenceId, EvidenceKind, OwnerId};
    use crate::io::config::PostventaConfig;
    use crate::test_support::{at, fixed_now, sample_store};

    fn supervisor(project: u64) -> Actor {
        Actor::Supervisor {
            account: AccountId(1),
            project: Some(ProjectId(project)),
        }
    }

    fn evidence(id: u64, claim: u64, by: Uploader, when: &str) -> Evidence {
        Evidence {
            id: EvidenceId(id),
            claim: ClaimId(claim),
            kind: EvidenceKind::Image,
            original_name: format!("foto-{id}.jpg"),
            size_kb: 100,
            uploaded_at: at(when),
            description: None,
            uploaded_by: by,
        }
    }

    #[test]
    fn evidence_is_grouped_by_uploader() {
        let mut store = sample_store();
        store.evidence.extend([
            evidence(1, 1, Uploader::Technician, "2025-03-05 11:00"),
            evidence(2, 1, Uploader::Owner, "2025-03-03 09:05"),
            evidence(3, 1, Uploader::Technician, "2025-03-04 11:00"),
            evidence(4, 2, Uploader::Owner, "2025-03-10 10:05"),
        ]);
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor(1));

        let report = claim_evidence(&store, &ctx, ClaimId(1)).expect("report");
        assert_eq!(report.total(), 3);
        assert_eq!(report.owner.len(), 1);
        let ids: Vec<_> = report.technician.iter().map(|e| e.id).collect();
        assert_eq!(ids, [EvidenceId(3), EvidenceId(1)]);

        let elsewhere = Ctx::new(&cfg, fixed_now(), supervisor(2));
        assert!(matches!(
            claim_evidence(&store, &elsewhere, ClaimId(1)),
            Err(ActionError::NotFound { .. })
        ));
        let owner = Ctx::new(
            &cfg,
            fixed_now(),
            Actor::Owner {
                account: AccountId(2),
                owner: OwnerId(1),
            },
        );
        assert!(matches!(
            claim_evidence(&store, &owner, ClaimId(1)),
            Err(ActionError::Forbidden(_))
        ));
    }

    #[test]
    fn material_control_totals_per_material() {
        let store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), supervisor(1));

        let all = material_control(&store, &ctx, None, None).expect("control");
        let visits: Vec<_> = all.visits.iter().map(|v| v.visit).collect();
        assert_eq!(visits, [VisitId(3), VisitId(2), VisitId(1)]);
        assert_eq!(all.totals[0].material, MaterialId(1));
        assert_eq!(all.totals[0].quantity, 3);
        assert_eq!(all.totals[0].uses, 2);
        assert_eq!(all.cost_cents, 3 * 250_000 + 450_000);

        let one = material_control(&store, &ctx, Some(ClaimId(1)), None).expect("claim 1");
        assert_eq!(one.visits.len(), 2);
        assert_eq!(one.cost_cents, 2 * 250_000 + 450_000);
        assert_eq!(one.visits[1].lines[0].cost_cents, 500_000);

        let other = Ctx::new(&cfg, fixed_now(), supervisor(2));
        assert!(material_control(&store, &other, None, None)
            .expect("empty")
            .visits
            .is_empty());
    }

    #[test]
    fn cost_summary_values_stock_for_administrators() {
        let mut store = sample_store();
        if let Some(silicone) = store.material_mut(MaterialId(2)) {
            silicone.stock = Some(2);
        }
        let cfg = PostventaConfig::default();
        let admin = Ctx::new(
            &cfg,
            fixed_now(),
            Actor::Administrator {
                account: AccountId(4),
            },
        );
        let summary = cost_summary(&store, &admin, None).expect("summary");
        assert_eq!(summary.stock_value_cents, 20 * 250_000 + 2 * 450_000);
        assert_eq!(summary.below_min_stock, [MaterialId(2)]);
        assert_eq!(summary.materials.cost_cents, 1_200_000);

        let ctx = Ctx::new(&cfg, fixed_now(), supervisor(1));
        assert!(matches!(
            cost_summary(&store, &ctx, None),
            Err(ActionError::Forbidden(_))
        ));
    }
}
