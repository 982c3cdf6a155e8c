//! The fifteen operational KPIs, computed over a read-only store snapshot.
//!
//! Every metric returns a [`Measure`]: either a value or the reason there is
//! not enough data to compute one. Nothing is silently reported as zero.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::core::status::{AppointmentStatus, ClaimStatus};
use crate::core::types::{ClaimId, MaterialId, ProjectId, SpecialtyId, TechnicianId};
use crate::model::{Claim, Store, Technician, Visit};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Measure<T> {
    Measured(T),
    InsufficientData { reason: String },
}

impl<T> Measure<T> {
    fn insufficient(reason: &str) -> Self {
        Measure::InsufficientData {
            reason: reason.to_string(),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Measure::Measured(value) => Some(value),
            Measure::InsufficientData { .. } => None,
        }
    }
}

/// Thresholds of the KPI report, the `[kpi]` table of `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KpiConfig {
    /// Attention commitment for claims without `estimated_hours`.
    pub attention_deadline_hours: u32,
    pub visits_per_technician_day: u32,
    pub capacity_window_days: u32,
    /// A claim with more visits than this counts as reopened.
    pub reopen_visit_threshold: u32,
    pub punctuality_tolerance_minutes: u32,
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            attention_deadline_hours: 48,
            visits_per_technician_day: 4,
            capacity_window_days: 30,
            reopen_visit_threshold: 1,
            punctuality_tolerance_minutes: 15,
        }
    }
}

/// Scope of a KPI computation. Dates are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl KpiFilter {
    fn in_range(&self, at: NaiveDateTime) -> bool {
        let day = at.date();
        self.from.is_none_or(|from| day >= from) && self.to.is_none_or(|to| day <= to)
    }

    fn in_project(&self, project: ProjectId) -> bool {
        self.project.is_none_or(|wanted| wanted == project)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rate {
    pub count: usize,
    pub total: usize,
    pub percent: f64,
}

impl Rate {
    fn of(count: usize, total: usize) -> Self {
        Self {
            count,
            total,
            percent: round2(count as f64 * 100.0 / total as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capacity {
    pub appointments: usize,
    pub technicians: usize,
    pub capacity: u64,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeanHours {
    pub claims: usize,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostPerClaim {
    pub claims: usize,
    pub total_cents: u64,
    pub mean_cents: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialLine {
    pub material: MaterialId,
    pub name: String,
    pub quantity: u64,
    pub cost_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialCost {
    pub claims_with_material: usize,
    pub total_cents: u64,
    pub mean_cents: f64,
    pub top_materials: Vec<MaterialLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: SpecialtyId,
    pub name: String,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureFrequency {
    pub total_claims: usize,
    pub categories: Vec<CategoryShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicianOutput {
    pub technician: TechnicianId,
    pub name: String,
    pub visits: usize,
    pub claims: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backlog {
    pub pending: usize,
    pub resolved: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSatisfaction {
    pub project: ProjectId,
    pub name: String,
    pub mean_score: f64,
    pub surveys: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReworkCost {
    pub rework_cents: u64,
    pub total_cents: u64,
    pub percent: f64,
}

/// All fifteen KPIs for one filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    pub filter: KpiFilter,
    pub on_time_attention: Measure<Rate>,
    pub demand_vs_capacity: Measure<Capacity>,
    pub resolution_time: Measure<MeanHours>,
    pub appointment_fulfilment: Measure<Rate>,
    pub first_visit_closure: Measure<Rate>,
    pub reopen_rate: Measure<Rate>,
    pub cost_per_claim: Measure<CostPerClaim>,
    pub material_cost_per_case: Measure<MaterialCost>,
    pub failure_frequency: Measure<FailureFrequency>,
    pub technician_punctuality: Measure<Rate>,
    pub technician_productivity: Measure<Vec<TechnicianOutput>>,
    pub backlog: Measure<Backlog>,
    pub documentary_close_time: Measure<MeanHours>,
    pub satisfaction_by_project: Measure<Vec<ProjectSatisfaction>>,
    pub rework_cost: Measure<ReworkCost>,
}

/// Read-only calculator bound to a store, its KPI settings and a filter.
pub struct KpiCalculator<'a> {
    store: &'a Store,
    cfg: &'a KpiConfig,
    filter: &'a KpiFilter,
}

impl<'a> KpiCalculator<'a> {
    pub fn new(store: &'a Store, cfg: &'a KpiConfig, filter: &'a KpiFilter) -> Self {
        Self { store, cfg, filter }
    }

    /// Claims in scope by intake date, cancelled ones excluded.
    fn live_claims(&self) -> Vec<&'a Claim> {
        self.store
            .claims
            .iter()
            .filter(|claim| claim.status != ClaimStatus::Cancelled)
            .filter(|claim| self.filter.in_project(claim.project) && self.filter.in_range(claim.filed_at))
            .collect()
    }

    fn resolved_claims(&self) -> Vec<&'a Claim> {
        self.live_claims()
            .into_iter()
            .filter(|claim| claim.status.is_resolved())
            .collect()
    }

    fn claim_project(&self, claim: ClaimId) -> Option<ProjectId> {
        self.store.claim(claim).map(|claim| claim.project)
    }

    fn visits_in_scope(&self) -> Vec<&'a Visit> {
        self.store
            .visits
            .iter()
            .filter(|visit| {
                self.claim_project(visit.claim)
                    .is_some_and(|project| self.filter.in_project(project))
                    && self.filter.in_range(visit.started_at)
            })
            .collect()
    }

    fn material_cost_of_claim(&self, claim: ClaimId) -> u64 {
        self.store
            .visits_of(claim)
            .iter()
            .map(|visit| self.store.visit_material_cost(visit.id))
            .sum()
    }

    /// KPI 1: share of claims whose first visit started within the committed hours.
    pub fn on_time_attention(&self) -> Measure<Rate> {
        let mut total = 0;
        let mut on_time = 0;
        for claim in self.live_claims() {
            if self.store.appointments_of(claim.id).is_empty() {
                continue;
            }
            total += 1;
            let hours = claim
                .estimated_hours
                .unwrap_or(self.cfg.attention_deadline_hours);
            let deadline = claim.filed_at + Duration::hours(i64::from(hours));
            if let Some(first) = self.store.visits_of(claim.id).first()
                && first.started_at <= deadline
            {
                on_time += 1;
            }
        }
        if total == 0 {
            return Measure::insufficient("no claims with appointments");
        }
        Measure::Measured(Rate::of(on_time, total))
    }

    /// Whether an active technician works for the filtered project: same
    /// company as the project, or already booked on one of its claims.
    fn serves_scope(&self, technician: &Technician) -> bool {
        let Some(project) = self.filter.project else {
            return true;
        };
        let company = self.store.project(project).and_then(|p| p.company);
        (company.is_some() && technician.company == company)
            || self.store.appointments.iter().any(|appt| {
                appt.technician == technician.id && self.claim_project(appt.claim) == Some(project)
            })
    }

    /// KPI 2: live appointments against theoretical technician capacity.
    ///
    /// Cancelled appointments and appointments of cancelled claims are not
    /// demand; capacity counts only technicians serving the filtered project.
    pub fn demand_vs_capacity(&self) -> Measure<Capacity> {
        let appointments = self
            .store
            .appointments
            .iter()
            .filter(|appt| appt.status != AppointmentStatus::Cancelled)
            .filter(|appt| {
                self.store.claim(appt.claim).is_some_and(|claim| {
                    claim.status != ClaimStatus::Cancelled && self.filter.in_project(claim.project)
                }) && self.filter.in_range(appt.scheduled_at)
            })
            .count();
        let technicians = self
            .store
            .technicians
            .iter()
            .filter(|t| t.active && self.serves_scope(t))
            .count();
        if technicians == 0 {
            return Measure::insufficient("no active technicians");
        }
        let capacity = technicians as u64
            * u64::from(self.cfg.visits_per_technician_day)
            * u64::from(self.cfg.capacity_window_days);
        if capacity == 0 {
            return Measure::insufficient("capacity settings are zero");
        }
        Measure::Measured(Capacity {
            appointments,
            technicians,
            capacity,
            ratio: round2(appointments as f64 / capacity as f64),
        })
    }

    /// KPI 3: mean hours from intake to resolution.
    pub fn resolution_time(&self) -> Measure<MeanHours> {
        let durations: Vec<f64> = self
            .resolved_claims()
            .into_iter()
            .filter_map(|claim| {
                let end = claim.resolved_at.or_else(|| {
                    self.store
                        .appointments_of(claim.id)
                        .iter()
                        .filter(|appt| appt.status == AppointmentStatus::Completed)
                        .map(|appt| appt.scheduled_at)
                        .max()
                })?;
                hours_between(claim.filed_at, end)
            })
            .collect();
        mean_hours(&durations, "no resolved claims with a usable end time")
    }

    /// KPI 4: appointments that turned into a visit.
    pub fn appointment_fulfilment(&self) -> Measure<Rate> {
        let visited: HashSet<_> = self
            .store
            .visits
            .iter()
            .filter_map(|visit| visit.appointment)
            .collect();
        let appointments: Vec<_> = self
            .store
            .appointments
            .iter()
            .filter(|appt| {
                self.store.claim(appt.claim).is_some_and(|claim| {
                    claim.status != ClaimStatus::Cancelled && self.filter.in_project(claim.project)
                }) && self.filter.in_range(appt.scheduled_at)
            })
            .collect();
        if appointments.is_empty() {
            return Measure::insufficient("no appointments");
        }
        let kept = appointments
            .iter()
            .filter(|appt| visited.contains(&appt.id))
            .count();
        Measure::Measured(Rate::of(kept, appointments.len()))
    }

    /// KPI 5: resolved claims that needed exactly one completed appointment.
    pub fn first_visit_closure(&self) -> Measure<Rate> {
        let resolved = self.resolved_claims();
        if resolved.is_empty() {
            return Measure::insufficient("no resolved claims");
        }
        let first_time = resolved
            .iter()
            .filter(|claim| {
                self.store
                    .appointments_of(claim.id)
                    .iter()
                    .filter(|appt| appt.status == AppointmentStatus::Completed)
                    .count()
                    == 1
            })
            .count();
        Measure::Measured(Rate::of(first_time, resolved.len()))
    }

    /// KPI 6: claims with more visits than the reopen threshold.
    pub fn reopen_rate(&self) -> Measure<Rate> {
        let claims = self.live_claims();
        if claims.is_empty() {
            return Measure::insufficient("no claims");
        }
        let threshold = self.cfg.reopen_visit_threshold as usize;
        let reopened = claims
            .iter()
            .filter(|claim| self.store.visits_of(claim.id).len() > threshold)
            .count();
        Measure::Measured(Rate::of(reopened, claims.len()))
    }

    /// KPI 7: material cost spread over every live claim.
    pub fn cost_per_claim(&self) -> Measure<CostPerClaim> {
        let claims = self.live_claims();
        if claims.is_empty() {
            return Measure::insufficient("no claims");
        }
        let total_cents: u64 = claims
            .iter()
            .map(|claim| self.material_cost_of_claim(claim.id))
            .sum();
        Measure::Measured(CostPerClaim {
            claims: claims.len(),
            total_cents,
            mean_cents: round2(total_cents as f64 / claims.len() as f64),
        })
    }

    /// KPI 8: material cost over the claims that actually used material.
    pub fn material_cost_per_case(&self) -> Measure<MaterialCost> {
        let mut claims_with_material = 0;
        let mut total_cents = 0u64;
        let mut by_material: BTreeMap<MaterialId, (u64, u64)> = BTreeMap::new();
        for claim in self.live_claims() {
            let visits: HashSet<_> = self
                .store
                .visits_of(claim.id)
                .iter()
                .map(|visit| visit.id)
                .collect();
            let usages: Vec<_> = self
                .store
                .material_usages
                .iter()
                .filter(|usage| visits.contains(&usage.visit))
                .collect();
            if usages.is_empty() {
                continue;
            }
            claims_with_material += 1;
            for usage in usages {
                let cost = self.store.usage_cost(usage);
                total_cents += cost;
                let entry = by_material.entry(usage.material).or_default();
                entry.0 += u64::from(usage.quantity);
                entry.1 += cost;
            }
        }
        if claims_with_material == 0 {
            return Measure::insufficient("no material usage");
        }
        let mut top_materials: Vec<MaterialLine> = by_material
            .into_iter()
            .map(|(material, (quantity, cost_cents))| MaterialLine {
                material,
                name: self
                    .store
                    .material(material)
                    .map(|m| m.name.clone())
                    .unwrap_or_default(),
                quantity,
                cost_cents,
            })
            .collect();
        top_materials.sort_by(|a, b| {
            b.cost_cents
                .cmp(&a.cost_cents)
                .then(a.material.cmp(&b.material))
        });
        top_materials.truncate(5);
        Measure::Measured(MaterialCost {
            claims_with_material,
            total_cents,
            mean_cents: round2(total_cents as f64 / claims_with_material as f64),
            top_materials,
        })
    }

    /// KPI 9: claim count and share per category.
    pub fn failure_frequency(&self) -> Measure<FailureFrequency> {
        let claims = self.live_claims();
        if claims.is_empty() {
            return Measure::insufficient("no claims");
        }
        let mut counts: HashMap<SpecialtyId, usize> = HashMap::new();
        for category in claims.iter().filter_map(|claim| claim.category) {
            *counts.entry(category).or_default() += 1;
        }
        let total_claims = claims.len();
        let mut categories: Vec<CategoryShare> = counts
            .into_iter()
            .map(|(category, count)| CategoryShare {
                category,
                name: self
                    .store
                    .specialty(category)
                    .map(|s| s.name.clone())
                    .unwrap_or_default(),
                count,
                percent: round2(count as f64 * 100.0 / total_claims as f64),
            })
            .collect();
        categories.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        Measure::Measured(FailureFrequency {
            total_claims,
            categories,
        })
    }

    /// KPI 10: visits that started within tolerance of the scheduled time.
    pub fn technician_punctuality(&self) -> Measure<Rate> {
        let tolerance = Duration::minutes(i64::from(self.cfg.punctuality_tolerance_minutes));
        let linked: Vec<(NaiveDateTime, NaiveDateTime)> = self
            .visits_in_scope()
            .into_iter()
            .filter_map(|visit| {
                let appt = self.store.appointment(visit.appointment?)?;
                Some((visit.started_at, appt.scheduled_at))
            })
            .collect();
        if linked.is_empty() {
            return Measure::insufficient("no visits linked to an appointment");
        }
        let punctual = linked
            .iter()
            .filter(|(started, scheduled)| *started <= *scheduled + tolerance)
            .count();
        Measure::Measured(Rate::of(punctual, linked.len()))
    }

    /// KPI 11: visits and distinct claims per technician.
    pub fn technician_productivity(&self) -> Measure<Vec<TechnicianOutput>> {
        let mut per_tech: BTreeMap<TechnicianId, (usize, HashSet<ClaimId>)> = BTreeMap::new();
        for visit in self.visits_in_scope() {
            let entry = per_tech.entry(visit.technician).or_default();
            entry.0 += 1;
            entry.1.insert(visit.claim);
        }
        if per_tech.is_empty() {
            return Measure::insufficient("no visits");
        }
        let mut out: Vec<TechnicianOutput> = per_tech
            .into_iter()
            .map(|(technician, (visits, claims))| TechnicianOutput {
                technician,
                name: self
                    .store
                    .technician(technician)
                    .map(|t| t.name.clone())
                    .unwrap_or_default(),
                visits,
                claims: claims.len(),
            })
            .collect();
        out.sort_by(|a, b| b.visits.cmp(&a.visits).then(a.technician.cmp(&b.technician)));
        Measure::Measured(out)
    }

    /// KPI 12: open against resolved claims.
    pub fn backlog(&self) -> Measure<Backlog> {
        let claims = self.live_claims();
        if claims.is_empty() {
            return Measure::insufficient("no claims");
        }
        let resolved = claims.iter().filter(|c| c.status.is_resolved()).count();
        let pending = claims.iter().filter(|c| c.status.is_open()).count();
        Measure::Measured(Backlog {
            pending,
            resolved,
            total: pending + resolved,
        })
    }

    /// KPI 13: hours between the last visit closing and the claim closing.
    pub fn documentary_close_time(&self) -> Measure<MeanHours> {
        let durations: Vec<f64> = self
            .live_claims()
            .into_iter()
            .filter(|claim| claim.status == ClaimStatus::Closed)
            .filter_map(|claim| {
                let closed = claim.closed_at?;
                let last_visit = self
                    .store
                    .visits_of(claim.id)
                    .iter()
                    .filter_map(|visit| visit.closed_at)
                    .max()?;
                hours_between(last_visit, closed)
            })
            .collect();
        mean_hours(&durations, "no closed claims with closed visits")
    }

    /// KPI 14: mean survey score per project, best first.
    pub fn satisfaction_by_project(&self) -> Measure<Vec<ProjectSatisfaction>> {
        let mut per_project: BTreeMap<ProjectId, (u64, usize)> = BTreeMap::new();
        for survey in &self.store.surveys {
            let (Some(score), Some(answered)) = (survey.score, survey.answered_at) else {
                continue;
            };
            let Some(project) = self.claim_project(survey.claim) else {
                continue;
            };
            if !self.filter.in_project(project) || !self.filter.in_range(answered) {
                continue;
            }
            let entry = per_project.entry(project).or_default();
            entry.0 += u64::from(score);
            entry.1 += 1;
        }
        if per_project.is_empty() {
            return Measure::insufficient("no answered surveys");
        }
        let mut out: Vec<ProjectSatisfaction> = per_project
            .into_iter()
            .map(|(project, (sum, count))| ProjectSatisfaction {
                project,
                name: self
                    .store
                    .project(project)
                    .map(|p| p.name.clone())
                    .unwrap_or_default(),
                mean_score: round2(sum as f64 / count as f64),
                surveys: count,
            })
            .collect();
        out.sort_by(|a, b| {
            b.mean_score
                .total_cmp(&a.mean_score)
                .then(a.project.cmp(&b.project))
        });
        Measure::Measured(out)
    }

    /// KPI 15: share of material cost spent on visits after the first.
    pub fn rework_cost(&self) -> Measure<ReworkCost> {
        let mut rework_cents = 0u64;
        let mut total_cents = 0u64;
        for claim in self.live_claims() {
            for (index, visit) in self.store.visits_of(claim.id).iter().enumerate() {
                let cost = self.store.visit_material_cost(visit.id);
                total_cents += cost;
                if index > 0 {
                    rework_cents += cost;
                }
            }
        }
        if total_cents == 0 {
            return Measure::insufficient("no material cost recorded");
        }
        Measure::Measured(ReworkCost {
            rework_cents,
            total_cents,
            percent: round2(rework_cents as f64 * 100.0 / total_cents as f64),
        })
    }

    pub fn all_kpis(&self) -> KpiReport {
        KpiReport {
            filter: self.filter.clone(),
            on_time_attention: self.on_time_attention(),
            demand_vs_capacity: self.demand_vs_capacity(),
            resolution_time: self.resolution_time(),
            appointment_fulfilment: self.appointment_fulfilment(),
            first_visit_closure: self.first_visit_closure(),
            reopen_rate: self.reopen_rate(),
            cost_per_claim: self.cost_per_claim(),
            material_cost_per_case: self.material_cost_per_case(),
            failure_frequency: self.failure_frequency(),
            technician_punctuality: self.technician_punctuality(),
            technician_productivity: self.technician_productivity(),
            backlog: self.backlog(),
            documentary_close_time: self.documentary_close_time(),
            satisfaction_by_project: self.satisfaction_by_project(),
            rework_cost: self.rework_cost(),
        }
    }
}

/// One CSV row: `(number, key, value or reason, unit)`.
struct ScalarRow {
    number: u8,
    key: &'static str,
    value: Result<f64, String>,
    unit: &'static str,
}

fn scalar<T>(
    number: u8,
    key: &'static str,
    unit: &'static str,
    measure: &Measure<T>,
    pick: impl Fn(&T) -> f64,
) -> ScalarRow {
    let value = match measure {
        Measure::Measured(inner) => Ok(pick(inner)),
        Measure::InsufficientData { reason } => Err(reason.clone()),
    };
    ScalarRow {
        number,
        key,
        value,
        unit,
    }
}

fn cents(value: f64) -> f64 {
    round2(value / 100.0)
}

impl KpiReport {
    fn scalar_rows(&self) -> Vec<ScalarRow> {
        vec![
            scalar(1, "on_time_attention", "%", &self.on_time_attention, |r| r.percent),
            scalar(2, "demand_vs_capacity", "ratio", &self.demand_vs_capacity, |c| c.ratio),
            scalar(3, "resolution_time", "hours", &self.resolution_time, |m| m.hours),
            scalar(4, "appointment_fulfilment", "%", &self.appointment_fulfilment, |r| r.percent),
            scalar(5, "first_visit_closure", "%", &self.first_visit_closure, |r| r.percent),
            scalar(6, "reopen_rate", "%", &self.reopen_rate, |r| r.percent),
            scalar(7, "cost_per_claim", "$", &self.cost_per_claim, |c| cents(c.mean_cents)),
            scalar(8, "material_cost_per_case", "$", &self.material_cost_per_case, |c| {
                cents(c.mean_cents)
            }),
            scalar(10, "technician_punctuality", "%", &self.technician_punctuality, |r| r.percent),
            scalar(12, "backlog_pending", "claims", &self.backlog, |b| b.pending as f64),
            scalar(13, "documentary_close_time", "hours", &self.documentary_close_time, |m| m.hours),
            scalar(15, "rework_cost", "%", &self.rework_cost, |r| r.percent),
        ]
    }

    /// Scalar metrics as CSV (`kpi,key,status,value,unit`), list metrics omitted.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("kpi,key,status,value,unit\n");
        for row in self.scalar_rows() {
            let (status, value) = match row.value {
                Ok(value) => ("measured", value.to_string()),
                Err(reason) => ("insufficient_data", csv_field(&reason)),
            };
            out.push_str(&format!(
                "{},{},{},{},{}\n",
                row.number, row.key, status, value, row.unit
            ));
        }
        out
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn hours_between(start: NaiveDateTime, end: NaiveDateTime) -> Option<f64> {
    let minutes = (end - start).num_minutes();
    (minutes >= 0).then(|| minutes as f64 / 60.0)
}

fn mean_hours(durations: &[f64], reason: &str) -> Measure<MeanHours> {
    if durations.is_empty() {
        return Measure::insufficient(reason);
    }
    Measure::Measured(MeanHours {
        claims: durations.len(),
        hours: round2(durations.iter().sum::<f64>() / durations.len() as f64),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, sample_store};

    fn report(store: &Store, filter: &KpiFilter) -> KpiReport {
        KpiCalculator::new(store, &KpiConfig::default(), filter).all_kpis()
    }

    fn measured<T: Clone>(measure: &Measure<T>) -> T {
        measure.value().cloned().expect("measured")
    }

    #[test]
    fn empty_store_reports_insufficient_data_everywhere() {
        let report = report(&Store::default(), &KpiFilter::default());
        assert!(report.on_time_attention.value().is_none());
        assert!(report.demand_vs_capacity.value().is_none());
        assert!(report.resolution_time.value().is_none());
        assert!(report.backlog.value().is_none());
        assert!(report.rework_cost.value().is_none());
        assert!(report.satisfaction_by_project.value().is_none());
    }

    #[test]
    fn sample_store_rates() {
        let report = report(&sample_store(), &KpiFilter::default());
        let attention = measured(&report.on_time_attention);
        assert_eq!((attention.count, attention.total), (1, 3));
        assert_eq!(attention.percent, 33.33);
        assert_eq!(measured(&report.appointment_fulfilment).percent, 75.0);
        assert_eq!(measured(&report.first_visit_closure).percent, 50.0);
        assert_eq!(measured(&report.reopen_rate).percent, 25.0);
        let punctuality = measured(&report.technician_punctuality);
        assert_eq!((punctuality.count, punctuality.total), (2, 3));
    }

    #[test]
    fn sample_store_times_and_capacity() {
        let report = report(&sample_store(), &KpiFilter::default());
        let capacity = measured(&report.demand_vs_capacity);
        assert_eq!(
            (capacity.appointments, capacity.technicians, capacity.capacity),
            (4, 2, 240)
        );
        assert_eq!(capacity.ratio, 0.02);
        assert_eq!(measured(&report.resolution_time).hours, 74.5);
        assert_eq!(measured(&report.documentary_close_time).hours, 24.0);
    }

    #[test]
    fn capacity_ignores_cancelled_work_and_other_projects() {
        let mut store = sample_store();
        store.appointments[2].status = AppointmentStatus::Cancelled;
        store.claims[3].status = ClaimStatus::Cancelled;
        let mut other = store.projects[0].clone();
        other.id = ProjectId(2);
        other.code = "PIN-02".to_string();
        other.company = Some(crate::core::types::CompanyId(2));
        store.projects.push(other);
        let mut outsider = store.technicians[1].clone();
        outsider.id = TechnicianId(3);
        outsider.company = Some(crate::core::types::CompanyId(2));
        store.technicians.push(outsider);

        let all = measured(&report(&store, &KpiFilter::default()).demand_vs_capacity);
        assert_eq!((all.appointments, all.technicians), (2, 3));

        let scoped = KpiFilter {
            project: Some(ProjectId(1)),
            ..KpiFilter::default()
        };
        let robles = measured(&report(&store, &scoped).demand_vs_capacity);
        assert_eq!((robles.appointments, robles.technicians), (2, 2));
    }

    #[test]
    fn sample_store_costs() {
        let report = report(&sample_store(), &KpiFilter::default());
        let per_claim = measured(&report.cost_per_claim);
        assert_eq!(per_claim.total_cents, 1_200_000);
        assert_eq!(per_claim.mean_cents, 300_000.0);
        let per_case = measured(&report.material_cost_per_case);
        assert_eq!(per_case.claims_with_material, 2);
        assert_eq!(per_case.mean_cents, 600_000.0);
        assert_eq!(per_case.top_materials[0].material, MaterialId(1));
        assert_eq!(per_case.top_materials[0].quantity, 3);
        let rework = measured(&report.rework_cost);
        assert_eq!(rework.rework_cents, 450_000);
        assert_eq!(rework.percent, 37.5);
    }

    #[test]
    fn sample_store_breakdowns() {
        let report = report(&sample_store(), &KpiFilter::default());
        let frequency = measured(&report.failure_frequency);
        assert_eq!(frequency.total_claims, 4);
        let shares: Vec<(u64, usize, f64)> = frequency
            .categories
            .iter()
            .map(|c| (c.category.0, c.count, c.percent))
            .collect();
        assert_eq!(shares, vec![(1, 3, 75.0), (2, 1, 25.0)]);

        let productivity = measured(&report.technician_productivity);
        assert_eq!(productivity.len(), 1);
        assert_eq!((productivity[0].visits, productivity[0].claims), (3, 2));

        let backlog = measured(&report.backlog);
        assert_eq!((backlog.pending, backlog.resolved, backlog.total), (2, 2, 4));

        let satisfaction = measured(&report.satisfaction_by_project);
        assert_eq!(satisfaction[0].mean_score, 4.5);
        assert_eq!(satisfaction[0].surveys, 2);
    }

    #[test]
    fn cancelled_claims_leave_every_denominator() {
        let mut store = sample_store();
        for claim in &mut store.claims {
            if claim.status.is_open() {
                claim.status = ClaimStatus::Cancelled;
            }
        }
        let report = report(&store, &KpiFilter::default());
        assert_eq!(measured(&report.backlog).pending, 0);
        assert_eq!(measured(&report.failure_frequency).total_claims, 2);
    }

    #[test]
    fn project_filter_excludes_other_projects() {
        let filter = KpiFilter {
            project: Some(ProjectId(999)),
            ..KpiFilter::default()
        };
        let report = report(&sample_store(), &filter);
        assert!(report.backlog.value().is_none());
        assert!(report.technician_productivity.value().is_none());
        assert!(report.satisfaction_by_project.value().is_none());
    }

    #[test]
    fn date_filter_is_inclusive_on_intake() {
        let filter = KpiFilter {
            project: None,
            from: Some(at("2025-03-03 00:00").date()),
            to: Some(at("2025-03-10 00:00").date()),
        };
        let backlog = measured(&report(&sample_store(), &filter).backlog);
        // Claims filed on 03-03 and 03-10; 02-10 and 03-12 are outside.
        assert_eq!(backlog.total, 2);
    }

    #[test]
    fn resolution_time_falls_back_to_latest_completed_appointment() {
        let mut store = sample_store();
        for claim in &mut store.claims {
            claim.resolved_at = None;
        }
        let cfg = KpiConfig::default();
        let filter = KpiFilter::default();
        let mean = measured(&KpiCalculator::new(&store, &cfg, &filter).resolution_time());
        // Claim 1: 03-03 09:00 -> 03-05 10:00 (49h); claim 4: 02-10 09:00 -> 02-12 09:00 (48h).
        assert_eq!(mean.claims, 2);
        assert_eq!(mean.hours, 48.5);
    }

    #[test]
    fn punctuality_respects_tolerance() {
        let mut cfg = KpiConfig::default();
        cfg.punctuality_tolerance_minutes = 30;
        let filter = KpiFilter::default();
        let store = sample_store();
        let rate = measured(&KpiCalculator::new(&store, &cfg, &filter).technician_punctuality());
        assert_eq!((rate.count, rate.total), (3, 3));
    }

    #[test]
    fn csv_has_one_row_per_scalar_metric() {
        let csv = report(&sample_store(), &KpiFilter::default()).to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "kpi,key,status,value,unit");
        assert_eq!(lines.len(), 13);
        assert!(lines.contains(&"12,backlog_pending,measured,2,claims"));
        assert!(lines.contains(&"7,cost_per_claim,measured,3000,$"));
    }

    #[test]
    fn csv_marks_missing_metrics() {
        let csv = report(&Store::default(), &KpiFilter::default()).to_csv();
        assert!(csv.contains("1,on_time_attention,insufficient_data,no claims with appointments,%"));
    }

    #[test]
    fn insufficient_data_serializes_with_reason() {
        let measure: Measure<Rate> = Measure::insufficient("no claims");
        let json = serde_json::to_string(&measure).expect("serialize");
        assert_eq!(
            json,
            r#"{"status":"insufficient_data","data":{"reason":"no claims"}}"#
        );
    }
}
