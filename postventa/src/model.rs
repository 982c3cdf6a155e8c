//! Persisted entities and the `Store` document that holds them.
//!
//! All timestamps are local wall-clock times of the construction company
//! (`NaiveDateTime`); the store never mixes time zones.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::core::status::{AppointmentStatus, ClaimStatus, DebrisStatus, VisitStatus};
use crate::core::types::{
    AccountId, AppointmentId, AssignmentId, AssignmentMethod, AvailabilityId, ClaimId, CompanyId,
    DebrisCrewId, DebrisId, DebrisKind, DeliveryStatus, EvidenceId, EvidenceKind, HistoryId,
    MaterialId, MaterialUsageId, NotificationId, OwnerId, ProjectId, ProjectStatus, Recipient,
    RemovalCompanyId, Role, SpecialtyId, SurveyId, TechnicianId, UnitId, Uploader, VisitId,
};

pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub rut: String,
    pub legal_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<CompanyId>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub project: ProjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerId>,
}

/// Trade specialty; doubles as the claim category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specialty {
    pub id: SpecialtyId,
    pub name: String,
}

/// Homeowner directory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    pub rut: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountId>,
}

/// Technician directory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technician {
    pub id: TechnicianId,
    pub rut: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<SpecialtyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<CompanyId>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Mean technician score from answered surveys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub rating_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountId>,
}

/// Login account. Owners and technicians link back to their directory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rut: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub staff: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    pub password_hash: String,
    /// Supervisor scope; `None` means every project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician: Option<TechnicianId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub folio: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub filed_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<NaiveDateTime>,
    /// Committed attention time in hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<u32>,
    pub status: ClaimStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<SpecialtyId>,
    pub owner: OwnerId,
    pub project: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician: Option<TechnicianId>,
    #[serde(default)]
    pub requires_debris_removal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub claim: ClaimId,
    pub technician: TechnicianId,
    pub assigned_at: NaiveDateTime,
    pub method: AssignmentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<u32>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub claim: ClaimId,
    pub technician: TechnicianId,
    pub owner: OwnerId,
    pub scheduled_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<NaiveDateTime>,
    pub status: AppointmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reschedule_reason: Option<String>,
    #[serde(default)]
    pub reminder_sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: VisitId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment: Option<AppointmentId>,
    pub claim: ClaimId,
    pub technician: TechnicianId,
    pub started_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<NaiveDateTime>,
    pub status: VisitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_type: Option<String>,
    #[serde(default)]
    pub requires_follow_up: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measure: Option<String>,
    /// Unit cost in cents (CLP has no minor unit, so this is pesos × 100).
    #[serde(default)]
    pub unit_cost_cents: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_stock: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialUsage {
    pub id: MaterialUsageId,
    pub visit: VisitId,
    pub material: MaterialId,
    pub quantity: u32,
    pub used_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Debris-removal request raised during a visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debris {
    pub id: DebrisId,
    pub claim: ClaimId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit: Option<VisitId>,
    pub kind: DebrisKind,
    pub volume_m3: f64,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_on: Option<NaiveDate>,
    pub status: DebrisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_company: Option<RemovalCompanyId>,
    #[serde(default)]
    pub cost_cents: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Technician assigned to an internal debris crew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebrisCrew {
    pub id: DebrisCrewId,
    pub debris: DebrisId,
    pub technician: TechnicianId,
    pub assigned_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalCompany {
    pub id: RemovalCompanyId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Satisfaction survey. Created pending (no `answered_at`) when a claim resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub id: SurveyId,
    pub claim: ClaimId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit: Option<VisitId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeliness_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<NaiveDateTime>,
}

/// Outbox entry. Rendered at queue time, delivered later by a `Mailer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim: Option<ClaimId>,
    pub recipient: Recipient,
    pub kind: String,
    pub subject: String,
    pub body: String,
    pub created_at: NaiveDateTime,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub read: bool,
}

/// Metadata of an uploaded evidence file; the bytes live outside the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub claim: ClaimId,
    pub kind: EvidenceKind,
    pub original_name: String,
    #[serde(default)]
    pub size_kb: u64,
    pub uploaded_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub uploaded_by: Uploader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub claim: ClaimId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ClaimStatus>,
    pub to: ClaimStatus,
    pub at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Technician availability window, recurring by weekday or for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    pub id: AvailabilityId,
    pub technician: TechnicianId,
    #[serde(default)]
    pub recurring: bool,
    /// 0 = Monday .. 6 = Sunday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// The whole persisted dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Store {
    pub version: u32,
    /// Highest id handed out per collection. A missing entry falls back to
    /// the largest id present, so older files keep working.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub id_counters: BTreeMap<String, u64>,
    pub companies: Vec<Company>,
    pub projects: Vec<Project>,
    pub units: Vec<Unit>,
    pub specialties: Vec<Specialty>,
    pub owners: Vec<Owner>,
    pub technicians: Vec<Technician>,
    pub accounts: Vec<Account>,
    pub claims: Vec<Claim>,
    pub assignments: Vec<Assignment>,
    pub appointments: Vec<Appointment>,
    pub visits: Vec<Visit>,
    pub materials: Vec<Material>,
    pub material_usages: Vec<MaterialUsage>,
    pub debris: Vec<Debris>,
    pub debris_crews: Vec<DebrisCrew>,
    pub removal_companies: Vec<RemovalCompany>,
    pub surveys: Vec<Survey>,
    pub notifications: Vec<Notification>,
    pub evidence: Vec<Evidence>,
    pub history: Vec<HistoryEntry>,
    pub availability: Vec<Availability>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            id_counters: BTreeMap::new(),
            companies: Vec::new(),
            projects: Vec::new(),
            units: Vec::new(),
            specialties: Vec::new(),
            owners: Vec::new(),
            technicians: Vec::new(),
            accounts: Vec::new(),
            claims: Vec::new(),
            assignments: Vec::new(),
            appointments: Vec::new(),
            visits: Vec::new(),
            materials: Vec::new(),
            material_usages: Vec::new(),
            debris: Vec::new(),
            debris_crews: Vec::new(),
            removal_companies: Vec::new(),
            surveys: Vec::new(),
            notifications: Vec::new(),
            evidence: Vec::new(),
            history: Vec::new(),
            availability: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

macro_rules! collections {
    ($($field:ident: $ty:ty, $id:ident => $get:ident, $get_mut:ident, $next:ident;)*) => {
        impl Store {
            $(
                pub fn $get(&self, id: $id) -> Option<&$ty> {
                    self.$field.iter().find(|item| item.id == id)
                }

                pub fn $get_mut(&mut self, id: $id) -> Option<&mut $ty> {
                    self.$field.iter_mut().find(|item| item.id == id)
                }

                /// Reserve the next id. Ids of deleted items are never handed out again.
                pub fn $next(&mut self) -> $id {
                    let present = self.$field.iter().map(|item| item.id.0).max().unwrap_or(0);
                    let counter = self
                        .id_counters
                        .entry(stringify!($field).to_string())
                        .or_insert(0);
                    *counter = (*counter).max(present) + 1;
                    $id(*counter)
                }
            )*

            /// Raise every counter to at least the largest id present.
            /// Call before removing items so their ids stay retired.
            pub fn seed_id_counters(&mut self) {
                $(
                    if let Some(present) = self.$field.iter().map(|item| item.id.0).max() {
                        let counter = self
                            .id_counters
                            .entry(stringify!($field).to_string())
                            .or_insert(0);
                        *counter = (*counter).max(present);
                    }
                )*
            }

            /// Raw ids per collection, used by the uniqueness invariant.
            pub fn id_lists(&self) -> Vec<(&'static str, Vec<u64>)> {
                vec![
                    $((stringify!($field), self.$field.iter().map(|item| item.id.0).collect()),)*
                ]
            }
        }
    };
}

collections! {
    companies: Company, CompanyId => company, company_mut, next_company_id;
    projects: Project, ProjectId => project, project_mut, next_project_id;
    units: Unit, UnitId => unit, unit_mut, next_unit_id;
    specialties: Specialty, SpecialtyId => specialty, specialty_mut, next_specialty_id;
    owners: Owner, OwnerId => owner, owner_mut, next_owner_id;
    technicians: Technician, TechnicianId => technician, technician_mut, next_technician_id;
    accounts: Account, AccountId => account, account_mut, next_account_id;
    claims: Claim, ClaimId => claim, claim_mut, next_claim_id;
    assignments: Assignment, AssignmentId => assignment, assignment_mut, next_assignment_id;
    appointments: Appointment, AppointmentId => appointment, appointment_mut, next_appointment_id;
    visits: Visit, VisitId => visit, visit_mut, next_visit_id;
    materials: Material, MaterialId => material, material_mut, next_material_id;
    material_usages: MaterialUsage, MaterialUsageId => material_usage, material_usage_mut, next_material_usage_id;
    debris: Debris, DebrisId => debris_request, debris_request_mut, next_debris_id;
    debris_crews: DebrisCrew, DebrisCrewId => debris_crew, debris_crew_mut, next_debris_crew_id;
    removal_companies: RemovalCompany, RemovalCompanyId => removal_company, removal_company_mut, next_removal_company_id;
    surveys: Survey, SurveyId => survey, survey_mut, next_survey_id;
    notifications: Notification, NotificationId => notification, notification_mut, next_notification_id;
    evidence: Evidence, EvidenceId => evidence_item, evidence_item_mut, next_evidence_id;
    history: HistoryEntry, HistoryId => history_entry, history_entry_mut, next_history_id;
    availability: Availability, AvailabilityId => availability_window, availability_window_mut, next_availability_id;
}

impl Store {
    pub fn account_by_username(&self, username: &str) -> Option<&Account> {
        self.accounts
            .iter()
            .find(|account| account.username.eq_ignore_ascii_case(username))
    }

    /// Appointments of a claim, oldest schedule first.
    pub fn appointments_of(&self, claim: ClaimId) -> Vec<&Appointment> {
        let mut found: Vec<&Appointment> = self
            .appointments
            .iter()
            .filter(|appointment| appointment.claim == claim)
            .collect();
        found.sort_by_key(|appointment| (appointment.scheduled_at, appointment.id));
        found
    }

    /// Visits of a claim, earliest start first.
    pub fn visits_of(&self, claim: ClaimId) -> Vec<&Visit> {
        let mut found: Vec<&Visit> = self
            .visits
            .iter()
            .filter(|visit| visit.claim == claim)
            .collect();
        found.sort_by_key(|visit| (visit.started_at, visit.id));
        found
    }

    /// Material cost of one visit in cents.
    pub fn visit_material_cost(&self, visit: VisitId) -> u64 {
        self.material_usages
            .iter()
            .filter(|usage| usage.visit == visit)
            .map(|usage| self.usage_cost(usage))
            .sum()
    }

    pub fn usage_cost(&self, usage: &MaterialUsage) -> u64 {
        self.material(usage.material)
            .map(|material| material.unit_cost_cents * u64::from(usage.quantity))
            .unwrap_or(0)
    }

    /// Claims in progress or assigned to a technician right now.
    pub fn active_claim_count(&self, technician: TechnicianId) -> usize {
        self.claims
            .iter()
            .filter(|claim| claim.technician == Some(technician) && claim.status.is_open())
            .count()
    }
}
