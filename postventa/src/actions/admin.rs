//! Directory maintenance by administrators.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ActionError, Actor, Ctx};
use crate::auth;
use crate::core::rut;
use crate::core::types::{AccountId, CompanyId, ProjectId, Role, SpecialtyId, TechnicianId};
use crate::model::{Account, Store, Technician};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewTechnician {
    pub rut: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub specialty: Option<SpecialtyId>,
    pub company: Option<CompanyId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewSupervisor {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    /// `None` supervises every project.
    pub project: Option<ProjectId>,
}

/// Fields an administrator may change on a technician; `None` leaves a
/// field untouched. The RUT is fixed once created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TechnicianUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub specialty: Option<SpecialtyId>,
    pub company: Option<CompanyId>,
    pub active: Option<bool>,
}

/// Account as shown to administrators; never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub id: AccountId,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub active: bool,
    pub project: Option<ProjectId>,
}

/// One line of the technician roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterEntry {
    pub id: TechnicianId,
    pub rut: String,
    pub name: String,
    pub specialty: Option<String>,
    pub active: bool,
    pub active_claims: usize,
    pub rating: Option<f64>,
    pub has_account: bool,
}

fn require_admin(ctx: &Ctx<'_>) -> Result<(), ActionError> {
    match ctx.actor {
        Actor::Administrator { .. } | Actor::System => Ok(()),
        _ => Err(ActionError::forbidden("administrators only")),
    }
}

fn non_empty(field: &str, value: &str) -> Result<String, ActionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ActionError::Invalid(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Add a technician to the directory. The account is provisioned on first login.
pub fn create_technician(
    store: &mut Store,
    ctx: &Ctx<'_>,
    input: NewTechnician,
) -> Result<TechnicianId, ActionError> {
    require_admin(ctx)?;
    let name = non_empty("name", &input.name)?;
    let raw_rut = non_empty("rut", &input.rut)?;
    let key = rut::normalize(&raw_rut);
    if !rut::is_rut_shaped(&raw_rut) || !rut::has_valid_check_digit(&key) {
        return Err(ActionError::Invalid(format!("{raw_rut} is not a valid RUT")));
    }
    if store
        .technicians
        .iter()
        .any(|tech| rut::normalize(&tech.rut) == key)
    {
        return Err(ActionError::Conflict(format!(
            "a technician with RUT {raw_rut} already exists"
        )));
    }
    if let Some(specialty) = input.specialty
        && store.specialty(specialty).is_none()
    {
        return Err(ActionError::not_found("specialty", specialty));
    }
    if let Some(company) = input.company
        && store.company(company).is_none()
    {
        return Err(ActionError::not_found("company", company));
    }

    let id = store.next_technician_id();
    store.technicians.push(Technician {
        id,
        rut: raw_rut,
        name,
        email: input.email.filter(|e| !e.trim().is_empty()),
        phone: input.phone.filter(|p| !p.trim().is_empty()),
        specialty: input.specialty,
        company: input.company,
        active: true,
        rating: None,
        rating_count: 0,
        account: None,
    });
    info!(technician = %id, "technician created");
    Ok(id)
}

pub fn create_supervisor(
    store: &mut Store,
    ctx: &Ctx<'_>,
    input: NewSupervisor,
) -> Result<AccountId, ActionError> {
    require_admin(ctx)?;
    let username = non_empty("username", &input.username)?;
    if input.password.is_empty() {
        return Err(ActionError::Invalid("password is required".to_string()));
    }
    if store.account_by_username(&username).is_some() {
        return Err(ActionError::Conflict(format!(
            "username {username} is taken"
        )));
    }
    if let Some(project) = input.project
        && store.project(project).is_none()
    {
        return Err(ActionError::not_found("project", project));
    }

    let id = store.next_account_id();
    store.accounts.push(Account {
        id,
        username: username.clone(),
        email: input.email.filter(|e| !e.trim().is_empty()),
        rut: None,
        role: Role::Supervisor,
        staff: true,
        active: true,
        password_hash: auth::hash_password(&input.password),
        project: input.project,
        owner: None,
        technician: None,
    });
    info!(account = %id, %username, "supervisor created");
    Ok(id)
}

/// Edit a technician. Email and active state are mirrored onto the linked
/// account.
pub fn update_technician(
    store: &mut Store,
    ctx: &Ctx<'_>,
    id: TechnicianId,
    update: TechnicianUpdate,
) -> Result<(), ActionError> {
    require_admin(ctx)?;
    let current = store
        .technician(id)
        .ok_or_else(|| ActionError::not_found("technician", id))?;
    let name = match &update.name {
        Some(name) => non_empty("name", name)?,
        None => current.name.clone(),
    };
    if let Some(specialty) = update.specialty
        && store.specialty(specialty).is_none()
    {
        return Err(ActionError::not_found("specialty", specialty));
    }
    if let Some(company) = update.company
        && store.company(company).is_none()
    {
        return Err(ActionError::not_found("company", company));
    }
    if update.active == Some(false) {
        require_no_open_claims(store, id)?;
    }

    let tech = store
        .technician_mut(id)
        .ok_or_else(|| ActionError::not_found("technician", id))?;
    tech.name = name;
    if let Some(email) = update.email {
        tech.email = Some(email.trim().to_string()).filter(|e| !e.is_empty());
    }
    if let Some(phone) = update.phone {
        tech.phone = Some(phone.trim().to_string()).filter(|p| !p.is_empty());
    }
    if update.specialty.is_some() {
        tech.specialty = update.specialty;
    }
    if update.company.is_some() {
        tech.company = update.company;
    }
    if let Some(active) = update.active {
        tech.active = active;
    }
    let (email, active, account) = (tech.email.clone(), tech.active, tech.account);

    if let Some(account) = account.and_then(|a| store.account_mut(a)) {
        account.email = email;
        account.active = active;
    }
    info!(technician = %id, "technician updated");
    Ok(())
}

fn require_no_open_claims(store: &Store, id: TechnicianId) -> Result<(), ActionError> {
    match store.active_claim_count(id) {
        0 => Ok(()),
        open => Err(ActionError::Conflict(format!(
            "technician {id} still has {open} open claims; reassign them first"
        ))),
    }
}

/// Retire a technician: they leave the roster's suggestions and can no
/// longer log in. Claims, visits and history keep pointing at them.
pub fn deactivate_technician(
    store: &mut Store,
    ctx: &Ctx<'_>,
    id: TechnicianId,
) -> Result<(), ActionError> {
    update_technician(
        store,
        ctx,
        id,
        TechnicianUpdate {
            active: Some(false),
            ..TechnicianUpdate::default()
        },
    )
}

/// Retire a supervisor account. The account stays so history keeps its actor.
pub fn remove_supervisor(
    store: &mut Store,
    ctx: &Ctx<'_>,
    id: AccountId,
) -> Result<(), ActionError> {
    require_admin(ctx)?;
    let account = store
        .account_mut(id)
        .filter(|account| account.role == Role::Supervisor)
        .ok_or_else(|| ActionError::not_found("supervisor", id))?;
    account.active = false;
    info!(account = %id, username = %account.username, "supervisor removed");
    Ok(())
}

pub fn list_accounts(store: &Store, ctx: &Ctx<'_>) -> Result<Vec<AccountSummary>, ActionError> {
    require_admin(ctx)?;
    Ok(store
        .accounts
        .iter()
        .map(|account| AccountSummary {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            role: account.role,
            active: account.active,
            project: account.project,
        })
        .collect())
}

/// Technicians ordered by name, with their current load.
pub fn technician_roster(store: &Store) -> Vec<RosterEntry> {
    let mut roster: Vec<RosterEntry> = store
        .technicians
        .iter()
        .map(|tech| RosterEntry {
            id: tech.id,
            rut: tech.rut.clone(),
            name: tech.name.clone(),
            specialty: tech
                .specialty
                .and_then(|id| store.specialty(id))
                .map(|s| s.name.clone()),
            active: tech.active,
            active_claims: store.active_claim_count(tech.id),
            rating: tech.rating,
            has_account: tech.account.is_some(),
        })
        .collect();
    roster.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    roster
}
