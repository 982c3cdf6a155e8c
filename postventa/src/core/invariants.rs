//! Semantic invariants not expressible via JSON Schema.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;

use chrono::Datelike;

use crate::core::folio;
use crate::core::rut;
use crate::core::schedule::key_of;
use crate::core::status::ClaimStatus;
use crate::model::Store;

/// Check semantic invariants of a store document:
/// - No duplicate ids within a collection, no duplicate folios
/// - Every reference resolves
/// - Availability windows are well formed and not duplicated
/// - Survey scores are within 1..=5
/// - Claim timestamps and technician match the claim status
pub fn validate_invariants(store: &Store) -> Vec<String> {
    let mut errors = Vec::new();
    check_unique_ids(store, &mut errors);
    check_folios(store, &mut errors);
    check_references(store, &mut errors);
    check_availability(store, &mut errors);
    check_surveys(store, &mut errors);
    check_claim_status(store, &mut errors);
    errors
}

/// Non-fatal findings: legacy data that loads but deserves attention.
pub fn collect_warnings(store: &Store, folio_prefix: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    for owner in &store.owners {
        if !rut::has_valid_check_digit(&rut::normalize(&owner.rut)) {
            warnings.push(format!("owner {}: rut '{}' has a bad check digit", owner.id, owner.rut));
        }
    }
    for tech in &store.technicians {
        if !rut::has_valid_check_digit(&rut::normalize(&tech.rut)) {
            warnings.push(format!(
                "technician {}: rut '{}' has a bad check digit",
                tech.id, tech.rut
            ));
        }
    }
    for claim in &store.claims {
        if folio::parse_sequence(&claim.folio, folio_prefix, claim.filed_at.year()).is_none() {
            warnings.push(format!(
                "claim {}: folio '{}' does not follow {}-<year>-<NNNN>",
                claim.id, claim.folio, folio_prefix
            ));
        }
    }
    for material in &store.materials {
        if let (Some(stock), Some(min)) = (material.stock, material.min_stock)
            && stock < min
        {
            warnings.push(format!(
                "material {}: stock {} below minimum {}",
                material.code, stock, min
            ));
        }
    }
    warnings
}

fn check_unique_ids(store: &Store, errors: &mut Vec<String>) {
    for (collection, ids) in store.id_lists() {
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                errors.push(format!("{collection}: duplicate id {id}"));
            }
        }
    }
}

fn check_folios(store: &Store, errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for claim in &store.claims {
        if !seen.insert(claim.folio.as_str()) {
            errors.push(format!("claims: duplicate folio '{}'", claim.folio));
        }
    }
}

fn require(
    errors: &mut Vec<String>,
    found: bool,
    entity: &str,
    field: &str,
    id: impl Display,
    target: impl Display,
) {
    if !found {
        errors.push(format!("{entity} {id}: unknown {field} {target}"));
    }
}

fn check_references(store: &Store, errors: &mut Vec<String>) {
    for project in &store.projects {
        if let Some(company) = project.company {
            require(errors, store.company(company).is_some(), "project", "company", project.id, company);
        }
    }
    for unit in &store.units {
        require(errors, store.project(unit.project).is_some(), "unit", "project", unit.id, unit.project);
        if let Some(owner) = unit.owner {
            require(errors, store.owner(owner).is_some(), "unit", "owner", unit.id, owner);
        }
    }
    for owner in &store.owners {
        if let Some(project) = owner.project {
            require(errors, store.project(project).is_some(), "owner", "project", owner.id, project);
        }
        if let Some(account) = owner.account {
            require(errors, store.account(account).is_some(), "owner", "account", owner.id, account);
        }
    }
    for tech in &store.technicians {
        if let Some(specialty) = tech.specialty {
            require(errors, store.specialty(specialty).is_some(), "technician", "specialty", tech.id, specialty);
        }
        if let Some(company) = tech.company {
            require(errors, store.company(company).is_some(), "technician", "company", tech.id, company);
        }
        if let Some(account) = tech.account {
            require(errors, store.account(account).is_some(), "technician", "account", tech.id, account);
        }
    }
    for account in &store.accounts {
        if let Some(owner) = account.owner {
            require(errors, store.owner(owner).is_some(), "account", "owner", account.id, owner);
        }
        if let Some(tech) = account.technician {
            require(errors, store.technician(tech).is_some(), "account", "technician", account.id, tech);
        }
    }
    for claim in &store.claims {
        require(errors, store.owner(claim.owner).is_some(), "claim", "owner", claim.id, claim.owner);
        require(errors, store.project(claim.project).is_some(), "claim", "project", claim.id, claim.project);
        if let Some(unit) = claim.unit {
            require(errors, store.unit(unit).is_some(), "claim", "unit", claim.id, unit);
        }
        if let Some(category) = claim.category {
            require(errors, store.specialty(category).is_some(), "claim", "category", claim.id, category);
        }
        if let Some(tech) = claim.technician {
            require(errors, store.technician(tech).is_some(), "claim", "technician", claim.id, tech);
        }
    }
    for item in &store.assignments {
        require(errors, store.claim(item.claim).is_some(), "assignment", "claim", item.id, item.claim);
        require(errors, store.technician(item.technician).is_some(), "assignment", "technician", item.id, item.technician);
    }
    for appt in &store.appointments {
        require(errors, store.claim(appt.claim).is_some(), "appointment", "claim", appt.id, appt.claim);
        require(errors, store.technician(appt.technician).is_some(), "appointment", "technician", appt.id, appt.technician);
        require(errors, store.owner(appt.owner).is_some(), "appointment", "owner", appt.id, appt.owner);
    }
    for visit in &store.visits {
        require(errors, store.claim(visit.claim).is_some(), "visit", "claim", visit.id, visit.claim);
        require(errors, store.technician(visit.technician).is_some(), "visit", "technician", visit.id, visit.technician);
        if let Some(appt) = visit.appointment {
            require(errors, store.appointment(appt).is_some(), "visit", "appointment", visit.id, appt);
        }
    }
    for usage in &store.material_usages {
        require(errors, store.visit(usage.visit).is_some(), "material_usage", "visit", usage.id, usage.visit);
        require(errors, store.material(usage.material).is_some(), "material_usage", "material", usage.id, usage.material);
    }
    for item in &store.debris {
        require(errors, store.claim(item.claim).is_some(), "debris", "claim", item.id, item.claim);
        if let Some(visit) = item.visit {
            require(errors, store.visit(visit).is_some(), "debris", "visit", item.id, visit);
        }
        if let Some(company) = item.removal_company {
            require(errors, store.removal_company(company).is_some(), "debris", "removal_company", item.id, company);
        }
    }
    for crew in &store.debris_crews {
        require(errors, store.debris_request(crew.debris).is_some(), "debris_crew", "debris", crew.id, crew.debris);
        require(errors, store.technician(crew.technician).is_some(), "debris_crew", "technician", crew.id, crew.technician);
    }
    for survey in &store.surveys {
        require(errors, store.claim(survey.claim).is_some(), "survey", "claim", survey.id, survey.claim);
    }
    for note in &store.notifications {
        if let Some(claim) = note.claim {
            require(errors, store.claim(claim).is_some(), "notification", "claim", note.id, claim);
        }
    }
    for item in &store.evidence {
        require(errors, store.claim(item.claim).is_some(), "evidence", "claim", item.id, item.claim);
    }
    for entry in &store.history {
        require(errors, store.claim(entry.claim).is_some(), "history", "claim", entry.id, entry.claim);
    }
    for window in &store.availability {
        require(errors, store.technician(window.technician).is_some(), "availability", "technician", window.id, window.technician);
    }
}

fn check_availability(store: &Store, errors: &mut Vec<String>) {
    let mut seen = HashMap::new();
    for window in &store.availability {
        if window.start >= window.end {
            errors.push(format!(
                "availability {}: start {} must be before end {}",
                window.id, window.start, window.end
            ));
        }
        if window.recurring && !window.weekday.is_some_and(|day| day <= 6) {
            errors.push(format!(
                "availability {}: recurring window needs weekday 0..=6",
                window.id
            ));
        }
        if !window.recurring && window.date.is_none() {
            errors.push(format!("availability {}: one-off window needs a date", window.id));
        }
        if let Some(first) = seen.insert(key_of(window), window.id) {
            errors.push(format!(
                "availability {}: duplicates availability {}",
                window.id, first
            ));
        }
    }
}

fn check_surveys(store: &Store, errors: &mut Vec<String>) {
    for survey in &store.surveys {
        let scores = [
            ("score", survey.score),
            ("technician_score", survey.technician_score),
            ("timeliness_score", survey.timeliness_score),
            ("solution_score", survey.solution_score),
        ];
        for (field, value) in scores {
            if let Some(value) = value
                && !(1..=5).contains(&value)
            {
                errors.push(format!("survey {}: {field} {value} outside 1..=5", survey.id));
            }
        }
    }
}

fn check_claim_status(store: &Store, errors: &mut Vec<String>) {
    for claim in &store.claims {
        if matches!(claim.status, ClaimStatus::Assigned | ClaimStatus::InProgress)
            && claim.technician.is_none()
        {
            errors.push(format!(
                "claim {}: status '{}' requires a technician",
                claim.id, claim.status
            ));
        }
        if claim.status.is_resolved() && claim.resolved_at.is_none() {
            errors.push(format!(
                "claim {}: status '{}' requires resolved_at",
                claim.id, claim.status
            ));
        }
        if claim.status == ClaimStatus::Closed && claim.closed_at.is_none() {
            errors.push(format!("claim {}: status 'cerrado' requires closed_at", claim.id));
        }
    }
}
