//! Technician suggestions for a claim.

use std::cmp::Ordering;

use serde::Serialize;

use crate::core::types::TechnicianId;
use crate::model::{Claim, Store};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub technician: TechnicianId,
    pub name: String,
    pub active_claims: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub same_company: bool,
    /// 0..=100; higher is a better fit.
    pub match_score: u32,
}

/// Rank active technicians for `claim`.
///
/// Only technicians whose specialty equals the claim category qualify (any
/// technician when the claim has no category). Technicians of the project's
/// company come first; then fewest active claims, highest rating, lowest id.
pub fn suggest_technicians(store: &Store, claim: &Claim) -> Vec<Suggestion> {
    let company = store
        .project(claim.project)
        .and_then(|project| project.company);
    let mut out: Vec<Suggestion> = store
        .technicians
        .iter()
        .filter(|tech| tech.active)
        .filter(|tech| claim.category.is_none() || tech.specialty == claim.category)
        .map(|tech| {
            let active_claims = store.active_claim_count(tech.id);
            let same_company = company.is_some() && tech.company == company;
            Suggestion {
                technician: tech.id,
                name: tech.name.clone(),
                active_claims,
                rating: tech.rating,
                same_company,
                match_score: match_score(same_company, active_claims, tech.rating),
            }
        })
        .collect();
    out.sort_by(compare);
    out
}

fn compare(a: &Suggestion, b: &Suggestion) -> Ordering {
    b.same_company
        .cmp(&a.same_company)
        .then(a.active_claims.cmp(&b.active_claims))
        .then_with(|| {
            let ra = a.rating.unwrap_or(0.0);
            let rb = b.rating.unwrap_or(0.0);
            rb.partial_cmp(&ra).unwrap_or(Ordering::Equal)
        })
        .then(a.technician.cmp(&b.technician))
}

fn match_score(same_company: bool, active_claims: usize, rating: Option<f64>) -> u32 {
    let company = if same_company { 40 } else { 0 };
    let load = 40u32.saturating_sub(active_claims as u32 * 10);
    let rating = rating
        .map(|value| ((value.clamp(0.0, 5.0) / 5.0) * 20.0).round() as u32)
        .unwrap_or(10);
    company + load + rating
}
