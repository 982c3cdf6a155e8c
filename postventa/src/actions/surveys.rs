//! Satisfaction surveys answered by owners.

use serde::Deserialize;
use tracing::info;

use super::{ActionError, Ctx, claim_ref, require_claim_owner};
use crate::core::types::{ClaimId, SurveyId};
use crate::model::{Store, Survey};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SurveyAnswers {
    pub score: u8,
    pub technician_score: Option<u8>,
    pub timeliness_score: Option<u8>,
    pub solution_score: Option<u8>,
    pub comments: Option<String>,
}

fn check_score(name: &str, score: u8) -> Result<(), ActionError> {
    if (1..=5).contains(&score) {
        Ok(())
    } else {
        Err(ActionError::Invalid(format!(
            "{name} must be between 1 and 5, got {score}"
        )))
    }
}

/// Answer the survey of a resolved claim, once.
///
/// The technician's rating becomes the running mean of answered surveys,
/// using the technician score when given and the overall score otherwise.
pub fn submit_survey(
    store: &mut Store,
    ctx: &Ctx<'_>,
    claim_id: ClaimId,
    answers: SurveyAnswers,
) -> Result<SurveyId, ActionError> {
    let claim = claim_ref(store, claim_id)?;
    require_claim_owner(ctx, claim)?;
    if !claim.status.is_resolved() {
        return Err(ActionError::Conflict(format!(
            "claim {} is not resolved yet",
            claim.folio
        )));
    }
    check_score("score", answers.score)?;
    for (name, score) in [
        ("technician_score", answers.technician_score),
        ("timeliness_score", answers.timeliness_score),
        ("solution_score", answers.solution_score),
    ] {
        if let Some(score) = score {
            check_score(name, score)?;
        }
    }
    let existing = store.surveys.iter().find(|survey| survey.claim == claim_id);
    if existing.is_some_and(|survey| survey.answered_at.is_some()) {
        return Err(ActionError::Conflict(format!(
            "survey for {} was already answered",
            claim.folio
        )));
    }
    let technician = claim.technician;
    let existing = existing.map(|survey| survey.id);

    let id = match existing {
        Some(id) => id,
        None => {
            let id = store.next_survey_id();
            store.surveys.push(Survey {
                id,
                claim: claim_id,
                visit: None,
                score: None,
                technician_score: None,
                timeliness_score: None,
                solution_score: None,
                comments: None,
                answered_at: None,
            });
            id
        }
    };
    let rated = answers.technician_score.unwrap_or(answers.score);
    if let Some(survey) = store.survey_mut(id) {
        survey.score = Some(answers.score);
        survey.technician_score = answers.technician_score;
        survey.timeliness_score = answers.timeliness_score;
        survey.solution_score = answers.solution_score;
        survey.comments = answers.comments.filter(|c| !c.trim().is_empty());
        survey.answered_at = Some(ctx.now);
    }
    if let Some(tech) = technician.and_then(|id| store.technician_mut(id)) {
        let count = f64::from(tech.rating_count);
        let mean = tech.rating.unwrap_or(0.0);
        tech.rating = Some((mean * count + f64::from(rated)) / (count + 1.0));
        tech.rating_count += 1;
    }
    info!(survey = %id, claim = %claim_id, score = answers.score, "survey answered");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Actor;
    use crate::core::types::{AccountId, OwnerId, TechnicianId};
    use crate::io::config::PostventaConfig;
    use crate::test_support::{fixed_now, sample_store};

    fn owner() -> Actor {
        Actor::Owner {
            account: AccountId(2),
            owner: OwnerId(1),
        }
    }

    fn pending_survey_for_claim_4(store: &mut Store) {
        let survey = store
            .surveys
            .iter_mut()
            .find(|s| s.claim == ClaimId(4))
            .expect("survey");
        survey.score = None;
        survey.technician_score = None;
        survey.answered_at = None;
    }

    #[test]
    fn answering_updates_technician_rating() {
        let mut store = sample_store();
        pending_survey_for_claim_4(&mut store);
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), owner());
        submit_survey(
            &mut store,
            &ctx,
            ClaimId(4),
            SurveyAnswers {
                score: 4,
                technician_score: Some(3),
                ..SurveyAnswers::default()
            },
        )
        .expect("submit");
        let tech = store.technician(TechnicianId(1)).expect("technician");
        assert_eq!(tech.rating_count, 3);
        let rating = tech.rating.expect("rating");
        assert!((rating - 4.0).abs() < 1e-9);
    }

    #[test]
    fn second_answer_conflicts() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), owner());
        let err = submit_survey(
            &mut store,
            &ctx,
            ClaimId(1),
            SurveyAnswers {
                score: 5,
                ..SurveyAnswers::default()
            },
        )
        .expect_err("already answered");
        assert!(matches!(err, ActionError::Conflict(_)));
    }

    #[test]
    fn open_claims_and_bad_scores_are_rejected() {
        let mut store = sample_store();
        let cfg = PostventaConfig::default();
        let ctx = Ctx::new(&cfg, fixed_now(), owner());
        assert!(matches!(
            submit_survey(
                &mut store,
                &ctx,
                ClaimId(2),
                SurveyAnswers {
                    score: 5,
                    ..SurveyAnswers::default()
                }
            ),
            Err(ActionError::Conflict(_))
        ));
        pending_survey_for_claim_4(&mut store);
        assert!(matches!(
            submit_survey(
                &mut store,
                &ctx,
                ClaimId(4),
                SurveyAnswers {
                    score: 6,
                    ..SurveyAnswers::default()
                }
            ),
            Err(ActionError::Invalid(_))
        ));
    }
}
