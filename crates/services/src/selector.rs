use std::collections::HashMap;

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};

use quiz_core::model::{Catalog, Progress, Question, QuestionId, QuestionStats};

use crate::error::SelectError;

/// How many distractors accompany the correct answer when presenting options.
const OPTIONS_PER_QUESTION: usize = 3;

//
// ─── WEIGHTED SELECTION ────────────────────────────────────────────────────────
//

/// Pick the next question to present.
///
/// Candidates are all questions in unlocked chunks (`chunk <= cursor`), each
/// weighted by its current stats record (questions without one use the default
/// weight). Each call samples independently, so questions may repeat across
/// calls; the single most-recently-served question is excluded when more than
/// one candidate exists, as a guard against immediate repetition.
///
/// The random source is injected so tests can pin the sampling.
///
/// # Errors
///
/// Returns `SelectError::EmptyCatalog` when there are no candidates, which is
/// only possible for an empty catalog.
pub fn next_question<'a, R: Rng + ?Sized>(
    catalog: &'a Catalog,
    progress: Progress,
    stats: &HashMap<QuestionId, QuestionStats>,
    default_weight: f64,
    last_served: Option<QuestionId>,
    rng: &mut R,
) -> Result<&'a Question, SelectError> {
    let mut candidates: Vec<(&Question, f64)> = catalog
        .unlocked_questions(progress.current_chunk())
        .map(|q| {
            let weight = stats.get(&q.id()).map_or(default_weight, |s| s.weight);
            (q, weight)
        })
        .collect();

    if candidates.is_empty() {
        return Err(SelectError::EmptyCatalog);
    }

    if candidates.len() > 1 {
        if let Some(last) = last_served {
            candidates.retain(|(q, _)| q.id() != last);
        }
    }

    Ok(pick_weighted(&candidates, rng))
}

/// Sample one candidate with probability proportional to its weight.
///
/// Weights are guaranteed finite and strictly positive by the weight engine,
/// so the cumulative scan always lands on a candidate.
fn pick_weighted<'a, R: Rng + ?Sized>(candidates: &[(&'a Question, f64)], rng: &mut R) -> &'a Question {
    let total: f64 = candidates.iter().map(|(_, w)| w).sum();
    let mut remaining = rng.random_range(0.0..total);

    for (question, weight) in candidates {
        if remaining < *weight {
            return question;
        }
        remaining -= weight;
    }

    // Floating point edge: `remaining` can graze `total`.
    candidates[candidates.len() - 1].0
}

//
// ─── OPTION ASSEMBLY ───────────────────────────────────────────────────────────
//

/// Build the multiple-choice options for a question: up to three random
/// distractors mixed with the correct answer, shuffled.
///
/// Questions authored with fewer distractors simply present fewer options.
#[must_use]
pub fn answer_options<R: Rng + ?Sized>(question: &Question, rng: &mut R) -> Vec<String> {
    let mut options: Vec<String> = question
        .distractors()
        .choose_multiple(rng, OPTIONS_PER_QUESTION)
        .cloned()
        .collect();
    options.push(question.answer().to_owned());
    options.shuffle(rng);
    options
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
