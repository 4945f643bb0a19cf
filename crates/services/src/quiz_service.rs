use std::sync::{Arc, Mutex};

use rand::Rng;

use quiz_core::config::EngineConfig;
use quiz_core::gate::ChunkGate;
use quiz_core::model::{Catalog, Question, QuestionId};
use quiz_core::time::Clock;
use storage::repository::StatsStore;

use crate::error::QuizServiceError;
use crate::selector;

//
// ─── OUTCOME ───────────────────────────────────────────────────────────────────
//

/// Result of one submitted answer, for UI feedback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub was_correct: bool,
    pub new_weight: f64,
    pub chunk_advanced: bool,
}

//
// ─── OVERVIEWS ─────────────────────────────────────────────────────────────────
//

/// One attempted question's counters, for the stats overview.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsLine {
    pub id: QuestionId,
    pub prompt: String,
    pub attempts: u32,
    pub successes: u32,
    pub success_rate: f64,
    pub weight: f64,
}

/// Rollup of one unlocked chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkProgress {
    pub chunk: u32,
    pub total_questions: usize,
    /// Mean success rate over questions past the confidence threshold.
    pub average_success_rate: f64,
    /// Questions answered often enough for their rate to be trusted.
    pub confident: usize,
}

/// Learning progress across all unlocked chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressOverview {
    pub current_chunk: u32,
    pub total_chunks: u32,
    pub unlocked_questions: usize,
    pub chunks: Vec<ChunkProgress>,
}

//
// ─── QUIZ SERVICE ──────────────────────────────────────────────────────────────
//

/// Coordinates a quiz session: serves the next question and records answers.
///
/// `submit_answer` is the session recorder: it grades the answer, folds it
/// into the stats store, then re-evaluates the chunk gate, which may move the
/// cursor and change the eligible set for the next `next_question` call.
/// Those two store mutations are its only side effects.
pub struct QuizService {
    clock: Clock,
    catalog: Catalog,
    stats: Arc<dyn StatsStore>,
    gate: ChunkGate,
    config: EngineConfig,
    last_served: Mutex<Option<QuestionId>>,
}

impl QuizService {
    /// Create a service with the default engine tuning.
    ///
    /// The stats store must have been built with the same tuning so the
    /// weights it computes and the gate thresholds agree.
    #[must_use]
    pub fn new(catalog: Catalog, stats: Arc<dyn StatsStore>) -> Self {
        Self::with_config(catalog, stats, EngineConfig::default())
            .expect("default engine config should be valid")
    }

    /// Create a service with custom tuning without panicking.
    ///
    /// # Errors
    ///
    /// Returns the config validation error if the tuning is invalid.
    pub fn with_config(
        catalog: Catalog,
        stats: Arc<dyn StatsStore>,
        config: EngineConfig,
    ) -> Result<Self, quiz_core::weights::WeightError> {
        let gate = ChunkGate::with_config(config)?;
        Ok(Self {
            clock: Clock::default(),
            catalog,
            stats,
            gate,
            config,
            last_served: Mutex::new(None),
        })
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Pick the next question to present.
    ///
    /// Samples from the unlocked chunks proportionally to weight, skipping the
    /// question served immediately before when possible. The selected
    /// question's stats record is created on first selection so it shows up in
    /// snapshots from then on.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::Select` for an empty catalog, or storage
    /// errors.
    pub async fn next_question<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Question, QuizServiceError> {
        let progress = self.stats.progress().await?;
        let snapshot = self.stats.all_stats().await?;
        let last = self.last_served();

        let question = selector::next_question(
            &self.catalog,
            progress,
            &snapshot,
            self.config.default_weight,
            last,
            rng,
        )?
        .clone();

        self.stats.get_or_create(question.id()).await?;
        self.set_last_served(Some(question.id()));

        Ok(question)
    }

    /// Grade a submitted answer and fold it into the learner's history.
    ///
    /// Correctness is an exact match after normalization (trimmed, lowercased,
    /// inner whitespace collapsed). An unknown question id is rejected before
    /// any state changes.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::QuestionNotFound` for an unknown id, or
    /// storage errors. On a storage error the caller must not assume the
    /// attempt was recorded.
    pub async fn submit_answer(
        &self,
        id: QuestionId,
        answer: &str,
    ) -> Result<Outcome, QuizServiceError> {
        let question = self
            .catalog
            .get(id)
            .ok_or(QuizServiceError::QuestionNotFound { id })?;

        let was_correct = answers_match(question.answer(), answer);
        let updated = self
            .stats
            .record_attempt(id, was_correct, self.clock.now())
            .await?;

        let progress = self.stats.progress().await?;
        let snapshot = self.stats.all_stats().await?;
        let decision = self.gate.evaluate(progress, &self.catalog, &snapshot);

        let chunk_advanced = decision.advanced;
        if chunk_advanced {
            // Compare-and-set on the cursor this call observed, so an
            // overlapping submission that saw the same mastered chunk cannot
            // advance it a second time.
            self.stats
                .advance_chunk(progress.current_chunk(), self.catalog.max_chunk())
                .await?;
        }

        Ok(Outcome {
            was_correct,
            new_weight: updated.weight,
            chunk_advanced,
        })
    }

    /// Clear all performance history and return to chunk 0.
    ///
    /// # Errors
    ///
    /// Returns storage errors if the reset cannot be applied.
    pub async fn reset(&self) -> Result<(), QuizServiceError> {
        self.stats.reset().await?;
        self.set_last_served(None);
        Ok(())
    }

    /// Attempted questions ordered by weight descending (hardest first).
    ///
    /// # Errors
    ///
    /// Returns storage errors if the stats cannot be read.
    pub async fn stats_overview(&self) -> Result<Vec<StatsLine>, QuizServiceError> {
        let snapshot = self.stats.all_stats().await?;

        let mut lines: Vec<StatsLine> = snapshot
            .iter()
            .filter(|(_, s)| s.attempts > 0)
            .filter_map(|(id, s)| {
                self.catalog.get(*id).map(|q| StatsLine {
                    id: *id,
                    prompt: q.prompt().to_owned(),
                    attempts: s.attempts,
                    successes: s.successes,
                    success_rate: s.success_rate(),
                    weight: s.weight,
                })
            })
            .collect();

        lines.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(lines)
    }

    /// Per-chunk rollup over the unlocked prefix.
    ///
    /// # Errors
    ///
    /// Returns storage errors if the stats or cursor cannot be read.
    pub async fn progress_overview(&self) -> Result<ProgressOverview, QuizServiceError> {
        let progress = self.stats.progress().await?;
        let snapshot = self.stats.all_stats().await?;

        let mut chunks = Vec::new();
        for chunk in 0..=progress.current_chunk() {
            let mut total = 0usize;
            let mut confident = 0usize;
            let mut rate_sum = 0.0;

            for question in self.catalog.chunk_questions(chunk) {
                total += 1;
                if let Some(stats) = snapshot.get(&question.id()) {
                    if stats.attempts >= self.config.confidence_threshold {
                        confident += 1;
                        rate_sum += stats.success_rate();
                    }
                }
            }

            let average_success_rate = if confident > 0 {
                rate_sum / confident as f64
            } else {
                0.0
            };

            chunks.push(ChunkProgress {
                chunk,
                total_questions: total,
                average_success_rate,
                confident,
            });
        }

        Ok(ProgressOverview {
            current_chunk: progress.current_chunk(),
            total_chunks: self.catalog.chunk_count(),
            unlocked_questions: self
                .catalog
                .unlocked_questions(progress.current_chunk())
                .count(),
            chunks,
        })
    }

    fn last_served(&self) -> Option<QuestionId> {
        *self
            .last_served
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_last_served(&self, id: Option<QuestionId>) {
        *self
            .last_served
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = id;
    }
}

/// Exact-match grading after normalization: surrounding whitespace trimmed,
/// inner whitespace collapsed, case folded. No partial credit.
#[must_use]
pub fn answers_match(expected: &str, submitted: &str) -> bool {
    normalize(expected) == normalize(submitted)
}

fn normalize(answer: &str) -> String {
    answer
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::QuestionDraft;
    use quiz_core::time::fixed_clock;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use storage::repository::{InMemoryStore, StatsStore};

    fn build_catalog(chunk_sizes: &[usize]) -> Catalog {
        let mut questions = Vec::new();
        let mut id = 1u64;
        for (chunk, size) in chunk_sizes.iter().enumerate() {
            for _ in 0..*size {
                questions.push(
                    QuestionDraft {
                        prompt: format!("Prompt {id}"),
                        answer: format!("Answer {id}"),
                        distractors: vec!["w1".into(), "w2".into(), "w3".into()],
                        chunk: u32::try_from(chunk).unwrap(),
                    }
                    .validate(QuestionId::new(id))
                    .unwrap(),
                );
                id += 1;
            }
        }
        Catalog::new(questions).unwrap()
    }

    fn build_service(chunk_sizes: &[usize]) -> QuizService {
        let store = InMemoryStore::new(quiz_core::weights::WeightEngine::new());
        QuizService::new(build_catalog(chunk_sizes), Arc::new(store)).with_clock(fixed_clock())
    }

    #[test]
    fn answers_match_normalizes_case_and_whitespace() {
        assert!(answers_match("Mexico City", "  mexico   CITY "));
        assert!(answers_match("4", "4"));
        assert!(!answers_match("Mexico City", "Mexicocity"));
        assert!(!answers_match("4", "5"));
    }

    #[tokio::test]
    async fn correct_answer_lowers_weight_and_reports_it() {
        let service = build_service(&[2]);
        let id = QuestionId::new(1);

        let outcome = service.submit_answer(id, "Answer 1").await.unwrap();
        assert!(outcome.was_correct);
        assert!(outcome.new_weight < 10.0);
        assert!(!outcome.chunk_advanced);
    }

    #[tokio::test]
    async fn wrong_answer_is_graded_incorrect() {
        let service = build_service(&[2]);
        let outcome = service
            .submit_answer(QuestionId::new(1), "nonsense")
            .await
            .unwrap();
        assert!(!outcome.was_correct);
        assert_eq!(outcome.new_weight, 10.0);
    }

    #[tokio::test]
    async fn unknown_question_is_rejected_without_mutation() {
        let service = build_service(&[2]);

        // Seed one legitimate attempt so there is state to protect.
        service
            .submit_answer(QuestionId::new(1), "Answer 1")
            .await
            .unwrap();

        let err = service
            .submit_answer(QuestionId::new(99), "anything")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QuizServiceError::QuestionNotFound { id } if id == QuestionId::new(99)
        ));

        let snapshot = service.stats.all_stats().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&QuestionId::new(1)).unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn next_question_never_repeats_immediately() {
        let service = build_service(&[3]);
        let mut rng = StdRng::seed_from_u64(17);

        let mut previous = service.next_question(&mut rng).await.unwrap().id();
        for _ in 0..50 {
            let current = service.next_question(&mut rng).await.unwrap().id();
            assert_ne!(current, previous);
            previous = current;
        }
    }

    #[tokio::test]
    async fn next_question_persists_a_default_record_on_first_selection() {
        let service = build_service(&[1]);
        let mut rng = StdRng::seed_from_u64(1);

        let question = service.next_question(&mut rng).await.unwrap();
        let snapshot = service.stats.all_stats().await.unwrap();
        let stats = snapshot.get(&question.id()).unwrap();
        assert_eq!(stats.attempts, 0);
        assert_eq!(stats.weight, 10.0);
    }

    #[tokio::test]
    async fn mastering_chunk_zero_unlocks_chunk_one() {
        let service = build_service(&[10, 10]);
        let mut advanced_on = None;

        for round in 0..3 {
            for id in 1u64..=10 {
                let outcome = service
                    .submit_answer(QuestionId::new(id), &format!("Answer {id}"))
                    .await
                    .unwrap();
                if outcome.chunk_advanced {
                    advanced_on = Some((round, id));
                }
            }
        }

        assert!(advanced_on.is_some(), "chunk never advanced");
        let overview = service.progress_overview().await.unwrap();
        assert_eq!(overview.current_chunk, 1);
        assert_eq!(overview.total_chunks, 2);
        assert_eq!(overview.unlocked_questions, 20);
    }

    #[tokio::test]
    async fn overlapping_submissions_advance_the_cursor_once() {
        let catalog = build_catalog(&[1, 1, 1]);
        let store = InMemoryStore::new(quiz_core::weights::WeightEngine::new());
        let gate = ChunkGate::new();

        // Master chunk 0.
        for _ in 0..3 {
            store
                .record_attempt(QuestionId::new(1), true, quiz_core::time::fixed_now())
                .await
                .unwrap();
        }

        // Two interleaved submissions both observe the pre-advance cursor and
        // both find the chunk mastered before either applies its advance.
        let observed_a = store.progress().await.unwrap();
        let observed_b = store.progress().await.unwrap();
        let snapshot = store.all_stats().await.unwrap();
        let decision_a = gate.evaluate(observed_a, &catalog, &snapshot);
        let decision_b = gate.evaluate(observed_b, &catalog, &snapshot);
        assert!(decision_a.advanced);
        assert!(decision_b.advanced);

        store
            .advance_chunk(observed_a.current_chunk(), catalog.max_chunk())
            .await
            .unwrap();
        store
            .advance_chunk(observed_b.current_chunk(), catalog.max_chunk())
            .await
            .unwrap();

        // One mastery event moves the cursor one chunk: chunk 1 is now
        // active and chunk 2 stays locked.
        assert_eq!(store.progress().await.unwrap().current_chunk(), 1);
    }

    #[tokio::test]
    async fn failing_answers_keep_the_chunk_locked() {
        let service = build_service(&[2, 2]);

        for _ in 0..3 {
            for id in 1u64..=2 {
                service
                    .submit_answer(QuestionId::new(id), "wrong")
                    .await
                    .unwrap();
            }
        }

        let overview = service.progress_overview().await.unwrap();
        assert_eq!(overview.current_chunk, 0);
    }

    #[tokio::test]
    async fn stats_overview_orders_hardest_first() {
        let service = build_service(&[3]);

        // Question 1 fails three times, question 2 succeeds three times.
        for _ in 0..3 {
            service
                .submit_answer(QuestionId::new(1), "wrong")
                .await
                .unwrap();
            service
                .submit_answer(QuestionId::new(2), "Answer 2")
                .await
                .unwrap();
        }

        let lines = service.stats_overview().await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].id, QuestionId::new(1));
        assert_eq!(lines[0].weight, 10.0);
        assert!(lines[1].weight < lines[0].weight);
        assert_eq!(lines[1].successes, 3);
    }

    #[tokio::test]
    async fn reset_returns_to_a_fresh_run() {
        let service = build_service(&[1, 1]);
        for _ in 0..3 {
            service
                .submit_answer(QuestionId::new(1), "Answer 1")
                .await
                .unwrap();
        }
        assert_eq!(
            service.progress_overview().await.unwrap().current_chunk,
            1
        );

        service.reset().await.unwrap();

        let overview = service.progress_overview().await.unwrap();
        assert_eq!(overview.current_chunk, 0);
        assert!(service.stats_overview().await.unwrap().is_empty());
        assert_eq!(service.last_served(), None);
    }
}
