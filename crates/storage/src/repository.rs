use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{Catalog, CatalogError, Progress, Question, QuestionId, QuestionStats};
use quiz_core::weights::WeightEngine;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Transient lock contention. Retried boundedly at the store boundary;
    /// if it still surfaces, the caller must not assume the write landed.
    #[error("store is busy: {0}")]
    Busy(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Persisted data violates a domain invariant. Fatal, never retried.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Repository contract for the static question catalog.
///
/// The catalog is written by import tooling and read-only to the engine, so
/// the load path returns a fully validated `Catalog` value.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Persist or replace a question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Load and validate the full catalog.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Catalog` if the stored set fails catalog
    /// validation (empty, duplicate ids, chunk gaps), or other storage errors.
    async fn load_catalog(&self) -> Result<Catalog, StorageError>;
}

/// Durable per-question performance counters plus the single progress cursor.
///
/// Every mutation executes as one atomic unit with respect to a concurrent
/// caller: a transaction for SQLite, one mutex critical section in memory.
/// No implementation holds a lock across calls.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Fetch a question's stats, creating and persisting the default record
    /// if none exists yet (explicit lazy-insert contract).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be read or created.
    async fn get_or_create(&self, id: QuestionId) -> Result<QuestionStats, StorageError>;

    /// Atomically fold one answered attempt into a question's record:
    /// increment `attempts` (and `successes` if correct), recompute the weight
    /// through the weight engine, and stamp `last_seen`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Busy` if retries on a locked store exhaust, or
    /// other storage errors. On error no counters have changed.
    async fn record_attempt(
        &self,
        id: QuestionId,
        was_correct: bool,
        seen_at: DateTime<Utc>,
    ) -> Result<QuestionStats, StorageError>;

    /// Snapshot of all stats records, for gate evaluation and overviews.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the records cannot be read.
    async fn all_stats(&self) -> Result<HashMap<QuestionId, QuestionStats>, StorageError>;

    /// Read the progress cursor.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cursor cannot be read.
    async fn progress(&self) -> Result<Progress, StorageError>;

    /// Move the cursor one chunk forward from `observed`, saturating at
    /// `max_chunk`. Compare-and-set: if the stored cursor no longer matches
    /// `observed` (a concurrent advance won), nothing moves and the stored
    /// cursor is returned, so one mastery event never advances twice.
    /// Idempotent no-op in the terminal state; the cursor never regresses.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cursor cannot be written.
    async fn advance_chunk(&self, observed: u32, max_chunk: u32) -> Result<Progress, StorageError>;

    /// Clear all stats and return the cursor to chunk 0.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the reset cannot be applied.
    async fn reset(&self) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

#[derive(Default)]
struct InMemoryState {
    questions: HashMap<QuestionId, Question>,
    stats: HashMap<QuestionId, QuestionStats>,
    progress: Progress,
}

/// Simple in-memory store for testing and prototyping.
///
/// A single mutex makes each operation atomic, which is all the single-writer
/// model requires.
#[derive(Clone)]
pub struct InMemoryStore {
    engine: Arc<WeightEngine>,
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new(engine: WeightEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            state: Arc::new(Mutex::new(InMemoryState::default())),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.questions.insert(question.id(), question.clone());
        Ok(())
    }

    async fn load_catalog(&self) -> Result<Catalog, StorageError> {
        let guard = self.lock()?;
        let mut questions: Vec<Question> = guard.questions.values().cloned().collect();
        questions.sort_by_key(Question::id);
        Ok(Catalog::new(questions)?)
    }
}

#[async_trait]
impl StatsStore for InMemoryStore {
    async fn get_or_create(&self, id: QuestionId) -> Result<QuestionStats, StorageError> {
        let default_weight = self.engine.config().default_weight;
        let mut guard = self.lock()?;
        let stats = guard
            .stats
            .entry(id)
            .or_insert_with(|| QuestionStats::fresh(default_weight));
        Ok(stats.clone())
    }

    async fn record_attempt(
        &self,
        id: QuestionId,
        was_correct: bool,
        seen_at: DateTime<Utc>,
    ) -> Result<QuestionStats, StorageError> {
        let default_weight = self.engine.config().default_weight;
        let mut guard = self.lock()?;
        let stats = guard
            .stats
            .entry(id)
            .or_insert_with(|| QuestionStats::fresh(default_weight));

        let mut updated = stats.clone();
        updated.record(was_correct, seen_at);
        updated.weight = self
            .engine
            .compute_weight(&updated)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        *stats = updated.clone();
        Ok(updated)
    }

    async fn all_stats(&self) -> Result<HashMap<QuestionId, QuestionStats>, StorageError> {
        Ok(self.lock()?.stats.clone())
    }

    async fn progress(&self) -> Result<Progress, StorageError> {
        Ok(self.lock()?.progress)
    }

    async fn advance_chunk(&self, observed: u32, max_chunk: u32) -> Result<Progress, StorageError> {
        let mut guard = self.lock()?;
        if guard.progress.current_chunk() == observed {
            guard.progress = guard.progress.advanced(max_chunk);
        }
        Ok(guard.progress)
    }

    async fn reset(&self) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.stats.clear();
        guard.progress = Progress::start();
        Ok(())
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates the catalog and stats repositories behind trait objects for
/// easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub stats: Arc<dyn StatsStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory(engine: WeightEngine) -> Self {
        let store = InMemoryStore::new(engine);
        let catalog: Arc<dyn CatalogRepository> = Arc::new(store.clone());
        let stats: Arc<dyn StatsStore> = Arc::new(store);
        Self { catalog, stats }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::QuestionDraft;
    use quiz_core::time::fixed_now;

    fn build_question(id: u64, chunk: u32) -> Question {
        QuestionDraft {
            prompt: format!("Q{id}"),
            answer: format!("A{id}"),
            distractors: vec!["a".into(), "b".into(), "c".into()],
            chunk,
        }
        .validate(QuestionId::new(id))
        .unwrap()
    }

    #[tokio::test]
    async fn catalog_round_trips_questions() {
        let store = InMemoryStore::new(WeightEngine::new());
        store.upsert_question(&build_question(1, 0)).await.unwrap();
        store.upsert_question(&build_question(2, 0)).await.unwrap();
        store.upsert_question(&build_question(3, 1)).await.unwrap();

        let catalog = store.load_catalog().await.unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.max_chunk(), 1);
    }

    #[tokio::test]
    async fn load_catalog_rejects_chunk_gaps() {
        let store = InMemoryStore::new(WeightEngine::new());
        store.upsert_question(&build_question(1, 0)).await.unwrap();
        store.upsert_question(&build_question(2, 2)).await.unwrap();

        let err = store.load_catalog().await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Catalog(CatalogError::NonContiguousChunks { .. })
        ));
    }

    #[tokio::test]
    async fn get_or_create_persists_the_default_record() {
        let store = InMemoryStore::new(WeightEngine::new());
        let id = QuestionId::new(7);

        let first = store.get_or_create(id).await.unwrap();
        assert_eq!(first.attempts, 0);
        assert_eq!(first.weight, 10.0);

        let snapshot = store.all_stats().await.unwrap();
        assert!(snapshot.contains_key(&id));
    }

    #[tokio::test]
    async fn record_attempt_updates_counters_and_weight() {
        let store = InMemoryStore::new(WeightEngine::new());
        let id = QuestionId::new(1);
        let now = fixed_now();

        let after_success = store.record_attempt(id, true, now).await.unwrap();
        assert_eq!(after_success.attempts, 1);
        assert_eq!(after_success.successes, 1);
        assert!(after_success.weight < 10.0);
        assert_eq!(after_success.last_seen, Some(now));

        let after_failure = store.record_attempt(id, false, now).await.unwrap();
        assert_eq!(after_failure.attempts, 2);
        assert_eq!(after_failure.successes, 1);
        assert!(after_failure.successes <= after_failure.attempts);
    }

    #[tokio::test]
    async fn advance_chunk_saturates_and_never_regresses() {
        let store = InMemoryStore::new(WeightEngine::new());

        assert_eq!(store.progress().await.unwrap().current_chunk(), 0);
        assert_eq!(store.advance_chunk(0, 2).await.unwrap().current_chunk(), 1);
        assert_eq!(store.advance_chunk(1, 2).await.unwrap().current_chunk(), 2);
        // Terminal: advancing past the last chunk is a no-op.
        assert_eq!(store.advance_chunk(2, 2).await.unwrap().current_chunk(), 2);
    }

    #[tokio::test]
    async fn advance_chunk_ignores_stale_observations() {
        let store = InMemoryStore::new(WeightEngine::new());

        assert_eq!(store.advance_chunk(0, 3).await.unwrap().current_chunk(), 1);
        // A second caller that also observed chunk 0 lost the race: the
        // cursor must stay where the winner put it, not move again.
        assert_eq!(store.advance_chunk(0, 3).await.unwrap().current_chunk(), 1);
        assert_eq!(store.progress().await.unwrap().current_chunk(), 1);
    }

    #[tokio::test]
    async fn reset_clears_stats_and_cursor_but_keeps_questions() {
        let store = InMemoryStore::new(WeightEngine::new());
        store.upsert_question(&build_question(1, 0)).await.unwrap();
        store
            .record_attempt(QuestionId::new(1), true, fixed_now())
            .await
            .unwrap();
        store.advance_chunk(0, 3).await.unwrap();

        store.reset().await.unwrap();

        assert!(store.all_stats().await.unwrap().is_empty());
        assert_eq!(store.progress().await.unwrap().current_chunk(), 0);
        assert_eq!(store.load_catalog().await.unwrap().len(), 1);
    }
}
