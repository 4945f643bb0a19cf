use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::model::ids::QuestionId;
use crate::model::question::Question;

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

/// The static question set, validated at construction.
///
/// Gate and selection logic assume chunk indices form a contiguous range
/// starting at 0; `Catalog::new` enforces that along with id uniqueness, so
/// downstream code never re-checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    questions: Vec<Question>,
    by_id: HashMap<QuestionId, usize>,
    max_chunk: u32,
}

impl Catalog {
    /// Build a catalog from an imported question set.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Empty` if no questions were supplied
    /// - `CatalogError::DuplicateId` if two questions share an id
    /// - `CatalogError::NonContiguousChunks` if chunk indices have gaps or do
    ///   not start at 0
    pub fn new(questions: Vec<Question>) -> Result<Self, CatalogError> {
        if questions.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut by_id = HashMap::with_capacity(questions.len());
        let mut chunks = BTreeSet::new();
        for (idx, question) in questions.iter().enumerate() {
            if by_id.insert(question.id(), idx).is_some() {
                return Err(CatalogError::DuplicateId { id: question.id() });
            }
            chunks.insert(question.chunk());
        }

        let max_chunk = *chunks.last().expect("catalog is non-empty");
        for (expected, found) in chunks.iter().enumerate() {
            let expected = u32::try_from(expected).expect("chunk count fits in u32");
            if *found != expected {
                return Err(CatalogError::NonContiguousChunks { expected, found: *found });
            }
        }

        Ok(Self {
            questions,
            by_id,
            max_chunk,
        })
    }

    /// Look up a question by id.
    #[must_use]
    pub fn get(&self, id: QuestionId) -> Option<&Question> {
        self.by_id.get(&id).map(|idx| &self.questions[*idx])
    }

    #[must_use]
    pub fn contains(&self, id: QuestionId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// All questions, in import order.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Questions belonging to a single chunk.
    pub fn chunk_questions(&self, chunk: u32) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(move |q| q.chunk() == chunk)
    }

    /// Questions eligible under a cursor: every question whose chunk <= `cursor`.
    pub fn unlocked_questions(&self, cursor: u32) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(move |q| q.chunk() <= cursor)
    }

    /// Highest chunk index present in the catalog.
    #[must_use]
    pub fn max_chunk(&self) -> u32 {
        self.max_chunk
    }

    /// Total number of chunks.
    #[must_use]
    pub fn chunk_count(&self) -> u32 {
        self.max_chunk + 1
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Configuration errors: the engine cannot select questions from a catalog
/// that fails these checks, so they are fatal and never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog contains no questions")]
    Empty,

    #[error("duplicate question id {id}")]
    DuplicateId { id: QuestionId },

    #[error("chunk indices must be contiguous from 0: expected {expected}, found {found}")]
    NonContiguousChunks { expected: u32, found: u32 },
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::question::QuestionDraft;

    fn question(id: u64, chunk: u32) -> Question {
        QuestionDraft {
            prompt: format!("Q{id}"),
            answer: format!("A{id}"),
            distractors: vec!["x".into(), "y".into(), "z".into()],
            chunk,
        }
        .validate(QuestionId::new(id))
        .unwrap()
    }

    #[test]
    fn new_rejects_empty_set() {
        let err = Catalog::new(Vec::new()).unwrap_err();
        assert_eq!(err, CatalogError::Empty);
    }

    #[test]
    fn new_rejects_duplicate_ids() {
        let err = Catalog::new(vec![question(1, 0), question(1, 0)]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId { id } if id == QuestionId::new(1)));
    }

    #[test]
    fn new_rejects_chunk_gap() {
        let err = Catalog::new(vec![question(1, 0), question(2, 2)]).unwrap_err();
        assert_eq!(
            err,
            CatalogError::NonContiguousChunks {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn new_rejects_chunks_not_starting_at_zero() {
        let err = Catalog::new(vec![question(1, 1)]).unwrap_err();
        assert_eq!(
            err,
            CatalogError::NonContiguousChunks {
                expected: 0,
                found: 1
            }
        );
    }

    #[test]
    fn unlocked_questions_respects_cursor() {
        let catalog = Catalog::new(vec![
            question(1, 0),
            question(2, 0),
            question(3, 1),
            question(4, 2),
        ])
        .unwrap();

        let unlocked: Vec<_> = catalog.unlocked_questions(1).map(Question::id).collect();
        assert_eq!(
            unlocked,
            vec![QuestionId::new(1), QuestionId::new(2), QuestionId::new(3)]
        );
        assert_eq!(catalog.max_chunk(), 2);
        assert_eq!(catalog.chunk_count(), 3);
    }

    #[test]
    fn get_finds_question_by_id() {
        let catalog = Catalog::new(vec![question(7, 0)]).unwrap();
        assert!(catalog.get(QuestionId::new(7)).is_some());
        assert!(catalog.get(QuestionId::new(8)).is_none());
    }
}
