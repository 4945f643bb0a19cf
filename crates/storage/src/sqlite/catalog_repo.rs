use quiz_core::model::{Catalog, Question};

use super::{SqliteStore, map_sqlx_err, mapping, with_busy_retry};
use crate::repository::{CatalogRepository, StorageError};

impl SqliteStore {
    async fn upsert_question_once(
        &self,
        question: &Question,
        distractors: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO questions (id, prompt, answer, distractors, chunk_number)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                prompt = excluded.prompt,
                answer = excluded.answer,
                distractors = excluded.distractors,
                chunk_number = excluded.chunk_number
            ",
        )
        .bind(mapping::question_id_to_i64(question.id())?)
        .bind(question.prompt())
        .bind(question.answer())
        .bind(distractors)
        .bind(i64::from(question.chunk()))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqliteStore {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let distractors = serde_json::to_string(question.distractors())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        with_busy_retry(|| self.upsert_question_once(question, &distractors)).await
    }

    async fn load_catalog(&self) -> Result<Catalog, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, prompt, answer, distractors, chunk_number
            FROM questions
            ORDER BY chunk_number ASC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in &rows {
            questions.push(mapping::map_question_row(row)?);
        }

        Ok(Catalog::new(questions)?)
    }
}
