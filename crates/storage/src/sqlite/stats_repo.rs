use std::collections::HashMap;

use chrono::{DateTime, Utc};
use quiz_core::model::{Progress, QuestionId, QuestionStats};

use super::{SqliteStore, map_sqlx_err, mapping, with_busy_retry};
use crate::repository::{StatsStore, StorageError};

impl SqliteStore {
    async fn record_attempt_once(
        &self,
        id: QuestionId,
        was_correct: bool,
        seen_at: DateTime<Utc>,
    ) -> Result<QuestionStats, StorageError> {
        let id_i64 = mapping::question_id_to_i64(id)?;
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let row = sqlx::query(
            r"
            SELECT question_id, attempts, successes, weight, last_seen
            FROM question_stats
            WHERE question_id = ?1
            ",
        )
        .bind(id_i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let mut stats = match row {
            Some(row) => mapping::map_stats_row(&row)?.1,
            None => QuestionStats::fresh(self.engine().config().default_weight),
        };

        stats.record(was_correct, seen_at);
        stats.weight = self
            .engine()
            .compute_weight(&stats)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO question_stats (question_id, attempts, successes, weight, last_seen)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(question_id) DO UPDATE SET
                attempts = excluded.attempts,
                successes = excluded.successes,
                weight = excluded.weight,
                last_seen = excluded.last_seen
            ",
        )
        .bind(id_i64)
        .bind(i64::from(stats.attempts))
        .bind(i64::from(stats.successes))
        .bind(stats.weight)
        .bind(stats.last_seen)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(stats)
    }

    async fn advance_chunk_once(
        &self,
        observed: u32,
        max_chunk: u32,
    ) -> Result<Progress, StorageError> {
        let next = Progress::from_persisted(observed).advanced(max_chunk);

        // Compare-and-set against the cursor the caller observed: a concurrent
        // advance that already moved it makes this a no-op, so one mastery
        // event can never move the cursor twice.
        let result = sqlx::query(
            r"
            UPDATE user_progress SET current_chunk = ?2
            WHERE id = 1 AND current_chunk = ?1
            ",
        )
        .bind(i64::from(observed))
        .bind(i64::from(next.current_chunk()))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 1 {
            return Ok(next);
        }
        // Lost the race (or stale observation): report the stored cursor.
        self.progress().await
    }

    async fn get_or_create_once(
        &self,
        id_i64: i64,
        default_weight: f64,
    ) -> Result<QuestionStats, StorageError> {
        sqlx::query(
            r"
            INSERT INTO question_stats (question_id, attempts, successes, weight, last_seen)
            VALUES (?1, 0, 0, ?2, NULL)
            ON CONFLICT(question_id) DO NOTHING
            ",
        )
        .bind(id_i64)
        .bind(default_weight)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let row = sqlx::query(
            r"
            SELECT question_id, attempts, successes, weight, last_seen
            FROM question_stats
            WHERE question_id = ?1
            ",
        )
        .bind(id_i64)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(mapping::map_stats_row(&row)?.1)
    }

    async fn reset_once(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        sqlx::query("DELETE FROM question_stats")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        sqlx::query(
            r"
            INSERT INTO user_progress (id, current_chunk)
            VALUES (1, 0)
            ON CONFLICT(id) DO UPDATE SET current_chunk = 0
            ",
        )
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        tx.commit().await.map_err(map_sqlx_err)
    }
}

#[async_trait::async_trait]
impl StatsStore for SqliteStore {
    async fn get_or_create(&self, id: QuestionId) -> Result<QuestionStats, StorageError> {
        let id_i64 = mapping::question_id_to_i64(id)?;
        let default_weight = self.engine().config().default_weight;

        with_busy_retry(|| self.get_or_create_once(id_i64, default_weight)).await
    }

    async fn record_attempt(
        &self,
        id: QuestionId,
        was_correct: bool,
        seen_at: DateTime<Utc>,
    ) -> Result<QuestionStats, StorageError> {
        with_busy_retry(|| self.record_attempt_once(id, was_correct, seen_at)).await
    }

    async fn all_stats(&self) -> Result<HashMap<QuestionId, QuestionStats>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT question_id, attempts, successes, weight, last_seen
            FROM question_stats
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut stats = HashMap::with_capacity(rows.len());
        for row in &rows {
            let (id, record) = mapping::map_stats_row(row)?;
            stats.insert(id, record);
        }
        Ok(stats)
    }

    async fn progress(&self) -> Result<Progress, StorageError> {
        let row = sqlx::query("SELECT current_chunk FROM user_progress WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        match row {
            Some(row) => {
                use sqlx::Row;
                let raw: i64 = row
                    .try_get("current_chunk")
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                let chunk = u32::try_from(raw)
                    .map_err(|_| StorageError::Corrupt(format!("invalid current_chunk: {raw}")))?;
                Ok(Progress::from_persisted(chunk))
            }
            None => Ok(Progress::start()),
        }
    }

    async fn advance_chunk(&self, observed: u32, max_chunk: u32) -> Result<Progress, StorageError> {
        with_busy_retry(|| self.advance_chunk_once(observed, max_chunk)).await
    }

    async fn reset(&self) -> Result<(), StorageError> {
        with_busy_retry(|| self.reset_once()).await
    }
}
