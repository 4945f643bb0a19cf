use quiz_core::model::{Question, QuestionId, QuestionStats};
use sqlx::Row;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn question_id_to_i64(id: QuestionId) -> Result<i64, StorageError> {
    i64::try_from(id.value())
        .map_err(|_| StorageError::Serialization("question_id overflow".into()))
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let id = question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let distractors: Vec<String> =
        serde_json::from_str(row.try_get::<String, _>("distractors").map_err(ser)?.as_str())
            .map_err(ser)?;
    let chunk = i64_to_u32("chunk_number", row.try_get::<i64, _>("chunk_number").map_err(ser)?)?;

    Question::from_persisted(
        id,
        row.try_get("prompt").map_err(ser)?,
        row.try_get("answer").map_err(ser)?,
        distractors,
        chunk,
    )
    .map_err(|e| StorageError::Corrupt(e.to_string()))
}

pub(crate) fn map_stats_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(QuestionId, QuestionStats), StorageError> {
    let id = question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?;
    let attempts = i64_to_u32("attempts", row.try_get::<i64, _>("attempts").map_err(ser)?)?;
    let successes = i64_to_u32("successes", row.try_get::<i64, _>("successes").map_err(ser)?)?;

    let stats = QuestionStats::from_persisted(
        id,
        attempts,
        successes,
        row.try_get("weight").map_err(ser)?,
        row.try_get("last_seen").map_err(ser)?,
    )
    .map_err(|e| StorageError::Corrupt(e.to_string()))?;

    Ok((id, stats))
}
