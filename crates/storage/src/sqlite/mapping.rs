use chrono::{DateTime, Utc};
use quiz_core::model::HistoryEntry;
use sqlx::Row;

use crate::repository::{HistoryRow, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn map_history_row(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    let topic: String = row.try_get("topic").map_err(ser)?;
    let correct_answers = u32_from_i64(
        "correct_answers",
        row.try_get::<i64, _>("correct_answers").map_err(ser)?,
    )?;
    let total_questions = u32_from_i64(
        "total_questions",
        row.try_get::<i64, _>("total_questions").map_err(ser)?,
    )?;
    let completed_at: DateTime<Utc> = row.try_get("completed_at").map_err(ser)?;

    let entry = HistoryEntry::new(topic, correct_answers, total_questions, completed_at)
        .map_err(ser)?;
    Ok(HistoryRow::new(id, entry))
}
