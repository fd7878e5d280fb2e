use quiz_core::model::HistoryEntry;

use super::SqliteRepository;
use super::mapping::{conn, map_history_row};
use crate::repository::{HistoryRepository, HistoryRow, StorageError};

#[async_trait::async_trait]
impl HistoryRepository for SqliteRepository {
    async fn append_entry(&self, entry: &HistoryEntry) -> Result<i64, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO quiz_history (
                    topic, correct_answers, total_questions, completed_at
                )
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(entry.topic())
        .bind(i64::from(entry.correct_answers()))
        .bind(i64::from(entry.total_questions()))
        .bind(entry.completed_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = res.last_insert_rowid();
        tracing::debug!(id, topic = entry.topic(), "appended history entry");
        Ok(id)
    }

    async fn get_entry(&self, id: i64) -> Result<HistoryEntry, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, topic, correct_answers, total_questions, completed_at
                FROM quiz_history
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        Ok(map_history_row(&row)?.entry)
    }

    async fn entries_for_topic(&self, topic: &str) -> Result<Vec<HistoryEntry>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, topic, correct_answers, total_questions, completed_at
                FROM quiz_history
                WHERE topic = ?1 COLLATE NOCASE
                ORDER BY completed_at ASC, id ASC
            ",
        )
        .bind(topic.trim())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_history_row(&row)?.entry);
        }
        Ok(out)
    }

    async fn latest_for_topic(&self, topic: &str) -> Result<Option<HistoryEntry>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, topic, correct_answers, total_questions, completed_at
                FROM quiz_history
                WHERE topic = ?1 COLLATE NOCASE
                ORDER BY completed_at DESC, id DESC
                LIMIT 1
            ",
        )
        .bind(topic.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.map(|row| map_history_row(&row).map(|r| r.entry))
            .transpose()
    }

    async fn list_rows(&self, limit: u32) -> Result<Vec<HistoryRow>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, topic, correct_answers, total_questions, completed_at
                FROM quiz_history
                ORDER BY completed_at DESC, id DESC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_history_row(&row)?);
        }
        Ok(out)
    }
}
