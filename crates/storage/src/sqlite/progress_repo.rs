use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use workshop_core::model::{ProgressRecord, UserId, Workshop};

use super::SqliteRepository;
use super::mapping::{conn, decode_progress, encode_progress, ser, user_id_to_i64};
use crate::legacy::StoredProgress;
use crate::repository::{ProgressRepository, StorageError};

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load_progress(
        &self,
        user: UserId,
        workshop: Workshop,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT progress
            FROM navigation_progress
            WHERE user_id = ?1 AND workshop = ?2
            ",
        )
        .bind(user_id_to_i64(user)?)
        .bind(workshop.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("progress").map_err(ser)?;

        match decode_progress(&raw, workshop, Utc::now())? {
            StoredProgress::Clean(record) => Ok(Some(record)),
            StoredProgress::Recovered { record, salvaged } => {
                tracing::warn!(
                    user_id = %user,
                    workshop = %workshop,
                    salvaged,
                    "loaded progress stored in legacy encoding"
                );
                Ok(Some(record))
            }
            StoredProgress::Unusable => {
                tracing::warn!(
                    user_id = %user,
                    workshop = %workshop,
                    "stored progress is unreadable, ignoring it"
                );
                Ok(None)
            }
        }
    }

    async fn save_progress(
        &self,
        user: UserId,
        record: &ProgressRecord,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO navigation_progress (user_id, workshop, progress, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, workshop) DO UPDATE SET
                progress = excluded.progress,
                updated_at = excluded.updated_at
            ",
        )
        .bind(user_id_to_i64(user)?)
        .bind(record.workshop().as_str())
        .bind(encode_progress(record)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn delete_progress(&self, user: UserId) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM navigation_progress WHERE user_id = ?1")
            .bind(user_id_to_i64(user)?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(result.rows_affected())
    }
}
