use async_trait::async_trait;
use workshop_core::model::{AssessmentArtifact, AssessmentSet, UserId};

use super::SqliteRepository;
use super::mapping::{conn, map_assessment_row, ser, user_id_to_i64};
use crate::repository::{AssessmentRepository, StorageError};

#[async_trait]
impl AssessmentRepository for SqliteRepository {
    async fn upsert_assessment(
        &self,
        user: UserId,
        artifact: &AssessmentArtifact,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&artifact.payload).map_err(ser)?;
        sqlx::query(
            r"
            INSERT INTO assessments (user_id, assessment_type, payload, recorded_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, assessment_type) DO UPDATE SET
                payload = excluded.payload,
                recorded_at = excluded.recorded_at
            ",
        )
        .bind(user_id_to_i64(user)?)
        .bind(artifact.kind.as_str())
        .bind(payload)
        .bind(artifact.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn list_assessments(&self, user: UserId) -> Result<AssessmentSet, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT assessment_type, payload, recorded_at
            FROM assessments
            WHERE user_id = ?1
            ORDER BY recorded_at ASC
            ",
        )
        .bind(user_id_to_i64(user)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_assessment_row).collect()
    }

    async fn delete_assessments(&self, user: UserId) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM assessments WHERE user_id = ?1")
            .bind(user_id_to_i64(user)?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(result.rows_affected())
    }
}
