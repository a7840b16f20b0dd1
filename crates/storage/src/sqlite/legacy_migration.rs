use chrono::Utc;
use serde::Serialize;
use sqlx::Row;
use workshop_core::model::Workshop;

use super::SqliteRepository;
use super::mapping::{conn, decode_progress, encode_progress, ser, user_id_from_i64};
use crate::legacy::StoredProgress;
use crate::repository::StorageError;

/// Counts from a legacy rewrite pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMigrationReport {
    pub scanned: u64,
    pub already_clean: u64,
    pub rewritten: u64,
    pub salvaged: u64,
    pub unusable: u64,
}

impl SqliteRepository {
    /// Rewrite every progress row not stored as a clean document.
    ///
    /// Unusable rows are left untouched and counted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if rows cannot be read or rewritten.
    pub async fn migrate_legacy_progress(&self) -> Result<LegacyMigrationReport, StorageError> {
        let rows = sqlx::query("SELECT user_id, workshop, progress FROM navigation_progress")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut report = LegacyMigrationReport::default();
        let mut tx = self.pool.begin().await.map_err(conn)?;
        for row in &rows {
            report.scanned += 1;
            let user_id: i64 = row.try_get("user_id").map_err(ser)?;
            let workshop_raw: String = row.try_get("workshop").map_err(ser)?;
            let raw: String = row.try_get("progress").map_err(ser)?;
            let workshop: Workshop = workshop_raw.parse().map_err(ser)?;
            let user = user_id_from_i64(user_id)?;

            let record = match decode_progress(&raw, workshop, Utc::now())? {
                StoredProgress::Clean(_) => {
                    report.already_clean += 1;
                    continue;
                }
                StoredProgress::Recovered { record, salvaged } => {
                    if salvaged {
                        report.salvaged += 1;
                    }
                    record
                }
                StoredProgress::Unusable => {
                    tracing::warn!(user_id = %user, workshop = %workshop, "skipping unreadable progress row");
                    report.unusable += 1;
                    continue;
                }
            };

            sqlx::query(
                r"
                UPDATE navigation_progress
                SET progress = ?1, updated_at = ?2
                WHERE user_id = ?3 AND workshop = ?4
                ",
            )
            .bind(encode_progress(&record)?)
            .bind(Utc::now())
            .bind(user_id)
            .bind(workshop.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
            report.rewritten += 1;
        }
        tx.commit().await.map_err(conn)?;

        tracing::info!(
            scanned = report.scanned,
            rewritten = report.rewritten,
            salvaged = report.salvaged,
            unusable = report.unusable,
            "legacy progress migration finished"
        );
        Ok(report)
    }
}
