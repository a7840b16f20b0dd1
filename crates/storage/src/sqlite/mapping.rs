use chrono::{DateTime, Utc};
use sqlx::Row;
use workshop_core::model::{AssessmentArtifact, AssessmentType, ProgressRecord, UserId, Workshop};

use crate::legacy::{self, StoredProgress};
use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn user_id_to_i64(user: UserId) -> Result<i64, StorageError> {
    i64::try_from(user.value()).map_err(|_| ser("user_id overflow"))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    u64::try_from(v)
        .map(UserId::new)
        .map_err(|_| ser("user_id sign overflow"))
}

pub(crate) fn encode_progress(record: &ProgressRecord) -> Result<String, StorageError> {
    serde_json::to_string(record).map_err(ser)
}

/// Decode a stored progress column, falling back to legacy recovery.
pub(crate) fn decode_progress(
    raw: &str,
    workshop: Workshop,
    now: DateTime<Utc>,
) -> Result<StoredProgress, StorageError> {
    legacy::decode_stored(raw, workshop, now).map_err(ser)
}

pub(crate) fn map_assessment_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<AssessmentArtifact, StorageError> {
    let kind: String = row.try_get("assessment_type").map_err(ser)?;
    let payload: String = row.try_get("payload").map_err(ser)?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(ser)?;

    Ok(AssessmentArtifact::new(
        AssessmentType::from(kind),
        serde_json::from_str(&payload).map_err(ser)?,
        recorded_at,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ids_round_trip_through_sqlite_integers() {
        let user = UserId::new(42);
        assert_eq!(user_id_from_i64(user_id_to_i64(user).unwrap()).unwrap(), user);
        assert!(user_id_to_i64(UserId::new(u64::MAX)).is_err());
        assert!(user_id_from_i64(-1).is_err());
    }
}
