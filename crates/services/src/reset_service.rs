use std::sync::Arc;

use serde::Serialize;
use storage::repository::{AssessmentRepository, ProgressRepository};
use workshop_core::model::UserId;

use crate::error::ResetServiceError;

/// Rows removed by a reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetReport {
    pub assessments_deleted: u64,
    pub progress_deleted: u64,
}

/// Explicit "start over" for a learner.
#[derive(Clone)]
pub struct ResetService {
    progress: Arc<dyn ProgressRepository>,
    assessments: Arc<dyn AssessmentRepository>,
}

impl ResetService {
    #[must_use]
    pub fn new(
        progress: Arc<dyn ProgressRepository>,
        assessments: Arc<dyn AssessmentRepository>,
    ) -> Self {
        Self {
            progress,
            assessments,
        }
    }

    /// Delete all assessments and progress of `user`.
    ///
    /// Assessments go first so an interrupted reset still recalculates to a
    /// fresh record.
    ///
    /// # Errors
    ///
    /// Returns `ResetServiceError::Storage` if either delete fails.
    pub async fn reset_user_data(&self, user: UserId) -> Result<ResetReport, ResetServiceError> {
        let assessments_deleted = self.assessments.delete_assessments(user).await?;
        let progress_deleted = self.progress.delete_progress(user).await?;
        tracing::info!(
            user_id = %user,
            assessments_deleted,
            progress_deleted,
            "user data reset"
        );
        Ok(ResetReport {
            assessments_deleted,
            progress_deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storage::repository::Storage;
    use workshop_core::engine::{EngineConfig, ProgressEngine};
    use workshop_core::model::{AssessmentArtifact, AssessmentType, Workshop};
    use workshop_core::time::fixed_now;

    #[tokio::test]
    async fn reset_removes_everything_for_one_user() {
        let storage = Storage::in_memory();
        let user = UserId::new(1);
        let other = UserId::new(2);
        let engine = ProgressEngine::builtin(Workshop::Ast, EngineConfig::default()).unwrap();
        for owner in [user, other] {
            storage
                .assessments
                .upsert_assessment(
                    owner,
                    &AssessmentArtifact::new(AssessmentType::StarCard, json!({}), fixed_now()),
                )
                .await
                .unwrap();
            storage
                .progress
                .save_progress(owner, &engine.default_record(fixed_now()))
                .await
                .unwrap();
        }

        let service = ResetService::new(storage.progress.clone(), storage.assessments.clone());
        let report = service.reset_user_data(user).await.unwrap();
        assert_eq!(
            report,
            ResetReport {
                assessments_deleted: 1,
                progress_deleted: 1,
            }
        );
        assert!(storage.assessments.list_assessments(user).await.unwrap().is_empty());
        assert_eq!(storage.assessments.list_assessments(other).await.unwrap().len(), 1);
    }
}
