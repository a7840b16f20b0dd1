use std::sync::Arc;

use serde_json::Value;
use storage::repository::AssessmentRepository;
use workshop_core::model::{
    AssessmentArtifact, AssessmentRecorded, AssessmentSet, AssessmentType, UserId,
};

use crate::Clock;
use crate::error::AssessmentServiceError;
use crate::progress_service::ProgressService;

/// Stores assessment artifacts and pushes the resulting progress change.
#[derive(Clone)]
pub struct AssessmentService {
    clock: Clock,
    assessments: Arc<dyn AssessmentRepository>,
    progress: Arc<ProgressService>,
}

impl AssessmentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        assessments: Arc<dyn AssessmentRepository>,
        progress: Arc<ProgressService>,
    ) -> Self {
        Self {
            clock,
            assessments,
            progress,
        }
    }

    /// Persist an artifact, then advance stored progress.
    ///
    /// The two writes are not atomic. If the progress update fails it is
    /// logged and the next `open_session` recalculation catches up.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentServiceError::Storage` if the artifact cannot be
    /// stored.
    pub async fn record(
        &self,
        user: UserId,
        kind: AssessmentType,
        payload: Value,
    ) -> Result<AssessmentArtifact, AssessmentServiceError> {
        let artifact = AssessmentArtifact::new(kind, payload, self.clock.now());
        self.assessments.upsert_assessment(user, &artifact).await?;

        let event = AssessmentRecorded::for_artifact(user, &artifact);
        if !event.payload_valid {
            tracing::debug!(user_id = %user, kind = %event.kind, "recorded assessment is incomplete");
        }
        if let Err(err) = self.progress.on_assessment_recorded(&event).await {
            tracing::warn!(
                user_id = %user,
                kind = %event.kind,
                error = %err,
                "assessment stored but progress update failed"
            );
        }
        Ok(artifact)
    }

    /// # Errors
    ///
    /// Returns `AssessmentServiceError::Storage` if repository access fails.
    pub async fn list(&self, user: UserId) -> Result<AssessmentSet, AssessmentServiceError> {
        Ok(self.assessments.list_assessments(user).await?)
    }
}
