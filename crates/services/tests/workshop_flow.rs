use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::json;
use services::{AppServices, Clock};
use storage::repository::{
    AssessmentRepository, InMemoryRepository, ProgressRepository, Storage, StorageError,
};
use workshop_core::engine::{EngineConfig, ProgressError, ResetPolicy};
use workshop_core::model::{AssessmentType, ProgressRecord, StepId, UserId, Workshop};
use workshop_core::time::fixed_now;

fn step(raw: &str) -> StepId {
    StepId::parse(raw).unwrap()
}

/// Progress store whose writes can be switched off.
#[derive(Clone, Default)]
struct FlakyProgress {
    inner: InMemoryRepository,
    failing: Arc<AtomicBool>,
}

#[async_trait]
impl ProgressRepository for FlakyProgress {
    async fn load_progress(
        &self,
        user: UserId,
        workshop: Workshop,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        self.inner.load_progress(user, workshop).await
    }

    async fn save_progress(
        &self,
        user: UserId,
        record: &ProgressRecord,
    ) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("offline".into()));
        }
        self.inner.save_progress(user, record).await
    }

    async fn delete_progress(&self, user: UserId) -> Result<u64, StorageError> {
        self.inner.delete_progress(user).await
    }
}

#[tokio::test]
async fn learner_walks_through_first_sections() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()), EngineConfig::default())
        .unwrap();
    let progress = services.progress();
    let user = UserId::new(1);

    let mut session = progress.open_session(user, Workshop::Ast).await;
    assert_eq!(session.record().current_step_id(), &step("1-1"));

    progress
        .update_video_progress(&mut session, &step("1-1"), 100.0, Some(300.0))
        .await
        .unwrap();
    progress.mark_step_completed(&mut session, &step("1-1")).await.unwrap();
    progress.mark_step_completed(&mut session, &step("2-1")).await.unwrap();
    assert_eq!(session.record().current_step_id(), &step("2-2"));

    let err = progress
        .mark_step_completed(&mut session, &step("2-2"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        services::ProgressServiceError::Progress(ProgressError::AssessmentRequired { .. })
    ));

    services
        .assessments()
        .record(user, AssessmentType::StarCard, json!({"thinking": 25}))
        .await
        .unwrap();

    // The event already advanced stored progress; a new session sees it.
    let session = progress.open_session(user, Workshop::Ast).await;
    assert!(session.record().is_completed(&step("2-2")));
    assert_eq!(session.record().current_step_id(), &step("2-3"));
    assert!((session.record().video_progress(&step("1-1")) - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn failed_saves_stay_pending_until_flushed() {
    let repo = InMemoryRepository::new();
    let flaky = FlakyProgress {
        inner: repo.clone(),
        failing: Arc::new(AtomicBool::new(false)),
    };
    let storage = Storage {
        progress: Arc::new(flaky.clone()),
        assessments: Arc::new(repo.clone()),
    };
    let services =
        AppServices::from_storage(storage, Clock::fixed(fixed_now()), EngineConfig::default())
            .unwrap();
    let progress = services.progress();
    let user = UserId::new(2);

    let mut session = progress.open_session(user, Workshop::Ast).await;
    flaky.failing.store(true, Ordering::SeqCst);
    progress.mark_step_completed(&mut session, &step("1-1")).await.unwrap();
    progress.mark_step_completed(&mut session, &step("2-1")).await.unwrap();
    assert!(session.is_pending());
    assert!(repo.load_progress(user, Workshop::Ast).await.unwrap().is_none());

    assert!(!progress.flush(&mut session).await);

    flaky.failing.store(false, Ordering::SeqCst);
    assert!(progress.flush(&mut session).await);
    assert!(!session.is_pending());

    let stored = repo.load_progress(user, Workshop::Ast).await.unwrap().unwrap();
    let steps: Vec<_> = stored.completed_steps().iter().map(StepId::as_str).collect();
    assert_eq!(steps, vec!["1-1", "2-1"]);
}

#[tokio::test]
async fn explicit_reset_starts_over() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()), EngineConfig::default())
        .unwrap();
    let user = UserId::new(3);
    services
        .assessments()
        .record(user, AssessmentType::StarCard, json!({}))
        .await
        .unwrap();

    let progress = services.progress();
    let session = progress.open_session(user, Workshop::Ast).await;
    assert_eq!(session.record().completed_steps().len(), 3);

    let report = services.reset().reset_user_data(user).await.unwrap();
    assert_eq!(report.assessments_deleted, 1);

    let session = progress.open_session(user, Workshop::Ast).await;
    assert!(session.record().completed_steps().is_empty());
    assert_eq!(session.record().current_step_id(), &step("1-1"));
}

#[tokio::test]
async fn missing_assessments_reset_progress_by_default() {
    let repo = InMemoryRepository::new();
    let storage = Storage {
        progress: Arc::new(repo.clone()),
        assessments: Arc::new(repo.clone()),
    };
    let services =
        AppServices::from_storage(storage, Clock::fixed(fixed_now()), EngineConfig::default())
            .unwrap();
    let progress = services.progress();
    let user = UserId::new(6);

    let mut session = progress.open_session(user, Workshop::Ast).await;
    progress.mark_step_completed(&mut session, &step("2-1")).await.unwrap();
    assert!(session.record().is_completed(&step("2-1")));

    let session = progress.open_session(user, Workshop::Ast).await;
    assert!(session.record().completed_steps().is_empty());
    let stored = repo.load_progress(user, Workshop::Ast).await.unwrap().unwrap();
    assert!(stored.completed_steps().is_empty());
}

#[tokio::test]
async fn explicit_only_policy_survives_missing_assessments() {
    let repo = InMemoryRepository::new();
    let storage = Storage {
        progress: Arc::new(repo.clone()),
        assessments: Arc::new(repo.clone()),
    };
    let config = EngineConfig {
        reset_policy: ResetPolicy::ExplicitOnly,
        ..EngineConfig::default()
    };
    let services = AppServices::from_storage(storage, Clock::fixed(fixed_now()), config).unwrap();
    let progress = services.progress();
    let user = UserId::new(4);

    let mut session = progress.open_session(user, Workshop::Ast).await;
    progress.mark_step_completed(&mut session, &step("2-1")).await.unwrap();

    // Assessments vanish without an explicit reset.
    repo.delete_assessments(user).await.unwrap();
    let session = progress.open_session(user, Workshop::Ast).await;
    assert!(session.record().is_completed(&step("2-1")));
}

#[tokio::test]
async fn navigation_is_refused_past_incomplete_assessment() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()), EngineConfig::default())
        .unwrap();
    let progress = services.progress();
    let mut session = progress.open_session(UserId::new(5), Workshop::Ia).await;

    let err = progress
        .update_current_step(&mut session, &step("ia-3-1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        services::ProgressServiceError::Progress(ProgressError::StepLocked { .. })
    ));

    progress
        .update_current_step(&mut session, &step("ia-2-2"))
        .await
        .unwrap();
    assert_eq!(session.record().current_step_id(), &step("ia-2-2"));
    assert!(session.record().is_completed(&step("ia-2-1")));
}
