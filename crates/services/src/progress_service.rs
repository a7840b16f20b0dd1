use std::sync::Arc;

use storage::repository::{AssessmentRepository, ProgressRepository};
use workshop_core::catalog::CatalogError;
use workshop_core::engine::{EngineConfig, ProgressEngine, ProgressUpdate};
use workshop_core::model::{AssessmentRecorded, ProgressRecord, StepId, UserId, Workshop};

use crate::Clock;
use crate::error::ProgressServiceError;

/// One engine per workshop, sharing a configuration.
#[derive(Debug, Clone)]
pub struct Engines {
    ast: ProgressEngine,
    ia: ProgressEngine,
}

impl Engines {
    /// # Errors
    ///
    /// Returns `CatalogError` if a built-in step table is invalid.
    pub fn builtin(config: EngineConfig) -> Result<Self, CatalogError> {
        Ok(Self {
            ast: ProgressEngine::builtin(Workshop::Ast, config)?,
            ia: ProgressEngine::builtin(Workshop::Ia, config)?,
        })
    }

    #[must_use]
    pub fn get(&self, workshop: Workshop) -> &ProgressEngine {
        match workshop {
            Workshop::Ast => &self.ast,
            Workshop::Ia => &self.ia,
        }
    }

    fn iter(&self) -> impl Iterator<Item = &ProgressEngine> {
        [&self.ast, &self.ia].into_iter()
    }
}

/// A learner's live progress in one workshop.
///
/// `pending` is set while the latest record has not reached storage; the
/// next save writes the whole accumulated record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSession {
    user: UserId,
    record: ProgressRecord,
    pending: bool,
    load_failed: bool,
}

impl ProgressSession {
    #[must_use]
    pub fn user(&self) -> UserId {
        self.user
    }

    #[must_use]
    pub fn workshop(&self) -> Workshop {
        self.record.workshop()
    }

    #[must_use]
    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

/// Loads, mutates and saves navigation progress.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    engines: Arc<Engines>,
    progress: Arc<dyn ProgressRepository>,
    assessments: Arc<dyn AssessmentRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        engines: Arc<Engines>,
        progress: Arc<dyn ProgressRepository>,
        assessments: Arc<dyn AssessmentRepository>,
    ) -> Self {
        Self {
            clock,
            engines,
            progress,
            assessments,
        }
    }

    #[must_use]
    pub fn engine(&self, workshop: Workshop) -> &ProgressEngine {
        self.engines.get(workshop)
    }

    /// Load and normalize a learner's progress.
    ///
    /// Never fails: a load error falls back to a fresh record and an
    /// assessment query error skips recalculation. When the load failed the
    /// normalized record is not written back, so a transient outage cannot
    /// overwrite stored progress.
    pub async fn open_session(&self, user: UserId, workshop: Workshop) -> ProgressSession {
        let engine = self.engines.get(workshop);
        let (record, load_failed) = match self.progress.load_progress(user, workshop).await {
            Ok(Some(record)) => (record, false),
            Ok(None) => (engine.default_record(self.clock.now()), false),
            Err(err) => {
                tracing::warn!(
                    user_id = %user,
                    workshop = %workshop,
                    error = %err,
                    "failed to load progress, starting from a fresh record"
                );
                (engine.default_record(self.clock.now()), true)
            }
        };

        let mut session = ProgressSession {
            user,
            record,
            pending: false,
            load_failed,
        };

        match self.assessments.list_assessments(user).await {
            Ok(assessments) => {
                let update = engine.recalculate(&session.record, &assessments);
                if update.changed {
                    tracing::info!(
                        user_id = %user,
                        workshop = %workshop,
                        completed = update.record.completed_steps().len(),
                        current = %update.record.current_step_id(),
                        "progress recalculated from assessments"
                    );
                }
                let changed = update.changed;
                session.record = update.record;
                if changed && !session.load_failed {
                    session.pending = true;
                    self.save(&mut session).await;
                }
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %user,
                    workshop = %workshop,
                    error = %err,
                    "failed to list assessments, keeping stored progress"
                );
            }
        }
        session
    }

    /// Complete a step explicitly.
    ///
    /// Returns whether the record changed.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Progress` when the engine refuses the
    /// step, or `Storage` when assessments cannot be listed.
    pub async fn mark_step_completed(
        &self,
        session: &mut ProgressSession,
        step: &StepId,
    ) -> Result<bool, ProgressServiceError> {
        let assessments = self.assessments.list_assessments(session.user).await?;
        let update = self.engines.get(session.workshop()).mark_step_completed(
            &session.record,
            step,
            &assessments,
            self.clock.now(),
        )?;
        tracing::debug!(user_id = %session.user, step = %step, changed = update.changed, "mark step completed");
        Ok(self.apply(session, update).await)
    }

    /// Move the learner to `step`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Progress` when the step is unknown or
    /// locked.
    pub async fn update_current_step(
        &self,
        session: &mut ProgressSession,
        step: &StepId,
    ) -> Result<bool, ProgressServiceError> {
        let update = self.engines.get(session.workshop()).update_current_step(
            &session.record,
            step,
            self.clock.now(),
        )?;
        tracing::debug!(user_id = %session.user, step = %step, changed = update.changed, "update current step");
        Ok(self.apply(session, update).await)
    }

    /// Record video watching for `step`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Progress` for unknown steps or invalid
    /// numbers.
    pub async fn update_video_progress(
        &self,
        session: &mut ProgressSession,
        step: &StepId,
        percent: f64,
        position: Option<f64>,
    ) -> Result<bool, ProgressServiceError> {
        let update = self.engines.get(session.workshop()).update_video_progress(
            &session.record,
            step,
            percent,
            position,
            self.clock.now(),
        )?;
        Ok(self.apply(session, update).await)
    }

    /// Recalculate against the current assessments.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if assessments cannot be listed.
    pub async fn refresh(&self, session: &mut ProgressSession) -> Result<bool, ProgressServiceError> {
        let assessments = self.assessments.list_assessments(session.user).await?;
        let update = self
            .engines
            .get(session.workshop())
            .recalculate(&session.record, &assessments);
        Ok(self.apply(session, update).await)
    }

    /// Retry a pending save. Returns true when nothing is left pending.
    pub async fn flush(&self, session: &mut ProgressSession) -> bool {
        if session.pending {
            self.save(session).await;
        }
        !session.pending
    }

    /// Fold a newly recorded assessment into the stored progress of every
    /// workshop that uses it.
    ///
    /// Returns whether any stored record changed.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if a record cannot be loaded
    /// or saved.
    pub async fn on_assessment_recorded(
        &self,
        event: &AssessmentRecorded,
    ) -> Result<bool, ProgressServiceError> {
        let mut any_changed = false;
        for engine in self.engines.iter() {
            if engine.catalog().step_for_assessment(&event.kind).is_none() {
                continue;
            }
            let workshop = engine.workshop();
            let stored = self
                .progress
                .load_progress(event.user_id, workshop)
                .await?
                .unwrap_or_else(|| engine.default_record(self.clock.now()));

            let update = engine.apply_assessment_recorded(&stored, event);
            if update.changed {
                self.progress
                    .save_progress(event.user_id, &update.record)
                    .await?;
                tracing::info!(
                    user_id = %event.user_id,
                    workshop = %workshop,
                    kind = %event.kind,
                    current = %update.record.current_step_id(),
                    "progress advanced by assessment"
                );
                any_changed = true;
            }
        }
        Ok(any_changed)
    }

    async fn apply(&self, session: &mut ProgressSession, update: ProgressUpdate) -> bool {
        let changed = update.changed;
        session.record = update.record;
        if changed {
            session.load_failed = false;
            session.pending = true;
        }
        if session.pending {
            self.save(session).await;
        }
        changed
    }

    async fn save(&self, session: &mut ProgressSession) {
        match self.progress.save_progress(session.user, &session.record).await {
            Ok(()) => {
                session.pending = false;
                tracing::debug!(
                    user_id = %session.user,
                    workshop = %session.workshop(),
                    "progress saved"
                );
            }
            Err(err) => {
                session.pending = true;
                tracing::warn!(
                    user_id = %session.user,
                    workshop = %session.workshop(),
                    error = %err,
                    "failed to save progress, will retry on next change"
                );
            }
        }
    }
}
