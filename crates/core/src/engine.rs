use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::catalog::{CatalogError, StepCatalog, StepDefinition, StepGroup};
use crate::model::{
    AssessmentRecorded, AssessmentSet, AssessmentType, ProgressRecord, StepId, Workshop,
};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("step {step} is not part of workshop {workshop}")]
    UnknownStep { step: StepId, workshop: Workshop },

    #[error("record belongs to workshop {found}, engine handles {expected}")]
    WorkshopMismatch { expected: Workshop, found: Workshop },

    #[error("step {step} is completed by the {kind} assessment")]
    AssessmentRequired { step: StepId, kind: AssessmentType },

    #[error("step {step} has unmet prerequisites: {}", join_steps(.missing))]
    PrerequisitesUnmet { step: StepId, missing: Vec<StepId> },

    #[error("step {step} is locked until {blocked_by} is completed")]
    StepLocked { step: StepId, blocked_by: StepId },

    #[error("video percentage must be a finite number, got {0}")]
    InvalidPercentage(f64),

    #[error("video position must be a finite, non-negative number, got {0}")]
    InvalidPosition(f64),
}

fn join_steps(steps: &[StepId]) -> String {
    steps
        .iter()
        .map(StepId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A broken record invariant, reported by `ProgressEngine::check_invariants`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    UnknownStep(StepId),
    CompletedNotUnlocked(StepId),
    MissingPrerequisite { step: StepId, prerequisite: StepId },
    CurrentNotUnlocked(StepId),
}

//
// ─── CONFIGURATION ─────────────────────────────────────────────────────────────
//

/// How recalculation treats a user whose assessments are all gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// No assessments but stored completions means the user was wiped.
    #[default]
    OnMissingAssessments,
    /// Only an explicit reset clears progress.
    ExplicitOnly,
}

/// What navigating ahead does to the steps in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardNavigation {
    /// Content steps before the target are completed on the way.
    #[default]
    AutoCompleteContent,
    /// The target must already be unlocked.
    UnlockOnly,
}

/// How explicit completion handles unmet prerequisites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrerequisitePolicy {
    /// Complete the missing prerequisites too (assessment steps still need artifacts).
    #[default]
    Backfill,
    /// Refuse the completion.
    Reject,
}

/// What counts as evidence that an assessment step is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionEvidence {
    /// Any stored artifact of the right type.
    #[default]
    Exists,
    /// The artifact payload must also pass its type's validator.
    ValidPayload,
}

/// Behavior switches injected into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub reset_policy: ResetPolicy,
    pub forward_navigation: ForwardNavigation,
    pub prerequisites: PrerequisitePolicy,
    pub evidence: CompletionEvidence,
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Result of an engine operation.
///
/// `changed` is true when the record differs from the input in a way that
/// must be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub record: ProgressRecord,
    pub changed: bool,
}

impl ProgressUpdate {
    fn unchanged(record: &ProgressRecord) -> Self {
        Self {
            record: record.clone(),
            changed: false,
        }
    }
}

/// Step unlocking state machine for one workshop.
///
/// Every operation is a pure function from the previous record to the next
/// one; persistence and clocks live with the caller.
#[derive(Debug, Clone)]
pub struct ProgressEngine {
    catalog: StepCatalog,
    config: EngineConfig,
}

impl ProgressEngine {
    #[must_use]
    pub fn new(catalog: StepCatalog, config: EngineConfig) -> Self {
        Self { catalog, config }
    }

    /// Engine over the built-in step table for `workshop`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the built-in table fails validation.
    pub fn builtin(workshop: Workshop, config: EngineConfig) -> Result<Self, CatalogError> {
        Ok(Self::new(StepCatalog::builtin(workshop)?, config))
    }

    #[must_use]
    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    #[must_use]
    pub fn workshop(&self) -> Workshop {
        self.catalog.workshop()
    }

    /// Fresh record: nothing completed, only the entry step unlocked.
    #[must_use]
    pub fn default_record(&self, now: DateTime<Utc>) -> ProgressRecord {
        let mut record = ProgressRecord::from_persisted(
            self.workshop(),
            BTreeSet::new(),
            self.catalog.first_step().clone(),
            BTreeSet::new(),
            BTreeSet::new(),
            Default::default(),
            Default::default(),
            now,
        );
        self.derive_unlocks(&mut record);
        record
    }

    /// Rebuild completion, unlocks and the resume point from assessments.
    ///
    /// Deterministic: the same inputs always give the same output.
    #[must_use]
    pub fn recalculate(&self, prev: &ProgressRecord, assessments: &AssessmentSet) -> ProgressUpdate {
        if self.config.reset_policy == ResetPolicy::OnMissingAssessments
            && assessments.is_empty()
            && !prev.completed_steps.is_empty()
        {
            let record = self.default_record(prev.last_visited_at);
            let changed = !record.same_navigation(prev);
            return ProgressUpdate { record, changed };
        }

        let mut candidate = BTreeSet::new();
        let mut later_assessment_done = false;
        for step in self.catalog.sequence().iter().rev() {
            let Some(def) = self.catalog.get(step) else {
                continue;
            };
            match def.assessment() {
                Some(kind) => {
                    if self.assessment_done(kind, assessments) {
                        candidate.insert(step.clone());
                        later_assessment_done = true;
                    }
                }
                None => {
                    if later_assessment_done || prev.completed_steps.contains(step) {
                        candidate.insert(step.clone());
                    }
                }
            }
        }
        for step in self.catalog.bonus_steps() {
            let Some(def) = self.catalog.get(step) else {
                continue;
            };
            let done = match def.assessment() {
                Some(kind) => self.assessment_done(kind, assessments),
                None => prev.completed_steps.contains(step),
            };
            if done {
                candidate.insert(step.clone());
            }
        }

        let completed = self.close_over_prerequisites(&candidate);
        let current = self.resume_point(&completed);
        self.finish(prev, completed, current, prev.last_visited_at)
    }

    /// Incrementally apply a newly recorded assessment without re-reading the
    /// full assessment set.
    #[must_use]
    pub fn apply_assessment_recorded(
        &self,
        prev: &ProgressRecord,
        event: &AssessmentRecorded,
    ) -> ProgressUpdate {
        if prev.workshop != self.workshop() {
            return ProgressUpdate::unchanged(prev);
        }
        if self.config.evidence == CompletionEvidence::ValidPayload && !event.payload_valid {
            return ProgressUpdate::unchanged(prev);
        }
        let Some(step) = self.catalog.step_for_assessment(&event.kind) else {
            return ProgressUpdate::unchanged(prev);
        };

        let mut candidate = prev.completed_steps.clone();
        candidate.insert(step.clone());
        if let Some(pos) = self.catalog.position(step) {
            for earlier in &self.catalog.sequence()[..pos] {
                if self.catalog.get(earlier).is_some_and(|def| !def.is_assessment()) {
                    candidate.insert(earlier.clone());
                }
            }
        }

        let completed = self.close_over_prerequisites(&candidate);
        let current = self.resume_point(&completed);
        self.finish(prev, completed, current, prev.last_visited_at)
    }

    /// Explicitly complete a step (mark-complete or next button).
    ///
    /// Idempotent: completing an already completed step returns the record
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UnknownStep` or `WorkshopMismatch` for foreign
    /// input, `AssessmentRequired` when an assessment step (or a backfilled
    /// prerequisite) has no artifact, and `PrerequisitesUnmet` under
    /// `PrerequisitePolicy::Reject`.
    pub fn mark_step_completed(
        &self,
        prev: &ProgressRecord,
        step: &StepId,
        assessments: &AssessmentSet,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate, ProgressError> {
        self.ensure_workshop(prev)?;
        let def = self.lookup(step)?;
        if prev.completed_steps.contains(step) {
            return Ok(ProgressUpdate::unchanged(prev));
        }
        self.require_artifact(def, assessments)?;

        let mut completed = prev.completed_steps.clone();
        let missing = self.unmet_prerequisites(step, &completed);
        if !missing.is_empty() {
            match self.config.prerequisites {
                PrerequisitePolicy::Reject => {
                    return Err(ProgressError::PrerequisitesUnmet {
                        step: step.clone(),
                        missing,
                    });
                }
                PrerequisitePolicy::Backfill => {
                    for prerequisite in missing {
                        if let Some(prereq_def) = self.catalog.get(&prerequisite) {
                            self.require_artifact(prereq_def, assessments)?;
                        }
                        completed.insert(prerequisite);
                    }
                }
            }
        }
        completed.insert(step.clone());

        let current = match def.group() {
            StepGroup::Progressive => self
                .catalog
                .next_in_sequence(step)
                .filter(|next| self.catalog.is_step_unlocked(next, &completed))
                .cloned()
                .unwrap_or_else(|| prev.current_step_id.clone()),
            StepGroup::Bonus => prev.current_step_id.clone(),
        };

        Ok(self.finish(prev, completed, current, now))
    }

    /// Record that the learner is now viewing `step`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StepLocked` when the step cannot be reached,
    /// plus the lookup errors of `mark_step_completed`.
    pub fn update_current_step(
        &self,
        prev: &ProgressRecord,
        step: &StepId,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate, ProgressError> {
        self.ensure_workshop(prev)?;
        let def = self.lookup(step)?;
        let mut completed = prev.completed_steps.clone();

        let auto_complete = def.group() == StepGroup::Progressive
            && self.config.forward_navigation == ForwardNavigation::AutoCompleteContent;

        if auto_complete {
            let pos = self.catalog.position(step).unwrap_or(0);
            for earlier in &self.catalog.sequence()[..pos] {
                if completed.contains(earlier) {
                    continue;
                }
                if self.catalog.get(earlier).is_some_and(StepDefinition::is_assessment) {
                    return Err(ProgressError::StepLocked {
                        step: step.clone(),
                        blocked_by: earlier.clone(),
                    });
                }
                completed.insert(earlier.clone());
            }
        } else if !completed.contains(step) && !self.catalog.is_step_unlocked(step, &completed) {
            let blocked_by = self
                .catalog
                .prerequisites(step)
                .iter()
                .find(|p| !completed.contains(*p))
                .cloned()
                .unwrap_or_else(|| step.clone());
            return Err(ProgressError::StepLocked {
                step: step.clone(),
                blocked_by,
            });
        }

        let mut update = self.finish(prev, completed, step.clone(), now);
        update.changed |= update.record.last_visited_at != prev.last_visited_at;
        Ok(update)
    }

    /// Track video watching for a step.
    ///
    /// The watched percentage only ratchets upward; the playback position is
    /// overwritten when given.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidPercentage` / `InvalidPosition` for
    /// non-finite or negative input, plus the lookup errors.
    pub fn update_video_progress(
        &self,
        prev: &ProgressRecord,
        step: &StepId,
        percent: f64,
        position: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate, ProgressError> {
        self.ensure_workshop(prev)?;
        self.lookup(step)?;
        if !percent.is_finite() {
            return Err(ProgressError::InvalidPercentage(percent));
        }
        if let Some(pos) = position {
            if !pos.is_finite() || pos < 0.0 {
                return Err(ProgressError::InvalidPosition(pos));
            }
        }

        let mut record = prev.clone();
        let watched = round2(percent.clamp(0.0, 100.0)).max(prev.video_progress(step));
        record.video_progress.insert(step.clone(), watched);
        if let Some(pos) = position {
            record.video_positions.insert(step.clone(), round2(pos));
        }
        record.last_visited_at = now;

        let changed = record.video_progress != prev.video_progress
            || record.video_positions != prev.video_positions;
        Ok(ProgressUpdate { record, changed })
    }

    /// List every invariant the record breaks against this catalog.
    #[must_use]
    pub fn check_invariants(&self, record: &ProgressRecord) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        for step in record.completed_steps.iter().chain(&record.unlocked_steps) {
            if !self.catalog.contains(step) {
                violations.push(InvariantViolation::UnknownStep(step.clone()));
            }
        }
        for step in &record.completed_steps {
            if !record.unlocked_steps.contains(step) {
                violations.push(InvariantViolation::CompletedNotUnlocked(step.clone()));
            }
        }
        for step in record.completed_steps.iter().chain(&record.unlocked_steps) {
            for prerequisite in self.catalog.prerequisites(step) {
                if !record.completed_steps.contains(prerequisite) {
                    violations.push(InvariantViolation::MissingPrerequisite {
                        step: step.clone(),
                        prerequisite: prerequisite.clone(),
                    });
                }
            }
        }
        if !record.unlocked_steps.contains(&record.current_step_id) {
            violations.push(InvariantViolation::CurrentNotUnlocked(
                record.current_step_id.clone(),
            ));
        }
        violations.dedup();
        violations
    }

    fn ensure_workshop(&self, record: &ProgressRecord) -> Result<(), ProgressError> {
        if record.workshop == self.workshop() {
            Ok(())
        } else {
            Err(ProgressError::WorkshopMismatch {
                expected: self.workshop(),
                found: record.workshop,
            })
        }
    }

    fn lookup(&self, step: &StepId) -> Result<&StepDefinition, ProgressError> {
        self.catalog
            .get(step)
            .ok_or_else(|| ProgressError::UnknownStep {
                step: step.clone(),
                workshop: self.workshop(),
            })
    }

    fn assessment_done(&self, kind: &AssessmentType, assessments: &AssessmentSet) -> bool {
        match self.config.evidence {
            CompletionEvidence::Exists => assessments.contains(kind),
            CompletionEvidence::ValidPayload => assessments
                .get(kind)
                .is_some_and(|artifact| kind.is_valid_payload(&artifact.payload)),
        }
    }

    fn require_artifact(
        &self,
        def: &StepDefinition,
        assessments: &AssessmentSet,
    ) -> Result<(), ProgressError> {
        match def.assessment() {
            Some(kind) if !self.assessment_done(kind, assessments) => {
                Err(ProgressError::AssessmentRequired {
                    step: def.id().clone(),
                    kind: kind.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Transitive prerequisites of `step` missing from `completed`, ordered
    /// so that each comes after its own prerequisites.
    fn unmet_prerequisites(&self, step: &StepId, completed: &BTreeSet<StepId>) -> Vec<StepId> {
        let mut missing = BTreeSet::new();
        let mut stack: Vec<&StepId> = self.catalog.prerequisites(step).iter().collect();
        while let Some(next) = stack.pop() {
            if completed.contains(next) || !missing.insert(next.clone()) {
                continue;
            }
            stack.extend(self.catalog.prerequisites(next));
        }
        self.catalog
            .topological_order()
            .iter()
            .filter(|s| missing.contains(*s))
            .cloned()
            .collect()
    }

    /// Keep only candidates whose prerequisites are all kept too.
    fn close_over_prerequisites(&self, candidate: &BTreeSet<StepId>) -> BTreeSet<StepId> {
        let mut kept = BTreeSet::new();
        for step in self.catalog.topological_order() {
            if candidate.contains(step)
                && self
                    .catalog
                    .prerequisites(step)
                    .iter()
                    .all(|p| kept.contains(p))
            {
                kept.insert(step.clone());
            }
        }
        kept
    }

    fn resume_point(&self, completed: &BTreeSet<StepId>) -> StepId {
        self.catalog
            .sequence()
            .iter()
            .find(|s| !completed.contains(*s))
            .unwrap_or_else(|| self.catalog.last_step())
            .clone()
    }

    fn finish(
        &self,
        prev: &ProgressRecord,
        completed: BTreeSet<StepId>,
        current: StepId,
        visited_at: DateTime<Utc>,
    ) -> ProgressUpdate {
        let mut record = prev.clone();
        record.workshop = self.workshop();
        record.completed_steps = completed;
        record.current_step_id = current;
        record.last_visited_at = visited_at;
        self.derive_unlocks(&mut record);
        let changed = !record.same_navigation(prev);
        ProgressUpdate { record, changed }
    }

    fn derive_unlocks(&self, record: &mut ProgressRecord) {
        let mut unlocked = record.completed_steps.clone();
        for step in self.catalog.topological_order() {
            if self.catalog.is_step_unlocked(step, &record.completed_steps) {
                unlocked.insert(step.clone());
            }
        }
        record.unlocked_sections = unlocked.iter().map(|s| s.section().to_owned()).collect();
        record.unlocked_steps = unlocked;
    }
}

/// Round to two decimals. Values too large to scale carry no fraction and
/// pass through unchanged.
fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    if scaled.is_finite() {
        scaled.round() / 100.0
    } else {
        value
    }
}
