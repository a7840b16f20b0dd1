use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{StepId, Workshop};

/// Persisted navigation progress for one user in one workshop.
///
/// Mutations go through `ProgressEngine`, which keeps the unlocked set,
/// sections, and resume point consistent with the completed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub(crate) workshop: Workshop,
    pub(crate) completed_steps: BTreeSet<StepId>,
    pub(crate) current_step_id: StepId,
    pub(crate) unlocked_steps: BTreeSet<StepId>,
    #[serde(default)]
    pub(crate) unlocked_sections: BTreeSet<String>,
    #[serde(default)]
    pub(crate) video_progress: BTreeMap<StepId, f64>,
    #[serde(default)]
    pub(crate) video_positions: BTreeMap<StepId, f64>,
    pub(crate) last_visited_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Rehydrate a record from stored parts without recomputing anything.
    ///
    /// Callers are expected to pass the result through
    /// `ProgressEngine::recalculate` before trusting derived fields.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        workshop: Workshop,
        completed_steps: BTreeSet<StepId>,
        current_step_id: StepId,
        unlocked_steps: BTreeSet<StepId>,
        unlocked_sections: BTreeSet<String>,
        video_progress: BTreeMap<StepId, f64>,
        video_positions: BTreeMap<StepId, f64>,
        last_visited_at: DateTime<Utc>,
    ) -> Self {
        Self {
            workshop,
            completed_steps,
            current_step_id,
            unlocked_steps,
            unlocked_sections,
            video_progress,
            video_positions,
            last_visited_at,
        }
    }

    #[must_use]
    pub fn workshop(&self) -> Workshop {
        self.workshop
    }

    #[must_use]
    pub fn completed_steps(&self) -> &BTreeSet<StepId> {
        &self.completed_steps
    }

    #[must_use]
    pub fn current_step_id(&self) -> &StepId {
        &self.current_step_id
    }

    #[must_use]
    pub fn unlocked_steps(&self) -> &BTreeSet<StepId> {
        &self.unlocked_steps
    }

    #[must_use]
    pub fn unlocked_sections(&self) -> &BTreeSet<String> {
        &self.unlocked_sections
    }

    #[must_use]
    pub fn video_progress_map(&self) -> &BTreeMap<StepId, f64> {
        &self.video_progress
    }

    #[must_use]
    pub fn video_positions_map(&self) -> &BTreeMap<StepId, f64> {
        &self.video_positions
    }

    #[must_use]
    pub fn last_visited_at(&self) -> DateTime<Utc> {
        self.last_visited_at
    }

    #[must_use]
    pub fn is_completed(&self, step: &StepId) -> bool {
        self.completed_steps.contains(step)
    }

    #[must_use]
    pub fn is_unlocked(&self, step: &StepId) -> bool {
        self.unlocked_steps.contains(step)
    }

    /// Highest watched percentage for a step, `0.0` when never watched.
    #[must_use]
    pub fn video_progress(&self, step: &StepId) -> f64 {
        self.video_progress.get(step).copied().unwrap_or(0.0)
    }

    /// Last playback position for a step, `0.0` when never watched.
    #[must_use]
    pub fn video_position(&self, step: &StepId) -> f64 {
        self.video_positions.get(step).copied().unwrap_or(0.0)
    }

    /// True when the derived fields match between two records.
    ///
    /// Video maps and `last_visited_at` are ignored.
    #[must_use]
    pub fn same_navigation(&self, other: &Self) -> bool {
        self.completed_steps == other.completed_steps
            && self.current_step_id == other.current_step_id
            && self.unlocked_steps == other.unlocked_steps
    }
}
