use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::model::UserId;

//
// ─── ASSESSMENT TYPE ───────────────────────────────────────────────────────────
//

/// Kind of assessment artifact a user can record.
///
/// Only the named variants drive step completion. Legacy snake_case spellings
/// map onto the same variants; anything else is preserved as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssessmentType {
    StarCard,
    StepByStepReflection,
    FlowAssessment,
    RoundingOutReflection,
    FlowAttributes,
    CantrilLadder,
    CantrilLadderReflection,
    VisualizingPotential,
    FutureSelfReflection,
    FinalReflection,
    IaCoreCapabilities,
    Other(String),
}

impl AssessmentType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            AssessmentType::StarCard => "starCard",
            AssessmentType::StepByStepReflection => "stepByStepReflection",
            AssessmentType::FlowAssessment => "flowAssessment",
            AssessmentType::RoundingOutReflection => "roundingOutReflection",
            AssessmentType::FlowAttributes => "flowAttributes",
            AssessmentType::CantrilLadder => "cantrilLadder",
            AssessmentType::CantrilLadderReflection => "cantrilLadderReflection",
            AssessmentType::VisualizingPotential => "visualizingPotential",
            AssessmentType::FutureSelfReflection => "futureSelfReflection",
            AssessmentType::FinalReflection => "finalReflection",
            AssessmentType::IaCoreCapabilities => "iaCoreCapabilities",
            AssessmentType::Other(name) => name,
        }
    }

    /// Check whether `payload` is a complete submission for this type.
    ///
    /// `Other` types have no validator and never pass.
    #[must_use]
    pub fn is_valid_payload(&self, payload: &Value) -> bool {
        match self {
            AssessmentType::StarCard => valid_star_card(payload),
            AssessmentType::StepByStepReflection => text_fields(
                payload,
                &[
                    "strength1",
                    "strength2",
                    "strength3",
                    "strength4",
                    "teamValues",
                    "uniqueContribution",
                ],
                10,
            ),
            AssessmentType::FlowAssessment => {
                payload.get("answers").is_some_and(|a| !a.is_null())
                    && number(payload, "flowScore").is_some()
                    && number(payload, "totalQuestions").is_some()
                    && number(payload, "maxScore").is_some()
            }
            AssessmentType::RoundingOutReflection => text_fields(
                payload,
                &["strengths", "values", "passions", "growthAreas"],
                1,
            ),
            AssessmentType::FlowAttributes => payload
                .get("attributes")
                .and_then(Value::as_array)
                .is_some_and(|attrs| {
                    attrs.len() == 4
                        && attrs
                            .iter()
                            .all(|a| a.as_str().is_some_and(|s| !s.trim().is_empty()))
                }),
            AssessmentType::CantrilLadder => {
                let in_range = |key: &str| number(payload, key).is_some_and(|v| (0.0..=10.0).contains(&v));
                in_range("currentRating") && in_range("futureRating")
            }
            AssessmentType::CantrilLadderReflection => text_fields(
                payload,
                &[
                    "currentFactors",
                    "futureImprovements",
                    "specificChanges",
                    "quarterlyProgress",
                    "quarterlyActions",
                ],
                1,
            ),
            AssessmentType::VisualizingPotential => {
                payload
                    .get("selectedImages")
                    .and_then(Value::as_array)
                    .is_some_and(|images| !images.is_empty())
                    && text_fields(payload, &["imageMeaning"], 1)
            }
            AssessmentType::FutureSelfReflection => text_fields(
                payload,
                &["futureSelfDescription", "visualizationNotes", "additionalNotes"],
                1,
            ),
            AssessmentType::FinalReflection => {
                text_fields(payload, &["keyInsights", "actionSteps", "commitments"], 1)
            }
            AssessmentType::IaCoreCapabilities => payload.as_object().is_some_and(|o| !o.is_empty()),
            AssessmentType::Other(_) => false,
        }
    }
}

fn number(payload: &Value, key: &str) -> Option<f64> {
    payload.get(key).and_then(Value::as_f64)
}

fn text_fields(payload: &Value, keys: &[&str], min_len: usize) -> bool {
    keys.iter().all(|key| {
        payload
            .get(*key)
            .and_then(Value::as_str)
            .is_some_and(|s| s.trim().chars().count() >= min_len)
    })
}

fn valid_star_card(payload: &Value) -> bool {
    let quadrants = ["thinking", "acting", "feeling", "planning"];
    let mut total = 0.0;
    for key in quadrants {
        match number(payload, key) {
            Some(v) => total += v,
            None => return false,
        }
    }
    (total - 100.0).abs() < 0.01
}

impl fmt::Display for AssessmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for AssessmentType {
    fn from(value: String) -> Self {
        match value.trim() {
            "starCard" | "star_card" => AssessmentType::StarCard,
            "stepByStepReflection" | "step_by_step_reflection" => {
                AssessmentType::StepByStepReflection
            }
            "flowAssessment" | "flow_assessment" => AssessmentType::FlowAssessment,
            "roundingOutReflection" | "rounding_out_reflection" => {
                AssessmentType::RoundingOutReflection
            }
            "flowAttributes" | "flow_attributes" => AssessmentType::FlowAttributes,
            "cantrilLadder" | "cantril_ladder" => AssessmentType::CantrilLadder,
            "cantrilLadderReflection" | "cantril_ladder_reflection" => {
                AssessmentType::CantrilLadderReflection
            }
            "visualizingPotential" | "visualizing_potential" => {
                AssessmentType::VisualizingPotential
            }
            "futureSelfReflection" | "future_self_reflection" => {
                AssessmentType::FutureSelfReflection
            }
            "finalReflection" | "final_reflection" => AssessmentType::FinalReflection,
            // Rows written before the spelling fix still carry `iaCoreCabilities`.
            "iaCoreCapabilities" | "iaCoreCabilities" | "ia_core_capabilities" => {
                AssessmentType::IaCoreCapabilities
            }
            _ => AssessmentType::Other(value),
        }
    }
}

impl From<&str> for AssessmentType {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<AssessmentType> for String {
    fn from(value: AssessmentType) -> Self {
        match value {
            AssessmentType::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl FromStr for AssessmentType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

//
// ─── ARTIFACTS ─────────────────────────────────────────────────────────────────
//

/// A recorded assessment with its opaque results payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentArtifact {
    pub kind: AssessmentType,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}

impl AssessmentArtifact {
    #[must_use]
    pub fn new(kind: AssessmentType, payload: Value, recorded_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            payload,
            recorded_at,
        }
    }
}

/// All assessment artifacts currently stored for one user, keyed by type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssessmentSet {
    artifacts: BTreeMap<AssessmentType, AssessmentArtifact>,
}

impl AssessmentSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the artifact for its type.
    pub fn insert(&mut self, artifact: AssessmentArtifact) {
        self.artifacts.insert(artifact.kind.clone(), artifact);
    }

    #[must_use]
    pub fn get(&self, kind: &AssessmentType) -> Option<&AssessmentArtifact> {
        self.artifacts.get(kind)
    }

    #[must_use]
    pub fn contains(&self, kind: &AssessmentType) -> bool {
        self.artifacts.contains_key(kind)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssessmentArtifact> {
        self.artifacts.values()
    }
}

impl FromIterator<AssessmentArtifact> for AssessmentSet {
    fn from_iter<I: IntoIterator<Item = AssessmentArtifact>>(iter: I) -> Self {
        let mut set = Self::new();
        for artifact in iter {
            set.insert(artifact);
        }
        set
    }
}

/// Domain event raised after an assessment artifact has been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentRecorded {
    pub user_id: UserId,
    pub kind: AssessmentType,
    /// Whether the stored payload passed `AssessmentType::is_valid_payload`.
    pub payload_valid: bool,
    pub recorded_at: DateTime<Utc>,
}

impl AssessmentRecorded {
    #[must_use]
    pub fn for_artifact(user_id: UserId, artifact: &AssessmentArtifact) -> Self {
        Self {
            user_id,
            kind: artifact.kind.clone(),
            payload_valid: artifact.kind.is_valid_payload(&artifact.payload),
            recorded_at: artifact.recorded_at,
        }
    }
}
