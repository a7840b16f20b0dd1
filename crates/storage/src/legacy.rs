//! Recovery of navigation progress saved by older clients.
//!
//! Older clients stored the progress document as a JSON string nested inside
//! other JSON strings, sometimes wrapped in `{"navigationProgress": "..."}`
//! envelopes. Decoding is bounded and falls back to the richest intermediate
//! object when no clean document is reached.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use workshop_core::catalog::{CatalogError, StepCatalog};
use workshop_core::model::{ProgressRecord, StepId, Workshop};

pub const MAX_DECODE_ATTEMPTS: usize = 5;

const ENVELOPE_FIELD: &str = "navigationProgress";

/// Lenient view of a legacy progress document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegacyProgress {
    pub completed_steps: Vec<String>,
    pub current_step_id: Option<String>,
    pub video_progress: BTreeMap<String, f64>,
    pub video_positions: BTreeMap<String, f64>,
    pub last_visited_at: Option<DateTime<Utc>>,
}

/// Outcome of a successful recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub progress: LegacyProgress,
    /// Number of JSON decodes performed.
    pub depth: usize,
    /// True when no clean document was reached and an intermediate object
    /// was used instead.
    pub salvaged: bool,
}

/// Decode a stored blob of unknown nesting.
///
/// Returns `None` when nothing resembling a progress object is found.
#[must_use]
pub fn recover(raw: &str) -> Option<Recovered> {
    let mut text = raw.to_owned();
    let mut envelopes: Vec<Map<String, Value>> = Vec::new();
    let mut depth = 0;

    while depth < MAX_DECODE_ATTEMPTS {
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            break;
        };
        depth += 1;
        match value {
            Value::String(inner) => text = inner,
            Value::Object(map) => match map.get(ENVELOPE_FIELD) {
                Some(Value::String(inner)) => {
                    text = inner.clone();
                    envelopes.push(map);
                }
                Some(Value::Object(inner)) => {
                    return Some(Recovered {
                        progress: LegacyProgress::from_object(inner),
                        depth,
                        salvaged: false,
                    });
                }
                _ => {
                    return Some(Recovered {
                        progress: LegacyProgress::from_object(&map),
                        depth,
                        salvaged: false,
                    });
                }
            },
            _ => break,
        }
    }

    // Ties go to the outermost envelope.
    let mut best: Option<&Map<String, Value>> = None;
    for candidate in &envelopes {
        if best.is_none_or(|b| completed_len(candidate) > completed_len(b)) {
            best = Some(candidate);
        }
    }
    best.map(|map| Recovered {
        progress: LegacyProgress::from_object(map),
        depth,
        salvaged: true,
    })
}

/// A stored progress document after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredProgress {
    Clean(ProgressRecord),
    Recovered { record: ProgressRecord, salvaged: bool },
    Unusable,
}

/// Decode a stored document for `workshop`, trying the clean format first.
///
/// # Errors
///
/// Returns `CatalogError` if the built-in catalog for `workshop` is invalid.
pub fn decode_stored(
    raw: &str,
    workshop: Workshop,
    now: DateTime<Utc>,
) -> Result<StoredProgress, CatalogError> {
    if let Ok(record) = serde_json::from_str::<ProgressRecord>(raw) {
        if record.workshop() == workshop {
            return Ok(StoredProgress::Clean(record));
        }
    }
    let Some(recovered) = recover(raw) else {
        return Ok(StoredProgress::Unusable);
    };
    let catalog = StepCatalog::builtin(workshop)?;
    Ok(StoredProgress::Recovered {
        record: recovered.progress.into_record(&catalog, now),
        salvaged: recovered.salvaged,
    })
}

fn completed_len(map: &Map<String, Value>) -> usize {
    map.get("completedSteps")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

impl LegacyProgress {
    fn from_object(map: &Map<String, Value>) -> Self {
        let completed_steps = map
            .get("completedSteps")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            completed_steps,
            current_step_id: map
                .get("currentStepId")
                .and_then(Value::as_str)
                .map(str::to_owned),
            video_progress: number_map(map.get("videoProgress")),
            video_positions: number_map(map.get("videoPositions")),
            last_visited_at: map.get("lastVisitedAt").and_then(timestamp),
        }
    }

    /// Convert into a record for `catalog`'s workshop.
    ///
    /// Ids that are malformed or belong to another workshop are dropped.
    /// Derived fields are only approximated here; callers recalculate.
    #[must_use]
    pub fn into_record(self, catalog: &StepCatalog, now: DateTime<Utc>) -> ProgressRecord {
        let workshop = catalog.workshop();
        let known = |raw: &str| -> Option<StepId> {
            StepId::parse(raw.trim())
                .ok()
                .filter(|id| catalog.contains(id))
        };

        let completed: BTreeSet<StepId> = self
            .completed_steps
            .iter()
            .filter_map(|raw| known(raw.as_str()))
            .collect();
        let current = self
            .current_step_id
            .as_deref()
            .and_then(known)
            .unwrap_or_else(|| catalog.first_step().clone());

        let mut unlocked = completed.clone();
        unlocked.insert(current.clone());
        let sections = unlocked.iter().map(|s| s.section().to_owned()).collect();

        let keep = |map: BTreeMap<String, f64>| -> BTreeMap<StepId, f64> {
            map.into_iter()
                .filter_map(|(raw, v)| known(raw.as_str()).map(|id| (id, v)))
                .collect()
        };

        ProgressRecord::from_persisted(
            workshop,
            completed,
            current,
            unlocked,
            sections,
            keep(self.video_progress),
            keep(self.video_positions),
            self.last_visited_at.unwrap_or(now),
        )
    }
}

fn number_map(value: Option<&Value>) -> BTreeMap<String, f64> {
    value
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| {
                    v.as_f64()
                        .filter(|n| n.is_finite())
                        .map(|n| (k.clone(), n))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}
