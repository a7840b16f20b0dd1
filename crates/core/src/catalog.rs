use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::model::{AssessmentType, StepId, StepIdError, Workshop};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("catalog has no progressive steps")]
    EmptySequence,

    #[error("step {0} is defined more than once")]
    DuplicateStep(StepId),

    #[error("step {step} does not belong to workshop {workshop}")]
    WrongWorkshop { step: StepId, workshop: Workshop },

    #[error("step {step} requires unknown step {prerequisite}")]
    UnknownPrerequisite { step: StepId, prerequisite: StepId },

    #[error("prerequisite cycle through step {step}")]
    Cycle { step: StepId },

    #[error("completion step {0} is not part of the progressive sequence")]
    CompletionStepNotInSequence(StepId),

    #[error("assessment {kind} completes more than one step")]
    DuplicateAssessment { kind: AssessmentType },

    #[error(transparent)]
    InvalidStepId(#[from] StepIdError),
}

//
// ─── STEP DEFINITIONS ──────────────────────────────────────────────────────────
//

/// What it takes for a step to count as completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRequirement {
    /// Content step: completed explicitly, by forward navigation, or derived
    /// from a later assessment.
    Visit,
    /// Assessment step: completed only when the artifact exists.
    Assessment(AssessmentType),
}

/// Whether a step sits on the linear path or unlocks with the bonus group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepGroup {
    Progressive,
    Bonus,
}

/// One row of the step dependency table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    id: StepId,
    prerequisites: Vec<StepId>,
    requirement: StepRequirement,
    group: StepGroup,
    has_video: bool,
}

impl StepDefinition {
    #[must_use]
    pub fn new(id: StepId, prerequisites: Vec<StepId>, requirement: StepRequirement) -> Self {
        Self {
            id,
            prerequisites,
            requirement,
            group: StepGroup::Progressive,
            has_video: false,
        }
    }

    #[must_use]
    pub fn with_video(mut self) -> Self {
        self.has_video = true;
        self
    }

    #[must_use]
    pub fn bonus(mut self) -> Self {
        self.group = StepGroup::Bonus;
        self
    }

    #[must_use]
    pub fn id(&self) -> &StepId {
        &self.id
    }

    #[must_use]
    pub fn section(&self) -> &str {
        self.id.section()
    }

    #[must_use]
    pub fn prerequisites(&self) -> &[StepId] {
        &self.prerequisites
    }

    #[must_use]
    pub fn requirement(&self) -> &StepRequirement {
        &self.requirement
    }

    #[must_use]
    pub fn group(&self) -> StepGroup {
        self.group
    }

    #[must_use]
    pub fn has_video(&self) -> bool {
        self.has_video
    }

    #[must_use]
    pub fn assessment(&self) -> Option<&AssessmentType> {
        match &self.requirement {
            StepRequirement::Assessment(kind) => Some(kind),
            StepRequirement::Visit => None,
        }
    }

    #[must_use]
    pub fn is_assessment(&self) -> bool {
        self.assessment().is_some()
    }
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

/// Validated step dependency table for one workshop.
#[derive(Debug, Clone)]
pub struct StepCatalog {
    workshop: Workshop,
    steps: HashMap<StepId, StepDefinition>,
    sequence: Vec<StepId>,
    bonus: Vec<StepId>,
    topological: Vec<StepId>,
    completion_step: StepId,
    by_assessment: HashMap<AssessmentType, StepId>,
}

impl StepCatalog {
    /// Build a catalog from definitions in display order.
    ///
    /// Progressive steps keep their relative order as the workshop sequence.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` for duplicates, foreign or unknown ids, cycles,
    /// an empty sequence, or a completion step outside the sequence.
    pub fn new(
        workshop: Workshop,
        definitions: Vec<StepDefinition>,
        completion_step: StepId,
    ) -> Result<Self, CatalogError> {
        let mut steps = HashMap::with_capacity(definitions.len());
        let mut sequence = Vec::new();
        let mut bonus = Vec::new();
        let mut by_assessment = HashMap::new();

        for def in definitions {
            if def.id.workshop() != workshop {
                return Err(CatalogError::WrongWorkshop {
                    step: def.id.clone(),
                    workshop,
                });
            }
            if steps.contains_key(&def.id) {
                return Err(CatalogError::DuplicateStep(def.id.clone()));
            }
            if let Some(kind) = def.assessment() {
                if by_assessment.insert(kind.clone(), def.id.clone()).is_some() {
                    return Err(CatalogError::DuplicateAssessment { kind: kind.clone() });
                }
            }
            match def.group {
                StepGroup::Progressive => sequence.push(def.id.clone()),
                StepGroup::Bonus => bonus.push(def.id.clone()),
            }
            steps.insert(def.id.clone(), def);
        }

        if sequence.is_empty() {
            return Err(CatalogError::EmptySequence);
        }
        if !sequence.contains(&completion_step) {
            return Err(CatalogError::CompletionStepNotInSequence(completion_step));
        }

        for def in steps.values() {
            for prerequisite in &def.prerequisites {
                if !steps.contains_key(prerequisite) {
                    return Err(CatalogError::UnknownPrerequisite {
                        step: def.id.clone(),
                        prerequisite: prerequisite.clone(),
                    });
                }
            }
        }

        let order: Vec<StepId> = sequence.iter().chain(bonus.iter()).cloned().collect();
        let topological = topological_order(&steps, &order)?;

        Ok(Self {
            workshop,
            steps,
            sequence,
            bonus,
            topological,
            completion_step,
            by_assessment,
        })
    }

    /// The hand-authored table shipped for a workshop.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the built-in table fails validation.
    pub fn builtin(workshop: Workshop) -> Result<Self, CatalogError> {
        let table = match workshop {
            Workshop::Ast => AST_TABLE,
            Workshop::Ia => IA_TABLE,
        };

        let mut definitions = Vec::with_capacity(table.steps.len());
        for row in table.steps {
            let prerequisites = row
                .prerequisites
                .iter()
                .map(|raw| StepId::parse(raw))
                .collect::<Result<Vec<_>, _>>()?;
            let requirement = match row.assessment {
                Some(kind) => StepRequirement::Assessment(AssessmentType::from(kind)),
                None => StepRequirement::Visit,
            };
            let mut def = StepDefinition::new(StepId::parse(row.id)?, prerequisites, requirement);
            if row.video {
                def = def.with_video();
            }
            if row.bonus {
                def = def.bonus();
            }
            definitions.push(def);
        }

        Self::new(workshop, definitions, StepId::parse(table.completion_step)?)
    }

    #[must_use]
    pub fn workshop(&self) -> Workshop {
        self.workshop
    }

    #[must_use]
    pub fn get(&self, id: &StepId) -> Option<&StepDefinition> {
        self.steps.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &StepId) -> bool {
        self.steps.contains_key(id)
    }

    /// Progressive steps in workshop order.
    #[must_use]
    pub fn sequence(&self) -> &[StepId] {
        &self.sequence
    }

    #[must_use]
    pub fn bonus_steps(&self) -> &[StepId] {
        &self.bonus
    }

    /// Every step ordered so prerequisites come first.
    #[must_use]
    pub fn topological_order(&self) -> &[StepId] {
        &self.topological
    }

    #[must_use]
    pub fn first_step(&self) -> &StepId {
        &self.sequence[0]
    }

    #[must_use]
    pub fn last_step(&self) -> &StepId {
        &self.sequence[self.sequence.len() - 1]
    }

    #[must_use]
    pub fn completion_step(&self) -> &StepId {
        &self.completion_step
    }

    /// Position of a step in the progressive sequence.
    #[must_use]
    pub fn position(&self, id: &StepId) -> Option<usize> {
        self.sequence.iter().position(|s| s == id)
    }

    /// Step following `id` in the progressive sequence.
    #[must_use]
    pub fn next_in_sequence(&self, id: &StepId) -> Option<&StepId> {
        self.position(id).and_then(|i| self.sequence.get(i + 1))
    }

    /// Step completed by recording the given assessment, if any.
    #[must_use]
    pub fn step_for_assessment(&self, kind: &AssessmentType) -> Option<&StepId> {
        self.by_assessment.get(kind)
    }

    #[must_use]
    pub fn prerequisites(&self, id: &StepId) -> &[StepId] {
        match self.steps.get(id) {
            Some(def) => def.prerequisites(),
            None => &[],
        }
    }

    /// True iff the step exists and every prerequisite is in `completed`.
    #[must_use]
    pub fn is_step_unlocked(&self, id: &StepId, completed: &BTreeSet<StepId>) -> bool {
        self.steps.get(id).is_some_and(|def| {
            def.prerequisites
                .iter()
                .all(|prerequisite| completed.contains(prerequisite))
        })
    }
}

fn topological_order(
    steps: &HashMap<StepId, StepDefinition>,
    order: &[StepId],
) -> Result<Vec<StepId>, CatalogError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        id: &StepId,
        steps: &HashMap<StepId, StepDefinition>,
        marks: &mut HashMap<StepId, Mark>,
        out: &mut Vec<StepId>,
    ) -> Result<(), CatalogError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(CatalogError::Cycle { step: id.clone() }),
            None => {}
        }
        marks.insert(id.clone(), Mark::Visiting);
        if let Some(def) = steps.get(id) {
            for prerequisite in &def.prerequisites {
                visit(prerequisite, steps, marks, out)?;
            }
        }
        marks.insert(id.clone(), Mark::Done);
        out.push(id.clone());
        Ok(())
    }

    let mut marks = HashMap::with_capacity(steps.len());
    let mut out = Vec::with_capacity(steps.len());
    for id in order {
        visit(id, steps, &mut marks, &mut out)?;
    }
    Ok(out)
}

//
// ─── BUILT-IN TABLES ───────────────────────────────────────────────────────────
//

struct StepRow {
    id: &'static str,
    prerequisites: &'static [&'static str],
    assessment: Option<&'static str>,
    video: bool,
    bonus: bool,
}

struct Table {
    steps: &'static [StepRow],
    completion_step: &'static str,
}

const fn content(id: &'static str, prerequisites: &'static [&'static str]) -> StepRow {
    StepRow {
        id,
        prerequisites,
        assessment: None,
        video: false,
        bonus: false,
    }
}

const fn video(id: &'static str, prerequisites: &'static [&'static str]) -> StepRow {
    StepRow {
        id,
        prerequisites,
        assessment: None,
        video: true,
        bonus: false,
    }
}

const fn assessment(
    id: &'static str,
    prerequisites: &'static [&'static str],
    kind: &'static str,
) -> StepRow {
    StepRow {
        id,
        prerequisites,
        assessment: Some(kind),
        video: false,
        bonus: false,
    }
}

const fn bonus(id: &'static str, prerequisites: &'static [&'static str]) -> StepRow {
    StepRow {
        id,
        prerequisites,
        assessment: None,
        video: false,
        bonus: true,
    }
}

const fn with_video(row: StepRow) -> StepRow {
    StepRow { video: true, ..row }
}

const AST_TABLE: Table = Table {
    steps: &[
        // Introduction
        video("1-1", &[]),
        // Strengths
        video("2-1", &["1-1"]),
        assessment("2-2", &["2-1"], "starCard"),
        video("2-3", &["2-2"]),
        assessment("2-4", &["2-3"], "stepByStepReflection"),
        // Flow
        video("3-1", &["2-4"]),
        assessment("3-2", &["3-1"], "flowAssessment"),
        with_video(assessment("3-3", &["3-2"], "roundingOutReflection")),
        assessment("3-4", &["3-3"], "flowAttributes"),
        // Potential
        with_video(assessment("4-1", &["3-4"], "cantrilLadder")),
        assessment("4-2", &["4-1"], "cantrilLadderReflection"),
        assessment("4-3", &["4-2"], "visualizingPotential"),
        with_video(assessment("4-4", &["4-3"], "futureSelfReflection")),
        assessment("4-5", &["4-4"], "finalReflection"),
        // Resources
        bonus("5-1", &["4-5"]),
        bonus("5-2", &["4-5"]),
        bonus("5-3", &["4-5"]),
    ],
    completion_step: "4-5",
};

const IA_TABLE: Table = Table {
    steps: &[
        // Welcome & orientation
        video("ia-1-1", &[]),
        content("ia-1-2", &["ia-1-1"]),
        // The I4C model
        video("ia-2-1", &["ia-1-2"]),
        assessment("ia-2-2", &["ia-2-1"], "iaCoreCapabilities"),
        // Ladder of imagination
        video("ia-3-1", &["ia-2-2"]),
        content("ia-3-2", &["ia-3-1"]),
        content("ia-3-3", &["ia-3-2"]),
        content("ia-3-4", &["ia-3-3"]),
        content("ia-3-5", &["ia-3-4"]),
        content("ia-3-6", &["ia-3-5"]),
        // Advanced ladder
        video("ia-4-1", &["ia-3-6"]),
        content("ia-4-2", &["ia-4-1"]),
        content("ia-4-3", &["ia-4-2"]),
        content("ia-4-4", &["ia-4-3"]),
        content("ia-4-5", &["ia-4-4"]),
        content("ia-4-6", &["ia-4-5"]),
        // Outcomes, resources, extras
        bonus("ia-5-1", &["ia-4-6"]),
        bonus("ia-5-2", &["ia-4-6"]),
        bonus("ia-5-3", &["ia-4-6"]),
        bonus("ia-5-4", &["ia-4-6"]),
        bonus("ia-5-5", &["ia-4-6"]),
        bonus("ia-6-1", &["ia-4-6"]),
        bonus("ia-6-2", &["ia-4-6"]),
        bonus("ia-7-1", &["ia-4-6"]),
        bonus("ia-7-2", &["ia-4-6"]),
    ],
    completion_step: "ia-4-6",
};

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> StepId {
        StepId::parse(raw).unwrap()
    }

    #[test]
    fn builtin_catalogs_validate() {
        let ast = StepCatalog::builtin(Workshop::Ast).unwrap();
        assert_eq!(ast.first_step(), &id("1-1"));
        assert_eq!(ast.last_step(), &id("4-5"));
        assert_eq!(ast.sequence().len(), 14);
        assert_eq!(ast.bonus_steps().len(), 3);

        let ia = StepCatalog::builtin(Workshop::Ia).unwrap();
        assert_eq!(ia.first_step(), &id("ia-1-1"));
        assert_eq!(ia.completion_step(), &id("ia-4-6"));
    }

    #[test]
    fn assessment_lookup_maps_to_step() {
        let ast = StepCatalog::builtin(Workshop::Ast).unwrap();
        assert_eq!(
            ast.step_for_assessment(&AssessmentType::StarCard),
            Some(&id("2-2"))
        );
        assert_eq!(
            ast.step_for_assessment(&AssessmentType::IaCoreCapabilities),
            None
        );
        assert!(ast.get(&id("2-2")).unwrap().is_assessment());
        assert!(ast.get(&id("2-1")).unwrap().has_video());
    }

    #[test]
    fn unlock_requires_all_prerequisites() {
        let ast = StepCatalog::builtin(Workshop::Ast).unwrap();
        let mut completed = BTreeSet::new();
        assert!(ast.is_step_unlocked(&id("1-1"), &completed));
        assert!(!ast.is_step_unlocked(&id("2-1"), &completed));
        completed.insert(id("1-1"));
        assert!(ast.is_step_unlocked(&id("2-1"), &completed));
        assert!(!ast.is_step_unlocked(&id("9-9"), &completed));
    }

    #[test]
    fn next_in_sequence_stops_at_last_step() {
        let ast = StepCatalog::builtin(Workshop::Ast).unwrap();
        assert_eq!(ast.next_in_sequence(&id("2-4")), Some(&id("3-1")));
        assert_eq!(ast.next_in_sequence(&id("4-5")), None);
        assert_eq!(ast.next_in_sequence(&id("5-1")), None);
    }

    #[test]
    fn topological_order_puts_prerequisites_first() {
        let ast = StepCatalog::builtin(Workshop::Ast).unwrap();
        let order = ast.topological_order();
        let pos = |raw: &str| order.iter().position(|s| s == &id(raw)).unwrap();
        assert!(pos("4-5") < pos("5-1"));
        assert!(pos("1-1") < pos("2-1"));
    }

    #[test]
    fn rejects_cycles() {
        let defs = vec![
            StepDefinition::new(id("1-1"), vec![id("1-2")], StepRequirement::Visit),
            StepDefinition::new(id("1-2"), vec![id("1-1")], StepRequirement::Visit),
        ];
        let err = StepCatalog::new(Workshop::Ast, defs, id("1-2")).unwrap_err();
        assert!(matches!(err, CatalogError::Cycle { .. }));
    }

    #[test]
    fn rejects_unknown_prerequisite() {
        let defs = vec![StepDefinition::new(
            id("1-1"),
            vec![id("0-1")],
            StepRequirement::Visit,
        )];
        let err = StepCatalog::new(Workshop::Ast, defs, id("1-1")).unwrap_err();
        assert_eq!(
            err,
            CatalogError::UnknownPrerequisite {
                step: id("1-1"),
                prerequisite: id("0-1"),
            }
        );
    }

    #[test]
    fn rejects_duplicates_and_foreign_steps() {
        let defs = vec![
            StepDefinition::new(id("1-1"), vec![], StepRequirement::Visit),
            StepDefinition::new(id("1-1"), vec![], StepRequirement::Visit),
        ];
        assert_eq!(
            StepCatalog::new(Workshop::Ast, defs, id("1-1")).unwrap_err(),
            CatalogError::DuplicateStep(id("1-1"))
        );

        let defs = vec![StepDefinition::new(id("ia-1-1"), vec![], StepRequirement::Visit)];
        assert!(matches!(
            StepCatalog::new(Workshop::Ast, defs, id("ia-1-1")).unwrap_err(),
            CatalogError::WrongWorkshop { .. }
        ));
    }

    #[test]
    fn rejects_empty_sequence_and_bad_completion_step() {
        let defs = vec![StepDefinition::new(id("1-1"), vec![], StepRequirement::Visit).bonus()];
        assert_eq!(
            StepCatalog::new(Workshop::Ast, defs, id("1-1")).unwrap_err(),
            CatalogError::EmptySequence
        );

        let defs = vec![StepDefinition::new(id("1-1"), vec![], StepRequirement::Visit)];
        assert_eq!(
            StepCatalog::new(Workshop::Ast, defs, id("1-2")).unwrap_err(),
            CatalogError::CompletionStepNotInSequence(id("1-2"))
        );
    }

    #[test]
    fn rejects_assessment_used_twice() {
        let defs = vec![
            StepDefinition::new(
                id("1-1"),
                vec![],
                StepRequirement::Assessment(AssessmentType::StarCard),
            ),
            StepDefinition::new(
                id("1-2"),
                vec![id("1-1")],
                StepRequirement::Assessment(AssessmentType::StarCard),
            ),
        ];
        assert!(matches!(
            StepCatalog::new(Workshop::Ast, defs, id("1-2")).unwrap_err(),
            CatalogError::DuplicateAssessment { .. }
        ));
    }
}
