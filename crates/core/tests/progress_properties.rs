use proptest::prelude::*;
use serde_json::json;
use workshop_core::engine::{
    CompletionEvidence, EngineConfig, ForwardNavigation, PrerequisitePolicy, ProgressEngine,
    ResetPolicy,
};
use workshop_core::model::{
    AssessmentArtifact, AssessmentRecorded, AssessmentSet, AssessmentType, StepId, UserId,
    Workshop,
};
use workshop_core::time::fixed_now;

#[derive(Debug, Clone)]
enum Op {
    Complete(usize),
    Visit(usize),
    Video(usize, f64),
    Record(usize),
    Recalculate,
}

fn op_strategy(steps: usize, kinds: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..steps).prop_map(Op::Complete),
        (0..steps).prop_map(Op::Visit),
        (0..steps, -20.0f64..140.0).prop_map(|(i, p)| Op::Video(i, p)),
        (0..kinds).prop_map(Op::Record),
        Just(Op::Recalculate),
    ]
}

fn config_strategy() -> impl Strategy<Value = EngineConfig> {
    (
        prop_oneof![
            Just(ResetPolicy::OnMissingAssessments),
            Just(ResetPolicy::ExplicitOnly)
        ],
        prop_oneof![
            Just(ForwardNavigation::AutoCompleteContent),
            Just(ForwardNavigation::UnlockOnly)
        ],
        prop_oneof![
            Just(PrerequisitePolicy::Backfill),
            Just(PrerequisitePolicy::Reject)
        ],
    )
        .prop_map(|(reset_policy, forward_navigation, prerequisites)| EngineConfig {
            reset_policy,
            forward_navigation,
            prerequisites,
            evidence: CompletionEvidence::Exists,
        })
}

fn all_steps(engine: &ProgressEngine) -> Vec<StepId> {
    let catalog = engine.catalog();
    catalog
        .sequence()
        .iter()
        .chain(catalog.bonus_steps())
        .cloned()
        .collect()
}

fn kinds(engine: &ProgressEngine) -> Vec<AssessmentType> {
    engine
        .catalog()
        .sequence()
        .iter()
        .filter_map(|s| engine.catalog().get(s).and_then(|d| d.assessment().cloned()))
        .collect()
}

fn workshop_strategy() -> impl Strategy<Value = Workshop> {
    prop_oneof![Just(Workshop::Ast), Just(Workshop::Ia)]
}

proptest! {
    #[test]
    fn every_operation_preserves_record_invariants(
        workshop in workshop_strategy(),
        config in config_strategy(),
        ops in prop::collection::vec(op_strategy(23, 10), 1..40),
    ) {
        let engine = ProgressEngine::builtin(workshop, config).unwrap();
        let steps = all_steps(&engine);
        let kinds = kinds(&engine);
        let mut assessments = AssessmentSet::new();
        let mut record = engine.default_record(fixed_now());

        for op in ops {
            let before = record.clone();
            match op {
                Op::Complete(i) => {
                    let step = &steps[i % steps.len()];
                    if let Ok(update) = engine.mark_step_completed(&record, step, &assessments, fixed_now()) {
                        prop_assert!(update.record.is_completed(step));
                        prop_assert!(before.completed_steps().is_subset(update.record.completed_steps()));
                        let again = engine
                            .mark_step_completed(&update.record, step, &assessments, fixed_now())
                            .unwrap();
                        prop_assert!(!again.changed);
                        prop_assert_eq!(&again.record, &update.record);
                        record = update.record;
                    }
                }
                Op::Visit(i) => {
                    let step = &steps[i % steps.len()];
                    if let Ok(update) = engine.update_current_step(&record, step, fixed_now()) {
                        prop_assert_eq!(update.record.current_step_id(), step);
                        prop_assert!(before.completed_steps().is_subset(update.record.completed_steps()));
                        record = update.record;
                    }
                }
                Op::Video(i, percent) => {
                    let step = &steps[i % steps.len()];
                    let update = engine
                        .update_video_progress(&record, step, percent, None, fixed_now())
                        .unwrap();
                    prop_assert!(update.record.video_progress(step) >= before.video_progress(step));
                    prop_assert!(update.record.video_progress(step) <= 100.0);
                    prop_assert!(update.record.same_navigation(&before));
                    record = update.record;
                }
                Op::Record(i) => {
                    let kind = kinds[i % kinds.len()].clone();
                    let artifact = AssessmentArtifact::new(kind, json!({}), fixed_now());
                    let event = AssessmentRecorded::for_artifact(UserId::new(1), &artifact);
                    assessments.insert(artifact);
                    let update = engine.apply_assessment_recorded(&record, &event);
                    prop_assert!(before.completed_steps().is_subset(update.record.completed_steps()));
                    record = update.record;
                }
                Op::Recalculate => {
                    let first = engine.recalculate(&record, &assessments);
                    let second = engine.recalculate(&record, &assessments);
                    prop_assert_eq!(&first, &second);
                    let again = engine.recalculate(&first.record, &assessments);
                    prop_assert!(!again.changed);
                    record = first.record;
                }
            }
            prop_assert!(
                engine.check_invariants(&record).is_empty(),
                "violations: {:?}",
                engine.check_invariants(&record)
            );
        }
    }

    #[test]
    fn derived_completion_matches_latest_assessment(
        count in 0usize..=10,
    ) {
        let engine = ProgressEngine::builtin(Workshop::Ast, EngineConfig::default()).unwrap();
        let kinds = kinds(&engine);
        let assessments: AssessmentSet = kinds[..count]
            .iter()
            .map(|k| AssessmentArtifact::new(k.clone(), json!({}), fixed_now()))
            .collect();

        let update = engine.recalculate(&engine.default_record(fixed_now()), &assessments);
        let sequence = engine.catalog().sequence();
        let done = update.record.completed_steps();

        if count == 0 {
            prop_assert!(done.is_empty());
        } else {
            let last_step = engine.catalog().step_for_assessment(&kinds[count - 1]).unwrap();
            let pos = engine.catalog().position(last_step).unwrap();
            let expected: Vec<_> = sequence[..=pos].to_vec();
            prop_assert_eq!(done.len(), expected.len());
            for step in expected {
                prop_assert!(done.contains(&step));
            }
        }
    }
}
