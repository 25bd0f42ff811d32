use crate::core::production::{Effect, Event, FlowError, Stage, Status, next};

const ALL_STATUSES: [Status; 5] = [
    Status::Pending,
    Status::InProgress,
    Status::Touchpoint,
    Status::Completed,
    Status::Error,
];

fn all_events() -> Vec<Event> {
    let mut events = vec![
        Event::Start,
        Event::SelectTheme,
        Event::ApproveAngle,
        Event::Retry,
        Event::Reset,
    ];
    for stage in Stage::ALL {
        events.push(Event::StageSucceeded(stage));
        events.push(Event::StageFailed(stage));
    }
    events
}

#[test]
fn happy_path_walks_every_stage_in_order() {
    let steps = [
        (Event::Start, Stage::Analysis, Status::InProgress),
        (
            Event::StageSucceeded(Stage::Analysis),
            Stage::Ideation,
            Status::Touchpoint,
        ),
        (Event::SelectTheme, Stage::Research, Status::InProgress),
        (
            Event::StageSucceeded(Stage::Research),
            Stage::Narrative,
            Status::InProgress,
        ),
        (
            Event::StageSucceeded(Stage::Narrative),
            Stage::Narrative,
            Status::Touchpoint,
        ),
        (Event::ApproveAngle, Stage::Writing, Status::InProgress),
        (
            Event::StageSucceeded(Stage::Writing),
            Stage::Completed,
            Status::Completed,
        ),
    ];

    let mut current = (Stage::Analysis, Status::Pending);
    for (event, stage, status) in steps {
        let t = next(current, &event).unwrap_or_else(|e| panic!("{:?} rejected: {}", event, e));
        assert_eq!((t.stage, t.status), (stage, status), "after {:?}", event);
        current = (t.stage, t.status);
    }
}

#[test]
fn research_success_auto_chains_into_narrative() {
    let t = next(
        (Stage::Research, Status::InProgress),
        &Event::StageSucceeded(Stage::Research),
    )
    .unwrap();
    assert_eq!(t.effect, Effect::Invoke(Stage::Narrative));
}

#[test]
fn stage_failures_pin_the_failing_stage() {
    for stage in [
        Stage::Analysis,
        Stage::Research,
        Stage::Narrative,
        Stage::Writing,
    ] {
        let t = next((stage, Status::InProgress), &Event::StageFailed(stage)).unwrap();
        assert_eq!((t.stage, t.status), (stage, Status::Error));
        assert_eq!(t.effect, Effect::PersistError);
    }
}

#[test]
fn retry_reinvokes_the_same_stage() {
    for stage in [
        Stage::Analysis,
        Stage::Research,
        Stage::Narrative,
        Stage::Writing,
    ] {
        let t = next((stage, Status::Error), &Event::Retry).unwrap();
        assert_eq!((t.stage, t.status), (stage, Status::InProgress));
        assert_eq!(t.effect, Effect::Invoke(stage));
    }
}

#[test]
fn reset_is_rejected_only_while_in_flight() {
    for status in ALL_STATUSES {
        let result = next((Stage::Writing, status), &Event::Reset);
        if status == Status::InProgress {
            assert!(matches!(result, Err(FlowError::InvalidTransition { .. })));
        } else {
            let t = result.unwrap();
            assert_eq!((t.stage, t.status), (Stage::Analysis, Status::Pending));
            assert_eq!(t.effect, Effect::ClearDerived);
        }
    }
}

#[test]
fn nothing_but_stage_results_is_accepted_in_flight() {
    for stage in Stage::ALL {
        for event in all_events() {
            let Ok(t) = next((stage, Status::InProgress), &event) else {
                continue;
            };
            match event {
                Event::StageSucceeded(s) | Event::StageFailed(s) => assert_eq!(s, stage),
                other => panic!("{:?} accepted while {} is in flight ({:?})", other, stage, t),
            }
        }
    }
}

#[test]
fn duplicate_human_input_is_rejected() {
    // The second click lands on Research/InProgress.
    let after_select = next((Stage::Ideation, Status::Touchpoint), &Event::SelectTheme).unwrap();
    let err = next((after_select.stage, after_select.status), &Event::SelectTheme).unwrap_err();
    assert_eq!(err.code(), "invalid_transition");

    let after_approve = next((Stage::Narrative, Status::Touchpoint), &Event::ApproveAngle).unwrap();
    assert!(next((after_approve.stage, after_approve.status), &Event::ApproveAngle).is_err());
}

#[test]
fn result_for_another_stage_is_rejected() {
    assert!(
        next(
            (Stage::Analysis, Status::InProgress),
            &Event::StageSucceeded(Stage::Writing)
        )
        .is_err()
    );
}

#[test]
fn completed_is_terminal_except_for_reset() {
    for event in all_events() {
        let result = next((Stage::Completed, Status::Completed), &event);
        assert_eq!(result.is_ok(), event == Event::Reset, "{:?}", event);
    }
}

#[test]
fn stages_never_move_backwards_or_skip() {
    // Exhaustive walk of the table: every accepted non-reset transition keeps
    // the stage or moves to the immediate successor.
    for stage in Stage::ALL {
        for status in ALL_STATUSES {
            for event in all_events() {
                if event == Event::Reset || event == Event::Start {
                    continue;
                }
                let Ok(t) = next((stage, status), &event) else {
                    continue;
                };
                let from = stage as usize;
                let to = t.stage as usize;
                assert!(
                    to == from || to == from + 1,
                    "{:?} took {} to {}",
                    event,
                    stage,
                    t.stage
                );
            }
        }
    }
}
