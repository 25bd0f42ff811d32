//! Stage/status transition table.
//!
//! `next` is pure: it only decides whether an event is legal from the current
//! `(stage, status)` and what comes after. Payload checks (theme index range,
//! angle names) happen in the orchestrator once the event is known to be legal.

use super::error::FlowError;
use super::types::{Stage, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    StageSucceeded(Stage),
    StageFailed(Stage),
    SelectTheme,
    ApproveAngle,
    Retry,
    Reset,
}

impl Event {
    pub fn name(&self) -> String {
        match self {
            Event::Start => "start".to_string(),
            Event::StageSucceeded(stage) => format!("{}_result(success)", stage),
            Event::StageFailed(stage) => format!("{}_result(error)", stage),
            Event::SelectTheme => "select_theme".to_string(),
            Event::ApproveAngle => "approve_angle".to_string(),
            Event::Retry => "retry".to_string(),
            Event::Reset => "reset".to_string(),
        }
    }
}

/// What the orchestrator must do once the transition is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Call the completion service for this stage.
    Invoke(Stage),
    /// Store the stage output on the production.
    PersistOutput,
    /// Store the failure on the production.
    PersistError,
    /// Wipe themes, research, narrative and final content.
    ClearDerived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub stage: Stage,
    pub status: Status,
    pub effect: Effect,
}

impl Transition {
    fn to(stage: Stage, status: Status, effect: Effect) -> Self {
        Self {
            stage,
            status,
            effect,
        }
    }
}

pub fn next(current: (Stage, Status), event: &Event) -> Result<Transition, FlowError> {
    let (stage, status) = current;
    let transition = match (stage, status, *event) {
        (_, Status::Pending, Event::Start) => Some(Transition::to(
            Stage::Analysis,
            Status::InProgress,
            Effect::Invoke(Stage::Analysis),
        )),

        (Stage::Analysis, Status::InProgress, Event::StageSucceeded(Stage::Analysis)) => {
            Some(Transition::to(Stage::Ideation, Status::Touchpoint, Effect::PersistOutput))
        }
        (Stage::Analysis, Status::InProgress, Event::StageFailed(Stage::Analysis)) => {
            Some(Transition::to(Stage::Analysis, Status::Error, Effect::PersistError))
        }

        (Stage::Ideation, Status::Touchpoint, Event::SelectTheme) => Some(Transition::to(
            Stage::Research,
            Status::InProgress,
            Effect::Invoke(Stage::Research),
        )),

        // Research chains straight into Narrative without a human gate.
        (Stage::Research, Status::InProgress, Event::StageSucceeded(Stage::Research)) => Some(Transition::to(
            Stage::Narrative,
            Status::InProgress,
            Effect::Invoke(Stage::Narrative),
        )),
        (Stage::Research, Status::InProgress, Event::StageFailed(Stage::Research)) => {
            Some(Transition::to(Stage::Research, Status::Error, Effect::PersistError))
        }

        (Stage::Narrative, Status::InProgress, Event::StageSucceeded(Stage::Narrative)) => {
            Some(Transition::to(Stage::Narrative, Status::Touchpoint, Effect::PersistOutput))
        }
        (Stage::Narrative, Status::InProgress, Event::StageFailed(Stage::Narrative)) => {
            Some(Transition::to(Stage::Narrative, Status::Error, Effect::PersistError))
        }

        (Stage::Narrative, Status::Touchpoint, Event::ApproveAngle) => Some(Transition::to(
            Stage::Writing,
            Status::InProgress,
            Effect::Invoke(Stage::Writing),
        )),

        (Stage::Writing, Status::InProgress, Event::StageSucceeded(Stage::Writing)) => {
            Some(Transition::to(
                Stage::Completed,
                Status::Completed,
                Effect::PersistOutput,
            ))
        }
        (Stage::Writing, Status::InProgress, Event::StageFailed(Stage::Writing)) => {
            Some(Transition::to(Stage::Writing, Status::Error, Effect::PersistError))
        }

        (failed, Status::Error, Event::Retry) if failed != Stage::Completed => {
            Some(Transition::to(failed, Status::InProgress, Effect::Invoke(failed)))
        }

        // No mid-flight cancellation: a reset is honored once the running
        // call has been reconciled.
        (_, current_status, Event::Reset) if current_status != Status::InProgress => {
            Some(Transition::to(Stage::Analysis, Status::Pending, Effect::ClearDerived))
        }

        _ => None,
    };

    transition.ok_or_else(|| FlowError::InvalidTransition {
        stage,
        status,
        event: event.name(),
    })
}
