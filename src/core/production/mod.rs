mod error;
pub mod state_machine;
pub mod types;

pub use error::FlowError;
pub use state_machine::{Effect, Event, next};
pub use types::{
    AidaBlock, AidaPhase, Angle, CaseStudy, DataPoint, FailureKind, FinalContent, Message,
    NarrativeSkeleton, NewMessage, Production, ResearchMap, Role, Script, SocialVoice, Stage,
    StageFailure, StageOutput, Status, StyleCheck, Theme, slugify,
};

#[cfg(test)]
mod tests;
