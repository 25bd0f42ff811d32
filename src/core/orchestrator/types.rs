use serde_json::json;

use crate::core::production::{Event, NewMessage, Production, Stage, StageOutput};

/// Where `start` should act.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartTarget {
    Existing(String),
    New { owner_id: String, name: String },
}

/// A human-issued command. Stage results are not commands; they come from
/// the invoker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start {
        client_context: String,
        tone_of_voice: String,
    },
    /// Zero-based index into the proposed themes.
    SelectTheme(usize),
    ApproveNarrative(String),
    Retry,
    Reset,
}

impl Command {
    pub fn event(&self) -> Event {
        match self {
            Command::Start { .. } => Event::Start,
            Command::SelectTheme(_) => Event::SelectTheme,
            Command::ApproveNarrative(_) => Event::ApproveAngle,
            Command::Retry => Event::Retry,
            Command::Reset => Event::Reset,
        }
    }

    /// The user message recorded when the command is accepted. `before` is
    /// the production as it was loaded, `after` the claimed state.
    pub(crate) fn user_message(&self, before: &Production, after: &Production) -> NewMessage {
        match self {
            Command::Start {
                client_context,
                tone_of_voice,
            } => NewMessage::user(Stage::Analysis, "Start production").with_data(json!({
                "clientContext": client_context,
                "toneOfVoice": tone_of_voice,
            })),
            Command::SelectTheme(index) => {
                let title = after
                    .selected_theme()
                    .map(|t| t.title.as_str())
                    .unwrap_or_default();
                NewMessage::user(
                    Stage::Ideation,
                    format!("Selected theme {}: {}", index + 1, title),
                )
                .with_data(json!({ "index": index }))
            }
            Command::ApproveNarrative(_) => {
                let angle = after.selected_angle.clone().unwrap_or_default();
                NewMessage::user(Stage::Narrative, format!("Approved angle: {}", angle))
                    .with_data(json!({ "angle": angle }))
            }
            Command::Retry => NewMessage::user(before.stage, format!("Retry {}", before.stage)),
            Command::Reset => NewMessage::user(before.stage, "Reset production"),
        }
    }
}

/// One-line agent summary of a stage output.
pub(crate) fn describe_output(output: &StageOutput, production: &Production) -> String {
    match output {
        StageOutput::Analysis(themes) => format!("Proposed {} themes", themes.len()),
        StageOutput::Research(map) => {
            let title = production
                .selected_theme()
                .map(|t| t.title.as_str())
                .unwrap_or("the selected theme");
            format!(
                "Research map for \"{}\": {} data points, {} cases",
                title,
                map.numerical_data.len(),
                map.cases.len()
            )
        }
        StageOutput::Narrative(skeleton) => {
            let names: Vec<&str> = skeleton
                .angle_variations
                .iter()
                .map(|a| a.name.as_str())
                .collect();
            format!(
                "Narrative skeleton with {} blocks. Angles: {}",
                skeleton.blocks.len(),
                names.join(", ")
            )
        }
        StageOutput::Writing(content) => {
            format!("Final script ready: {}", content.full_script.hook)
        }
    }
}
