use anyhow::Result;
use console::style;

use super::RunArgs;
use super::engine;
use super::inspect::{print_messages, print_production};
use crate::core::orchestrator::{Orchestrator, StartTarget};
use crate::core::production::{NarrativeSkeleton, Production, Stage, Status, Theme};
use crate::core::terminal::{
    GuideSection, print_error, print_info, print_step, print_success, print_warn,
};

fn theme_choice(i: usize, t: &Theme) -> String {
    format!("{:>2}. {} ({})", i + 1, t.title, t.suggested_format)
}

fn print_skeleton(skeleton: &NarrativeSkeleton) {
    let mut section = GuideSection::new("Narrative skeleton");
    for block in &skeleton.blocks {
        let phase = serde_json::to_value(block.phase)
            .ok()
            .and_then(|v| v.as_str().map(str::to_uppercase))
            .unwrap_or_default();
        section = section.status(&phase, &block.content);
    }
    if !skeleton.validation_notes.is_empty() {
        section = section.blank().text(&skeleton.validation_notes);
    }
    section.print();
    println!();
}

enum OnError {
    Retry,
    Reset,
    Quit,
}

fn ask_on_error(p: &Production) -> Result<OnError> {
    if let Some(failure) = &p.last_error {
        print_error(&format!(
            "{} failed ({}): {}",
            failure.stage, failure.kind, failure.message
        ));
    }
    let retryable = p.last_error.as_ref().is_none_or(|f| f.kind.retryable());
    let options = vec!["Retry", "Reset and start over", "Quit"];
    let starting = if retryable { 0 } else { 1 };
    let choice = inquire::Select::new("What now?", options)
        .with_starting_cursor(starting)
        .prompt()?;
    Ok(match choice {
        "Retry" => OnError::Retry,
        "Reset and start over" => OnError::Reset,
        _ => OnError::Quit,
    })
}

/// Takes one decision at the production's current touchpoint. Returns the
/// production after the decision was applied, or `None` when the session
/// is over.
async fn step(
    orch: &Orchestrator,
    p: Production,
    args: &RunArgs,
) -> Result<Option<Production>> {
    let next = match (p.stage, p.status) {
        (Stage::Ideation, Status::Touchpoint) => {
            let choices: Vec<String> = p
                .themes
                .iter()
                .enumerate()
                .map(|(i, t)| theme_choice(i, t))
                .collect();
            let picked = inquire::Select::new("Pick a theme:", choices.clone())
                .with_page_size(10)
                .prompt()?;
            let index = choices.iter().position(|c| *c == picked).unwrap_or(0);
            print_step("Researching and drafting the narrative...");
            orch.select_theme(&p.id, index).await?
        }
        (Stage::Narrative, Status::Touchpoint) => {
            let Some(skeleton) = &p.narrative_skeleton else {
                return Ok(None);
            };
            print_skeleton(skeleton);
            let choices: Vec<String> = skeleton
                .angle_variations
                .iter()
                .map(|a| a.name.clone())
                .collect();
            let angle = inquire::Select::new("Approve an angle:", choices).prompt()?;
            print_step("Writing the final script...");
            orch.approve_narrative(&p.id, &angle).await?
        }
        (_, Status::Error) => match ask_on_error(&p)? {
            OnError::Retry => {
                print_step("Retrying...");
                orch.retry(&p.id).await?
            }
            OnError::Reset => {
                let reset = orch.reset(&p.id).await?;
                print_warn("Production reset. Generated results were cleared.");
                reset
            }
            OnError::Quit => return Ok(None),
        },
        (_, Status::Pending) => {
            print_step("Analyzing the client context...");
            orch.start(StartTarget::Existing(p.id.clone()), &args.context, &args.tone)
                .await?
        }
        (_, Status::Completed) => {
            print_production(&p);
            print_success("Production completed.");
            return Ok(None);
        }
        _ => {
            print_info(&format!(
                "Production is {}/{}; nothing to decide here.",
                p.stage, p.status
            ));
            return Ok(None);
        }
    };
    Ok(Some(next))
}

/// Walks a new production through every stage, asking for a decision at
/// each touchpoint.
pub(crate) async fn run_interactive(args: RunArgs) -> Result<()> {
    let engine = engine::boot().await?;
    let orch = engine.orchestrator;
    let owner = args
        .owner
        .clone()
        .unwrap_or_else(|| engine.config.default_owner.clone());

    println!(
        "\n  {} {}\n",
        style("Production:").bold(),
        style(&args.name).cyan()
    );
    print_step("Analyzing the client context...");
    let mut production = orch
        .start(
            StartTarget::New {
                owner_id: owner,
                name: args.name.clone(),
            },
            &args.context,
            &args.tone,
        )
        .await?;

    let mut seen = 0;
    loop {
        let fresh = orch.messages(&production.id, seen).await?;
        if let Some(last) = fresh.last() {
            seen = last.sequence;
        }
        print_messages(&fresh);
        println!();

        match step(&orch, production, &args).await? {
            Some(next) => production = next,
            None => break,
        }
    }
    Ok(())
}
