use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use console::style;

use super::engine;
use crate::core::config::EtherflowConfig;
use crate::core::llm::{LlmError, LlmProvider, ProviderRegistry};
use crate::core::memory::SqliteProductionRepository;
use crate::core::notify::NotificationBridge;
use crate::core::orchestrator::Orchestrator;
use crate::core::production::{Message, Production, Role, Status};
use crate::core::stage::StageInvoker;
use crate::core::terminal::{GuideSection, print_info};

/// Read-only commands don't need a provider key. The invoker is never
/// reached because nothing here issues a command.
async fn read_only() -> Result<Orchestrator> {
    let dir = engine::data_dir();
    let config = EtherflowConfig::load(&dir)?;
    let repo = SqliteProductionRepository::open(&dir).await?;
    let provider = Arc::new(OfflineProvider);
    Ok(Orchestrator::new(
        Arc::new(repo),
        StageInvoker::new(provider, config.timeouts),
        NotificationBridge::new(config.notify_capacity),
    ))
}

struct OfflineProvider;

#[async_trait]
impl LlmProvider for OfflineProvider {
    fn provider_id(&self) -> &str {
        "offline"
    }

    fn model_id(&self) -> &str {
        "none"
    }

    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Unavailable("read-only session".to_string()))
    }
}

fn status_label(status: Status) -> String {
    let label = status.as_str();
    match status {
        Status::Completed => format!("{}", style(label).green()),
        Status::Error => format!("{}", style(label).red().bold()),
        Status::Touchpoint => format!("{}", style(label).yellow()),
        Status::InProgress => format!("{}", style(label).cyan()),
        Status::Pending => format!("{}", style(label).dim()),
    }
}

pub(crate) fn print_production(p: &Production) {
    let mut section = GuideSection::new(&p.name)
        .status("Id", &p.id)
        .status("Owner", &p.owner_id)
        .status("Stage", p.stage.as_str())
        .status("Status", &status_label(p.status))
        .status("Version", &p.version.to_string());

    if !p.client_context.is_empty() {
        section = section.status("Context", &p.client_context);
    }
    if let Some(theme) = p.selected_theme() {
        section = section.status("Theme", &theme.title);
    } else if !p.themes.is_empty() {
        section = section.status("Themes", &format!("{} proposed", p.themes.len()));
    }
    if let Some(angle) = &p.selected_angle {
        section = section.status("Angle", angle);
    }
    if let Some(failure) = &p.last_error {
        section = section.status(
            "Last error",
            &format!("{} ({}): {}", failure.stage, failure.kind, failure.message),
        );
    }
    if let Some(content) = &p.final_content {
        section = section
            .blank()
            .text(&format!("{} {}", style("Hook").bold(), content.full_script.hook))
            .text(&format!(
                "{} {}",
                style("Interest").bold(),
                content.full_script.interest
            ))
            .text(&format!("{} {}", style("Desire").bold(), content.full_script.desire))
            .text(&format!("{} {}", style("Action").bold(), content.full_script.action));
        if !content.caption_suggestion.is_empty() {
            section = section.blank().text(&content.caption_suggestion);
        }
        if !content.hashtags.is_empty() {
            section = section.text(&format!("{}", style(content.hashtags.join(" ")).dim()));
        }
    }
    section.print();
    println!();
}

fn role_label(role: Role) -> String {
    match role {
        Role::User => format!("{}", style("you").green().bold()),
        Role::Agent => format!("{}", style("agent").cyan().bold()),
        Role::System => format!("{}", style("system").dim()),
    }
}

pub(crate) fn print_messages(messages: &[Message]) {
    for m in messages {
        let kind = m
            .kind
            .as_deref()
            .map(|k| format!(" [{}]", style(k).red()))
            .unwrap_or_default();
        println!(
            "  {:>3} {} {} {}{}",
            style(m.sequence).dim(),
            style(m.stage.as_str()).magenta(),
            role_label(m.role),
            m.content,
            kind
        );
    }
}

pub(crate) async fn show(id: &str) -> Result<()> {
    let orch = read_only().await?;
    let production = orch.status(id).await?;
    print_production(&production);
    Ok(())
}

pub(crate) async fn messages(id: &str, after: i64) -> Result<()> {
    let orch = read_only().await?;
    let messages = orch.messages(id, after).await?;
    if messages.is_empty() {
        print_info("No messages.");
    } else {
        print_messages(&messages);
        println!();
    }
    Ok(())
}

pub(crate) async fn list(owner: Option<&str>) -> Result<()> {
    let orch = read_only().await?;
    let productions = orch.list(owner, 50).await?;
    if productions.is_empty() {
        print_info("No productions yet. Start one with 'etherflow run'.");
        return Ok(());
    }
    let mut section = GuideSection::new("Productions");
    for p in &productions {
        section = section.command(
            &p.id,
            &format!("{}  {}/{}", p.name, p.stage.as_str(), status_label(p.status)),
        );
    }
    section.print();
    println!();
    Ok(())
}

pub(crate) fn providers() -> Result<()> {
    let registry = ProviderRegistry::load()?;
    for p in &registry.providers {
        let mut section = GuideSection::new(&p.name)
            .status("Id", &p.id)
            .status("Key variable", &p.auth.env_key)
            .status("Default model", &p.default_model);
        for m in &p.models {
            section = section.command(&m.id, &m.name);
        }
        section.print();
    }
    println!();
    Ok(())
}
