//! Drives productions through the stage state machine.
//!
//! Every operation follows the same shape: load, ask the state machine, write
//! a claim (CAS on the loaded version), call the completion service, write the
//! result (CAS on the claim's version), publish. A claim moves the production
//! to `InProgress`, which rejects every human command until the result lands.

pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tracing::{error, info, warn};

use crate::core::memory::ProductionRepository;
use crate::core::notify::{Notification, NotificationBridge, ProductionUpdate};
use crate::core::production::{
    Effect, Event, FailureKind, FlowError, Message, NewMessage, Production, Stage, StageFailure,
    StageOutput, Status, next,
};
use crate::core::stage::StageInvoker;

pub use types::{Command, StartTarget};
use types::describe_output;

/// Outcome of a claim: the committed production and, when the transition
/// calls for it, the stage to generate next.
struct Claim {
    production: Production,
    invoke: Option<Stage>,
}

struct Inner {
    repo: Arc<dyn ProductionRepository>,
    invoker: StageInvoker,
    bridge: NotificationBridge,
    commit_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        repo: Arc<dyn ProductionRepository>,
        invoker: StageInvoker,
        bridge: NotificationBridge,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repo,
                invoker,
                bridge,
                commit_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    // ── Public operations ──

    /// Creates a production in `Pending`. Nothing is generated until `start`.
    pub async fn create(&self, owner_id: &str, name: &str) -> Result<Production, FlowError> {
        if name.trim().is_empty() {
            return Err(FlowError::Validation("name must not be empty".to_string()));
        }
        let production = Production::new(owner_id, name);
        let saved = self
            .inner
            .repo
            .create(
                &production,
                &[NewMessage::system(
                    Stage::Analysis,
                    format!("Production \"{}\" created", production.name),
                )],
            )
            .await?;
        info!(production = %saved.production.id, owner = owner_id, "Production created");
        Ok(saved.production)
    }

    pub async fn start(
        &self,
        target: StartTarget,
        client_context: &str,
        tone_of_voice: &str,
    ) -> Result<Production, FlowError> {
        let id = self.resolve_target(target, client_context).await?;
        self.advance(
            &id,
            Command::Start {
                client_context: client_context.to_string(),
                tone_of_voice: tone_of_voice.to_string(),
            },
        )
        .await
    }

    /// Like `start`, but generation runs on a background task.
    pub async fn start_detached(
        &self,
        target: StartTarget,
        client_context: &str,
        tone_of_voice: &str,
    ) -> Result<Production, FlowError> {
        let id = self.resolve_target(target, client_context).await?;
        self.advance_detached(
            &id,
            Command::Start {
                client_context: client_context.to_string(),
                tone_of_voice: tone_of_voice.to_string(),
            },
        )
        .await
    }

    pub async fn select_theme(&self, id: &str, index: usize) -> Result<Production, FlowError> {
        self.advance(id, Command::SelectTheme(index)).await
    }

    pub async fn approve_narrative(&self, id: &str, angle: &str) -> Result<Production, FlowError> {
        self.advance(id, Command::ApproveNarrative(angle.to_string()))
            .await
    }

    pub async fn retry(&self, id: &str) -> Result<Production, FlowError> {
        self.advance(id, Command::Retry).await
    }

    pub async fn reset(&self, id: &str) -> Result<Production, FlowError> {
        self.advance(id, Command::Reset).await
    }

    /// Always allowed, including while a stage is running.
    pub async fn status(&self, id: &str) -> Result<Production, FlowError> {
        self.inner.repo.load(id).await
    }

    pub async fn messages(&self, id: &str, after_sequence: i64) -> Result<Vec<Message>, FlowError> {
        // Distinguish an unknown production from one with no new messages.
        self.inner.repo.load(id).await?;
        self.inner.repo.list_messages(id, after_sequence).await
    }

    pub async fn list(
        &self,
        owner_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Production>, FlowError> {
        self.inner.repo.list(owner_id, limit).await
    }

    pub async fn subscribe(&self, id: &str) -> impl Stream<Item = Notification> + use<> {
        self.inner.bridge.subscribe(id).await
    }

    /// Applies a command and runs any generation it triggers to completion.
    /// Stage failures are not errors here: they come back as a production in
    /// `status = error`.
    pub async fn advance(&self, id: &str, command: Command) -> Result<Production, FlowError> {
        let claim = self.claim(id, &command).await?;
        match claim.invoke {
            Some(stage) => self.drive(claim.production, stage).await,
            None => Ok(claim.production),
        }
    }

    /// Validates and claims synchronously, then generates on a background
    /// task. Returns the claimed production.
    pub async fn advance_detached(
        &self,
        id: &str,
        command: Command,
    ) -> Result<Production, FlowError> {
        let claim = self.claim(id, &command).await?;
        if let Some(stage) = claim.invoke {
            let this = self.clone();
            let claimed = claim.production.clone();
            tokio::spawn(async move {
                let id = claimed.id.clone();
                if let Err(e) = this.drive(claimed, stage).await {
                    error!(production = %id, %stage, "Background generation did not commit: {}", e);
                }
            });
        }
        Ok(claim.production)
    }

    /// Marks productions left `InProgress` by a previous process as failed so
    /// a human can retry them. Returns how many were recovered.
    pub async fn recover_interrupted(&self) -> Result<usize, FlowError> {
        let stuck = self.inner.repo.list_in_progress().await?;
        let mut recovered = 0;
        for production in stuck {
            let stage = production.stage;
            let failure = StageFailure::new(
                stage,
                FailureKind::ServiceUnavailable,
                "interrupted before the stage finished",
            );
            match self.commit_outcome(&production, stage, Err(failure)).await {
                Ok(_) => {
                    recovered += 1;
                    warn!(production = %production.id, %stage, "Recovered interrupted stage");
                }
                Err(e) => {
                    warn!(production = %production.id, %stage, "Could not recover production: {}", e);
                }
            }
        }
        Ok(recovered)
    }

    // ── Internals ──

    async fn resolve_target(
        &self,
        target: StartTarget,
        client_context: &str,
    ) -> Result<String, FlowError> {
        match target {
            StartTarget::Existing(id) => Ok(id),
            StartTarget::New { owner_id, name } => {
                // Reject before creating so a bad request leaves no orphan row.
                if client_context.trim().is_empty() {
                    return Err(FlowError::Validation(
                        "client context must not be empty".to_string(),
                    ));
                }
                Ok(self.create(&owner_id, &name).await?.id)
            }
        }
    }

    async fn claim(&self, id: &str, command: &Command) -> Result<Claim, FlowError> {
        let before = self.inner.repo.load(id).await?;
        let transition = next((before.stage, before.status), &command.event())?;

        let mut claimed = before.clone();
        match command {
            Command::Start {
                client_context,
                tone_of_voice,
            } => {
                if client_context.trim().is_empty() {
                    return Err(FlowError::Validation(
                        "client context must not be empty".to_string(),
                    ));
                }
                claimed.client_context = client_context.trim().to_string();
                claimed.tone_of_voice = tone_of_voice.trim().to_string();
            }
            Command::SelectTheme(index) => {
                if *index >= before.themes.len() {
                    return Err(FlowError::Validation(format!(
                        "theme index {} is out of range; {} themes were proposed",
                        index,
                        before.themes.len()
                    )));
                }
                claimed.selected_theme_index = Some(*index);
            }
            Command::ApproveNarrative(angle) => {
                let canonical = before
                    .narrative_skeleton
                    .as_ref()
                    .and_then(|s| s.find_angle(angle))
                    .map(|a| a.name.clone())
                    .ok_or_else(|| {
                        FlowError::Validation(format!("unknown narrative angle '{}'", angle.trim()))
                    })?;
                claimed.selected_angle = Some(canonical);
            }
            Command::Retry => claimed.last_error = None,
            Command::Reset => {}
        }
        if transition.effect == Effect::ClearDerived {
            claimed.clear_derived();
        }
        claimed.stage = transition.stage;
        claimed.status = transition.status;

        let message = command.user_message(&before, &claimed);
        let production = self.commit(&claimed, before.version, &[message]).await?;
        info!(
            production = %production.id,
            event = %command.event().name(),
            stage = %production.stage,
            status = %production.status,
            version = production.version,
            "Transition accepted"
        );

        let invoke = match transition.effect {
            Effect::Invoke(stage) => Some(stage),
            _ => None,
        };
        Ok(Claim { production, invoke })
    }

    /// Generates `stage` and keeps going while the state machine chains into
    /// another generating stage.
    async fn drive(&self, claimed: Production, stage: Stage) -> Result<Production, FlowError> {
        let mut current = claimed;
        let mut stage = stage;
        loop {
            let outcome = self.inner.invoker.invoke(stage, &current).await;
            let (committed, effect) = match self.commit_outcome(&current, stage, outcome).await {
                Ok(committed) => committed,
                Err(e) => {
                    self.fail_unreconciled(&current.id, stage, &e).await;
                    return Err(e);
                }
            };
            current = committed;
            match effect {
                Effect::Invoke(following) => stage = following,
                _ => return Ok(current),
            }
        }
    }

    /// The result of `stage` could not be written. Moves the row from
    /// `InProgress` to `Error` so it accepts Retry and Reset again. Best
    /// effort: if this write fails too, `recover_interrupted` picks the row up
    /// at the next boot.
    async fn fail_unreconciled(&self, id: &str, stage: Stage, cause: &FlowError) {
        let current = match self.inner.repo.load(id).await {
            Ok(p) => p,
            Err(e) => {
                error!(production = %id, %stage, "Could not reload after a failed result write: {}", e);
                return;
            }
        };
        if current.stage != stage || current.status != Status::InProgress {
            return;
        }
        let failure = StageFailure::new(
            stage,
            FailureKind::ServiceUnavailable,
            format!("stage result could not be saved: {}", cause),
        );
        match self.commit_outcome(&current, stage, Err(failure)).await {
            Ok(_) => warn!(production = %id, %stage, "Result write failed; stage marked as error"),
            Err(e) => {
                error!(production = %id, %stage, "Production left in progress after a failed result write: {}", e)
            }
        }
    }

    /// Reconciles one stage result against the production it was generated
    /// for.
    async fn commit_outcome(
        &self,
        current: &Production,
        stage: Stage,
        outcome: Result<StageOutput, StageFailure>,
    ) -> Result<(Production, Effect), FlowError> {
        let event = match &outcome {
            Ok(_) => Event::StageSucceeded(stage),
            Err(_) => Event::StageFailed(stage),
        };
        let transition = next((current.stage, current.status), &event)?;

        let mut updated = current.clone();
        updated.stage = transition.stage;
        updated.status = transition.status;
        let message = match outcome {
            Ok(output) => {
                let content = describe_output(&output, current);
                let data = output.to_json();
                updated.apply_output(output);
                NewMessage::agent(stage, content, data)
            }
            Err(failure) => {
                let message = NewMessage::system(stage, failure.to_string())
                    .with_kind(failure.kind.as_str())
                    .with_data(json!({
                        "kind": failure.kind.as_str(),
                        "retryable": failure.kind.retryable(),
                        "message": failure.message,
                    }));
                updated.last_error = Some(failure);
                message
            }
        };

        let production = self.commit(&updated, current.version, &[message]).await?;
        info!(
            production = %production.id,
            event = %event.name(),
            stage = %production.stage,
            status = %production.status,
            version = production.version,
            "Stage result committed"
        );
        Ok((production, transition.effect))
    }

    /// CAS write plus publish, serialized per production so subscribers see
    /// updates in sequence order.
    async fn commit(
        &self,
        production: &Production,
        expected_version: i64,
        messages: &[NewMessage],
    ) -> Result<Production, FlowError> {
        production.check_invariants().map_err(|reason| {
            error!(production = %production.id, "Refusing to write inconsistent production: {}", reason);
            FlowError::Storage(format!("invariant violated: {}", reason))
        })?;

        let lock = self.commit_lock(&production.id).await;
        let _guard = lock.lock().await;
        let saved = match self
            .inner
            .repo
            .compare_and_save(production, expected_version, messages)
            .await
        {
            Ok(saved) => saved,
            Err(e @ FlowError::ConcurrencyConflict { .. }) => {
                warn!(production = %production.id, expected_version, "Write lost a version race");
                return Err(e);
            }
            Err(e @ FlowError::Storage(_)) => {
                error!(production = %production.id, "Storage fault: {}", e);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.inner
            .bridge
            .publish(ProductionUpdate {
                production: saved.production.clone(),
                messages: saved.messages,
            })
            .await;
        Ok(saved.production)
    }

    async fn commit_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.commit_locks.lock().await;
        locks.retain(|key, lock| key == id || Arc::strong_count(lock) > 1);
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests;
