//! Stage invocation: prompt, one completion call, typed output.
//!
//! There is no retry in here. A failed call becomes a `StageFailure` which the
//! orchestrator persists, and a human decides whether to retry.

mod parse;
mod prompts;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::core::config::StageTimeouts;
use crate::core::llm::{LlmError, LlmProvider};
use crate::core::production::{FailureKind, Production, Stage, StageFailure, StageOutput};

pub struct StageInvoker {
    provider: Arc<dyn LlmProvider>,
    timeouts: StageTimeouts,
}

impl StageInvoker {
    pub fn new(provider: Arc<dyn LlmProvider>, timeouts: StageTimeouts) -> Self {
        Self { provider, timeouts }
    }

    pub fn timeout_for(&self, stage: Stage) -> Duration {
        self.timeouts.for_stage(stage)
    }

    pub async fn invoke(
        &self,
        stage: Stage,
        production: &Production,
    ) -> Result<StageOutput, StageFailure> {
        let Some(user_prompt) = prompts::user_prompt(stage, production) else {
            return Err(StageFailure::new(
                stage,
                FailureKind::MalformedResponse,
                format!("{} has no generation step", stage),
            ));
        };
        let system_prompt = prompts::system_prompt(stage);
        let limit = self.timeout_for(stage);
        let started = Instant::now();

        let raw = match tokio::time::timeout(
            limit,
            self.provider.complete(&system_prompt, &user_prompt),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(LlmError::Quota(msg))) => {
                warn!(production = %production.id, %stage, "Completion quota exceeded: {}", msg);
                return Err(StageFailure::new(stage, FailureKind::QuotaExceeded, msg));
            }
            Ok(Err(LlmError::Unavailable(msg))) => {
                warn!(production = %production.id, %stage, "Completion service unavailable: {}", msg);
                return Err(StageFailure::new(stage, FailureKind::ServiceUnavailable, msg));
            }
            Err(_) => {
                warn!(production = %production.id, %stage, "Completion timed out after {:?}", limit);
                return Err(StageFailure::new(
                    stage,
                    FailureKind::ServiceUnavailable,
                    format!("no reply within {}s", limit.as_secs()),
                ));
            }
        };

        match parse::parse_stage_output(stage, &raw) {
            Ok(output) => {
                info!(
                    production = %production.id,
                    %stage,
                    provider = self.provider.provider_id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Stage output accepted"
                );
                Ok(output)
            }
            Err(reason) => {
                warn!(production = %production.id, %stage, "Malformed stage reply: {}", reason);
                Err(StageFailure::new(
                    stage,
                    FailureKind::MalformedResponse,
                    reason,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{ScriptedProvider, analysis_reply, production_at_narrative};

    fn invoker(provider: ScriptedProvider) -> StageInvoker {
        StageInvoker::new(Arc::new(provider), StageTimeouts::default())
    }

    #[tokio::test]
    async fn analysis_prompt_carries_client_context() {
        let provider = ScriptedProvider::new();
        provider.push(Stage::Analysis, Ok(analysis_reply(10)));
        let calls = provider.calls();
        let inv = invoker(provider);

        let mut p = Production::new("o", "n");
        p.client_context = "Vegan bakery in Lisbon".to_string();
        p.tone_of_voice = "warm".to_string();
        let out = inv.invoke(Stage::Analysis, &p).await.unwrap();
        assert!(matches!(out, StageOutput::Analysis(ref t) if t.len() == 10));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.contains("Vegan bakery in Lisbon"));
        assert!(calls[0].1.contains("warm"));
    }

    #[tokio::test]
    async fn narrative_prompt_carries_theme_and_research() {
        let provider = ScriptedProvider::new();
        provider.push(
            Stage::Narrative,
            Ok(crate::core::testing::narrative_reply()),
        );
        let calls = provider.calls();
        let inv = invoker(provider);

        let p = production_at_narrative();
        inv.invoke(Stage::Narrative, &p).await.unwrap();
        let calls = calls.lock().unwrap();
        let theme = p.selected_theme().unwrap();
        assert!(calls[0].1.contains(&theme.justification));
        assert!(calls[0].1.contains("centralMessageConnection"));
    }

    #[tokio::test]
    async fn provider_errors_map_to_failure_kinds() {
        let provider = ScriptedProvider::new();
        provider.push(Stage::Analysis, Err(LlmError::Quota("429".to_string())));
        provider.push(
            Stage::Analysis,
            Err(LlmError::Unavailable("503".to_string())),
        );
        provider.push(Stage::Analysis, Ok("not json at all".to_string()));
        let inv = invoker(provider);
        let p = Production::new("o", "n");

        let kinds: Vec<FailureKind> = [
            inv.invoke(Stage::Analysis, &p).await,
            inv.invoke(Stage::Analysis, &p).await,
            inv.invoke(Stage::Analysis, &p).await,
        ]
        .into_iter()
        .map(|r| r.unwrap_err().kind)
        .collect();
        assert_eq!(
            kinds,
            vec![
                FailureKind::QuotaExceeded,
                FailureKind::ServiceUnavailable,
                FailureKind::MalformedResponse
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_as_unavailable() {
        let provider = ScriptedProvider::new().with_delay(Duration::from_secs(600));
        provider.push(Stage::Analysis, Ok(analysis_reply(3)));
        let inv = invoker(provider);
        let err = inv
            .invoke(Stage::Analysis, &Production::new("o", "n"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::ServiceUnavailable);
        assert!(err.message.contains("no reply within"));
    }

    #[tokio::test]
    async fn gated_stage_cannot_be_invoked() {
        let inv = invoker(ScriptedProvider::new());
        let err = inv
            .invoke(Stage::Ideation, &Production::new("o", "n"))
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Ideation);
    }
}
