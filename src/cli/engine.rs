use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use crate::core::config::EtherflowConfig;
use crate::core::llm::{GenericProvider, LlmProvider, ProviderRegistry};
use crate::core::memory::SqliteProductionRepository;
use crate::core::notify::NotificationBridge;
use crate::core::orchestrator::Orchestrator;
use crate::core::stage::StageInvoker;
use crate::platform::{NativePlatform, Platform};

/// Everything a command needs once the data dir, config and provider are
/// resolved.
pub(crate) struct Engine {
    pub orchestrator: Orchestrator,
    pub config: EtherflowConfig,
    pub provider_id: String,
    pub model_id: String,
}

pub(crate) fn data_dir() -> PathBuf {
    NativePlatform::data_dir()
}

/// Resolves the configured provider against the embedded catalog. The API
/// key comes from `api_key_env` when set, otherwise from the provider's own
/// variable.
pub(crate) fn build_provider(config: &EtherflowConfig) -> Result<Arc<dyn LlmProvider>> {
    let registry = ProviderRegistry::load()?;
    let def = registry
        .get_provider(&config.provider)
        .cloned()
        .ok_or_else(|| anyhow!("Unknown provider '{}'. Run 'etherflow providers'.", config.provider))?;

    let model = if config.model.trim().is_empty() {
        def.default_model.clone()
    } else {
        config.model.trim().to_string()
    };
    if !def.knows_model(&model) {
        warn!("Model '{}' is not in the {} catalog; using it as-is", model, def.id);
    }

    let env_key = config
        .api_key_env
        .clone()
        .unwrap_or_else(|| def.auth.env_key.clone());
    let api_key = std::env::var(&env_key)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow!("{} is not set. Export your {} API key first.", env_key, def.name))?;

    Ok(Arc::new(GenericProvider::new(def, model, api_key)))
}

/// Opens the store and wires the orchestrator. Productions left mid-stage by
/// a previous process are marked failed before anything else runs.
pub(crate) async fn boot() -> Result<Engine> {
    let dir = data_dir();
    let config = EtherflowConfig::load(&dir)?;
    let provider = build_provider(&config)?;
    let provider_id = provider.provider_id().to_string();
    let model_id = provider.model_id().to_string();

    let repo = SqliteProductionRepository::open(&dir)
        .await
        .with_context(|| format!("opening store in {}", dir.display()))?;
    let invoker = StageInvoker::new(provider, config.timeouts.clone());
    let orchestrator = Orchestrator::new(
        Arc::new(repo),
        invoker,
        NotificationBridge::new(config.notify_capacity),
    );

    let recovered = orchestrator.recover_interrupted().await?;
    if recovered > 0 {
        warn!("Marked {} interrupted production(s) as failed", recovered);
    }
    info!("Engine ready (provider: {}, model: {})", provider_id, model_id);

    Ok(Engine {
        orchestrator,
        config,
        provider_id,
        model_id,
    })
}
