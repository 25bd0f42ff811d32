use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::production::Stage;

pub const CONFIG_FILE: &str = "config.toml";

/// Runtime configuration, read from `<data_dir>/config.toml`. Every field has
/// a default so a missing file or a partial file both work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtherflowConfig {
    pub provider: String,
    /// Empty means the provider's default model.
    pub model: String,
    /// Overrides the provider's own API key variable.
    pub api_key_env: Option<String>,
    pub api_host: String,
    pub api_port: u16,
    pub default_owner: String,
    /// Buffered updates per production before a slow subscriber lags.
    pub notify_capacity: usize,
    pub timeouts: StageTimeouts,
}

impl Default for EtherflowConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: String::new(),
            api_key_env: None,
            api_host: "127.0.0.1".to_string(),
            api_port: 17990,
            default_owner: "local".to_string(),
            notify_capacity: 64,
            timeouts: StageTimeouts::default(),
        }
    }
}

/// Per-stage ceiling on the completion call, in seconds. Research is
/// generous since providers may browse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub analysis_secs: u64,
    pub research_secs: u64,
    pub narrative_secs: u64,
    pub writing_secs: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            analysis_secs: 90,
            research_secs: 240,
            narrative_secs: 120,
            writing_secs: 120,
        }
    }
}

impl StageTimeouts {
    pub fn for_stage(&self, stage: Stage) -> Duration {
        let secs = match stage {
            Stage::Analysis => self.analysis_secs,
            Stage::Research => self.research_secs,
            Stage::Narrative => self.narrative_secs,
            Stage::Writing => self.writing_secs,
            Stage::Ideation | Stage::Completed => 0,
        };
        Duration::from_secs(secs.max(1))
    }
}

impl EtherflowConfig {
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(CONFIG_FILE);
        std::fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
