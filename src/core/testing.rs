//! Shared test fixtures: a scripted completion provider and sample payloads.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Semaphore;

use crate::core::llm::{LlmError, LlmProvider};
use crate::core::production::{
    AidaBlock, AidaPhase, Angle, CaseStudy, DataPoint, FinalContent, NarrativeSkeleton, Production,
    ResearchMap, Script, SocialVoice, Stage, Status, StyleCheck, Theme,
};

pub type CallLog = Arc<Mutex<Vec<(String, String)>>>;

/// Replies from per-stage queues. The stage is recognised from the system
/// prompt. An empty queue answers `Unavailable`.
pub struct ScriptedProvider {
    replies: Mutex<HashMap<Stage, VecDeque<Result<String, LlmError>>>>,
    calls: CallLog,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
            gate: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Each reply waits for one permit; tests release replies with
    /// `add_permits`.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn push(&self, stage: Stage, reply: Result<String, LlmError>) {
        self.replies
            .lock()
            .unwrap()
            .entry(stage)
            .or_default()
            .push_back(reply);
    }

    /// Every `(system, user)` prompt pair received so far.
    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }

    /// Queues one good reply for each generating stage.
    pub fn happy_path() -> Self {
        let provider = Self::new();
        provider.push(Stage::Analysis, Ok(analysis_reply(10)));
        provider.push(Stage::Research, Ok(research_reply()));
        provider.push(Stage::Narrative, Ok(narrative_reply()));
        provider.push(Stage::Writing, Ok(writing_reply()));
        provider
    }
}

fn stage_of(system_prompt: &str) -> Option<Stage> {
    [
        ("ANALYSIS", Stage::Analysis),
        ("RESEARCH", Stage::Research),
        ("NARRATIVE", Stage::Narrative),
        ("WRITING", Stage::Writing),
    ]
    .into_iter()
    .find(|(marker, _)| system_prompt.contains(marker))
    .map(|(_, stage)| stage)
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_id(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-1"
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| LlmError::Unavailable("gate closed".to_string()))?
                .forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let stage = stage_of(system_prompt)
            .ok_or_else(|| LlmError::Unavailable("unrecognised prompt".to_string()))?;
        self.replies
            .lock()
            .unwrap()
            .get_mut(&stage)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Err(LlmError::Unavailable(format!("no reply queued for {}", stage))))
    }
}

// ── Payload fixtures ──

pub fn sample_themes(n: usize) -> Vec<Theme> {
    (1..=n)
        .map(|i| Theme {
            rank: i as u32,
            title: format!("Theme {}", i),
            justification: format!("Why theme {} resonates", i),
            suggested_format: if i % 2 == 0 { "carousel" } else { "reel" }.to_string(),
            format_justification: format!("Format fits theme {}", i),
        })
        .collect()
}

pub fn sample_research() -> ResearchMap {
    ResearchMap {
        numerical_data: vec![DataPoint {
            value: "63%".to_string(),
            context: "of buyers check origin labels".to_string(),
            source: Some("https://example.org/survey".to_string()),
        }],
        cases: vec![CaseStudy {
            title: "Local roaster doubles reach".to_string(),
            summary: "Short behind-the-scenes reels lifted follows".to_string(),
            source: None,
        }],
        narratives_metaphors: vec!["Coffee as a passport".to_string()],
        social_voice: SocialVoice {
            summary: "People want transparency".to_string(),
            sentiment: "positive".to_string(),
            quotes: vec!["Tell me where it comes from".to_string()],
        },
        antagonists: vec!["Anonymous commodity blends".to_string()],
        cultural_trends: vec!["Slow mornings".to_string()],
        central_message_connection: "Origin is the product".to_string(),
    }
}

pub fn sample_skeleton() -> NarrativeSkeleton {
    NarrativeSkeleton {
        blocks: vec![
            AidaBlock {
                phase: AidaPhase::Attention,
                title: "Hook".to_string(),
                content: "Open on the farm".to_string(),
            },
            AidaBlock {
                phase: AidaPhase::Interest,
                title: "Data".to_string(),
                content: "Cite the 63% figure".to_string(),
            },
            AidaBlock {
                phase: AidaPhase::Desire,
                title: "Story".to_string(),
                content: "The roaster's trip".to_string(),
            },
            AidaBlock {
                phase: AidaPhase::Action,
                title: "CTA".to_string(),
                content: "Visit the shop".to_string(),
            },
        ],
        angle_variations: vec![
            Angle {
                name: "Jornalístico".to_string(),
                description: "Fact first, neutral voice".to_string(),
                sample_hook: "Sixty-three percent.".to_string(),
            },
            Angle {
                name: "Pessoal".to_string(),
                description: "First person, warm".to_string(),
                sample_hook: "I flew 9,000 km for this bean.".to_string(),
            },
            Angle {
                name: "Provocativo".to_string(),
                description: "Challenges the viewer".to_string(),
                sample_hook: "You have no idea what you drink.".to_string(),
            },
        ],
        validation_notes: "Double-check the survey year".to_string(),
    }
}

pub fn sample_content() -> FinalContent {
    FinalContent {
        full_script: Script {
            hook: "You have no idea what you drink.".to_string(),
            interest: "63% of buyers check origin labels.".to_string(),
            desire: "Our beans come with a name and a face.".to_string(),
            action: "Come taste it this Saturday.".to_string(),
        },
        style_checker: StyleCheck {
            approved: true,
            notes: vec!["Tone matches".to_string()],
        },
        caption_suggestion: "Know your cup.".to_string(),
        hashtags: vec!["#coffee".to_string(), "#origin".to_string()],
    }
}

// ── Raw replies, as a model would send them ──

pub fn analysis_reply(n: usize) -> String {
    let reply = json!({ "themes": sample_themes(n) });
    format!("Here are the themes:\n```json\n{}\n```", reply)
}

pub fn research_reply() -> String {
    json!(sample_research()).to_string()
}

pub fn narrative_reply() -> String {
    json!(sample_skeleton()).to_string()
}

pub fn writing_reply() -> String {
    json!(sample_content()).to_string()
}

/// A production parked right before narrative generation.
pub fn production_at_narrative() -> Production {
    let mut p = Production::new("owner-1", "Origin Story");
    p.client_context = "Specialty coffee roaster".to_string();
    p.tone_of_voice = "curious".to_string();
    p.stage = Stage::Narrative;
    p.status = Status::InProgress;
    p.themes = sample_themes(10);
    p.selected_theme_index = Some(2);
    p.research_map = Some(sample_research());
    p
}
