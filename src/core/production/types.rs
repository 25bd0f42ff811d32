use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analysis,
    Ideation,
    Research,
    Narrative,
    Writing,
    Completed,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Analysis,
        Stage::Ideation,
        Stage::Research,
        Stage::Narrative,
        Stage::Writing,
        Stage::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Analysis => "analysis",
            Stage::Ideation => "ideation",
            Stage::Research => "research",
            Stage::Narrative => "narrative",
            Stage::Writing => "writing",
            Stage::Completed => "completed",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "analysis" => Some(Stage::Analysis),
            "ideation" => Some(Stage::Ideation),
            "research" => Some(Stage::Research),
            "narrative" => Some(Stage::Narrative),
            "writing" => Some(Stage::Writing),
            "completed" => Some(Stage::Completed),
            _ => None,
        }
    }

    /// Human-gated stages park at `Touchpoint` waiting for a decision.
    pub fn is_touchpoint(self) -> bool {
        matches!(self, Stage::Ideation | Stage::Narrative)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Touchpoint,
    Completed,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Touchpoint => "touchpoint",
            Status::Completed => "completed",
            Status::Error => "error",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Status::Pending),
            "in_progress" => Some(Status::InProgress),
            "touchpoint" => Some(Status::Touchpoint),
            "completed" => Some(Status::Completed),
            "error" => Some(Status::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Stage payloads ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    #[serde(default)]
    pub rank: u32,
    pub title: String,
    pub justification: String,
    pub suggested_format: String,
    #[serde(default)]
    pub format_justification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub value: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseStudy {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialVoice {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub quotes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchMap {
    #[serde(default)]
    pub numerical_data: Vec<DataPoint>,
    #[serde(default)]
    pub cases: Vec<CaseStudy>,
    #[serde(default)]
    pub narratives_metaphors: Vec<String>,
    #[serde(default)]
    pub social_voice: SocialVoice,
    #[serde(default)]
    pub antagonists: Vec<String>,
    #[serde(default)]
    pub cultural_trends: Vec<String>,
    pub central_message_connection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AidaPhase {
    Attention,
    Interest,
    Desire,
    Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AidaBlock {
    pub phase: AidaPhase,
    #[serde(default)]
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Angle {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sample_hook: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeSkeleton {
    pub blocks: Vec<AidaBlock>,
    pub angle_variations: Vec<Angle>,
    #[serde(default)]
    pub validation_notes: String,
}

impl NarrativeSkeleton {
    /// Case-insensitive lookup; returns the angle with its canonical name.
    pub fn find_angle(&self, name: &str) -> Option<&Angle> {
        let wanted = name.trim();
        self.angle_variations
            .iter()
            .find(|a| a.name.trim().eq_ignore_ascii_case(wanted))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub hook: String,
    pub interest: String,
    pub desire: String,
    pub action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleCheck {
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalContent {
    pub full_script: Script,
    #[serde(default)]
    pub style_checker: StyleCheck,
    #[serde(default)]
    pub caption_suggestion: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

/// Typed result of one generating stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Analysis(Vec<Theme>),
    Research(ResearchMap),
    Narrative(NarrativeSkeleton),
    Writing(FinalContent),
}

impl StageOutput {
    pub fn stage(&self) -> Stage {
        match self {
            StageOutput::Analysis(_) => Stage::Analysis,
            StageOutput::Research(_) => Stage::Research,
            StageOutput::Narrative(_) => Stage::Narrative,
            StageOutput::Writing(_) => Stage::Writing,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let value = match self {
            StageOutput::Analysis(themes) => serde_json::to_value(themes),
            StageOutput::Research(map) => serde_json::to_value(map),
            StageOutput::Narrative(skeleton) => serde_json::to_value(skeleton),
            StageOutput::Writing(content) => serde_json::to_value(content),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

// ── Failures ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("quota exceeded")]
    QuotaExceeded,
    #[error("malformed response")]
    MalformedResponse,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ServiceUnavailable => "service_unavailable",
            FailureKind::QuotaExceeded => "quota_exceeded",
            FailureKind::MalformedResponse => "malformed_response",
        }
    }

    /// Transport-level failures clear up on their own; a malformed response
    /// usually repeats until the prompt or context changes.
    pub fn retryable(self) -> bool {
        !matches!(self, FailureKind::MalformedResponse)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{stage} failed ({kind}): {message}")]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: Stage, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }
}

// ── Production ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Production {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub slug: String,
    pub stage: Stage,
    pub status: Status,
    pub client_context: String,
    pub tone_of_voice: String,
    pub themes: Vec<Theme>,
    pub selected_theme_index: Option<usize>,
    pub research_map: Option<ResearchMap>,
    pub narrative_skeleton: Option<NarrativeSkeleton>,
    pub selected_angle: Option<String>,
    pub final_content: Option<FinalContent>,
    pub last_error: Option<StageFailure>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Production {
    pub fn new(owner_id: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: name.trim().to_string(),
            slug: slugify(name),
            stage: Stage::Analysis,
            status: Status::Pending,
            client_context: String::new(),
            tone_of_voice: String::new(),
            themes: Vec::new(),
            selected_theme_index: None,
            research_map: None,
            narrative_skeleton: None,
            selected_angle: None,
            final_content: None,
            last_error: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    pub fn selected_theme(&self) -> Option<&Theme> {
        self.selected_theme_index.and_then(|i| self.themes.get(i))
    }

    /// Drops everything a stage produced or a human chose. Configuration and
    /// identity stay.
    pub fn clear_derived(&mut self) {
        self.themes.clear();
        self.selected_theme_index = None;
        self.research_map = None;
        self.narrative_skeleton = None;
        self.selected_angle = None;
        self.final_content = None;
        self.last_error = None;
    }

    /// Stores a stage result in its field, replacing any earlier result for
    /// the same stage.
    pub fn apply_output(&mut self, output: StageOutput) {
        match output {
            StageOutput::Analysis(themes) => {
                self.themes = themes;
                self.selected_theme_index = None;
            }
            StageOutput::Research(map) => self.research_map = Some(map),
            StageOutput::Narrative(skeleton) => {
                self.narrative_skeleton = Some(skeleton);
                self.selected_angle = None;
            }
            StageOutput::Writing(content) => self.final_content = Some(content),
        }
    }

    /// Checks the co-dependence between the current stage/status and the
    /// output fields.
    pub fn check_invariants(&self) -> Result<(), String> {
        if (self.stage == Stage::Completed) != (self.status == Status::Completed) {
            return Err(format!(
                "stage {} cannot carry status {}",
                self.stage, self.status
            ));
        }
        if self.status == Status::Touchpoint && !self.stage.is_touchpoint() {
            return Err(format!("touchpoint is not allowed at stage {}", self.stage));
        }
        if (self.status == Status::Error) != self.last_error.is_some() {
            return Err("last_error must be set exactly when status is error".to_string());
        }
        if self.status == Status::Pending {
            if self.stage != Stage::Analysis {
                return Err(format!("pending production at stage {}", self.stage));
            }
            if !self.themes.is_empty()
                || self.selected_theme_index.is_some()
                || self.research_map.is_some()
                || self.narrative_skeleton.is_some()
                || self.selected_angle.is_some()
                || self.final_content.is_some()
            {
                return Err("pending production carries derived state".to_string());
            }
            return Ok(());
        }

        if self.stage >= Stage::Ideation && self.themes.is_empty() {
            return Err("themes are required from ideation onwards".to_string());
        }
        if self.stage >= Stage::Research {
            match self.selected_theme_index {
                Some(i) if i < self.themes.len() => {}
                Some(i) => {
                    return Err(format!(
                        "selected theme index {} out of range (0..{})",
                        i,
                        self.themes.len()
                    ));
                }
                None => return Err("a theme must be selected from research onwards".to_string()),
            }
        }
        if self.stage >= Stage::Narrative && self.research_map.is_none() {
            return Err("research map is required from narrative onwards".to_string());
        }
        let skeleton_required = self.stage > Stage::Narrative
            || (self.stage == Stage::Narrative && self.status == Status::Touchpoint);
        if skeleton_required && self.narrative_skeleton.is_none() {
            return Err("narrative skeleton is required at the narrative touchpoint".to_string());
        }
        if self.stage >= Stage::Writing {
            let angle = self
                .selected_angle
                .as_deref()
                .ok_or_else(|| "an angle must be approved from writing onwards".to_string())?;
            let known = self
                .narrative_skeleton
                .as_ref()
                .and_then(|s| s.find_angle(angle))
                .is_some();
            if !known {
                return Err(format!("approved angle '{}' is not in the skeleton", angle));
            }
        }
        if self.stage == Stage::Completed && self.final_content.is_none() {
            return Err("completed production has no final content".to_string());
        }
        Ok(())
    }
}

/// Lowercase ascii slug; runs of anything else collapse into a single `-`.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "production".to_string()
    } else {
        out
    }
}

// ── Messages ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::System => "system",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "agent" => Some(Role::Agent),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// A message as it is persisted. `sequence` is assigned by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub production_id: String,
    pub role: Role,
    pub stage: Stage,
    pub content: String,
    pub data: serde_json::Value,
    pub kind: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub sequence: i64,
}

/// A message waiting to be written alongside a production update.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: Role,
    pub stage: Stage,
    pub content: String,
    pub data: serde_json::Value,
    pub kind: Option<String>,
}

impl NewMessage {
    pub fn user(stage: Stage, content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            stage,
            content: content.into(),
            data: serde_json::Value::Null,
            kind: None,
        }
    }

    pub fn agent(stage: Stage, content: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            role: Role::Agent,
            stage,
            content: content.into(),
            data,
            kind: None,
        }
    }

    pub fn system(stage: Stage, content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            stage,
            content: content.into(),
            data: serde_json::Value::Null,
            kind: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }
}
