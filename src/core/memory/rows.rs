use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::production::{FlowError, Message, Production, Role, Stage, Status};

pub(super) const PRODUCTION_COLUMNS: &str = "id, owner_id, name, slug, stage, status, \
     client_context, tone_of_voice, themes_json, selected_theme_index, research_json, \
     narrative_json, selected_angle, final_content_json, last_error_json, version, \
     created_at, updated_at";

pub(super) const MESSAGE_COLUMNS: &str =
    "id, production_id, sequence, role, stage, content, data_json, kind, created_at";

/// Raw production row. Decoding into `Production` happens outside the
/// rusqlite closure so JSON failures surface as `FlowError::Storage`.
pub(super) struct ProductionRow {
    id: String,
    owner_id: String,
    name: String,
    slug: String,
    stage: String,
    status: String,
    client_context: String,
    tone_of_voice: String,
    themes_json: String,
    selected_theme_index: Option<i64>,
    research_json: Option<String>,
    narrative_json: Option<String>,
    selected_angle: Option<String>,
    final_content_json: Option<String>,
    last_error_json: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl ProductionRow {
    pub(super) fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            slug: row.get(3)?,
            stage: row.get(4)?,
            status: row.get(5)?,
            client_context: row.get(6)?,
            tone_of_voice: row.get(7)?,
            themes_json: row.get(8)?,
            selected_theme_index: row.get(9)?,
            research_json: row.get(10)?,
            narrative_json: row.get(11)?,
            selected_angle: row.get(12)?,
            final_content_json: row.get(13)?,
            last_error_json: row.get(14)?,
            version: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }

    pub(super) fn into_production(self) -> Result<Production, FlowError> {
        let stage = Stage::from_name(&self.stage)
            .ok_or_else(|| FlowError::Storage(format!("unknown stage '{}'", self.stage)))?;
        let status = Status::from_name(&self.status)
            .ok_or_else(|| FlowError::Storage(format!("unknown status '{}'", self.status)))?;
        Ok(Production {
            stage,
            status,
            themes: serde_json::from_str(&self.themes_json)?,
            selected_theme_index: self
                .selected_theme_index
                .map(|i| {
                    usize::try_from(i)
                        .map_err(|_| FlowError::Storage(format!("negative theme index {}", i)))
                })
                .transpose()?,
            research_map: decode_opt(self.research_json)?,
            narrative_skeleton: decode_opt(self.narrative_json)?,
            selected_angle: self.selected_angle,
            final_content: decode_opt(self.final_content_json)?,
            last_error: decode_opt(self.last_error_json)?,
            version: self.version,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            slug: self.slug,
            client_context: self.client_context,
            tone_of_voice: self.tone_of_voice,
        })
    }
}

pub(super) struct MessageRow {
    id: String,
    production_id: String,
    sequence: i64,
    role: String,
    stage: String,
    content: String,
    data_json: String,
    kind: Option<String>,
    created_at: String,
}

impl MessageRow {
    pub(super) fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            production_id: row.get(1)?,
            sequence: row.get(2)?,
            role: row.get(3)?,
            stage: row.get(4)?,
            content: row.get(5)?,
            data_json: row.get(6)?,
            kind: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    pub(super) fn into_message(self) -> Result<Message, FlowError> {
        Ok(Message {
            role: Role::from_name(&self.role)
                .ok_or_else(|| FlowError::Storage(format!("unknown role '{}'", self.role)))?,
            stage: Stage::from_name(&self.stage)
                .ok_or_else(|| FlowError::Storage(format!("unknown stage '{}'", self.stage)))?,
            data: serde_json::from_str(&self.data_json)?,
            timestamp: parse_time(&self.created_at)?,
            id: self.id,
            production_id: self.production_id,
            content: self.content,
            kind: self.kind,
            sequence: self.sequence,
        })
    }
}

pub(super) fn encode_opt<T: Serialize>(value: Option<&T>) -> Result<Option<String>, FlowError> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(FlowError::from)
}

fn decode_opt<T: DeserializeOwned>(raw: Option<String>) -> Result<Option<T>, FlowError> {
    raw.as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(FlowError::from)
}

/// Fixed-width so lexical order in SQL matches time order.
pub(super) fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, FlowError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FlowError::Storage(format!("bad timestamp '{}': {}", raw, e)))
}
