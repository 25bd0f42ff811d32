use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{OptionalExtension, Transaction, params};

use super::rows::{
    MESSAGE_COLUMNS, MessageRow, PRODUCTION_COLUMNS, ProductionRow, encode_opt, format_time,
};
use super::{ProductionRepository, SavedProduction, SqliteProductionRepository};
use crate::core::production::{FlowError, Message, NewMessage, Production};

/// Storage keeps microseconds; trim up front so what we hand back equals
/// what a later load returns.
fn stamp(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(6)
}

fn production_exists(tx: &Transaction<'_>, id: &str) -> Result<bool, FlowError> {
    let found: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM productions WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Appends messages after the current highest sequence. Runs inside the
/// caller's transaction so sequences stay gap-free and unique.
fn insert_messages(
    tx: &Transaction<'_>,
    production_id: &str,
    messages: &[NewMessage],
    now: DateTime<Utc>,
) -> Result<Vec<Message>, FlowError> {
    if messages.is_empty() {
        return Ok(Vec::new());
    }
    let last: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sequence), 0) FROM production_messages WHERE production_id = ?1",
        params![production_id],
        |row| row.get(0),
    )?;

    let mut stmt = tx.prepare(
        "INSERT INTO production_messages \
         (id, production_id, sequence, role, stage, content, data_json, kind, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    let mut saved = Vec::with_capacity(messages.len());
    for (offset, msg) in messages.iter().enumerate() {
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            production_id: production_id.to_string(),
            role: msg.role,
            stage: msg.stage,
            content: msg.content.clone(),
            data: msg.data.clone(),
            kind: msg.kind.clone(),
            timestamp: now,
            sequence: last + offset as i64 + 1,
        };
        stmt.execute(params![
            message.id,
            message.production_id,
            message.sequence,
            message.role.as_str(),
            message.stage.as_str(),
            message.content,
            serde_json::to_string(&message.data)?,
            message.kind,
            format_time(&message.timestamp),
        ])?;
        saved.push(message);
    }
    Ok(saved)
}

#[async_trait]
impl ProductionRepository for SqliteProductionRepository {
    async fn create(
        &self,
        production: &Production,
        messages: &[NewMessage],
    ) -> Result<SavedProduction, FlowError> {
        let mut saved = production.clone();
        saved.created_at = stamp(saved.created_at);
        saved.updated_at = stamp(saved.updated_at);

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        if production_exists(&tx, &saved.id)? {
            return Err(FlowError::Storage(format!(
                "production {} already exists",
                saved.id
            )));
        }
        tx.execute(
            &format!(
                "INSERT INTO productions ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                PRODUCTION_COLUMNS
            ),
            params![
                saved.id,
                saved.owner_id,
                saved.name,
                saved.slug,
                saved.stage.as_str(),
                saved.status.as_str(),
                saved.client_context,
                saved.tone_of_voice,
                serde_json::to_string(&saved.themes)?,
                saved.selected_theme_index.map(|i| i as i64),
                encode_opt(saved.research_map.as_ref())?,
                encode_opt(saved.narrative_skeleton.as_ref())?,
                saved.selected_angle,
                encode_opt(saved.final_content.as_ref())?,
                encode_opt(saved.last_error.as_ref())?,
                saved.version,
                format_time(&saved.created_at),
                format_time(&saved.updated_at),
            ],
        )?;
        let messages = insert_messages(&tx, &saved.id, messages, saved.updated_at)?;
        tx.commit()?;

        Ok(SavedProduction {
            production: saved,
            messages,
        })
    }

    async fn load(&self, id: &str) -> Result<Production, FlowError> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                &format!("SELECT {} FROM productions WHERE id = ?1", PRODUCTION_COLUMNS),
                params![id],
                ProductionRow::read,
            )
            .optional()?;
        match row {
            Some(row) => row.into_production(),
            None => Err(FlowError::NotFound(id.to_string())),
        }
    }

    async fn compare_and_save(
        &self,
        production: &Production,
        expected_version: i64,
        messages: &[NewMessage],
    ) -> Result<SavedProduction, FlowError> {
        let now = stamp(Utc::now());
        let mut saved = production.clone();
        saved.version = expected_version + 1;
        saved.updated_at = now;

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let changed = tx.execute(
            "UPDATE productions SET \
                name = ?1, slug = ?2, stage = ?3, status = ?4, client_context = ?5, \
                tone_of_voice = ?6, themes_json = ?7, selected_theme_index = ?8, \
                research_json = ?9, narrative_json = ?10, selected_angle = ?11, \
                final_content_json = ?12, last_error_json = ?13, version = ?14, updated_at = ?15 \
             WHERE id = ?16 AND version = ?17",
            params![
                saved.name,
                saved.slug,
                saved.stage.as_str(),
                saved.status.as_str(),
                saved.client_context,
                saved.tone_of_voice,
                serde_json::to_string(&saved.themes)?,
                saved.selected_theme_index.map(|i| i as i64),
                encode_opt(saved.research_map.as_ref())?,
                encode_opt(saved.narrative_skeleton.as_ref())?,
                saved.selected_angle,
                encode_opt(saved.final_content.as_ref())?,
                encode_opt(saved.last_error.as_ref())?,
                saved.version,
                format_time(&saved.updated_at),
                saved.id,
                expected_version,
            ],
        )?;
        if changed == 0 {
            // Dropping the transaction rolls it back.
            return Err(if production_exists(&tx, &saved.id)? {
                FlowError::ConcurrencyConflict {
                    production_id: saved.id.clone(),
                    expected_version,
                }
            } else {
                FlowError::NotFound(saved.id.clone())
            });
        }
        let messages = insert_messages(&tx, &saved.id, messages, now)?;
        tx.commit()?;

        Ok(SavedProduction {
            production: saved,
            messages,
        })
    }

    async fn append_message(
        &self,
        production_id: &str,
        message: NewMessage,
    ) -> Result<Message, FlowError> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        if !production_exists(&tx, production_id)? {
            return Err(FlowError::NotFound(production_id.to_string()));
        }
        let mut saved = insert_messages(&tx, production_id, &[message], stamp(Utc::now()))?;
        tx.commit()?;
        saved
            .pop()
            .ok_or_else(|| FlowError::Storage("message insert returned nothing".to_string()))
    }

    async fn list_messages(
        &self,
        production_id: &str,
        after_sequence: i64,
    ) -> Result<Vec<Message>, FlowError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM production_messages \
             WHERE production_id = ?1 AND sequence > ?2 ORDER BY sequence ASC",
            MESSAGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![production_id, after_sequence], MessageRow::read)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?.into_message()?);
        }
        Ok(results)
    }

    async fn list(
        &self,
        owner_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Production>, FlowError> {
        let db = self.db.lock().await;
        let mut results = Vec::new();
        if let Some(owner) = owner_id {
            let mut stmt = db.prepare(&format!(
                "SELECT {} FROM productions WHERE owner_id = ?1 \
                 ORDER BY updated_at DESC LIMIT ?2",
                PRODUCTION_COLUMNS
            ))?;
            let rows = stmt.query_map(params![owner, limit as i64], ProductionRow::read)?;
            for row in rows {
                results.push(row?.into_production()?);
            }
        } else {
            let mut stmt = db.prepare(&format!(
                "SELECT {} FROM productions ORDER BY updated_at DESC LIMIT ?1",
                PRODUCTION_COLUMNS
            ))?;
            let rows = stmt.query_map(params![limit as i64], ProductionRow::read)?;
            for row in rows {
                results.push(row?.into_production()?);
            }
        }
        Ok(results)
    }

    async fn list_in_progress(&self) -> Result<Vec<Production>, FlowError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM productions WHERE status = 'in_progress' ORDER BY updated_at ASC",
            PRODUCTION_COLUMNS
        ))?;
        let rows = stmt.query_map([], ProductionRow::read)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?.into_production()?);
        }
        Ok(results)
    }
}
