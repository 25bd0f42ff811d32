//! Durable production rows and the append-only message log.

mod productions;
mod rows;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::production::{FlowError, Message, NewMessage, Production};
use crate::platform::{NativePlatform, Platform};

pub const DB_FILE: &str = "etherflow.db";

/// A production as committed, with the messages written in the same
/// transaction (sequences assigned).
#[derive(Debug, Clone)]
pub struct SavedProduction {
    pub production: Production,
    pub messages: Vec<Message>,
}

/// Storage seam for the orchestrator.
///
/// `compare_and_save` is the concurrency control point: the update applies only
/// if the stored version still equals `expected_version`, and the production
/// row and its messages commit or roll back together.
#[async_trait]
pub trait ProductionRepository: Send + Sync {
    /// Inserts a new production at version 0 together with its first messages.
    async fn create(
        &self,
        production: &Production,
        messages: &[NewMessage],
    ) -> Result<SavedProduction, FlowError>;

    async fn load(&self, id: &str) -> Result<Production, FlowError>;

    async fn compare_and_save(
        &self,
        production: &Production,
        expected_version: i64,
        messages: &[NewMessage],
    ) -> Result<SavedProduction, FlowError>;

    async fn append_message(
        &self,
        production_id: &str,
        message: NewMessage,
    ) -> Result<Message, FlowError>;

    /// Messages with `sequence > after_sequence`, ascending.
    async fn list_messages(
        &self,
        production_id: &str,
        after_sequence: i64,
    ) -> Result<Vec<Message>, FlowError>;

    /// Most recently updated first.
    async fn list(&self, owner_id: Option<&str>, limit: usize)
    -> Result<Vec<Production>, FlowError>;

    async fn list_in_progress(&self) -> Result<Vec<Production>, FlowError>;
}

pub struct SqliteProductionRepository {
    db: Arc<Mutex<Connection>>,
}

impl SqliteProductionRepository {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        if !data_dir.exists() {
            tokio::fs::create_dir_all(data_dir).await?;
        }
        NativePlatform::restrict_dir_permissions(data_dir);

        let db_path = data_dir.join(DB_FILE);
        let db = Connection::open(&db_path)?;
        NativePlatform::restrict_file_permissions(&db_path);
        init_schema(&db)?;
        info!("Production store opened at {}", db_path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        init_schema(&db)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }
}

fn init_schema(db: &Connection) -> Result<()> {
    db.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS productions (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            stage TEXT NOT NULL,
            status TEXT NOT NULL,
            client_context TEXT NOT NULL,
            tone_of_voice TEXT NOT NULL,
            themes_json TEXT NOT NULL DEFAULT '[]',
            selected_theme_index INTEGER,
            research_json TEXT,
            narrative_json TEXT,
            selected_angle TEXT,
            final_content_json TEXT,
            last_error_json TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS production_messages (
            id TEXT PRIMARY KEY,
            production_id TEXT NOT NULL REFERENCES productions(id),
            sequence INTEGER NOT NULL,
            role TEXT NOT NULL,
            stage TEXT NOT NULL,
            content TEXT NOT NULL,
            data_json TEXT NOT NULL DEFAULT 'null',
            kind TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (production_id, sequence)
        )",
        [],
    )?;

    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_productions_status ON productions(status)",
        [],
    )?;
    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_productions_owner_updated ON productions(owner_id, updated_at)",
        [],
    )?;
    Ok(())
}

/// On-disk repository in a throwaway directory, for tests that need a real
/// file (and therefore real locking).
#[cfg(test)]
pub async fn test_repository() -> (SqliteProductionRepository, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let repo = SqliteProductionRepository::open(dir.path())
        .await
        .expect("open test repository");
    (repo, dir)
}
