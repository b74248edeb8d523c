use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One terminal resolution, as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub user_id: String,
    pub intent_kind: String,
    pub status: String,
    pub ok: bool,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

pub trait OutcomeJournal: Send + Sync {
    fn record(&self, entry: &JournalEntry) -> Result<(), InfraError>;
    /// Newest first.
    fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<JournalEntry>, InfraError>;
}

const DEFAULT_RETENTION_PER_USER: u32 = 500;

/// Journal over the workspace database. The schema must already exist
/// (`initialize_database` runs at bootstrap).
#[derive(Debug, Clone)]
pub struct SqliteOutcomeJournal {
    db_path: PathBuf,
    retention_per_user: u32,
}

impl SqliteOutcomeJournal {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            retention_per_user: DEFAULT_RETENTION_PER_USER,
        }
    }

    /// Keep at most this many newest entries per user; older rows are pruned on write.
    pub fn with_retention(mut self, retention_per_user: u32) -> Self {
        self.retention_per_user = retention_per_user.max(1);
        self
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Ok(Connection::open(&self.db_path)?)
    }
}

impl OutcomeJournal for SqliteOutcomeJournal {
    fn record(&self, entry: &JournalEntry) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO resolution_log (user_id, intent_kind, status, ok, message, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.user_id,
                entry.intent_kind,
                entry.status,
                entry.ok,
                entry.message,
                entry.recorded_at.to_rfc3339()
            ],
        )?;
        connection.execute(
            "DELETE FROM resolution_log
             WHERE user_id = ?1
               AND id NOT IN (
                 SELECT id FROM resolution_log
                 WHERE user_id = ?1
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT ?2
               )",
            params![entry.user_id, self.retention_per_user],
        )?;
        Ok(())
    }

    fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<JournalEntry>, InfraError> {
        let connection = self.connect()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut statement = connection.prepare(
            "SELECT user_id, intent_kind, status, ok, message, recorded_at
             FROM resolution_log
             WHERE user_id = ?1
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = statement.query_map(params![user_id, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (user_id, intent_kind, status, ok, message, recorded_at_raw) = row?;
            let recorded_at = DateTime::parse_from_rfc3339(&recorded_at_raw)
                .map_err(|error| {
                    InfraError::Decode(format!(
                        "invalid resolution_log.recorded_at '{recorded_at_raw}': {error}"
                    ))
                })?
                .with_timezone(&Utc);
            entries.push(JournalEntry {
                user_id,
                intent_kind,
                status,
                ok,
                message,
                recorded_at,
            });
        }
        Ok(entries)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOutcomeJournal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl InMemoryOutcomeJournal {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<JournalEntry>>, InfraError> {
        self.entries
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("journal lock poisoned: {error}")))
    }
}

impl OutcomeJournal for InMemoryOutcomeJournal {
    fn record(&self, entry: &JournalEntry) -> Result<(), InfraError> {
        self.lock()?.push(entry.clone());
        Ok(())
    }

    fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<JournalEntry>, InfraError> {
        Ok(self
            .lock()?
            .iter()
            .rev()
            .filter(|entry| entry.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
