use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::breaker::notify::{NotificationSink, TransitionNotice};
use crate::logging::log_transition_dropped;

/// SQLite journal of breaker transitions.
pub struct TransitionJournal {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JournalRow {
    pub ts: String,
    pub category: String,
    pub from_status: String,
    pub to_status: String,
    pub reason: String,
    pub trigger_id: Option<String>,
    pub severity: Option<u8>,
}

impl TransitionJournal {
    pub fn open(path: &str) -> Result<Self> {
        let journal = Self { conn: Mutex::new(Connection::open(path)?) };
        journal.init()?;
        Ok(journal)
    }

    pub fn in_memory() -> Result<Self> {
        let journal = Self { conn: Mutex::new(Connection::open_in_memory()?) };
        journal.init()?;
        Ok(journal)
    }

    fn init(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS breaker_transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                category TEXT NOT NULL,
                from_status TEXT NOT NULL,
                to_status TEXT NOT NULL,
                reason TEXT NOT NULL,
                trigger_id TEXT,
                severity INTEGER,
                event_json TEXT
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn record(&self, notice: &TransitionNotice) -> Result<()> {
        let event_json = notice.event.as_ref().map(serde_json::to_string).transpose()?;
        self.conn.lock().execute(
            "INSERT INTO breaker_transitions
                (ts, category, from_status, to_status, reason, trigger_id, severity, event_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                notice.at.to_rfc3339(),
                notice.category.as_str(),
                notice.from.as_str(),
                notice.to.as_str(),
                notice.reason,
                notice.event.as_ref().map(|e| e.trigger_id.clone()),
                notice.event.as_ref().map(|e| e.severity as i64),
                event_json,
            ],
        )?;
        Ok(())
    }

    /// Most recent transitions first.
    pub fn recent(&self, limit: usize) -> Result<Vec<JournalRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT ts, category, from_status, to_status, reason, trigger_id, severity
             FROM breaker_transitions ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(JournalRow {
                    ts: row.get(0)?,
                    category: row.get(1)?,
                    from_status: row.get(2)?,
                    to_status: row.get(3)?,
                    reason: row.get(4)?,
                    trigger_id: row.get(5)?,
                    severity: row.get::<_, Option<i64>>(6)?.map(|s| s as u8),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl NotificationSink for TransitionJournal {
    fn notify(&self, notice: &TransitionNotice) {
        if let Err(err) = self.record(notice) {
            log_transition_dropped(notice.category.as_str(), "journal_write_failed", &err.to_string());
        }
    }
}
