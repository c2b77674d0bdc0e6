// Durable trigger records, one row per notification id

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::components::{NotificationError, NotificationResult, TriggerRecord, WorkKind};

/// Persistence of pending trigger records, keyed by notification id
pub trait TriggerStore: Send + Sync {
    fn get(&self, id: &str) -> NotificationResult<Option<TriggerRecord>>;
    /// Insert or replace the record for `id`, scheduled as of now
    fn insert(&self, id: &str, spec: &[u8], trigger: &[u8], work_kind: WorkKind) -> NotificationResult<()> {
        self.insert_record(&TriggerRecord {
            notification_id: id.to_string(),
            notification: Some(spec.to_vec()),
            trigger: trigger.to_vec(),
            work_kind,
            created_at: Utc::now(),
        })
    }
    /// Insert or replace a complete record, keeping its `created_at`
    fn insert_record(&self, record: &TriggerRecord) -> NotificationResult<()>;
    fn delete_by_id(&self, id: &str) -> NotificationResult<()>;
    fn delete_all(&self) -> NotificationResult<()>;
    fn list_all(&self) -> NotificationResult<Vec<TriggerRecord>>;
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS trigger_notification (
    id TEXT PRIMARY KEY NOT NULL,
    notification BLOB,
    trigger_spec BLOB NOT NULL,
    work_request TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

pub struct SqliteTriggerStore {
    conn: Mutex<Connection>,
}

impl SqliteTriggerStore {
    pub fn open(path: impl AsRef<Path>) -> NotificationResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> NotificationResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> NotificationResult<Self> {
        conn.execute(SCHEMA, [])?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<(String, Option<Vec<u8>>, Vec<u8>, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn into_record(
        (id, notification, trigger_spec, work_request, created_at): (String, Option<Vec<u8>>, Vec<u8>, String, String),
    ) -> NotificationResult<TriggerRecord> {
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| NotificationError::Store(format!("Invalid created_at for '{}': {}", id, e)))?
            .with_timezone(&Utc);

        Ok(TriggerRecord {
            notification_id: id,
            notification,
            trigger: trigger_spec,
            work_kind: work_request.parse()?,
            created_at,
        })
    }
}

impl TriggerStore for SqliteTriggerStore {
    fn get(&self, id: &str) -> NotificationResult<Option<TriggerRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, notification, trigger_spec, work_request, created_at
             FROM trigger_notification WHERE id = ?1",
        )?;
        let row = stmt.query_row([id], Self::map_row).optional()?;
        row.map(Self::into_record).transpose()
    }

    fn insert_record(&self, record: &TriggerRecord) -> NotificationResult<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO trigger_notification (id, notification, trigger_spec, work_request, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.notification_id,
                record.notification.as_deref(),
                record.trigger,
                record.work_kind.as_str(),
                record.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn delete_by_id(&self, id: &str) -> NotificationResult<()> {
        self.conn
            .lock()
            .execute("DELETE FROM trigger_notification WHERE id = ?1", [id])?;
        Ok(())
    }

    fn delete_all(&self) -> NotificationResult<()> {
        self.conn.lock().execute("DELETE FROM trigger_notification", [])?;
        Ok(())
    }

    fn list_all(&self) -> NotificationResult<Vec<TriggerRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, notification, trigger_spec, work_request, created_at
             FROM trigger_notification ORDER BY created_at",
        )?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Self::into_record).collect()
    }
}
