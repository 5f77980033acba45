//! `SQLite` sync ledger.
//!
//! Records which UDTs were imported for which schema, so a restart can
//! detect schemas deleted while the service was down, plus a short history
//! of sync operations.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// A UDT imported for a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// UDT name under `_types_`
    pub type_name: String,
    /// Nested UDTs imported alongside it
    pub nested_types: Vec<String>,
    /// Cache name of the schema it came from
    pub schema_name: String,
    /// Hash of the schema text at import time
    pub content_hash: String,
    /// Import time
    pub synced_at: DateTime<Utc>,
}

/// Kind of a recorded sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// UDT imported
    Sync,
    /// UDT removed
    Remove,
}

impl SyncAction {
    /// Stored name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Remove => "remove",
        }
    }

    fn from_stored(value: &str) -> Self {
        if value == "remove" {
            Self::Remove
        } else {
            Self::Sync
        }
    }
}

/// One entry of the sync history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    /// Schema the operation was for
    pub schema_name: String,
    /// What was attempted
    pub action: SyncAction,
    /// Whether the provider accepted it
    pub success: bool,
    /// When it happened
    pub occurred_at: DateTime<Utc>,
}

/// `SQLite`-backed ledger of UDT registrations.
pub struct SyncLedger {
    conn: Connection,
}

impl SyncLedger {
    /// Open or create a ledger database.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened or initialized.
    pub fn open(path: &Path) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        let ledger = Self { conn };
        ledger.init_schema()?;
        Ok(ledger)
    }

    /// Create an in-memory ledger (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be created.
    #[cfg(test)]
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let ledger = Self { conn };
        ledger.init_schema()?;
        Ok(ledger)
    }

    fn init_schema(&self) -> SqliteResult<()> {
        self.conn.execute_batch(
            r"
            -- Imported UDTs and the schema each came from
            CREATE TABLE IF NOT EXISTS udt_registrations (
                type_name TEXT PRIMARY KEY,
                nested_types TEXT NOT NULL DEFAULT '[]',
                schema_name TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                synced_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_udt_registrations_schema
                ON udt_registrations(schema_name);

            -- Sync history
            CREATE TABLE IF NOT EXISTS sync_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                schema_name TEXT NOT NULL,
                action TEXT NOT NULL,
                success INTEGER NOT NULL,
                occurred_at INTEGER NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    /// Record that `type_name` and its `nested_types` were imported from
    /// `schema_name`.
    ///
    /// Any other type previously registered for the same schema is dropped.
    /// Removing the UDTs behind it is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    pub fn record_registration(
        &self,
        type_name: &str,
        nested_types: &[String],
        schema_name: &str,
        content: &str,
    ) -> SqliteResult<()> {
        let nested = serde_json::to_string(nested_types)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.conn.execute(
            "DELETE FROM udt_registrations WHERE schema_name = ?1 AND type_name <> ?2",
            (schema_name, type_name),
        )?;
        self.conn.execute(
            r"
            INSERT OR REPLACE INTO udt_registrations
                (type_name, nested_types, schema_name, content_hash, synced_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            (type_name, nested, schema_name, content_hash(content), Utc::now().timestamp()),
        )?;

        Ok(())
    }

    /// Forget a registration, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub fn remove_registration(&self, type_name: &str) -> SqliteResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM udt_registrations WHERE type_name = ?1", [type_name])?;
        Ok(deleted > 0)
    }

    /// The registration for a schema, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn registration_for(&self, schema_name: &str) -> SqliteResult<Option<Registration>> {
        self.conn
            .query_row(
                r"
                SELECT type_name, nested_types, schema_name, content_hash, synced_at
                FROM udt_registrations
                WHERE schema_name = ?1
                ",
                [schema_name],
                registration_from_row,
            )
            .optional()
    }

    /// All registrations, ordered by schema name.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn registered_schemas(&self) -> SqliteResult<Vec<Registration>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT type_name, nested_types, schema_name, content_hash, synced_at
            FROM udt_registrations
            ORDER BY schema_name ASC, type_name ASC
            ",
        )?;

        let registrations = stmt
            .query_map([], registration_from_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(registrations)
    }

    /// Append to the sync history.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub fn record_event(&self, schema_name: &str, action: SyncAction, success: bool) -> SqliteResult<()> {
        self.conn.execute(
            r"
            INSERT INTO sync_events (schema_name, action, success, occurred_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            (schema_name, action.as_str(), success, Utc::now().timestamp()),
        )?;

        Ok(())
    }

    /// Most recent history entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn recent_events(&self, limit: usize) -> SqliteResult<Vec<SyncEvent>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            r"
            SELECT schema_name, action, success, occurred_at FROM sync_events
            ORDER BY id DESC
            LIMIT ?1
            ",
        )?;

        let events = stmt
            .query_map([limit], |row| {
                let action: String = row.get(1)?;
                Ok(SyncEvent {
                    schema_name: row.get(0)?,
                    action: SyncAction::from_stored(&action),
                    success: row.get(2)?,
                    occurred_at: timestamp(row.get(3)?),
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(events)
    }
}

impl Registration {
    /// The main type followed by its nested types.
    #[must_use]
    pub fn udt_names(&self) -> Vec<String> {
        std::iter::once(self.type_name.clone())
            .chain(self.nested_types.iter().cloned())
            .collect()
    }
}

fn registration_from_row(row: &rusqlite::Row<'_>) -> SqliteResult<Registration> {
    let nested: String = row.get(1)?;
    let nested_types = serde_json::from_str(&nested)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e)))?;
    Ok(Registration {
        type_name: row.get(0)?,
        nested_types,
        schema_name: row.get(2)?,
        content_hash: row.get(3)?,
        synced_at: timestamp(row.get(4)?),
    })
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Stable hex digest of schema text.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrations_round_trip() {
        let ledger = SyncLedger::in_memory().unwrap();
        ledger.record_registration("Sensor", &[], "sensor", "{}").unwrap();
        ledger.record_registration("Pump", &[], "pump", "{}").unwrap();

        let all = ledger.registered_schemas().unwrap();
        let names: Vec<_> = all.iter().map(|r| r.schema_name.as_str()).collect();
        assert_eq!(names, ["pump", "sensor"]);
        assert_eq!(all[0].content_hash, content_hash("{}"));

        let sensor = ledger.registration_for("sensor").unwrap().unwrap();
        assert_eq!(sensor.type_name, "Sensor");

        assert!(ledger.remove_registration("Sensor").unwrap());
        assert!(!ledger.remove_registration("Sensor").unwrap());
        assert!(ledger.registration_for("sensor").unwrap().is_none());
    }

    #[test]
    fn retitled_schema_replaces_registration() {
        let ledger = SyncLedger::in_memory().unwrap();
        ledger.record_registration("OldTitle", &[], "sensor", "v1").unwrap();
        ledger.record_registration("NewTitle", &[], "sensor", "v2").unwrap();

        let all = ledger.registered_schemas().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].type_name, "NewTitle");
        assert_eq!(all[0].content_hash, content_hash("v2"));
    }

    #[test]
    fn events_newest_first() {
        let ledger = SyncLedger::in_memory().unwrap();
        ledger.record_event("a", SyncAction::Sync, true).unwrap();
        ledger.record_event("b", SyncAction::Sync, false).unwrap();
        ledger.record_event("a", SyncAction::Remove, true).unwrap();

        let events = ledger.recent_events(2).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].schema_name, "a");
        assert_eq!(events[0].action, SyncAction::Remove);
        assert_eq!(events[1].schema_name, "b");
        assert!(!events[1].success);
    }

    #[test]
    fn ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let ledger = SyncLedger::open(&path).unwrap();
            ledger
                .record_registration("Tank", &["Tank_inlet".to_string()], "tank", "{}")
                .unwrap();
        }
        let ledger = SyncLedger::open(&path).unwrap();
        let all = ledger.registered_schemas().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].nested_types, ["Tank_inlet"]);
    }

    #[test]
    fn nested_types_are_recorded() {
        let ledger = SyncLedger::in_memory().unwrap();
        let nested = ["Tank_inlet".to_string(), "Tank_outlet".to_string()];
        ledger.record_registration("Tank", &nested, "tank", "{}").unwrap();

        let tank = ledger.registration_for("tank").unwrap().unwrap();
        assert_eq!(tank.nested_types, nested);
        assert_eq!(tank.udt_names(), ["Tank", "Tank_inlet", "Tank_outlet"]);

        ledger.record_registration("Tank", &[], "tank", "{}").unwrap();
        let tank = ledger.registration_for("tank").unwrap().unwrap();
        assert_eq!(tank.udt_names(), ["Tank"]);
    }

    #[test]
    fn hash_is_stable_and_distinct() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 16);
    }
}
