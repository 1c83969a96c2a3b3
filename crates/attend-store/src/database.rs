use crate::csv;
use attend_core::{
    AttendanceKind, AttendanceRecord, AttendanceSink, Embedding, Identity, IdentityStore,
    SinkError, StoreError,
};
use chrono::{DateTime, Local, NaiveDate};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    key         TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    embedding   TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance (
    id            TEXT PRIMARY KEY,
    timestamp     TEXT NOT NULL,
    day           TEXT NOT NULL,
    identity_key  TEXT NOT NULL,
    name          TEXT NOT NULL,
    kind          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS attendance_day ON attendance (day);
";

const DAY_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// SQLite-backed identity store and attendance log.
pub struct Database {
    conn: Mutex<Connection>,
    export_dir: PathBuf,
}

impl Database {
    /// Open (or create) the database file. Default exports land next to it.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let export_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                std::fs::create_dir_all(dir).map_err(|source| DatabaseError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
                dir.to_path_buf()
            }
            _ => PathBuf::from("."),
        };

        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened attendance database");
        Self::init(conn, export_dir)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory(export_dir: PathBuf) -> Result<Self, DatabaseError> {
        Self::init(Connection::open_in_memory()?, export_dir)
    }

    fn init(conn: Connection, export_dir: PathBuf) -> Result<Self, DatabaseError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            export_dir,
        })
    }

    /// Every record in append order.
    pub fn all_records(&self) -> Result<Vec<AttendanceRecord>, SinkError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, identity_key, name, kind FROM attendance ORDER BY rowid",
            )
            .map_err(sink_err)?;
        let rows = stmt.query_map([], record_row).map_err(sink_err)?;
        collect_records(rows)
    }

    fn default_export_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        self.export_dir
            .join(format!("attendance_export_{stamp}.csv"))
    }
}

impl IdentityStore for Database {
    fn get(&self, key: &str) -> Result<Option<Identity>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT key, name, embedding, created_at FROM identities WHERE key = ?1",
                params![key],
                raw_identity_row,
            )
            .optional()
            .map_err(store_err)?;

        match row {
            Some(raw) => decode_identity(raw)
                .map(Some)
                .map_err(StoreError::Unavailable),
            None => Ok(None),
        }
    }

    fn put(&self, identity: &Identity) -> Result<(), StoreError> {
        let embedding = serde_json::to_string(&identity.embedding)
            .map_err(|e| StoreError::Unavailable(format!("encode embedding: {e}")))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO identities (key, name, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                identity.key,
                identity.name,
                embedding,
                identity.created_at.to_rfc3339()
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let n = conn
            .execute("DELETE FROM identities WHERE key = ?1", params![key])
            .map_err(store_err)?;
        Ok(n > 0)
    }

    /// Rows that fail to decode are logged and left out.
    fn list_all(&self) -> Result<Vec<Identity>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT key, name, embedding, created_at FROM identities ORDER BY key")
            .map_err(store_err)?;
        let rows = stmt.query_map([], raw_identity_row).map_err(store_err)?;

        let mut identities = Vec::new();
        for row in rows {
            let raw = row.map_err(store_err)?;
            let key = raw.0.clone();
            match decode_identity(raw) {
                Ok(identity) => identities.push(identity),
                Err(reason) => tracing::warn!(key = %key, reason = %reason, "skipping corrupt identity row"),
            }
        }
        Ok(identities)
    }
}

impl AttendanceSink for Database {
    fn append(&self, record: &AttendanceRecord) -> Result<(), SinkError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO attendance (id, timestamp, day, identity_key, name, kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid::Uuid::new_v4().to_string(),
                record.timestamp.to_rfc3339(),
                record.timestamp.format(DAY_FORMAT).to_string(),
                record.identity_key,
                record.name,
                record.kind.as_str(),
            ],
        )
        .map_err(sink_err)?;
        Ok(())
    }

    fn query_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, SinkError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, identity_key, name, kind FROM attendance
                 WHERE day = ?1 ORDER BY rowid",
            )
            .map_err(sink_err)?;
        let rows = stmt
            .query_map(params![date.format(DAY_FORMAT).to_string()], record_row)
            .map_err(sink_err)?;
        collect_records(rows)
    }

    fn export(&self, destination: Option<&Path>) -> Result<PathBuf, SinkError> {
        let path = destination
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_export_path());
        let records = self.all_records()?;

        let write = || -> std::io::Result<()> {
            let mut out = BufWriter::new(File::create(&path)?);
            csv::write_row(&mut out, &csv::HEADER)?;
            for r in &records {
                let timestamp = r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
                csv::write_row(
                    &mut out,
                    &[
                        timestamp.as_str(),
                        r.identity_key.as_str(),
                        r.name.as_str(),
                        r.kind.as_str(),
                    ],
                )?;
            }
            out.flush()
        };
        write().map_err(|source| SinkError::Export {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), records = records.len(), "attendance exported");
        Ok(path)
    }
}

type RawIdentity = (String, String, String, String);

fn raw_identity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawIdentity> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_identity((key, name, embedding, created_at): RawIdentity) -> Result<Identity, String> {
    let embedding: Embedding =
        serde_json::from_str(&embedding).map_err(|e| format!("bad embedding for {key}: {e}"))?;
    let created_at = parse_timestamp(&created_at)?;
    Ok(Identity {
        key,
        name,
        embedding,
        created_at,
    })
}

type RawRecord = (String, String, String, String);

fn record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn collect_records<I>(rows: I) -> Result<Vec<AttendanceRecord>, SinkError>
where
    I: Iterator<Item = rusqlite::Result<RawRecord>>,
{
    let mut records = Vec::new();
    for row in rows {
        let (timestamp, identity_key, name, kind) = row.map_err(sink_err)?;
        let timestamp = parse_timestamp(&timestamp).map_err(SinkError::Unavailable)?;
        let kind: AttendanceKind = kind.parse().map_err(SinkError::Unavailable)?;
        records.push(AttendanceRecord {
            timestamp,
            identity_key,
            name,
            kind,
        });
    }
    Ok(records)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Local>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Local))
        .map_err(|e| format!("bad timestamp {s:?}: {e}"))
}

fn store_err(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn sink_err(e: rusqlite::Error) -> SinkError {
    SinkError::Unavailable(e.to_string())
}
