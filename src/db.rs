//! Local SQLite store for Amal Kitchen.
//!
//! Holds everything the storefront and the kitchen dashboard used to keep in
//! browser storage: printer settings, the persisted cart, and the locally
//! cached banner/theme documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, error, info, warn};

/// Shared handle to the local database.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    /// Wrap an already-migrated connection (tests, in-memory stores).
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }
    }
}

const DB_FILE_NAME: &str = "amal-kitchen.db";

/// Ordered schema steps. The last entry's version is the current schema.
const MIGRATIONS: &[(i32, &str, &str)] = &[
    (
        1,
        "printer_settings",
        "CREATE TABLE IF NOT EXISTS kv_settings (
            category TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (category, key)
        );",
    ),
    (
        2,
        "app_settings",
        "CREATE TABLE IF NOT EXISTS app_settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL DEFAULT '{}',
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    ),
];

pub fn schema_version() -> i32 {
    MIGRATIONS.last().map(|(v, _, _)| *v).unwrap_or(0)
}

/// Open (or create) the store at `{data_dir}/amal-kitchen.db`.
///
/// A file that cannot be opened, configured or migrated is treated as corrupt: it is
/// removed together with its WAL sidecars and opened fresh once.
pub fn init(data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(data_dir)
        .map_err(|e| format!("create data dir {}: {e}", data_dir.display()))?;

    let db_path = data_dir.join(DB_FILE_NAME);
    info!(path = %db_path.display(), "Opening local store");

    let conn = open_file(&db_path).or_else(|first| {
        warn!(error = %first, "Local store unusable, recreating");
        for sidecar in ["db", "db-wal", "db-shm"] {
            let _ = fs::remove_file(db_path.with_extension(sidecar));
        }
        open_file(&db_path).map_err(|e| format!("open {} after reset: {e}", db_path.display()))
    })?;

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open an in-memory store with the full schema applied.
pub fn open_in_memory() -> Result<DbState, String> {
    let mut conn = Connection::open_in_memory().map_err(|e| format!("sqlite open: {e}"))?;
    migrate(&mut conn)?;
    Ok(DbState::from_connection(conn))
}

fn open_file(path: &Path) -> Result<Connection, String> {
    let mut conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;
    conn.busy_timeout(Duration::from_secs(5))
        .and_then(|_| conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;"))
        .map_err(|e| format!("pragma setup: {e}"))?;
    migrate(&mut conn)?;
    Ok(conn)
}

/// Highest migration recorded in the store.
pub fn applied_version(conn: &Connection) -> Result<i32, String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("read schema_version: {e}"))
}

/// Apply every step newer than the recorded version, each in its own
/// transaction.
fn migrate(conn: &mut Connection) -> Result<(), String> {
    let current = applied_version(conn)?;
    let pending: Vec<_> = MIGRATIONS.iter().filter(|(v, _, _)| *v > current).collect();
    if pending.is_empty() {
        debug!(version = current, "Local store schema up to date");
        return Ok(());
    }

    for (version, name, sql) in pending {
        let tx = conn.transaction().map_err(|e| format!("begin migration: {e}"))?;
        tx.execute_batch(sql)
            .and_then(|_| tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version]))
            .and_then(|_| tx.commit())
            .map_err(|e| {
                error!(version, name, error = %e, "Migration failed");
                format!("migration v{version} ({name}): {e}")
            })?;
        info!(version, name, "Applied migration");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT value FROM kv_settings WHERE category = ?1 AND key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .optional()
    .unwrap_or_else(|e| {
        warn!(category, key, error = %e, "Setting lookup failed");
        None
    })
}

pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> Result<(), String> {
    conn.execute(
        "INSERT OR REPLACE INTO kv_settings (category, key, value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))",
        params![category, key, value],
    )
    .map_err(|e| format!("set_setting: {e}"))?;
    Ok(())
}

/// Remove a single setting. Missing keys are not an error.
pub fn delete_setting(conn: &Connection, category: &str, key: &str) -> Result<(), String> {
    conn.execute(
        "DELETE FROM kv_settings WHERE category = ?1 AND key = ?2",
        params![category, key],
    )
    .map_err(|e| format!("delete_setting: {e}"))?;
    Ok(())
}

/// All settings of one category as a flat JSON object of strings.
pub fn get_category_settings(conn: &Connection, category: &str) -> Result<serde_json::Value, String> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM kv_settings WHERE category = ?1 ORDER BY key")
        .map_err(|e| format!("get_category_settings: {e}"))?;
    let map = stmt
        .query_map(params![category], |row| {
            Ok((row.get::<_, String>(0)?, serde_json::Value::String(row.get(1)?)))
        })
        .and_then(|rows| rows.collect::<Result<serde_json::Map<_, _>, _>>())
        .map_err(|e| format!("get_category_settings: {e}"))?;
    Ok(serde_json::Value::Object(map))
}

// ---------------------------------------------------------------------------
// JSON documents
// ---------------------------------------------------------------------------

/// Read a JSON document from `app_settings`. Corrupt JSON reads as missing.
pub fn get_document(conn: &Connection, key: &str) -> Result<Option<serde_json::Value>, String> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM app_settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| format!("get_document: {e}"))?;

    Ok(raw.and_then(|text| match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "Ignoring unreadable app_settings document");
            None
        }
    }))
}

/// Upsert a JSON document into `app_settings`.
pub fn put_document(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<(), String> {
    let text = serde_json::to_string(value).map_err(|e| format!("encode document: {e}"))?;
    conn.execute(
        "INSERT INTO app_settings (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at",
        params![key, text],
    )
    .map_err(|e| format!("put_document: {e}"))?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
