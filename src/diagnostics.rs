//! Diagnostics for the kitchen tools.
//!
//! Build info for `diagnostics about`, a store and printer health snapshot,
//! and the log directory housekeeping used at startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::{json, Value};
use tracing::warn;

use crate::db::{self, DbState};
use crate::printers::PrinterEndpoint;
use crate::settings::{PrinterSettings, PRINTER_CATEGORY};

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// File name prefix of the daily log files.
pub const LOG_FILE_PREFIX: &str = "kitchen";

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

// ---------------------------------------------------------------------------
// System health
// ---------------------------------------------------------------------------

/// Local store and printer status for `printer show`.
///
/// `storedPrinterSettings` lists only what was saved locally; `printer` is
/// the effective setup after defaults and environment overrides.
pub fn get_system_health(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let schema_version = db::applied_version(&conn)?;
    let stored = db::get_category_settings(&conn, PRINTER_CATEGORY)?;
    let settings = PrinterSettings::load(&conn);
    drop(conn);

    let endpoint = PrinterEndpoint::from_settings(&settings);
    let font = match settings.font_path.as_ref() {
        Some(path) => json!({
            "path": path.display().to_string(),
            "exists": path.is_file(),
        }),
        None => json!({ "bundled": "DejaVu Sans" }),
    };

    Ok(json!({
        "schemaVersion": schema_version,
        "dbPath": db.db_path.display().to_string(),
        "dbSizeBytes": fs::metadata(&db.db_path).map(|m| m.len()).unwrap_or(0),
        "storedPrinterSettings": stored,
        "printer": {
            "ip": settings.ip,
            "deviceId": settings.device_id,
            "timeoutMs": settings.timeout_ms,
            "serviceUrl": endpoint.service_url(),
            "paperDots": settings.paper_dots,
            "font": font,
            "showPrices": settings.show_prices,
        },
        "logDir": get_log_dir().display().to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Log rotation
// ---------------------------------------------------------------------------

/// Default home of the local store and logs.
pub fn get_data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .or_else(|_| std::env::var("LOCALAPPDATA"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("amal-kitchen")
}

/// Returns the log directory path (same location used by lib.rs).
pub fn get_log_dir() -> PathBuf {
    get_data_dir().join("logs")
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs() {
    prune_logs_in(&get_log_dir(), MAX_LOG_FILES);
}

fn is_kitchen_log(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(&format!("{LOG_FILE_PREFIX}.")))
}

/// Delete all but the `keep` newest log files in `log_dir`. Returns how many
/// files were removed.
pub fn prune_logs_in(log_dir: &Path, keep: usize) -> usize {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return 0;
    };

    let mut logs: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_kitchen_log(path))
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();

    // Newest first; daily names sort the same way when mtimes tie.
    logs.sort_unstable_by(|a, b| b.cmp(a));

    logs.into_iter()
        .skip(keep)
        .filter(|(_, path)| match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to prune log file");
                false
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn about_info_has_required_fields() {
        let info = get_about_info();
        assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
        assert!(info.get("buildTimestamp").is_some());
        assert!(info.get("gitSha").is_some());
        assert!(info.get("platform").is_some());
    }

    #[test]
    fn log_dir_is_stable() {
        let d1 = get_log_dir();
        assert_eq!(d1, get_log_dir());
        assert!(d1.ends_with("amal-kitchen/logs"));
    }

    #[test]
    fn prune_keeps_newest_kitchen_logs_only() {
        let dir = tempfile::tempdir().unwrap();
        for day in 1..=5 {
            fs::write(dir.path().join(format!("kitchen.2026-03-0{day}")), "x").unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        let removed = prune_logs_in(dir.path(), 2);
        assert_eq!(removed, 3);
        assert!(dir.path().join("notes.txt").exists());
        let remaining = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("kitchen."))
            .count();
        assert_eq!(remaining, 2);
        assert_eq!(prune_logs_in(&dir.path().join("missing"), 2), 0);
    }

    #[test]
    #[serial_test::serial]
    fn health_reports_schema_and_printer() {
        let state = db::open_in_memory().unwrap();
        let health = get_system_health(&state).unwrap();
        assert_eq!(health["schemaVersion"], 2);
        assert_eq!(health["printer"]["deviceId"], "local_printer");
        assert!(health["printer"]["serviceUrl"]
            .as_str()
            .unwrap()
            .contains("/cgi-bin/epos/service.cgi"));
        assert_eq!(health["printer"]["font"]["bundled"], "DejaVu Sans");
        assert_eq!(health["storedPrinterSettings"], json!({}));

        let conn = state.conn.lock().unwrap();
        db::set_setting(&conn, PRINTER_CATEGORY, "device_id", "kitchen").unwrap();
        drop(conn);
        let health = get_system_health(&state).unwrap();
        assert_eq!(health["storedPrinterSettings"]["device_id"], "kitchen");
        assert_eq!(health["printer"]["deviceId"], "kitchen");
    }
}
