use serde_json::{json, Value};
use tracing::info;

use crate::db::DbState;
use crate::diagnostics;

pub fn diagnostics_get_about() -> Result<Value, String> {
    Ok(json!({ "success": true, "about": diagnostics::get_about_info() }))
}

pub fn diagnostics_get_system_health(db: &DbState) -> Result<Value, String> {
    Ok(json!({ "success": true, "health": diagnostics::get_system_health(db)? }))
}

/// Delete all but the newest `keep` log files.
pub fn diagnostics_prune_logs(keep: usize) -> Result<Value, String> {
    let log_dir = diagnostics::get_log_dir();
    let removed = diagnostics::prune_logs_in(&log_dir, keep);
    info!(removed, keep, "Log files pruned");
    Ok(json!({
        "success": true,
        "logDir": log_dir.display().to_string(),
        "removed": removed,
    }))
}
