//! Amal Kitchen
//!
//! Storefront order logic and the kitchen-ticket print pipeline for Amal
//! Snack. The `amal-kitchen` binary parses the command line and hands off to
//! the handlers in [`commands`], which return JSON payloads in the
//! `{ "success": .. }` shape the admin dashboard already understands.

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod arabic;
pub mod bitmap;
pub mod cart;
pub mod checkout;
pub mod commands;
pub mod db;
pub mod diagnostics;
pub mod epos;
pub mod error;
pub mod menu;
pub mod order;
pub mod print;
pub mod printers;
pub mod raster;
pub mod receipt_renderer;
pub mod sales;
pub mod schedule;
pub mod settings;

/// First non-blank string among `keys`, trimmed.
pub(crate) fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn value_f64(v: &serde_json::Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_f64()) {
            return Some(n);
        }
    }
    None
}

pub(crate) fn value_i64(v: &serde_json::Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_i64()) {
            return Some(n);
        }
    }
    None
}

// ============================================================================
// Logging
// ============================================================================

/// Install console (stderr) and daily rolling file logging.
///
/// The console gets compact human lines; the files get one JSON object per
/// event. `RUST_LOG` wins when set. The returned guard flushes the file
/// writer when dropped, so the caller keeps it alive until exit.
pub fn init_logging(verbose: bool) -> tracing_appender::non_blocking::WorkerGuard {
    let default_filter = if verbose {
        "info,amal_kitchen_lib=debug"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Prune old log files before setting up the appender
    diagnostics::prune_old_logs();

    let log_dir = diagnostics::get_log_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_current_span(false);
    // stdout carries command output
    let console_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(verbose);

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            log_dir = %log_dir.display(),
            "Amal Kitchen starting"
        );
    }
    guard
}
