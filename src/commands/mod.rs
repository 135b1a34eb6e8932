//! Operator command handlers.
//!
//! Every handler returns a JSON payload with a `success` flag. Printer
//! failures are reported as `success: false` payloads carrying the Arabic
//! message and a stable error category; `Err` is reserved for bad input and
//! local store problems.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod diagnostics;
pub mod print;
pub mod storefront;

pub(crate) fn read_json_file(path: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("read {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("parse {}: {e}", path.display()))
}

pub(crate) fn read_typed_file<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let value = read_json_file(path)?;
    serde_json::from_value(value).map_err(|e| format!("decode {}: {e}", path.display()))
}

/// Rows from a file holding either a bare array or `{ "<key>": [...] }`.
pub(crate) fn read_rows_file(path: &Path, key: &str) -> Result<Vec<Value>, String> {
    match read_json_file(path)? {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut obj) => match obj.remove(key) {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err(format!("{}: expected an array of {key}", path.display())),
        },
        _ => Err(format!("{}: expected an array of {key}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rows_from_bare_or_wrapped_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let bare = dir.path().join("bare.json");
        let wrapped = dir.path().join("wrapped.json");
        let wrong = dir.path().join("wrong.json");
        std::fs::write(&bare, json!([{"id": 1}, {"id": 2}]).to_string()).unwrap();
        std::fs::write(&wrapped, json!({"orders": [{"id": 3}]}).to_string()).unwrap();
        std::fs::write(&wrong, json!({"items": []}).to_string()).unwrap();

        assert_eq!(read_rows_file(&bare, "orders").unwrap().len(), 2);
        assert_eq!(read_rows_file(&wrapped, "orders").unwrap()[0]["id"], 3);
        assert!(read_rows_file(&wrong, "orders").is_err());
        assert!(read_json_file(&dir.path().join("missing.json"))
            .unwrap_err()
            .starts_with("read "));
    }
}
