//! Typed operator settings on top of the local store.
//!
//! Printer settings live in the `printer` settings category; environment
//! variables override stored values so a kiosk can be pinned from its
//! service unit. Banner and theme documents live in `app_settings` and are
//! merged over their defaults on load.

use std::path::PathBuf;
use std::time::Duration;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::db::{self, DbState};

pub const PRINTER_CATEGORY: &str = "printer";
pub const DEFAULT_PRINTER_IP: &str = "192.168.100.205";
pub const DEFAULT_DEVICE_ID: &str = "local_printer";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const MIN_TIMEOUT_MS: u64 = 8_000;
pub const MAX_TIMEOUT_MS: u64 = 15_000;
/// 80 mm paper at 203 dpi.
pub const DEFAULT_PAPER_DOTS: u32 = 576;

const ENV_PRINTER_IP: &str = "AMAL_PRINTER_IP";
const ENV_PRINTER_TIMEOUT: &str = "AMAL_PRINTER_TIMEOUT_MS";
const ENV_TICKET_FONT: &str = "AMAL_TICKET_FONT";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrinterSettings {
    pub ip: String,
    pub device_id: String,
    pub timeout_ms: u64,
    pub paper_dots: u32,
    /// Overrides the bundled ticket font.
    pub font_path: Option<PathBuf>,
    pub store_name: String,
    pub footer_text: Option<String>,
    pub utc_offset_minutes: i32,
    pub show_prices: bool,
    pub feed_lines: u8,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            ip: DEFAULT_PRINTER_IP.to_string(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            paper_dots: DEFAULT_PAPER_DOTS,
            font_path: None,
            store_name: "أمل سناك".to_string(),
            footer_text: None,
            utc_offset_minutes: 180,
            show_prices: false,
            feed_lines: 5,
        }
    }
}

impl PrinterSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load stored settings with defaults, then apply environment overrides.
    pub fn load(conn: &Connection) -> Self {
        let mut settings = Self::default();
        let get = |key: &str| {
            db::get_setting(conn, PRINTER_CATEGORY, key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(ip) = get("ip") {
            settings.ip = ip;
        }
        if let Some(device_id) = get("device_id") {
            settings.device_id = device_id;
        }
        if let Some(ms) = get("timeout_ms").and_then(|v| v.parse::<u64>().ok()) {
            settings.timeout_ms = clamp_timeout(ms);
        }
        if let Some(dots) = get("paper_dots").and_then(|v| v.parse::<u32>().ok()) {
            settings.paper_dots = paper_dots_for(dots);
        }
        settings.font_path = get("font_path").map(PathBuf::from);
        if let Some(name) = get("store_name") {
            settings.store_name = name;
        }
        settings.footer_text = get("footer_text");
        if let Some(offset) = get("utc_offset_minutes").and_then(|v| v.parse::<i32>().ok()) {
            settings.utc_offset_minutes = offset.clamp(-12 * 60, 14 * 60);
        }
        if let Some(flag) = get("show_prices") {
            settings.show_prices = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        if let Some(lines) = get("feed_lines").and_then(|v| v.parse::<u8>().ok()) {
            settings.feed_lines = lines.min(20);
        }

        settings.apply_env_overrides();
        settings
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(ip) = std::env::var(ENV_PRINTER_IP) {
            match validate_printer_address(&ip) {
                Ok(ip) => self.ip = ip,
                Err(e) => warn!(error = %e, "Ignoring {ENV_PRINTER_IP}"),
            }
        }
        if let Some(ms) = std::env::var(ENV_PRINTER_TIMEOUT)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.timeout_ms = clamp_timeout(ms);
        }
        if let Ok(path) = std::env::var(ENV_TICKET_FONT) {
            if !path.trim().is_empty() {
                self.font_path = Some(PathBuf::from(path.trim()));
            }
        }
    }
}

pub fn clamp_timeout(ms: u64) -> u64 {
    ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS)
}

/// 58 mm heads are 384 dots wide; everything else is treated as 80 mm.
pub fn paper_dots_for(dots: u32) -> u32 {
    if dots <= 384 {
        384
    } else {
        DEFAULT_PAPER_DOTS
    }
}

/// Accept `host`, `host:port`, or an explicit `http(s)://host[:port]` base.
pub fn validate_printer_address(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err("Printer address is empty".into());
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(format!("Printer address contains whitespace: {trimmed:?}"));
    }
    let host_part = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    if host_part.is_empty() || host_part.contains('/') {
        return Err(format!("Printer address must be a host, not a path: {trimmed}"));
    }
    let valid = host_part
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'));
    if !valid {
        return Err(format!("Printer address has invalid characters: {trimmed}"));
    }
    Ok(trimmed.to_string())
}

pub fn get_printer_ip(db: &DbState) -> Result<String, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(PrinterSettings::load(&conn).ip)
}

pub fn set_printer_ip(db: &DbState, ip: &str) -> Result<String, String> {
    let ip = validate_printer_address(ip)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::set_setting(&conn, PRINTER_CATEGORY, "ip", &ip)?;
    info!(printer_ip = %ip, "Printer address updated");
    Ok(ip)
}

/// Store a raw printer setting after checking the key is one we read.
pub fn set_printer_setting(db: &DbState, key: &str, value: &str) -> Result<(), String> {
    const KEYS: &[&str] = &[
        "device_id",
        "timeout_ms",
        "paper_dots",
        "font_path",
        "store_name",
        "footer_text",
        "utc_offset_minutes",
        "show_prices",
        "feed_lines",
    ];
    if key == "ip" {
        return set_printer_ip(db, value).map(|_| ());
    }
    if !KEYS.contains(&key) {
        return Err(format!("Unknown printer setting: {key}"));
    }
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::set_setting(&conn, PRINTER_CATEGORY, key, value.trim())
}

// ---------------------------------------------------------------------------
// Banner / theme documents
// ---------------------------------------------------------------------------

pub const BANNER_KEY: &str = "hero_banner";
pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BannerConfig {
    pub badge: String,
    pub title: String,
    pub subtitle: String,
    pub image_url: Option<String>,
    pub bg_from: String,
    pub bg_to: String,
    pub show_badge: bool,
    pub show_subtitle: bool,
    pub featured_product_id: Option<String>,
    pub featured_product_label: String,
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            badge: "جديدنا اليوم".into(),
            title: "أهلاً بك".into(),
            subtitle: "أفضل الوجبات المثلجة والساخنة\nبجودة عالمية مختارة لك.".into(),
            image_url: None,
            bg_from: "#fce4ec".into(),
            bg_to: "#f8bbd0".into(),
            show_badge: true,
            show_subtitle: true,
            featured_product_id: None,
            featured_product_label: "جديد 🔥".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThemeConfig {
    pub primary: String,
    pub secondary: String,
    pub background: String,
    pub radius: f64,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            primary: "#f0526a".into(),
            secondary: "#1e5631".into(),
            background: "#ffffff".into(),
            radius: 1.0,
        }
    }
}

/// Shallow-merge `stored` over `T::default()`. Keys that do not belong to
/// `T`, or that carry the wrong type, fall back to the default value.
pub fn merge_over_default<T>(stored: Option<&Value>) -> T
where
    T: Default + Serialize + for<'de> Deserialize<'de>,
{
    let defaults = T::default();
    let Some(Value::Object(stored)) = stored else {
        return defaults;
    };
    let Ok(Value::Object(mut base)) = serde_json::to_value(&defaults) else {
        return defaults;
    };

    for (key, value) in stored {
        let Some(slot) = base.get(key) else {
            continue;
        };
        let mut candidate = base.clone();
        candidate.insert(key.clone(), value.clone());
        if serde_json::from_value::<T>(Value::Object(candidate)).is_ok() {
            base.insert(key.clone(), value.clone());
        } else {
            warn!(key = %key, current = %slot, "Ignoring stored value with unexpected type");
        }
    }

    serde_json::from_value(Value::Object(base)).unwrap_or(defaults)
}

pub fn load_document<T>(db: &DbState, key: &str) -> Result<T, String>
where
    T: Default + Serialize + for<'de> Deserialize<'de>,
{
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let stored = db::get_document(&conn, key)?;
    Ok(merge_over_default(stored.as_ref()))
}

pub fn save_document<T: Serialize>(db: &DbState, key: &str, value: &T) -> Result<(), String> {
    let json = serde_json::to_value(value).map_err(|e| format!("encode {key}: {e}"))?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::put_document(&conn, key, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(ENV_PRINTER_IP);
        std::env::remove_var(ENV_PRINTER_TIMEOUT);
        std::env::remove_var(ENV_TICKET_FONT);
    }

    #[test]
    #[serial]
    fn defaults_when_nothing_stored() {
        clear_env();
        let db = db::open_in_memory().expect("db");
        let conn = db.conn.lock().expect("lock");
        let settings = PrinterSettings::load(&conn);
        assert_eq!(settings, PrinterSettings::default());
        assert_eq!(settings.ip, "192.168.100.205");
        assert_eq!(settings.timeout(), Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn stored_values_are_read_and_clamped() {
        clear_env();
        let db = db::open_in_memory().expect("db");
        set_printer_setting(&db, "timeout_ms", "60000").expect("timeout");
        set_printer_setting(&db, "paper_dots", "380").expect("paper");
        set_printer_setting(&db, "show_prices", "true").expect("prices");
        set_printer_setting(&db, "footer_text", "شكراً لكم").expect("footer");
        assert!(set_printer_setting(&db, "colour", "red").is_err());

        let conn = db.conn.lock().expect("lock");
        let settings = PrinterSettings::load(&conn);
        assert_eq!(settings.timeout_ms, MAX_TIMEOUT_MS);
        assert_eq!(settings.paper_dots, 384);
        assert!(settings.show_prices);
        assert_eq!(settings.footer_text.as_deref(), Some("شكراً لكم"));
    }

    #[test]
    #[serial]
    fn printer_ip_roundtrip_and_validation() {
        clear_env();
        let db = db::open_in_memory().expect("db");
        assert_eq!(get_printer_ip(&db).expect("get"), DEFAULT_PRINTER_IP);

        set_printer_ip(&db, " 192.168.1.77 ").expect("set");
        assert_eq!(get_printer_ip(&db).expect("get"), "192.168.1.77");

        assert!(set_printer_ip(&db, "").is_err());
        assert!(set_printer_ip(&db, "192.168.1.7 8").is_err());
        assert!(set_printer_ip(&db, "https://printer.local/cgi-bin").is_err());
        assert_eq!(
            set_printer_ip(&db, "http://127.0.0.1:8080/").expect("explicit base"),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    #[serial]
    fn environment_overrides_win() {
        clear_env();
        let db = db::open_in_memory().expect("db");
        set_printer_ip(&db, "10.0.0.2").expect("set");

        std::env::set_var(ENV_PRINTER_IP, "10.0.0.99");
        std::env::set_var(ENV_PRINTER_TIMEOUT, "1000");
        std::env::set_var(ENV_TICKET_FONT, "/usr/share/fonts/amiri.ttf");
        let settings = {
            let conn = db.conn.lock().expect("lock");
            PrinterSettings::load(&conn)
        };
        clear_env();

        assert_eq!(settings.ip, "10.0.0.99");
        assert_eq!(settings.timeout_ms, MIN_TIMEOUT_MS);
        assert_eq!(
            settings.font_path,
            Some(PathBuf::from("/usr/share/fonts/amiri.ttf"))
        );
    }

    #[test]
    fn banner_merges_over_defaults() {
        let stored = serde_json::json!({
            "title": "رمضان كريم",
            "show_badge": false,
            "bg_from": 42,
            "unknown": "ignored"
        });
        let banner: BannerConfig = merge_over_default(Some(&stored));
        assert_eq!(banner.title, "رمضان كريم");
        assert!(!banner.show_badge);
        assert_eq!(banner.bg_from, "#fce4ec");
        assert_eq!(banner.badge, BannerConfig::default().badge);

        let fallback: ThemeConfig = merge_over_default(Some(&serde_json::json!([1, 2])));
        assert_eq!(fallback, ThemeConfig::default());
    }

    #[test]
    fn documents_persist_through_the_store() {
        let db = db::open_in_memory().expect("db");
        let mut theme: ThemeConfig = load_document(&db, THEME_KEY).expect("load");
        assert_eq!(theme, ThemeConfig::default());

        theme.primary = "#8b5cf6".into();
        save_document(&db, THEME_KEY, &theme).expect("save");
        let reloaded: ThemeConfig = load_document(&db, THEME_KEY).expect("reload");
        assert_eq!(reloaded.primary, "#8b5cf6");
    }
}
