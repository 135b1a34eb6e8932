//! Menu items, categories, and the read-through menu cache.
//!
//! Rows arrive from the storefront backend with loosely typed columns (prices
//! as strings, ingredients as a comma list or an array, several possible image
//! columns). `MenuItem::from_row` normalizes them once so the rest of the
//! crate works with plain fields.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::db::{self, DbState};
use crate::value_str;

/// Bucket path for menu images relative to the storage base URL.
const IMAGE_BUCKET_PATH: &str = "/storage/v1/object/public/Menu/";
const IMAGE_KEYS: [&str; 5] = ["image", "img", "image_url", "photo", "picture"];

pub const TRAY_CATEGORY: &str = "trays";
pub const PLATTERS_CATEGORY: &str = "platters";
pub const TRAY_REQUIRED: usize = 7;

/// Pieces a tray can be filled with, Arabic name first.
pub const TRAY_ITEMS: [(&str, &str); 20] = [
    ("كبه", "Kibbeh"),
    ("سبرنق رول", "Spring Roll"),
    ("سمبوسة بطاطس", "Potato Samosa"),
    ("معجنات جبن", "Cheese Pastry"),
    ("ميني ساندوتش حلومي", "Mini Halloumi Sandwich"),
    ("ميني شاورما", "Mini Shawarma"),
    ("ورق عنب", "Grape Leaves"),
    ("مطبق مغلف", "Wrapped Matazeez"),
    ("معجنات زعتر", "Zaatar Pastry"),
    ("ميني ساندوتش لبنه", "Mini Labneh Sandwich"),
    ("مسخن", "Musakhan"),
    ("ميني برجر", "Mini Burger"),
    ("ميني تورتلا", "Mini Tortilla"),
    ("معجنات بيتزا", "Pizza Pastry"),
    ("ميني ساندوتش ديك رومي", "Mini Turkey Sandwich"),
    ("بف لحم", "Beef Puff"),
    ("بف دجاج", "Chicken Puff"),
    ("سمبوسة جبن", "Cheese Samosa"),
    ("معجنات لبنه", "Labneh Pastry"),
    ("ميني ساندوتش فلافل", "Mini Falafel Sandwich"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub name_en: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub image: String,
    pub category: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    /// Maximum option picks; 0 means unlimited.
    #[serde(default)]
    pub limit: u32,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    /// Preparation time in minutes.
    #[serde(default)]
    pub making_time: u32,
    #[serde(default)]
    pub is_featured: bool,
}

fn default_true() -> bool {
    true
}

/// Number from a JSON number or numeric string, 0 otherwise.
fn coerce_f64(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
    .max(0.0)
}

fn coerce_u32(v: Option<&Value>) -> u32 {
    let n = coerce_f64(v);
    if n.is_finite() {
        n.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

fn id_string(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolve the display image: first non-empty image column, first entry of a
/// comma list, relative paths under the public menu bucket.
pub fn resolve_image(row: &Value, storage_base: &str) -> String {
    let Some(raw) = value_str(row, &IMAGE_KEYS) else {
        return String::new();
    };
    let first = raw.split(',').next().unwrap_or_default().trim();
    if first.is_empty() || first.starts_with("http") {
        return first.to_string();
    }
    format!(
        "{}{IMAGE_BUCKET_PATH}{}",
        storage_base.trim_end_matches('/'),
        first.trim_start_matches('/')
    )
}

pub fn parse_ingredients(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|x| match x {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

impl MenuItem {
    pub fn from_row(row: &Value, storage_base: &str) -> Result<Self, String> {
        let id = id_string(row.get("id")).ok_or("menu row without id")?;
        Ok(Self {
            id,
            name: value_str(row, &["name"]).unwrap_or_default(),
            name_en: value_str(row, &["name_en", "nameEn"]),
            description: value_str(row, &["description"]).unwrap_or_default(),
            price: coerce_f64(row.get("price")),
            image: resolve_image(row, storage_base),
            category: value_str(row, &["category"]).unwrap_or_default(),
            ingredients: parse_ingredients(row.get("ingredients")),
            limit: coerce_u32(row.get("limit")),
            in_stock: row.get("in_stock").and_then(Value::as_bool) != Some(false),
            making_time: coerce_u32(row.get("making_time")),
            is_featured: row.get("is_featured").and_then(Value::as_bool) == Some(true),
        })
    }

    /// Column layout used when saving from the item editor.
    pub fn to_row(&self) -> Value {
        json!({
            "name": self.name.trim(),
            "name_en": self.name_en.as_deref().map(str::trim).unwrap_or_default(),
            "description": self.description,
            "price": self.price,
            "image": self.image,
            "category": self.category,
            "ingredients": self.ingredients,
            "limit": self.limit,
            "in_stock": self.in_stock,
            "making_time": self.making_time,
            "is_featured": self.is_featured,
        })
    }

    pub fn is_tray(&self) -> bool {
        self.category == TRAY_CATEGORY
    }

    /// Whether the product drawer offers option picks for this item.
    pub fn has_options(&self) -> bool {
        self.is_tray() || (self.category == PLATTERS_CATEGORY && !self.ingredients.is_empty())
    }

    fn matches(&self, needle: &str) -> bool {
        let hit = |s: &str| s.to_lowercase().contains(needle);
        hit(&self.name)
            || self.name_en.as_deref().is_some_and(hit)
            || hit(&self.description)
            || self.ingredients.iter().any(|i| hit(i))
    }
}

/// Item editor checks, in the order the form reports them.
pub fn validate_menu_item(item: &MenuItem) -> Result<(), String> {
    if item.name.trim().is_empty() {
        return Err("الاسم مطلوب".into());
    }
    if item.category.trim().is_empty() {
        return Err("الفئة مطلوبة".into());
    }
    if item.price.is_nan() || item.price <= 0.0 {
        return Err("السعر يجب أن يكون أكبر من صفر".into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategorySection {
    pub db_category: String,
    pub label: String,
    pub cols: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub label: String,
    pub db_categories: Vec<String>,
    #[serde(default)]
    pub sections: Vec<CategorySection>,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default)]
    pub sort_order: u32,
    #[serde(default)]
    pub is_custom: bool,
}

impl Category {
    fn fixed(id: &str, label: &str, db: &[&str], sort_order: u32) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            db_categories: db.iter().map(ToString::to_string).collect(),
            sections: Vec::new(),
            is_visible: true,
            sort_order,
            is_custom: false,
        }
    }

    pub fn contains(&self, db_category: &str) -> bool {
        self.db_categories.iter().any(|c| c == db_category)
    }
}

pub fn default_categories() -> Vec<Category> {
    let mut platters = Category::fixed(
        "platters_breakfast",
        "بلاتر وسخانات الفطور",
        &["platters", "breakfast_heaters"],
        1,
    );
    platters.sections = vec![
        CategorySection {
            db_category: "platters".into(),
            label: "البلاترات".into(),
            cols: 2,
        },
        CategorySection {
            db_category: "breakfast_heaters".into(),
            label: "سخانات الفطور".into(),
            cols: 3,
        },
    ];
    vec![
        platters,
        Category::fixed("heaters", "سخانات", &["heaters"], 2),
        Category::fixed("trays", "صواني تقديمات", &["trays"], 3),
        Category::fixed("stuffed_dates", "تمر محشي", &["dates"], 4),
        Category::fixed("salads", "سلطات", &["salads"], 5),
        Category::fixed("appetizers", "مقبلات", &["appetizers"], 6),
        Category::fixed("sandwiches", "ساندوتشات", &["sandwiches"], 7),
        Category::fixed("sweets", "حلا", &["sweets"], 8),
        Category::fixed("bakery", "مخبوزات", &["bakery"], 9),
        Category::fixed("frozen", "مفرزنات", &["frozen"], 10),
    ]
}

pub fn category_for<'a>(categories: &'a [Category], db_category: &str) -> Option<&'a Category> {
    categories.iter().find(|c| c.contains(db_category))
}

/// Storefront listing: a non-empty query searches every item, otherwise the
/// selected category narrows the list.
pub fn filter_items<'a>(
    items: &'a [MenuItem],
    category: Option<&Category>,
    query: &str,
) -> Vec<&'a MenuItem> {
    let needle = query.trim().to_lowercase();
    items
        .iter()
        .filter(|item| {
            if !needle.is_empty() {
                item.matches(&needle)
            } else {
                category.map_or(true, |c| c.contains(&item.category))
            }
        })
        .collect()
}

pub fn featured_items(items: &[MenuItem]) -> Vec<&MenuItem> {
    items.iter().filter(|i| i.is_featured && i.in_stock).collect()
}

/// Database key for a category typed by the operator.
pub fn normalize_category_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

pub fn new_custom_category(
    label: &str,
    db_key: &str,
    existing: usize,
    now_ms: i64,
) -> Result<Category, String> {
    let label = label.trim();
    let key = normalize_category_key(db_key);
    if label.is_empty() || key.is_empty() {
        return Err("اسم الفئة ومفتاحها مطلوبان".into());
    }
    Ok(Category {
        id: format!("custom_{key}_{now_ms}"),
        label: label.to_string(),
        db_categories: vec![key],
        sections: Vec::new(),
        is_visible: true,
        sort_order: existing as u32 + 1,
        is_custom: true,
    })
}

/// Document key of the operator's category list.
pub const CATEGORIES_KEY: &str = "categories";

/// Stored category list in display order, or the defaults when none is saved.
pub fn load_categories(db: &DbState) -> Result<Vec<Category>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let stored = db::get_document(&conn, CATEGORIES_KEY)?;
    let mut categories = match stored.map(serde_json::from_value::<Vec<Category>>) {
        Some(Ok(list)) if !list.is_empty() => list,
        Some(Err(e)) => {
            warn!(error = %e, "Stored categories unreadable, using defaults");
            default_categories()
        }
        _ => default_categories(),
    };
    categories.sort_by_key(|c| c.sort_order);
    Ok(categories)
}

pub fn save_categories(db: &DbState, categories: &[Category]) -> Result<(), String> {
    let value = serde_json::to_value(categories).map_err(|e| format!("encode categories: {e}"))?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::put_document(&conn, CATEGORIES_KEY, &value)
}

// ---------------------------------------------------------------------------
// Option picking
// ---------------------------------------------------------------------------

pub fn tray_option_key(ar: &str, en: &str) -> String {
    format!("{ar}||{en}")
}

/// Option picks for one item in the product drawer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionPicker {
    limit: usize,
    required: Option<usize>,
    selected: Vec<String>,
}

impl OptionPicker {
    pub fn for_item(item: &MenuItem) -> Self {
        if item.is_tray() {
            Self {
                limit: TRAY_REQUIRED,
                required: Some(TRAY_REQUIRED),
                selected: Vec::new(),
            }
        } else {
            Self {
                limit: item.limit as usize,
                required: None,
                selected: Vec::new(),
            }
        }
    }

    /// Select or deselect `option`. Selecting past the limit is ignored.
    /// Returns whether the option is selected afterwards.
    pub fn toggle(&mut self, option: &str) -> bool {
        if let Some(pos) = self.selected.iter().position(|s| s == option) {
            self.selected.remove(pos);
            return false;
        }
        if self.limit > 0 && self.selected.len() >= self.limit {
            return false;
        }
        self.selected.push(option.to_string());
        true
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn remaining(&self) -> usize {
        self.required
            .map(|r| r.saturating_sub(self.selected.len()))
            .unwrap_or(0)
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Picks to put in the cart, or the prompt shown while a tray is short.
    pub fn into_selection(self) -> Result<Vec<String>, String> {
        if !self.is_complete() {
            return Err(format!("اختر {} أصناف أخرى", self.remaining()));
        }
        Ok(self.selected)
    }
}

// ---------------------------------------------------------------------------
// Read-through cache
// ---------------------------------------------------------------------------

pub const MENU_FRESH_FOR: Duration = Duration::from_secs(300);
pub const MENU_STALE_FOR: Duration = Duration::from_secs(600);
/// Document key of the last fetched menu.
pub const MENU_CACHE_KEY: &str = "menu_cache";

/// Where the menu comes from on a cache miss.
pub trait MenuSource: Send + Sync {
    /// Identifies the source in the stored cache. A cached menu from a
    /// different source is a miss.
    fn cache_key(&self) -> String;
    fn fetch_menu(&self) -> impl Future<Output = Result<Vec<MenuItem>, String>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Served from cache past its fresh window; the caller should revalidate.
    Stale,
    Fetched,
}

#[derive(Debug, Clone)]
pub struct MenuSnapshot {
    pub items: Vec<MenuItem>,
    pub freshness: Freshness,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedMenu {
    source: String,
    items: Vec<MenuItem>,
    fetched_at_ms: i64,
}

/// Read-through menu cache keyed on wall-clock milliseconds so an entry
/// saved by one command is still valid for the next.
pub struct MenuCache {
    entry: Mutex<Option<CachedMenu>>,
    fresh_for: Duration,
    stale_for: Duration,
}

impl Default for MenuCache {
    fn default() -> Self {
        Self::new(MENU_FRESH_FOR, MENU_STALE_FOR)
    }
}

impl MenuCache {
    pub fn new(fresh_for: Duration, stale_for: Duration) -> Self {
        Self {
            entry: Mutex::new(None),
            fresh_for,
            stale_for,
        }
    }

    /// Cache seeded with the menu last saved to the local store. An
    /// unreadable stored entry is dropped.
    pub fn restore(db: &DbState) -> Result<Self, String> {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        let stored = db::get_document(&conn, MENU_CACHE_KEY)?;
        drop(conn);
        let cache = Self::default();
        match stored.map(serde_json::from_value::<CachedMenu>) {
            Some(Ok(entry)) => {
                *cache.entry.lock().map_err(|e| e.to_string())? = Some(entry);
            }
            Some(Err(e)) => warn!(error = %e, "Stored menu cache unreadable, ignoring it"),
            None => {}
        }
        Ok(cache)
    }

    /// Write the current entry to the local store.
    pub fn persist(&self, db: &DbState) -> Result<(), String> {
        let value = {
            let guard = self.entry.lock().map_err(|e| e.to_string())?;
            match guard.as_ref() {
                Some(entry) => {
                    serde_json::to_value(entry).map_err(|e| format!("encode menu cache: {e}"))?
                }
                None => return Ok(()),
            }
        };
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        db::put_document(&conn, MENU_CACHE_KEY, &value)
    }

    /// Cached menu of `source_key` as of `now_ms`, if it is still servable.
    /// An entry stamped in the future counts as expired.
    pub fn peek(&self, source_key: &str, now_ms: i64) -> Option<MenuSnapshot> {
        let guard = match self.entry.lock() {
            Ok(g) => g,
            Err(e) => {
                warn!("menu cache lock failed: {e}");
                return None;
            }
        };
        let cached = guard.as_ref().filter(|c| c.source == source_key)?;
        let age = u128::try_from(now_ms.checked_sub(cached.fetched_at_ms)?).ok()?;
        let freshness = if age < self.fresh_for.as_millis() {
            Freshness::Fresh
        } else if age < (self.fresh_for + self.stale_for).as_millis() {
            Freshness::Stale
        } else {
            return None;
        };
        Some(MenuSnapshot {
            items: cached.items.clone(),
            freshness,
        })
    }

    pub async fn get_at<S: MenuSource>(
        &self,
        source: &S,
        now_ms: i64,
    ) -> Result<MenuSnapshot, String> {
        if let Some(snapshot) = self.peek(&source.cache_key(), now_ms) {
            debug!(freshness = ?snapshot.freshness, items = snapshot.items.len(), "menu cache hit");
            return Ok(snapshot);
        }
        self.refresh_at(source, now_ms).await
    }

    /// Fetch from the source and replace the cached menu. Out-of-stock items
    /// are dropped; an empty result is an error and leaves the cache as is.
    pub async fn refresh_at<S: MenuSource>(
        &self,
        source: &S,
        now_ms: i64,
    ) -> Result<MenuSnapshot, String> {
        let items: Vec<MenuItem> = source
            .fetch_menu()
            .await?
            .into_iter()
            .filter(|i| i.in_stock)
            .collect();
        if items.is_empty() {
            return Err("No items found in menu table".into());
        }
        info!(items = items.len(), "menu refreshed");
        let mut guard = self.entry.lock().map_err(|e| e.to_string())?;
        *guard = Some(CachedMenu {
            source: source.cache_key(),
            items: items.clone(),
            fetched_at_ms: now_ms,
        });
        Ok(MenuSnapshot {
            items,
            freshness: Freshness::Fetched,
        })
    }

    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.entry.lock() {
            *guard = None;
        }
    }
}

/// Menu through the stored cache. A fresh entry is served as is. A stale
/// entry is served too, but the source is read again and the store updated
/// before returning; a failed revalidation only logs. Anything older is
/// fetched.
pub async fn load_menu<S: MenuSource>(
    db: &DbState,
    source: &S,
    now_ms: i64,
) -> Result<MenuSnapshot, String> {
    let cache = MenuCache::restore(db)?;
    let snapshot = cache.get_at(source, now_ms).await?;
    match snapshot.freshness {
        Freshness::Fresh => {}
        Freshness::Fetched => cache.persist(db)?,
        Freshness::Stale => match cache.refresh_at(source, now_ms).await {
            Ok(_) => cache.persist(db)?,
            Err(e) => warn!(error = %e, "Menu revalidation failed, serving stale menu"),
        },
    }
    Ok(snapshot)
}
