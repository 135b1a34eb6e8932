//! Shopping cart and the customer's delivery details.
//!
//! Lines are keyed by item id plus the sorted option list, so the same dish
//! with a different selection is a separate line. Both the cart and the
//! delivery form survive restarts through the local store.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::{self, DbState};
use crate::menu::MenuItem;

pub const CART_CATEGORY: &str = "cart";
const ITEMS_KEY: &str = "items";
const DELIVERY_INFO_KEY: &str = "delivery_info";
/// Upper bound on one line's quantity.
pub const MAX_LINE_QUANTITY: u32 = 999;

/// `{id}::{options sorted, comma joined}`. The suffix is empty without options.
pub fn cart_key(item_id: &str, options: &[String]) -> String {
    let mut sorted: Vec<&str> = options.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("{item_id}::{}", sorted.join(","))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(flatten)]
    pub item: MenuItem,
    pub quantity: u32,
    #[serde(default, alias = "selectedIngredients")]
    pub selected_options: Vec<String>,
    pub cart_key: String,
}

impl CartItem {
    pub fn line_total(&self) -> f64 {
        self.item.price * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    /// Delivery area name as shown to the customer (`الخبر`, ...).
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub scheduled_time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add `quantity` of an item with the given options. An existing line with
    /// the same key has its quantity increased instead. Quantities are capped
    /// at [`MAX_LINE_QUANTITY`]. Returns the line key.
    pub fn add(&mut self, item: &MenuItem, quantity: u32, options: Vec<String>) -> String {
        let key = cart_key(&item.id, &options);
        if quantity == 0 {
            return key;
        }
        match self.items.iter_mut().find(|line| line.cart_key == key) {
            Some(line) => {
                line.quantity = line.quantity.saturating_add(quantity).min(MAX_LINE_QUANTITY);
            }
            None => self.items.push(CartItem {
                item: item.clone(),
                quantity: quantity.min(MAX_LINE_QUANTITY),
                selected_options: options,
                cart_key: key.clone(),
            }),
        }
        key
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|line| line.cart_key != key);
        self.items.len() != before
    }

    /// Set a line's quantity; zero or below removes it.
    pub fn update_quantity(&mut self, key: &str, quantity: i64) -> bool {
        if quantity <= 0 {
            return self.remove(key);
        }
        let quantity = u32::try_from(quantity)
            .unwrap_or(u32::MAX)
            .min(MAX_LINE_QUANTITY);
        match self.items.iter_mut().find(|line| line.cart_key == key) {
            Some(line) => {
                line.quantity = quantity;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn total_items(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |acc, line| acc.saturating_add(line.quantity))
    }

    pub fn total_price(&self) -> f64 {
        self.items.iter().map(CartItem::line_total).sum()
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

fn load_json<T: serde::de::DeserializeOwned + Default>(db: &DbState, key: &str) -> T {
    let raw = match db.conn.lock() {
        Ok(conn) => db::get_setting(&conn, CART_CATEGORY, key),
        Err(e) => {
            warn!(key, error = %e, "Cart store lock poisoned, starting empty");
            return T::default();
        }
    };
    match raw {
        Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(key, error = %e, "Discarding unreadable cart data");
            T::default()
        }),
        None => T::default(),
    }
}

fn save_json<T: Serialize>(db: &DbState, key: &str, value: &T) -> Result<(), String> {
    let text = serde_json::to_string(value).map_err(|e| format!("encode {key}: {e}"))?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::set_setting(&conn, CART_CATEGORY, key, &text)
}

/// Stored cart, or an empty one when nothing (readable) is stored.
pub fn load_cart(db: &DbState) -> Cart {
    let cart: Cart = load_json(db, ITEMS_KEY);
    debug!(lines = cart.items.len(), "Cart loaded");
    cart
}

pub fn save_cart(db: &DbState, cart: &Cart) -> Result<(), String> {
    save_json(db, ITEMS_KEY, cart)
}

pub fn load_delivery_info(db: &DbState) -> DeliveryInfo {
    load_json(db, DELIVERY_INFO_KEY)
}

pub fn save_delivery_info(db: &DbState, info: &DeliveryInfo) -> Result<(), String> {
    save_json(db, DELIVERY_INFO_KEY, info)
}
