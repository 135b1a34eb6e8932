use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cart::{self, Cart, DeliveryInfo};
use crate::checkout;
use crate::db::DbState;
use crate::menu::{self, MenuItem, MenuSource, OptionPicker};
use crate::order::{self, Order, OrderBoard, OrderStatus, OrderType};
use crate::sales::{self, SalesRange};
use crate::schedule;
use crate::settings::{self, BannerConfig, PrinterSettings, ThemeConfig};

// -- Helpers -----------------------------------------------------------------

fn shop_offset_minutes(db: &DbState) -> Result<i32, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(PrinterSettings::load(&conn).utc_offset_minutes)
}

/// Normalize order rows, skipping the ones that cannot be read.
pub fn load_orders_file(path: &Path) -> Result<Vec<Order>, String> {
    let rows = super::read_rows_file(path, "orders")?;
    Ok(rows
        .iter()
        .filter_map(|row| match Order::from_row(row) {
            Ok(order) => Some(order),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable order row");
                None
            }
        })
        .collect())
}

// -- Menu --------------------------------------------------------------------

/// Menu rows exported from the backend `menu` table.
pub struct FileMenuSource {
    pub path: PathBuf,
    pub storage_base: String,
}

impl MenuSource for FileMenuSource {
    fn cache_key(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch_menu(&self) -> Result<Vec<MenuItem>, String> {
        let rows = super::read_rows_file(&self.path, "menu")?;
        Ok(rows
            .iter()
            .filter_map(|row| match MenuItem::from_row(row, &self.storage_base) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable menu row");
                    None
                }
            })
            .collect())
    }
}

async fn load_menu(db: &DbState, source: &FileMenuSource) -> Result<Vec<MenuItem>, String> {
    let snapshot = menu::load_menu(db, source, Utc::now().timestamp_millis()).await?;
    Ok(snapshot.items)
}

pub async fn menu_list(
    db: &DbState,
    source: &FileMenuSource,
    category_id: Option<&str>,
    query: &str,
) -> Result<Value, String> {
    let items = load_menu(db, source).await?;
    let categories = menu::load_categories(db)?;
    let category = match category_id {
        Some(id) => Some(
            categories
                .iter()
                .find(|c| c.id == id)
                .ok_or_else(|| format!("Unknown category: {id}"))?,
        ),
        None => None,
    };
    let listed = menu::filter_items(&items, category, query);
    let featured: Vec<&str> = menu::featured_items(&items)
        .iter()
        .map(|i| i.id.as_str())
        .collect();
    Ok(json!({
        "success": true,
        "count": listed.len(),
        "items": listed,
        "featured": featured,
    }))
}

pub fn menu_categories(db: &DbState) -> Result<Value, String> {
    let categories = menu::load_categories(db)?;
    Ok(json!({ "success": true, "categories": categories }))
}

pub fn menu_add_category(db: &DbState, label: &str, db_key: &str) -> Result<Value, String> {
    let mut categories = menu::load_categories(db)?;
    let category = menu::new_custom_category(
        label,
        db_key,
        categories.len(),
        Utc::now().timestamp_millis(),
    )?;
    if categories
        .iter()
        .any(|c| c.db_categories == category.db_categories)
    {
        return Err(format!("Category key already exists: {}", category.db_categories[0]));
    }
    info!(id = %category.id, label = %category.label, "Custom category added");
    categories.push(category.clone());
    menu::save_categories(db, &categories)?;
    Ok(json!({ "success": true, "category": category }))
}

/// Item editor check: validate a menu item and show the row that would be saved.
pub fn menu_check_item(item_path: &Path) -> Result<Value, String> {
    let item: MenuItem = super::read_typed_file(item_path)?;
    match menu::validate_menu_item(&item) {
        Ok(()) => Ok(json!({ "success": true, "row": item.to_row() })),
        Err(e) => Ok(json!({ "success": false, "error": e })),
    }
}

// -- Cart --------------------------------------------------------------------

fn cart_payload(cart: &Cart) -> Value {
    json!({
        "success": true,
        "items": cart.items(),
        "totalItems": cart.total_items(),
        "totalPrice": cart.total_price(),
    })
}

pub fn cart_show(db: &DbState) -> Result<Value, String> {
    Ok(cart_payload(&cart::load_cart(db)))
}

/// Add an item from the menu, running the picks through the option picker
/// so limits and the tray count apply as they do in the product drawer.
pub async fn cart_add(
    db: &DbState,
    source: &FileMenuSource,
    item_id: &str,
    quantity: u32,
    options: &[String],
) -> Result<Value, String> {
    let items = load_menu(db, source).await?;
    let item = items
        .iter()
        .find(|i| i.id == item_id)
        .ok_or_else(|| format!("Menu item not found: {item_id}"))?;

    let mut picker = OptionPicker::for_item(item);
    for option in options {
        if !picker.toggle(option) {
            return Err(format!("Option rejected: {option}"));
        }
    }
    let selection = picker.into_selection()?;

    let mut cart = cart::load_cart(db);
    let key = cart.add(item, quantity.max(1), selection);
    cart::save_cart(db, &cart)?;
    info!(cart_key = %key, quantity, "Cart line added");

    let mut payload = cart_payload(&cart);
    payload["cartKey"] = json!(key);
    Ok(payload)
}

pub fn cart_set_quantity(db: &DbState, key: &str, quantity: i64) -> Result<Value, String> {
    let mut cart = cart::load_cart(db);
    if !cart.update_quantity(key, quantity) {
        return Err(format!("Cart line not found: {key}"));
    }
    cart::save_cart(db, &cart)?;
    Ok(cart_payload(&cart))
}

pub fn cart_remove(db: &DbState, key: &str) -> Result<Value, String> {
    let mut cart = cart::load_cart(db);
    if !cart.remove(key) {
        return Err(format!("Cart line not found: {key}"));
    }
    cart::save_cart(db, &cart)?;
    Ok(cart_payload(&cart))
}

pub fn cart_clear(db: &DbState) -> Result<Value, String> {
    let mut cart = cart::load_cart(db);
    cart.clear();
    cart::save_cart(db, &cart)?;
    Ok(cart_payload(&cart))
}

// -- Checkout ----------------------------------------------------------------

pub struct CheckoutRequest {
    /// Cart file; the stored cart is used when absent.
    pub cart_path: Option<PathBuf>,
    /// Delivery form file; the stored form is used when absent.
    pub info_path: Option<PathBuf>,
    pub order_type: OrderType,
    /// Also print the kitchen ticket under this order number.
    pub ticket_number: Option<i64>,
}

pub async fn checkout_order(db: &DbState, request: &CheckoutRequest) -> Result<Value, String> {
    let cart: Cart = match &request.cart_path {
        Some(path) => super::read_typed_file(path)?,
        None => cart::load_cart(db),
    };
    let info: DeliveryInfo = match &request.info_path {
        Some(path) => super::read_typed_file(path)?,
        None => cart::load_delivery_info(db),
    };
    cart::save_delivery_info(db, &info)?;

    let new_order = match checkout::build_order(&cart, &info, request.order_type) {
        Ok(order) => order,
        Err(e) => return Ok(json!({ "success": false, "error": e })),
    };
    let message = checkout::whatsapp_message(&new_order, &info);
    let link = checkout::whatsapp_link(&message);
    let confirmation = checkout::confirmation(&new_order);

    if request.cart_path.is_none() {
        cart::save_cart(db, &Cart::new())?;
    }

    let ticket = match request.ticket_number {
        Some(number) => {
            let order = new_order.clone().into_order(number, Utc::now());
            Some(super::print::kitchen_print_order(db, &order).await?)
        }
        None => None,
    };

    Ok(json!({
        "success": true,
        "order": new_order,
        "message": message,
        "link": link,
        "confirmation": confirmation,
        "ticket": ticket,
    }))
}

pub fn delivery_areas() -> Result<Value, String> {
    Ok(json!({ "success": true, "areas": checkout::DELIVERY_AREAS }))
}

// -- Scheduling --------------------------------------------------------------

pub fn schedule_slots(db: &DbState, min_minutes: u32) -> Result<Value, String> {
    let now = schedule::local_now(shop_offset_minutes(db)?);
    let days = schedule::available_slots(now, min_minutes);
    Ok(json!({
        "success": true,
        "prepTime": schedule::prep_time_label(min_minutes),
        "days": days,
    }))
}

// -- Admin -------------------------------------------------------------------

pub fn sales_summary(db: &DbState, orders_path: &Path, range: SalesRange) -> Result<Value, String> {
    let orders = load_orders_file(orders_path)?;
    let summary = sales::summarize(&orders, range, Utc::now(), shop_offset_minutes(db)?);
    Ok(json!({
        "success": true,
        "range": range.label_ar(),
        "summary": summary,
    }))
}

/// Kitchen board snapshot: counts per status and the open orders, newest first.
pub fn orders_board(orders_path: &Path, now: DateTime<Utc>) -> Result<Value, String> {
    let board = OrderBoard::new(load_orders_file(orders_path)?);
    let counts: serde_json::Map<String, Value> = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ]
    .into_iter()
    .map(|s| (s.as_str().to_string(), json!(board.count_by_status(s))))
    .collect();
    let open: Vec<Value> = board
        .open_orders()
        .map(|o| {
            json!({
                "id": o.id,
                "orderNumber": o.order_number,
                "customerName": o.customer_name,
                "status": o.status,
                "statusLabel": o.status.label_ar(),
                "next": o.status.next(),
                "items": o.item_count(),
                "total": o.total,
                "age": order::time_ago(o.created_at, now),
            })
        })
        .collect();
    Ok(json!({ "success": true, "counts": counts, "open": open }))
}

pub fn config_show(db: &DbState, which: &str) -> Result<Value, String> {
    let config = match which {
        "banner" => {
            let banner: BannerConfig = settings::load_document(db, settings::BANNER_KEY)?;
            serde_json::to_value(banner)
        }
        "theme" => {
            let theme: ThemeConfig = settings::load_document(db, settings::THEME_KEY)?;
            serde_json::to_value(theme)
        }
        other => return Err(format!("Unknown config document: {other}")),
    }
    .map_err(|e| e.to_string())?;
    Ok(json!({ "success": true, "config": config }))
}

/// Merge a JSON file over the current document and store the result.
pub fn config_set(db: &DbState, which: &str, path: &Path) -> Result<Value, String> {
    let patch = super::read_json_file(path)?;
    match which {
        "banner" => {
            let current = settings::load_document::<BannerConfig>(db, settings::BANNER_KEY)?;
            let merged: BannerConfig = settings::merge_over_default(Some(&merge(&current, patch)?));
            settings::save_document(db, settings::BANNER_KEY, &merged)?;
        }
        "theme" => {
            let current = settings::load_document::<ThemeConfig>(db, settings::THEME_KEY)?;
            let merged: ThemeConfig = settings::merge_over_default(Some(&merge(&current, patch)?));
            settings::save_document(db, settings::THEME_KEY, &merged)?;
        }
        other => return Err(format!("Unknown config document: {other}")),
    }
    info!(document = which, "Storefront config saved");
    config_show(db, which)
}

fn merge<T: serde::Serialize>(current: &T, patch: Value) -> Result<Value, String> {
    let mut base = serde_json::to_value(current).map_err(|e| e.to_string())?;
    if let (Value::Object(base_obj), Value::Object(patch_obj)) = (&mut base, patch) {
        for (k, v) in patch_obj {
            base_obj.insert(k, v);
        }
    }
    Ok(base)
}
