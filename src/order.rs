//! Orders as the kitchen sees them.
//!
//! Rows arrive from the backend (initial fetch or realtime notifications) as
//! loose JSON; `Order::from_row` normalizes them. `OrderBoard` is the admin
//! dashboard's in-memory list that realtime inserts and status updates are
//! merged into, last write wins per order id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{value_f64, value_i64, value_str};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn from_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "preparing" => Some(Self::Preparing),
            "ready" => Some(Self::Ready),
            "delivered" => Some(Self::Delivered),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// The status the kitchen advances to from here, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Preparing),
            Self::Preparing => Some(Self::Ready),
            Self::Ready => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled => None,
        }
    }

    pub fn label_ar(self) -> &'static str {
        match self {
            Self::Pending => "جديد",
            Self::Preparing => "قيد التحضير",
            Self::Ready => "جاهز",
            Self::Delivered => "تم التوصيل",
            Self::Cancelled => "ملغي",
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Preparing | Self::Ready)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Delivery,
    Pickup,
}

impl OrderType {
    pub fn from_value(value: Option<&str>) -> Self {
        match value.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            Some("pickup") => Self::Pickup,
            _ => Self::Delivery,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub name: String,
    #[serde(default, alias = "name_en")]
    pub name_en: Option<String>,
    pub quantity: u32,
    #[serde(default)]
    pub price: f64,
    #[serde(default, alias = "selectedIngredients", alias = "selected_ingredients")]
    pub selected_options: Vec<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.price * self.quantity as f64
    }

    fn from_value(v: &Value) -> Option<Self> {
        let name = value_str(v, &["name"])?;
        let quantity = value_i64(v, &["quantity", "qty"])
            .or_else(|| value_f64(v, &["quantity", "qty"]).map(|q| q.round() as i64))
            .unwrap_or(1)
            .max(0);
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        let selected_options = ["selectedIngredients", "selected_ingredients", "selectedOptions"]
            .iter()
            .find_map(|key| v.get(*key).and_then(Value::as_array))
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            name,
            name_en: value_str(v, &["nameEn", "name_en"]),
            quantity,
            price: value_f64(v, &["price"]).unwrap_or(0.0),
            selected_options,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: i64,
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default, alias = "customerArea")]
    pub customer_address: Option<String>,
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub subtotal: f64,
    #[serde(default)]
    pub delivery_fee: f64,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub scheduled_time: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Normalize a backend `orders` row.
    pub fn from_row(row: &Value) -> Result<Self, String> {
        let id = value_str(row, &["id"])
            .or_else(|| value_i64(row, &["id"]).map(|n| n.to_string()))
            .ok_or("order row missing id")?;
        let order_number = value_i64(row, &["order_number", "orderNumber"])
            .ok_or_else(|| format!("order {id} missing order_number"))?;
        let created_raw = value_str(row, &["created_at", "createdAt"])
            .ok_or_else(|| format!("order {id} missing created_at"))?;
        let created_at = DateTime::parse_from_rfc3339(&created_raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("order {id} created_at {created_raw:?}: {e}"))?;

        let items: Vec<OrderItem> = row
            .get("items")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(OrderItem::from_value).collect())
            .unwrap_or_default();

        let subtotal = value_f64(row, &["subtotal"])
            .unwrap_or_else(|| items.iter().map(OrderItem::line_total).sum());
        let delivery_fee = value_f64(row, &["delivery_fee", "deliveryFee"]).unwrap_or(0.0);

        Ok(Self {
            id,
            order_number,
            customer_name: value_str(row, &["customer_name", "customerName"]).unwrap_or_default(),
            customer_phone: value_str(row, &["customer_phone", "customerPhone"]),
            customer_address: value_str(
                row,
                &["customer_area", "customer_address", "customerAddress"],
            ),
            order_type: OrderType::from_value(value_str(row, &["order_type", "orderType"]).as_deref()),
            items,
            subtotal,
            delivery_fee,
            total: value_f64(row, &["total"]).unwrap_or(subtotal + delivery_fee),
            status: value_str(row, &["status"])
                .and_then(|s| OrderStatus::from_value(&s))
                .unwrap_or_default(),
            notes: value_str(row, &["notes"]),
            scheduled_time: value_str(row, &["scheduled_time", "scheduledTime"]),
            created_at,
        })
    }

    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |acc, i| acc.saturating_add(i.quantity))
    }
}

/// Arabic relative age label ("الآن", "منذ 5 دقيقة", ...).
pub fn time_ago(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - created_at).num_seconds().max(0);
    if seconds < 60 {
        "الآن".to_string()
    } else if seconds < 3600 {
        format!("منذ {} دقيقة", seconds / 60)
    } else if seconds < 86_400 {
        format!("منذ {} ساعة", seconds / 3600)
    } else {
        format!("منذ {} يوم", seconds / 86_400)
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// Newest-first list of orders on the kitchen dashboard.
#[derive(Debug, Default, Clone)]
pub struct OrderBoard {
    orders: Vec<Order>,
}

impl OrderBoard {
    pub fn new(mut initial: Vec<Order>) -> Self {
        initial.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Self { orders: initial }
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn get(&self, id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    /// Merge an inserted row. A repeated id replaces the stored copy in place.
    pub fn apply_insert(&mut self, order: Order) {
        match self.orders.iter_mut().find(|o| o.id == order.id) {
            Some(existing) => *existing = order,
            None => self.orders.insert(0, order),
        }
    }

    /// Merge a status update. Returns false for ids not on the board.
    pub fn apply_status(&mut self, id: &str, status: OrderStatus) -> bool {
        match self.orders.iter_mut().find(|o| o.id == id) {
            Some(order) => {
                order.status = status;
                true
            }
            None => false,
        }
    }

    /// Move an order one step along the kitchen flow.
    pub fn advance(&mut self, id: &str) -> Option<OrderStatus> {
        let order = self.orders.iter_mut().find(|o| o.id == id)?;
        let next = order.status.next()?;
        order.status = next;
        Some(next)
    }

    pub fn count_by_status(&self, status: OrderStatus) -> usize {
        self.orders.iter().filter(|o| o.status == status).count()
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|o| o.status.is_open())
    }
}
