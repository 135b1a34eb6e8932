//! Sales summary for the admin dashboard.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, Utc};
use serde::Serialize;

use crate::order::{Order, OrderStatus, OrderType};
use crate::receipt_renderer::MONTHS_AR;

pub const TOP_ITEMS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SalesRange {
    #[default]
    Today,
    /// The last seven days including today.
    Week,
    /// Since the first of the current month.
    Month,
}

impl SalesRange {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(Self::Today),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(format!("Unknown sales range: {other}")),
        }
    }

    pub fn label_ar(self) -> &'static str {
        match self {
            Self::Today => "اليوم",
            Self::Week => "الأسبوع",
            Self::Month => "الشهر",
        }
    }

    /// First local day included in the range.
    pub fn start_day(self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Today => today,
            Self::Week => today - Duration::days(6),
            Self::Month => today.with_day(1).unwrap_or(today),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopItem {
    pub name: String,
    pub quantity: u32,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTotal {
    pub day: NaiveDate,
    /// `6 مارس`
    pub label: String,
    pub revenue: f64,
    pub orders: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub total_revenue: f64,
    pub total_orders: u32,
    pub delivery_orders: u32,
    pub pickup_orders: u32,
    pub avg_order_value: f64,
    pub top_items: Vec<TopItem>,
    pub daily_totals: Vec<DailyTotal>,
}

fn shop_offset(utc_offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
}

/// Summarize non-cancelled orders created on or after the range's first local
/// day. Day boundaries use the shop's UTC offset.
pub fn summarize(
    orders: &[Order],
    range: SalesRange,
    now: DateTime<Utc>,
    utc_offset_minutes: i32,
) -> SalesSummary {
    let offset = shop_offset(utc_offset_minutes);
    let start = range.start_day(now.with_timezone(&offset).date_naive());

    let mut included: Vec<&Order> = orders
        .iter()
        .filter(|o| o.status != OrderStatus::Cancelled)
        .filter(|o| o.created_at.with_timezone(&offset).date_naive() >= start)
        .collect();
    included.sort_by_key(|o| o.created_at);

    if included.is_empty() {
        return SalesSummary::default();
    }

    let total_revenue: f64 = included.iter().map(|o| o.total).sum();
    let total_orders = included.len() as u32;
    let count_type = |t: OrderType| included.iter().filter(|o| o.order_type == t).count() as u32;

    // First-seen order breaks quantity ties.
    let mut top: Vec<TopItem> = Vec::new();
    for item in included.iter().flat_map(|o| o.items.iter()) {
        match top.iter_mut().find(|t| t.name == item.name) {
            Some(entry) => {
                entry.quantity += item.quantity;
                entry.revenue += item.line_total();
            }
            None => top.push(TopItem {
                name: item.name.clone(),
                quantity: item.quantity,
                revenue: item.line_total(),
            }),
        }
    }
    top.sort_by(|a, b| b.quantity.cmp(&a.quantity));
    top.truncate(TOP_ITEMS);

    let mut days: BTreeMap<NaiveDate, (f64, u32)> = BTreeMap::new();
    for order in &included {
        let entry = days
            .entry(order.created_at.with_timezone(&offset).date_naive())
            .or_default();
        entry.0 += order.total;
        entry.1 += 1;
    }
    let daily_totals = days
        .into_iter()
        .map(|(day, (revenue, orders))| DailyTotal {
            day,
            label: format!("{} {}", day.day(), MONTHS_AR[day.month0() as usize]),
            revenue,
            orders,
        })
        .collect();

    SalesSummary {
        total_revenue,
        total_orders,
        delivery_orders: count_type(OrderType::Delivery),
        pickup_orders: count_type(OrderType::Pickup),
        avg_order_value: (total_revenue / f64::from(total_orders)).round(),
        top_items: top,
        daily_totals,
    }
}
