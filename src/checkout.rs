//! Checkout: delivery fees, form validation, the order payload, and the
//! WhatsApp handoff message.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::cart::{Cart, DeliveryInfo};
use crate::order::{Order, OrderItem, OrderStatus, OrderType};

/// Business number in international format without the leading `+`.
pub const WHATSAPP_NUMBER: &str = "966567512699";
pub const PICKUP_AREA_LABEL: &str = "استلام من المحل";
pub const ASAP_LABEL: &str = "في أقرب وقت";
const CURRENCY: &str = "ر.س";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeliveryArea {
    pub id: &'static str,
    pub name: &'static str,
    pub price: f64,
}

pub const DELIVERY_AREAS: [DeliveryArea; 6] = [
    DeliveryArea { id: "khobar", name: "الخبر", price: 50.0 },
    DeliveryArea { id: "dammam", name: "الدمام", price: 50.0 },
    DeliveryArea { id: "dhahran", name: "الظهران", price: 50.0 },
    DeliveryArea { id: "qatif", name: "القطيف", price: 60.0 },
    DeliveryArea { id: "saihat", name: "سيهات", price: 55.0 },
    DeliveryArea { id: "jubail", name: "الجبيل", price: 80.0 },
];

/// Look an area up by its Arabic name or its id.
pub fn find_area(key: &str) -> Option<&'static DeliveryArea> {
    let key = key.trim();
    DELIVERY_AREAS.iter().find(|a| a.name == key || a.id == key)
}

/// Fee for the chosen area; pickup and unknown areas cost nothing.
pub fn delivery_fee(area: &str, order_type: OrderType) -> f64 {
    match order_type {
        OrderType::Pickup => 0.0,
        OrderType::Delivery => find_area(area).map(|a| a.price).unwrap_or(0.0),
    }
}

pub fn validate(info: &DeliveryInfo, order_type: OrderType) -> Result<(), String> {
    let blank = |s: &str| s.trim().is_empty();
    match order_type {
        OrderType::Pickup if blank(&info.name) => Err("الرجاء إدخال الاسم".to_string()),
        OrderType::Delivery if blank(&info.name) || blank(&info.phone) || blank(&info.area) => {
            Err("الرجاء ملء جميع الحقول المطلوبة".to_string())
        }
        _ => Ok(()),
    }
}

/// Order payload handed to the backend at checkout.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_area: String,
    pub order_type: OrderType,
    pub items: Vec<OrderItem>,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub total: f64,
    pub notes: String,
    pub scheduled_time: Option<String>,
}

impl NewOrder {
    /// Local copy of a placed order, e.g. to print its kitchen ticket before
    /// the backend row comes back. The id is a fresh local UUID.
    pub fn into_order(self, order_number: i64, created_at: DateTime<Utc>) -> Order {
        let optional = |s: String| (!s.is_empty()).then_some(s);
        Order {
            id: uuid::Uuid::new_v4().to_string(),
            order_number,
            customer_name: self.customer_name,
            customer_phone: optional(self.customer_phone),
            customer_address: optional(self.customer_area),
            order_type: self.order_type,
            items: self.items,
            subtotal: self.subtotal,
            delivery_fee: self.delivery_fee,
            total: self.total,
            status: OrderStatus::Pending,
            notes: optional(self.notes),
            scheduled_time: self.scheduled_time,
            created_at,
        }
    }
}

/// Validate the form and turn the cart into a `NewOrder`.
pub fn build_order(
    cart: &Cart,
    info: &DeliveryInfo,
    order_type: OrderType,
) -> Result<NewOrder, String> {
    if cart.is_empty() {
        return Err("السلة فارغة".to_string());
    }
    validate(info, order_type)?;

    let items = cart
        .items()
        .iter()
        .map(|line| OrderItem {
            name: line.item.name.clone(),
            name_en: line.item.name_en.clone(),
            quantity: line.quantity,
            price: line.item.price,
            selected_options: line.selected_options.clone(),
        })
        .collect();
    let subtotal = cart.total_price();
    let fee = delivery_fee(&info.area, order_type);
    let customer_area = match order_type {
        OrderType::Pickup => PICKUP_AREA_LABEL.to_string(),
        OrderType::Delivery => info.area.trim().to_string(),
    };

    info!(
        order_type = ?order_type,
        lines = cart.items().len(),
        subtotal,
        delivery_fee = fee,
        "Checkout order built"
    );

    Ok(NewOrder {
        customer_name: info.name.trim().to_string(),
        customer_phone: info.phone.trim().to_string(),
        customer_area,
        order_type,
        items,
        subtotal,
        delivery_fee: fee,
        total: subtotal + fee,
        notes: info.notes.trim().to_string(),
        scheduled_time: info.scheduled_time.clone().filter(|t| !t.trim().is_empty()),
    })
}

/// Amounts as customers see them: `90`, `12.5`, `7.25`.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        return format!("{value:.0}");
    }
    let fixed = format!("{value:.2}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn push_items(message: &mut String, items: &[OrderItem]) {
    message.push_str("\n*الطلبات:*\n");
    for item in items {
        message.push_str(&format!(
            "- {} x {} = {} {CURRENCY}\n",
            item.name,
            item.quantity,
            format_amount(item.line_total())
        ));
        if !item.selected_options.is_empty() {
            message.push_str(&format!("  ({})\n", item.selected_options.join("، ")));
        }
    }
}

/// Plain-text order summary for the shop's WhatsApp chat.
pub fn whatsapp_message(order: &NewOrder, info: &DeliveryInfo) -> String {
    let mut message = String::new();
    match order.order_type {
        OrderType::Delivery => {
            message.push_str("*طلب جديد من أمل سناك*\n\n");
            message.push_str(&format!("*الاسم:* {}\n", order.customer_name));
            message.push_str(&format!("*الهاتف:* {}\n", order.customer_phone));
            message.push_str(&format!("*المنطقة:* {}\n", order.customer_area));
            message.push_str(&format!("*العنوان:* {}\n", info.address.trim()));
            if let Some(time) = &order.scheduled_time {
                message.push_str(&format!("*وقت التسليم:* {time}\n"));
            }
            push_items(&mut message, &order.items);
            message.push_str(&format!(
                "\n*المجموع الفرعي:* {} {CURRENCY}\n",
                format_amount(order.subtotal)
            ));
            message.push_str(&format!(
                "*رسوم التوصيل ({}):* {} {CURRENCY}\n",
                order.customer_area,
                format_amount(order.delivery_fee)
            ));
            message.push_str(&format!("*الإجمالي:* {} {CURRENCY}\n", format_amount(order.total)));
        }
        OrderType::Pickup => {
            message.push_str("*طلب استلام من المحل - أمل سناك*\n\n");
            message.push_str(&format!("*الاسم:* {}\n", order.customer_name));
            if let Some(time) = &order.scheduled_time {
                message.push_str(&format!("*وقت الاستلام:* {time}\n"));
            }
            push_items(&mut message, &order.items);
            message.push_str(&format!(
                "\n*الإجمالي:* {} {CURRENCY}\n",
                format_amount(order.subtotal)
            ));
            message.push_str("*نوع الطلب:* استلام من المحل 🏪\n");
        }
    }
    if !order.notes.is_empty() {
        message.push_str(&format!("\n*ملاحظات:* {}", order.notes));
    }
    message
}

pub fn whatsapp_link(message: &str) -> String {
    format!(
        "https://wa.me/{WHATSAPP_NUMBER}?text={}",
        urlencoding::encode(message)
    )
}

/// Summary shown on the confirmation screen after the handoff.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub name: String,
    pub area: String,
    pub total: f64,
    pub order_type: OrderType,
    pub time: String,
}

pub fn confirmation(order: &NewOrder) -> Confirmation {
    Confirmation {
        name: order.customer_name.clone(),
        area: match order.order_type {
            OrderType::Pickup => String::new(),
            OrderType::Delivery => order.customer_area.clone(),
        },
        total: order.total,
        order_type: order.order_type,
        time: order
            .scheduled_time
            .clone()
            .unwrap_or_else(|| ASAP_LABEL.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::MenuItem;

    fn cart() -> Cart {
        let mut cart = Cart::new();
        let tray = MenuItem {
            id: "t1".into(),
            name: "صينية مشكلة".into(),
            price: 120.0,
            category: "trays".into(),
            in_stock: true,
            ..Default::default()
        };
        let juice = MenuItem {
            id: "j1".into(),
            name: "عصير برتقال".into(),
            price: 12.5,
            category: "drinks".into(),
            in_stock: true,
            ..Default::default()
        };
        cart.add(&tray, 1, vec!["كبه".into(), "ورق عنب".into()]);
        cart.add(&juice, 2, vec![]);
        cart
    }

    fn delivery_info() -> DeliveryInfo {
        DeliveryInfo {
            name: "سارة".into(),
            phone: "0501234567".into(),
            address: "حي العقربية".into(),
            area: "القطيف".into(),
            notes: String::new(),
            scheduled_time: None,
        }
    }

    #[test]
    fn fees_by_area_and_type() {
        assert_eq!(delivery_fee("الجبيل", OrderType::Delivery), 80.0);
        assert_eq!(delivery_fee("saihat", OrderType::Delivery), 55.0);
        assert_eq!(delivery_fee("الجبيل", OrderType::Pickup), 0.0);
        assert_eq!(delivery_fee("الرياض", OrderType::Delivery), 0.0);
    }

    #[test]
    fn validation_messages() {
        let mut info = delivery_info();
        assert!(validate(&info, OrderType::Delivery).is_ok());

        info.phone = "  ".into();
        assert_eq!(
            validate(&info, OrderType::Delivery).unwrap_err(),
            "الرجاء ملء جميع الحقول المطلوبة"
        );
        assert!(validate(&info, OrderType::Pickup).is_ok());

        info.name.clear();
        assert_eq!(validate(&info, OrderType::Pickup).unwrap_err(), "الرجاء إدخال الاسم");
    }

    #[test]
    fn delivery_order_totals() {
        let order = build_order(&cart(), &delivery_info(), OrderType::Delivery).unwrap();
        assert_eq!(order.subtotal, 145.0);
        assert_eq!(order.delivery_fee, 60.0);
        assert_eq!(order.total, 205.0);
        assert_eq!(order.customer_area, "القطيف");
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].selected_options.len(), 2);
        assert!(order.scheduled_time.is_none());

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["orderType"], "delivery");
        assert_eq!(json["deliveryFee"], 60.0);
    }

    #[test]
    fn pickup_order_uses_shop_label() {
        let order = build_order(&cart(), &delivery_info(), OrderType::Pickup).unwrap();
        assert_eq!(order.customer_area, PICKUP_AREA_LABEL);
        assert_eq!(order.delivery_fee, 0.0);
        assert_eq!(order.total, 145.0);
        assert_eq!(confirmation(&order).area, "");
        assert_eq!(confirmation(&order).time, ASAP_LABEL);
    }

    #[test]
    fn placed_order_feeds_the_kitchen_ticket() {
        let mut info = delivery_info();
        info.notes = "بدون بصل".into();
        let new_order = build_order(&cart(), &info, OrderType::Delivery).unwrap();
        let at = Utc::now();
        let a = new_order.clone().into_order(1042, at);
        let b = new_order.into_order(1042, at);

        assert_ne!(a.id, b.id);
        assert_eq!(a.order_number, 1042);
        assert_eq!(a.status, OrderStatus::Pending);
        assert_eq!(a.customer_address.as_deref(), Some("القطيف"));
        assert_eq!(a.notes.as_deref(), Some("بدون بصل"));
        assert_eq!(a.item_count(), 3);
        assert_eq!(a.total, 205.0);
    }

    #[test]
    fn empty_cart_is_rejected() {
        assert_eq!(
            build_order(&Cart::new(), &delivery_info(), OrderType::Delivery).unwrap_err(),
            "السلة فارغة"
        );
    }

    #[test]
    fn delivery_message_layout() {
        let mut info = delivery_info();
        info.scheduled_time = Some("الجمعة 6/3 - 18:30".into());
        info.notes = "بدون بصل".into();
        let order = build_order(&cart(), &info, OrderType::Delivery).unwrap();
        let message = whatsapp_message(&order, &info);

        let expected = "*طلب جديد من أمل سناك*\n\n\
            *الاسم:* سارة\n\
            *الهاتف:* 0501234567\n\
            *المنطقة:* القطيف\n\
            *العنوان:* حي العقربية\n\
            *وقت التسليم:* الجمعة 6/3 - 18:30\n\
            \n*الطلبات:*\n\
            - صينية مشكلة x 1 = 120 ر.س\n  (كبه، ورق عنب)\n\
            - عصير برتقال x 2 = 25 ر.س\n\
            \n*المجموع الفرعي:* 145 ر.س\n\
            *رسوم التوصيل (القطيف):* 60 ر.س\n\
            *الإجمالي:* 205 ر.س\n\
            \n*ملاحظات:* بدون بصل";
        assert_eq!(message, expected);
        assert_eq!(confirmation(&order).time, "الجمعة 6/3 - 18:30");
    }

    #[test]
    fn pickup_message_layout() {
        let info = delivery_info();
        let order = build_order(&cart(), &info, OrderType::Pickup).unwrap();
        let message = whatsapp_message(&order, &info);
        assert!(message.starts_with("*طلب استلام من المحل - أمل سناك*\n\n*الاسم:* سارة\n\n*الطلبات:*"));
        assert!(message.ends_with("\n*الإجمالي:* 145 ر.س\n*نوع الطلب:* استلام من المحل 🏪\n"));
        assert!(!message.contains("الهاتف"));
    }

    #[test]
    fn link_is_percent_encoded() {
        let link = whatsapp_link("*طلب* 1 & 2\n");
        assert!(link.starts_with("https://wa.me/966567512699?text="));
        let query = link.split_once("?text=").unwrap().1;
        assert!(!query.contains(' ') && !query.contains('\n') && !query.contains('&'));
        assert_eq!(urlencoding::decode(query).unwrap(), "*طلب* 1 & 2\n");
    }

    #[test]
    fn amounts_drop_trailing_zeros() {
        assert_eq!(format_amount(90.0), "90");
        assert_eq!(format_amount(12.5), "12.5");
        assert_eq!(format_amount(7.25), "7.25");
    }
}
