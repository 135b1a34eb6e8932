use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::db::DbState;
use crate::error::PrintError;
use crate::order::Order;
use crate::printers::{HttpTransport, PrintTransport, PrinterEndpoint};
use crate::settings::{self, PrinterSettings};
use crate::{diagnostics, print};

// -- Helpers -----------------------------------------------------------------

fn load_printer_settings(db: &DbState) -> Result<PrinterSettings, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(PrinterSettings::load(&conn))
}

/// Read an order row (as stored by the backend) from a JSON file.
pub fn load_order_file(path: &Path) -> Result<Order, String> {
    let value = super::read_json_file(path)?;
    let row = value.get("order").unwrap_or(&value);
    Order::from_row(row)
}

fn failure_payload(err: &PrintError, latency_ms: u64) -> Value {
    json!({
        "success": false,
        "error": err.to_string(),
        "category": err.category(),
        "transient": err.is_transient(),
        "latencyMs": latency_ms,
    })
}

// -- Kitchen ticket ----------------------------------------------------------

/// Print with an explicit transport. The CLI goes through
/// [`kitchen_print_ticket`]; tests hand in a scripted transport.
pub async fn kitchen_print_with<T: PrintTransport>(
    order: &Order,
    settings: &PrinterSettings,
    transport: &T,
) -> Value {
    let start = Instant::now();
    match print::print_kitchen_ticket(order, settings, transport).await {
        Ok(warnings) => {
            let latency_ms = start.elapsed().as_millis() as u64;
            info!(
                order_number = order.order_number,
                latency_ms,
                warnings = warnings.len(),
                "Kitchen ticket dispatched"
            );
            json!({
                "success": true,
                "orderNumber": order.order_number,
                "printer": settings.ip,
                "warnings": warnings,
                "latencyMs": latency_ms,
            })
        }
        Err(e) => {
            let latency_ms = start.elapsed().as_millis() as u64;
            warn!(
                order_number = order.order_number,
                category = e.category(),
                error = %e,
                "Kitchen ticket failed"
            );
            let mut payload = failure_payload(&e, latency_ms);
            payload["orderNumber"] = json!(order.order_number);
            payload
        }
    }
}

pub async fn kitchen_print_order(db: &DbState, order: &Order) -> Result<Value, String> {
    let settings = load_printer_settings(db)?;
    let transport = match HttpTransport::for_endpoint(&PrinterEndpoint::from_settings(&settings)) {
        Ok(t) => t,
        Err(e) => return Ok(failure_payload(&e, 0)),
    };
    Ok(kitchen_print_with(order, &settings, &transport).await)
}

pub async fn kitchen_print_ticket(db: &DbState, order_path: &Path) -> Result<Value, String> {
    let order = load_order_file(order_path)?;
    kitchen_print_order(db, &order).await
}

/// Render the ticket exactly as it would be sent, and write it as a PNG.
pub fn kitchen_render_ticket(db: &DbState, order_path: &Path, out: &Path) -> Result<Value, String> {
    let order = load_order_file(order_path)?;
    let settings = load_printer_settings(db)?;
    let ticket = print::prepare_ticket(&order, &settings).map_err(|e| e.to_string())?;
    print::save_preview(&ticket.bitmap, out).map_err(|e| e.to_string())?;
    info!(
        order_number = order.order_number,
        path = %out.display(),
        height = ticket.bitmap.height,
        "Ticket preview written"
    );
    Ok(json!({
        "success": true,
        "orderNumber": order.order_number,
        "path": out.display().to_string(),
        "width": ticket.bitmap.width,
        "height": ticket.bitmap.height,
        "requestBytes": ticket.envelope.len(),
        "warnings": ticket.warnings,
    }))
}

// -- Printer settings --------------------------------------------------------

pub fn printer_show(db: &DbState) -> Result<Value, String> {
    Ok(json!({
        "success": true,
        "health": diagnostics::get_system_health(db)?,
    }))
}

pub fn printer_set_ip(db: &DbState, ip: &str) -> Result<Value, String> {
    let ip = settings::set_printer_ip(db, ip)?;
    let settings = load_printer_settings(db)?;
    Ok(json!({
        "success": true,
        "ip": ip,
        "serviceUrl": PrinterEndpoint::from_settings(&settings).service_url(),
    }))
}

pub fn printer_set(db: &DbState, key: &str, value: &str) -> Result<Value, String> {
    settings::set_printer_setting(db, key, value)?;
    Ok(json!({ "success": true, "key": key, "value": value.trim() }))
}

/// Text-mode test page using the printer's built-in font.
pub async fn printer_test(db: &DbState) -> Result<Value, String> {
    let settings = load_printer_settings(db)?;
    let endpoint = PrinterEndpoint::from_settings(&settings);
    let transport = match HttpTransport::for_endpoint(&endpoint) {
        Ok(t) => t,
        Err(e) => return Ok(failure_payload(&e, 0)),
    };
    printer_test_with(&settings, &transport).await
}

pub async fn printer_test_with<T: PrintTransport>(
    settings: &PrinterSettings,
    transport: &T,
) -> Result<Value, String> {
    let start = Instant::now();
    let result = print::print_test_page(settings, transport).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => {
            info!(printer = %settings.ip, latency_ms, "Test page printed");
            Ok(json!({
                "success": true,
                "printer": settings.ip,
                "message": "Test print dispatched",
                "printedAt": Utc::now().to_rfc3339(),
                "latencyMs": latency_ms,
            }))
        }
        Err(e) => {
            warn!(printer = %settings.ip, error = %e, "Test print failed");
            let mut payload = failure_payload(&e, latency_ms);
            payload["printer"] = json!(settings.ip);
            Ok(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::order::fixtures::sample_order;
    use crate::printers::fakes::ScriptedTransport;

    fn write_order(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("order.json");
        let row = json!({
            "order": {
                "id": "b7e4",
                "order_number": 1042,
                "customer_name": "سارة علي",
                "customer_phone": "+966509876543",
                "customer_area": "الدمام",
                "order_type": "delivery",
                "items": [
                    { "name": "كبة مثلجة", "nameEn": "Frozen Kibbeh", "quantity": 5, "price": 30 },
                    { "name": "صينية مشكلة", "quantity": 1, "price": 120,
                      "selectedIngredients": ["كبه", "ورق عنب"] }
                ],
                "status": "pending",
                "notes": "الباب الخلفي",
                "created_at": "2026-03-06T14:05:00Z"
            }
        });
        std::fs::write(&path, row.to_string()).unwrap();
        path
    }

    #[tokio::test]
    async fn success_payload_reports_order_and_warnings() {
        let transport = ScriptedTransport::replying(200, r#"<response success="true" code=""/>"#);
        let payload =
            kitchen_print_with(&sample_order(7, 2), &PrinterSettings::default(), &transport).await;
        assert_eq!(payload["success"], true);
        assert_eq!(payload["orderNumber"], 7);
        assert_eq!(payload["printer"], "192.168.100.205");
        assert!(payload["warnings"].is_array());
    }

    #[tokio::test]
    async fn failure_payload_carries_category() {
        let transport = ScriptedTransport::replying(200, "<soap:Fault>SchemaError</soap:Fault>");
        let payload =
            kitchen_print_with(&sample_order(8, 1), &PrinterSettings::default(), &transport).await;
        assert_eq!(payload["success"], false);
        assert_eq!(payload["category"], "printer_not_configured");
        assert_eq!(payload["transient"], false);
        assert_eq!(payload["orderNumber"], 8);
        assert!(payload["error"].as_str().unwrap().contains("ePOS-Print"));
    }

    #[tokio::test]
    async fn test_page_failure_is_a_payload_not_an_error() {
        let transport = ScriptedTransport::replying(503, "");
        let payload = printer_test_with(&PrinterSettings::default(), &transport)
            .await
            .unwrap();
        assert_eq!(payload["success"], false);
        assert_eq!(payload["category"], "printer_rejected");
    }

    #[test]
    #[serial_test::serial]
    fn render_writes_preview_file() {
        let dir = tempfile::tempdir().unwrap();
        let order_path = write_order(dir.path());
        let out = dir.path().join("ticket.png");
        let state = db::open_in_memory().unwrap();

        let payload = kitchen_render_ticket(&state, &order_path, &out).unwrap();
        assert_eq!(payload["success"], true);
        assert_eq!(payload["orderNumber"], 1042);
        assert_eq!(payload["width"], 576);
        assert!(out.is_file());

        let order = load_order_file(&order_path).unwrap();
        assert_eq!(order.items[1].selected_options.len(), 2);
        assert_eq!(order.customer_address.as_deref(), Some("الدمام"));
    }

    #[test]
    #[serial_test::serial]
    fn set_ip_updates_service_url() {
        let state = db::open_in_memory().unwrap();
        let payload = printer_set_ip(&state, " 10.0.0.50 ").unwrap();
        assert_eq!(payload["ip"], "10.0.0.50");
        assert!(payload["serviceUrl"]
            .as_str()
            .unwrap()
            .starts_with("https://10.0.0.50/cgi-bin/epos/service.cgi?devid="));
        assert!(printer_set_ip(&state, "").is_err());
        assert!(printer_set(&state, "colour", "red").is_err());
        assert_eq!(printer_set(&state, "show_prices", "true").unwrap()["success"], true);
    }
}
