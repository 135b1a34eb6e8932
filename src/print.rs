//! Kitchen ticket print pipeline.
//!
//! render (RGB canvas) -> threshold and pack (1-bit) -> ePOS envelope -> POST.
//! Every call is a one-shot: nothing is queued or remembered, and sending the
//! same order twice prints it twice.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::bitmap::MonoBitmap;
use crate::epos::{self, EposBuilder};
use crate::error::{PrintError, PrintResult};
use crate::order::Order;
use crate::printers::{self, PrintTransport, PrinterEndpoint};
use crate::receipt_renderer::{self, LayoutConfig, RenderWarning};
use crate::settings::PrinterSettings;

/// Tallest raster the pipeline will send in one `<image>` element.
pub const MAX_TICKET_DOTS: u32 = 32_000;

pub struct PreparedTicket {
    pub bitmap: MonoBitmap,
    pub envelope: String,
    pub warnings: Vec<RenderWarning>,
}

/// Render an order and wrap it in the ePOS request body, without sending.
pub fn prepare_ticket(order: &Order, settings: &PrinterSettings) -> PrintResult<PreparedTicket> {
    let (typesetter, mut warnings) = receipt_renderer::typesetter_for(settings);
    let render = receipt_renderer::render_ticket(order, &LayoutConfig::from(settings), &typesetter);
    warnings.extend(render.warnings);

    let bitmap = MonoBitmap::from_rgb(&render.image);
    if bitmap.height > MAX_TICKET_DOTS {
        return Err(PrintError::Render(format!(
            "ticket is {} dots tall (limit {MAX_TICKET_DOTS})",
            bitmap.height
        )));
    }
    if order.items.is_empty() {
        warnings.push(RenderWarning {
            code: "no_items".to_string(),
            message: format!("Order #{} has no items", order.order_number),
        });
    }
    for w in &warnings {
        warn!(order_number = order.order_number, code = %w.code, "{}", w.message);
    }

    let envelope = epos::image_request(&bitmap, settings.feed_lines);
    Ok(PreparedTicket {
        bitmap,
        envelope,
        warnings,
    })
}

/// Render and send one kitchen ticket. Returns the render warnings on success.
pub async fn print_kitchen_ticket<T: PrintTransport>(
    order: &Order,
    settings: &PrinterSettings,
    transport: &T,
) -> PrintResult<Vec<RenderWarning>> {
    let ticket = prepare_ticket(order, settings)?;
    info!(
        order_number = order.order_number,
        width = ticket.bitmap.width,
        height = ticket.bitmap.height,
        "Printing kitchen ticket"
    );
    let endpoint = PrinterEndpoint::from_settings(settings);
    printers::send_request(transport, &endpoint, ticket.envelope).await?;
    info!(order_number = order.order_number, "Kitchen ticket printed");
    Ok(ticket.warnings)
}

/// Write the thresholded ticket as a black-and-white PNG.
pub fn save_preview(bitmap: &MonoBitmap, path: &Path) -> PrintResult<()> {
    bitmap
        .to_gray_image()
        .save(path)
        .map_err(|e| PrintError::Render(format!("preview write ({}): {e}", path.display())))
}

/// Text-mode diagnostics page using the printer's own font.
pub fn test_page(settings: &PrinterSettings, now: DateTime<Utc>) -> String {
    let mut b = EposBuilder::new();
    b.center()
        .bold(true)
        .double_height(true)
        .text("TEST PRINT")
        .double_height(false)
        .bold(false)
        .lang(Some("ar"))
        .text(&settings.store_name)
        .lang(None)
        .left()
        .separator()
        .line_pair("Printer", &settings.ip)
        .line_pair("Device", &settings.device_id)
        .line_pair("Timeout", &format!("{} ms", settings.timeout_ms))
        .line_pair("Time", &now.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .separator()
        .text("ABCDEFGHIJKLMNOPQRSTUVWXYZ")
        .text("0123456789 #@&*()")
        .double_separator()
        .center()
        .text("-- End of Test --")
        .feed(settings.feed_lines)
        .cut();
    b.envelope()
}

pub async fn print_test_page<T: PrintTransport>(
    settings: &PrinterSettings,
    transport: &T,
) -> PrintResult<()> {
    let endpoint = PrinterEndpoint::from_settings(settings);
    printers::send_request(transport, &endpoint, test_page(settings, Utc::now())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::fixtures::sample_order;
    use crate::printers::fakes::ScriptedTransport;
    use base64::Engine as _;

    const OK_BODY: &str = r#"<response success="true" code=""/>"#;

    fn image_payload(envelope: &str) -> Vec<u8> {
        let start = envelope.find("mode=\"mono\">").expect("image element") + "mode=\"mono\">".len();
        let end = envelope[start..].find("</image>").expect("closing tag") + start;
        base64::engine::general_purpose::STANDARD
            .decode(&envelope[start..end])
            .expect("valid base64")
    }

    #[test]
    fn envelope_embeds_packed_ticket() {
        let settings = PrinterSettings::default();
        let ticket = prepare_ticket(&sample_order(12, 3), &settings).unwrap();

        assert_eq!(ticket.bitmap.width, 576);
        assert!(ticket.envelope.contains(&format!(
            "<image width=\"576\" height=\"{}\" color=\"color_1\" mode=\"mono\">",
            ticket.bitmap.height
        )));
        assert!(ticket.envelope.contains("<feed line=\"5\"/>"));
        assert!(ticket.envelope.contains("<cut type=\"feed\"/>"));

        let payload = image_payload(&ticket.envelope);
        assert_eq!(payload, ticket.bitmap.data);
        assert_eq!(payload.len() as u32, 72 * ticket.bitmap.height);
    }

    #[test]
    fn preparing_twice_is_deterministic() {
        let settings = PrinterSettings::default();
        let order = sample_order(4, 2);
        let a = prepare_ticket(&order, &settings).unwrap();
        let b = prepare_ticket(&order, &settings).unwrap();
        assert_eq!(a.bitmap, b.bitmap);
        assert_eq!(a.envelope, b.envelope);
    }

    #[test]
    fn default_settings_print_arabic_without_glyph_warnings() {
        let mut order = sample_order(15, 2);
        order.notes = Some("بدون بصل ولا ثوم".into());
        order.items[0].selected_options = vec!["طحينة".into(), "لبنة".into()];
        let ticket = prepare_ticket(&order, &PrinterSettings::default()).unwrap();
        assert!(
            ticket.warnings.iter().all(|w| w.code != "missing_glyphs" && w.code != "font_fallback"),
            "{:?}",
            ticket.warnings
        );
    }

    #[test]
    fn empty_order_still_renders_with_warning() {
        let ticket = prepare_ticket(&sample_order(1, 0), &PrinterSettings::default()).unwrap();
        assert!(ticket.bitmap.height > 0);
        assert!(ticket.warnings.iter().any(|w| w.code == "no_items"));
    }

    #[tokio::test]
    async fn print_sends_one_request_per_call() {
        let transport = ScriptedTransport::replying(200, OK_BODY);
        let settings = PrinterSettings::default();
        let order = sample_order(30, 2);

        print_kitchen_ticket(&order, &settings, &transport).await.unwrap();
        print_kitchen_ticket(&order, &settings, &transport).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].0.starts_with("https://192.168.100.205/cgi-bin/epos/service.cgi"));
        assert_eq!(sent[0].1, sent[1].1);
    }

    #[tokio::test]
    async fn print_surfaces_classified_failure() {
        let transport = ScriptedTransport::replying(500, "");
        let err = print_kitchen_ticket(&sample_order(2, 1), &PrinterSettings::default(), &transport)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "رفضت الطابعة الطلب (500)");
    }

    #[tokio::test]
    async fn test_page_is_text_mode() {
        let transport = ScriptedTransport::replying(200, OK_BODY);
        let settings = PrinterSettings::default();
        print_test_page(&settings, &transport).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let body = &sent[0].1;
        assert!(body.contains(">TEST PRINT&#10;</text>"));
        assert!(body.contains("lang=\"ar\""));
        assert!(body.contains("192.168.100.205"));
        assert!(!body.contains("<image"));
    }

    #[test]
    fn preview_round_trips_through_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticket.png");
        let ticket = prepare_ticket(&sample_order(8, 2), &PrinterSettings::default()).unwrap();
        save_preview(&ticket.bitmap, &path).unwrap();

        let reloaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(MonoBitmap::from_rgb(&reloaded), ticket.bitmap);
    }
}
