//! Kitchen ticket layout.
//!
//! An [`Order`] becomes a list of [`TicketLine`]s in logical (reading) order.
//! Placement wraps each text line to the printable width, which fixes the
//! canvas height before anything is drawn; drawing then shapes and reorders
//! every wrapped piece for the raster face.

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::arabic;
use crate::order::{Order, OrderType};
use crate::raster::{Align, BitmapFace, Canvas, GlyphFace, TextStyle, TrueTypeFace, Typesetter};
use crate::settings::PrinterSettings;

pub const TICKET_TITLE: &str = "تذكرة المطبخ";
pub const MARGIN_DOTS: u32 = 8;
const PADDING_TOP: u32 = 16;
const PADDING_BOTTOM: u32 = 24;
const RULE_HEIGHT: u32 = 16;
const OPTION_INDENT: u32 = 24;

const WEEKDAYS_AR: [&str; 7] = [
    "الأحد", "الإثنين", "الثلاثاء", "الأربعاء", "الخميس", "الجمعة", "السبت",
];
pub(crate) const MONTHS_AR: [&str; 12] = [
    "يناير", "فبراير", "مارس", "أبريل", "مايو", "يونيو", "يوليو", "أغسطس", "سبتمبر", "أكتوبر",
    "نوفمبر", "ديسمبر",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub paper_dots: u32,
    pub store_name: String,
    pub footer_text: Option<String>,
    pub utc_offset_minutes: i32,
    pub show_prices: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::from(&PrinterSettings::default())
    }
}

impl From<&PrinterSettings> for LayoutConfig {
    fn from(settings: &PrinterSettings) -> Self {
        Self {
            paper_dots: settings.paper_dots,
            store_name: settings.store_name.clone(),
            footer_text: settings.footer_text.clone(),
            utc_offset_minutes: settings.utc_offset_minutes,
            show_prices: settings.show_prices,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderWarning {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TicketLine {
    Text {
        text: String,
        style: TextStyle,
        align: Align,
        indent: u32,
    },
    Rule {
        double: bool,
    },
    Space(u32),
}

impl TicketLine {
    fn text(text: impl Into<String>, style: TextStyle, align: Align) -> Self {
        Self::Text {
            text: text.into(),
            style,
            align,
            indent: 0,
        }
    }

    fn right(text: impl Into<String>, style: TextStyle) -> Self {
        Self::text(text, style, Align::Right)
    }
}

/// Rendered ticket canvas plus anything the operator should know about it.
pub struct TicketRender {
    pub image: RgbImage,
    pub warnings: Vec<RenderWarning>,
}

enum Placed {
    Text {
        text: String,
        style: TextStyle,
        align: Align,
        indent: u32,
        y: u32,
    },
    Rule {
        double: bool,
        y: u32,
    },
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Weekday, date and 12-hour time in Arabic for the ticket header.
pub fn format_timestamp(at: DateTime<Utc>, utc_offset_minutes: i32) -> (String, String, String) {
    let offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
    let local = at.with_timezone(&offset);

    let weekday = WEEKDAYS_AR[local.weekday().num_days_from_sunday() as usize].to_string();
    let date = format!(
        "{} {} {}",
        local.day(),
        MONTHS_AR[local.month0() as usize],
        local.year()
    );
    let (pm, hour) = local.hour12();
    let time = format!(
        "{:02}:{:02} {}",
        hour,
        local.minute(),
        if pm { "م" } else { "ص" }
    );
    (weekday, date, time)
}

/// Lay the order out as ticket lines, top to bottom.
pub fn ticket_lines(order: &Order, cfg: &LayoutConfig) -> Vec<TicketLine> {
    let mut lines = Vec::new();

    lines.push(TicketLine::Rule { double: true });
    lines.push(TicketLine::text(
        cfg.store_name.trim(),
        TextStyle::TITLE,
        Align::Center,
    ));
    lines.push(TicketLine::text(
        TICKET_TITLE,
        TextStyle::NORMAL,
        Align::Center,
    ));
    lines.push(TicketLine::Rule { double: true });

    lines.push(TicketLine::text(
        format!("#{}", order.order_number),
        TextStyle::TITLE,
        Align::Center,
    ));
    let (weekday, date, time) = format_timestamp(order.created_at, cfg.utc_offset_minutes);
    lines.push(TicketLine::right(
        format!("{weekday}  {date}"),
        TextStyle::NORMAL,
    ));
    lines.push(TicketLine::right(time, TextStyle::NORMAL));
    lines.push(TicketLine::Rule { double: false });

    lines.push(TicketLine::right(
        format!("الاسم: {}", order.customer_name.trim()),
        TextStyle::BOLD,
    ));
    if let Some(phone) = non_empty(order.customer_phone.as_deref()) {
        lines.push(TicketLine::right(
            format!("الجوال: {phone}"),
            TextStyle::NORMAL,
        ));
    }
    match non_empty(order.customer_address.as_deref()) {
        Some(address) => lines.push(TicketLine::right(
            format!("العنوان: {address}"),
            TextStyle::NORMAL,
        )),
        None if order.order_type == OrderType::Pickup => lines.push(TicketLine::right(
            "العنوان: استلام من المحل",
            TextStyle::NORMAL,
        )),
        None => {}
    }
    if let Some(slot) = non_empty(order.scheduled_time.as_deref()) {
        lines.push(TicketLine::right(format!("الموعد: {slot}"), TextStyle::BOLD));
    }
    lines.push(TicketLine::Rule { double: false });

    lines.push(TicketLine::right("الطلبات:", TextStyle::BOLD));
    for item in &order.items {
        lines.push(TicketLine::right(
            format!("{}x  {}", item.quantity, item.name.trim()),
            TextStyle::BOLD,
        ));
        if let Some(name_en) = non_empty(item.name_en.as_deref()) {
            lines.push(TicketLine::Text {
                text: name_en.to_string(),
                style: TextStyle::SMALL,
                align: Align::Left,
                indent: OPTION_INDENT,
            });
        }
        if !item.selected_options.is_empty() {
            lines.push(TicketLine::Text {
                text: item.selected_options.join(" - "),
                style: TextStyle::NORMAL,
                align: Align::Right,
                indent: OPTION_INDENT,
            });
        }
        if cfg.show_prices {
            lines.push(TicketLine::text(
                format!("{} ر.س", money(item.line_total())),
                TextStyle::SMALL,
                Align::Left,
            ));
        }
        lines.push(TicketLine::Space(RULE_HEIGHT / 2));
    }

    if cfg.show_prices {
        lines.push(TicketLine::Rule { double: false });
        if order.delivery_fee > 0.0 {
            lines.push(TicketLine::right(
                format!("التوصيل: {} ر.س", money(order.delivery_fee)),
                TextStyle::NORMAL,
            ));
        }
        lines.push(TicketLine::right(
            format!("الإجمالي: {} ر.س", money(order.total)),
            TextStyle::BOLD,
        ));
    }

    if let Some(notes) = non_empty(order.notes.as_deref()) {
        lines.push(TicketLine::Rule { double: false });
        lines.push(TicketLine::right("ملاحظات:", TextStyle::BOLD));
        for paragraph in notes.lines().map(str::trim).filter(|l| !l.is_empty()) {
            lines.push(TicketLine::right(paragraph, TextStyle::NORMAL));
        }
    }

    lines.push(TicketLine::Rule { double: true });
    if let Some(footer) = non_empty(cfg.footer_text.as_deref()) {
        lines.push(TicketLine::text(footer, TextStyle::SMALL, Align::Center));
    }
    lines
}

fn place(lines: &[TicketLine], ts: &Typesetter) -> (Vec<Placed>, u32) {
    let mut placed = Vec::new();
    let mut y = PADDING_TOP;
    for line in lines {
        match line {
            TicketLine::Text {
                text,
                style,
                align,
                indent,
            } => {
                let height = ts.line_height(*style);
                for piece in ts.wrap(text, *style, *indent) {
                    placed.push(Placed::Text {
                        text: piece,
                        style: *style,
                        align: *align,
                        indent: *indent,
                        y,
                    });
                    y += height;
                }
            }
            TicketLine::Rule { double } => {
                placed.push(Placed::Rule { double: *double, y });
                y += RULE_HEIGHT;
            }
            TicketLine::Space(dots) => y += dots,
        }
    }
    (placed, y + PADDING_BOTTOM)
}

/// Canvas height the lines will occupy, padding included.
pub fn measure_height(lines: &[TicketLine], ts: &Typesetter) -> u32 {
    place(lines, ts).1
}

/// Pick the glyph face for the ticket: the configured TrueType font when it
/// loads, otherwise the bundled Arabic-capable font. The bitmap font is only
/// used if the bundled font cannot be parsed.
pub fn typesetter_for(settings: &PrinterSettings) -> (Typesetter, Vec<RenderWarning>) {
    let mut warnings = Vec::new();
    let configured = settings.font_path.as_deref().and_then(|path| {
        match TrueTypeFace::load(path) {
            Ok(face) => Some(face),
            Err(e) => {
                warn!(error = %e, "Ticket font unavailable, using bundled font");
                warnings.push(RenderWarning {
                    code: "font_fallback".to_string(),
                    message: format!("Ticket font could not be loaded ({e}); using bundled font"),
                });
                None
            }
        }
    });
    let face: Box<dyn GlyphFace> = match configured.map_or_else(TrueTypeFace::bundled, Ok) {
        Ok(face) => Box::new(face),
        Err(e) => {
            error!(error = %e, "Bundled ticket font unusable, using bitmap font");
            warnings.push(RenderWarning {
                code: "font_fallback".to_string(),
                message: format!("{e}; Arabic text will print as boxes"),
            });
            Box::new(BitmapFace)
        }
    };
    (
        Typesetter::new(face, settings.paper_dots, MARGIN_DOTS),
        warnings,
    )
}

pub fn render_ticket(order: &Order, cfg: &LayoutConfig, ts: &Typesetter) -> TicketRender {
    let lines = ticket_lines(order, cfg);
    let (placed, height) = place(&lines, ts);
    let mut canvas = Canvas::new(cfg.paper_dots, height);
    let mut warnings = Vec::new();
    let mut missing = false;

    for item in &placed {
        match item {
            Placed::Text {
                text,
                style,
                align,
                indent,
                y,
            } => {
                let visual = arabic::prepare_line(text);
                if !missing && ts.missing_glyphs(&visual) {
                    missing = true;
                }
                ts.draw_line(&mut canvas, &visual, *style, *align, *y, *indent);
            }
            Placed::Rule { double, y } => {
                if *double {
                    ts.draw_rule(&mut canvas, *y, RULE_HEIGHT / 2, 2);
                    ts.draw_rule(&mut canvas, *y + RULE_HEIGHT / 2, RULE_HEIGHT / 2, 2);
                } else {
                    ts.draw_rule(&mut canvas, *y, RULE_HEIGHT, 2);
                }
            }
        }
    }

    if missing {
        warnings.push(RenderWarning {
            code: "missing_glyphs".to_string(),
            message: "Some characters have no glyph in the ticket font and print as boxes"
                .to_string(),
        });
    }
    debug!(
        order_number = order.order_number,
        height,
        lines = placed.len(),
        "Kitchen ticket rendered"
    );
    TicketRender {
        image: canvas.into_image(),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::MonoBitmap;
    use crate::order::fixtures::sample_order;
    use chrono::TimeZone;

    fn bitmap_setter() -> Typesetter {
        Typesetter::new(Box::new(BitmapFace), 576, MARGIN_DOTS)
    }

    fn height_of(order: &Order, cfg: &LayoutConfig) -> u32 {
        measure_height(&ticket_lines(order, cfg), &bitmap_setter())
    }

    fn texts(lines: &[TicketLine]) -> Vec<&str> {
        lines
            .iter()
            .filter_map(|line| match line {
                TicketLine::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn header_timestamp_uses_configured_offset() {
        let at = Utc.with_ymd_and_hms(2026, 3, 6, 14, 5, 0).unwrap();
        let (weekday, date, time) = format_timestamp(at, 180);
        assert_eq!(weekday, "الجمعة");
        assert_eq!(date, "6 مارس 2026");
        assert_eq!(time, "05:05 م");

        let (_, _, morning) = format_timestamp(at, -10 * 60);
        assert_eq!(morning, "04:05 ص");
    }

    #[test]
    fn lines_follow_ticket_order() {
        let mut order = sample_order(42, 1);
        order.scheduled_time = Some("الجمعة 6/3 - 19:00".into());
        order.items[0].selected_options = vec!["طحينة".into(), "مخلل".into()];
        let lines = ticket_lines(&order, &LayoutConfig::default());

        assert_eq!(lines.first(), Some(&TicketLine::Rule { double: true }));
        assert_eq!(lines.last(), Some(&TicketLine::Rule { double: true }));
        let texts = texts(&lines);
        assert_eq!(texts[0], "أمل سناك");
        assert_eq!(texts[1], TICKET_TITLE);
        assert_eq!(texts[2], "#42");
        let pos = |needle: &str| texts.iter().position(|t| t.starts_with(needle)).unwrap();
        assert!(pos("الاسم:") < pos("الجوال:"));
        assert!(pos("الجوال:") < pos("العنوان:"));
        assert!(pos("العنوان:") < pos("الموعد:"));
        assert!(pos("الموعد:") < pos("الطلبات:"));
        assert!(pos("الطلبات:") < pos("2x  صحن مشكل 1"));
        assert!(pos("2x  صحن مشكل 1") < pos("Mixed Plate 1"));
        assert!(pos("Mixed Plate 1") < pos("طحينة - مخلل"));
        assert!(!texts.iter().any(|t| t.contains("ر.س")));
    }

    #[test]
    fn pickup_without_address_says_store_pickup() {
        let mut order = sample_order(7, 1);
        order.order_type = OrderType::Pickup;
        order.customer_address = None;
        order.customer_phone = Some("  ".into());
        let lines = ticket_lines(&order, &LayoutConfig::default());
        let texts = texts(&lines);
        assert!(texts.contains(&"العنوان: استلام من المحل"));
        assert!(!texts.iter().any(|t| t.starts_with("الجوال:")));
    }

    #[test]
    fn height_is_monotonic_in_item_count() {
        let cfg = LayoutConfig::default();
        let heights: Vec<u32> = (0..8).map(|n| height_of(&sample_order(1, n), &cfg)).collect();
        for pair in heights.windows(2) {
            assert!(pair[0] <= pair[1], "heights went down: {heights:?}");
        }
        assert!(heights[7] > heights[0]);
    }

    #[test]
    fn option_lines_never_shrink_the_ticket() {
        let cfg = LayoutConfig::default();
        for n in 1..5 {
            let plain = sample_order(1, n);
            let mut with_options = plain.clone();
            with_options.items[0].selected_options = vec!["جبن".into()];
            assert!(height_of(&with_options, &cfg) > height_of(&plain, &cfg));

            let mut long_options = plain.clone();
            long_options.items[n - 1].selected_options =
                (0..12).map(|i| format!("إضافة {i}")).collect();
            assert!(height_of(&long_options, &cfg) > height_of(&with_options, &cfg));
        }
    }

    #[test]
    fn notes_and_prices_add_lines() {
        let base = sample_order(3, 2);
        let cfg = LayoutConfig::default();
        let plain = height_of(&base, &cfg);

        let mut noted = base.clone();
        noted.notes = Some("بدون بصل\nالرجاء الاتصال عند الوصول".into());
        assert!(height_of(&noted, &cfg) > plain);

        let priced = LayoutConfig {
            show_prices: true,
            ..LayoutConfig::default()
        };
        assert!(height_of(&base, &priced) > plain);
        let lines = ticket_lines(&base, &priced);
        assert!(texts(&lines).contains(&"الإجمالي: 230.00 ر.س"));
    }

    #[test]
    fn render_produces_full_width_canvas() {
        let order = sample_order(9, 3);
        let (ts, warnings) = typesetter_for(&PrinterSettings::default());
        assert!(warnings.is_empty());
        let cfg = LayoutConfig::default();
        let out = render_ticket(&order, &cfg, &ts);
        assert_eq!(out.image.width(), 576);
        assert_eq!(
            out.image.height(),
            measure_height(&ticket_lines(&order, &cfg), &ts)
        );
        assert!(MonoBitmap::from_rgb(&out.image).ink_count() > 0);
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
    }

    #[test]
    fn bitmap_face_flags_arabic_as_missing() {
        let order = sample_order(9, 1);
        let out = render_ticket(&order, &LayoutConfig::default(), &bitmap_setter());
        assert!(out.warnings.iter().any(|w| w.code == "missing_glyphs"));
    }

    #[test]
    fn unreadable_font_falls_back_with_warning() {
        let settings = PrinterSettings {
            font_path: Some("/nonexistent/ticket.ttf".into()),
            ..PrinterSettings::default()
        };
        let (ts, warnings) = typesetter_for(&settings);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "font_fallback");
        assert_eq!(ts.printable_width(), 576 - 2 * MARGIN_DOTS);

        let out = render_ticket(&sample_order(4, 1), &LayoutConfig::default(), &ts);
        assert!(!out.warnings.iter().any(|w| w.code == "missing_glyphs"));

        let (_, none) = typesetter_for(&PrinterSettings::default());
        assert!(none.is_empty());
    }
}
