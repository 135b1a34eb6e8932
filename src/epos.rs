//! ePOS-Print XML document builder.
//!
//! Produces the `<epos-print>` body that network printers accept at
//! `/cgi-bin/epos/service.cgi`, wrapped in a SOAP 1.1 envelope. Text
//! attributes (alignment, emphasis, double height, language) are builder
//! state and are written onto every `<text>` element that follows.

use crate::bitmap::MonoBitmap;

pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const EPOS_PRINT_NS: &str = "http://www.epson-pos.com/schemas/2011/03/epos-print";

/// Columns of the printer's native font on 80 mm paper.
pub const LINE_CHARS_80MM: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EposAlign {
    Left,
    Center,
    Right,
}

impl EposAlign {
    fn as_str(self) -> &'static str {
        match self {
            EposAlign::Left => "left",
            EposAlign::Center => "center",
            EposAlign::Right => "right",
        }
    }
}

/// Escape text for XML element content and attribute values.
pub fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Builder for ePOS-Print request bodies.
///
/// ```rust,ignore
/// let mut b = EposBuilder::new();
/// b.center().bold(true).text("TEST PRINT").bold(false)
///     .separator()
///     .feed(3)
///     .cut();
/// let xml = b.envelope();
/// ```
pub struct EposBuilder {
    elements: Vec<String>,
    align: EposAlign,
    bold: bool,
    double_height: bool,
    lang: Option<String>,
    line_chars: usize,
}

impl Default for EposBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EposBuilder {
    pub fn new() -> Self {
        Self {
            elements: Vec::with_capacity(32),
            align: EposAlign::Left,
            bold: false,
            double_height: false,
            lang: None,
            line_chars: LINE_CHARS_80MM,
        }
    }

    pub fn with_line_chars(mut self, chars: usize) -> Self {
        self.line_chars = chars.max(1);
        self
    }

    // -----------------------------------------------------------------------
    // Text attributes
    // -----------------------------------------------------------------------

    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.bold = on;
        self
    }

    pub fn double_height(&mut self, on: bool) -> &mut Self {
        self.double_height = on;
        self
    }

    /// `lang` hint for the printer font (`"ar"`, `"en"`, ...). `None` clears it.
    pub fn lang(&mut self, lang: Option<&str>) -> &mut Self {
        self.lang = lang.map(str::to_string);
        self
    }

    pub fn align(&mut self, align: EposAlign) -> &mut Self {
        self.align = align;
        self
    }

    pub fn left(&mut self) -> &mut Self {
        self.align(EposAlign::Left)
    }

    pub fn center(&mut self) -> &mut Self {
        self.align(EposAlign::Center)
    }

    pub fn right(&mut self) -> &mut Self {
        self.align(EposAlign::Right)
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    /// One line of text with the current attributes, terminated by a newline.
    pub fn text(&mut self, s: &str) -> &mut Self {
        let mut attrs = String::new();
        if let Some(lang) = &self.lang {
            attrs.push_str(&format!(" lang=\"{}\"", xml_escape(lang)));
        }
        attrs.push_str(&format!(
            " align=\"{}\" em=\"{}\" dh=\"{}\"",
            self.align.as_str(),
            self.bold,
            self.double_height
        ));
        self.elements
            .push(format!("<text{attrs}>{}&#10;</text>", xml_escape(s)));
        self
    }

    /// Dashed rule matching the line width.
    pub fn separator(&mut self) -> &mut Self {
        let rule = "-".repeat(self.line_chars);
        self.elements.push(format!("<text>{rule}&#10;</text>"));
        self
    }

    pub fn double_separator(&mut self) -> &mut Self {
        let rule = "=".repeat(self.line_chars);
        self.elements.push(format!("<text>{rule}&#10;</text>"));
        self
    }

    /// Label on the left, value on the right, padded to the line width.
    pub fn line_pair(&mut self, label: &str, value: &str) -> &mut Self {
        let used = label.chars().count() + value.chars().count();
        let gap = self.line_chars.saturating_sub(used).max(1);
        let line = format!("{label}{}{value}", " ".repeat(gap));
        self.text(&line)
    }

    /// Raster image in the printer's 1-bit mono mode.
    pub fn image(&mut self, bitmap: &MonoBitmap) -> &mut Self {
        self.elements.push(format!(
            "<image width=\"{}\" height=\"{}\" color=\"color_1\" mode=\"mono\">{}</image>",
            bitmap.width,
            bitmap.height,
            bitmap.to_base64()
        ));
        self
    }

    // -----------------------------------------------------------------------
    // Feed / cut
    // -----------------------------------------------------------------------

    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.elements.push(format!("<feed line=\"{lines}\"/>"));
        self
    }

    /// Feed to the cutter position, then cut.
    pub fn cut(&mut self) -> &mut Self {
        self.elements.push("<cut type=\"feed\"/>".to_string());
        self
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    /// The bare `<epos-print>` element.
    pub fn build(&self) -> String {
        format!(
            "<epos-print xmlns=\"{EPOS_PRINT_NS}\">{}</epos-print>",
            self.elements.concat()
        )
    }

    /// Full SOAP request body.
    pub fn envelope(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <s:Envelope xmlns:s=\"{SOAP_ENV_NS}\"><s:Body>{}</s:Body></s:Envelope>",
            self.build()
        )
    }
}

/// Envelope carrying one raster ticket followed by a feed and a cut.
pub fn image_request(bitmap: &MonoBitmap, feed_lines: u8) -> String {
    let mut b = EposBuilder::new();
    b.image(bitmap).feed(feed_lines).cut();
    b.envelope()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn escapes_markup_and_newlines() {
        assert_eq!(
            xml_escape("<a href=\"x\">Tom & Jerry's</a>\nok"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&apos;s&lt;/a&gt;&#10;ok"
        );
        assert_eq!(xml_escape("شاورما"), "شاورما");
    }

    #[test]
    fn text_carries_current_attributes() {
        let mut b = EposBuilder::new();
        b.center()
            .bold(true)
            .double_height(true)
            .text("#12")
            .bold(false)
            .double_height(false)
            .right()
            .lang(Some("ar"))
            .text("الاسم: <سارة>");
        let xml = b.build();
        assert!(xml.contains("<text align=\"center\" em=\"true\" dh=\"true\">#12&#10;</text>"));
        assert!(xml.contains(
            "<text lang=\"ar\" align=\"right\" em=\"false\" dh=\"false\">الاسم: &lt;سارة&gt;&#10;</text>"
        ));
    }

    #[test]
    fn separators_match_line_width() {
        let mut b = EposBuilder::new().with_line_chars(32);
        b.separator().double_separator();
        let xml = b.build();
        assert!(xml.contains(&format!("<text>{}&#10;</text>", "-".repeat(32))));
        assert!(xml.contains(&format!("<text>{}&#10;</text>", "=".repeat(32))));
    }

    #[test]
    fn line_pair_pads_to_width() {
        let mut b = EposBuilder::new().with_line_chars(20);
        b.line_pair("IP", "10.0.0.7");
        let expected = format!("IP{}10.0.0.7", " ".repeat(10));
        assert!(b.build().contains(&format!(">{expected}&#10;</text>")));

        let mut tight = EposBuilder::new().with_line_chars(4);
        tight.line_pair("Printer", "ok");
        assert!(tight.build().contains(">Printer ok&#10;"));
    }

    #[test]
    fn image_request_layout() {
        let img = RgbImage::from_pixel(16, 2, Rgb([0, 0, 0]));
        let bitmap = MonoBitmap::from_rgb(&img);
        let xml = image_request(&bitmap, 5);

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains(&format!("<s:Envelope xmlns:s=\"{SOAP_ENV_NS}\">")));
        assert!(xml.contains(&format!("<epos-print xmlns=\"{EPOS_PRINT_NS}\">")));
        let image = format!(
            "<image width=\"16\" height=\"2\" color=\"color_1\" mode=\"mono\">{}</image>",
            bitmap.to_base64()
        );
        let image_at = xml.find(&image).expect("image element");
        let feed_at = xml.find("<feed line=\"5\"/>").expect("feed element");
        let cut_at = xml.find("<cut type=\"feed\"/>").expect("cut element");
        assert!(image_at < feed_at && feed_at < cut_at);
        assert!(xml.ends_with("</epos-print></s:Body></s:Envelope>"));
    }
}
