//! Off-screen canvas and glyph rasterization for thermal tickets.
//!
//! Two glyph sources are supported: a TrueType face loaded with `rusttype`
//! (the production path, any font with Arabic presentation forms works) and
//! the built-in 8x8 bitmap font from `font8x8`, scaled up per text size.
//! The bitmap font has no Arabic glyphs; it draws a hollow box instead so a
//! missing font is obvious on paper rather than silently blank.

use std::path::Path;

use font8x8::{UnicodeFonts, BASIC_FONTS, GREEK_FONTS, LATIN_FONTS};
use image::{Rgb, RgbImage};
use rusttype::{point, Font, Scale};

use crate::arabic;

const PAPER: Rgb<u8> = Rgb([255, 255, 255]);

/// White RGB canvas that only ever gets darker.
pub struct Canvas {
    img: RgbImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            img: RgbImage::from_pixel(width.max(1), height.max(1), PAPER),
        }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    /// Darken one dot by `coverage` (0.0 paper .. 1.0 full ink).
    pub fn ink(&mut self, x: i32, y: i32, coverage: f32) {
        if x < 0 || y < 0 || x as u32 >= self.img.width() || y as u32 >= self.img.height() {
            return;
        }
        let level = (255.0 * (1.0 - coverage.clamp(0.0, 1.0))).round() as u8;
        let px = self.img.get_pixel_mut(x as u32, y as u32);
        for channel in px.0.iter_mut() {
            *channel = (*channel).min(level);
        }
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32) {
        for dy in 0..h as i32 {
            for dx in 0..w as i32 {
                self.ink(x + dx, y + dy, 1.0);
            }
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.img
    }

    pub fn into_image(self) -> RgbImage {
        self.img
    }
}

// ---------------------------------------------------------------------------
// Text styles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSize {
    Small,
    Normal,
    Large,
}

impl TextSize {
    /// Nominal glyph height in dots.
    pub fn px(self) -> f32 {
        match self {
            TextSize::Small => 18.0,
            TextSize::Normal => 24.0,
            TextSize::Large => 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStyle {
    pub size: TextSize,
    pub bold: bool,
}

impl TextStyle {
    pub const NORMAL: TextStyle = TextStyle {
        size: TextSize::Normal,
        bold: false,
    };
    pub const BOLD: TextStyle = TextStyle {
        size: TextSize::Normal,
        bold: true,
    };
    pub const SMALL: TextStyle = TextStyle {
        size: TextSize::Small,
        bold: false,
    };
    pub const TITLE: TextStyle = TextStyle {
        size: TextSize::Large,
        bold: true,
    };
}

// ---------------------------------------------------------------------------
// Glyph faces
// ---------------------------------------------------------------------------

pub trait GlyphFace {
    /// Height of one text line (glyph box plus leading) in dots.
    fn line_height(&self, px: f32) -> u32;
    /// Advance width of `text` in dots.
    fn text_width(&self, text: &str, px: f32) -> u32;
    /// Draw `text` (already in visual order) with its line box top-left at (x, y).
    fn draw(&self, canvas: &mut Canvas, text: &str, x: i32, y: i32, px: f32);
    fn has_glyph(&self, ch: char) -> bool;
}

/// Scaled 8x8 bitmap font.
#[derive(Debug, Default, Clone, Copy)]
pub struct BitmapFace;

impl BitmapFace {
    fn scale(px: f32) -> u32 {
        ((px / 8.0).round() as u32).max(1)
    }

    fn glyph(ch: char) -> Option<[u8; 8]> {
        BASIC_FONTS
            .get(ch)
            .or_else(|| LATIN_FONTS.get(ch))
            .or_else(|| GREEK_FONTS.get(ch))
    }
}

impl GlyphFace for BitmapFace {
    fn line_height(&self, px: f32) -> u32 {
        let scale = Self::scale(px);
        8 * scale + 2 * scale
    }

    fn text_width(&self, text: &str, px: f32) -> u32 {
        text.chars().count() as u32 * 8 * Self::scale(px)
    }

    fn draw(&self, canvas: &mut Canvas, text: &str, x: i32, y: i32, px: f32) {
        let scale = Self::scale(px) as i32;
        let top = y + scale;
        for (idx, ch) in text.chars().enumerate() {
            let cell_x = x + idx as i32 * 8 * scale;
            if ch.is_whitespace() {
                continue;
            }
            match Self::glyph(ch) {
                Some(rows) => {
                    for (row, bits) in rows.iter().enumerate() {
                        for col in 0..8 {
                            if bits & (1 << col) != 0 {
                                canvas.fill_rect(
                                    cell_x + col * scale,
                                    top + row as i32 * scale,
                                    scale as u32,
                                    scale as u32,
                                );
                            }
                        }
                    }
                }
                None => {
                    let size = (6 * scale) as u32;
                    let (bx, by) = (cell_x + scale, top + scale);
                    canvas.fill_rect(bx, by, size, scale as u32);
                    canvas.fill_rect(bx, by + size as i32 - scale, size, scale as u32);
                    canvas.fill_rect(bx, by, scale as u32, size);
                    canvas.fill_rect(bx + size as i32 - scale, by, scale as u32, size);
                }
            }
        }
    }

    fn has_glyph(&self, ch: char) -> bool {
        ch.is_whitespace() || Self::glyph(ch).is_some()
    }
}

/// DejaVu Sans, shipped with the binary. Covers Latin, Arabic and the
/// presentation forms the shaper emits. License in `assets/fonts/LICENSE`.
pub static BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

/// TrueType face, either the bundled font or one loaded from disk.
pub struct TrueTypeFace {
    font: Font<'static>,
}

impl TrueTypeFace {
    pub fn bundled() -> Result<Self, String> {
        Font::try_from_bytes(BUNDLED_FONT)
            .map(|font| Self { font })
            .ok_or_else(|| "bundled ticket font is not a usable TrueType face".to_string())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, String> {
        Font::try_from_vec(bytes)
            .map(|font| Self { font })
            .ok_or_else(|| "font data is not a usable TrueType/OpenType face".to_string())
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let bytes =
            std::fs::read(path).map_err(|e| format!("font read failed ({}): {e}", path.display()))?;
        Self::from_bytes(bytes)
    }
}

impl GlyphFace for TrueTypeFace {
    fn line_height(&self, px: f32) -> u32 {
        let v = self.font.v_metrics(Scale::uniform(px));
        (v.ascent - v.descent + v.line_gap).ceil().max(1.0) as u32 + 4
    }

    fn text_width(&self, text: &str, px: f32) -> u32 {
        self.font
            .layout(text, Scale::uniform(px), point(0.0, 0.0))
            .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
            .fold(0.0f32, f32::max)
            .ceil() as u32
    }

    fn draw(&self, canvas: &mut Canvas, text: &str, x: i32, y: i32, px: f32) {
        let scale = Scale::uniform(px);
        let ascent = self.font.v_metrics(scale).ascent;
        let origin = point(x as f32, y as f32 + 2.0 + ascent);
        for glyph in self.font.layout(text, scale, origin) {
            if let Some(bb) = glyph.pixel_bounding_box() {
                glyph.draw(|gx, gy, coverage| {
                    canvas.ink(bb.min.x + gx as i32, bb.min.y + gy as i32, coverage);
                });
            }
        }
    }

    fn has_glyph(&self, ch: char) -> bool {
        ch.is_whitespace() || self.font.glyph(ch).id().0 != 0
    }
}

// ---------------------------------------------------------------------------
// Typesetter
// ---------------------------------------------------------------------------

/// Measures, wraps, and draws styled lines onto a fixed-width canvas.
pub struct Typesetter {
    face: Box<dyn GlyphFace>,
    width: u32,
    margin: u32,
}

impl Typesetter {
    pub fn new(face: Box<dyn GlyphFace>, width: u32, margin: u32) -> Self {
        Self {
            face,
            width,
            margin,
        }
    }

    pub fn printable_width(&self) -> u32 {
        self.width.saturating_sub(2 * self.margin).max(1)
    }

    pub fn line_height(&self, style: TextStyle) -> u32 {
        self.face.line_height(style.size.px())
    }

    pub fn measure(&self, text: &str, style: TextStyle) -> u32 {
        let width = self.face.text_width(text, style.size.px());
        if style.bold && width > 0 {
            width + 1
        } else {
            width
        }
    }

    /// Width of `text` once Arabic letters take their joined forms.
    fn measure_shaped(&self, text: &str, style: TextStyle) -> u32 {
        self.measure(&arabic::shape(text), style)
    }

    /// True when the face lacks a glyph for any character of `text`.
    pub fn missing_glyphs(&self, text: &str) -> bool {
        text.chars().any(|c| !self.face.has_glyph(c))
    }

    /// Break logical-order text into lines that fit the printable width
    /// minus `indent`. Words wider than a full line are split by characters.
    pub fn wrap(&self, text: &str, style: TextStyle, indent: u32) -> Vec<String> {
        let max = self.printable_width().saturating_sub(indent).max(1);
        let mut out = Vec::new();
        let mut line = String::new();

        for word in text.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{line} {word}")
            };
            if self.measure_shaped(&candidate, style) <= max {
                line = candidate;
                continue;
            }
            if !line.is_empty() {
                out.push(std::mem::take(&mut line));
            }
            if self.measure_shaped(word, style) <= max {
                line = word.to_string();
                continue;
            }
            for ch in word.chars() {
                let mut next = line.clone();
                next.push(ch);
                if !line.is_empty() && self.measure_shaped(&next, style) > max {
                    out.push(std::mem::take(&mut line));
                    line.push(ch);
                } else {
                    line = next;
                }
            }
        }
        if !line.is_empty() {
            out.push(line);
        }
        if out.is_empty() {
            out.push(String::new());
        }
        out
    }

    /// Draw one visual-order line whose box starts at `y`. `indent` pushes
    /// left-aligned text right and right-aligned text left.
    pub fn draw_line(
        &self,
        canvas: &mut Canvas,
        text: &str,
        style: TextStyle,
        align: Align,
        y: u32,
        indent: u32,
    ) {
        let px = style.size.px();
        let text_width = self.measure(text, style);
        let left = (self.margin + indent) as i32;
        let right = self.width.saturating_sub(self.margin + indent) as i32;
        let x = match align {
            Align::Left => left,
            Align::Center => (self.width as i32 - text_width as i32) / 2,
            Align::Right => right - text_width as i32,
        }
        .max(0);

        self.face.draw(canvas, text, x, y as i32, px);
        if style.bold {
            self.face.draw(canvas, text, x + 1, y as i32, px);
        }
    }

    /// Horizontal rule across the printable width, vertically centered in `height`.
    pub fn draw_rule(&self, canvas: &mut Canvas, y: u32, height: u32, thickness: u32) {
        let top = y + height.saturating_sub(thickness) / 2;
        canvas.fill_rect(
            self.margin as i32,
            top as i32,
            self.printable_width(),
            thickness,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::MonoBitmap;

    fn setter() -> Typesetter {
        Typesetter::new(Box::new(BitmapFace), 576, 8)
    }

    #[test]
    fn canvas_ink_only_darkens() {
        let mut canvas = Canvas::new(4, 4);
        canvas.ink(1, 1, 1.0);
        canvas.ink(1, 1, 0.2);
        canvas.ink(-1, 9, 1.0);
        assert_eq!(canvas.image().get_pixel(1, 1), &Rgb([0, 0, 0]));
        assert_eq!(canvas.image().get_pixel(0, 0), &PAPER);
    }

    #[test]
    fn bitmap_face_metrics_scale_with_size() {
        let face = BitmapFace;
        assert_eq!(face.text_width("abc", TextSize::Normal.px()), 3 * 24);
        assert_eq!(face.line_height(TextSize::Normal.px()), 30);
        assert!(face.line_height(TextSize::Large.px()) > face.line_height(TextSize::Small.px()));
    }

    #[test]
    fn bitmap_face_draws_latin_and_boxes_unknown_glyphs() {
        let mut canvas = Canvas::new(64, 32);
        BitmapFace.draw(&mut canvas, "A", 0, 0, 8.0);
        let latin = MonoBitmap::from_rgb(canvas.image()).ink_count();
        assert!(latin > 0);

        let mut canvas = Canvas::new(64, 32);
        BitmapFace.draw(&mut canvas, "\u{FE8F}", 0, 0, 8.0);
        let boxed = MonoBitmap::from_rgb(canvas.image()).ink_count();
        assert_eq!(boxed, 20);

        let mut canvas = Canvas::new(64, 32);
        BitmapFace.draw(&mut canvas, "   ", 0, 0, 8.0);
        assert_eq!(MonoBitmap::from_rgb(canvas.image()).ink_count(), 0);
    }

    #[test]
    fn wrap_respects_printable_width() {
        let ts = setter();
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let lines = ts.wrap(text, TextStyle::NORMAL, 0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(ts.measure(line, TextStyle::NORMAL) <= ts.printable_width());
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn wrap_splits_overlong_words() {
        let ts = setter();
        let word = "x".repeat(60);
        let lines = ts.wrap(&word, TextStyle::NORMAL, 0);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.concat(), word);
        assert_eq!(ts.wrap("   ", TextStyle::NORMAL, 0), vec![String::new()]);
    }

    #[test]
    fn alignment_moves_ink() {
        let ts = setter();
        let first_ink_column = |align: Align| {
            let mut canvas = Canvas::new(576, 40);
            ts.draw_line(&mut canvas, "I", TextStyle::NORMAL, align, 0, 0);
            let bmp = MonoBitmap::from_rgb(canvas.image());
            (0..576)
                .find(|x| (0..40).any(|y| bmp.get(*x, y)))
                .expect("some ink")
        };
        let left = first_ink_column(Align::Left);
        let center = first_ink_column(Align::Center);
        let right = first_ink_column(Align::Right);
        assert!(left < center && center < right);
        assert!(left >= 8);
    }

    #[test]
    fn bold_adds_ink() {
        let ts = setter();
        let ink = |style| {
            let mut canvas = Canvas::new(576, 40);
            ts.draw_line(&mut canvas, "Hello", style, Align::Left, 0, 0);
            MonoBitmap::from_rgb(canvas.image()).ink_count()
        };
        assert!(ink(TextStyle::BOLD) > ink(TextStyle::NORMAL));
    }

    #[test]
    fn indent_narrows_wrap_width_and_shifts_ink() {
        let ts = setter();
        let text = "aaaa bbbb cccc dddd eeee";
        assert_eq!(ts.wrap(text, TextStyle::NORMAL, 0).len(), 2);
        assert_eq!(ts.wrap(text, TextStyle::NORMAL, 300).len(), 3);

        let mut canvas = Canvas::new(576, 40);
        ts.draw_line(&mut canvas, "I", TextStyle::NORMAL, Align::Left, 0, 48);
        let bmp = MonoBitmap::from_rgb(canvas.image());
        assert!((0..56).all(|x| (0..40).all(|y| !bmp.get(x, y))));
    }

    #[test]
    fn bitmap_face_reports_missing_arabic_glyphs() {
        let ts = setter();
        assert!(!ts.missing_glyphs("Order 12"));
        assert!(ts.missing_glyphs("\u{FE8F}"));
    }

    #[test]
    fn bundled_face_covers_arabic_name_line() {
        let ts = Typesetter::new(Box::new(TrueTypeFace::bundled().unwrap()), 576, 8);
        let visual = arabic::prepare_line("الاسم: أحمد");
        assert!(!ts.missing_glyphs(&visual));
        assert!(!ts.missing_glyphs("Order #12 - 45.00"));
        assert!(ts.measure(&visual, TextStyle::NORMAL) > 0);

        let height = ts.line_height(TextStyle::NORMAL);
        assert!(height > 0);
        let mut canvas = Canvas::new(576, height);
        ts.draw_line(&mut canvas, &visual, TextStyle::NORMAL, Align::Right, 0, 0);
        let bmp = MonoBitmap::from_rgb(canvas.image());
        assert!(bmp.ink_count() > 0);
        // right aligned, so the left half stays blank
        assert!((0..288).all(|x| (0..height).all(|y| !bmp.get(x, y))));
    }

    #[test]
    fn bundled_face_matches_loaded_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticket.ttf");
        std::fs::write(&path, BUNDLED_FONT).unwrap();
        let loaded = TrueTypeFace::load(&path).unwrap();
        let bundled = TrueTypeFace::bundled().unwrap();
        let px = TextSize::Normal.px();
        assert_eq!(loaded.text_width("أمل سناك", px), bundled.text_width("أمل سناك", px));
        assert_eq!(loaded.line_height(px), bundled.line_height(px));
    }

    #[test]
    fn truetype_rejects_garbage() {
        assert!(TrueTypeFace::from_bytes(vec![0, 1, 2, 3]).is_err());
        assert!(TrueTypeFace::load(Path::new("/definitely/missing.ttf")).is_err());
    }
}
