//! Arabic text preparation for the raster path.
//!
//! Glyph rasterizers draw one glyph per code point and know nothing about
//! cursive joining or right-to-left runs, so each line is shaped into Arabic
//! presentation forms (U+FE70..U+FEFF, plus lam-alef ligatures) and then
//! reordered into visual left-to-right order before it is drawn.
//!
//! The reordering is a reduced bidi pass that covers ticket content: one
//! paragraph per line, Arabic runs reversed, Latin and digit runs kept in
//! reading order, neutrals resolved from their neighbours.

/// (base, isolated, final, initial, medial); 0 means the form does not exist.
const FORMS: &[(u32, u32, u32, u32, u32)] = &[
    (0x0621, 0xFE80, 0, 0, 0),
    (0x0622, 0xFE81, 0xFE82, 0, 0),
    (0x0623, 0xFE83, 0xFE84, 0, 0),
    (0x0624, 0xFE85, 0xFE86, 0, 0),
    (0x0625, 0xFE87, 0xFE88, 0, 0),
    (0x0626, 0xFE89, 0xFE8A, 0xFE8B, 0xFE8C),
    (0x0627, 0xFE8D, 0xFE8E, 0, 0),
    (0x0628, 0xFE8F, 0xFE90, 0xFE91, 0xFE92),
    (0x0629, 0xFE93, 0xFE94, 0, 0),
    (0x062A, 0xFE95, 0xFE96, 0xFE97, 0xFE98),
    (0x062B, 0xFE99, 0xFE9A, 0xFE9B, 0xFE9C),
    (0x062C, 0xFE9D, 0xFE9E, 0xFE9F, 0xFEA0),
    (0x062D, 0xFEA1, 0xFEA2, 0xFEA3, 0xFEA4),
    (0x062E, 0xFEA5, 0xFEA6, 0xFEA7, 0xFEA8),
    (0x062F, 0xFEA9, 0xFEAA, 0, 0),
    (0x0630, 0xFEAB, 0xFEAC, 0, 0),
    (0x0631, 0xFEAD, 0xFEAE, 0, 0),
    (0x0632, 0xFEAF, 0xFEB0, 0, 0),
    (0x0633, 0xFEB1, 0xFEB2, 0xFEB3, 0xFEB4),
    (0x0634, 0xFEB5, 0xFEB6, 0xFEB7, 0xFEB8),
    (0x0635, 0xFEB9, 0xFEBA, 0xFEBB, 0xFEBC),
    (0x0636, 0xFEBD, 0xFEBE, 0xFEBF, 0xFEC0),
    (0x0637, 0xFEC1, 0xFEC2, 0xFEC3, 0xFEC4),
    (0x0638, 0xFEC5, 0xFEC6, 0xFEC7, 0xFEC8),
    (0x0639, 0xFEC9, 0xFECA, 0xFECB, 0xFECC),
    (0x063A, 0xFECD, 0xFECE, 0xFECF, 0xFED0),
    (0x0641, 0xFED1, 0xFED2, 0xFED3, 0xFED4),
    (0x0642, 0xFED5, 0xFED6, 0xFED7, 0xFED8),
    (0x0643, 0xFED9, 0xFEDA, 0xFEDB, 0xFEDC),
    (0x0644, 0xFEDD, 0xFEDE, 0xFEDF, 0xFEE0),
    (0x0645, 0xFEE1, 0xFEE2, 0xFEE3, 0xFEE4),
    (0x0646, 0xFEE5, 0xFEE6, 0xFEE7, 0xFEE8),
    (0x0647, 0xFEE9, 0xFEEA, 0xFEEB, 0xFEEC),
    (0x0648, 0xFEED, 0xFEEE, 0, 0),
    (0x0649, 0xFEEF, 0xFEF0, 0, 0),
    (0x064A, 0xFEF1, 0xFEF2, 0xFEF3, 0xFEF4),
    (0x067E, 0xFB56, 0xFB57, 0xFB58, 0xFB59),
    (0x0686, 0xFB7A, 0xFB7B, 0xFB7C, 0xFB7D),
    (0x06A9, 0xFB8E, 0xFB8F, 0xFB90, 0xFB91),
    (0x06AF, 0xFB92, 0xFB93, 0xFB94, 0xFB95),
    (0x06CC, 0xFBFC, 0xFBFD, 0xFBFE, 0xFBFF),
];

const TATWEEL: char = '\u{0640}';
const LAM: char = '\u{0644}';

/// (alef variant, isolated ligature, final ligature)
const LAM_ALEF: &[(char, u32, u32)] = &[
    ('\u{0622}', 0xFEF5, 0xFEF6),
    ('\u{0623}', 0xFEF7, 0xFEF8),
    ('\u{0625}', 0xFEF9, 0xFEFA),
    ('\u{0627}', 0xFEFB, 0xFEFC),
];

#[derive(Clone, Copy)]
struct Forms {
    isolated: u32,
    final_: u32,
    initial: u32,
    medial: u32,
}

fn forms(ch: char) -> Option<Forms> {
    let code = ch as u32;
    FORMS
        .binary_search_by_key(&code, |entry| entry.0)
        .ok()
        .map(|idx| {
            let (_, isolated, final_, initial, medial) = FORMS[idx];
            Forms {
                isolated,
                final_,
                initial,
                medial,
            }
        })
}

/// Harakat and other marks that do not take part in joining.
fn is_transparent(ch: char) -> bool {
    matches!(ch as u32, 0x064B..=0x065F | 0x0670 | 0x06D6..=0x06ED)
}

fn joins_forward(ch: char) -> bool {
    ch == TATWEEL || forms(ch).map(|f| f.initial != 0).unwrap_or(false)
}

fn joins_backward(ch: char) -> bool {
    ch == TATWEEL || forms(ch).map(|f| f.final_ != 0).unwrap_or(false)
}

pub fn is_arabic(ch: char) -> bool {
    matches!(
        ch as u32,
        0x0600..=0x06FF | 0x0750..=0x077F | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF
    )
}

fn is_arabic_digit(ch: char) -> bool {
    matches!(ch as u32, 0x0660..=0x0669 | 0x06F0..=0x06F9)
}

/// True when the line contains any right-to-left letter.
pub fn is_rtl(text: &str) -> bool {
    text.chars().any(|c| is_arabic(c) && !is_arabic_digit(c))
}

fn char_from(code: u32, fallback: char) -> char {
    char::from_u32(code).unwrap_or(fallback)
}

/// Replace Arabic letters with their contextual presentation forms.
///
/// Output stays in logical order. Marks are dropped: the raster path cannot
/// position them over the base glyph.
pub fn shape(text: &str) -> String {
    let chars: Vec<char> = text.chars().filter(|c| !is_transparent(*c)).collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let Some(f) = forms(ch) else {
            out.push(ch);
            i += 1;
            continue;
        };

        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        let next = chars.get(i + 1).copied();
        let connect_prev = prev.map(joins_forward).unwrap_or(false) && f.final_ != 0;

        if ch == LAM {
            if let Some(&(_, isolated, final_)) =
                next.and_then(|n| LAM_ALEF.iter().find(|(alef, _, _)| *alef == n))
            {
                out.push(char_from(if connect_prev { final_ } else { isolated }, ch));
                i += 2;
                continue;
            }
        }

        let connect_next = f.initial != 0 && next.map(joins_backward).unwrap_or(false);
        let code = match (connect_prev, connect_next) {
            (true, true) => f.medial,
            (true, false) => f.final_,
            (false, true) => f.initial,
            (false, false) => f.isolated,
        };
        out.push(char_from(code, ch));
        i += 1;
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    Ltr,
    Rtl,
}

fn strong_dir(ch: char) -> Option<Dir> {
    if is_arabic(ch) {
        if is_arabic_digit(ch) {
            return Some(Dir::Ltr);
        }
        return Some(Dir::Rtl);
    }
    if ch.is_alphanumeric() {
        return Some(Dir::Ltr);
    }
    None
}

fn mirror(ch: char) -> char {
    match ch {
        '(' => ')',
        ')' => '(',
        '[' => ']',
        ']' => '[',
        '{' => '}',
        '}' => '{',
        '<' => '>',
        '>' => '<',
        '«' => '»',
        '»' => '«',
        other => other,
    }
}

/// Reorder a logical-order line into visual order (left to right on paper).
///
/// Lines without right-to-left letters are returned unchanged.
pub fn visual_order(text: &str) -> String {
    if !is_rtl(text) {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let strong: Vec<Option<Dir>> = chars.iter().map(|c| strong_dir(*c)).collect();

    let resolved: Vec<Dir> = (0..chars.len())
        .map(|i| {
            if let Some(dir) = strong[i] {
                return dir;
            }
            let before = strong[..i].iter().rev().flatten().next().copied();
            let after = strong[i + 1..].iter().flatten().next().copied();
            match (before, after) {
                (Some(a), Some(b)) if a == b => a,
                _ => Dir::Rtl,
            }
        })
        .collect();

    let mut runs: Vec<(Dir, Vec<char>)> = Vec::new();
    for (ch, dir) in chars.into_iter().zip(resolved) {
        match runs.last_mut() {
            Some((last_dir, run)) if *last_dir == dir => run.push(ch),
            _ => runs.push((dir, vec![ch])),
        }
    }

    let mut out = String::with_capacity(text.len());
    for (dir, run) in runs.into_iter().rev() {
        match dir {
            Dir::Rtl => out.extend(run.into_iter().rev().map(mirror)),
            Dir::Ltr => out.extend(run),
        }
    }
    out
}

/// Shape then reorder: the string a glyph rasterizer should draw left to right.
pub fn prepare_line(text: &str) -> String {
    visual_order(&shape(text))
}
