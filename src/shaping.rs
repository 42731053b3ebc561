//! Text shaping applied to every string before it reaches a template.
//!
//! Word processors stretch "distributed" paragraphs by spreading spare width
//! between clusters. For scripts without inter-word spaces (Thai, Khmer,
//! Devanagari, ...) and for cursive scripts (Arabic, Syriac) that spreading
//! visually merges or breaks glyphs unless an explicit zero-width separator
//! marks every cluster boundary. [`shape`] inserts those separators and
//! normalizes whitespace so the output of a form lands in the document in a
//! predictable shape.

use lazy_static::lazy_static;
use regex::Regex;

/// Separator placed between clusters of scripts that do not join.
pub const ZERO_WIDTH_SPACE: char = '\u{200B}';
/// Separator placed between joining letters; keeps cursive connection intact.
pub const ZERO_WIDTH_JOINER: char = '\u{200D}';
const ZERO_WIDTH_NON_JOINER: char = '\u{200C}';

lazy_static! {
    static ref HORIZONTAL_RUN: Regex = Regex::new(r"[ \t]+").unwrap();
    static ref SPACE_AROUND_NEWLINE: Regex = Regex::new(r" ?\n ?").unwrap();
    static ref BLANK_LINE_RUN: Regex = Regex::new(r"\n{3,}").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptClass {
    /// Cursive scripts whose letters connect to their neighbours.
    Joining,
    /// Scripts written without spaces between words.
    Spaceless,
    Other,
}

/// Normalize and shape a user-supplied string.
///
/// Pure and idempotent: `shape(&shape(x)) == shape(x)`.
pub fn shape(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let normalized = normalize_whitespace(text);
    insert_cluster_separators(&normalized)
}

fn normalize_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let collapsed = HORIZONTAL_RUN.replace_all(&unified, " ");
    let tight = SPACE_AROUND_NEWLINE.replace_all(&collapsed, "\n");
    let blank = BLANK_LINE_RUN.replace_all(&tight, "\n\n");
    blank.trim().to_string()
}

fn insert_cluster_separators(text: &str) -> String {
    if !text.chars().any(|c| script_class(c) != ScriptClass::Other) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + text.len() / 2);
    let mut last: Option<char> = None;

    for c in text.chars() {
        if let Some(prev) = last {
            if needs_separator(prev, c) {
                out.push(separator_for(script_class(c)));
            }
        }
        out.push(c);
        last = Some(c);
    }

    out
}

fn needs_separator(prev: char, next: char) -> bool {
    if is_separator(prev) || is_separator(next) {
        return false;
    }
    if is_combining_mark(next) || is_virama(prev) {
        return false;
    }

    match (script_class(prev), script_class(next)) {
        (ScriptClass::Spaceless, ScriptClass::Spaceless) => true,
        (ScriptClass::Joining, ScriptClass::Joining) => {
            is_joining_letter_or_mark(prev) && is_joining_letter_or_mark(next)
        }
        _ => false,
    }
}

fn separator_for(class: ScriptClass) -> char {
    match class {
        ScriptClass::Joining => ZERO_WIDTH_JOINER,
        _ => ZERO_WIDTH_SPACE,
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, ZERO_WIDTH_SPACE | ZERO_WIDTH_JOINER | ZERO_WIDTH_NON_JOINER)
}

fn script_class(c: char) -> ScriptClass {
    match c as u32 {
        // Arabic, Syriac, Arabic Supplement, Arabic Extended-A, presentation forms
        0x0600..=0x06FF
        | 0x0700..=0x074F
        | 0x0750..=0x077F
        | 0x08A0..=0x08FF
        | 0xFB50..=0xFDFF
        | 0xFE70..=0xFEFF => ScriptClass::Joining,
        // Devanagari through Sinhala, Thai, Lao, Myanmar, Khmer
        0x0900..=0x0DFF | 0x0E00..=0x0EFF | 0x1000..=0x109F | 0x1780..=0x17FF => {
            ScriptClass::Spaceless
        }
        _ => ScriptClass::Other,
    }
}

/// Digits and punctuation of the joining scripts never connect, so they do
/// not get a joiner.
fn is_joining_letter_or_mark(c: char) -> bool {
    !matches!(
        c as u32,
        0x0600..=0x060F | 0x061B..=0x061F | 0x0660..=0x066D | 0x06D4 | 0x06F0..=0x06F9 | 0x0700..=0x070F
    )
}

fn is_combining_mark(c: char) -> bool {
    let cp = c as u32;
    match cp {
        // Arabic harakat and Quranic marks
        0x0610..=0x061A
        | 0x064B..=0x065F
        | 0x0670
        | 0x06D6..=0x06DC
        | 0x06DF..=0x06E4
        | 0x06E7..=0x06E8
        | 0x06EA..=0x06ED
        | 0x08D3..=0x08FF
        // Syriac
        | 0x0711
        | 0x0730..=0x074A
        // Thai
        | 0x0E31
        | 0x0E34..=0x0E3A
        | 0x0E47..=0x0E4E
        // Lao
        | 0x0EB1
        | 0x0EB4..=0x0EBC
        | 0x0EC8..=0x0ECD
        // Myanmar
        | 0x102B..=0x103E
        | 0x1056..=0x1059
        | 0x105E..=0x1060
        | 0x1062..=0x1064
        | 0x1067..=0x106D
        | 0x1071..=0x1074
        | 0x1082..=0x108D
        | 0x108F
        | 0x109A..=0x109D
        // Khmer
        | 0x17B4..=0x17D3
        | 0x17DD => true,
        // Brahmic blocks share one layout: signs at the start, matras and
        // virama in the middle, vocalic extensions near the end.
        0x0900..=0x0DFF => matches!(
            cp & 0x7F,
            0x00..=0x03 | 0x3A..=0x3C | 0x3E..=0x4F | 0x51..=0x57 | 0x62..=0x63
        ),
        _ => false,
    }
}

/// A virama (or coeng) glues the next consonant into the same cluster.
fn is_virama(c: char) -> bool {
    let cp = c as u32;
    match cp {
        0x0900..=0x0DFF => cp & 0x7F == 0x4D,
        0x0E3A | 0x0EBA | 0x1039 | 0x103A | 0x17D2 => true,
        _ => false,
    }
}
