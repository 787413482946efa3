//! List handling: paragraph list markers → Markdown list syntax.
//!
//! A line is a list item when its first character carries a list-marker
//! attribute, or when its raw text matches one of the tab-delimited shapes
//! rich-text producers flatten lists into:
//!
//! ```text
//! \t•\t\t•\tText      two-tab unordered (the second glyph is the marker)
//! \t42.\tText         numbered
//! \t•\tText           bare bullet
//! ```
//!
//! Numbering is lazy: every ordinal item renders as `1.` and the Markdown
//! renderer numbers the sequence. Per-depth counters are still maintained so
//! callers can inspect list position, but they never reach the output.

use crate::model::MarkerKind;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Deepest nesting level tracked; deeper items are clamped.
pub const MAX_DEPTH: u8 = 3;

static RE_TWO_TAB_UNORDERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\t([^\t])\t\t([^\t])\t(.*)$").unwrap());
static RE_NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\t(\d+)\.\t(.*)$").unwrap());
static RE_BARE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\t([•⁃◦✓])\t(.*)$").unwrap());

const CHECKED_PATTERNS: [&str; 5] = ["☑", "✓", "✔", "[x]", "[X]"];
const UNCHECKED_PATTERNS: [&str; 5] = ["☐", "◻", "[]", "[ ]", "◦"];

/// The kind of the most recent list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListKind {
    #[default]
    None,
    Numbered,
    Bulleted,
}

/// Per-conversion list state.
#[derive(Debug, Clone, Default)]
pub struct ListContext {
    counters: BTreeMap<u8, u32>,
    last_kind: ListKind,
}

impl ListContext {
    pub fn reset(&mut self) {
        *self = ListContext::default();
    }

    /// Number of ordinal items seen so far at `depth` in the current list.
    pub fn counter(&self, depth: u8) -> u32 {
        self.counters.get(&depth).copied().unwrap_or(0)
    }

    pub fn last_kind(&self) -> ListKind {
        self.last_kind
    }

    fn enter(&mut self, depth: u8, kind: ListKind) {
        // Leaving a nested level restarts anything deeper.
        self.counters.retain(|&d, _| d <= depth);
        if kind == ListKind::Numbered {
            *self.counters.entry(depth).or_insert(0) += 1;
        }
        self.last_kind = kind;
    }
}

/// A line recognised as a list item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// Markdown marker, e.g. `*`, `1.`, `- [x]`.
    pub prefix: String,
    /// Clamped nesting depth.
    pub depth: u8,
    /// Byte offset in the raw line where the item's content begins.
    pub content_start: usize,
    pub kind: ListKind,
    pub is_checkbox: bool,
}

impl ListItem {
    /// Leading indentation: four spaces per level below the first.
    pub fn indent(&self) -> String {
        "    ".repeat(usize::from(self.depth.saturating_sub(1)))
    }

    /// Format the item around already-rendered content.
    ///
    /// Returns an empty string for an empty non-checkbox item.
    pub fn render(&self, content: &str) -> String {
        let content = content.trim();
        if content.is_empty() {
            if self.is_checkbox {
                return format!("{}{}", self.indent(), self.prefix);
            }
            return String::new();
        }
        format!("{}{} {}", self.indent(), self.prefix, content)
    }
}

/// Stateful list converter, owned by one conversion.
#[derive(Debug, Default)]
pub struct ListProcessor {
    context: ListContext,
}

impl ListProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.context.reset();
    }

    pub fn context(&self) -> &ListContext {
        &self.context
    }

    /// Convert one plain-text line.
    ///
    /// `marker` is the list attribute of the line's first character (with its
    /// indent depth); `plain_sibling` is the same line from an independent
    /// plain-text capture, used only to resolve checkbox state.
    pub fn process_list_line(
        &mut self,
        text: &str,
        marker: Option<(MarkerKind, u8)>,
        plain_sibling: Option<&str>,
    ) -> String {
        match self.classify(text, marker, plain_sibling) {
            Some(item) => item.render(&text[item.content_start..]),
            None => text.to_string(),
        }
    }

    /// Decide whether `raw` is a list item, updating the list state.
    ///
    /// Non-list lines end the current list and reset every counter.
    pub fn classify(
        &mut self,
        raw: &str,
        marker: Option<(MarkerKind, u8)>,
        plain_sibling: Option<&str>,
    ) -> Option<ListItem> {
        let textual = match_textual_marker(raw);

        let item = if let Some((kind, depth)) = marker {
            let depth = depth.min(MAX_DEPTH);
            let content_start = textual
                .as_ref()
                .map(|t| t.content_start)
                .unwrap_or_else(|| leading_whitespace_len(raw));
            let (prefix, list_kind, is_checkbox) = marker_prefix(kind, plain_sibling);
            ListItem {
                prefix,
                depth,
                content_start,
                kind: list_kind,
                is_checkbox,
            }
        } else {
            let t = textual?;
            let (prefix, is_checkbox) = match t.glyph {
                Glyph::Number => ("1.".to_string(), false),
                Glyph::Symbol(c) => symbol_prefix(c, plain_sibling),
            };
            ListItem {
                prefix,
                depth: 1,
                content_start: t.content_start,
                kind: if t.glyph == Glyph::Number {
                    ListKind::Numbered
                } else {
                    ListKind::Bulleted
                },
                is_checkbox,
            }
        };

        self.context.enter(item.depth, item.kind);
        Some(item)
    }

    /// Record a line that is not a list item.
    pub fn end_list(&mut self) {
        self.context.reset();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Glyph {
    Number,
    Symbol(char),
}

struct TextualMarker {
    glyph: Glyph,
    content_start: usize,
}

fn match_textual_marker(raw: &str) -> Option<TextualMarker> {
    if let Some(caps) = RE_TWO_TAB_UNORDERED.captures(raw) {
        let glyph = caps[2].chars().next().map(Glyph::Symbol)?;
        return Some(TextualMarker {
            glyph,
            content_start: caps.get(3).map_or(raw.len(), |m| m.start()),
        });
    }
    if let Some(caps) = RE_NUMBERED.captures(raw) {
        return Some(TextualMarker {
            glyph: Glyph::Number,
            content_start: caps.get(2).map_or(raw.len(), |m| m.start()),
        });
    }
    if let Some(caps) = RE_BARE_BULLET.captures(raw) {
        let glyph = caps[1].chars().next().map(Glyph::Symbol)?;
        return Some(TextualMarker {
            glyph,
            content_start: caps.get(2).map_or(raw.len(), |m| m.start()),
        });
    }
    None
}

/// True for a tab-flattened list item such as `\t•\tMilk` or `\t1.\tStep`.
pub(crate) fn is_textual_list_line(raw: &str) -> bool {
    match_textual_marker(raw).is_some()
}

fn marker_prefix(kind: MarkerKind, plain_sibling: Option<&str>) -> (String, ListKind, bool) {
    let ordinal = |p: &str| (p.to_string(), ListKind::Numbered, false);
    match kind {
        MarkerKind::Disc => ("*".into(), ListKind::Bulleted, false),
        MarkerKind::Hyphen | MarkerKind::Other => ("-".into(), ListKind::Bulleted, false),
        MarkerKind::Circle | MarkerKind::Check => {
            (checkbox_prefix(plain_sibling).into(), ListKind::Bulleted, true)
        }
        MarkerKind::Decimal => ordinal("1."),
        MarkerKind::LowerAlpha => ordinal("a."),
        MarkerKind::UpperAlpha => ordinal("A."),
        MarkerKind::LowerRoman => ordinal("i."),
        MarkerKind::UpperRoman => ordinal("I."),
    }
}

fn symbol_prefix(symbol: char, plain_sibling: Option<&str>) -> (String, bool) {
    match symbol {
        '◦' | '✓' => (checkbox_prefix(plain_sibling).into(), true),
        '⁃' => ("-".into(), false),
        _ => ("*".into(), false),
    }
}

fn checkbox_prefix(plain_sibling: Option<&str>) -> &'static str {
    if checkbox_checked(plain_sibling) {
        "- [x]"
    } else {
        "- [ ]"
    }
}

/// Infer a checkbox's state from its plain-text sibling line.
///
/// Checked indicators win over unchecked ones; absent any indicator the box
/// is unchecked.
pub fn checkbox_checked(plain_sibling: Option<&str>) -> bool {
    let Some(line) = plain_sibling else {
        return false;
    };
    let trimmed = line.trim();
    let found = |pattern: &str| {
        trimmed.starts_with(pattern)
            || trimmed.contains(&format!(" {pattern} "))
            || trimmed.contains(&format!("\t{pattern}\t"))
    };
    if CHECKED_PATTERNS.iter().any(|p| found(p)) {
        return true;
    }
    if UNCHECKED_PATTERNS.iter().any(|p| found(p)) {
        return false;
    }
    false
}

fn leading_whitespace_len(s: &str) -> usize {
    s.len() - s.trim_start().len()
}
