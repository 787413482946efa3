//! YAML front matter from typed field definitions.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// How a field's value is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
    Datetime,
    /// Comma-separated values as a flow sequence.
    List,
    /// Comma-separated values as a block sequence.
    Tag,
    /// Folded block scalar (`>-`).
    Multiline,
    /// Today's date, generated at render time.
    CurrentDate,
    /// The current date and time, generated at render time.
    CurrentDatetime,
}

/// One front-matter entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontMatterField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub value: String,
    /// Emit the field as a YAML comment.
    pub commented: bool,
    /// Nesting level; every emitted line is indented two spaces per level.
    pub indent_depth: u8,
}

impl FrontMatterField {
    pub fn new(name: impl Into<String>, field_type: FieldType, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type,
            value: value.into(),
            ..Default::default()
        }
    }
}

/// Render `fields` against the local clock.
pub fn render(fields: &[FrontMatterField]) -> String {
    render_at(fields, Local::now().naive_local())
}

/// Render `fields` as a `---` delimited block, without a trailing newline.
///
/// Returns an empty string when there are no fields.
pub fn render_at(fields: &[FrontMatterField], now: NaiveDateTime) -> String {
    if fields.is_empty() {
        return String::new();
    }

    let mut out = String::from("---\n");
    for field in fields {
        let prefix = format!(
            "{}{}",
            "  ".repeat(usize::from(field.indent_depth)),
            if field.commented { "# " } else { "" }
        );
        for line in render_field(field, now) {
            out.push_str(&prefix);
            out.push_str(&line);
            out.push('\n');
        }
    }
    out.push_str("---");
    out
}

/// Replace `{current_date}` and `{current_time}` in a raw value.
pub fn substitute_variables(value: &str, now: NaiveDateTime) -> String {
    value
        .replace("{current_date}", &now.format("%Y-%m-%d").to_string())
        .replace("{current_time}", &now.format("%H:%M:%S").to_string())
}

fn render_field(field: &FrontMatterField, now: NaiveDateTime) -> Vec<String> {
    let name = &field.name;
    let value = substitute_variables(&field.value, now);

    match field.field_type {
        FieldType::String | FieldType::Date | FieldType::Datetime => {
            vec![format!("{name}: {}", quote(&value))]
        }
        FieldType::Number => vec![format!("{name}: {}", value.trim())],
        FieldType::Boolean => {
            let b = value.trim().eq_ignore_ascii_case("true");
            vec![format!("{name}: {b}")]
        }
        FieldType::List => {
            let items: Vec<String> = sequence_items(&value).iter().map(|s| quote(s)).collect();
            vec![format!("{name}: [{}]", items.join(", "))]
        }
        FieldType::Tag => {
            let mut lines = vec![format!("{name}:")];
            lines.extend(sequence_items(&value).iter().map(|item| format!("  - {}", quote(item))));
            lines
        }
        FieldType::Multiline => {
            let mut lines = vec![format!("{name}: >-")];
            lines.extend(
                value
                    .split('\n')
                    .map(|l| format!("  {}", l.strip_suffix('\r').unwrap_or(l))),
            );
            lines
        }
        FieldType::CurrentDate => {
            vec![format!("{name}: {}", quote(&now.format("%Y-%m-%d").to_string()))]
        }
        FieldType::CurrentDatetime => {
            vec![format!(
                "{name}: {}",
                quote(&now.format("%Y-%m-%d %H:%M:%S").to_string())
            )]
        }
    }
}

/// Comma-separated tokens, or the elements of a JSON string array.
pub(crate) fn split_items(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
    trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Sequence items; an empty value is a single empty item.
fn sequence_items(value: &str) -> Vec<String> {
    let items = split_items(value);
    if items.is_empty() {
        vec![String::new()]
    } else {
        items
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
