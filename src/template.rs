//! Path and file-name templates.
//!
//! Image folders and output file names may contain `{date}`, `{time}`,
//! `{clipboard_preview}` and `{<field name>}` for any front-matter field.
//! Field values are sanitised before substitution so they cannot introduce
//! separators or characters that are invalid in file names.

use crate::error::Clip2MdError;
use crate::pipeline::front_matter::{self, FieldType, FrontMatterField};
use chrono::NaiveDateTime;

/// Characters of the document preview used in `{clipboard_preview}`.
pub const PREVIEW_CHARS: usize = 20;

const IMAGE_EXTENSIONS: [&str; 11] = [
    ".png", ".jpg", ".jpeg", ".gif", ".tiff", ".tif", ".jp2", ".webp", ".heic", ".heif", ".exr",
];

/// Values available to a template expansion.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub now: NaiveDateTime,
    /// Seed text for `{clipboard_preview}`, usually the first line of the document.
    pub preview_seed: &'a str,
    pub fields: &'a [FrontMatterField],
}

impl<'a> TemplateContext<'a> {
    pub fn new(now: NaiveDateTime, preview_seed: &'a str, fields: &'a [FrontMatterField]) -> Self {
        Self {
            now,
            preview_seed,
            fields,
        }
    }

    /// Substitute every known variable in `template`.
    pub fn expand(&self, template: &str) -> String {
        let mut out = template
            .replace("{date}", &self.now.format("%Y-%m-%d").to_string())
            .replace("{time}", &self.now.format("%Y-%m-%d_%H-%M-%S").to_string())
            .replace("{clipboard_preview}", &clipboard_preview(self.preview_seed));

        for field in self.fields {
            if field.name.is_empty() {
                continue;
            }
            let placeholder = format!("{{{}}}", field.name);
            if out.contains(&placeholder) {
                let value = sanitize_for_path(&field_value(field, self.now));
                out = out.replace(&placeholder, &value);
            }
        }
        out
    }

    /// Relative path of an exported image: `<folder>/image<N>.<ext>`.
    pub fn image_path(&self, folder_template: &str, index: usize, extension: &str) -> String {
        let mut path = self.expand(folder_template.trim());
        if !path.is_empty() && !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(&format!("image{index}.{extension}"));
        path
    }

    /// Markdown file name for the conversion, always ending in `.md`.
    pub fn output_filename(&self, format: &str) -> String {
        let mut name = self.expand(format.trim());
        if !name.ends_with(".md") {
            name.push_str(".md");
        }
        name
    }
}

/// The `{clipboard_preview}` value: first characters of `seed`, lowercased,
/// spaces as dashes, newlines removed; `clipboard` when there is no text.
pub fn clipboard_preview(seed: &str) -> String {
    if seed.is_empty() {
        return "clipboard".to_string();
    }
    seed.chars()
        .take(PREVIEW_CHARS)
        .filter(|&c| c != '\n' && c != '\r')
        .map(|c| if c == ' ' { '-' } else { c })
        .collect::<String>()
        .to_lowercase()
}

/// Replace characters that would break a path component with `-`.
pub fn sanitize_for_path(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            ' ' | '\n' | '\t' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
}

/// Check an image folder template.
///
/// An empty template is valid (images land next to the Markdown file).
pub fn validate_image_folder(template: &str) -> Result<(), Clip2MdError> {
    let path = template.trim();
    if path.is_empty() {
        return Ok(());
    }
    if path.contains('\0') || path.contains("NULL") {
        return Err(Clip2MdError::InvalidConfig(format!(
            "image folder contains a null marker: {path:?}"
        )));
    }
    if let Some(c) = path.chars().find(|c| matches!(c, ':' | '"' | '|' | '?' | '*')) {
        return Err(Clip2MdError::InvalidConfig(format!(
            "image folder contains invalid character {c:?}: {path:?}"
        )));
    }
    let lower = path.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Err(Clip2MdError::InvalidConfig(format!(
            "image folder must be a directory, not a file name: {path:?}"
        )));
    }
    Ok(())
}

/// Check an output file-name template by expanding it with sample values.
pub fn validate_output_filename(
    format: &str,
    fields: &[FrontMatterField],
    now: NaiveDateTime,
) -> Result<(), Clip2MdError> {
    let invalid = |why: &str| Err(Clip2MdError::InvalidConfig(format!("output file name {why}: {format:?}")));

    let trimmed = format.trim();
    if trimmed.is_empty() {
        return invalid("is empty");
    }
    if trimmed == "." || trimmed == ".." {
        return invalid("is a relative directory");
    }
    if trimmed
        .chars()
        .any(|c| matches!(c, '<' | '>' | ':' | '"' | '/' | '|' | '?' | '*' | '\\'))
    {
        return invalid("contains an invalid character");
    }
    if trimmed.chars().any(char::is_control) {
        return invalid("contains a control character");
    }

    let sample = TemplateContext::new(now, "test", fields).expand(format);
    let sample_trimmed = sample.trim();
    if sample_trimmed.is_empty()
        || sample_trimmed == "."
        || sample_trimmed == ".."
        || (sample_trimmed.starts_with('.') && sample_trimmed.chars().count() <= 4)
    {
        return invalid("expands to an empty name");
    }
    if sample != sample_trimmed {
        return invalid("expands with surrounding whitespace");
    }
    Ok(())
}

fn field_value(field: &FrontMatterField, now: NaiveDateTime) -> String {
    match field.field_type {
        FieldType::CurrentDate => now.format("%Y-%m-%d").to_string(),
        FieldType::CurrentDatetime => now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        FieldType::List | FieldType::Tag => front_matter::split_items(&field.value).join(", "),
        _ => front_matter::substitute_variables(&field.value, now),
    }
}
