//! Prompts for VLM-based alt-text generation.
//!
//! Kept in one place so prompt changes never touch retry or rendering logic,
//! and so tests can inspect them without a live provider. Callers can override
//! the system prompt via [`crate::config::AnalyzerConfig::system_prompt`].

/// Default system prompt for describing an image.
///
/// The answer is substituted for `{objects}` in the alt-text template, so the
/// model is asked for a noun phrase rather than a sentence.
pub const DEFAULT_ALT_TEXT_PROMPT: &str = r#"You write alt text for images embedded in Markdown notes.

Describe the main content, objects, and context of the image in a short noun phrase
that would be useful for someone who cannot see it.

Rules:
- Keep it under 100 characters
- No leading "Image of", "Picture of" or "This shows"
- If the image is mostly text, summarise what the text is about
- Output ONLY the description: no quotes, no Markdown, no trailing period"#;

/// User-turn text sent alongside the image.
pub const ALT_TEXT_REQUEST: &str = "Describe this image.";

/// Normalise a model answer into a bare description.
///
/// Strips wrapping quotes and backticks, a trailing period, and any prefix
/// the template would duplicate.
pub fn clean_description(raw: &str) -> String {
    let mut s = raw.trim();
    for quote in ['"', '\'', '`'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            s = s[1..s.len() - 1].trim();
        }
    }
    for prefix in ["image of ", "picture of ", "a picture of ", "an image of ", "this shows "] {
        if s.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            s = s[prefix.len()..].trim_start();
            break;
        }
    }
    s.trim_end_matches('.').trim().to_string()
}
