//! Inline formatting: run attributes → Markdown / inline HTML.
//!
//! Precedence is fixed:
//!
//! 1. A link short-circuits everything: `[text](target)`.
//! 2. A heading-sized font short-circuits emphasis: `# text` / `## text`.
//! 3. Otherwise emphasis nests as `**~~<u>*text*</u>~~**` (bold outermost,
//!    italic innermost), using only the markers whose attribute is set.
//!
//! Leading and trailing whitespace is kept outside the markers: `** bold**`
//! is not emphasis in CommonMark, `**bold** ` is.

use crate::model::{RunAttributes, StyledRun};

/// Font size (points) from which a run renders as a level-1 heading.
pub const H1_MIN_POINTS: f32 = 25.0;
/// Font size (points) from which a run renders as a level-2 heading.
pub const H2_MIN_POINTS: f32 = 20.0;

/// Heading level inferred from a font size, if any.
pub fn heading_level(attributes: &RunAttributes) -> Option<u8> {
    let size = attributes.font_size?;
    if size >= H1_MIN_POINTS {
        Some(1)
    } else if size >= H2_MIN_POINTS {
        Some(2)
    } else {
        None
    }
}

/// Markdown prefix for a heading level.
pub fn heading_prefix(level: u8) -> &'static str {
    match level {
        1 => "# ",
        _ => "## ",
    }
}

/// Render a single run, applying link, heading and emphasis rules.
pub fn render(run: &StyledRun) -> String {
    let attrs = &run.attributes;
    if let Some(target) = &attrs.link {
        return render_link(&run.text, target);
    }
    if let Some(level) = heading_level(attrs) {
        return format!("{}{}", heading_prefix(level), run.text);
    }
    render_emphasis(&run.text, attrs)
}

/// Render a run that sits inside a larger line.
///
/// Heading detection is left to the caller, which decides per line. When
/// `in_heading` is set, emphasis is suppressed the same way [`render`]
/// suppresses it for a heading run; links are still honoured.
pub fn render_span(text: &str, attrs: &RunAttributes, in_heading: bool) -> String {
    if let Some(target) = &attrs.link {
        return render_link(text, target);
    }
    if in_heading {
        return text.to_string();
    }
    render_emphasis(text, attrs)
}

fn render_link(text: &str, target: &str) -> String {
    let (lead, core, trail) = split_whitespace(text);
    if core.is_empty() {
        return text.to_string();
    }
    format!("{lead}[{core}]({target}){trail}")
}

fn render_emphasis(text: &str, attrs: &RunAttributes) -> String {
    let (lead, core, trail) = split_whitespace(text);
    if core.is_empty() {
        return text.to_string();
    }

    let mut out = core.to_string();
    if attrs.italic {
        out = format!("*{out}*");
    }
    if attrs.underline {
        out = format!("<u>{out}</u>");
    }
    if attrs.strikethrough {
        out = format!("~~{out}~~");
    }
    if attrs.bold {
        out = format!("**{out}**");
    }
    format!("{lead}{out}{trail}")
}

/// Split `text` into (leading whitespace, core, trailing whitespace).
fn split_whitespace(text: &str) -> (&str, &str, &str) {
    let start = text.len() - text.trim_start().len();
    let end = text.trim_end().len().max(start);
    (&text[..start], &text[start..end], &text[end..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run(text: &str, f: impl FnOnce(&mut RunAttributes)) -> StyledRun {
        let mut attrs = RunAttributes::default();
        f(&mut attrs);
        StyledRun::styled(text, attrs)
    }

    #[test]
    fn all_emphasis_nests_in_fixed_order() {
        let r = run("text", |a| {
            a.bold = true;
            a.italic = true;
            a.underline = true;
            a.strikethrough = true;
        });
        assert_eq!(render(&r), "**~~<u>*text*</u>~~**");
    }

    #[test]
    fn bold_italic() {
        let r = run("both", |a| {
            a.bold = true;
            a.italic = true;
        });
        assert_eq!(render(&r), "***both***");
    }

    #[test]
    fn link_short_circuits_emphasis() {
        let r = run("site", |a| {
            a.bold = true;
            a.link = Some("https://example.com".into());
        });
        assert_eq!(render(&r), "[site](https://example.com)");
    }

    #[test]
    fn link_beats_heading() {
        let r = run("Big link", |a| {
            a.font_size = Some(30.0);
            a.link = Some("https://example.com".into());
        });
        assert_eq!(render(&r), "[Big link](https://example.com)");
    }

    #[test]
    fn heading_thresholds() {
        let h1 = run("Title", |a| {
            a.font_size = Some(25.0);
            a.bold = true;
        });
        assert_eq!(render(&h1), "# Title");

        let h2 = run("Section", |a| a.font_size = Some(20.0));
        assert_eq!(render(&h2), "## Section");

        let body = run("Body", |a| a.font_size = Some(19.9));
        assert_eq!(render(&body), "Body");
    }

    #[test]
    fn whitespace_stays_outside_markers() {
        let r = run("  bold ", |a| a.bold = true);
        assert_eq!(render(&r), "  **bold** ");
    }

    #[test]
    fn whitespace_only_is_not_wrapped() {
        let r = run("   ", |a| a.strikethrough = true);
        assert_eq!(render(&r), "   ");
    }

    #[test]
    fn span_in_heading_drops_emphasis_keeps_links() {
        let mut a = RunAttributes::default();
        a.bold = true;
        assert_eq!(render_span("x", &a, true), "x");
        a.link = Some("u".into());
        assert_eq!(render_span("x", &a, true), "[x](u)");
    }

    proptest! {
        #[test]
        fn plain_runs_are_unchanged(text in "\\PC*") {
            let r = StyledRun::plain(text.clone());
            prop_assert_eq!(render(&r), text);
        }
    }
}
