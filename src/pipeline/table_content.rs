//! Table content: cell text from the styled runs, matched to RTF geometry.
//!
//! [`extract_content`] runs an ordered list of splitting strategies over the
//! pieces of one content group and keeps the first result that fills the
//! table (or the richest one when none does):
//!
//! 0. cell blocks: consecutive runs sharing a `table_cell` id form one cell,
//!    with inline formatting kept and inner newlines as `<br>`;
//! 1. the whole text split on tabs, else newlines, else double spaces;
//! 2. tab split line by line, keeping empty cells inside a row;
//! 3. text between attachments;
//! 4. per line, split on a tab or a run of two or more spaces.
//!
//! [`reconcile`] pairs every [`TableStructure`] with a content group and
//! decides where its Markdown goes in the output.

use crate::error::ConversionWarning;
use crate::model::{Line, Piece, RichDocument};
use crate::pipeline::{inline, list};
use crate::pipeline::table_structure::TableStructure;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::{debug, warn};

static RE_CELL_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t| {2,}").unwrap());

/// Where a table's Markdown is placed in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableAnchor {
    /// Before the given line; the table's cell runs are skipped where they occur.
    Region { line: usize },
    /// Replaces the given lines, which held the table as plain text.
    Block { lines: Range<usize> },
    /// Appended at the end of the document.
    End,
}

/// A table ready for rendering.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub structure: TableStructure,
    /// Exactly `structure.cell_count()` entries, row-major.
    pub content: Vec<String>,
    /// Token standing in for the table until the final substitution.
    pub placeholder: String,
    pub anchor: TableAnchor,
}

impl TableInfo {
    pub fn to_markdown(&self) -> String {
        render_markdown_table(&self.structure, &self.content)
    }
}

/// Tables plus the degradations found while filling them.
#[derive(Debug, Default)]
pub struct Reconciled {
    pub tables: Vec<TableInfo>,
    pub warnings: Vec<ConversionWarning>,
}

struct ContentGroup<'a> {
    pieces: Vec<LinePiece<'a>>,
    anchor: TableAnchor,
}

#[derive(Clone, Copy)]
struct LinePiece<'a> {
    line: usize,
    piece: Piece<'a>,
}

/// Cell text for a single table, at least `expected` entries long.
///
/// Shorter results are padded with empty strings; longer ones are kept whole.
pub fn extract_content(lines: &[Line<'_>], expected: usize) -> Vec<String> {
    let pieces = flatten(lines, 0);
    let mut cells = best_split(&pieces, expected);
    pad(&mut cells, expected);
    cells
}

/// Cell text for every structure, each exactly `cell_count()` entries long.
pub fn extract_all_content(document: &RichDocument, structures: &[TableStructure]) -> Vec<Vec<String>> {
    reconcile(document, structures)
        .tables
        .into_iter()
        .map(|t| t.content)
        .collect()
}

/// Fill every structure with content and choose its anchor.
pub fn reconcile(document: &RichDocument, structures: &[TableStructure]) -> Reconciled {
    let mut out = Reconciled::default();
    if structures.is_empty() {
        return out;
    }

    let lines = document.lines();
    let plain = document.plain_text();
    let all = flatten(&lines, 0);
    let tagged = all.iter().any(|p| p.piece.table_cell().is_some());

    let groups = if tagged {
        cell_groups(&all, structures)
    } else {
        text_groups(&lines)
    };
    debug!(
        "Reconciling {} table(s) against {} content group(s) ({})",
        structures.len(),
        groups.len(),
        if tagged { "cell blocks" } else { "plain text" }
    );

    let mut groups = groups.into_iter();
    for (index, structure) in structures.iter().enumerate() {
        let expected = structure.cell_count();
        let (mut content, anchor) = match groups.next() {
            Some(group) => (best_split(&group.pieces, expected), group.anchor),
            None => (Vec::new(), TableAnchor::End),
        };

        if content.len() < expected {
            warn!(
                "Table {}: found {} of {} cells",
                index + 1,
                content.len(),
                expected
            );
            out.warnings.push(ConversionWarning::TableContentShortfall {
                table: index + 1,
                expected,
                found: content.len(),
            });
        }
        pad(&mut content, expected);
        content.truncate(expected);

        let anchor = match anchor {
            TableAnchor::End if !tagged => locate_cells(&lines, &content)
                .map_or(TableAnchor::End, |range| TableAnchor::Block { lines: range }),
            other => other,
        };
        if anchor == TableAnchor::End {
            warn!("Table {}: position not found, appending at the end", index + 1);
            out.warnings
                .push(ConversionWarning::TablePositionUnknown { table: index + 1 });
        }

        out.tables.push(TableInfo {
            structure: structure.clone(),
            content,
            placeholder: placeholder_for(index, &plain),
            anchor,
        });
    }
    out
}

/// Render a table as GitHub-flavoured Markdown.
///
/// The first row is the header. Missing cells and empty cells render as a
/// single space; `|` inside a cell is escaped.
pub fn render_markdown_table(structure: &TableStructure, content: &[String]) -> String {
    if structure.rows == 0 || structure.columns == 0 {
        return String::new();
    }

    let mut grid = vec![vec![" ".to_string(); structure.columns]; structure.rows];
    for (position, cell) in structure.cell_positions.iter().zip(content) {
        if position.row < structure.rows && position.column < structure.columns && !cell.is_empty() {
            grid[position.row][position.column] = cell.replace('|', "\\|");
        }
    }

    let mut md = String::new();
    for (i, row) in grid.iter().enumerate() {
        md.push_str("| ");
        md.push_str(&row.join(" | "));
        md.push_str(" |\n");
        if i == 0 {
            md.push('|');
            md.push_str(&"---|".repeat(structure.columns));
            md.push('\n');
        }
    }
    md
}

/// Pick the first candidate with at least `expected` entries, else the
/// longest (earliest wins a tie).
pub fn select_strategy(candidates: Vec<Vec<String>>, expected: usize) -> Vec<String> {
    let mut best: Option<Vec<String>> = None;
    for candidate in candidates {
        if candidate.len() >= expected {
            return candidate;
        }
        if best.as_ref().is_none_or(|b| candidate.len() > b.len()) {
            best = Some(candidate);
        }
    }
    best.unwrap_or_default()
}

fn best_split(pieces: &[LinePiece<'_>], expected: usize) -> Vec<String> {
    let cells = split_cell_blocks(pieces);
    if !cells.is_empty() {
        return cells;
    }
    let candidates = vec![
        split_whole_text(pieces, expected),
        split_lines_by_tab(pieces),
        split_at_attachments(pieces),
        split_lines_by_gaps(pieces),
    ];
    select_strategy(candidates, expected)
}

fn split_cell_blocks(pieces: &[LinePiece<'_>]) -> Vec<String> {
    let mut cells: Vec<String> = Vec::new();
    let mut current: Option<(&str, usize, String)> = None;

    for lp in pieces {
        match (lp.piece, lp.piece.table_cell()) {
            (Piece::Text(text, attrs), Some(id)) => {
                let rendered = inline::render_span(text, attrs, false);
                let continues = matches!(&current, Some((cur_id, _, _)) if *cur_id == id);
                if continues {
                    if let Some((_, line, buf)) = current.as_mut() {
                        if *line != lp.line {
                            buf.push('\n');
                            *line = lp.line;
                        }
                        buf.push_str(&rendered);
                    }
                } else {
                    if let Some((_, _, buf)) = current.take() {
                        cells.push(finish_cell(&buf));
                    }
                    current = Some((id, lp.line, rendered));
                }
            }
            _ if lp.piece.is_blank() => {}
            _ => {
                if let Some((_, _, buf)) = current.take() {
                    cells.push(finish_cell(&buf));
                }
            }
        }
    }
    if let Some((_, _, buf)) = current {
        cells.push(finish_cell(&buf));
    }
    cells
}

fn finish_cell(raw: &str) -> String {
    raw.trim().replace('\n', "<br>")
}

fn group_text(pieces: &[LinePiece<'_>]) -> String {
    let mut text = String::new();
    let mut line = pieces.first().map_or(0, |p| p.line);
    for lp in pieces {
        if lp.line != line {
            text.push('\n');
            line = lp.line;
        }
        if let Piece::Text(t, _) = lp.piece {
            text.push_str(t);
        }
    }
    text
}

fn tokens<'s>(parts: impl Iterator<Item = &'s str>) -> Vec<String> {
    parts
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn split_whole_text(pieces: &[LinePiece<'_>], expected: usize) -> Vec<String> {
    let text = group_text(pieces);
    let by_tab = tokens(text.split('\t'));
    let by_newline = tokens(text.split('\n'));
    let by_double_space = tokens(text.split("  "));
    select_strategy(vec![by_tab, by_newline, by_double_space], expected)
}

fn split_lines_by_tab(pieces: &[LinePiece<'_>]) -> Vec<String> {
    let text = group_text(pieces);
    text.lines().flat_map(row_cells).collect()
}

/// Cells of one tab-separated row. Empty cells count, except trailing ones.
fn row_cells(line: &str) -> Vec<String> {
    let mut cells: Vec<String> = line.split('\t').map(|c| c.trim().to_string()).collect();
    while cells.last().is_some_and(String::is_empty) {
        cells.pop();
    }
    cells
}

fn split_at_attachments(pieces: &[LinePiece<'_>]) -> Vec<String> {
    let mut chunks = vec![String::new()];
    let mut line = pieces.first().map_or(0, |p| p.line);
    for lp in pieces {
        if lp.line != line {
            line = lp.line;
            if let Some(c) = chunks.last_mut() {
                c.push('\n');
            }
        }
        match lp.piece {
            Piece::Text(t, _) => {
                if let Some(c) = chunks.last_mut() {
                    c.push_str(t);
                }
            }
            Piece::Attachment(_) => chunks.push(String::new()),
        }
    }
    tokens(chunks.iter().map(String::as_str))
}

fn split_lines_by_gaps(pieces: &[LinePiece<'_>]) -> Vec<String> {
    let text = group_text(pieces);
    text.lines()
        .flat_map(|l| tokens(RE_CELL_GAP.split(l)))
        .collect()
}

fn pad(cells: &mut Vec<String>, expected: usize) {
    if cells.len() < expected {
        cells.resize(expected, String::new());
    }
}

fn flatten<'a>(lines: &[Line<'a>], first_line: usize) -> Vec<LinePiece<'a>> {
    lines
        .iter()
        .enumerate()
        .flat_map(|(i, line)| {
            line.pieces.iter().map(move |&piece| LinePiece {
                line: first_line + i,
                piece,
            })
        })
        .collect()
}

/// Content groups from `table_cell` runs.
///
/// A region is a maximal stretch of cell runs not interrupted by visible
/// non-cell content. When the regions line up with the structures one to
/// one, each region feeds its table; otherwise cells are dealt out to the
/// tables in document order.
fn cell_groups<'a>(all: &[LinePiece<'a>], structures: &[TableStructure]) -> Vec<ContentGroup<'a>> {
    let mut regions: Vec<Vec<LinePiece<'a>>> = Vec::new();
    let mut open = false;
    for lp in all {
        if lp.piece.table_cell().is_some() {
            if !open {
                regions.push(Vec::new());
                open = true;
            }
            if let Some(r) = regions.last_mut() {
                r.push(*lp);
            }
        } else if !lp.piece.is_blank() {
            open = false;
        }
    }

    if regions.len() == structures.len() {
        return regions
            .into_iter()
            .map(|pieces| ContentGroup {
                anchor: TableAnchor::Region {
                    line: pieces.first().map_or(0, |p| p.line),
                },
                pieces,
            })
            .collect();
    }

    debug!(
        "{} cell region(s) for {} table(s), dealing cells in order",
        regions.len(),
        structures.len()
    );
    let flat: Vec<LinePiece<'a>> = regions.into_iter().flatten().collect();
    let mut cell_spans: Vec<Range<usize>> = Vec::new();
    let mut start = 0;
    for i in 1..=flat.len() {
        if i == flat.len() || flat[i].piece.table_cell() != flat[i - 1].piece.table_cell() {
            cell_spans.push(start..i);
            start = i;
        }
    }
    let mut spans = cell_spans.into_iter();
    structures
        .iter()
        .map(|s| {
            let taken: Vec<Range<usize>> = spans.by_ref().take(s.cell_count()).collect();
            let pieces: Vec<LinePiece<'a>> = taken
                .iter()
                .flat_map(|r| flat[r.clone()].iter().copied())
                .collect();
            let anchor = match pieces.first() {
                Some(p) => TableAnchor::Region { line: p.line },
                None => TableAnchor::End,
            };
            ContentGroup { pieces, anchor }
        })
        .collect()
}

/// Content groups from untagged text.
///
/// Each maximal run of consecutive tabular lines is one table candidate and
/// is replaced by its table. With no run at all the whole document is the
/// only group and its anchor is decided once the cells are known.
fn text_groups<'a>(lines: &[Line<'a>]) -> Vec<ContentGroup<'a>> {
    let mut groups = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if !is_tabular(&lines[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < lines.len() && is_tabular(&lines[i]) {
            i += 1;
        }
        groups.push(ContentGroup {
            pieces: flatten(&lines[start..i], start),
            anchor: TableAnchor::Block { lines: start..i },
        });
    }

    if groups.is_empty() {
        groups.push(ContentGroup {
            pieces: flatten(lines, 0),
            anchor: TableAnchor::End,
        });
    }
    groups
}

/// A line holding tab-separated cells. The first cell may be empty; a
/// tab-flattened list item is not a row.
fn is_tabular(line: &Line<'_>) -> bool {
    let raw = line.raw_text();
    raw.contains('\t')
        && line
            .leading_attributes()
            .is_none_or(|a| a.list_marker.is_none())
        && !list::is_textual_list_line(&raw)
}

/// Lines holding exactly the non-empty `cells`, in order, one or more per line.
fn locate_cells(lines: &[Line<'_>], cells: &[String]) -> Option<Range<usize>> {
    let target: Vec<&str> = cells
        .iter()
        .map(String::as_str)
        .filter(|c| !c.is_empty())
        .collect();
    if target.is_empty() {
        return None;
    }

    for start in 0..lines.len() {
        let mut matched = 0;
        let mut end = start;
        while end < lines.len() && matched < target.len() && !lines[end].is_blank() {
            let row = tokens(RE_CELL_GAP.split(&lines[end].raw_text()));
            let fits = row.len() <= target.len() - matched
                && row.iter().zip(&target[matched..]).all(|(a, b)| a.as_str() == *b);
            if row.is_empty() || !fits {
                break;
            }
            matched += row.len();
            end += 1;
        }
        if matched == target.len() {
            return Some(start..end);
        }
    }
    None
}

/// A token that cannot collide with the document text.
fn placeholder_for(index: usize, text: &str) -> String {
    let mut salt = 0u32;
    loop {
        let token = if salt == 0 {
            format!("\u{F8FF}CLIP2MD_TABLE_{index}\u{F8FF}")
        } else {
            format!("\u{F8FF}CLIP2MD_TABLE_{index}_{salt}\u{F8FF}")
        };
        if !text.contains(&token) {
            return token;
        }
        salt += 1;
    }
}
