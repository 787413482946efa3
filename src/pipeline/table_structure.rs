//! Table geometry from RTF markup.
//!
//! The styled runs lose table layout; the RTF rendition of the same document
//! keeps it as `\trowd … \row` row blocks. Only the shape is recovered here
//! (rows, columns, row-major cell positions); cell text comes from the runs.
//!
//! Two passes, the second only when the first finds nothing:
//!
//! 1. Complete Apple-style tables: `\itap1\trowd … \lastrow\row`. Columns are
//!    the distinct `\cellxN` boundaries, rows the `\row` terminators.
//! 2. Bare `\trowd … \row` blocks, grouped into one table while consecutive
//!    blocks are less than [`ROW_GROUP_GAP`] bytes apart. Columns are the
//!    largest per-row count of `\cell` terminators.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

/// Maximum byte gap between two row blocks of the same table.
pub const ROW_GROUP_GAP: usize = 100;

static RE_COMPLETE_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\itap1\\trowd.*?\\lastrow\\row\b").unwrap());
static RE_CELLX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\cellx(\d+)").unwrap());
static RE_ROW_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(?:lastrow\\)?row\b").unwrap());
static RE_ROW_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\\trowd.*?\\row\b").unwrap());
static RE_CELL_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\cell\b").unwrap());

/// A cell's coordinates within its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPosition {
    pub row: usize,
    pub column: usize,
}

/// The recovered shape of one table.
///
/// `cell_positions` always holds `rows * columns` entries in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStructure {
    pub rows: usize,
    pub columns: usize,
    pub cell_positions: Vec<CellPosition>,
    /// Byte offset of the table's first row block in the markup.
    pub source_offset: usize,
}

impl TableStructure {
    /// Build a rectangular structure; `None` for a degenerate shape.
    pub fn new(rows: usize, columns: usize, source_offset: usize) -> Option<Self> {
        if rows == 0 || columns == 0 {
            return None;
        }
        let cell_positions = (0..rows)
            .flat_map(|row| (0..columns).map(move |column| CellPosition { row, column }))
            .collect();
        Some(Self {
            rows,
            columns,
            cell_positions,
            source_offset,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.cell_positions.len()
    }
}

/// Extract every table structure from `markup`, in document order.
pub fn extract_structures(markup: &str) -> Vec<TableStructure> {
    let complete: Vec<TableStructure> = RE_COMPLETE_TABLE
        .find_iter(markup)
        .filter_map(|m| parse_complete_table(m.as_str(), m.start()))
        .collect();
    if !complete.is_empty() {
        debug!("Found {} complete table(s) in markup", complete.len());
        return complete;
    }

    let grouped = group_row_blocks(markup);
    if !grouped.is_empty() {
        debug!("Found {} table(s) from bare row blocks", grouped.len());
    }
    grouped
}

fn parse_complete_table(block: &str, offset: usize) -> Option<TableStructure> {
    let boundaries: BTreeSet<u64> = RE_CELLX
        .captures_iter(block)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    let rows = RE_ROW_END.find_iter(block).count();
    let structure = TableStructure::new(rows, boundaries.len(), offset);
    if structure.is_none() {
        debug!(
            offset,
            rows,
            columns = boundaries.len(),
            "Ambiguous table structure, skipping"
        );
    }
    structure
}

fn group_row_blocks(markup: &str) -> Vec<TableStructure> {
    let mut structures = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut group_start = 0;
    let mut last_end = 0;

    for m in RE_ROW_BLOCK.find_iter(markup) {
        let gap = m.start().saturating_sub(last_end);
        if current.is_empty() || gap >= ROW_GROUP_GAP {
            structures.extend(structure_from_rows(&current, group_start));
            current.clear();
            group_start = m.start();
        }
        current.push(m.as_str());
        last_end = m.end();
    }
    structures.extend(structure_from_rows(&current, group_start));
    structures
}

fn structure_from_rows(rows: &[&str], offset: usize) -> Option<TableStructure> {
    if rows.is_empty() {
        return None;
    }
    let counts: Vec<usize> = rows
        .iter()
        .map(|row| RE_CELL_END.find_iter(row).count())
        .collect();
    let columns = counts.iter().copied().max().unwrap_or(0);
    if counts.iter().any(|&c| c != columns) {
        debug!(offset, ?counts, "Ragged table rows, padding to {columns} columns");
    }
    TableStructure::new(rows.len(), columns, offset)
}
