use std::collections::HashSet;

use log::info;
use serde::Serialize;

use super::model::{CellValue, Table};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Normalisation: the comparison form of a cell
// ---------------------------------------------------------------------------

/// How cell text is compared against the key set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Exact match after trimming. Identifiers are often case-significant.
    #[default]
    CaseSensitive,
    CaseInsensitive,
}

/// A cell reduced to the form used for membership tests.
///
/// Missing cells and whitespace-only text both become `Empty`, which only
/// matches when the key set itself contains `Empty`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NormalizedValue {
    Empty,
    Text(String),
}

impl NormalizedValue {
    pub fn from_cell(cell: &CellValue, mode: MatchMode) -> Self {
        if cell.is_empty() {
            return NormalizedValue::Empty;
        }
        let text = cell.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return NormalizedValue::Empty;
        }
        match mode {
            MatchMode::CaseSensitive => NormalizedValue::Text(trimmed.to_string()),
            MatchMode::CaseInsensitive => NormalizedValue::Text(trimmed.to_lowercase()),
        }
    }
}

// ---------------------------------------------------------------------------
// KeySet: the keep-set built from one template column
// ---------------------------------------------------------------------------

/// Normalised values of a template column. Read-only once built, so it can
/// be shared across threads filtering different targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    values: HashSet<NormalizedValue>,
    mode: MatchMode,
}

impl KeySet {
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Number of distinct keep-values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the template column had an empty keep-value.
    pub fn contains_empty(&self) -> bool {
        self.values.contains(&NormalizedValue::Empty)
    }

    /// Membership test for a raw cell, normalised with this set's mode.
    pub fn matches(&self, cell: &CellValue) -> bool {
        self.values.contains(&NormalizedValue::from_cell(cell, self.mode))
    }
}

/// Collect the normalised values of `column` into a keep-set.
pub fn build_key_set(table: &Table, column: &str, mode: MatchMode) -> Result<KeySet> {
    let values: HashSet<NormalizedValue> = table
        .column_values(column)?
        .map(|cell| NormalizedValue::from_cell(cell, mode))
        .collect();
    info!(
        "Key set from '{}'.'{}': {} unique values",
        table.name(),
        column,
        values.len()
    );
    Ok(KeySet { values, mode })
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Row counts before and after filtering one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub original_count: usize,
    pub kept_count: usize,
    pub removed_count: usize,
}

/// The filtered table plus its statistics. Columns are exactly those of the
/// source table; only rows are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    pub table: Table,
    pub stats: FilterStats,
}

impl FilterResult {
    pub fn original_count(&self) -> usize {
        self.stats.original_count
    }

    pub fn kept_count(&self) -> usize {
        self.stats.kept_count
    }

    pub fn removed_count(&self) -> usize {
        self.stats.removed_count
    }
}

/// Return indices of rows whose `column` value is in `keys`, ascending.
pub fn kept_indices(table: &Table, column: &str, keys: &KeySet) -> Result<Vec<usize>> {
    let idx = table.require_column(column)?;
    Ok(table
        .rows()
        .enumerate()
        .filter(|(_, row)| keys.matches(&row.cells()[idx]))
        .map(|(i, _)| i)
        .collect())
}

/// Keep the rows of `table` whose `column` value is a member of `keys`,
/// preserving their order. No sorting, no deduplication.
pub fn filter(table: &Table, column: &str, keys: &KeySet) -> Result<FilterResult> {
    let indices = kept_indices(table, column, keys)?;
    let original_count = table.len();
    let kept_count = indices.len();
    let stats = FilterStats {
        original_count,
        kept_count,
        removed_count: original_count - kept_count,
    };
    info!(
        "Filtered '{}' on '{}': {} of {} rows kept",
        table.name(),
        column,
        kept_count,
        original_count
    );
    Ok(FilterResult {
        table: table.select_rows(&indices),
        stats,
    })
}
