use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// CellValue – a single cell of a table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value.
///
/// Delimited text is always loaded as [`CellValue::Text`] (or `Empty`);
/// the typed variants only come from containers that carry types
/// (spreadsheets, Parquet). No coercion happens at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Date or date-time kept as its ISO-8601 text.
    Date(String),
    Empty,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            // Shortest round-trip form: 1.0 prints as "1", 2.5 as "2.5".
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Date(d) => write!(f, "{d}"),
            CellValue::Empty => Ok(()),
        }
    }
}

impl CellValue {
    /// Build a cell from raw delimited text: the empty string is `Empty`,
    /// anything else is kept verbatim.
    pub fn from_text(s: &str) -> Self {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::from_text(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Integer(i)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// SourceFormat – where a table came from, so output can match it
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFormat {
    /// Delimited text, with the encoding that decoded it and the detected delimiter.
    Delimited {
        encoding: &'static str,
        delimiter: u8,
    },
    /// One sheet of a spreadsheet container.
    Spreadsheet { sheet: String },
    Parquet,
}

impl Default for SourceFormat {
    fn default() -> Self {
        SourceFormat::Delimited {
            encoding: "UTF-8",
            delimiter: b',',
        }
    }
}

// ---------------------------------------------------------------------------
// Table – ordered named columns, ordered rows
// ---------------------------------------------------------------------------

/// A loaded table. Immutable once built; every row has exactly one cell per
/// column, stored in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<CellValue>>,
    source: SourceFormat,
    skipped_rows: usize,
}

impl Table {
    /// Build a table, enforcing the column invariants.
    ///
    /// * no columns → [`Error::EmptySheet`]
    /// * repeated column name → [`Error::DuplicateColumn`]
    /// * a row wider than the header → [`Error::RaggedRow`]
    ///
    /// Rows shorter than the header are padded with [`CellValue::Empty`].
    pub fn new(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<CellValue>>,
        source: SourceFormat,
    ) -> Result<Self> {
        let name = name.into();
        if columns.is_empty() {
            return Err(Error::EmptySheet { file: name });
        }

        let mut index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            if index.insert(col.clone(), i).is_some() {
                return Err(Error::DuplicateColumn {
                    file: name,
                    column: col.clone(),
                });
            }
        }

        let width = columns.len();
        let mut rows = rows;
        for (row_no, row) in rows.iter_mut().enumerate() {
            if row.len() > width {
                return Err(Error::RaggedRow {
                    file: name,
                    row: row_no,
                    expected: width,
                    found: row.len(),
                });
            }
            row.resize(width, CellValue::Empty);
        }

        Ok(Table {
            name,
            columns,
            index,
            rows,
            source,
            skipped_rows: 0,
        })
    }

    pub(crate) fn with_skipped_rows(mut self, skipped: usize) -> Self {
        self.skipped_rows = skipped;
        self
    }

    /// The file name (or label) the table was loaded from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column names in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn source(&self) -> &SourceFormat {
        &self.source
    }

    /// Malformed input rows dropped while loading.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    /// Like [`Table::column_index`], but a missing column is an error naming
    /// the table and the columns it does have.
    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| Error::ColumnNotFound {
                column: column.to_string(),
                table: self.name.clone(),
                available: self.columns.clone(),
            })
    }

    pub fn row(&self, i: usize) -> Option<Row<'_>> {
        self.rows.get(i).map(|cells| Row { table: self, cells })
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = Row<'_>> + '_ {
        self.rows.iter().map(move |cells| Row { table: self, cells })
    }

    /// All cells of one column, top to bottom.
    pub fn column_values(&self, column: &str) -> Result<impl Iterator<Item = &CellValue> + '_> {
        let idx = self.require_column(column)?;
        Ok(self.rows.iter().map(move |r| &r[idx]))
    }

    /// The first `n` rows (all rows if there are fewer).
    pub fn head(&self, n: usize) -> Table {
        let indices: Vec<usize> = (0..n.min(self.len())).collect();
        self.select_rows(&indices)
    }

    /// A new table with the same columns and provenance holding only the
    /// rows at `indices`, in the order given.
    pub(crate) fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            index: self.index.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            source: self.source.clone(),
            skipped_rows: self.skipped_rows,
        }
    }
}

// ---------------------------------------------------------------------------
// Row – a borrowed view with name-indexed lookup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    cells: &'a [CellValue],
}

impl<'a> Row<'a> {
    /// Cell under the named column, `None` if the table has no such column.
    pub fn get(&self, column: &str) -> Option<&'a CellValue> {
        self.table.column_index(column).map(|i| &self.cells[i])
    }

    /// Cells in column order.
    pub fn cells(&self) -> &'a [CellValue] {
        self.cells
    }
}
