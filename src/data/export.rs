use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::debug;
use parquet::arrow::ArrowWriter;
use rust_xlsxwriter::{Format, Workbook, Worksheet};

use super::model::{CellValue, SourceFormat, Table};
use crate::error::{Error, Result};

/// Excel's sheet-name length limit.
const MAX_SHEET_NAME: usize = 31;

/// Integers beyond this magnitude lose precision as spreadsheet numbers.
const MAX_EXACT_F64_INT: u64 = 1 << 53;

// ---------------------------------------------------------------------------
// Output naming
// ---------------------------------------------------------------------------

/// `filtered_<basename>`. Workbooks are always written as xlsx, so other
/// spreadsheet extensions are swapped for `.xlsx`.
pub fn output_name(original: &str, source: &SourceFormat) -> String {
    let path = Path::new(original);
    let base = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(original);

    let is_xlsx = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));

    match source {
        SourceFormat::Spreadsheet { .. } if !is_xlsx => {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(base);
            format!("filtered_{stem}.xlsx")
        }
        _ => format!("filtered_{base}"),
    }
}

// ---------------------------------------------------------------------------
// Single-table encoding in the source's format family
// ---------------------------------------------------------------------------

/// Encode `table` the way it came in: delimited text stays delimited
/// (UTF-8, same delimiter), a sheet becomes a one-sheet xlsx workbook,
/// Parquet stays Parquet.
pub fn encode_table(table: &Table) -> Result<Vec<u8>> {
    match table.source() {
        SourceFormat::Delimited { delimiter, .. } => write_delimited(table, *delimiter),
        SourceFormat::Spreadsheet { sheet } => write_workbook(table.name(), &[(sheet.as_str(), table)]),
        SourceFormat::Parquet => write_parquet(table),
    }
}

/// One workbook holding every table on its own sheet, named after the
/// table's file stem.
pub fn combined_workbook(file: &str, tables: &[&Table]) -> Result<Vec<u8>> {
    let stems: Vec<&str> = tables
        .iter()
        .map(|t| {
            Path::new(t.name())
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(t.name())
        })
        .collect();
    let sheets: Vec<(&str, &Table)> = stems.into_iter().zip(tables.iter().copied()).collect();
    write_workbook(file, &sheets)
}

fn write_delimited(table: &Table, delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer
        .write_record(table.columns())
        .map_err(|e| Error::export(table.name(), e))?;
    for row in table.rows() {
        writer
            .write_record(row.cells().iter().map(|c| c.to_string()))
            .map_err(|e| Error::export(table.name(), e))?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::export(table.name(), e.error()))
}

// ---------------------------------------------------------------------------
// Workbooks
// ---------------------------------------------------------------------------

fn write_workbook(file: &str, sheets: &[(&str, &Table)]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let mut taken = HashSet::new();

    for (name, table) in sheets {
        let sheet_name = sheet_name(name, &mut taken);
        debug!("Writing sheet '{}' ({} rows)", sheet_name, table.len());
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(sheet_name.as_str())
            .map_err(|e| Error::export(file, e))?;
        write_sheet(worksheet, table, &header_format).map_err(|e| Error::export(file, e))?;
    }

    workbook.save_to_buffer().map_err(|e| Error::export(file, e))
}

fn write_sheet(
    worksheet: &mut Worksheet,
    table: &Table,
    header_format: &Format,
) -> std::result::Result<(), String> {
    for (c, name) in table.columns().iter().enumerate() {
        worksheet
            .write_string_with_format(0, col_num(c)?, name.as_str(), header_format)
            .map_err(|e| e.to_string())?;
    }

    for (r, row) in table.rows().enumerate() {
        let row_num = u32::try_from(r + 1).map_err(|_| format!("row {r} out of range"))?;
        for (c, cell) in row.cells().iter().enumerate() {
            let col = col_num(c)?;
            let written = match cell {
                CellValue::Empty => continue,
                CellValue::Integer(i) if i.unsigned_abs() <= MAX_EXACT_F64_INT => {
                    worksheet.write_number(row_num, col, *i as f64)
                }
                CellValue::Float(v) => worksheet.write_number(row_num, col, *v),
                CellValue::Bool(b) => worksheet.write_boolean(row_num, col, *b),
                other => worksheet.write_string(row_num, col, other.to_string()),
            };
            written.map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

fn col_num(c: usize) -> std::result::Result<u16, String> {
    u16::try_from(c).map_err(|_| format!("column {c} out of range"))
}

/// An Excel-safe, workbook-unique sheet name.
fn sheet_name(raw: &str, taken: &mut HashSet<String>) -> String {
    let cleaned: String = raw
        .chars()
        .map(|ch| match ch {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim_matches('\'');
    let base: String = if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned.chars().take(MAX_SHEET_NAME).collect()
    };

    // Excel compares sheet names case-insensitively.
    let mut candidate = base.clone();
    let mut n = 2;
    while !taken.insert(candidate.to_lowercase()) {
        let suffix = format!(" ({n})");
        let keep = MAX_SHEET_NAME - suffix.chars().count();
        candidate = base.chars().take(keep).collect::<String>() + &suffix;
        n += 1;
    }
    candidate
}

// ---------------------------------------------------------------------------
// Arrow / Parquet
// ---------------------------------------------------------------------------

/// Column type chosen for Arrow output from the cells present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrowKind {
    Int,
    Float,
    Bool,
    Text,
}

fn infer_kind<'a>(cells: impl Iterator<Item = &'a CellValue>) -> ArrowKind {
    let mut kind: Option<ArrowKind> = None;
    for cell in cells {
        let this = match cell {
            CellValue::Empty => continue,
            CellValue::Integer(_) => ArrowKind::Int,
            CellValue::Float(_) => ArrowKind::Float,
            CellValue::Bool(_) => ArrowKind::Bool,
            CellValue::Text(_) | CellValue::Date(_) => ArrowKind::Text,
        };
        kind = Some(match (kind, this) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ArrowKind::Int), ArrowKind::Float) | (Some(ArrowKind::Float), ArrowKind::Int) => {
                ArrowKind::Float
            }
            _ => return ArrowKind::Text,
        });
    }
    // All-empty columns are written as nullable text.
    kind.unwrap_or(ArrowKind::Text)
}

/// Convert a table to a single Arrow record batch with inferred column types.
pub fn to_record_batch(table: &Table) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.columns().len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns().len());

    for name in table.columns() {
        let cells: Vec<&CellValue> = table.column_values(name)?.collect();
        let (data_type, array): (DataType, ArrayRef) = match infer_kind(cells.iter().copied()) {
            ArrowKind::Int => {
                let values: Vec<Option<i64>> = cells
                    .iter()
                    .map(|c| match c {
                        CellValue::Integer(i) => Some(*i),
                        _ => None,
                    })
                    .collect();
                (DataType::Int64, Arc::new(Int64Array::from(values)))
            }
            ArrowKind::Float => {
                let values: Vec<Option<f64>> = cells
                    .iter()
                    .map(|c| match c {
                        CellValue::Integer(i) => Some(*i as f64),
                        CellValue::Float(v) => Some(*v),
                        _ => None,
                    })
                    .collect();
                (DataType::Float64, Arc::new(Float64Array::from(values)))
            }
            ArrowKind::Bool => {
                let values: Vec<Option<bool>> = cells
                    .iter()
                    .map(|c| match c {
                        CellValue::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect();
                (DataType::Boolean, Arc::new(BooleanArray::from(values)))
            }
            ArrowKind::Text => {
                let values: Vec<Option<String>> = cells
                    .iter()
                    .map(|c| (!c.is_empty()).then(|| c.to_string()))
                    .collect();
                (DataType::Utf8, Arc::new(StringArray::from(values)))
            }
        };
        fields.push(Field::new(name.as_str(), data_type, true));
        arrays.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| Error::export(table.name(), e))
}

fn write_parquet(table: &Table) -> Result<Vec<u8>> {
    let batch = to_record_batch(table)?;
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None)
        .map_err(|e| Error::export(table.name(), e))?;
    writer
        .write(&batch)
        .map_err(|e| Error::export(table.name(), e))?;
    writer.close().map_err(|e| Error::export(table.name(), e))?;
    Ok(buf)
}
