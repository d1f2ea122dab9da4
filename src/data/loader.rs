use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, AsArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow::util::display::array_value_to_string;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use log::{debug, info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::encoding::{self, EncodingProfile};
use super::model::{CellValue, SourceFormat, Table};
use crate::error::{Error, Result};

/// Delimiters tried on the header line, in preference order.
const DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

// ---------------------------------------------------------------------------
// Options and format detection
// ---------------------------------------------------------------------------

/// Knobs for [`load_with`]. The default reads the first sheet and decodes
/// text as UTF-8 with a Western Latin fallback.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub encoding_profile: EncodingProfile,
    /// Sheet to read from a spreadsheet container; first sheet when `None`.
    pub sheet: Option<String>,
}

/// The container family a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Delimited,
    Spreadsheet,
    Parquet,
}

impl FileKind {
    /// Dispatch by extension, falling back to the leading magic bytes.
    pub fn detect(bytes: &[u8], filename: &str) -> FileKind {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "csv" | "tsv" | "txt" => FileKind::Delimited,
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => FileKind::Spreadsheet,
            "parquet" | "pq" => FileKind::Parquet,
            _ => Self::sniff(bytes),
        }
    }

    fn sniff(bytes: &[u8]) -> FileKind {
        const ZIP: &[u8] = b"PK\x03\x04";
        const OLE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
        if bytes.starts_with(ZIP) || bytes.starts_with(OLE) {
            FileKind::Spreadsheet
        } else if bytes.starts_with(b"PAR1") {
            FileKind::Parquet
        } else {
            FileKind::Delimited
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a table from raw bytes with default options.
///
/// `filename` is only used to pick the format and to label errors.
pub fn load(bytes: &[u8], filename: &str) -> Result<Table> {
    load_with(bytes, filename, &LoadOptions::default())
}

/// Load a table from raw bytes.
///
/// Supported formats:
/// * `.csv` / `.tsv` / `.txt` – delimited text, encoding and delimiter detected
/// * `.xlsx` / `.xlsm` / `.xlsb` / `.xls` / `.ods` – one sheet of a workbook
/// * `.parquet` / `.pq` – every column of the file
pub fn load_with(bytes: &[u8], filename: &str, options: &LoadOptions) -> Result<Table> {
    let table = match FileKind::detect(bytes, filename) {
        FileKind::Delimited => load_delimited(bytes, filename, options.encoding_profile),
        FileKind::Spreadsheet => load_spreadsheet(bytes, filename, options.sheet.as_deref()),
        FileKind::Parquet => load_parquet(bytes, filename),
    }?;
    info!(
        "Loaded '{}': {} rows, columns {:?}",
        filename,
        table.len(),
        table.columns()
    );
    Ok(table)
}

/// Sheet names of a spreadsheet container, in workbook order. Delimited and
/// Parquet files have no sheets and yield an empty list.
pub fn list_sheets(bytes: &[u8], filename: &str) -> Result<Vec<String>> {
    if FileKind::detect(bytes, filename) != FileKind::Spreadsheet {
        return Ok(Vec::new());
    }
    let workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| Error::unreadable(filename, e))?;
    Ok(workbook.sheet_names())
}

// ---------------------------------------------------------------------------
// Delimited-text loader
// ---------------------------------------------------------------------------

/// Try each decoder in order; the first one that decodes cleanly and yields
/// a non-empty header row wins.
fn load_delimited(bytes: &[u8], filename: &str, profile: EncodingProfile) -> Result<Table> {
    let mut decoded_any = false;
    let mut last_error: Option<Error> = None;

    for attempt in encoding::attempts(bytes, profile) {
        let Some(text) = attempt.decode() else {
            debug!("'{}': not valid {}", filename, attempt.encoding.name());
            continue;
        };
        decoded_any = true;

        match parse_delimited(&text, filename, attempt.encoding.name()) {
            Ok(Some(table)) => return Ok(table),
            Ok(None) => {
                debug!(
                    "'{}': empty header when decoded as {}",
                    filename,
                    attempt.encoding.name()
                );
            }
            Err(e) => {
                debug!("'{}': {} decode did not parse: {e}", filename, attempt.encoding.name());
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(e),
        None if decoded_any => Err(Error::EmptySheet {
            file: filename.to_string(),
        }),
        None => Err(Error::unreadable(filename, "no supported text encoding matched")),
    }
}

/// Parse decoded text. `Ok(None)` means the header row is missing or blank.
fn parse_delimited(text: &str, filename: &str, encoding: &'static str) -> Result<Option<Table>> {
    let delimiter = detect_delimiter(text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let header = match records.next() {
        None => return Ok(None),
        Some(rec) => rec.map_err(|e| Error::unreadable(filename, e))?,
    };
    if header.iter().all(|h| h.trim().is_empty()) {
        return Ok(None);
    }
    let columns = header_names(header.iter().map(|h| h.to_string()));
    let width = columns.len();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (row_no, result) in records.enumerate() {
        let record = result.map_err(|e| Error::unreadable(filename, e))?;
        if record.len() > width {
            warn!(
                "'{}' data row {}: {} fields, header has {}; row skipped",
                filename,
                row_no + 1,
                record.len(),
                width
            );
            skipped += 1;
            continue;
        }
        rows.push(record.iter().map(CellValue::from_text).collect());
    }

    debug!(
        "'{}': decoded as {}, delimiter {:?}",
        filename, encoding, delimiter as char
    );
    let source = SourceFormat::Delimited { encoding, delimiter };
    let table = Table::new(filename, columns, rows, source)?.with_skipped_rows(skipped);
    Ok(Some(table))
}

/// Pick the delimiter whose header split yields the most columns (more than
/// one); ties go to the earlier entry of [`DELIMITERS`]; comma otherwise.
fn detect_delimiter(text: &str) -> u8 {
    let mut best = (b',', 1usize);
    for &delim in &DELIMITERS {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delim)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let width = match reader.records().next() {
            Some(Ok(rec)) => rec.len(),
            _ => continue,
        };
        if width > best.1 {
            best = (delim, width);
        }
    }
    best.0
}

/// Blank header cells become `column_<n>` (1-based position).
fn header_names(raw: impl Iterator<Item = String>) -> Vec<String> {
    raw.enumerate()
        .map(|(i, h)| {
            if h.trim().is_empty() {
                format!("column_{}", i + 1)
            } else {
                h
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Spreadsheet loader
// ---------------------------------------------------------------------------

/// First row of the used range is the header; the rest are data rows.
fn load_spreadsheet(bytes: &[u8], filename: &str, sheet: Option<&str>) -> Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| Error::unreadable(filename, e))?;
    let sheet_names = workbook.sheet_names();

    let sheet_name = match sheet {
        Some(wanted) => sheet_names
            .iter()
            .find(|s| s.as_str() == wanted)
            .cloned()
            .ok_or_else(|| Error::SheetNotFound {
                file: filename.to_string(),
                sheet: wanted.to_string(),
                available: sheet_names.clone(),
            })?,
        None => sheet_names.first().cloned().ok_or_else(|| Error::EmptySheet {
            file: filename.to_string(),
        })?,
    };
    if sheet_names.len() > 1 {
        debug!("'{}': {} sheets, reading '{}'", filename, sheet_names.len(), sheet_name);
    }

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| Error::unreadable(filename, e))?;

    let mut rows = range.rows();
    let header = match rows.next() {
        Some(h) if h.iter().any(|c| !header_text(c).trim().is_empty()) => h,
        _ => {
            return Err(Error::EmptySheet {
                file: filename.to_string(),
            })
        }
    };
    let columns = header_names(header.iter().map(header_text));
    let data: Vec<Vec<CellValue>> = rows
        .map(|r| r.iter().map(spreadsheet_cell).collect())
        .collect();

    Table::new(
        filename,
        columns,
        data,
        SourceFormat::Spreadsheet { sheet: sheet_name },
    )
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => spreadsheet_cell(other).to_string(),
    }
}

fn spreadsheet_cell(cell: &Data) -> CellValue {
    match cell {
        Data::String(s) => CellValue::from_text(s),
        Data::Int(i) => CellValue::Integer(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => CellValue::Date(ndt.to_string()),
            None => CellValue::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) => CellValue::Date(s.clone()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
        Data::Empty => CellValue::Empty,
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Every top-level column of the file becomes a table column.
fn load_parquet(bytes: &[u8], filename: &str) -> Result<Table> {
    let data = bytes::Bytes::copy_from_slice(bytes);
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)
        .map_err(|e| Error::unreadable(filename, e))?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().map_err(|e| Error::unreadable(filename, e))?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result.map_err(|e| Error::unreadable(filename, e))?;
        for row in 0..batch.num_rows() {
            let cells = batch
                .columns()
                .iter()
                .map(|col| arrow_cell(col, row, filename))
                .collect::<Result<Vec<_>>>()?;
            rows.push(cells);
        }
    }

    Table::new(filename, columns, rows, SourceFormat::Parquet)
}

/// Extract a single cell from an Arrow column at a given row.
fn arrow_cell(col: &Arc<dyn Array>, row: usize, filename: &str) -> Result<CellValue> {
    if col.is_null(row) {
        return Ok(CellValue::Empty);
    }
    let value = match col.data_type() {
        DataType::Utf8 => CellValue::from_text(col.as_string::<i32>().value(row)),
        DataType::LargeUtf8 => CellValue::from_text(col.as_string::<i64>().value(row)),
        DataType::Boolean => CellValue::Bool(col.as_boolean().value(row)),
        DataType::Int8 => CellValue::Integer(col.as_primitive::<Int8Type>().value(row).into()),
        DataType::Int16 => CellValue::Integer(col.as_primitive::<Int16Type>().value(row).into()),
        DataType::Int32 => CellValue::Integer(col.as_primitive::<Int32Type>().value(row).into()),
        DataType::Int64 => CellValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => CellValue::Integer(col.as_primitive::<UInt8Type>().value(row).into()),
        DataType::UInt16 => CellValue::Integer(col.as_primitive::<UInt16Type>().value(row).into()),
        DataType::UInt32 => CellValue::Integer(col.as_primitive::<UInt32Type>().value(row).into()),
        DataType::UInt64 => {
            let v = col.as_primitive::<UInt64Type>().value(row);
            match i64::try_from(v) {
                Ok(i) => CellValue::Integer(i),
                Err(_) => CellValue::Text(v.to_string()),
            }
        }
        DataType::Float32 => {
            CellValue::Float(col.as_primitive::<Float32Type>().value(row).into())
        }
        DataType::Float64 => CellValue::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {
            CellValue::Date(display_value(col, row, filename)?)
        }
        _ => CellValue::from_text(&display_value(col, row, filename)?),
    };
    Ok(value)
}

fn display_value(col: &Arc<dyn Array>, row: usize, filename: &str) -> Result<String> {
    array_value_to_string(&**col, row).map_err(|e| Error::unreadable(filename, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{EUC_JP, SHIFT_JIS, WINDOWS_1252};

    fn texts(table: &Table, column: &str) -> Vec<String> {
        table
            .column_values(column)
            .unwrap()
            .map(|c| c.to_string())
            .collect()
    }

    #[test]
    fn dispatches_on_extension_then_magic() {
        assert_eq!(FileKind::detect(b"a,b", "x.CSV"), FileKind::Delimited);
        assert_eq!(FileKind::detect(b"", "x.xls"), FileKind::Spreadsheet);
        assert_eq!(FileKind::detect(b"", "x.pq"), FileKind::Parquet);
        assert_eq!(FileKind::detect(b"PK\x03\x04rest", "upload"), FileKind::Spreadsheet);
        assert_eq!(FileKind::detect(b"PAR1rest", "upload.bin"), FileKind::Parquet);
        assert_eq!(FileKind::detect(b"id\nA1", "upload"), FileKind::Delimited);
    }

    #[test]
    fn detects_semicolon_and_tab() {
        let semi = load(b"id;name\nA1;x\n", "semi.csv").unwrap();
        assert_eq!(semi.columns(), ["id", "name"]);
        assert_eq!(
            semi.source(),
            &SourceFormat::Delimited { encoding: "UTF-8", delimiter: b';' }
        );

        let tab = load(b"id\tname\nA1\tx\n", "tab.tsv").unwrap();
        assert_eq!(tab.columns(), ["id", "name"]);
    }

    #[test]
    fn single_column_defaults_to_comma() {
        let table = load(b"id\nA1\nA2\n", "one.csv").unwrap();
        assert_eq!(table.columns(), ["id"]);
        assert_eq!(
            table.source(),
            &SourceFormat::Delimited { encoding: "UTF-8", delimiter: b',' }
        );
        assert_eq!(texts(&table, "id"), ["A1", "A2"]);
    }

    #[test]
    fn cells_are_kept_as_read() {
        let table = load(b"id,n\n 007 ,1.0\n,2\n", "raw.csv").unwrap();
        let ids: Vec<&CellValue> = table.column_values("id").unwrap().collect();
        assert_eq!(ids, [&CellValue::Text(" 007 ".into()), &CellValue::Empty]);
        assert_eq!(texts(&table, "n"), ["1.0", "2"]);
    }

    #[test]
    fn ragged_rows_are_padded_or_skipped() {
        let table = load(b"a,b,c\n1,2\n1,2,3,4\n5,6,7\n", "ragged.csv").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.skipped_rows(), 1);
        assert_eq!(table.row(0).unwrap().get("c"), Some(&CellValue::Empty));
        assert_eq!(texts(&table, "a"), ["1", "5"]);
    }

    #[test]
    fn blank_header_cells_get_positional_names() {
        let table = load(b",id\n0,A1\n", "indexed.csv").unwrap();
        assert_eq!(table.columns(), ["column_1", "id"]);
    }

    #[test]
    fn empty_input_is_an_empty_sheet() {
        assert!(matches!(load(b"", "empty.csv"), Err(Error::EmptySheet { .. })));
        assert!(matches!(load(b"\n\n", "blank.csv"), Err(Error::EmptySheet { .. })));
    }

    #[test]
    fn duplicate_headers_fail_the_load() {
        assert!(matches!(
            load(b"id,id\n1,2\n", "dup.csv"),
            Err(Error::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn same_logical_table_from_every_western_encoding() {
        let text = "gene,sample\nGène1,Müller\nGENE2,Åsa\n";
        let utf8 = load(text.as_bytes(), "a.csv").unwrap();
        let (latin, _, _) = WINDOWS_1252.encode(text);
        let latin = load(&latin, "a.csv").unwrap();
        let mut bom = vec![0xEF, 0xBB, 0xBF];
        bom.extend_from_slice(text.as_bytes());
        let bom = load(&bom, "a.csv").unwrap();

        for other in [&latin, &bom] {
            assert_eq!(other.columns(), utf8.columns());
            assert_eq!(texts(other, "gene"), texts(&utf8, "gene"));
            assert_eq!(texts(other, "sample"), texts(&utf8, "sample"));
        }
        assert!(matches!(
            latin.source(),
            SourceFormat::Delimited { encoding: "windows-1252", .. }
        ));
    }

    fn cells(table: &Table) -> Vec<Vec<String>> {
        table
            .rows()
            .map(|r| r.cells().iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn decoded_as(table: &Table) -> &'static str {
        match table.source() {
            SourceFormat::Delimited { encoding, .. } => *encoding,
            other => panic!("not delimited: {other:?}"),
        }
    }

    #[test]
    fn every_profile_candidate_loads_the_same_table() {
        let cases = [
            (EncodingProfile::Western, "gene,sample\nGène1,Müller\nGENE2,Åsa\n"),
            (EncodingProfile::Japanese, "遺伝子,値\n遺伝子A,1\nｶﾅ,2\n"),
            (EncodingProfile::SimplifiedChinese, "基因,值\n基因A,1\n"),
            (EncodingProfile::TraditionalChinese, "基因,數值\n基因A,1\n"),
            (EncodingProfile::Korean, "유전자,값\n유전자A,1\n"),
        ];

        for (profile, text) in cases {
            let options = LoadOptions {
                encoding_profile: profile,
                ..LoadOptions::default()
            };
            let reference = load_with(text.as_bytes(), "a.csv", &options).unwrap();

            for encoding in profile.candidates() {
                let (bytes, _, unmappable) = encoding.encode(text);
                if unmappable {
                    // Only the Latin fallback lacks CJK characters.
                    assert_eq!(encoding, WINDOWS_1252, "{profile}");
                    continue;
                }
                let table = load_with(&bytes, "a.csv", &options).unwrap();
                assert_eq!(decoded_as(&table), encoding.name(), "{profile}");
                assert_eq!(table.columns(), reference.columns(), "{profile}");
                assert_eq!(cells(&table), cells(&reference), "{profile}");
            }
        }
    }

    #[test]
    fn utf16_with_a_bom_loads_the_same_table() {
        let text = "gene,sample\nGène1,Müller\n";
        let reference = load(text.as_bytes(), "a.csv").unwrap();

        let mut le = vec![0xFF, 0xFE];
        let mut be = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            le.extend_from_slice(&unit.to_le_bytes());
            be.extend_from_slice(&unit.to_be_bytes());
        }

        for (bytes, name) in [(le, "UTF-16LE"), (be, "UTF-16BE")] {
            let table = load(&bytes, "a.csv").unwrap();
            assert_eq!(decoded_as(&table), name);
            assert_eq!(table.columns(), reference.columns());
            assert_eq!(cells(&table), cells(&reference));
        }
    }

    #[test]
    fn euc_jp_and_shift_jis_agree() {
        let text = "遺伝子,値\n遺伝子A,1\n";
        let options = LoadOptions {
            encoding_profile: EncodingProfile::Japanese,
            ..LoadOptions::default()
        };
        let (euc, _, _) = EUC_JP.encode(text);
        let (sjis, _, _) = SHIFT_JIS.encode(text);
        let euc = load_with(&euc, "ja.csv", &options).unwrap();
        let sjis = load_with(&sjis, "ja.csv", &options).unwrap();

        assert_eq!(decoded_as(&euc), "EUC-JP");
        assert_eq!(decoded_as(&sjis), "Shift_JIS");
        assert_eq!(euc.columns(), sjis.columns());
        assert_eq!(texts(&euc, "遺伝子"), ["遺伝子A"]);
        assert_eq!(cells(&euc), cells(&sjis));
    }

    #[test]
    fn csv_has_no_sheets() {
        assert!(list_sheets(b"id\n1\n", "a.csv").unwrap().is_empty());
    }

    #[test]
    fn garbage_spreadsheet_is_unreadable() {
        let err = load(b"definitely not a workbook", "broken.xlsx").unwrap_err();
        match err {
            Error::UnreadableFile { file, .. } => assert_eq!(file, "broken.xlsx"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
