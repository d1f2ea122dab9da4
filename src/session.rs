use log::{info, warn};
use serde::Serialize;

use crate::data::export;
use crate::data::filter::{self, FilterResult, FilterStats, KeySet, MatchMode};
use crate::data::loader::{self, LoadOptions};
use crate::data::model::Table;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Inputs and outcomes
// ---------------------------------------------------------------------------

/// A target file as handed over by the caller: its original name and bytes.
#[derive(Debug, Clone)]
pub struct TargetFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl TargetFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// A successfully filtered target, ready for download.
#[derive(Debug, Clone)]
pub struct FilteredFile {
    /// `filtered_<original name>`.
    pub output_name: String,
    /// The filtered table encoded in the source's format family.
    pub bytes: Vec<u8>,
    pub result: FilterResult,
}

impl FilteredFile {
    pub fn stats(&self) -> FilterStats {
        self.result.stats
    }
}

/// Per-target outcome. One target failing never affects the others.
#[derive(Debug)]
pub struct FileOutcome {
    pub source_name: String,
    pub result: Result<FilteredFile>,
}

impl FileOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Plain-data summary of one outcome, for display or JSON reports.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSummary {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(flatten)]
    pub stats: Option<FilterStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&FileOutcome> for OutcomeSummary {
    fn from(outcome: &FileOutcome) -> Self {
        match &outcome.result {
            Ok(file) => OutcomeSummary {
                file: outcome.source_name.clone(),
                output: Some(file.output_name.clone()),
                stats: Some(file.stats()),
                error: None,
            },
            Err(e) => OutcomeSummary {
                file: outcome.source_name.clone(),
                output: None,
                stats: None,
                error: Some(e.to_string()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// FilterSession
// ---------------------------------------------------------------------------

/// One template column's keep-set plus the options used to read targets.
///
/// Built once per template-column selection; afterwards every call is a pure
/// function of its inputs, so targets may be filtered in any order or in
/// parallel.
#[derive(Debug, Clone)]
pub struct FilterSession {
    template_name: String,
    key_column: String,
    key_set: KeySet,
    load_options: LoadOptions,
}

impl FilterSession {
    /// Build the keep-set from `key_column` of an already loaded template.
    pub fn new(
        template: &Table,
        key_column: &str,
        mode: MatchMode,
        load_options: LoadOptions,
    ) -> Result<Self> {
        let key_set = filter::build_key_set(template, key_column, mode)?;
        Ok(Self {
            template_name: template.name().to_string(),
            key_column: key_column.to_string(),
            key_set,
            load_options,
        })
    }

    /// Load the template from raw bytes and build the keep-set. The template
    /// is read with `template_options`; targets with `target_options`.
    pub fn from_template_bytes(
        bytes: &[u8],
        filename: &str,
        key_column: &str,
        mode: MatchMode,
        template_options: &LoadOptions,
        target_options: LoadOptions,
    ) -> Result<Self> {
        let template = loader::load_with(bytes, filename, template_options)?;
        Self::new(&template, key_column, mode, target_options)
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn key_set(&self) -> &KeySet {
        &self.key_set
    }

    /// Filter an already loaded target table.
    pub fn filter_table(&self, target: &Table, target_column: &str) -> Result<FilterResult> {
        filter::filter(target, target_column, &self.key_set)
    }

    /// Load, filter and re-encode one target file.
    pub fn filter_file(&self, target: &TargetFile, target_column: &str) -> Result<FilteredFile> {
        let table = loader::load_with(&target.bytes, &target.name, &self.load_options)?;
        let result = self.filter_table(&table, target_column)?;
        let bytes = export::encode_table(&result.table)?;
        Ok(FilteredFile {
            output_name: export::output_name(&target.name, table.source()),
            bytes,
            result,
        })
    }

    /// Process every target independently, in input order.
    pub fn filter_files(&self, targets: &[TargetFile], target_column: &str) -> Vec<FileOutcome> {
        let outcomes: Vec<FileOutcome> = targets
            .iter()
            .map(|target| {
                let result = self.filter_file(target, target_column);
                if let Err(e) = &result {
                    warn!("Skipping '{}': {e}", target.name);
                }
                FileOutcome {
                    source_name: target.name.clone(),
                    result,
                }
            })
            .collect();

        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        info!(
            "Processed {} target files against '{}': {} succeeded, {} failed",
            outcomes.len(),
            self.template_name,
            succeeded,
            outcomes.len() - succeeded
        );
        outcomes
    }
}

/// A workbook with one sheet per successful outcome. `None` when nothing
/// succeeded.
pub fn combined_workbook(file: &str, outcomes: &[FileOutcome]) -> Result<Option<Vec<u8>>> {
    let tables: Vec<&Table> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .map(|f| &f.result.table)
        .collect();
    if tables.is_empty() {
        return Ok(None);
    }
    export::combined_workbook(file, &tables).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn session(template_csv: &str, column: &str) -> FilterSession {
        FilterSession::from_template_bytes(
            template_csv.as_bytes(),
            "template.csv",
            column,
            MatchMode::CaseSensitive,
            &LoadOptions::default(),
            LoadOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn filters_a_csv_target_into_a_named_download() {
        let s = session("id\nA1\nA2\nA3\n", "id");
        assert_eq!(s.template_name(), "template.csv");
        assert_eq!(s.key_column(), "id");
        assert_eq!(s.key_set().len(), 3);

        let target = TargetFile::new("target.csv", b"id,v\nA1,1\nA4,2\nA2,3\nA2,4\n".to_vec());
        let file = s.filter_file(&target, "id").unwrap();

        assert_eq!(file.output_name, "filtered_target.csv");
        assert_eq!(
            file.stats(),
            FilterStats { original_count: 4, kept_count: 3, removed_count: 1 }
        );
        assert_eq!(String::from_utf8(file.bytes).unwrap(), "id,v\nA1,1\nA2,3\nA2,4\n");
    }

    #[test]
    fn one_bad_target_does_not_stop_the_rest() {
        let s = session("id\nA1\n", "id");
        let targets = [
            TargetFile::new("good.csv", b"id\nA1\nB1\n".to_vec()),
            TargetFile::new("no_column.csv", b"other\nA1\n".to_vec()),
            TargetFile::new("empty.csv", Vec::new()),
            TargetFile::new("also_good.csv", b"id\nA1\n".to_vec()),
        ];

        let outcomes = s.filter_files(&targets, "id");
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].is_ok());
        assert!(matches!(
            outcomes[1].result,
            Err(Error::ColumnNotFound { ref column, .. }) if column == "id"
        ));
        assert!(matches!(outcomes[2].result, Err(Error::EmptySheet { .. })));
        assert!(outcomes[3].is_ok());

        let summary = OutcomeSummary::from(&outcomes[1]);
        assert_eq!(summary.file, "no_column.csv");
        assert!(summary.stats.is_none());
        assert!(summary.error.unwrap().contains("'id'"));
    }

    #[test]
    fn missing_key_column_fails_session_creation() {
        let err = FilterSession::from_template_bytes(
            b"id\nA1\n",
            "template.csv",
            "gene",
            MatchMode::CaseSensitive,
            &LoadOptions::default(),
            LoadOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound { .. }));
    }

    #[test]
    fn combined_workbook_skips_failures() {
        let s = session("id\nA1\n", "id");
        let targets = [
            TargetFile::new("first.csv", b"id\nA1\n".to_vec()),
            TargetFile::new("broken.csv", b"x\n1\n".to_vec()),
            TargetFile::new("second.csv", b"id;n\nA1;2\n".to_vec()),
        ];
        let outcomes = s.filter_files(&targets, "id");
        let bytes = combined_workbook("all.xlsx", &outcomes).unwrap().unwrap();
        assert_eq!(
            loader::list_sheets(&bytes, "all.xlsx").unwrap(),
            ["first", "second"]
        );

        let none = combined_workbook("none.xlsx", &outcomes[1..2]).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn summary_serialises_flat_counts() {
        let s = session("id\nA1\n", "id");
        let outcomes = s.filter_files(&[TargetFile::new("t.csv", b"id\nA1\nB\n".to_vec())], "id");
        let json = serde_json::to_value(OutcomeSummary::from(&outcomes[0])).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "file": "t.csv",
                "output": "filtered_t.csv",
                "original_count": 2,
                "kept_count": 1,
                "removed_count": 1
            })
        );
    }
}
