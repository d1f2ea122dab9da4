//! Error types for loading, filtering and exporting tables.

use thiserror::Error;

/// Every failure is scoped to a single file or table and names it.
#[derive(Error, Debug)]
pub enum Error {
    #[error("could not read '{file}': {reason}")]
    UnreadableFile { file: String, reason: String },

    #[error("'{file}' has no header row or no columns")]
    EmptySheet { file: String },

    #[error("column '{column}' not found in '{table}' (available: {})", available.join(", "))]
    ColumnNotFound {
        column: String,
        table: String,
        available: Vec<String>,
    },

    #[error("'{file}' has more than one column named '{column}'")]
    DuplicateColumn { file: String, column: String },

    #[error("'{file}' row {row} has {found} cells, expected at most {expected}")]
    RaggedRow {
        file: String,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("sheet '{sheet}' not found in '{file}' (available: {})", available.join(", "))]
    SheetNotFound {
        file: String,
        sheet: String,
        available: Vec<String>,
    },

    #[error("could not write '{file}': {reason}")]
    Export { file: String, reason: String },
}

impl Error {
    pub(crate) fn unreadable(file: &str, reason: impl std::fmt::Display) -> Self {
        Error::UnreadableFile {
            file: file.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn export(file: &str, reason: impl std::fmt::Display) -> Self {
        Error::Export {
            file: file.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
