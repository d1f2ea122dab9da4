//! Keep only the rows of a table whose key column value appears in a
//! template column.
//!
//! ```no_run
//! use row_sieve::{FilterSession, LoadOptions, MatchMode, TargetFile};
//!
//! # fn main() -> row_sieve::Result<()> {
//! let template = row_sieve::load(b"id\nA1\nA2\n", "template.csv")?;
//! let session = FilterSession::new(&template, "id", MatchMode::default(), LoadOptions::default())?;
//! let targets = [TargetFile::new("target.csv", b"id,v\nA1,1\nA3,2\n".to_vec())];
//! for outcome in session.filter_files(&targets, "id") {
//!     let file = outcome.result?;
//!     println!("{}: {:?}", file.output_name, file.stats());
//! }
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod error;
pub mod session;

pub use data::encoding::EncodingProfile;
pub use data::filter::{build_key_set, filter, FilterResult, FilterStats, KeySet, MatchMode};
pub use data::loader::{list_sheets, load, load_with, LoadOptions};
pub use data::model::{CellValue, SourceFormat, Table};
pub use error::{Error, Result};
pub use session::{FileOutcome, FilterSession, FilteredFile, OutcomeSummary, TargetFile};
