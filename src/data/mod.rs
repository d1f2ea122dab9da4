/// Data layer: core types, loading, filtering and export.
///
/// Architecture:
/// ```text
///  .csv / .xlsx / .xls / .parquet  (raw bytes + filename)
///        │
///        ▼
///   ┌──────────┐   ┌──────────┐
///   │  loader   │──│ encoding │  ordered decoders, first success wins
///   └──────────┘   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  Table    │  ordered columns, rows of CellValue
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  template column → KeySet; target rows ∈ KeySet → FilterResult
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  export   │  filtered Table → bytes in the source's format family
///   └──────────┘
/// ```

pub mod encoding;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
