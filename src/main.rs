use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use row_sieve::data::export;
use row_sieve::session::combined_workbook;
use row_sieve::{
    list_sheets, load_with, EncodingProfile, FilterSession, LoadOptions, MatchMode,
    OutcomeSummary, TargetFile,
};

#[derive(Parser)]
#[command(name = "row-sieve")]
#[command(about = "Keep only the rows whose key appears in a template column")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the sheets and columns of a file
    Columns {
        file: PathBuf,

        /// Sheet to inspect (first sheet by default)
        #[arg(long)]
        sheet: Option<String>,

        /// Legacy encodings to try for delimited text
        #[arg(long, default_value_t = EncodingProfile::Western)]
        encoding_profile: EncodingProfile,

        /// Also print the first N rows
        #[arg(long, default_value_t = 0)]
        preview: usize,
    },

    /// Filter target files against the template's key column
    Filter {
        /// File supplying the keep-set
        #[arg(long)]
        template: PathBuf,

        /// Template column whose values are kept
        #[arg(long)]
        key_column: String,

        /// Template sheet (first sheet by default)
        #[arg(long)]
        template_sheet: Option<String>,

        /// Column of each target compared against the keep-set (defaults to the key column)
        #[arg(long)]
        target_column: Option<String>,

        /// Target sheet (first sheet by default)
        #[arg(long)]
        target_sheet: Option<String>,

        /// Compare case-insensitively
        #[arg(long, short = 'i')]
        ignore_case: bool,

        /// Legacy encodings to try for delimited text
        #[arg(long, default_value_t = EncodingProfile::Western)]
        encoding_profile: EncodingProfile,

        /// Directory for the filtered files
        #[arg(long, short = 'o', default_value = ".")]
        out_dir: PathBuf,

        /// Also write one workbook with a sheet per target
        #[arg(long)]
        combined: Option<String>,

        /// Write a JSON report of per-file statistics
        #[arg(long)]
        report: Option<PathBuf>,

        /// Files to filter
        #[arg(required = true)]
        targets: Vec<PathBuf>,
    },
}

#[derive(Serialize)]
struct RunReport<'a> {
    template: &'a str,
    key_column: &'a str,
    target_column: &'a str,
    match_mode: MatchMode,
    unique_keys: usize,
    elapsed_ms: u128,
    files: Vec<OutcomeSummary>,
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when some target files failed but the rest were written.
fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Columns {
            file,
            sheet,
            encoding_profile,
            preview,
        } => {
            show_columns(&file, sheet, encoding_profile, preview)?;
            Ok(true)
        }
        Commands::Filter {
            template,
            key_column,
            template_sheet,
            target_column,
            target_sheet,
            ignore_case,
            encoding_profile,
            out_dir,
            combined,
            report,
            targets,
        } => {
            let mode = if ignore_case {
                MatchMode::CaseInsensitive
            } else {
                MatchMode::CaseSensitive
            };
            let template_options = LoadOptions {
                encoding_profile,
                sheet: template_sheet,
            };
            let target_options = LoadOptions {
                encoding_profile,
                sheet: target_sheet,
            };
            let target_column = target_column.unwrap_or_else(|| key_column.clone());

            let start = Instant::now();
            let template_name = display_name(&template);
            let template_bytes = std::fs::read(&template)
                .with_context(|| format!("reading template {}", template.display()))?;
            let session = FilterSession::from_template_bytes(
                &template_bytes,
                &template_name,
                &key_column,
                mode,
                &template_options,
                target_options,
            )?;
            println!(
                "Template '{}': {} unique values in column '{}'",
                session.template_name(),
                session.key_set().len(),
                session.key_column()
            );

            let mut inputs = Vec::with_capacity(targets.len());
            let mut unread = Vec::new();
            for path in &targets {
                match std::fs::read(path) {
                    Ok(bytes) => inputs.push(TargetFile::new(display_name(path), bytes)),
                    Err(e) => {
                        log::warn!("Skipping {}: {e}", path.display());
                        unread.push(OutcomeSummary {
                            file: display_name(path),
                            output: None,
                            stats: None,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }

            let outcomes = session.filter_files(&inputs, &target_column);

            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("creating {}", out_dir.display()))?;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(file) => {
                        let dest = out_dir.join(&file.output_name);
                        std::fs::write(&dest, &file.bytes)
                            .with_context(|| format!("writing {}", dest.display()))?;
                        let stats = file.stats();
                        println!("File: {}", outcome.source_name);
                        println!("  Original rows: {}", stats.original_count);
                        println!("  Filtered rows: {}", stats.kept_count);
                        println!("  Rows removed:  {}", stats.removed_count);
                        println!("  Written to:    {}", dest.display());
                    }
                    Err(e) => println!("File: {}\n  Error: {e}", outcome.source_name),
                }
            }

            if let Some(name) = combined {
                match combined_workbook(&name, &outcomes)? {
                    Some(bytes) => {
                        let dest = out_dir.join(&name);
                        std::fs::write(&dest, bytes)
                            .with_context(|| format!("writing {}", dest.display()))?;
                        println!("Combined workbook: {}", dest.display());
                    }
                    None => println!("Combined workbook skipped: no target succeeded"),
                }
            }

            let elapsed = start.elapsed();
            println!("Processing completed in {:.2} seconds", elapsed.as_secs_f64());

            let mut files: Vec<OutcomeSummary> = outcomes.iter().map(OutcomeSummary::from).collect();
            files.extend(unread);
            let all_ok = files.iter().all(|f| f.error.is_none());

            if let Some(path) = report {
                let report = RunReport {
                    template: session.template_name(),
                    key_column: session.key_column(),
                    target_column: &target_column,
                    match_mode: mode,
                    unique_keys: session.key_set().len(),
                    elapsed_ms: elapsed.as_millis(),
                    files,
                };
                let json = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("writing report {}", path.display()))?;
            }

            Ok(all_ok)
        }
    }
}

fn show_columns(
    file: &Path,
    sheet: Option<String>,
    encoding_profile: EncodingProfile,
    preview: usize,
) -> Result<()> {
    let name = display_name(file);
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;

    let sheets = list_sheets(&bytes, &name)?;
    if sheets.len() > 1 {
        println!("Sheets: {}", sheets.join(", "));
    }

    let options = LoadOptions {
        encoding_profile,
        sheet,
    };
    let table = load_with(&bytes, &name, &options)?;
    println!("{} rows", table.len());
    for column in table.columns() {
        println!("  {column}");
    }
    if table.skipped_rows() > 0 {
        println!("{} malformed rows skipped", table.skipped_rows());
    }

    if preview > 0 {
        let batch = export::to_record_batch(&table.head(preview))?;
        println!("{}", arrow::util::pretty::pretty_format_batches(&[batch])?);
    }
    Ok(())
}

/// The file name used for format detection and output naming.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
