//! sheetload - bulk CSV to Google Sheets importer
//!
//! `sheetload import <dir>` uploads every CSV file in `dir` into its own tab.
//! `sheetload preview <file>` shows how a file would be decoded and
//! normalized, without touching the network.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sheetload::auth::StaticTokenProvider;
use sheetload::encoding::EncodingResolver;
use sheetload::normalizer::CsvNormalizer;
use sheetload::scanner::CsvScanner;
use sheetload::sheets::GoogleSheetsClient;
use sheetload::{ImportJob, ImportOrchestrator, ImportReport, LogProgress, SpreadsheetTarget};
use sheetload_common::config::{ConfigResolver, ConfigSource, LoggingConfig};
use sheetload_common::ImportConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sheetload")]
#[command(about = "Bulk-load CSV files into a Google spreadsheet, one tab per file")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload every CSV file of a directory
    Import(ImportArgs),

    /// Decode and normalize one file, print the result as CSV
    Preview {
        file: PathBuf,

        /// Config file (defaults to the per-user config)
        #[arg(long, env = "SHEETLOAD_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Directory scanned for *.csv files
    #[arg(default_value = "csv_files")]
    dir: PathBuf,

    /// Import into this existing spreadsheet instead of creating one
    #[arg(long, conflicts_with = "template")]
    spreadsheet_id: Option<String>,

    /// Name of the spreadsheet to create; the date is appended
    #[arg(long, required_unless_present = "spreadsheet_id")]
    name: Option<String>,

    /// Template spreadsheet to copy
    #[arg(long)]
    template: Option<String>,

    /// OAuth bearer token (falls back to SHEETLOAD_ACCESS_TOKEN)
    #[arg(long)]
    access_token: Option<String>,

    /// Config file (defaults to the per-user config)
    #[arg(long, env = "SHEETLOAD_CONFIG")]
    config: Option<PathBuf>,

    /// Write the run report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    #[arg(long)]
    max_file_size_mb: Option<f64>,

    /// Seconds slept before every request
    #[arg(long)]
    request_delay: Option<f64>,

    /// Seconds slept between files
    #[arg(long)]
    file_delay: Option<f64>,

    #[arg(long)]
    max_retries: Option<u32>,

    #[arg(long)]
    batch_rows: Option<usize>,

    /// Skip the summary rows on the first tab
    #[arg(long)]
    no_summary: bool,

    /// Log file (overrides logging.file)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl ImportArgs {
    /// CLI flags win over every config source
    fn apply_overrides(&self, config: &mut ImportConfig) {
        if let Some(template) = &self.template {
            config.template_spreadsheet_id = Some(template.clone());
        }
        if let Some(v) = self.max_file_size_mb {
            config.max_file_size_mb = v;
        }
        if let Some(v) = self.request_delay {
            config.request_delay_secs = v;
        }
        if let Some(v) = self.file_delay {
            config.file_delay_secs = v;
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = self.batch_rows {
            config.batch_rows = v;
        }
        if self.no_summary {
            config.write_summary = false;
        }
        if let Some(path) = &self.log_file {
            config.logging.file = Some(path.clone());
        }
    }

    fn target(&self) -> SpreadsheetTarget {
        match (&self.spreadsheet_id, &self.name) {
            (Some(id), _) => SpreadsheetTarget::Existing {
                spreadsheet_id: id.clone(),
            },
            (None, Some(name)) => SpreadsheetTarget::create_dated(name),
            (None, None) => SpreadsheetTarget::create_dated("CSV Import"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Import(args) => run_import(args).await,
        Command::Preview { file, config } => {
            let (config, source) = load_config(config)?;
            init_tracing(&LoggingConfig {
                file: None,
                ..config.logging.clone()
            })?;
            source.log();
            preview(&file, &config)
        }
    }
}

fn load_config(explicit: Option<PathBuf>) -> Result<(ImportConfig, ConfigSource)> {
    ConfigResolver::new(explicit)
        .resolve()
        .context("Failed to load configuration")
}

/// Console layer plus an optional plain-text file layer
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match &logging.file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

async fn run_import(args: ImportArgs) -> Result<()> {
    let (mut config, source) = load_config(args.config.clone())?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;
    init_tracing(&config.logging)?;

    info!("Starting sheetload {}", env!("CARGO_PKG_VERSION"));
    source.log();

    let files = CsvScanner::new()
        .scan(&args.dir)
        .with_context(|| format!("Failed to scan {}", args.dir.display()))?;
    if files.is_empty() {
        info!("No CSV files found in {}", args.dir.display());
        return Ok(());
    }
    info!("Found {} CSV files in {}", files.len(), args.dir.display());

    let tokens = match &args.access_token {
        Some(token) => StaticTokenProvider::new(token.clone()),
        None => StaticTokenProvider::from_env(),
    };
    let api = GoogleSheetsClient::new(tokens)?;
    let mut orchestrator = ImportOrchestrator::new(api, config, LogProgress)?;

    let report = orchestrator
        .run(ImportJob::new(args.target(), files))
        .await
        .context("Could not open the target spreadsheet")?;

    print_report(&report);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    if let Some(reason) = &report.aborted {
        bail!(
            "Import aborted after {} of {} files: {}",
            report.succeeded() + report.failed(),
            report.files.len(),
            reason
        );
    }
    if !report.all_succeeded() {
        bail!("{} of {} files failed", report.failed(), report.files.len());
    }
    Ok(())
}

fn print_report(report: &ImportReport) {
    println!();
    println!("Spreadsheet: {}", report.spreadsheet_url);
    println!(
        "Imported {} of {} files ({} failed)",
        report.succeeded(),
        report.files.len(),
        report.failed()
    );
    for (record, reason) in report.failures() {
        println!("  {}: {}", record.display_name(), reason);
    }
    if let Some(reason) = &report.aborted {
        println!("Run aborted: {}", reason);
        println!("{} files not attempted", report.pending());
    }
}

fn preview(file: &Path, config: &ImportConfig) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let decoded = EncodingResolver::from_config(config)?.resolve(&bytes)?;
    let grid = CsvNormalizer::default().normalize(&decoded.text)?;

    eprintln!(
        "{}: {}{}, {} rows x {} columns",
        file.display(),
        decoded.encoding_name(),
        if decoded.used_fallback { " (lossy fallback)" } else { "" },
        grid.row_count(),
        grid.width()
    );
    print!("{}", grid.to_delimited()?);
    Ok(())
}
