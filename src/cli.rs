//
// cli.rs
// Dicom-Ingest-rs
//
// Defines the CLI surface with Clap and dispatches user-selected commands to the corresponding modules.
//
// Thales Matheus Mendonça Santos - October 2026

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::config::{self, IngestConfig, ValidationPolicy};
use crate::models::{DiagnosticKind, SeriesRecord};
use crate::session::{IngestSummary, Session};
use crate::source::RawFile;
use crate::{batch, dataset, dump, header, web};

/// Command-line interface glue code: defines the available verbs and dispatches to modules.
#[derive(Parser)]
#[command(name = "dicom-ingest")]
#[command(about = "Group DICOM files into series and render previews", long_about = None)]
pub struct Cli {
    /// JSON file with ingestion settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the ingestion settings.
#[derive(Args, Debug, Clone, Default)]
pub struct IngestArgs {
    /// Files parsed concurrently per batch
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Bytes read from each file before parsing its header
    #[arg(long)]
    pub header_window: Option<usize>,
    /// Keep files without a usable pixel module as metadata-only records
    #[arg(long)]
    pub lenient: bool,
}

impl IngestArgs {
    fn apply(&self, config: &mut IngestConfig) {
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(header_window) = self.header_window {
            config.header_window = header_window;
        }
        if self.lenient {
            config.policy = ValidationPolicy::Lenient;
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest files or directories and list the resulting series
    Scan {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        ingest: IngestArgs,
        /// Print series, statistics and diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write one preview image per series
    Thumbnails {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// Preview width and height in pixels
        #[arg(long)]
        size: Option<u32>,
        #[command(flatten)]
        ingest: IngestArgs,
    },
    /// Show the attributes parsed from one file's header
    Info {
        file: PathBuf,
        /// List every element found in the header window
        #[arg(long)]
        elements: bool,
        #[arg(long, default_value_t = 4)]
        max_depth: usize,
        #[arg(long, default_value_t = 64)]
        max_value_len: usize,
    },
    /// Start the web server
    Web {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
        #[command(flatten)]
        ingest: IngestArgs,
    },
}

pub async fn run() -> Result<()> {
    // Parse the raw CLI arguments once and dispatch to a subcommand handler.
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = config::load(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Commands::Scan {
            paths,
            ingest,
            json,
        } => {
            ingest.apply(&mut config);
            config.validate()?;
            scan(&paths, config, json).await?
        }
        Commands::Thumbnails {
            paths,
            output,
            size,
            ingest,
        } => {
            ingest.apply(&mut config);
            if let Some(size) = size {
                config.thumbnail_size = size;
            }
            config.validate()?;
            write_thumbnails(&paths, &output, config).await?
        }
        Commands::Info {
            file,
            elements,
            max_depth,
            max_value_len,
        } => print_info(&file, &config, elements, max_depth, max_value_len).await?,
        Commands::Web { host, port, ingest } => {
            ingest.apply(&mut config);
            config.validate()?;
            web::start_server(&host, port, config).await?
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "dicom_ingest=debug"
    } else {
        "dicom_ingest=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("[ERROR] Could not set up global logging subscriber: {e}");
    }
}

async fn ingest_paths(paths: &[PathBuf], config: IngestConfig) -> Result<(Session, IngestSummary)> {
    let files = batch::collect_files(paths).await?;
    let mut session = Session::new(config);
    let summary = session.ingest(&files).await;
    Ok((session, summary))
}

async fn scan(paths: &[PathBuf], config: IngestConfig, as_json: bool) -> Result<()> {
    let (session, summary) = ingest_paths(paths, config).await?;
    let series = session.series();
    let statistics = session.statistics();

    if as_json {
        let value = json!({
            "summary": summary,
            "statistics": statistics,
            "series": series,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if series.is_empty() {
        println!("No series found.");
    }
    for record in &series {
        print_series(record);
    }

    println!("{}", "=".repeat(80));
    println!(
        "{} series | {} image(s) | modalities: {}",
        statistics.series_count,
        statistics.total_images,
        statistics
            .modalities
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "{} file(s) skipped, {} failed",
        summary.skipped, summary.failed
    );
    for diagnostic in summary
        .diagnostics
        .iter()
        .filter(|d| d.kind != DiagnosticKind::Warning)
    {
        println!("  {:?} {}: {}", diagnostic.kind, diagnostic.file, diagnostic.message);
    }

    Ok(())
}

fn print_series(record: &SeriesRecord) {
    println!(
        "#{:<4} {:<3} {:<32} {:>5} image(s) | {} | {}",
        record.series_number,
        record.modality,
        record.series_description,
        record.image_count,
        record.patient_name,
        record.study_date
    );
    if !record.metadata_conflicts.is_empty() {
        println!(
            "      diverging within series: {}",
            record.metadata_conflicts.join(", ")
        );
    }
}

async fn write_thumbnails(paths: &[PathBuf], output: &Path, config: IngestConfig) -> Result<()> {
    let (session, _) = ingest_paths(paths, config).await?;
    std::fs::create_dir_all(output).context("Failed to create output directory")?;

    let series = session.series_with_thumbnails().await;
    for (index, record) in series.iter().enumerate() {
        let Some(thumbnail) = &record.thumbnail else {
            continue;
        };
        let stem = sanitize_filename(&record.series_description);
        let name = format!(
            "{:03}_{}_{}.{}",
            index + 1,
            record.series_number,
            if stem.is_empty() { "series" } else { &stem },
            thumbnail.extension()
        );
        let path = output.join(name);
        std::fs::write(&path, thumbnail.as_bytes())
            .with_context(|| format!("Failed to save preview to {:?}", path))?;
        println!(
            "Saved {} preview for series {} to {:?}",
            if thumbnail.is_placeholder() { "placeholder" } else { "decoded" },
            record.series_number,
            path
        );
    }

    Ok(())
}

async fn print_info(
    path: &Path,
    config: &IngestConfig,
    elements: bool,
    max_depth: usize,
    max_value_len: usize,
) -> Result<()> {
    let file = RawFile::from_path(path)
        .await
        .with_context(|| format!("Failed to open {:?}", path))?;
    let prefix = file.read_prefix(config.header_window).await?;
    let scanned_full = prefix.len() as u64 >= file.len();
    let parse = header::parse(&prefix, scanned_full);
    let attrs = &parse.attributes;

    println!("{}", "=".repeat(80));
    println!("DICOM Header: {}", file.name());
    println!("{}", "=".repeat(80));

    println!("PATIENT");
    println!("  Name: {}", attrs.patient_name);

    println!("\nSTUDY");
    println!("  ID:          {}", attrs.study_id);
    println!("  Date:        {}", attrs.study_date);
    println!("  Description: {}", attrs.study_description);

    println!("\nSERIES");
    println!("  ID:          {}", attrs.series_id);
    println!("  Number:      {}", attrs.series_number);
    println!("  Description: {}", attrs.series_description);
    println!("  Modality:    {}", attrs.modality);

    println!("\nIMAGE");
    println!(
        "  SOP Instance: {}",
        attrs.sop_instance_id.as_deref().unwrap_or("N/A")
    );
    println!("  Number:       {}", attrs.image_number);
    println!("  Frames:       {}", attrs.frame_count);
    println!(
        "  Geometry:     {} x {} | {} sample(s) | {} bits allocated",
        display(attrs.pixel.rows),
        display(attrs.pixel.columns),
        display(attrs.pixel.samples_per_pixel),
        display(attrs.pixel.bits_allocated)
    );
    println!("  Pixel module: {:?}", parse.pixel_status);

    if !parse.warnings.is_empty() {
        println!("\nWARNINGS");
        for warning in &parse.warnings {
            println!("  {}", warning);
        }
    }

    if elements {
        println!("\nELEMENTS ({} of {} bytes read):", prefix.len(), file.len());
        match dataset::walk(&prefix) {
            Ok(data_set) => print!("{}", dump::dump_to_string(&data_set, max_depth, max_value_len)),
            Err(err) => println!("  {}", err),
        }
    }

    Ok(())
}

fn display<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
}

fn sanitize_filename(input: &str) -> String {
    // Keep only ASCII word characters and a few safe separators to avoid filesystem surprises.
    input
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_dangerous_characters() {
        let cleaned = sanitize_filename("../AX T1 post/contrast");
        assert_eq!(cleaned, "AX_T1_postcontrast");
    }

    #[test]
    fn overrides_apply_on_top_of_config() {
        let mut config = IngestConfig::default();
        let args = IngestArgs {
            batch_size: Some(1),
            header_window: None,
            lenient: true,
        };
        args.apply(&mut config);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.header_window, config::DEFAULT_HEADER_WINDOW);
        assert_eq!(config.policy, ValidationPolicy::Lenient);
    }

    #[test]
    fn cli_parses_scan() {
        let cli = Cli::try_parse_from(["dicom-ingest", "scan", "a", "b", "--batch-size", "2", "--json"])
            .expect("parse");
        match cli.command {
            Commands::Scan { paths, ingest, json } => {
                assert_eq!(paths.len(), 2);
                assert_eq!(ingest.batch_size, Some(2));
                assert!(json);
            }
            _ => panic!("expected scan"),
        }
    }
}
