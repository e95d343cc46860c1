//
// main.rs
// Dicom-Ingest-rs
//
// Tokio entry point that hands off execution to the CLI layer so commands are resolved asynchronously.
//
// Thales Matheus Mendonça Santos - October 2026

use dicom_ingest::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tokio runtime entry point: delegate logging setup, argument parsing and dispatching to the CLI module.
    cli::run().await
}
