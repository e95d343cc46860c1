//
// lib.rs
// Dicom-Ingest-rs
//
// Exposes the crate's modules and re-exports the ingestion entry points for both binary and library consumers.
//
// Thales Matheus Mendonça Santos - October 2026

// Public surface of the library: the ingestion pipeline stages plus the CLI and web shells around them.
pub mod aggregate;
pub mod batch;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod dump;
pub mod error;
pub mod header;
pub mod models;
pub mod session;
pub mod source;
pub mod thumbnail;
pub mod validate;
pub mod web;

pub use cli::{run as run_cli, Cli, Commands};
pub use config::{IngestConfig, ValidationPolicy};
pub use models::{DicomAttributes, ImageRecord, IngestReport, SeriesRecord, Thumbnail};
pub use session::Session;
pub use source::RawFile;
