//
// batch.rs
// Dicom-Ingest-rs
//
// Drives header parsing over a list of files in fixed-size concurrent batches, expanding
// multi-frame files into one image record per frame while keeping submission order.
//
// Thales Matheus Mendonça Santos - October 2026

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{IngestConfig, ValidationPolicy};
use crate::header::{self, HeaderParse};
use crate::models::{Diagnostic, DiagnosticKind, DicomAttributes, ImageRecord, IngestReport};
use crate::source::{self, BlobRegistry, RawFile};
use crate::validate::PixelModuleStatus;

/// Ingest `files` in submission order.
///
/// Candidates are parsed `config.batch_size` at a time; a batch is fully settled
/// before its results are appended and the next one starts. No single file can
/// fail the call: problems end up in the report's diagnostics.
pub async fn ingest(
    files: &[RawFile],
    config: &IngestConfig,
    registry: &mut BlobRegistry,
) -> IngestReport {
    let mut report = IngestReport::default();

    let mut candidates = Vec::with_capacity(files.len());
    for file in files {
        if file.is_dicom_candidate() {
            candidates.push(file);
        } else {
            info!("Skipping {}: not a DICOM candidate", file.name());
            report.skipped += 1;
            report.diagnostics.push(Diagnostic::new(
                file.name(),
                DiagnosticKind::Skipped,
                format!(
                    "Unrecognised extension and content type {}",
                    file.content_type().unwrap_or("(none)")
                ),
            ));
        }
    }

    let batch_size = config.batch_size.max(1);
    let batch_count = candidates.len().div_ceil(batch_size);
    for (index, batch) in candidates.chunks(batch_size).enumerate() {
        // join_all yields results in the order of its inputs, whatever finishes first.
        let outcomes = join_all(batch.iter().map(|file| inspect(file, config))).await;
        debug!("Settled batch {}/{}", index + 1, batch_count);

        for (file, outcome) in batch.iter().zip(outcomes) {
            accept(file, outcome, config.policy, registry, &mut report);
        }
    }

    info!(
        "Ingested {} image(s) from {} file(s): {} skipped, {} failed",
        report.images.len(),
        files.len(),
        report.skipped,
        report.failed
    );
    report
}

/// Read the header window of one file and parse it.
async fn inspect(file: &RawFile, config: &IngestConfig) -> io::Result<HeaderParse> {
    let prefix = file.read_prefix(config.header_window).await?;
    let scanned_full = prefix.len() as u64 >= file.len();
    Ok(header::parse(&prefix, scanned_full))
}

fn accept(
    file: &RawFile,
    outcome: io::Result<HeaderParse>,
    policy: ValidationPolicy,
    registry: &mut BlobRegistry,
    report: &mut IngestReport,
) {
    let parse = match outcome {
        Ok(parse) => parse,
        Err(err) => {
            warn!("Failed to read {}: {}", file.name(), err);
            report.failed += 1;
            report.diagnostics.push(Diagnostic::new(
                file.name(),
                DiagnosticKind::Failed,
                format!("Read error: {err}"),
            ));
            return;
        }
    };

    for warning in &parse.warnings {
        debug!("{}: {}", file.name(), warning);
        report.diagnostics.push(Diagnostic::new(
            file.name(),
            DiagnosticKind::Warning,
            warning.clone(),
        ));
    }

    let pixel_usable = match (&parse.pixel_status, policy) {
        (PixelModuleStatus::Invalid(reasons), ValidationPolicy::Strict) => {
            warn!("Rejecting {}: {}", file.name(), reasons.join("; "));
            report.failed += 1;
            report.diagnostics.push(Diagnostic::new(
                file.name(),
                DiagnosticKind::Rejected,
                reasons.join("; "),
            ));
            return;
        }
        (PixelModuleStatus::Invalid(reasons), ValidationPolicy::Lenient) => {
            report.diagnostics.push(Diagnostic::new(
                file.name(),
                DiagnosticKind::Warning,
                format!("Kept as metadata-only record: {}", reasons.join("; ")),
            ));
            false
        }
        _ => true,
    };

    let handle = registry.register(file);
    report
        .images
        .extend(expand_frames(file, &handle, parse.attributes, pixel_usable));
}

/// One record per frame for multi-frame objects, otherwise a single record.
///
/// Frame `i` gets `image_number = base + i` so the frames sort contiguously.
pub fn expand_frames(
    file: &RawFile,
    handle: &str,
    attributes: DicomAttributes,
    pixel_usable: bool,
) -> Vec<ImageRecord> {
    if attributes.frame_count <= 1 {
        return vec![ImageRecord {
            source: file.clone(),
            image_id: source::image_id(handle, None),
            frame_index: None,
            attributes,
            pixel_usable,
        }];
    }

    let base = attributes.image_number;
    (0..attributes.frame_count)
        .map(|frame| {
            let mut frame_attributes = attributes.clone();
            frame_attributes.image_number = base.saturating_add(frame as i32);
            ImageRecord {
                source: file.clone(),
                image_id: source::image_id(handle, Some(frame)),
                frame_index: Some(frame),
                attributes: frame_attributes,
                pixel_usable,
            }
        })
        .collect()
}

/// Expand files and directories (recursively, in file name order) into file handles.
pub async fn collect_files(paths: &[PathBuf]) -> Result<Vec<RawFile>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let entries = WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file());
            for entry in entries {
                files.push(
                    RawFile::from_path(entry.path())
                        .await
                        .with_context(|| format!("Failed to open {:?}", entry.path()))?,
                );
            }
        } else {
            files.push(
                RawFile::from_path(path)
                    .await
                    .with_context(|| format!("Failed to open {:?}", path))?,
            );
        }
    }
    Ok(files)
}
