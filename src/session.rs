//
// session.rs
// Dicom-Ingest-rs
//
// Owns the image records of one user session together with their blob handles; series and
// statistics are projections recomputed on every read.
//
// Thales Matheus Mendonça Santos - October 2026

use serde::Serialize;
use tracing::info;

use crate::aggregate;
use crate::batch;
use crate::config::IngestConfig;
use crate::models::{Diagnostic, ImageRecord, SeriesRecord, SessionStatistics};
use crate::source::{BlobRegistry, RawFile};
use crate::thumbnail::{self, ThumbnailOptions};

/// What one `ingest` call added to the session.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub images_added: usize,
    pub skipped: usize,
    pub failed: usize,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Default)]
pub struct Session {
    config: IngestConfig,
    images: Vec<ImageRecord>,
    diagnostics: Vec<Diagnostic>,
    blobs: BlobRegistry,
}

impl Session {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            images: Vec::new(),
            diagnostics: Vec::new(),
            blobs: BlobRegistry::default(),
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Parse `files` and append their image records after the ones already held.
    pub async fn ingest(&mut self, files: &[RawFile]) -> IngestSummary {
        let report = batch::ingest(files, &self.config, &mut self.blobs).await;
        let summary = IngestSummary {
            images_added: report.images.len(),
            skipped: report.skipped,
            failed: report.failed,
            diagnostics: report.diagnostics.clone(),
        };
        self.images.extend(report.images);
        self.diagnostics.extend(report.diagnostics);
        summary
    }

    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Series rebuilt from the current records, without thumbnails.
    pub fn series(&self) -> Vec<SeriesRecord> {
        aggregate::aggregate(&self.images)
    }

    pub fn statistics(&self) -> SessionStatistics {
        aggregate::statistics(&self.series())
    }

    /// Series rebuilt from the current records, each with its preview.
    pub async fn series_with_thumbnails(&self) -> Vec<SeriesRecord> {
        let mut series = self.series();
        let options = ThumbnailOptions::from(&self.config);
        thumbnail::render_series_thumbnails(
            &mut series,
            &self.images,
            &options,
            self.config.batch_size,
        )
        .await;
        series
    }

    /// Ordered image ids of one series, for a stack viewer.
    pub fn image_ids(&self, series_id: &str) -> Option<Vec<String>> {
        self.series()
            .into_iter()
            .find(|s| s.series_id == series_id)
            .map(|s| s.ordered_image_ids)
    }

    pub fn resolve_blob(&self, handle: &str) -> Option<&RawFile> {
        self.blobs.resolve(handle)
    }

    pub fn live_handles(&self) -> usize {
        self.blobs.len()
    }

    /// Drop every record and revoke the blob handles that addressed them.
    pub fn clear(&mut self) -> usize {
        let revoked = self.blobs.revoke_all();
        let released = self.images.len();
        self.images.clear();
        self.diagnostics.clear();
        info!("Session cleared: {released} image(s), {revoked} handle(s) revoked");
        revoked
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.blobs.is_empty() {
            self.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiagnosticKind;

    #[tokio::test]
    async fn rejected_text_file_is_counted_as_skipped() {
        let mut session = Session::default();
        let files = vec![RawFile::from_bytes(
            "notes.txt",
            Some("text/plain".to_string()),
            b"hello".to_vec(),
        )];
        let summary = session.ingest(&files).await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.images_added, 0);
        assert_eq!(summary.diagnostics[0].kind, DiagnosticKind::Skipped);
        assert!(session.series().is_empty());
        assert_eq!(session.statistics(), SessionStatistics::default());
    }

    #[tokio::test]
    async fn clear_revokes_handles() {
        let mut session = Session::new(IngestConfig {
            policy: crate::config::ValidationPolicy::Lenient,
            ..IngestConfig::default()
        });
        let files = vec![RawFile::from_bytes("IM1", None, vec![0xAB; 64])];
        session.ingest(&files).await;
        assert_eq!(session.live_handles(), 1);

        assert_eq!(session.clear(), 1);
        assert!(session.is_empty());
        assert_eq!(session.live_handles(), 0);
    }
}
