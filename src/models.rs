//
// models.rs
// Dicom-Ingest-rs
//
// Defines the typed records that flow through ingestion: per-image attributes, image records,
// series projections, thumbnails, and diagnostics.
//
// Thales Matheus Mendonça Santos - October 2026

use std::collections::BTreeSet;

use base64::Engine;
use serde::{Serialize, Serializer};

use crate::source::RawFile;

pub const UNKNOWN_SERIES: &str = "Unknown Series";
pub const UNKNOWN_STUDY: &str = "Unknown Study";
pub const ANONYMOUS_PATIENT: &str = "Anonymous Patient";
pub const UNKNOWN_DATE: &str = "Unknown Date";
pub const OTHER_MODALITY: &str = "OT";

/// Image pixel module facts. Absent attributes stay `None` so validation can tell
/// "missing" apart from a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PixelModule {
    pub rows: Option<u32>,
    pub columns: Option<u32>,
    pub samples_per_pixel: Option<u16>,
    pub bits_allocated: Option<u16>,
    pub bits_stored: Option<u16>,
    /// 0 = unsigned, 1 = two's complement.
    pub pixel_representation: Option<u16>,
    pub photometric_interpretation: Option<String>,
    pub planar_configuration: Option<u16>,
}

impl PixelModule {
    pub fn is_signed(&self) -> bool {
        self.pixel_representation == Some(1)
    }

    /// MONOCHROME1 renders higher values darker.
    pub fn is_inverted(&self) -> bool {
        self.photometric_interpretation.as_deref() == Some("MONOCHROME1")
    }
}

/// Identifying and pixel-geometry attributes of one image, parsed or synthesized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DicomAttributes {
    pub series_id: String,
    pub study_id: String,
    pub series_number: i32,
    pub image_number: i32,
    pub series_description: String,
    pub study_description: String,
    pub patient_name: String,
    pub study_date: String,
    pub modality: String,
    pub sop_instance_id: Option<String>,
    pub frame_count: u32,
    pub pixel: PixelModule,
}

impl DicomAttributes {
    /// Attributes used when nothing usable could be read from the header.
    pub fn fallback() -> Self {
        Self {
            series_id: generated_id("series"),
            study_id: generated_id("study"),
            series_number: 1,
            image_number: 1,
            series_description: UNKNOWN_SERIES.to_string(),
            study_description: UNKNOWN_STUDY.to_string(),
            patient_name: ANONYMOUS_PATIENT.to_string(),
            study_date: UNKNOWN_DATE.to_string(),
            modality: OTHER_MODALITY.to_string(),
            sop_instance_id: None,
            frame_count: 1,
            pixel: PixelModule::default(),
        }
    }
}

/// `{prefix}-{unix millis}-{random suffix}`, unique enough within a session.
pub fn generated_id(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, millis, &suffix[..8])
}

/// One addressable image: a whole file, or one frame of a multi-frame file.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    #[serde(rename = "file", serialize_with = "serialize_file_name")]
    pub source: RawFile,
    pub image_id: String,
    pub frame_index: Option<u32>,
    pub attributes: DicomAttributes,
    /// False for metadata-only records kept under the lenient policy.
    pub pixel_usable: bool,
}

fn serialize_file_name<S: Serializer>(file: &RawFile, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(file.name())
}

/// Read-only projection of all image records sharing a series id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRecord {
    pub series_id: String,
    pub study_id: String,
    pub series_number: i32,
    pub series_description: String,
    pub study_description: String,
    pub patient_name: String,
    pub study_date: String,
    pub modality: String,
    pub image_count: usize,
    pub ordered_image_ids: Vec<String>,
    pub representative_image_id: String,
    /// Fields whose value differs between images of this series. The shown value
    /// is always the first ingested image's.
    pub metadata_conflicts: Vec<String>,
    pub thumbnail: Option<Thumbnail>,
}

/// Aggregates over every series of a session, recomputed per query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatistics {
    pub series_count: usize,
    pub total_images: usize,
    pub modalities: BTreeSet<String>,
}

/// A self-contained preview: decoded pixels as PNG, or the SVG placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnail {
    Png(Vec<u8>),
    Svg(String),
}

impl Thumbnail {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Thumbnail::Png(_) => "image/png",
            Thumbnail::Svg(_) => "image/svg+xml",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Thumbnail::Png(_) => "png",
            Thumbnail::Svg(_) => "svg",
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Thumbnail::Png(bytes) => bytes,
            Thumbnail::Svg(text) => text.as_bytes(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Thumbnail::Svg(_))
    }

    pub fn data_url(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(self.as_bytes());
        format!("data:{};base64,{}", self.mime_type(), encoded)
    }
}

impl Serialize for Thumbnail {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.data_url())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// Processing continued with synthesized values.
    Warning,
    /// Not a DICOM candidate.
    Skipped,
    /// Parsed, but unusable under the active validation policy.
    Rejected,
    /// Could not be read.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub file: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(file: &str, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of one ingestion call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub images: Vec<ImageRecord>,
    /// Files that were not DICOM candidates.
    pub skipped: usize,
    /// Candidates that could not be read or were rejected.
    pub failed: usize,
    pub diagnostics: Vec<Diagnostic>,
}
