//
// error.rs
// Dicom-Ingest-rs
//
// Typed failure sites for the dataset walker, pixel decoding, and configuration loading.
//
// Thales Matheus Mendonça Santos - October 2026

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while reading the data set of a byte buffer.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Buffer does not look like a DICOM data set")]
    NotDicom,

    #[error("Unsupported transfer syntax {0}")]
    UnsupportedTransferSyntax(String),

    #[error("Invalid file meta group: {0}")]
    FileMeta(#[from] dicom_object::meta::Error),

    #[error("No element could be read: {0}")]
    Unreadable(#[from] dicom_parser::dataset::read::Error),
}

/// Reasons a preview could not be decoded from real pixel data.
#[derive(Debug, Error)]
pub enum PixelError {
    #[error("Failed to read the data set: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Pixel Data element not present")]
    MissingPixelData,

    #[error("Encapsulated (compressed) pixel data is not decoded")]
    Encapsulated,

    #[error("Missing pixel module attribute: {0}")]
    MissingAttribute(&'static str),

    #[error("Unsupported bits allocated: {0}")]
    UnsupportedBitDepth(u16),

    #[error("Frame of {rows}x{columns}x{samples} samples does not fit in memory")]
    FrameTooLarge { rows: u32, columns: u32, samples: u32 },

    #[error("Pixel data truncated: expected {expected} bytes, found {available}")]
    Truncated { expected: usize, available: usize },

    #[error("Degenerate intensity range ({0})")]
    DegenerateRange(f64),

    #[error("Failed to encode preview: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
