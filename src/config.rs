//
// config.rs
// Dicom-Ingest-rs
//
// Ingestion settings: defaults, optional JSON config file, and validation of user overrides.
//
// Thales Matheus Mendonça Santos - October 2026

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Bytes read from each file before the header is parsed.
pub const DEFAULT_HEADER_WINDOW: usize = 64 * 1024;
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 120;
pub const DEFAULT_SAMPLE_LIMIT: usize = 10_000;
/// Largest multipart request body the web API accepts.
pub const DEFAULT_UPLOAD_LIMIT: usize = 512 * 1024 * 1024;

// Preamble plus the "DICM" magic.
const MIN_HEADER_WINDOW: usize = 132;

/// What to do with a file whose pixel module cannot support an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Exclude the file from the batch result.
    #[default]
    Strict,
    /// Keep it as a metadata-only record that never reaches the pixel decoder.
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub header_window: usize,
    pub policy: ValidationPolicy,
    pub thumbnail_size: u32,
    pub sample_limit: usize,
    pub upload_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            header_window: DEFAULT_HEADER_WINDOW,
            policy: ValidationPolicy::Strict,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            upload_limit: DEFAULT_UPLOAD_LIMIT,
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.header_window < MIN_HEADER_WINDOW {
            return Err(ConfigError::Invalid {
                field: "header_window",
                reason: format!("must be at least {MIN_HEADER_WINDOW} bytes"),
            });
        }
        if self.thumbnail_size == 0 {
            return Err(ConfigError::Invalid {
                field: "thumbnail_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.sample_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "sample_limit",
                reason: "must be at least 1".into(),
            });
        }
        if self.upload_limit < self.header_window {
            return Err(ConfigError::Invalid {
                field: "upload_limit",
                reason: "must not be smaller than header_window".into(),
            });
        }
        Ok(())
    }
}

/// Load settings from an optional JSON file; missing keys keep their defaults.
pub fn load(path: Option<&Path>) -> Result<IngestConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        }
        None => IngestConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("ingest.json");
        std::fs::write(&path, r#"{ "batch_size": 2, "policy": "lenient" }"#).expect("write");

        let config = load(Some(&path)).expect("load");
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.policy, ValidationPolicy::Lenient);
        assert_eq!(config.header_window, DEFAULT_HEADER_WINDOW);
        assert_eq!(config.thumbnail_size, DEFAULT_THUMBNAIL_SIZE);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = IngestConfig {
            batch_size: 0,
            ..IngestConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "batch_size",
                ..
            })
        ));
    }

    #[test]
    fn tiny_header_window_is_rejected() {
        let config = IngestConfig {
            header_window: 16,
            ..IngestConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn upload_limit_below_header_window_is_rejected() {
        let config = IngestConfig {
            upload_limit: 1024,
            ..IngestConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "upload_limit",
                ..
            })
        ));
    }
}
