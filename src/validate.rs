//
// validate.rs
// Dicom-Ingest-rs
//
// Decides whether a parsed header can support pixel-level processing.
//
// Thales Matheus Mendonça Santos - October 2026

use serde::Serialize;

use crate::models::PixelModule;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reasons", rename_all = "lowercase")]
pub enum PixelModuleStatus {
    Valid,
    /// Pixel Data lies beyond the header window; decided when the full file is read.
    Deferred,
    Invalid(Vec<String>),
}

impl PixelModuleStatus {
    pub fn is_usable(&self) -> bool {
        !matches!(self, PixelModuleStatus::Invalid(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelModuleReport {
    pub status: PixelModuleStatus,
    pub warnings: Vec<String>,
}

/// Check the pixel module of a header.
///
/// Rows, columns and bits allocated are required. Samples per pixel falls back to 1
/// with a warning (the default is applied to `pixel` in place). A missing Pixel Data
/// element only counts against the file once the whole file has been scanned.
pub fn check_pixel_module(
    pixel: &mut PixelModule,
    pixel_data_found: bool,
    scanned_full: bool,
) -> PixelModuleReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if pixel.rows.is_none() {
        errors.push("Rows (0028,0010) missing".to_string());
    }
    if pixel.columns.is_none() {
        errors.push("Columns (0028,0011) missing".to_string());
    }
    if pixel.bits_allocated.is_none() {
        errors.push("Bits Allocated (0028,0100) missing".to_string());
    }
    if pixel.samples_per_pixel.is_none() {
        warnings.push("Samples per Pixel (0028,0002) missing, assuming 1".to_string());
        pixel.samples_per_pixel = Some(1);
    }

    let status = if !errors.is_empty() {
        if !pixel_data_found && scanned_full {
            errors.push("Pixel Data (7FE0,0010) not present".to_string());
        }
        PixelModuleStatus::Invalid(errors)
    } else if pixel_data_found {
        PixelModuleStatus::Valid
    } else if scanned_full {
        PixelModuleStatus::Invalid(vec![
            "Pixel Data (7FE0,0010) not present: no usable image".to_string()
        ])
    } else {
        PixelModuleStatus::Deferred
    };

    PixelModuleReport { status, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> PixelModule {
        PixelModule {
            rows: Some(4),
            columns: Some(4),
            samples_per_pixel: Some(1),
            bits_allocated: Some(8),
            ..PixelModule::default()
        }
    }

    #[test]
    fn complete_module_with_pixels_is_valid() {
        let report = check_pixel_module(&mut complete(), true, true);
        assert_eq!(report.status, PixelModuleStatus::Valid);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn missing_pixel_data_in_prefix_is_deferred() {
        let report = check_pixel_module(&mut complete(), false, false);
        assert_eq!(report.status, PixelModuleStatus::Deferred);
        assert!(report.status.is_usable());
    }

    #[test]
    fn missing_pixel_data_after_full_scan_is_fatal() {
        let report = check_pixel_module(&mut complete(), false, true);
        assert!(!report.status.is_usable());
    }

    #[test]
    fn missing_geometry_is_fatal() {
        let mut pixel = PixelModule {
            rows: None,
            bits_allocated: None,
            ..complete()
        };
        let report = check_pixel_module(&mut pixel, true, true);
        match report.status {
            PixelModuleStatus::Invalid(reasons) => assert_eq!(reasons.len(), 2),
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn missing_samples_per_pixel_only_warns() {
        let mut pixel = PixelModule {
            samples_per_pixel: None,
            ..complete()
        };
        let report = check_pixel_module(&mut pixel, true, true);
        assert_eq!(report.status, PixelModuleStatus::Valid);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(pixel.samples_per_pixel, Some(1));
    }
}
