//
// header.rs
// Dicom-Ingest-rs
//
// Extracts the identifying and pixel-geometry attributes of one image from a header prefix,
// degrading to synthesized placeholders instead of failing.
//
// Thales Matheus Mendonça Santos - October 2026

use dicom::core::Tag;
use dicom_dictionary_std::tags;
use serde::Serialize;

use crate::dataset::{self, DataSet};
use crate::models::{
    generated_id, DicomAttributes, PixelModule, ANONYMOUS_PATIENT, OTHER_MODALITY, UNKNOWN_DATE,
    UNKNOWN_SERIES, UNKNOWN_STUDY,
};
use crate::validate::{check_pixel_module, PixelModuleStatus};

/// Upper bound on the frames one file may expand into.
pub const MAX_FRAME_COUNT: u32 = 65_536;

/// Everything learned from one header: attributes are always complete.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderParse {
    pub attributes: DicomAttributes,
    /// Set when the header could not be read at all and every field is synthesized.
    pub fallback: bool,
    pub warnings: Vec<String>,
    pub pixel_status: PixelModuleStatus,
}

/// Parse the attributes of one image from `bytes`.
///
/// `scanned_full` tells whether `bytes` is the whole file or only a header window;
/// it decides whether a missing Pixel Data element is fatal or merely deferred.
pub fn parse(bytes: &[u8], scanned_full: bool) -> HeaderParse {
    match dataset::walk(bytes) {
        Ok(data_set) => from_data_set(&data_set, scanned_full),
        Err(err) => {
            tracing::debug!("Header unreadable, using fallback attributes: {err}");
            let mut attributes = DicomAttributes::fallback();
            let report = check_pixel_module(&mut attributes.pixel, false, scanned_full);
            let mut warnings = vec![format!("Header unreadable ({err}); using placeholders")];
            warnings.extend(report.warnings);
            HeaderParse {
                attributes,
                fallback: true,
                warnings,
                pixel_status: report.status,
            }
        }
    }
}

pub fn from_data_set(data_set: &DataSet, scanned_full: bool) -> HeaderParse {
    let mut warnings = Vec::new();

    if data_set.truncated() && data_set.pixel_data().is_none() && scanned_full {
        warnings.push("Data set ends inside an element".to_string());
    }

    let series_id = data_set.string(tags::SERIES_INSTANCE_UID).unwrap_or_else(|| {
        warnings.push("Series Instance UID missing; generated one".to_string());
        generated_id("series")
    });
    let study_id = data_set.string(tags::STUDY_INSTANCE_UID).unwrap_or_else(|| {
        warnings.push("Study Instance UID missing; generated one".to_string());
        generated_id("study")
    });

    let series_number =
        integer_or_one(data_set, tags::SERIES_NUMBER, "Series Number", &mut warnings);
    let image_number =
        integer_or_one(data_set, tags::INSTANCE_NUMBER, "Instance Number", &mut warnings);
    let declared_frames =
        integer_or_one(data_set, tags::NUMBER_OF_FRAMES, "Number of Frames", &mut warnings)
            .max(1) as u32;

    let mut pixel = PixelModule {
        rows: dimension(data_set, tags::ROWS, "Rows", &mut warnings),
        columns: dimension(data_set, tags::COLUMNS, "Columns", &mut warnings),
        samples_per_pixel: positive(data_set.unsigned(tags::SAMPLES_PER_PIXEL)).map(as_u16),
        bits_allocated: positive(data_set.unsigned(tags::BITS_ALLOCATED)).map(as_u16),
        bits_stored: data_set.unsigned(tags::BITS_STORED).map(as_u16),
        pixel_representation: data_set.unsigned(tags::PIXEL_REPRESENTATION).map(as_u16),
        photometric_interpretation: data_set.string(tags::PHOTOMETRIC_INTERPRETATION),
        planar_configuration: data_set.unsigned(tags::PLANAR_CONFIGURATION).map(as_u16),
    };
    let report = check_pixel_module(&mut pixel, data_set.pixel_data().is_some(), scanned_full);
    warnings.extend(report.warnings);
    let frame_count = frame_count(data_set, &pixel, declared_frames, &mut warnings);

    let attributes = DicomAttributes {
        series_id,
        study_id,
        series_number,
        image_number,
        series_description: text_or(data_set, tags::SERIES_DESCRIPTION, UNKNOWN_SERIES),
        study_description: text_or(data_set, tags::STUDY_DESCRIPTION, UNKNOWN_STUDY),
        patient_name: data_set
            .string(tags::PATIENT_NAME)
            .map(|name| display_person_name(&name))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| ANONYMOUS_PATIENT.to_string()),
        study_date: text_or(data_set, tags::STUDY_DATE, UNKNOWN_DATE),
        modality: text_or(data_set, tags::MODALITY, OTHER_MODALITY),
        sop_instance_id: data_set.string(tags::SOP_INSTANCE_UID),
        frame_count,
        pixel,
    };

    HeaderParse {
        attributes,
        fallback: false,
        warnings,
        pixel_status: report.status,
    }
}

fn text_or(data_set: &DataSet, tag: Tag, default: &str) -> String {
    data_set.string(tag).unwrap_or_else(|| default.to_string())
}

fn integer_or_one(
    data_set: &DataSet,
    tag: Tag,
    label: &str,
    warnings: &mut Vec<String>,
) -> i32 {
    match data_set.integer_string(tag) {
        Some(Ok(value)) => value,
        Some(Err(raw)) => {
            warnings.push(format!("{label} {raw:?} is not a number; using 1"));
            1
        }
        None => 1,
    }
}

/// Rows and Columns are US; anything wider cannot describe a real frame.
fn dimension(data_set: &DataSet, tag: Tag, label: &str, warnings: &mut Vec<String>) -> Option<u32> {
    let value = positive(data_set.unsigned(tag))?;
    if value > u32::from(u16::MAX) {
        warnings.push(format!("{label} {value} is out of range; ignored"));
        return None;
    }
    Some(value)
}

/// Clamp the declared frame count to what the Pixel Data value can hold,
/// when its length is known, and to [`MAX_FRAME_COUNT`] otherwise.
fn frame_count(
    data_set: &DataSet,
    pixel: &PixelModule,
    declared: u32,
    warnings: &mut Vec<String>,
) -> u32 {
    let mut count = declared.min(MAX_FRAME_COUNT);
    let pixel_length = data_set.pixel_data().and_then(|location| location.length);
    if let (Some(length), Some(frame_len)) = (pixel_length, frame_length(pixel)) {
        let available = (u64::from(length) / frame_len).max(1);
        if u64::from(count) > available {
            count = available as u32;
        }
    }
    if count != declared {
        warnings.push(format!(
            "Number of Frames {declared} is more than the file can hold; using {count}"
        ));
    }
    count
}

/// Bytes per frame, or `None` when the geometry is incomplete or absurd.
fn frame_length(pixel: &PixelModule) -> Option<u64> {
    let bits = u64::from(pixel.rows?)
        .checked_mul(u64::from(pixel.columns?))?
        .checked_mul(u64::from(pixel.samples_per_pixel.unwrap_or(1)))?
        .checked_mul(u64::from(pixel.bits_allocated?))?;
    Some(bits.div_ceil(8)).filter(|len| *len > 0)
}

fn positive(value: Option<u32>) -> Option<u32> {
    value.filter(|v| *v > 0)
}

fn as_u16(value: u32) -> u16 {
    value.min(u32::from(u16::MAX)) as u16
}

/// Join the `Family^Given^Middle` components with spaces, in stored order.
fn display_person_name(raw: &str) -> String {
    // Only the alphabetic representation is shown.
    let alphabetic = raw.split('=').next().unwrap_or_default();
    alphabetic
        .split('^')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
