//
// thumbnail.rs
// Dicom-Ingest-rs
//
// Decodes the first frame of an uncompressed image straight from its Pixel Data bytes, windows it
// into a fixed-size grayscale PNG, and falls back to a modality-colored SVG when that is impossible.
//
// Thales Matheus Mendonça Santos - October 2026

use std::collections::HashMap;
use std::io::Cursor;

use futures::future::join_all;
use image::{ImageFormat, Rgba, RgbaImage};
use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

use crate::config::IngestConfig;
use crate::dataset;
use crate::error::PixelError;
use crate::header;
use crate::models::{ImageRecord, SeriesRecord, Thumbnail};

const DESCRIPTION_CHARS: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailOptions {
    /// Width and height of the preview.
    pub size: u32,
    /// Upper bound on pixels inspected when estimating the intensity range.
    pub sample_limit: usize,
}

impl From<&IngestConfig> for ThumbnailOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            size: config.thumbnail_size.max(1),
            sample_limit: config.sample_limit.max(1),
        }
    }
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

/// Render a preview for `record` from the full file `bytes`. Never fails: any
/// decoding problem yields the placeholder.
pub fn render_thumbnail(
    record: &ImageRecord,
    bytes: &[u8],
    options: &ThumbnailOptions,
) -> Thumbnail {
    let attributes = &record.attributes;
    if !record.pixel_usable {
        return placeholder(&attributes.modality, &attributes.series_description, options.size);
    }

    match decode_preview(bytes, options).and_then(|preview| encode_png(&preview)) {
        Ok(png) => Thumbnail::Png(png),
        Err(err) => {
            debug!(
                "Preview for {} falls back to placeholder: {}",
                record.source.name(),
                err
            );
            placeholder(&attributes.modality, &attributes.series_description, options.size)
        }
    }
}

/// Decode the first frame and window it into a `size × size` grayscale image.
pub fn decode_preview(bytes: &[u8], options: &ThumbnailOptions) -> Result<RgbaImage, PixelError> {
    let data_set = dataset::read_with_pixel_data(bytes)?;
    let location = data_set.pixel_data().ok_or(PixelError::MissingPixelData)?;
    if location.length.is_none() {
        return Err(PixelError::Encapsulated);
    }

    let pixel = header::from_data_set(&data_set, true).attributes.pixel;
    let rows = pixel.rows.ok_or(PixelError::MissingAttribute("Rows"))? as usize;
    let columns = pixel.columns.ok_or(PixelError::MissingAttribute("Columns"))? as usize;
    let bits_allocated = pixel
        .bits_allocated
        .ok_or(PixelError::MissingAttribute("Bits Allocated"))?;
    if bits_allocated != 8 && bits_allocated != 16 {
        return Err(PixelError::UnsupportedBitDepth(bits_allocated));
    }
    let samples = usize::from(pixel.samples_per_pixel.unwrap_or(1).max(1));

    // Only the first frame is decoded, even when more frames follow.
    let bytes_per_sample = usize::from(bits_allocated).div_ceil(8);
    let frame_len = frame_length(rows, columns, samples, bytes_per_sample)?;
    let raw = data_set.pixel_bytes().unwrap_or_default();
    if raw.len() < frame_len || frame_len == 0 {
        return Err(PixelError::Truncated {
            expected: frame_len,
            available: raw.len(),
        });
    }

    let layout = FrameLayout {
        rows,
        columns,
        samples,
        bits_allocated,
        signed: pixel.is_signed(),
        planar: pixel.planar_configuration == Some(1),
    };
    let grid = intensity_grid(&raw[..frame_len], &layout);

    let (min, max) = sampled_range(&grid, options.sample_limit);
    let width = max - min;
    if !(width.is_finite() && width > 0.0) {
        return Err(PixelError::DegenerateRange(min));
    }

    Ok(window(&grid, min, max, pixel.is_inverted(), options.size))
}

fn frame_length(
    rows: usize,
    columns: usize,
    samples: usize,
    bytes_per_sample: usize,
) -> Result<usize, PixelError> {
    rows.checked_mul(columns)
        .and_then(|n| n.checked_mul(samples))
        .and_then(|n| n.checked_mul(bytes_per_sample))
        .ok_or(PixelError::FrameTooLarge {
            rows: rows as u32,
            columns: columns as u32,
            samples: samples as u32,
        })
}

struct FrameLayout {
    rows: usize,
    columns: usize,
    samples: usize,
    bits_allocated: u16,
    signed: bool,
    planar: bool,
}

impl FrameLayout {
    fn sample(&self, frame: &[u8], index: usize) -> f64 {
        match (self.bits_allocated, self.signed) {
            (8, false) => f64::from(frame[index]),
            (8, true) => f64::from(frame[index] as i8),
            (_, false) => f64::from(u16::from_le_bytes([frame[2 * index], frame[2 * index + 1]])),
            (_, true) => f64::from(i16::from_le_bytes([frame[2 * index], frame[2 * index + 1]])),
        }
    }
}

/// One intensity per pixel; multi-sample pixels average their samples.
fn intensity_grid(frame: &[u8], layout: &FrameLayout) -> Array2<f64> {
    let plane = layout.rows * layout.columns;
    Array2::from_shape_fn((layout.rows, layout.columns), |(row, column)| {
        let pixel = row * layout.columns + column;
        let total: f64 = (0..layout.samples)
            .map(|s| {
                let index = if layout.planar {
                    s * plane + pixel
                } else {
                    pixel * layout.samples + s
                };
                layout.sample(frame, index)
            })
            .sum();
        total / layout.samples as f64
    })
}

/// Approximate min/max from at most about `limit` evenly strided pixels.
fn sampled_range(grid: &Array2<f64>, limit: usize) -> (f64, f64) {
    let stride = grid.len().div_ceil(limit.max(1)).max(1);
    grid.iter()
        .step_by(stride)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &v| {
            (min.min(v), max.max(v))
        })
}

/// Nearest-neighbour resample into `size × size`, rescaling `min..=max` onto 0..=255.
fn window(grid: &Array2<f64>, min: f64, max: f64, inverted: bool, size: u32) -> RgbaImage {
    let (rows, columns) = grid.dim();
    let scale = 255.0 / (max - min);
    RgbaImage::from_fn(size, size, |x, y| {
        let source_row = (y as usize * rows) / size as usize;
        let source_column = (x as usize * columns) / size as usize;
        let value = grid[[source_row, source_column]];
        let mut gray = ((value - min) * scale).round().clamp(0.0, 255.0) as u8;
        if inverted {
            gray = 255 - gray;
        }
        Rgba([gray, gray, gray, 255])
    })
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PixelError> {
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(buffer)
}

fn modality_color(modality: &str) -> &'static str {
    match modality {
        "CT" => "#3b6ea5",
        "MR" => "#6a4c93",
        "US" => "#2a9d8f",
        "CR" | "DX" => "#8d6e63",
        "XA" | "RF" => "#c0392b",
        "PT" => "#e67e22",
        "NM" => "#d4a017",
        "MG" => "#c2185b",
        "SC" => "#607d8b",
        _ => "#6b6b6b",
    }
}

/// Flat modality-colored preview showing the modality code and a shortened description.
pub fn placeholder(modality: &str, description: &str, size: u32) -> Thumbnail {
    let label = if description.chars().count() > DESCRIPTION_CHARS {
        let head: String = description.chars().take(DESCRIPTION_CHARS - 1).collect();
        format!("{}…", head.trim_end())
    } else {
        description.to_string()
    };
    let half = size / 2;
    let svg = format!(
        concat!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">"##,
            r##"<rect width="{size}" height="{size}" fill="{color}"/>"##,
            r##"<text x="{half}" y="{modality_y}" font-family="sans-serif" font-size="{modality_px}" font-weight="bold" fill="#ffffff" text-anchor="middle">{modality}</text>"##,
            r##"<text x="{half}" y="{label_y}" font-family="sans-serif" font-size="{label_px}" fill="#ffffff" text-anchor="middle">{label}</text>"##,
            "</svg>"
        ),
        size = size,
        half = half,
        color = modality_color(modality),
        modality_y = half,
        modality_px = (size / 5).max(1),
        modality = escape_xml(modality),
        label_y = half + size / 5,
        label_px = (size / 12).max(1),
        label = escape_xml(&label),
    );
    Thumbnail::Svg(svg)
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Attach a thumbnail to every series, rendered from its representative image.
///
/// Files are read `batch_size` series at a time; decoding of each group runs on the
/// rayon pool.
pub async fn render_series_thumbnails(
    series: &mut [SeriesRecord],
    images: &[ImageRecord],
    options: &ThumbnailOptions,
    batch_size: usize,
) {
    let by_id: HashMap<&str, &ImageRecord> = images
        .iter()
        .map(|image| (image.image_id.as_str(), image))
        .collect();

    for group in series.chunks_mut(batch_size.max(1)) {
        let reads = join_all(group.iter().map(|record| {
            let image = by_id.get(record.representative_image_id.as_str()).copied();
            async move {
                match image {
                    Some(image) => image.source.read_all().await.map(|bytes| (image, bytes)).ok(),
                    None => None,
                }
            }
        }))
        .await;

        group
            .par_iter_mut()
            .zip(reads.into_par_iter())
            .for_each(|(record, read)| {
                record.thumbnail = Some(match read {
                    Some((image, bytes)) => render_thumbnail(image, &bytes, options),
                    None => placeholder(&record.modality, &record.series_description, options.size),
                });
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(values: &[f64], rows: usize, columns: usize) -> Array2<f64> {
        Array2::from_shape_vec((rows, columns), values.to_vec()).expect("shape")
    }

    #[test]
    fn window_maps_full_range_onto_bytes() {
        let values: Vec<f64> = [0.0, 85.0, 170.0, 255.0]
            .iter()
            .flat_map(|v| std::iter::repeat(*v).take(4))
            .collect();
        let image = window(&grid(&values, 4, 4), 0.0, 255.0, false, 4);
        for (y, expected) in [0u8, 85, 170, 255].into_iter().enumerate() {
            for x in 0..4 {
                assert_eq!(image.get_pixel(x, y as u32), &Rgba([expected, expected, expected, 255]));
            }
        }
    }

    #[test]
    fn inverted_photometric_flips_polarity() {
        let image = window(&grid(&[0.0, 100.0], 1, 2), 0.0, 100.0, true, 2);
        assert_eq!(image.get_pixel(0, 0)[0], 255);
        assert_eq!(image.get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn sampling_stride_is_bounded() {
        let values: Vec<f64> = (0..10_000).map(f64::from).collect();
        let (min, max) = sampled_range(&grid(&values, 100, 100), 100);
        assert_eq!(min, 0.0);
        assert!(max >= 9_800.0 && max < 10_000.0);
    }

    #[test]
    fn signed_sixteen_bit_samples() {
        let layout = FrameLayout {
            rows: 1,
            columns: 2,
            samples: 1,
            bits_allocated: 16,
            signed: true,
            planar: false,
        };
        let frame = [0x18, 0xFC, 0xE8, 0x03]; // -1000, 1000
        let grid = intensity_grid(&frame, &layout);
        assert_eq!(grid[[0, 0]], -1000.0);
        assert_eq!(grid[[0, 1]], 1000.0);
    }

    #[test]
    fn planar_rgb_averages_samples() {
        let layout = FrameLayout {
            rows: 1,
            columns: 2,
            samples: 3,
            bits_allocated: 8,
            signed: false,
            planar: true,
        };
        // R plane, G plane, B plane
        let frame = [30, 0, 60, 0, 90, 3];
        let grid = intensity_grid(&frame, &layout);
        assert_eq!(grid[[0, 0]], 60.0);
        assert_eq!(grid[[0, 1]], 1.0);
    }

    #[test]
    fn frame_length_overflow_is_reported() {
        assert_eq!(frame_length(4, 4, 3, 2).ok(), Some(96));
        assert!(matches!(
            frame_length(usize::MAX, 2, 1, 1),
            Err(PixelError::FrameTooLarge { columns: 2, .. })
        ));
    }

    #[test]
    fn dimensions_beyond_us_range_are_not_decoded() {
        use dicom_dictionary_std::tags;

        fn element(tag: dicom::core::Tag, vr: &[u8; 2], value: &[u8]) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(&tag.group().to_le_bytes());
            out.extend_from_slice(&tag.element().to_le_bytes());
            out.extend_from_slice(vr);
            out.extend_from_slice(&(value.len() as u16).to_le_bytes());
            out.extend_from_slice(value);
            out
        }

        let mut body = element(tags::MODALITY, b"CS", b"CT");
        body.extend(element(tags::SAMPLES_PER_PIXEL, b"US", &1u16.to_le_bytes()));
        body.extend(element(tags::ROWS, b"UL", &u32::MAX.to_le_bytes()));
        body.extend(element(tags::COLUMNS, b"UL", &u32::MAX.to_le_bytes()));
        body.extend(element(tags::BITS_ALLOCATED, b"US", &8u16.to_le_bytes()));
        // (7FE0,0010) OB with a 32-bit length
        body.extend_from_slice(&[0xE0, 0x7F, 0x10, 0x00, b'O', b'B', 0, 0]);
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend_from_slice(&[9u8; 16]);

        let result = decode_preview(&body, &ThumbnailOptions::default());
        assert!(matches!(result, Err(PixelError::MissingAttribute("Rows"))));
    }

    #[test]
    fn placeholder_is_escaped_and_truncated() {
        let Thumbnail::Svg(svg) = placeholder("CT", "Chest <contrast> & abdomen pelvis", 120) else {
            panic!("expected svg");
        };
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("#3b6ea5"));
        assert!(svg.contains(">CT<"));
        assert!(svg.contains("&lt;contrast&gt;"));
        assert!(!svg.contains("pelvis"));
    }

    #[test]
    fn unknown_modality_is_gray() {
        let thumb = placeholder("ZZ", "", 120);
        assert!(thumb.is_placeholder());
        assert!(String::from_utf8_lossy(thumb.as_bytes()).contains("#6b6b6b"));
    }
}
