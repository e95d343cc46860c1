//
// aggregate.rs
// Dicom-Ingest-rs
//
// Groups image records into series, orders them, and computes session-wide statistics.
//
// Thales Matheus Mendonça Santos - October 2026

use std::collections::{BTreeSet, HashMap};

use crate::models::{ImageRecord, SeriesRecord, SessionStatistics};

/// Build one series record per distinct series id.
///
/// Images are ordered by image number and series by series number; both sorts are
/// stable, so ties keep ingestion order. Descriptive fields come from the first
/// ingested image of each series and are never merged; values that disagree are
/// listed in `metadata_conflicts`.
pub fn aggregate(images: &[ImageRecord]) -> Vec<SeriesRecord> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&ImageRecord>> = HashMap::new();
    for image in images {
        let key = image.attributes.series_id.as_str();
        groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(image);
    }

    let mut series: Vec<SeriesRecord> = order
        .into_iter()
        .filter_map(|key| groups.remove(key))
        .map(build_series)
        .collect();
    series.sort_by_key(|s| s.series_number);
    series
}

fn build_series(mut members: Vec<&ImageRecord>) -> SeriesRecord {
    let first = &members[0].attributes;
    let representative_image_id = members[0].image_id.clone();
    let metadata_conflicts = conflicts(&members);
    if !metadata_conflicts.is_empty() {
        tracing::warn!(
            "Series {} has diverging {}; showing the first image's values",
            first.series_id,
            metadata_conflicts.join(", ")
        );
    }

    let mut record = SeriesRecord {
        series_id: first.series_id.clone(),
        study_id: first.study_id.clone(),
        series_number: first.series_number,
        series_description: first.series_description.clone(),
        study_description: first.study_description.clone(),
        patient_name: first.patient_name.clone(),
        study_date: first.study_date.clone(),
        modality: first.modality.clone(),
        image_count: members.len(),
        ordered_image_ids: Vec::new(),
        representative_image_id,
        metadata_conflicts,
        thumbnail: None,
    };

    members.sort_by_key(|image| image.attributes.image_number);
    record.ordered_image_ids = members.iter().map(|image| image.image_id.clone()).collect();
    record
}

fn conflicts(members: &[&ImageRecord]) -> Vec<String> {
    let first = &members[0].attributes;
    let checks: [(&str, fn(&ImageRecord) -> &str); 5] = [
        ("study_id", |i| i.attributes.study_id.as_str()),
        ("patient_name", |i| i.attributes.patient_name.as_str()),
        ("series_description", |i| i.attributes.series_description.as_str()),
        ("study_description", |i| i.attributes.study_description.as_str()),
        ("modality", |i| i.attributes.modality.as_str()),
    ];

    checks
        .iter()
        .filter(|(_, field)| members.iter().any(|m| field(m) != field(members[0])))
        .map(|(name, _)| name.to_string())
        .chain(
            members
                .iter()
                .any(|m| m.attributes.series_number != first.series_number)
                .then(|| "series_number".to_string()),
        )
        .collect()
}

/// Totals over every series, recomputed on each call.
pub fn statistics(series: &[SeriesRecord]) -> SessionStatistics {
    SessionStatistics {
        series_count: series.len(),
        total_images: series.iter().map(|s| s.image_count).sum(),
        modalities: series
            .iter()
            .map(|s| s.modality.clone())
            .collect::<BTreeSet<_>>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DicomAttributes;
    use crate::source::RawFile;

    fn record(series: &str, series_number: i32, image_number: i32, tag: &str) -> ImageRecord {
        let mut attributes = DicomAttributes::fallback();
        attributes.series_id = series.to_string();
        attributes.study_id = "study".to_string();
        attributes.series_number = series_number;
        attributes.image_number = image_number;
        ImageRecord {
            source: RawFile::from_bytes(format!("{tag}.dcm"), None, vec![0u8; 4]),
            image_id: format!("dicomfile:{tag}"),
            frame_index: None,
            attributes,
            pixel_usable: true,
        }
    }

    #[test]
    fn groups_and_orders_images() {
        let images = vec![
            record("A", 1, 2, "a2"),
            record("B", 2, 1, "b1"),
            record("A", 1, 1, "a1"),
        ];
        let series = aggregate(&images);

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].series_id, "A");
        assert_eq!(series[0].image_count, 2);
        assert_eq!(series[0].ordered_image_ids, vec!["dicomfile:a1", "dicomfile:a2"]);
        assert_eq!(series[0].representative_image_id, "dicomfile:a2");
        assert_eq!(series[1].ordered_image_ids, vec!["dicomfile:b1"]);
    }

    #[test]
    fn equal_image_numbers_keep_ingestion_order() {
        let images = vec![
            record("A", 1, 5, "first"),
            record("A", 1, 5, "second"),
            record("A", 1, 5, "third"),
        ];
        let series = aggregate(&images);
        assert_eq!(
            series[0].ordered_image_ids,
            vec!["dicomfile:first", "dicomfile:second", "dicomfile:third"]
        );
    }

    #[test]
    fn series_sorted_by_number_with_stable_ties() {
        let images = vec![
            record("late", 9, 1, "l"),
            record("x", 2, 1, "x"),
            record("y", 2, 1, "y"),
        ];
        let ids: Vec<_> = aggregate(&images)
            .into_iter()
            .map(|s| s.series_id)
            .collect();
        assert_eq!(ids, vec!["x", "y", "late"]);
    }

    #[test]
    fn diverging_metadata_is_flagged_not_merged() {
        let mut second = record("A", 1, 2, "a2");
        second.attributes.patient_name = "Somebody Else".to_string();
        let images = vec![record("A", 1, 1, "a1"), second];

        let series = aggregate(&images);
        assert_eq!(series[0].patient_name, "Anonymous Patient");
        assert_eq!(series[0].metadata_conflicts, vec!["patient_name"]);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let images = vec![
            record("A", 3, 2, "a2"),
            record("B", 1, 1, "b1"),
            record("A", 3, 1, "a1"),
        ];
        let first = aggregate(&images);
        let second = aggregate(&images);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).expect("json"),
            serde_json::to_vec(&second).expect("json")
        );
    }

    #[test]
    fn statistics_sum_and_unique() {
        let mut ct = record("B", 2, 1, "b1");
        ct.attributes.modality = "CT".to_string();
        let images = vec![record("A", 1, 1, "a1"), record("A", 1, 2, "a2"), ct];

        let stats = statistics(&aggregate(&images));
        assert_eq!(stats.series_count, 2);
        assert_eq!(stats.total_images, 3);
        assert_eq!(
            stats.modalities.into_iter().collect::<Vec<_>>(),
            vec!["CT", "OT"]
        );
    }

    #[test]
    fn empty_collection_yields_no_series() {
        assert!(aggregate(&[]).is_empty());
        assert_eq!(statistics(&[]), SessionStatistics::default());
    }
}
