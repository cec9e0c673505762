use super::window::SlidingWindowSegmenter;
use crate::{
    config::SegmentationConfig,
    detectors::RPeakDetector,
    error::SegmentResult,
    metrics::heart_rate::estimate_bpm,
    signal::{AnnotationStream, Record},
    source::RecordSource,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One fixed-width window of a record, ready for a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub parent_record: String,
    pub label: String,
    pub avg_heart_rate: f64,
    /// Samples rounded to four decimals.
    pub signals: Vec<f64>,
    pub beat_annotation_symbols: Vec<String>,
    /// Annotation positions relative to the window start.
    pub annotated_samples: Vec<usize>,
    pub beat_occurrence: BTreeMap<String, usize>,
    pub pac_percent: f64,
    pub pvc_percent: f64,
}

/// Four-decimal rounding with ties to even, so 0.03125 becomes 0.0312.
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round_ties_even() / 10_000.0
}

/// Turns records into ordered segment tables.
pub struct SegmentDatasetBuilder<'a> {
    config: SegmentationConfig,
    detector: &'a dyn RPeakDetector,
}

impl<'a> SegmentDatasetBuilder<'a> {
    pub fn new(config: SegmentationConfig, detector: &'a dyn RPeakDetector) -> Self {
        Self { config, detector }
    }

    /// Estimate the record heart rate, then segment it.
    pub fn build(
        &self,
        record: &Record,
        annotations: &AnnotationStream,
    ) -> SegmentResult<Vec<Segment>> {
        let bpm = estimate_bpm(&record.signal, self.detector)?;
        self.build_with_heart_rate(record, annotations, bpm)
    }

    /// Segment a record whose average heart rate is already known.
    pub fn build_with_heart_rate(
        &self,
        record: &Record,
        annotations: &AnnotationStream,
        avg_heart_rate: f64,
    ) -> SegmentResult<Vec<Segment>> {
        let data = &record.signal.data;
        let segmenter = SlidingWindowSegmenter::new(
            &self.config,
            record.sampling_frequency(),
            avg_heart_rate,
            data.len(),
        )?;
        let segments: Vec<Segment> = segmenter
            .scan(annotations)
            .into_iter()
            .map(|evaluated| {
                let window = evaluated.window;
                let summary = evaluated.summary;
                Segment {
                    parent_record: record.name.clone(),
                    label: record.label.clone(),
                    avg_heart_rate,
                    signals: data[window.left_end..window.right_end]
                        .iter()
                        .copied()
                        .map(round4)
                        .collect(),
                    beat_annotation_symbols: summary.symbols,
                    annotated_samples: summary.offsets,
                    beat_occurrence: summary.counts,
                    pac_percent: summary.pac_percent,
                    pvc_percent: summary.pvc_percent,
                }
            })
            .collect();
        log::info!(
            "record {}: {} segments at {} bpm",
            record.name,
            segments.len(),
            avg_heart_rate
        );
        Ok(segments)
    }

    /// Segment every record of `source` and concatenate the tables in record
    /// order. Records that fail to load or segment are logged and left out.
    pub fn build_from_source(&self, source: &dyn RecordSource) -> SegmentResult<Vec<Segment>> {
        let ids = source.record_ids()?;
        log::info!("segmenting {} records", ids.len());
        let per_record: Vec<Vec<Segment>> = ids
            .par_iter()
            .map(|id| {
                source
                    .load(id)
                    .and_then(|(record, annotations)| self.build(&record, &annotations))
                    .unwrap_or_else(|err| {
                        log::warn!("skipping record {}: {}", id, err);
                        Vec::new()
                    })
            })
            .collect();
        Ok(per_record.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::BoundCheck,
        error::SegmentError,
        signal::TimeSeries,
        source::InMemorySource,
    };

    /// Reports one peak per `every` samples.
    struct EveryN(usize);

    impl RPeakDetector for EveryN {
        fn detect_peaks(&self, signal: &[f64], _fs: f64) -> anyhow::Result<Vec<usize>> {
            Ok((self.0 / 2..signal.len()).step_by(self.0).collect())
        }
    }

    fn record(name: &str, len: usize) -> (Record, AnnotationStream) {
        let data: Vec<f64> = (0..len).map(|i| (i as f64 * 0.123456).sin()).collect();
        let samples: Vec<usize> = (50..len).step_by(100).collect();
        let symbols: Vec<&str> = samples
            .iter()
            .map(|&s| if (s / 100) % 5 == 2 { "A" } else { "N" })
            .collect();
        (
            Record::new(name, TimeSeries { fs: 100.0, data }, "AFIB"),
            AnnotationStream::from_parts(samples, symbols).unwrap(),
        )
    }

    fn config() -> SegmentationConfig {
        SegmentationConfig {
            window_width_s: 2.0,
            bound_check: BoundCheck::RightEdge,
            ..SegmentationConfig::default()
        }
    }

    #[test]
    fn rows_carry_record_metadata_and_window_content() {
        let detector = EveryN(100);
        let builder = SegmentDatasetBuilder::new(config(), &detector);
        let (rec, ann) = record("04015", 1000);
        let segments = builder.build(&rec, &ann).unwrap();
        // PACs at 250 and 750 make the windows at 100 and 600 jump.
        assert_eq!(segments.len(), 7);
        assert_eq!(segments[2].annotated_samples, vec![50, 150]);
        let first = &segments[0];
        assert_eq!(first.parent_record, "04015");
        assert_eq!(first.label, "AFIB");
        assert_eq!(first.avg_heart_rate, 60.0);
        assert_eq!(first.signals.len(), 200);
        assert_eq!(first.beat_annotation_symbols, vec!["N", "N"]);
        assert_eq!(first.annotated_samples, vec![50, 150]);
        assert_eq!(first.beat_occurrence.get("N"), Some(&2));
        assert!(segments
            .iter()
            .all(|s| s.parent_record == "04015" && s.avg_heart_rate == 60.0));
    }

    #[test]
    fn signal_slice_is_rounded_to_four_decimals() {
        let detector = EveryN(100);
        let builder = SegmentDatasetBuilder::new(config(), &detector);
        let (rec, ann) = record("r", 1000);
        let segments = builder.build(&rec, &ann).unwrap();
        for (i, value) in segments[1].signals.iter().enumerate() {
            let raw = rec.signal.data[100 + i];
            assert!((value - raw).abs() <= 0.00005 + 1e-12);
            assert_eq!(*value, round4(*value));
        }
    }

    #[test]
    fn rounding_ties_go_to_even() {
        assert_eq!(round4(0.03125), 0.0312);
        assert_eq!(round4(-0.03125), -0.0312);
        assert_eq!(round4(1.23456), 1.2346);
    }

    #[test]
    fn output_is_deterministic() {
        let detector = EveryN(100);
        let builder = SegmentDatasetBuilder::new(config(), &detector);
        let (rec, ann) = record("r", 3000);
        let a = serde_json::to_string(&builder.build(&rec, &ann).unwrap()).unwrap();
        let b = serde_json::to_string(&builder.build(&rec, &ann).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn insufficient_signal_is_reported() {
        let detector = EveryN(100);
        let builder = SegmentDatasetBuilder::new(config(), &detector);
        let rec = Record::new("empty", TimeSeries { fs: 100.0, data: vec![] }, "");
        let err = builder.build(&rec, &AnnotationStream::default()).unwrap_err();
        assert!(matches!(err, SegmentError::InsufficientSignal(_)));
    }

    #[test]
    fn source_build_concatenates_in_order_and_skips_failures() {
        let detector = EveryN(100);
        let builder = SegmentDatasetBuilder::new(config(), &detector);
        let mut source = InMemorySource::new();
        for (name, len) in [("a", 1000), ("b", 1500), ("c", 10)] {
            let (rec, ann) = record(name, len);
            source.insert(rec, ann);
        }
        let segments = builder.build_from_source(&source).unwrap();
        let a = segments.iter().filter(|s| s.parent_record == "a").count();
        let b = segments.iter().filter(|s| s.parent_record == "b").count();
        assert_eq!(a, 7);
        assert!(b > a);
        assert_eq!(segments.len(), a + b);
        let first_b = segments.iter().position(|s| s.parent_record == "b").unwrap();
        assert!(segments[..first_b].iter().all(|s| s.parent_record == "a"));
    }
}
