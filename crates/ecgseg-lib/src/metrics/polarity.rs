use crate::{error::SegmentResult, source::RecordSource};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// True when the mean amplitude at annotated beats is negative.
///
/// The last annotation is dropped because it conventionally marks the end of
/// the record rather than a beat. Indices past the end of the signal are
/// ignored; with no usable index left the record is reported as not flipped.
pub fn is_flipped(signal: &[f64], annotation_samples: &[usize]) -> bool {
    let Some((_, beats)) = annotation_samples.split_last() else {
        return false;
    };
    let mut sum = 0.0;
    let mut count = 0usize;
    for &idx in beats {
        match signal.get(idx) {
            Some(value) => {
                sum += value;
                count += 1;
            }
            None => log::debug!(
                "annotation at sample {} is past the signal end ({})",
                idx,
                signal.len()
            ),
        }
    }
    count > 0 && sum / (count as f64) < 0.0
}

/// Outcome of a polarity scan over a record source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolarityReport {
    pub flipped: BTreeSet<String>,
    pub checked: usize,
    /// Records that could not be loaded.
    pub skipped: Vec<String>,
}

/// Check every record of `source`; unreadable records are logged and skipped.
pub fn scan_directory(source: &dyn RecordSource) -> SegmentResult<PolarityReport> {
    let ids = source.record_ids()?;
    let outcomes: Vec<(String, Option<bool>)> = ids
        .into_par_iter()
        .map(|id| match source.load(&id) {
            Ok((record, annotations)) => {
                let flipped = is_flipped(&record.signal.data, &annotations.samples());
                if flipped {
                    log::info!("record {} is flipped", id);
                }
                (id, Some(flipped))
            }
            Err(err) => {
                log::warn!("skipping record {}: {}", id, err);
                (id, None)
            }
        })
        .collect();

    let mut report = PolarityReport::default();
    for (id, outcome) in outcomes {
        match outcome {
            Some(true) => {
                report.checked += 1;
                report.flipped.insert(id);
            }
            Some(false) => report.checked += 1,
            None => report.skipped.push(id),
        }
    }
    if report.flipped.is_empty() {
        log::info!("no flipped records among {} checked", report.checked);
    }
    Ok(report)
}
