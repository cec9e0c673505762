use crate::{
    detectors::RPeakDetector,
    error::{SegmentError, SegmentResult},
    signal::TimeSeries,
};
use serde::{Deserialize, Serialize};

/// Heart rate at and above which the epoch is widened for tachycardia.
pub const TACHYCARDIA_BPM: f64 = 90.0;
/// Seconds added on each side of the epoch at tachycardic rates.
pub const TACHYCARDIA_MARGIN_S: f64 = 0.15;

/// Average heart rate over the whole signal, truncated to whole beats per minute.
pub fn estimate_bpm(ts: &TimeSeries, detector: &dyn RPeakDetector) -> SegmentResult<f64> {
    let duration = ts.duration();
    if ts.is_empty() || !(duration > 0.0) || !duration.is_finite() {
        return Err(SegmentError::InsufficientSignal(format!(
            "signal of {} samples at {} Hz has no duration",
            ts.len(),
            ts.fs
        )));
    }
    let peaks = detector.detect_peaks(&ts.data, ts.fs)?;
    if peaks.is_empty() {
        return Err(SegmentError::InsufficientSignal("no R-peaks detected".to_string()));
    }
    let bpm = (peaks.len() as f64 * 60.0 / duration).trunc();
    if bpm == 0.0 {
        return Err(SegmentError::InsufficientSignal(format!(
            "{} peaks over {:.1} s is below one beat per minute",
            peaks.len(),
            duration
        )));
    }
    log::debug!("{} peaks over {:.1} s -> {} bpm", peaks.len(), duration, bpm);
    Ok(bpm)
}

/// Window around a beat, in seconds relative to the R-peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardiacEpoch {
    pub start: f64,
    pub end: f64,
}

/// Pre/post-beat window scaled by the beat period.
pub fn compute_epoch(bpm: f64) -> SegmentResult<CardiacEpoch> {
    if !(bpm > 0.0) {
        return Err(SegmentError::InvalidInput(format!(
            "heart rate must be positive, got {}",
            bpm
        )));
    }
    let beats_per_second = bpm / 60.0;
    let mut epoch = CardiacEpoch {
        start: -0.3 / beats_per_second,
        end: 0.45 / beats_per_second,
    };
    // Short RR intervals squeeze the P and T waves toward the margins.
    if bpm >= TACHYCARDIA_BPM {
        epoch.start -= TACHYCARDIA_MARGIN_S;
        epoch.end += TACHYCARDIA_MARGIN_S;
    }
    Ok(epoch)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPeaks(Vec<usize>);

    impl RPeakDetector for FixedPeaks {
        fn detect_peaks(&self, _signal: &[f64], _fs: f64) -> anyhow::Result<Vec<usize>> {
            Ok(self.0.clone())
        }
    }

    struct FailingDetector;

    impl RPeakDetector for FailingDetector {
        fn detect_peaks(&self, _signal: &[f64], _fs: f64) -> anyhow::Result<Vec<usize>> {
            anyhow::bail!("detector exploded")
        }
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
    }

    fn ten_seconds() -> TimeSeries {
        TimeSeries {
            fs: 100.0,
            data: vec![0.0; 1000],
        }
    }

    #[test]
    fn bpm_is_truncated() {
        let bpm = estimate_bpm(&ten_seconds(), &FixedPeaks((0..13).collect())).unwrap();
        assert_eq!(bpm, 78.0);
        let ts = TimeSeries {
            fs: 100.0,
            data: vec![0.0; 700],
        };
        // 9 * 60 / 7 = 77.14
        let bpm = estimate_bpm(&ts, &FixedPeaks((0..9).collect())).unwrap();
        assert_eq!(bpm, 77.0);
    }

    #[test]
    fn no_peaks_is_insufficient() {
        let err = estimate_bpm(&ten_seconds(), &FixedPeaks(vec![])).unwrap_err();
        assert!(matches!(err, SegmentError::InsufficientSignal(_)));
    }

    #[test]
    fn empty_signal_is_insufficient() {
        let ts = TimeSeries {
            fs: 360.0,
            data: vec![],
        };
        let err = estimate_bpm(&ts, &FixedPeaks(vec![1])).unwrap_err();
        assert!(matches!(err, SegmentError::InsufficientSignal(_)));
    }

    #[test]
    fn sub_one_bpm_is_insufficient() {
        let ts = TimeSeries {
            fs: 1.0,
            data: vec![0.0; 120],
        };
        let err = estimate_bpm(&ts, &FixedPeaks(vec![3])).unwrap_err();
        assert!(matches!(err, SegmentError::InsufficientSignal(_)));
    }

    #[test]
    fn detector_failure_propagates() {
        let err = estimate_bpm(&ten_seconds(), &FailingDetector).unwrap_err();
        assert!(matches!(err, SegmentError::Detector(_)));
        assert_eq!(err.to_string(), "detector exploded");
    }

    #[test]
    fn epoch_at_sixty_bpm() {
        let epoch = compute_epoch(60.0).unwrap();
        assert_close(epoch.start, -0.3);
        assert_close(epoch.end, 0.45);
    }

    #[test]
    fn epoch_widens_for_tachycardia() {
        let epoch = compute_epoch(120.0).unwrap();
        assert_close(epoch.start, -0.30);
        assert_close(epoch.end, 0.375);
    }

    #[test]
    fn epoch_threshold_is_inclusive() {
        let below = compute_epoch(89.0).unwrap();
        assert_close(below.start, -0.3 * 60.0 / 89.0);
        let at = compute_epoch(90.0).unwrap();
        assert_close(at.start, -0.2 - 0.15);
        assert_close(at.end, 0.3 + 0.15);
    }

    #[test]
    fn epoch_rejects_non_positive_rates() {
        for bpm in [0.0, -5.0, f64::NAN] {
            let err = compute_epoch(bpm).unwrap_err();
            assert!(matches!(err, SegmentError::InvalidInput(_)));
        }
    }
}
