use crate::{
    detectors::PeakDetectorConfig,
    error::{SegmentError, SegmentResult},
    signal::SampleRange,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which window edges must fit inside the signal for the scan to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundCheck {
    /// Continue while `right_end <= signal_len`.
    #[default]
    RightEdge,
    /// Continue while `left_end + right_end <= signal_len`, as the first
    /// published datasets were cut. Stops roughly halfway through the record.
    LegacySum,
}

impl BoundCheck {
    pub fn accepts(self, left_end: usize, right_end: usize, signal_len: usize) -> bool {
        match self {
            BoundCheck::RightEdge => right_end <= signal_len,
            BoundCheck::LegacySum => left_end
                .checked_add(right_end)
                .map_or(false, |sum| sum <= signal_len),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Fixed window duration in seconds.
    pub window_width_s: f64,
    /// PAC burden (percent) at which a PVC-free window is skipped wholesale.
    pub pac_jump_percent: f64,
    /// PVC burden (percent) at which a PAC-free window is skipped wholesale.
    pub pvc_jump_percent: f64,
    pub bound_check: BoundCheck,
    /// Signal channel read from multi-lead records.
    pub lead: usize,
    /// Extension of the annotation file next to each header.
    pub annotation_extension: String,
    /// First sample read from each WFDB record.
    pub sample_from: usize,
    /// Exclusive end of the samples read; the record end when unset.
    pub sample_to: Option<usize>,
    pub detector: PeakDetectorConfig,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            window_width_s: 10.0,
            pac_jump_percent: 20.0,
            pvc_jump_percent: 20.0,
            bound_check: BoundCheck::default(),
            lead: 0,
            annotation_extension: "atr".to_string(),
            sample_from: 0,
            sample_to: None,
            detector: PeakDetectorConfig::default(),
        }
    }
}

impl SegmentationConfig {
    pub fn sample_range(&self) -> SegmentResult<SampleRange> {
        SampleRange::new(self.sample_from, self.sample_to)
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> SegmentResult<Self> {
        toml::from_str(text).map_err(|err| SegmentError::Parse {
            context: "segmentation config".to_string(),
            message: err.to_string(),
        })
    }

    pub fn load(path: &Path) -> SegmentResult<Self> {
        if !path.exists() {
            return Err(SegmentError::PathNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn window_width_samples(&self, fs: f64) -> usize {
        (self.window_width_s * fs).round().max(0.0) as usize
    }
}
