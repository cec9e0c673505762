use crate::error::{SegmentError, SegmentResult};
use serde::{Deserialize, Serialize};

/// Symbol used by WFDB annotations for a premature atrial contraction.
pub const PAC_SYMBOL: &str = "A";
/// Symbol used by WFDB annotations for a premature ventricular contraction.
pub const PVC_SYMBOL: &str = "V";

/// Basic typed time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
}

/// One channel of a recording together with its identity and diagnosis label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub signal: TimeSeries,
    /// Diagnosis taken from the first header comment; empty when absent.
    pub label: String,
}

impl Record {
    pub fn new(name: impl Into<String>, signal: TimeSeries, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signal,
            label: label.into(),
        }
    }

    pub fn sampling_frequency(&self) -> f64 {
        self.signal.fs
    }
}

/// A labelled point on the record timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatAnnotation {
    pub sample: usize,
    pub symbol: String,
}

impl BeatAnnotation {
    pub fn new(sample: usize, symbol: impl Into<String>) -> Self {
        Self {
            sample,
            symbol: symbol.into(),
        }
    }
}

/// Read-only annotation stream ordered by sample index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStream {
    annotations: Vec<BeatAnnotation>,
}

impl AnnotationStream {
    /// Wrap an annotation list, rejecting decreasing sample indices.
    pub fn new(annotations: Vec<BeatAnnotation>) -> SegmentResult<Self> {
        if let Some(pos) = annotations
            .windows(2)
            .position(|w| w[1].sample < w[0].sample)
        {
            return Err(SegmentError::InvalidInput(format!(
                "annotation {} (sample {}) precedes annotation {} (sample {})",
                pos + 1,
                annotations[pos + 1].sample,
                pos,
                annotations[pos].sample
            )));
        }
        Ok(Self { annotations })
    }

    /// Zip parallel sample/symbol columns into a stream.
    pub fn from_parts<S: Into<String>>(
        samples: Vec<usize>,
        symbols: Vec<S>,
    ) -> SegmentResult<Self> {
        if samples.len() != symbols.len() {
            return Err(SegmentError::InvalidInput(format!(
                "{} annotation samples but {} symbols",
                samples.len(),
                symbols.len()
            )));
        }
        let annotations = samples
            .into_iter()
            .zip(symbols)
            .map(|(sample, symbol)| BeatAnnotation::new(sample, symbol))
            .collect();
        Self::new(annotations)
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn as_slice(&self) -> &[BeatAnnotation] {
        &self.annotations
    }

    pub fn samples(&self) -> Vec<usize> {
        self.annotations.iter().map(|a| a.sample).collect()
    }

    /// Annotations with `left <= sample <= right`, in stream order.
    pub fn range(&self, left: usize, right: usize) -> &[BeatAnnotation] {
        if left > right {
            return &[];
        }
        let start = self.annotations.partition_point(|a| a.sample < left);
        let end = self.annotations.partition_point(|a| a.sample <= right);
        &self.annotations[start..end]
    }
}

/// Half-open sample range `[from, to)` of a record; `to = None` reads to the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRange {
    pub from: usize,
    pub to: Option<usize>,
}

impl SampleRange {
    pub fn new(from: usize, to: Option<usize>) -> SegmentResult<Self> {
        if let Some(to) = to {
            if from > to {
                return Err(SegmentError::InvalidInput(format!(
                    "sample range starts at {} but ends at {}",
                    from, to
                )));
            }
        }
        Ok(Self { from, to })
    }

    pub fn is_full(&self) -> bool {
        self.from == 0 && self.to.is_none()
    }

    /// Keep the samples inside the range; a range past the end is rejected.
    pub fn apply<T>(&self, mut samples: Vec<T>) -> SegmentResult<Vec<T>> {
        let end = self.to.unwrap_or(samples.len());
        if self.from > end || end > samples.len() {
            return Err(SegmentError::InvalidInput(format!(
                "sample range {}..{} exceeds the {} samples of the signal",
                self.from,
                end,
                samples.len()
            )));
        }
        samples.truncate(end);
        samples.drain(..self.from);
        Ok(samples)
    }

    /// Annotations inside the range, re-indexed to the range start.
    pub fn clip(&self, annotations: &AnnotationStream) -> SegmentResult<AnnotationStream> {
        let kept = annotations
            .as_slice()
            .iter()
            .filter(|a| a.sample >= self.from && self.to.map_or(true, |to| a.sample < to))
            .map(|a| BeatAnnotation::new(a.sample - self.from, a.symbol.clone()))
            .collect();
        AnnotationStream::new(kept)
    }
}
