use crate::signal::{AnnotationStream, PAC_SYMBOL, PVC_SYMBOL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sample span of one window; both ends are absolute sample indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub left_end: usize,
    pub right_end: usize,
}

/// Beat annotations falling inside a window and the burden they imply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub symbols: Vec<String>,
    /// Sample positions relative to `left_end`.
    pub offsets: Vec<usize>,
    pub counts: BTreeMap<String, usize>,
    pub pac_percent: f64,
    pub pvc_percent: f64,
}

impl WindowSummary {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Summarize the annotations in `[window.left_end, window.right_end]`.
pub fn aggregate(annotations: &AnnotationStream, window: Window) -> WindowSummary {
    let selected = annotations.range(window.left_end, window.right_end);

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut symbols = Vec::with_capacity(selected.len());
    let mut offsets = Vec::with_capacity(selected.len());
    for ann in selected {
        *counts.entry(ann.symbol.clone()).or_insert(0) += 1;
        symbols.push(ann.symbol.clone());
        offsets.push(ann.sample - window.left_end);
    }

    let total: usize = counts.values().sum();
    let percent_of = |symbol: &str| {
        if total == 0 {
            return 0.0;
        }
        let n = counts.get(symbol).copied().unwrap_or(0);
        100.0 * n as f64 / total as f64
    };
    let pac_percent = percent_of(PAC_SYMBOL);
    let pvc_percent = percent_of(PVC_SYMBOL);

    WindowSummary {
        symbols,
        offsets,
        counts,
        pac_percent,
        pvc_percent,
    }
}
