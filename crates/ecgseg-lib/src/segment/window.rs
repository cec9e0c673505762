use super::aggregate::{aggregate, Window, WindowSummary};
use crate::{
    config::{BoundCheck, SegmentationConfig},
    error::{SegmentError, SegmentResult},
    signal::AnnotationStream,
};
use serde::{Deserialize, Serialize};

/// How the scan moved past an evaluated window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Advanced by the heart-rate derived step; windows overlap.
    BeatPaced,
    /// Advanced by a full window width because one ectopic type dominated.
    BurdenJump,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedWindow {
    pub window: Window,
    pub summary: WindowSummary,
    pub step: Step,
}

/// Sliding window whose step depends on the arrhythmia burden it observes.
///
/// The window starts at sample 0 and advances by `window_step` samples
/// (`round(bpm / 60 * fs)`) unless the current window holds at least
/// `pac_jump_percent` PACs and no PVCs, or the converse for PVCs, in which
/// case it jumps a whole window width. The scan stops at the first window
/// that fails the bound check; a partial trailing window is never produced.
#[derive(Debug, Clone)]
pub struct SlidingWindowSegmenter {
    left_end: usize,
    width: usize,
    step: usize,
    signal_len: usize,
    pac_jump_percent: f64,
    pvc_jump_percent: f64,
    bound_check: BoundCheck,
}

impl SlidingWindowSegmenter {
    pub fn new(
        config: &SegmentationConfig,
        fs: f64,
        avg_heart_rate: f64,
        signal_len: usize,
    ) -> SegmentResult<Self> {
        if !(fs > 0.0) || !fs.is_finite() {
            return Err(SegmentError::InvalidInput(format!(
                "sampling frequency must be positive, got {}",
                fs
            )));
        }
        if !(avg_heart_rate > 0.0) || !avg_heart_rate.is_finite() {
            return Err(SegmentError::InvalidInput(format!(
                "heart rate must be positive, got {}",
                avg_heart_rate
            )));
        }
        let width = config.window_width_samples(fs);
        if width == 0 {
            return Err(SegmentError::InvalidInput(format!(
                "window of {} s at {} Hz spans no samples",
                config.window_width_s, fs
            )));
        }
        let heart_cycle = avg_heart_rate / 60.0;
        let step = (heart_cycle * fs).round() as usize;
        if step == 0 {
            return Err(SegmentError::InvalidInput(format!(
                "{} bpm at {} Hz gives a zero-sample step",
                avg_heart_rate, fs
            )));
        }
        Ok(Self {
            left_end: 0,
            width,
            step,
            signal_len,
            pac_jump_percent: config.pac_jump_percent,
            pvc_jump_percent: config.pvc_jump_percent,
            bound_check: config.bound_check,
        })
    }

    pub fn window_width(&self) -> usize {
        self.width
    }

    pub fn window_step(&self) -> usize {
        self.step
    }

    /// The window awaiting evaluation, or `None` once the scan has ended.
    pub fn current(&self) -> Option<Window> {
        let right_end = self.left_end.checked_add(self.width)?;
        self.bound_check
            .accepts(self.left_end, right_end, self.signal_len)
            .then_some(Window {
                left_end: self.left_end,
                right_end,
            })
    }

    /// Jump a full width when one ectopic type dominates and the other is absent.
    pub fn choose_step(&self, summary: &WindowSummary) -> Step {
        let pac = summary.pac_percent;
        let pvc = summary.pvc_percent;
        let pac_dominant = pac >= self.pac_jump_percent && pvc == 0.0;
        let pvc_dominant = pac == 0.0 && pvc >= self.pvc_jump_percent;
        if pac_dominant || pvc_dominant {
            Step::BurdenJump
        } else {
            Step::BeatPaced
        }
    }

    pub fn advance(&mut self, step: Step) {
        let delta = match step {
            Step::BeatPaced => self.step,
            Step::BurdenJump => self.width,
        };
        self.left_end = self.left_end.saturating_add(delta);
    }

    /// Evaluate and advance until the bound check fails.
    pub fn scan(mut self, annotations: &AnnotationStream) -> Vec<EvaluatedWindow> {
        let mut out = Vec::new();
        while let Some(window) = self.current() {
            let summary = aggregate(annotations, window);
            let step = self.choose_step(&summary);
            log::debug!(
                "window [{}, {}]: pac {:.1}% pvc {:.1}% -> {:?}",
                window.left_end,
                window.right_end,
                summary.pac_percent,
                summary.pvc_percent,
                step
            );
            self.advance(step);
            out.push(EvaluatedWindow {
                window,
                summary,
                step,
            });
        }
        out
    }
}
