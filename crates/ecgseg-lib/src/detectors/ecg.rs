use serde::{Deserialize, Serialize};

/// Source of R-peak sample indices. Implementations must not keep per-call
/// mutable state so one instance can serve several records concurrently.
pub trait RPeakDetector: Send + Sync {
    /// Ordered peak sample indices for `signal` sampled at `fs` Hz.
    fn detect_peaks(&self, signal: &[f64], fs: f64) -> anyhow::Result<Vec<usize>>;
}

/// Parameters of the Pan–Tompkins-style detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakDetectorConfig {
    /// Lower cutoff for the single-pole high-pass filter (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff for the single-pole low-pass filter (Hz).
    pub highcut_hz: f64,
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum physiological RR distance / refractory period (seconds).
    pub min_rr_s: f64,
    /// Scale between noise and signal envelopes for the adaptive threshold.
    pub threshold_scale: f64,
    /// How far back to search (seconds) for the precise R-peak after a detection.
    pub search_back_s: f64,
}

impl Default for PeakDetectorConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            integration_window_s: 0.150,
            min_rr_s: 0.120,
            threshold_scale: 0.6,
            search_back_s: 0.150,
        }
    }
}

/// Band-pass, differentiate, square, integrate, then pick peaks against an
/// adaptive signal/noise threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanTompkinsDetector {
    pub config: PeakDetectorConfig,
}

impl PanTompkinsDetector {
    pub fn new(config: PeakDetectorConfig) -> Self {
        Self { config }
    }
}

impl RPeakDetector for PanTompkinsDetector {
    fn detect_peaks(&self, signal: &[f64], fs: f64) -> anyhow::Result<Vec<usize>> {
        if !(fs > 0.0) {
            anyhow::bail!("sampling frequency must be positive, got {}", fs);
        }
        if signal.is_empty() {
            return Ok(Vec::new());
        }
        let cfg = &self.config;
        let (bandpassed, envelope) = envelope(signal, fs, cfg);
        let peaks = pick_peaks(&bandpassed, &envelope, fs, cfg);
        if peaks.len() < 2 {
            // The adaptive threshold never settles on very short or flat input.
            return Ok(local_maxima(signal, fs, cfg));
        }
        Ok(peaks)
    }
}

fn envelope(signal: &[f64], fs: f64, cfg: &PeakDetectorConfig) -> (Vec<f64>, Vec<f64>) {
    let fs = fs.max(1.0);
    let mut bandpassed = if cfg.lowcut_hz > 0.0 {
        highpass(signal, fs, cfg.lowcut_hz)
    } else {
        signal.to_vec()
    };
    if cfg.highcut_hz > 0.0 && cfg.highcut_hz < fs * 0.5 {
        bandpassed = lowpass(&bandpassed, fs, cfg.highcut_hz);
    }
    let squared_slope: Vec<f64> = std::iter::once(0.0)
        .chain(bandpassed.windows(2).map(|w| (w[1] - w[0]).powi(2)))
        .collect();
    let win = ((cfg.integration_window_s * fs).round() as usize).max(1);
    let integrated = moving_average(&squared_slope, win);
    (bandpassed, integrated)
}

fn rc_constant(cutoff: f64) -> f64 {
    1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01))
}

fn highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let dt = 1.0 / fs;
    let rc = rc_constant(cutoff);
    let alpha = rc / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let (mut prev_y, mut prev_x) = (data[0], data[0]);
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

fn lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let dt = 1.0 / fs;
    let alpha = dt / (rc_constant(cutoff) + dt);
    let mut prev = data[0];
    data.iter()
        .map(|&x| {
            prev += alpha * (x - prev);
            prev
        })
        .collect()
}

fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 {
        return data.to_vec();
    }
    let mut out = Vec::with_capacity(data.len());
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out.push(acc / win as f64);
    }
    out
}

fn pick_peaks(
    bandpassed: &[f64],
    envelope: &[f64],
    fs: f64,
    cfg: &PeakDetectorConfig,
) -> Vec<usize> {
    let refractory = ((cfg.min_rr_s * fs).round() as usize).max(1);
    let search = ((cfg.search_back_s * fs).round() as usize).max(1);

    let init = envelope.len().min((fs as usize).max(1));
    let avg = envelope[..init].iter().sum::<f64>() / init as f64;
    let mut signal_level = avg;
    let mut noise_level = avg * 0.5;
    let threshold_of =
        |signal: f64, noise: f64| noise + cfg.threshold_scale * (signal - noise).max(0.0);
    let mut threshold = threshold_of(signal_level, noise_level);
    let mut last_detection: Option<usize> = None;
    let mut peaks = Vec::new();

    for (i, &sample) in envelope.iter().enumerate() {
        let refractory_ok = last_detection.map_or(true, |last| i - last >= refractory);
        if sample >= threshold && refractory_ok {
            let start = i.saturating_sub(search);
            let end = i.min(bandpassed.len() - 1);
            let idx = (start..=end)
                .max_by(|&a, &b| bandpassed[a].total_cmp(&bandpassed[b]))
                .unwrap_or(i);
            peaks.push(idx);
            last_detection = Some(i);
            signal_level = 0.125 * sample + 0.875 * signal_level;
        } else {
            noise_level = 0.125 * sample + 0.875 * noise_level;
        }
        threshold = threshold_of(signal_level, noise_level);
    }

    peaks.sort_unstable();
    peaks.dedup();
    peaks
}

/// Baseline-corrected local maxima separated by the refractory gap.
fn local_maxima(signal: &[f64], fs: f64, cfg: &PeakDetectorConfig) -> Vec<usize> {
    if signal.len() < 3 {
        return Vec::new();
    }
    let min_gap = ((cfg.min_rr_s * fs) as usize).max(1);
    let baseline = moving_average(signal, ((0.150 * fs) as usize).max(1));
    let detrended: Vec<f64> = signal.iter().zip(&baseline).map(|(x, m)| x - m).collect();

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..detrended.len() - 1 {
        let y = detrended[i];
        let is_peak = y > 0.0 && y > detrended[i - 1] && y > detrended[i + 1];
        let spaced = peaks.last().map_or(true, |&last| i - last >= min_gap);
        if is_peak && spaced {
            peaks.push(i);
        }
    }
    peaks
}
