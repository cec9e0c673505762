use assert_cmd::cargo::cargo_bin_cmd;
use serde::Deserialize;
use std::{error::Error, f64::consts::PI, fs};
use tempfile::tempdir;

#[derive(Deserialize)]
struct HeartRateOutput {
    bpm: f64,
    epoch_start: f64,
    epoch_end: f64,
}

#[derive(Deserialize)]
struct EpochOutput {
    start: f64,
    end: f64,
}

fn synthetic_ecg(fs: f64, rr: &[f64]) -> Vec<f64> {
    let mut beats = vec![0.5];
    for &interval in rr {
        beats.push(beats[beats.len() - 1] + interval);
    }
    let duration = beats[beats.len() - 1] + 1.0;
    (0..(duration * fs) as usize)
        .map(|i| {
            let t = i as f64 / fs;
            let qrs: f64 = beats
                .iter()
                .map(|&bt| 1.2 * (-0.5 * ((t - bt) / 0.02).powi(2)).exp())
                .sum();
            0.05 * (2.0 * PI * t).sin() + qrs
        })
        .collect()
}

fn assert_close(a: f64, b: f64, tol: f64) {
    let diff = (a - b).abs();
    assert!(diff <= tol, "diff {} exceeded tol {} ({} vs {})", diff, tol, a, b);
}

#[test]
fn heart_rate_reports_bpm_and_epoch() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let path = temp.path().join("ecg.txt");
    let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
    let lines: Vec<String> = synthetic_ecg(250.0, &rr)
        .iter()
        .map(|v| v.to_string())
        .collect();
    fs::write(&path, lines.join("\n"))?;

    let mut cmd = cargo_bin_cmd!("ecgseg");
    cmd.args([
        "heart-rate",
        "--input",
        path.to_str().expect("utf8 path"),
        "--fs",
        "250",
        "--min-rr-s",
        "0.3",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let actual: HeartRateOutput = serde_json::from_slice(&output)?;
    // Nine beats over roughly eight seconds.
    assert!((60.0..=75.0).contains(&actual.bpm), "bpm {}", actual.bpm);
    assert_eq!(actual.bpm, actual.bpm.trunc());
    assert_close(actual.epoch_start, -0.3 * 60.0 / actual.bpm, 1e-9);
    assert_close(actual.epoch_end, 0.45 * 60.0 / actual.bpm, 1e-9);
    Ok(())
}

#[test]
fn epoch_command_widens_for_tachycardia() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("ecgseg");
    cmd.args(["epoch", "--bpm", "120"]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let epoch: EpochOutput = serde_json::from_slice(&output)?;
    assert_close(epoch.start, -0.30, 1e-9);
    assert_close(epoch.end, 0.375, 1e-9);
    Ok(())
}

#[test]
fn epoch_command_rejects_zero_bpm() {
    let mut cmd = cargo_bin_cmd!("ecgseg");
    cmd.args(["epoch", "--bpm", "0"]);
    cmd.assert().failure();
}
