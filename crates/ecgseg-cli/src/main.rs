use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ecgseg_lib::{
    config::{BoundCheck, SegmentationConfig},
    detectors::PanTompkinsDetector,
    io::{
        edf as edf_io,
        table::{write_segments, TableFormat},
        text as text_io,
        wfdb as wfdb_io,
    },
    metrics::{compute_epoch, estimate_bpm, scan_directory},
    segment::SegmentDatasetBuilder,
    signal::{AnnotationStream, Record, TimeSeries},
};
use env_logger::Env;
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "ecgseg",
    version,
    about = "Heart-rate-adaptive ECG segmentation tools"
)]
struct Cli {
    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Csv,
    Jsonl,
}

impl From<OutputFormat> for TableFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Csv => TableFormat::Csv,
            OutputFormat::Jsonl => TableFormat::JsonLines,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum BoundCheckArg {
    /// Stop once the window's right edge passes the signal end
    RightEdge,
    /// Stop once left_end + right_end passes the signal end
    LegacySum,
}

impl From<BoundCheckArg> for BoundCheck {
    fn from(arg: BoundCheckArg) -> Self {
        match arg {
            BoundCheckArg::RightEdge => BoundCheck::RightEdge,
            BoundCheckArg::LegacySum => BoundCheck::LegacySum,
        }
    }
}

/// Where a single record's signal comes from.
#[derive(Args, Clone)]
struct SignalArgs {
    /// Sampling frequency for --input text samples
    #[arg(long, default_value_t = 250.0)]
    fs: f64,
    /// Newline-delimited samples (stdin when no other source is given)
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    wfdb_header: Option<PathBuf>,
    #[arg(long)]
    edf: Option<PathBuf>,
    #[arg(long, default_value_t = 0)]
    edf_channel: usize,
}

/// Settings shared by every command that reads or segments records.
#[derive(Args, Clone)]
struct ConfigArgs {
    /// TOML file with segmentation settings; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    window_width_s: Option<f64>,
    #[arg(long)]
    bound_check: Option<BoundCheckArg>,
    /// Signal channel of multi-lead records
    #[arg(long)]
    lead: Option<usize>,
    /// Annotation file extension in record directories
    #[arg(long)]
    annotation_extension: Option<String>,
    /// First sample read from WFDB records
    #[arg(long)]
    sample_from: Option<usize>,
    /// Exclusive end of the samples read from WFDB records
    #[arg(long)]
    sample_to: Option<usize>,
    /// Detector refractory period (seconds)
    #[arg(long)]
    min_rr_s: Option<f64>,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<SegmentationConfig> {
        let mut cfg = match &self.config {
            Some(path) => SegmentationConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => SegmentationConfig::default(),
        };
        if let Some(width) = self.window_width_s {
            cfg.window_width_s = width;
        }
        if let Some(bound) = self.bound_check {
            cfg.bound_check = bound.into();
        }
        if let Some(lead) = self.lead {
            cfg.lead = lead;
        }
        if let Some(ext) = &self.annotation_extension {
            cfg.annotation_extension = ext.clone();
        }
        if let Some(from) = self.sample_from {
            cfg.sample_from = from;
        }
        if self.sample_to.is_some() {
            cfg.sample_to = self.sample_to;
        }
        if let Some(min_rr_s) = self.min_rr_s {
            cfg.detector.min_rr_s = min_rr_s;
        }
        Ok(cfg)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Cut one record, or every record of --dir, into heart-rate-adaptive windows
    Segment {
        /// Directory of WFDB records (.hea + annotation file)
        #[arg(long)]
        dir: Option<PathBuf>,
        #[command(flatten)]
        signal: SignalArgs,
        /// Annotation file for a single record (.atr or `sample symbol` text)
        #[arg(long)]
        annotations: Option<PathBuf>,
        /// Record name for single-record input (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,
        /// Record label for non-WFDB input
        #[arg(long, default_value = "")]
        label: String,
        /// Use this average heart rate instead of detecting R-peaks
        #[arg(long)]
        bpm: Option<f64>,
        #[command(flatten)]
        config: ConfigArgs,
        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "csv")]
        format: OutputFormat,
    },
    /// Report records whose lead polarity is inverted
    CheckPolarity {
        #[arg(long)]
        dir: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Estimate the average heart rate and its cardiac epoch
    HeartRate {
        #[command(flatten)]
        signal: SignalArgs,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Cardiac epoch (seconds around the R-peak) for a heart rate
    Epoch {
        #[arg(long)]
        bpm: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(cli.log_level.as_str()))
        .init();
    match cli.command {
        Commands::Segment {
            dir,
            signal,
            annotations,
            name,
            label,
            bpm,
            config,
            out,
            format,
        } => cmd_segment(
            dir.as_deref(),
            &signal,
            annotations.as_deref(),
            name,
            label,
            bpm,
            &config.resolve()?,
            out.as_deref(),
            format.into(),
        )?,
        Commands::CheckPolarity { dir, config } => cmd_check_polarity(&dir, &config.resolve()?)?,
        Commands::HeartRate { signal, config } => cmd_heart_rate(&signal, &config.resolve()?)?,
        Commands::Epoch { bpm } => cmd_epoch(bpm)?,
    }
    Ok(())
}

fn read_samples(input: Option<&Path>) -> Result<Vec<f64>> {
    match input {
        Some(path) => text_io::read_f64_series(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_f64_series(&buf)
        }
    }
}

fn load_time_series(signal: &SignalArgs, cfg: &SegmentationConfig) -> Result<TimeSeries> {
    if let Some(header) = &signal.wfdb_header {
        Ok(wfdb_io::load_wfdb_lead(header, cfg.lead, cfg.sample_range()?)?)
    } else if let Some(edf) = &signal.edf {
        edf_io::load_edf_channel(edf, signal.edf_channel)
    } else {
        let data = read_samples(signal.input.as_deref())?;
        Ok(TimeSeries { fs: signal.fs, data })
    }
}

fn load_annotations(path: &Path, wfdb_extension: &str) -> Result<AnnotationStream> {
    let is_wfdb = path
        .extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| {
            ext.eq_ignore_ascii_case("atr") || ext.eq_ignore_ascii_case(wfdb_extension)
        });
    if is_wfdb {
        Ok(wfdb_io::load_wfdb_annotations(path)?)
    } else {
        text_io::read_annotations(path)
    }
}

fn single_record(
    signal: &SignalArgs,
    name: Option<String>,
    label: String,
    cfg: &SegmentationConfig,
) -> Result<Record> {
    let ts = load_time_series(signal, cfg)?;
    let source_path = signal
        .wfdb_header
        .as_deref()
        .or(signal.edf.as_deref())
        .or(signal.input.as_deref());
    let mut label = label;
    if let Some(header) = &signal.wfdb_header {
        let parsed = wfdb_io::read_header(header)
            .with_context(|| format!("failed to read {}", header.display()))?;
        if !parsed.comments.is_empty() {
            label = parsed.label();
        }
    }
    let name = name
        .or_else(|| {
            source_path
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "stdin".to_string());
    Ok(Record::new(name, ts, label))
}

fn open_output(out: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}

#[allow(clippy::too_many_arguments)]
fn cmd_segment(
    dir: Option<&Path>,
    signal: &SignalArgs,
    annotations: Option<&Path>,
    name: Option<String>,
    label: String,
    bpm: Option<f64>,
    cfg: &SegmentationConfig,
    out: Option<&Path>,
    format: TableFormat,
) -> Result<()> {
    let detector = PanTompkinsDetector::new(cfg.detector);
    let builder = SegmentDatasetBuilder::new(cfg.clone(), &detector);
    let segments = if let Some(dir) = dir {
        if bpm.is_some() {
            bail!("--bpm applies to a single record, not --dir");
        }
        let source = wfdb_io::WfdbDirectory::open(dir, cfg.lead, &cfg.annotation_extension)?
            .with_sample_range(cfg.sample_range()?);
        builder.build_from_source(&source)?
    } else {
        let Some(annotations) = annotations else {
            bail!("--annotations is required unless --dir is given");
        };
        let record = single_record(signal, name, label, cfg)?;
        let mut stream = load_annotations(annotations, &cfg.annotation_extension)?;
        if signal.wfdb_header.is_some() {
            stream = cfg.sample_range()?.clip(&stream)?;
        }
        match bpm {
            Some(bpm) => builder.build_with_heart_rate(&record, &stream, bpm)?,
            None => builder.build(&record, &stream)?,
        }
    };
    log::info!("{} segments in total", segments.len());
    write_segments(open_output(out)?, &segments, format)
}

fn cmd_check_polarity(dir: &Path, cfg: &SegmentationConfig) -> Result<()> {
    let source = wfdb_io::WfdbDirectory::open(dir, cfg.lead, &cfg.annotation_extension)?
        .with_sample_range(cfg.sample_range()?);
    let report = scan_directory(&source)?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

#[derive(Serialize)]
struct HeartRateSummary {
    bpm: f64,
    epoch_start: f64,
    epoch_end: f64,
}

fn cmd_heart_rate(signal: &SignalArgs, cfg: &SegmentationConfig) -> Result<()> {
    let ts = load_time_series(signal, cfg)?;
    let detector = PanTompkinsDetector::new(cfg.detector);
    let bpm = estimate_bpm(&ts, &detector)?;
    let epoch = compute_epoch(bpm)?;
    let summary = HeartRateSummary {
        bpm,
        epoch_start: epoch.start,
        epoch_end: epoch.end,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_epoch(bpm: f64) -> Result<()> {
    let epoch = compute_epoch(bpm)?;
    println!("{}", serde_json::to_string(&epoch)?);
    Ok(())
}
