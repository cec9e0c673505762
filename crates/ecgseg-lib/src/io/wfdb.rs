use crate::{
    error::{SegmentError, SegmentResult},
    signal::{AnnotationStream, BeatAnnotation, Record, SampleRange, TimeSeries},
    source::RecordSource,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Mnemonics of the MIT annotation codes 0..=41 (`ecgcodes.h`).
const ANNOTATION_SYMBOLS: [&str; 42] = [
    " ", "N", "L", "R", "a", "V", "F", "J", "A", "S", "E", "j", "/", "Q", "~", "[15]", "|",
    "[17]", "s", "T", "*", "D", "\"", "=", "p", "B", "^", "t", "+", "u", "?", "!", "[", "]",
    "e", "n", "@", "x", "f", "(", ")", "r",
];

const SKIP: u8 = 59;
const NUM: u8 = 60;
const SUB: u8 = 61;
const CHN: u8 = 62;
const AUX: u8 = 63;

/// Raw WFDB annotation entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WfdbAnnotation {
    pub sample: usize,
    pub code: u8,
}

impl WfdbAnnotation {
    pub fn symbol(&self) -> String {
        ANNOTATION_SYMBOLS
            .get(self.code as usize)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("[{}]", self.code))
    }
}

/// Parse MIT annotation binary stream into samples & codes.
pub fn parse_wfdb_annotations(buf: &[u8]) -> Vec<WfdbAnnotation> {
    let mut out = Vec::new();
    let mut idx = 0;
    let mut sample: usize = 0;
    while idx + 2 <= buf.len() {
        let word = u16::from_le_bytes([buf[idx], buf[idx + 1]]);
        idx += 2;
        let code = (word >> 10) as u8;
        let value = (word & 0x03FF) as usize;
        match (code, value) {
            (0, 0) => break,
            (SKIP, _) => {
                if idx + 4 > buf.len() {
                    break;
                }
                let high = u16::from_le_bytes([buf[idx], buf[idx + 1]]) as u32;
                let low = u16::from_le_bytes([buf[idx + 2], buf[idx + 3]]) as u32;
                idx += 4;
                let skip = ((high << 16) | low) as i32;
                sample = sample.saturating_add_signed(skip as isize);
            }
            // NUM/SUB/CHN carry a field value, not a time difference.
            (NUM..=CHN, _) => {}
            (AUX, len) => idx += len + len % 2,
            _ => {
                sample = sample.saturating_add(value);
                out.push(WfdbAnnotation { sample, code });
            }
        }
    }
    out
}

/// Read a WFDB annotation file, keeping every annotation and its symbol.
pub fn load_wfdb_annotations(path: &Path) -> SegmentResult<AnnotationStream> {
    if !path.exists() {
        return Err(SegmentError::PathNotFound(path.to_path_buf()));
    }
    let buf = fs::read(path)?;
    let annotations = parse_wfdb_annotations(&buf)
        .into_iter()
        .map(|ann| BeatAnnotation::new(ann.sample, ann.symbol()))
        .collect();
    AnnotationStream::new(annotations)
}

/// WFDB default sampling frequency when the record line omits it.
const DEFAULT_FS: f64 = 250.0;
/// WFDB default ADC gain when a signal line omits it or declares zero.
const DEFAULT_GAIN: f64 = 200.0;

/// One signal specification line of a header.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub file: String,
    /// Storage format code, e.g. 16 or 212.
    pub format: u16,
    pub samples_per_frame: usize,
    pub byte_offset: usize,
    /// ADC units per physical unit.
    pub gain: f64,
    pub baseline: f64,
    pub description: String,
}

/// The parts of a `.hea` header needed to read one lead.
#[derive(Debug, Clone, PartialEq)]
pub struct WfdbHeader {
    pub name: String,
    pub fs: f64,
    pub samples_per_signal: Option<usize>,
    pub signals: Vec<SignalSpec>,
    /// `#` comment lines; the first one carries the diagnosis.
    pub comments: Vec<String>,
}

impl WfdbHeader {
    pub fn label(&self) -> String {
        self.comments.first().cloned().unwrap_or_default()
    }

    /// Distinct signal files in declaration order.
    pub fn signal_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        for spec in &self.signals {
            if !files.contains(&spec.file.as_str()) {
                files.push(&spec.file);
            }
        }
        files
    }
}

fn header_error(message: impl Into<String>) -> SegmentError {
    SegmentError::Parse {
        context: "WFDB header".to_string(),
        message: message.into(),
    }
}

fn parse_field<T: FromStr>(token: Option<&str>, what: &str) -> SegmentResult<T> {
    let token = token.ok_or_else(|| header_error(format!("missing {}", what)))?;
    token
        .parse()
        .map_err(|_| header_error(format!("invalid {} {:?}", what, token)))
}

/// Parse header text. Malformed fields are reported, never assumed.
pub fn parse_header(text: &str) -> SegmentResult<WfdbHeader> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));
    let record = lines
        .next()
        .ok_or_else(|| header_error("missing record line"))?;
    let mut fields = record.split_whitespace();
    // Multi-segment records declare `name/segments`.
    let name = fields
        .next()
        .and_then(|name| name.split('/').next())
        .unwrap_or_default()
        .to_string();
    let signal_count: usize = parse_field(fields.next(), "signal count")?;
    let fs = match fields.next() {
        // `fs/counter(base)` keeps the sampling frequency first.
        Some(token) => parse_field(token.split('/').next(), "sampling frequency")?,
        None => DEFAULT_FS,
    };
    if !(fs > 0.0) || !f64::is_finite(fs) {
        return Err(header_error(format!("sampling frequency {} is not positive", fs)));
    }
    let samples_per_signal = match fields.next() {
        Some(token) => Some(parse_field(Some(token), "samples per signal")?),
        None => None,
    };
    let signals = lines
        .take(signal_count)
        .map(parse_signal_line)
        .collect::<SegmentResult<Vec<_>>>()?;
    if signals.len() != signal_count {
        return Err(header_error(format!(
            "record {} declares {} signals but has {} signal lines",
            name,
            signal_count,
            signals.len()
        )));
    }
    Ok(WfdbHeader {
        name,
        fs,
        samples_per_signal,
        signals,
        comments: parse_header_comments(text),
    })
}

/// `file format[xspf][:skew][+offset] gain[(baseline)][/units] res zero init cksum bsize desc`
fn parse_signal_line(line: &str) -> SegmentResult<SignalSpec> {
    let mut fields = line.split_whitespace();
    let file = fields.next().unwrap_or_default().to_string();
    let format_token = fields
        .next()
        .ok_or_else(|| header_error(format!("{} has no storage format", file)))?;
    let (format_token, byte_offset) = match format_token.split_once('+') {
        Some((format, offset)) => (format, parse_field(Some(offset), "byte offset")?),
        None => (format_token, 0),
    };
    let format_token = format_token.split(':').next().unwrap_or(format_token);
    let (format_code, samples_per_frame) = match format_token.split_once('x') {
        Some((format, spf)) => (format, parse_field(Some(spf), "samples per frame")?),
        None => (format_token, 1),
    };
    let format: u16 = parse_field(Some(format_code), "storage format")?;

    let mut gain = DEFAULT_GAIN;
    let mut baseline: Option<i64> = None;
    if let Some(token) = fields.next() {
        let token = token.split('/').next().unwrap_or(token);
        let (gain_token, baseline_token) = match token.split_once('(') {
            Some((gain, baseline)) => (gain, Some(baseline.trim_end_matches(')'))),
            None => (token, None),
        };
        let declared: f64 = parse_field(Some(gain_token), "ADC gain")?;
        if declared != 0.0 {
            gain = declared;
        }
        if let Some(token) = baseline_token {
            baseline = Some(parse_field(Some(token), "baseline")?);
        }
    }
    // ADC resolution
    fields.next();
    let adc_zero: i64 = match fields.next() {
        Some(token) => parse_field(Some(token), "ADC zero")?,
        None => 0,
    };
    // Initial value, checksum and block size precede the description.
    let description = fields.skip(3).collect::<Vec<_>>().join(" ");
    Ok(SignalSpec {
        file,
        format,
        samples_per_frame,
        byte_offset,
        gain,
        baseline: baseline.unwrap_or(adc_zero) as f64,
        description,
    })
}

pub fn read_header(path: &Path) -> SegmentResult<WfdbHeader> {
    if !path.is_file() {
        return Err(SegmentError::PathNotFound(path.to_path_buf()));
    }
    parse_header(&fs::read_to_string(path)?)
}

/// Digital samples of one lead, de-interleaved from its signal file.
fn read_digital(dir: &Path, header: &WfdbHeader, lead: usize) -> SegmentResult<Vec<i16>> {
    let spec = &header.signals[lead];
    let group: Vec<&SignalSpec> = header
        .signals
        .iter()
        .filter(|s| s.file == spec.file)
        .collect();
    if group
        .iter()
        .any(|s| s.format != spec.format || s.samples_per_frame != 1)
    {
        return Err(SegmentError::InvalidInput(format!(
            "{}: mixed formats or multiple samples per frame are not supported",
            spec.file
        )));
    }
    let position = header.signals[..lead]
        .iter()
        .filter(|s| s.file == spec.file)
        .count();
    let path = dir.join(&spec.file);
    if !path.is_file() {
        return Err(SegmentError::PathNotFound(path));
    }
    let bytes = fs::read(&path)?;
    let body = bytes.get(spec.byte_offset..).unwrap_or_default();
    let frames: Vec<i16> = match spec.format {
        16 => body
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect(),
        212 => wfdb_rust::signal::parse_212_format(body),
        other => {
            return Err(SegmentError::InvalidInput(format!(
                "{}: storage format {} is not supported",
                spec.file, other
            )))
        }
    };
    let mut samples: Vec<i16> = frames
        .into_iter()
        .skip(position)
        .step_by(group.len())
        .collect();
    // Format 212 pads an odd sample count with a half-filled triplet.
    if let Some(len) = header.samples_per_signal {
        samples.truncate(len);
    }
    Ok(samples)
}

fn read_lead(
    dir: &Path,
    header: &WfdbHeader,
    lead: usize,
    range: SampleRange,
) -> SegmentResult<TimeSeries> {
    let Some(spec) = header.signals.get(lead) else {
        return Err(SegmentError::InvalidInput(format!(
            "WFDB record contains {} signals, but lead {} was requested",
            header.signals.len(),
            lead
        )));
    };
    let digital = range.apply(read_digital(dir, header, lead)?)?;
    let data = digital
        .into_iter()
        .map(|sample| (f64::from(sample) - spec.baseline) / spec.gain)
        .collect();
    Ok(TimeSeries {
        fs: header.fs,
        data,
    })
}

/// Load one lead of a WFDB record in physical units, limited to `range`.
pub fn load_wfdb_lead(
    header_path: &Path,
    lead: usize,
    range: SampleRange,
) -> SegmentResult<TimeSeries> {
    let header = read_header(header_path)?;
    let dir = header_path.parent().unwrap_or_else(|| Path::new("."));
    read_lead(dir, &header, lead, range)
}

/// Comment lines of a header (`# ...`), without the leading marker.
fn parse_header_comments(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.trim_start().strip_prefix('#'))
        .map(|comment| comment.trim().to_string())
        .filter(|comment| !comment.is_empty())
        .collect()
}

/// Directory of WFDB records, each a `.hea` header with a companion
/// annotation file.
#[derive(Debug, Clone)]
pub struct WfdbDirectory {
    dir: PathBuf,
    lead: usize,
    annotation_extension: String,
    range: SampleRange,
}

impl WfdbDirectory {
    pub fn open(dir: &Path, lead: usize, annotation_extension: &str) -> SegmentResult<Self> {
        if !dir.is_dir() {
            return Err(SegmentError::PathNotFound(dir.to_path_buf()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            lead,
            annotation_extension: annotation_extension.trim_start_matches('.').to_string(),
            range: SampleRange::default(),
        })
    }

    /// Read only `range` of every record; annotations are re-indexed to match.
    pub fn with_sample_range(mut self, range: SampleRange) -> Self {
        self.range = range;
        self
    }

    pub fn header_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.hea", id))
    }

    pub fn annotation_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, self.annotation_extension))
    }
}

impl RecordSource for WfdbDirectory {
    fn record_ids(&self) -> SegmentResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("hea") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if self.annotation_path(stem).is_file() {
                ids.push(stem.to_string());
            } else {
                log::debug!("{} has no .{} annotations", stem, self.annotation_extension);
            }
        }
        ids.sort();
        log::info!("{} records in {}", ids.len(), self.dir.display());
        Ok(ids)
    }

    fn load(&self, id: &str) -> SegmentResult<(Record, AnnotationStream)> {
        let header_path = self.header_path(id);
        let annotation = self.annotation_path(id);
        if !header_path.is_file() || !annotation.is_file() {
            return Err(SegmentError::RecordNotFound(id.to_string()));
        }
        let header = read_header(&header_path)?;
        for file in header.signal_files() {
            let data = self.dir.join(file);
            if !data.is_file() {
                return Err(SegmentError::PathNotFound(data));
            }
        }
        let signal = read_lead(&self.dir, &header, self.lead, self.range)?;
        let mut annotations = load_wfdb_annotations(&annotation)?;
        if !self.range.is_full() {
            annotations = self.range.clip(&annotations)?;
        }
        let name = if header.name.is_empty() {
            id.to_string()
        } else {
            header.name.clone()
        };
        Ok((Record::new(name, signal, header.label()), annotations))
    }
}
