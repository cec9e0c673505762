use crate::signal::{AnnotationStream, BeatAnnotation};
use anyhow::{Context, Result};
use std::path::Path;

fn data_lines<'a>(text: &'a str) -> impl Iterator<Item = (usize, &'a str)> + 'a {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parse newline-delimited floating point series, ignoring blank/comment lines.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (line_no, line) in data_lines(text) {
        let val: f64 = line
            .parse()
            .with_context(|| format!("line {} is not f64: {}", line_no, line))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Read a newline-delimited floating point series from disk.
pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text)
}

/// Parse `sample symbol` lines (whitespace or comma separated). A line with
/// only a sample index is read as a normal beat.
pub fn parse_annotations(text: &str) -> Result<AnnotationStream> {
    let mut out = Vec::new();
    for (line_no, line) in data_lines(text) {
        let mut fields = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty());
        let sample: usize = fields
            .next()
            .unwrap_or_default()
            .parse()
            .with_context(|| format!("line {} has no integer sample index: {}", line_no, line))?;
        let symbol = fields.next().unwrap_or("N");
        out.push(BeatAnnotation::new(sample, symbol));
    }
    Ok(AnnotationStream::new(out)?)
}

/// Read an annotation text file.
pub fn read_annotations(path: &Path) -> Result<AnnotationStream> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_annotations(&text).with_context(|| format!("parsing {}", path.display()))
}
