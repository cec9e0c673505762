use crate::segment::Segment;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::io::Write;

/// Column order of the segment table.
pub const SEGMENT_COLUMNS: [&str; 9] = [
    "parent_record",
    "label",
    "avg_heart_rate",
    "signals",
    "beat_annotation_symbols",
    "annotated_samples",
    "beat_occurrence",
    "pac_percent",
    "pvc_percent",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    /// Comma separated; list and map cells hold JSON.
    #[default]
    Csv,
    /// One JSON object per segment.
    JsonLines,
}

/// CSV cells cannot nest, so sequence columns are flattened to JSON text.
#[derive(Serialize)]
struct CsvRow<'a> {
    parent_record: &'a str,
    label: &'a str,
    avg_heart_rate: f64,
    signals: String,
    beat_annotation_symbols: String,
    annotated_samples: String,
    beat_occurrence: String,
    pac_percent: f64,
    pvc_percent: f64,
}

impl<'a> CsvRow<'a> {
    fn from_segment(segment: &'a Segment) -> Result<Self> {
        Ok(Self {
            parent_record: &segment.parent_record,
            label: &segment.label,
            avg_heart_rate: segment.avg_heart_rate,
            signals: serde_json::to_string(&segment.signals)?,
            beat_annotation_symbols: serde_json::to_string(&segment.beat_annotation_symbols)?,
            annotated_samples: serde_json::to_string(&segment.annotated_samples)?,
            beat_occurrence: serde_json::to_string(&segment.beat_occurrence)?,
            pac_percent: segment.pac_percent,
            pvc_percent: segment.pvc_percent,
        })
    }
}

pub fn write_segments_csv<W: Write>(writer: W, segments: &[Segment]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(SEGMENT_COLUMNS)?;
    for (idx, segment) in segments.iter().enumerate() {
        wtr.serialize(CsvRow::from_segment(segment)?)
            .with_context(|| format!("writing segment {} of {}", idx, segment.parent_record))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_segments_jsonl<W: Write>(mut writer: W, segments: &[Segment]) -> Result<()> {
    for segment in segments {
        serde_json::to_writer(&mut writer, segment)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_segments<W: Write>(
    writer: W,
    segments: &[Segment],
    format: TableFormat,
) -> Result<()> {
    match format {
        TableFormat::Csv => write_segments_csv(writer, segments),
        TableFormat::JsonLines => write_segments_jsonl(writer, segments),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csv::ReaderBuilder;
    use std::collections::BTreeMap;

    fn segment() -> Segment {
        Segment {
            parent_record: "data_0_1".into(),
            label: "paroxysmal atrial fibrillation".into(),
            avg_heart_rate: 88.0,
            signals: vec![0.1234, -0.5],
            beat_annotation_symbols: vec!["N".into(), "A".into()],
            annotated_samples: vec![12, 140],
            beat_occurrence: BTreeMap::from([("A".to_string(), 1), ("N".to_string(), 1)]),
            pac_percent: 50.0,
            pvc_percent: 0.0,
        }
    }

    #[test]
    fn csv_keeps_column_order_and_json_cells() {
        let mut buf = Vec::new();
        write_segments_csv(&mut buf, &[segment()]).unwrap();
        let mut rdr = ReaderBuilder::new().from_reader(buf.as_slice());
        let headers: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, SEGMENT_COLUMNS);
        let row = rdr.records().next().unwrap().unwrap();
        assert_eq!(&row[0], "data_0_1");
        assert_eq!(&row[3], "[0.1234,-0.5]");
        assert_eq!(&row[4], r#"["N","A"]"#);
        assert_eq!(&row[6], r#"{"A":1,"N":1}"#);
        assert_eq!(row[7].parse::<f64>().unwrap(), 50.0);
    }

    #[test]
    fn empty_table_still_has_header() {
        let mut buf = Vec::new();
        write_segments(&mut buf, &[], TableFormat::Csv).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.trim_end(), SEGMENT_COLUMNS.join(","));
    }

    #[test]
    fn json_lines_deserialize_back() {
        let mut buf = Vec::new();
        write_segments(&mut buf, &[segment(), segment()], TableFormat::JsonLines).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let rows: Vec<Segment> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(rows, vec![segment(), segment()]);
    }
}
