use crate::signal::TimeSeries;
use anyhow::{anyhow, Result};
use edf_reader::file_reader::SyncFileReader;
use edf_reader::sync_reader::SyncEDFReader;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Positional reads against an EDF file on disk.
struct DiskFileReader {
    path: PathBuf,
}

impl SyncFileReader for DiskFileReader {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, std::io::Error> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Load one EDF channel (by index), e.g. the lead exported by a portable ECG device.
pub fn load_edf_channel(path: &Path, channel: usize) -> Result<TimeSeries> {
    let reader = SyncEDFReader::init_with_file_reader(DiskFileReader {
        path: path.to_path_buf(),
    })?;
    let header = &reader.edf_header;
    let Some(hdr_chan) = header.channels.get(channel) else {
        return Err(anyhow!(
            "EDF file has {} channels; channel {} is out of range",
            header.channels.len(),
            channel
        ));
    };
    // block_duration is expressed in milliseconds.
    let fs = hdr_chan.number_of_samples_in_data_record as f64 * 1000.0
        / header.block_duration as f64;
    let total_duration = header.block_duration * header.number_of_blocks;
    let mut window = reader.read_data_window(0, total_duration)?;
    if channel >= window.len() {
        return Err(anyhow!("missing data for EDF channel {}", channel));
    }
    let data = window
        .swap_remove(channel)
        .into_iter()
        .map(f64::from)
        .collect();
    Ok(TimeSeries { fs, data })
}
