//! CSV-file observation store.
//!
//! Rows are appended as single complete lines to a file opened in append
//! mode. Readers snapshot the file and drop an unterminated trailing line,
//! which is what an append in flight from another process looks like.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use pulse_core::record::COLUMNS;
use pulse_core::{Observation, PulseRecord};
use tracing::{debug, info};

use crate::{ObservationStore, StoreError};

/// Observation store backed by one CSV file with a header row.
#[derive(Debug)]
pub struct CsvObservationStore {
    path: PathBuf,
    /// Serializes appends (and snapshots) issued from this process.
    lock: Mutex<()>,
}

impl CsvObservationStore {
    /// Open a store at `path`. The file is created lazily on first append;
    /// a missing file reads as an empty store.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encode one row (plus the header when the file is new) into a buffer
    /// so it reaches the file in a single write.
    fn encode_row(record: &PulseRecord, with_header: bool, leading_newline: bool) -> Result<Vec<u8>, StoreError> {
        let mut buf = Vec::new();
        if leading_newline {
            buf.push(b'\n');
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(buf);
        if with_header {
            writer.write_record(COLUMNS)?;
        }
        writer.serialize(record)?;
        writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))
    }
}

/// True when the file is non-empty and its last byte is not a newline.
fn ends_mid_line(path: &Path, len: u64) -> io::Result<bool> {
    if len == 0 {
        return Ok(false);
    }
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl ObservationStore for CsvObservationStore {
    fn append(&self, observation: &Observation) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let len = file.metadata()?.len();
        let needs_header = len == 0;
        let leading_newline = ends_mid_line(&self.path, len)?;

        let bytes = Self::encode_row(&observation.to_record(), needs_header, leading_newline)?;
        file.write_all(&bytes)?;
        file.flush()?;

        if needs_header {
            info!(path = %self.path.display(), "created observation store");
        }
        debug!(
            region = observation.region(),
            sector = observation.sector(),
            "observation appended"
        );
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<PulseRecord>, StoreError> {
        let bytes = {
            let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
            match fs::read(&self.path) {
                Ok(b) => b,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %self.path.display(), "store file absent, reading as empty");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e.into()),
            }
        };

        let complete = match bytes.iter().rposition(|&b| b == b'\n') {
            Some(end) => &bytes[..=end],
            None => &bytes[..0],
        };
        if complete.len() < bytes.len() {
            debug!(
                skipped_bytes = bytes.len() - complete.len(),
                "ignoring unterminated trailing line"
            );
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(complete);
        let headers = reader.headers()?.clone();
        let mut records = Vec::new();
        for row in reader.records() {
            let mut row = row?;
            // Short rows read as empty trailing cells; feature extraction
            // reports the missing numerics against the row.
            while row.len() < headers.len() {
                row.push_field("");
            }
            records.push(row.deserialize(Some(&headers))?);
        }
        Ok(records)
    }
}
