use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use log::warn;

use super::trainer::EpochRecord;

/// Appends one JSON line per epoch to a history file.
///
/// The history is a log, not state: write failures are reported and skipped.
pub struct EpochHistory {
    file: File,
}

impl EpochHistory {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    pub fn append(&mut self, record: &EpochRecord) {
        match serde_json::to_string(record) {
            Ok(line) => {
                if let Err(e) = writeln!(self.file, "{}", line) {
                    warn!("Failed to write epoch {} to history: {}", record.epoch, e);
                }
            }
            Err(e) => warn!("Failed to serialize epoch {}: {}", record.epoch, e),
        }
    }
}
