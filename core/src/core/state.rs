/// Agent state persistence.
///
/// Only the `(delay, max_retries, learning_rate)` triple is written, as pretty
/// JSON. Writes go to a `.tmp` sibling first and are renamed into place so a
/// crash mid-flush never leaves a truncated file behind.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use super::agent::ControllerState;
use crate::error::{Result, TuneError};

pub const DEFAULT_STATE_FILE: &str = "trained_agent.json";

/// Somewhere a controller state can be saved to and restored from.
pub trait StateStore: Send + Sync {
    fn save(&self, state: &ControllerState) -> Result<()>;
    fn load(&self) -> Result<ControllerState>;
    /// Human-readable location, used in logs and summaries.
    fn location(&self) -> String;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn io_err(&self, source: std::io::Error) -> TuneError {
        TuneError::Persistence { path: self.path.clone(), source }
    }
}

impl StateStore for JsonFileStore {
    fn save(&self, state: &ControllerState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|source| TuneError::StateFormat { path: self.path.clone(), source })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        info!("Agent saved to {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<ControllerState> {
        let data = fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        let state: ControllerState = serde_json::from_str(&data)
            .map_err(|source| TuneError::StateFormat { path: self.path.clone(), source })?;
        state
            .validate()
            .map_err(|reason| TuneError::CorruptState { path: self.path.clone(), reason })?;
        info!("Agent loaded from {}", self.path.display());
        Ok(state)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
