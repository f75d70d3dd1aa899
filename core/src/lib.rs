pub mod core;
pub mod error;
pub mod http;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use url::Url;

pub use crate::core::agent::{ControllerAgent, ControllerState};
pub use crate::core::dispatcher::{DispatchReport, Dispatcher};
pub use crate::core::history::EpochHistory;
pub use crate::core::retry::{run_logical_request, RequestOutcome};
pub use crate::core::state::{JsonFileStore, StateStore, DEFAULT_STATE_FILE};
pub use crate::core::trainer::{EpochRecord, Trainer, TrainingSummary};
pub use crate::core::{EpochAction, EpochResult, MIN_DELAY, MIN_RETRIES};
pub use crate::error::{Result, TransportError, TuneError};
pub use crate::http::{HttpClient, Transport};

pub const DEFAULT_TARGET: &str = "https://github.com/Armanx200";

/// Run configuration shared by the CLI and config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TuneConfig {
    pub target: String,
    pub requests: usize,
    pub timeout: u64,
    pub connections: usize,
    pub epochs: u32,
    pub learning_rate: f64,
    pub initial_delay: Option<f64>,
    pub initial_max_retries: Option<u32>,
    pub delay_noise: f64,
    pub retries_noise: f64,
    pub seed: Option<u64>,
    pub state_path: String,
    pub resume_from: Option<String>,
    pub history: Option<String>,
    pub headers: Vec<String>,
    pub proxy: String,
    pub verbose: bool,
    pub dry_run: bool,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            requests: 1000,
            timeout: 10,
            connections: 100,
            epochs: 200,
            learning_rate: crate::core::agent::DEFAULT_LEARNING_RATE,
            initial_delay: None,
            initial_max_retries: None,
            delay_noise: crate::core::agent::DEFAULT_DELAY_NOISE,
            retries_noise: crate::core::agent::DEFAULT_RETRIES_NOISE,
            seed: None,
            state_path: DEFAULT_STATE_FILE.to_string(),
            resume_from: None,
            history: None,
            headers: Vec::new(),
            proxy: String::new(),
            verbose: false,
            dry_run: false,
        }
    }
}

impl TuneConfig {
    /// Reads a JSON config file; missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            TuneError::invalid(format!("cannot read config {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            TuneError::invalid(format!("cannot parse config {}: {}", path.display(), e))
        })
    }

    /// Validates every knob and returns the fixed target description.
    ///
    /// Nothing is sent anywhere before this succeeds.
    pub fn target_config(&self) -> Result<TargetConfig> {
        if self.epochs == 0 {
            return Err(TuneError::invalid("epochs must be positive"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(TuneError::invalid(format!(
                "learning rate {} must be in (0, 1]",
                self.learning_rate
            )));
        }
        let noise = [("delay noise", self.delay_noise), ("retries noise", self.retries_noise)];
        for (name, sd) in noise {
            if !sd.is_finite() || sd < 0.0 {
                return Err(TuneError::invalid(format!(
                    "{} {} must be finite and >= 0",
                    name, sd
                )));
            }
        }
        if let Some(delay) = self.initial_delay {
            if !delay.is_finite() || delay < MIN_DELAY {
                return Err(TuneError::invalid(format!("initial delay must be >= {}", MIN_DELAY)));
            }
        }
        if self.initial_max_retries == Some(0) {
            return Err(TuneError::invalid("initial max retries must be >= 1"));
        }
        TargetConfig::new(
            &self.target,
            self.requests,
            Duration::from_secs(self.timeout),
            self.connections,
        )
    }

    /// Each entry is one whole `Key: Value` header; values may contain `;`.
    pub fn parsed_headers(&self) -> Vec<(String, String)> {
        parse_custom_headers(&self.headers)
    }

    pub fn proxy_ref(&self) -> Option<&str> {
        if self.proxy.is_empty() { None } else { Some(&self.proxy) }
    }

    pub fn resume_ref(&self) -> Option<&str> {
        self.resume_from.as_deref().filter(|s| !s.is_empty())
    }

    pub fn history_ref(&self) -> Option<&str> {
        self.history.as_deref().filter(|s| !s.is_empty())
    }
}

pub fn parse_custom_headers(raw: &[String]) -> Vec<(String, String)> {
    raw.iter().filter_map(|h| {
        let mut parts = h.splitn(2, ':');
        let key = parts.next()?.trim().to_string();
        let val = parts.next().unwrap_or("").trim().to_string();
        if key.is_empty() { return None; }
        Some((key, val))
    }).collect()
}

/// The fixed target of a training run. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetConfig {
    pub url: Url,
    pub request_count: usize,
    pub timeout: Duration,
    pub connection_ceiling: usize,
}

impl TargetConfig {
    pub fn new(
        url: &str,
        request_count: usize,
        timeout: Duration,
        connection_ceiling: usize,
    ) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| TuneError::invalid(format!("target '{}': {}", url, e)))?;
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(TuneError::invalid(format!("target '{}' is not an http(s) URL", url)));
        }
        if request_count == 0 {
            return Err(TuneError::invalid("request count must be positive"));
        }
        if timeout.is_zero() {
            return Err(TuneError::invalid("timeout must be positive"));
        }
        if connection_ceiling == 0 || connection_ceiling > Semaphore::MAX_PERMITS {
            return Err(TuneError::invalid(format!(
                "connection ceiling {} must be between 1 and {}",
                connection_ceiling,
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(Self { url, request_count, timeout, connection_ceiling })
    }
}

/// Receives training progress. The CLI renders it; tests record it.
pub trait TrainingEventSink: Send + Sync {
    fn on_epoch(&self, record: &EpochRecord);
    fn on_summary(&self, summary: &TrainingSummary);
}

pub type SinkRef = Arc<dyn TrainingEventSink>;

/// Sink that forwards everything to the `log` facade.
pub struct LogSink;

impl LogSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self)
    }
}

impl TrainingEventSink for LogSink {
    fn on_epoch(&self, r: &EpochRecord) {
        info!(
            "Epoch {}/{} | Delay: {:.2} | Max Retries: {} | Success Count: {} | Reward: {:.2}",
            r.epoch, r.epochs, r.delay, r.max_retries, r.success_count, r.reward
        );
    }

    fn on_summary(&self, s: &TrainingSummary) {
        info!(
            "Training completed. Final Policy -> Delay: {:.2}, Max Retries: {} | \
             Mean Reward: {:.2}",
            s.final_state.delay,
            s.final_state.retry_ceiling(),
            s.mean_reward
        );
    }
}
