use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::agent::{ControllerAgent, ControllerState};
use super::dispatcher::Dispatcher;
use super::history::EpochHistory;
use super::state::{JsonFileStore, StateStore};
use super::EpochResult;
use crate::error::Result;
use crate::http::{HttpClient, Transport};
use crate::{SinkRef, TuneConfig};

/// What happened in one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: u32,
    pub epochs: u32,
    pub delay: f64,
    pub max_retries: u32,
    pub success_count: usize,
    pub request_count: usize,
    pub reward: f64,
    pub attempts: u64,
    pub elapsed_ms: u128,
}

/// Emitted once, after the final epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs: u32,
    pub final_state: ControllerState,
    pub mean_reward: f64,
    pub best_epoch: Option<u32>,
    pub best_reward: f64,
    pub state_path: String,
}

/// Runs epochs back to back: pick an action, dispatch a round, reward the
/// agent with the success ratio.
pub struct Trainer {
    agent: ControllerAgent,
    dispatcher: Dispatcher,
    epochs: u32,
    sink: SinkRef,
    history: Option<EpochHistory>,
    rng: StdRng,
}

impl Trainer {
    pub fn new(agent: ControllerAgent, dispatcher: Dispatcher, epochs: u32, sink: SinkRef) -> Self {
        Self {
            agent,
            dispatcher,
            epochs,
            sink,
            history: None,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Builds a trainer that talks to the real target over HTTP, plus the
    /// store its final state goes to.
    pub fn from_config(config: &TuneConfig, sink: SinkRef) -> Result<(Self, JsonFileStore)> {
        let target = config.target_config()?;
        let client = HttpClient::new(
            target.timeout,
            target.connection_ceiling,
            config.proxy_ref(),
            &config.parsed_headers(),
        )?;
        Self::from_config_with_transport(config, Arc::new(client), sink)
    }

    /// Same as [`Trainer::from_config`] with a caller-supplied transport.
    pub fn from_config_with_transport(
        config: &TuneConfig,
        transport: Arc<dyn Transport>,
        sink: SinkRef,
    ) -> Result<(Self, JsonFileStore)> {
        let target = config.target_config()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let state = initial_state(config, &mut rng)?;
        let agent = ControllerAgent::with_noise(state, config.delay_noise, config.retries_noise)?;
        let dispatcher = Dispatcher::new(transport, target);

        let mut trainer = Self::new(agent, dispatcher, config.epochs, sink).with_rng(rng);
        if let Some(path) = config.history_ref() {
            match EpochHistory::open(path) {
                Ok(history) => trainer = trainer.with_history(history),
                Err(e) => warn!("Failed to open history file '{}': {}", path, e),
            }
        }

        Ok((trainer, JsonFileStore::new(&config.state_path)))
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_history(mut self, history: EpochHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn agent(&self) -> &ControllerAgent {
        &self.agent
    }

    /// Runs one epoch and feeds its reward back to the agent.
    pub async fn run_epoch(&mut self, epoch: u32) -> EpochRecord {
        let action = self.agent.choose_action(&mut self.rng);
        let started = Instant::now();
        let report = self.dispatcher.run(action).await;

        let result = EpochResult::new(report.success_count, self.dispatcher.target().request_count);
        let reward = result.reward();
        if !self.agent.update(reward, &action) {
            debug!("Epoch {} earned no reward; agent left unchanged", epoch);
        }

        EpochRecord {
            epoch,
            epochs: self.epochs,
            delay: action.delay,
            max_retries: action.max_retries,
            success_count: result.success_count,
            request_count: result.request_count,
            reward,
            attempts: report.attempts,
            elapsed_ms: started.elapsed().as_millis(),
        }
    }

    /// Runs every epoch, then saves the agent to `store`.
    ///
    /// There is no early stop. Only a failed save is reported as an error.
    pub async fn run(&mut self, store: &dyn StateStore) -> Result<TrainingSummary> {
        let mut total_reward = 0.0;
        let mut best: Option<(u32, f64)> = None;

        for epoch in 1..=self.epochs {
            let record = self.run_epoch(epoch).await;

            total_reward += record.reward;
            if best.map_or(true, |(_, r)| record.reward > r) {
                best = Some((epoch, record.reward));
            }

            if let Some(history) = self.history.as_mut() {
                history.append(&record);
            }
            self.sink.on_epoch(&record);
        }

        let final_state = *self.agent.state();
        store.save(&final_state)?;

        let summary = TrainingSummary {
            epochs: self.epochs,
            final_state,
            mean_reward: if self.epochs > 0 { total_reward / self.epochs as f64 } else { 0.0 },
            best_epoch: best.map(|(e, _)| e),
            best_reward: best.map_or(0.0, |(_, r)| r),
            state_path: store.location(),
        };
        self.sink.on_summary(&summary);
        Ok(summary)
    }
}

/// Resumed state wins over explicit initial values, which win over random
/// ones.
fn initial_state(config: &TuneConfig, rng: &mut StdRng) -> Result<ControllerState> {
    if let Some(path) = config.resume_ref() {
        return JsonFileStore::new(path).load();
    }

    let mut state = ControllerState::randomized(rng, config.learning_rate)?;
    if let Some(delay) = config.initial_delay {
        state.delay = delay;
    }
    if let Some(retries) = config.initial_max_retries {
        state.max_retries = retries as f64;
    }
    ControllerState::new(state.delay, state.max_retries, state.learning_rate)
}
