//! Training Loop
//!
//! Owns the online and target networks, the replay buffer and the reward
//! function, and drives epochs of exploration, learning, target tracking,
//! validation and checkpointing.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::checkpointing::{epoch_name, Checkpointer, ModelCheckpoint, BEST_MODEL};
use crate::error::{Result, TraderError};
use crate::rl::algorithms::DdpgLearner;
use crate::rl::config::{RLConfig, TargetSync};
use crate::rl::core::{
    Candle, RewardEvaluator, RewardFunction, RewardSignal, StateWindow, TradeAction, TradeSetup,
};
use crate::rl::environment::MarketDataSource;
use crate::rl::exploration::OrnsteinUhlenbeckNoise;
use crate::rl::memory::{Experience, ReplayBuffer};
use crate::rl::networks::linalg::clip;
use crate::rl::networks::{ErrorSignal, LstmEncoder};

/// Bound on the TD error fed to every update
const TD_CLIP: f64 = 1.0;

/// Phase of the epoch state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPhase {
    Running,
    Validating,
    Improved,
    NoImprovement,
    EarlyStopped,
    Done,
}

/// Result of a prediction
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Post-processed trade decision
    pub action: TradeAction,
    /// Actor output after optional noise, before post-processing
    pub raw_action: Vec<f64>,
    /// Encoder representation the actor acted on
    pub hidden_state: Vec<f64>,
}

/// Result of one environment step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub index: usize,
    pub action: TradeAction,
    pub signal: RewardSignal,
    /// Whether the experience went into the replay buffer
    pub stored: bool,
    /// Mean |TD error| if a learning step ran
    pub loss: Option<f64>,
}

/// Per-epoch statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct EpochReport {
    /// 1-based epoch number
    pub epoch: usize,
    pub average_reward: f64,
    pub valid_steps: usize,
    pub failed_steps: usize,
    pub learn_steps: usize,
    pub average_loss: f64,
    pub validation_reward: f64,
    pub improved: bool,
    pub buffer_len: usize,
}

/// Whole-run statistics
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub epochs_run: usize,
    pub best_validation_reward: Option<f64>,
    pub final_phase: TrainingPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub epochs: Vec<EpochReport>,
}

/// One noise-free decision made during evaluation
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub index: usize,
    pub action: TradeAction,
    /// Close of the next bar minus close of the decision bar
    pub price_change: f64,
}

/// Recurrent DDPG trading system
pub struct TradingSystem<R: Rng> {
    encoder: LstmEncoder,
    learner: DdpgLearner,
    target_encoder: LstmEncoder,
    target_learner: DdpgLearner,
    buffer: ReplayBuffer,
    reward_fn: Box<dyn RewardFunction>,
    noise: OrnsteinUhlenbeckNoise,
    rng: R,
    config: RLConfig,
    checkpointer: Option<Checkpointer>,
    phase: TrainingPhase,
}

impl<R: Rng> TradingSystem<R> {
    /// Build with freshly initialized networks; targets start as exact copies
    pub fn new(config: RLConfig, mut rng: R) -> Result<Self> {
        config.validate()?;

        let encoder = LstmEncoder::new(&config.encoder, &mut rng)?;
        let learner = DdpgLearner::new(config.encoder.hidden_size, &config.ddpg, &mut rng)?;

        Ok(Self::assemble(config, encoder, learner, rng))
    }

    /// Resume from stored weights
    pub fn from_checkpoint(config: RLConfig, checkpoint: ModelCheckpoint, rng: R) -> Result<Self> {
        config.validate()?;
        checkpoint.validate()?;

        let encoder = LstmEncoder::from_weights(checkpoint.lstm, config.encoder.grad_clip)?;
        if encoder.input_size() != config.encoder.input_size {
            return Err(TraderError::CheckpointShapeMismatch(format!(
                "encoder input size {} does not match configured {}",
                encoder.input_size(),
                config.encoder.input_size
            )));
        }
        let learner = DdpgLearner::from_snapshot(checkpoint.ddpg, &config.ddpg)?;

        Ok(Self::assemble(config, encoder, learner, rng))
    }

    fn assemble(config: RLConfig, encoder: LstmEncoder, learner: DdpgLearner, rng: R) -> Self {
        Self {
            target_encoder: encoder.clone(),
            target_learner: learner.clone(),
            encoder,
            learner,
            buffer: ReplayBuffer::new(config.replay.capacity),
            reward_fn: Box::new(RewardEvaluator::with_config(config.reward.clone())),
            noise: OrnsteinUhlenbeckNoise::new(&config.noise),
            rng,
            config,
            checkpointer: None,
            phase: TrainingPhase::Running,
        }
    }

    /// Replace the reward function
    pub fn with_reward_function(mut self, reward_fn: Box<dyn RewardFunction>) -> Self {
        self.reward_fn = reward_fn;
        self
    }

    /// Persist best and periodic checkpoints through `checkpointer`
    pub fn with_checkpointer(mut self, checkpointer: Checkpointer) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Current phase of the epoch state machine
    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    fn enter(&mut self, phase: TrainingPhase) {
        debug!(from = ?self.phase, to = ?phase, "training phase");
        self.phase = phase;
    }

    pub fn config(&self) -> &RLConfig {
        &self.config
    }

    pub fn encoder(&self) -> &LstmEncoder {
        &self.encoder
    }

    pub fn learner(&self) -> &DdpgLearner {
        &self.learner
    }

    pub fn target_encoder(&self) -> &LstmEncoder {
        &self.target_encoder
    }

    pub fn target_learner(&self) -> &DdpgLearner {
        &self.target_learner
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ReplayBuffer {
        &mut self.buffer
    }

    /// Encode `state`, run the actor and post-process the output
    pub fn predict(&mut self, state: &StateWindow, add_noise: bool) -> Result<Prediction> {
        if state.has_non_finite() {
            return Err(TraderError::InvalidState(
                "state window contains non-finite values".to_string(),
            ));
        }

        let hidden_state = self.encoder.hidden_state(state)?;
        let mut raw_action = self.learner.actor_forward(&hidden_state)?;
        if add_noise {
            self.noise.apply(&mut raw_action, &mut self.rng);
        }
        let action =
            TradeAction::from_network_output(&raw_action, self.config.training.position_scale)?;

        debug!(
            position = action.position_size,
            stop_loss = action.stop_loss,
            take_profit = action.take_profit,
            "prediction"
        );

        Ok(Prediction {
            action,
            raw_action,
            hidden_state,
        })
    }

    /// Settle `action` taken at the end of `state` against the following bars
    pub fn evaluate_trade(
        &self,
        state: &StateWindow,
        action: &TradeAction,
        forward_path: &[Candle],
    ) -> RewardSignal {
        self.reward_fn.compute(&TradeSetup {
            action,
            entry_price: state.entry_price(),
            range: state.range(),
            forward_path,
        })
    }

    /// One exploration step at `index`, followed by a learning step once the
    /// buffer holds a full batch
    pub fn step<D: MarketDataSource>(&mut self, data: &D, index: usize) -> Result<StepOutcome> {
        let bars_predicted = self.config.training.bars_predicted;

        let state = data.get_state(index)?;
        let forward_path = data.forward_path(index, bars_predicted)?;
        let next_state = data.get_state(index + bars_predicted)?;

        let prediction = self.predict(&state, true)?;
        let signal = self.evaluate_trade(&state, &prediction.action, &forward_path);

        let stored = !signal.total.is_nan();
        if stored {
            self.buffer.push(Experience::new(
                state,
                prediction.action,
                signal.total,
                next_state,
                false,
            ));
        }

        let mut loss = None;
        if self.buffer.has_enough_samples(self.config.replay.batch_size) {
            if let Some(n) = self.config.replay.retain_latest {
                self.buffer.retain_latest(n);
            }
            loss = Some(self.learn_step()?);
            if self.config.ddpg.target_sync == TargetSync::EveryLearnStep {
                self.update_target_networks(self.config.ddpg.tau)?;
            }
        }

        Ok(StepOutcome {
            index,
            action: prediction.action,
            signal,
            stored,
            loss,
        })
    }

    /// Sample a minibatch and apply the TD-driven updates.
    /// Returns the mean |TD error| over the minibatch.
    pub fn learn_step(&mut self) -> Result<f64> {
        let batch = self
            .buffer
            .sample(self.config.replay.batch_size, &mut self.rng)?;

        let mut total_loss = 0.0;
        for experience in &batch {
            match self.learn_from(experience) {
                Ok(Some(td_error)) => total_loss += td_error.abs(),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "skipping experience in learning step");
                }
            }
        }

        let loss = if batch.is_empty() {
            0.0
        } else {
            total_loss / batch.len() as f64
        };
        debug!(batch = batch.len(), loss, "learning step");
        Ok(loss)
    }

    /// Update online networks from one experience; `None` when the target is not finite
    fn learn_from(&mut self, experience: &Experience) -> Result<Option<f64>> {
        let ddpg = &self.config.ddpg;

        let next_hidden = self.target_encoder.hidden_state(&experience.next_state)?;
        let next_action = self.target_learner.actor_forward(&next_hidden)?;
        let next_q = self
            .target_learner
            .critic_forward(&next_hidden, &next_action)?
            .clamp(-ddpg.q_clip, ddpg.q_clip);
        let target_q = if experience.done {
            experience.reward
        } else {
            experience.reward + ddpg.gamma * next_q
        };
        if !target_q.is_finite() {
            return Ok(None);
        }

        let (encoded, cache) = self.encoder.encode(&experience.state)?;
        let current_q = self
            .learner
            .critic_forward(&encoded.hidden_state, &experience.action.to_vec())?;
        let td_error = clip(target_q - current_q, TD_CLIP);

        self.learner.update_critic(td_error);
        let gradient = self.learner.get_actor_gradient(&encoded.hidden_state)?;
        self.learner.update_actor(&gradient)?;

        let gradients = self.encoder.backward(cache, ErrorSignal::Scalar(td_error))?;
        self.encoder
            .update_weights(gradients, self.config.encoder.learning_rate);

        Ok(Some(td_error))
    }

    /// Move every target weight toward its online counterpart
    pub fn update_target_networks(&mut self, tau: f64) -> Result<()> {
        if !(tau > 0.0 && tau <= 1.0) {
            return Err(TraderError::InvalidConfig(format!(
                "tau must be in (0, 1], got {tau}"
            )));
        }
        self.target_learner.soft_update_from(&self.learner, tau)?;
        self.target_encoder.soft_update_from(&self.encoder, tau)
    }

    /// Mean reward over `steps` noise-free rollouts at random indices.
    /// Failed or NaN rollouts count as 0.
    pub fn validate<D: MarketDataSource>(&mut self, data: &D, steps: usize) -> Result<f64> {
        let bars_predicted = self.config.training.bars_predicted;
        data.index_bounds(bars_predicted)?;
        if steps == 0 {
            return Ok(0.0);
        }

        let mut total = 0.0;
        for _ in 0..steps {
            let index = data.random_index(bars_predicted, &mut self.rng)?;
            match self.rollout(data, index) {
                Ok(reward) if !reward.is_nan() => total += reward,
                Ok(_) => {}
                Err(e) => debug!(index, error = %e, "validation rollout failed"),
            }
        }
        Ok(total / steps as f64)
    }

    fn rollout<D: MarketDataSource>(&mut self, data: &D, index: usize) -> Result<f64> {
        let state = data.get_state(index)?;
        let forward_path = data.forward_path(index, self.config.training.bars_predicted)?;
        let prediction = self.predict(&state, false)?;
        Ok(self
            .evaluate_trade(&state, &prediction.action, &forward_path)
            .total)
    }

    /// Run the configured number of epochs with early stopping
    pub fn train<D: MarketDataSource>(&mut self, data: &D) -> Result<TrainingSummary> {
        let training = self.config.training.clone();
        data.index_bounds(training.bars_predicted)?;

        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(training.epochs);
        let mut best: Option<f64> = None;
        let mut no_improvement = 0usize;

        info!(
            epochs = training.epochs,
            steps_per_epoch = training.steps_per_epoch,
            bars = data.len(),
            "Starting training"
        );

        for epoch in 0..training.epochs {
            self.enter(TrainingPhase::Running);
            let mut report = EpochReport {
                epoch: epoch + 1,
                ..Default::default()
            };
            let mut reward_sum = 0.0;
            let mut loss_sum = 0.0;

            for step in 0..training.steps_per_epoch {
                let outcome = data
                    .random_index(training.bars_predicted, &mut self.rng)
                    .and_then(|index| self.step(data, index));

                match outcome {
                    Ok(outcome) => {
                        if outcome.stored {
                            reward_sum += outcome.signal.total;
                            report.valid_steps += 1;
                        }
                        if let Some(loss) = outcome.loss {
                            loss_sum += loss;
                            report.learn_steps += 1;
                        }
                    }
                    Err(e) => {
                        report.failed_steps += 1;
                        warn!(epoch = epoch + 1, step, error = %e, "training step failed, skipping");
                    }
                }
            }

            if self.config.ddpg.target_sync == TargetSync::EveryEpoch {
                self.update_target_networks(self.config.ddpg.tau)?;
            }

            self.enter(TrainingPhase::Validating);
            let validation_reward = self.validate(data, training.validation_steps)?;

            report.average_reward = mean(reward_sum, report.valid_steps);
            report.average_loss = mean(loss_sum, report.learn_steps);
            report.validation_reward = validation_reward;
            report.buffer_len = self.buffer.len();
            report.improved = best.map_or(true, |b| validation_reward > b);

            if report.improved {
                best = Some(validation_reward);
                no_improvement = 0;
                self.enter(TrainingPhase::Improved);
                self.save_checkpoint(BEST_MODEL)?;
            } else {
                no_improvement += 1;
                self.enter(TrainingPhase::NoImprovement);
            }

            info!(
                "Epoch {}/{}: avg_reward={:.4}, valid_steps={}, failed={}, learn_steps={}, loss={:.4}, validation={:.4}",
                epoch + 1,
                training.epochs,
                report.average_reward,
                report.valid_steps,
                report.failed_steps,
                report.learn_steps,
                report.average_loss,
                report.validation_reward
            );
            reports.push(report);

            if self.phase == TrainingPhase::NoImprovement && no_improvement >= training.patience {
                info!("Early stopping at epoch {}", epoch + 1);
                self.enter(TrainingPhase::EarlyStopped);
                break;
            }

            if (epoch + 1) % training.checkpoint_every == 0 {
                self.save_checkpoint(&epoch_name(epoch + 1))?;
            }
        }

        if self.phase != TrainingPhase::EarlyStopped {
            self.enter(TrainingPhase::Done);
        }

        Ok(TrainingSummary {
            epochs_run: reports.len(),
            best_validation_reward: best,
            final_phase: self.phase,
            started_at,
            finished_at: Utc::now(),
            epochs: reports,
        })
    }

    /// Noise-free decisions for every index in `indices` that has a following bar
    pub fn decisions<D: MarketDataSource>(
        &mut self,
        data: &D,
        indices: std::ops::Range<usize>,
    ) -> Result<Vec<Decision>> {
        let mut decisions = Vec::new();
        for index in indices {
            let (Some(current), Some(next)) = (data.bar(index), data.bar(index + 1)) else {
                continue;
            };
            let price_change = next.close - current.close;
            let state = data.get_state(index)?;
            let prediction = self.predict(&state, false)?;
            decisions.push(Decision {
                index,
                action: prediction.action,
                price_change,
            });
        }
        Ok(decisions)
    }

    /// Current online weights
    pub fn checkpoint(&self) -> ModelCheckpoint {
        ModelCheckpoint {
            lstm: self.encoder.weights().clone(),
            ddpg: self.learner.snapshot(),
        }
    }

    /// Write the online weights under `label` if a checkpointer is attached
    pub fn save_checkpoint(&self, label: &str) -> Result<Option<PathBuf>> {
        match &self.checkpointer {
            Some(checkpointer) => checkpointer.save(&self.checkpoint(), label).map(Some),
            None => Ok(None),
        }
    }
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
