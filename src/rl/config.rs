//! RL Configuration
//!
//! Configuration structs for the encoder, the actor-critic learner,
//! exploration, replay and the training loop.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraderError};

/// Main RL configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RLConfig {
    /// Recurrent encoder configuration
    pub encoder: EncoderConfig,
    /// DDPG hyperparameters
    pub ddpg: DdpgConfig,
    /// Exploration noise
    pub noise: NoiseConfig,
    /// Replay buffer configuration
    pub replay: ReplayConfig,
    /// Reward function configuration
    pub reward: RewardConfig,
    /// Training loop configuration
    pub training: TrainingConfig,
}

impl RLConfig {
    /// Check internal consistency of the hyperparameters
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.encoder.input_size == 0 || self.encoder.hidden_size == 0 {
            errors.push("encoder sizes must be positive".to_string());
        }
        if let Err(e) = check_bound("encoder.grad_clip", self.encoder.grad_clip) {
            errors.push(e.to_string());
        }
        if self.ddpg.action_size == 0 {
            errors.push("action_size must be positive".to_string());
        }
        if !(self.ddpg.tau > 0.0 && self.ddpg.tau <= 1.0) {
            errors.push(format!("tau must be in (0, 1], got {}", self.ddpg.tau));
        }
        if let Err(e) = check_bound("ddpg.q_clip", self.ddpg.q_clip) {
            errors.push(e.to_string());
        }
        if !(0.0..=1.0).contains(&self.ddpg.gamma) {
            errors.push(format!("gamma must be in [0, 1], got {}", self.ddpg.gamma));
        }
        if self.replay.capacity == 0 || self.replay.batch_size == 0 {
            errors.push("replay capacity and batch_size must be positive".to_string());
        }
        if self.training.bars_predicted == 0 {
            errors.push("bars_predicted must be positive".to_string());
        }
        if self.training.checkpoint_every == 0 {
            errors.push("checkpoint_every must be positive".to_string());
        }
        let [low, high] = self.reward.bounds;
        if !(low.is_finite() && high.is_finite()) {
            errors.push(format!("reward bounds must be finite, got [{low}, {high}]"));
        } else if low > high {
            errors.push("reward bounds are inverted".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TraderError::InvalidConfig(errors.join("; ")))
        }
    }
}

/// Reject a symmetric clip bound that is not finite and positive
pub(crate) fn check_bound(name: &str, bound: f64) -> Result<()> {
    if bound.is_finite() && bound > 0.0 {
        Ok(())
    } else {
        Err(TraderError::InvalidConfig(format!(
            "{name} must be finite and positive, got {bound}"
        )))
    }
}

/// Recurrent encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Features per bar (OHLCV)
    pub input_size: usize,
    /// Hidden state width, also the learner's state size
    pub hidden_size: usize,
    /// Elementwise gradient bound for the backward pass
    pub grad_clip: f64,
    /// SGD learning rate
    pub learning_rate: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            input_size: 5,
            hidden_size: 64,
            grad_clip: 0.9,
            learning_rate: 1e-4,
        }
    }
}

/// When target networks track the online networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSync {
    /// Soft update after every learning step
    EveryLearnStep,
    /// Soft update once at the end of each epoch
    EveryEpoch,
}

/// DDPG hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DdpgConfig {
    /// Action vector width (position, stop-loss, take-profit)
    pub action_size: usize,
    /// Actor learning rate
    pub actor_lr: f64,
    /// Critic learning rate
    pub critic_lr: f64,
    /// Discount factor
    pub gamma: f64,
    /// Soft update rate
    pub tau: f64,
    /// Bound applied to critic outputs and bootstrapped Q-values
    pub q_clip: f64,
    /// Target update schedule
    pub target_sync: TargetSync,
}

impl Default for DdpgConfig {
    fn default() -> Self {
        Self {
            action_size: 3,
            actor_lr: 1e-4,
            critic_lr: 1e-3,
            gamma: 0.99,
            tau: 0.001,
            q_clip: 10.0,
            target_sync: TargetSync::EveryEpoch,
        }
    }
}

/// Ornstein-Uhlenbeck-style exploration noise
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Mean reversion strength
    pub theta: f64,
    /// Uniform perturbation scale
    pub sigma: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            theta: 0.15,
            sigma: 0.2,
        }
    }
}

/// Replay buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Maximum stored experiences
    pub capacity: usize,
    /// Minibatch size, also the warmup threshold
    pub batch_size: usize,
    /// Keep only the most recent N experiences before each learning step
    pub retain_latest: Option<usize>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            batch_size: 1000,
            retain_latest: None,
        }
    }
}

/// Reward function configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Multiplier on the relative price move before tanh
    pub reward_scale: f64,
    /// Healthy stop-loss distance band
    pub stop_loss_band: [f64; 2],
    /// Healthy take-profit distance band
    pub take_profit_band: [f64; 2],
    /// Penalty for a distance outside its band
    pub band_penalty: f64,
    /// Largest position size before the size penalty applies
    pub max_position: f64,
    /// Penalty for oversized positions
    pub size_penalty: f64,
    /// Clamp applied to the total reward
    pub bounds: [f64; 2],
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            reward_scale: 10.0,
            stop_loss_band: [0.03, 0.5],
            take_profit_band: [0.05, 1.0],
            band_penalty: -0.1,
            max_position: 0.8,
            size_penalty: -0.05,
            bounds: [-1.0, 2.0],
        }
    }
}

/// Training loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of epochs
    pub epochs: usize,
    /// Environment steps per epoch
    pub steps_per_epoch: usize,
    /// Bars in the forward window used to settle a trade
    pub bars_predicted: usize,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    /// Noise-free rollouts per validation pass
    pub validation_steps: usize,
    /// Periodic checkpoint frequency (epochs)
    pub checkpoint_every: usize,
    /// Directory for checkpoints
    pub checkpoint_dir: String,
    /// Periodic checkpoints kept on disk
    pub max_checkpoints: usize,
    /// Scale applied to the raw position output before clamping
    pub position_scale: f64,
    /// Seed for the training RNG (entropy when unset)
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            steps_per_epoch: 1000,
            bars_predicted: 5,
            patience: 20,
            validation_steps: 100,
            checkpoint_every: 10,
            checkpoint_dir: "./saved_models".to_string(),
            max_checkpoints: 5,
            position_scale: 50.0,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RLConfig::default().validate().is_ok());
    }

    #[test]
    fn test_tau_out_of_range_rejected() {
        let mut config = RLConfig::default();
        config.ddpg.tau = 0.0;
        assert!(config.validate().is_err());

        config.ddpg.tau = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tau"));
    }

    #[test]
    fn test_clip_bounds_rejected() {
        for bad in [-0.5, 0.0, f64::NAN, f64::INFINITY] {
            let mut config = RLConfig::default();
            config.encoder.grad_clip = bad;
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("grad_clip"));

            let mut config = RLConfig::default();
            config.ddpg.q_clip = bad;
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("q_clip"));
        }
    }

    #[test]
    fn test_non_finite_reward_bounds_rejected() {
        let mut config = RLConfig::default();
        config.reward.bounds = [f64::NAN, 2.0];
        assert!(config.validate().is_err());

        config.reward.bounds = [-1.0, f64::INFINITY];
        assert!(config.validate().is_err());

        config.reward.bounds = [2.0, -1.0];
        assert!(config.validate().unwrap_err().to_string().contains("inverted"));
    }

    #[test]
    fn test_target_sync_serde() {
        let json = serde_json::to_string(&TargetSync::EveryLearnStep).unwrap();
        assert_eq!(json, "\"every_learn_step\"");
    }
}
