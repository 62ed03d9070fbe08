//! Reinforcement Learning Module
//!
//! Recurrent DDPG learner for stop-loss / take-profit trade sizing.
//!
//! # Features
//!
//! - **State Representation**: windows of normalized OHLCV bars
//! - **Encoder**: LSTM cell with a one-step gradient approximation
//! - **Algorithm**: DDPG actor-critic with soft-updated target networks
//! - **Reward**: first-touch stop-loss / take-profit trade simulation

pub mod algorithms;
pub mod config;
pub mod core;
pub mod environment;
pub mod exploration;
pub mod memory;
pub mod networks;
pub mod training;

// Config exports
pub use config::{
    DdpgConfig, EncoderConfig, NoiseConfig, RLConfig, ReplayConfig, RewardConfig, TargetSync,
    TrainingConfig,
};

// Core exports
pub use core::{
    Candle, Direction, RewardEvaluator, RewardFunction, RewardSignal, StateInput, StateWindow,
    TradeAction, TradeOutcome, ACTION_DIM, BAR_FEATURES,
};

// Algorithm and network exports
pub use algorithms::{DdpgLearner, DdpgSnapshot};
pub use exploration::OrnsteinUhlenbeckNoise;
pub use networks::{LstmEncoder, LstmWeights};

// Memory exports
pub use memory::{Experience, ReplayBuffer};

// Environment exports
pub use environment::{HistoricalSeries, MarketDataSource, OhlcvColumns};

// Training exports
pub use training::{Checkpointer, ModelCheckpoint, TradingSystem, TrainingPhase, TrainingSummary};
