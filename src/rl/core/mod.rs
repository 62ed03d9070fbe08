//! Core RL abstractions
//!
//! Fundamental types for state representation, actions, and rewards.

pub mod action;
pub mod reward;
pub mod state;

pub use action::{Direction, TradeAction, ACTION_DIM, MIN_POSITION};
pub use reward::{
    RejectReason, RewardEvaluator, RewardFunction, RewardSignal, TradeOutcome, TradeSetup,
};
pub use state::{Candle, StateInput, StateWindow, BAR_FEATURES};
