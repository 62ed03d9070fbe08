//! Training Infrastructure
//!
//! Training loop, checkpointing, and evaluation utilities.

pub mod checkpointing;
pub mod trainer;

pub use checkpointing::{
    epoch_name, load_checkpoint, Checkpointer, ModelCheckpoint, BEST_MODEL, FINAL_MODEL,
};
pub use trainer::{
    Decision, EpochReport, Prediction, StepOutcome, TradingSystem, TrainingPhase, TrainingSummary,
};
