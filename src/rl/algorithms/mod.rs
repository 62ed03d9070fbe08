//! RL Algorithms
//!
//! Off-policy actor-critic learner over encoded market states.

pub mod ddpg;

pub use ddpg::{DdpgLearner, DdpgSnapshot};
