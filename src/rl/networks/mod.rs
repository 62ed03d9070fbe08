//! Neural Network Architectures
//!
//! Recurrent encoder plus the actor and critic used by the DDPG learner,
//! all computed on plain `f64` matrices.

pub mod actor;
pub mod critic;
pub mod encoder;
pub mod linalg;

pub use actor::ActorWeights;
pub use critic::CriticWeights;
pub use encoder::{ActivationCache, ErrorSignal, LstmEncoder, LstmGradients, LstmOutput, LstmWeights};
pub use linalg::Matrix;
