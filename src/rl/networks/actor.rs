//! Actor Network (Policy)
//!
//! Deterministic policy mapping an encoded state to a continuous action.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::linalg::{relu, Matrix};
use crate::error::{Result, TraderError};

/// Width of the first hidden layer
pub const ACTOR_HIDDEN1: usize = 64;
/// Width of the second hidden layer
pub const ACTOR_HIDDEN2: usize = 32;

/// Actor parameters: `tanh(W3 · relu(W2 · relu(W1 · s)))`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorWeights {
    pub layer1: Matrix,
    pub layer2: Matrix,
    pub output: Matrix,
}

impl ActorWeights {
    pub fn init<R: Rng + ?Sized>(state_size: usize, action_size: usize, rng: &mut R) -> Self {
        Self {
            layer1: Matrix::xavier(ACTOR_HIDDEN1, state_size, rng),
            layer2: Matrix::xavier(ACTOR_HIDDEN2, ACTOR_HIDDEN1, rng),
            output: Matrix::xavier(action_size, ACTOR_HIDDEN2, rng),
        }
    }

    /// Layers in forward order
    pub fn layers(&self) -> [(&'static str, &Matrix); 3] {
        [
            ("layer1", &self.layer1),
            ("layer2", &self.layer2),
            ("output", &self.output),
        ]
    }

    pub fn layers_mut(&mut self) -> [&mut Matrix; 3] {
        [&mut self.layer1, &mut self.layer2, &mut self.output]
    }

    /// Forward pass. NaN produced inside the network is passed through.
    pub fn forward(&self, state: &[f64]) -> Result<Vec<f64>> {
        let h1: Vec<f64> = self.layer1.mat_vec(state)?.into_iter().map(relu).collect();
        let h2: Vec<f64> = self.layer2.mat_vec(&h1)?.into_iter().map(relu).collect();
        Ok(self
            .output
            .mat_vec(&h2)?
            .into_iter()
            .map(f64::tanh)
            .collect())
    }

    /// Check every layer against the declared sizes
    pub fn validate(&self, state_size: usize, action_size: usize) -> Result<()> {
        let expected = [
            (ACTOR_HIDDEN1, state_size),
            (ACTOR_HIDDEN2, ACTOR_HIDDEN1),
            (action_size, ACTOR_HIDDEN2),
        ];
        for ((name, m), (rows, cols)) in self.layers().into_iter().zip(expected) {
            if m.rows() != rows || m.cols() != cols || !m.is_rectangular() {
                return Err(TraderError::CheckpointShapeMismatch(format!(
                    "actor {name} is {}x{}, expected {rows}x{cols}",
                    m.rows(),
                    m.cols()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_actor_output_bounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let actor = ActorWeights::init(16, 3, &mut rng);

        let out = actor.forward(&[1.0; 16]).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|a| (-1.0..=1.0).contains(a)));
    }

    #[test]
    fn test_actor_validate_detects_bad_layer() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut actor = ActorWeights::init(16, 3, &mut rng);
        assert!(actor.validate(16, 3).is_ok());

        actor.layer2 = Matrix::zeros(ACTOR_HIDDEN2, 10);
        assert!(actor.validate(16, 3).is_err());
    }
}
