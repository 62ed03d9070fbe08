//! Critic Network (Value Function)
//!
//! Q(s, a) estimate with separate state and action branches.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::linalg::{relu, Matrix};
use crate::error::{Result, TraderError};

/// Width of each input branch
pub const CRITIC_BRANCH: usize = 64;
/// Width of the merged hidden layer
pub const CRITIC_HIDDEN: usize = 32;

/// Critic parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticWeights {
    pub state_layer: Matrix,
    pub action_layer: Matrix,
    pub hidden: Matrix,
    pub output: Matrix,
}

impl CriticWeights {
    pub fn init<R: Rng + ?Sized>(state_size: usize, action_size: usize, rng: &mut R) -> Self {
        Self {
            state_layer: Matrix::xavier(CRITIC_BRANCH, state_size, rng),
            action_layer: Matrix::xavier(CRITIC_BRANCH, action_size, rng),
            hidden: Matrix::xavier(CRITIC_HIDDEN, 2 * CRITIC_BRANCH, rng),
            output: Matrix::xavier(1, CRITIC_HIDDEN, rng),
        }
    }

    pub fn layers(&self) -> [(&'static str, &Matrix); 4] {
        [
            ("stateLayer", &self.state_layer),
            ("actionLayer", &self.action_layer),
            ("hidden", &self.hidden),
            ("output", &self.output),
        ]
    }

    pub fn layers_mut(&mut self) -> [&mut Matrix; 4] {
        [
            &mut self.state_layer,
            &mut self.action_layer,
            &mut self.hidden,
            &mut self.output,
        ]
    }

    /// Raw (unclipped) value estimate
    pub fn forward(&self, state: &[f64], action: &[f64]) -> Result<f64> {
        let mut combined: Vec<f64> = self
            .state_layer
            .mat_vec(state)?
            .into_iter()
            .map(relu)
            .collect();
        combined.extend(self.action_layer.mat_vec(action)?.into_iter().map(relu));

        let hidden: Vec<f64> = self.hidden.mat_vec(&combined)?.into_iter().map(relu).collect();
        let out = self.output.mat_vec(&hidden)?;
        out.first()
            .copied()
            .ok_or_else(|| TraderError::shape("critic output", 1, 0))
    }

    pub fn validate(&self, state_size: usize, action_size: usize) -> Result<()> {
        let expected = [
            (CRITIC_BRANCH, state_size),
            (CRITIC_BRANCH, action_size),
            (CRITIC_HIDDEN, 2 * CRITIC_BRANCH),
            (1, CRITIC_HIDDEN),
        ];
        for ((name, m), (rows, cols)) in self.layers().into_iter().zip(expected) {
            if m.rows() != rows || m.cols() != cols || !m.is_rectangular() {
                return Err(TraderError::CheckpointShapeMismatch(format!(
                    "critic {name} is {}x{}, expected {rows}x{cols}",
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
    fn test_critic_scalar_output() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let critic = CriticWeights::init(8, 3, &mut rng);

        let q = critic.forward(&[0.5; 8], &[0.1, -0.2, 0.3]).unwrap();
        assert!(q.is_finite());
        assert!(critic.forward(&[0.5; 8], &[0.1]).is_err());
    }

    #[test]
    fn test_critic_json_field_names() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let critic = CriticWeights::init(4, 3, &mut rng);
        let json = serde_json::to_value(&critic).unwrap();

        assert!(json.get("stateLayer").is_some());
        assert!(json.get("actionLayer").is_some());
        assert_eq!(json["output"].as_array().unwrap().len(), 1);
    }
}
