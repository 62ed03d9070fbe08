//! Exploration Noise
//!
//! Ornstein-Uhlenbeck-style perturbation: each action component is pulled
//! back toward zero by `theta` and jittered by uniform noise scaled by
//! `sigma`. The process is memoryless between steps; the mean reversion acts
//! on the current action rather than on a carried noise state.

use rand::Rng;

use crate::rl::config::NoiseConfig;

#[derive(Debug, Clone, Copy)]
pub struct OrnsteinUhlenbeckNoise {
    theta: f64,
    sigma: f64,
}

impl OrnsteinUhlenbeckNoise {
    pub fn new(config: &NoiseConfig) -> Self {
        Self {
            theta: config.theta,
            sigma: config.sigma,
        }
    }

    /// Noise term for one action component: `-θ·a + σ·U(-1, 1)`
    pub fn sample<R: Rng + ?Sized>(&self, action: f64, rng: &mut R) -> f64 {
        -self.theta * action + self.sigma * rng.gen_range(-1.0..1.0)
    }

    /// Perturb every component in place and clip to [-1, 1]
    pub fn apply<R: Rng + ?Sized>(&self, actions: &mut [f64], rng: &mut R) {
        for a in actions.iter_mut() {
            *a = (*a + self.sample(*a, rng)).clamp(-1.0, 1.0);
        }
    }
}

impl Default for OrnsteinUhlenbeckNoise {
    fn default() -> Self {
        Self::new(&NoiseConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_noise_within_band() {
        let noise = OrnsteinUhlenbeckNoise::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        for _ in 0..1000 {
            let n = noise.sample(0.5, &mut rng);
            // -0.075 ± 0.2
            assert!(n >= -0.275 && n <= 0.125);
        }
    }

    #[test]
    fn test_apply_clips_to_unit() {
        let noise = OrnsteinUhlenbeckNoise::new(&NoiseConfig {
            theta: 0.0,
            sigma: 5.0,
        });
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut actions = vec![0.9, -0.9, 0.0];

        for _ in 0..100 {
            noise.apply(&mut actions, &mut rng);
            assert!(actions.iter().all(|a| (-1.0..=1.0).contains(a)));
        }
    }

    #[test]
    fn test_zero_sigma_is_pure_reversion() {
        let noise = OrnsteinUhlenbeckNoise::new(&NoiseConfig {
            theta: 0.5,
            sigma: 0.0,
        });
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut actions = vec![0.8];

        noise.apply(&mut actions, &mut rng);
        assert!((actions[0] - 0.4).abs() < 1e-12);
    }
}
