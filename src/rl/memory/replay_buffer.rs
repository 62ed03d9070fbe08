//! Replay Buffer
//!
//! Bounded FIFO experience store for off-policy learning.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{Result, TraderError};
use crate::rl::core::{StateWindow, TradeAction};

/// A single stored transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    /// State window the action was taken in
    pub state: StateWindow,
    /// Action taken (after noise and post-processing)
    pub action: TradeAction,
    /// Reward received
    pub reward: f64,
    /// State window after the forward path
    pub next_state: StateWindow,
    /// Whether the episode terminated (the environment never sets this)
    pub done: bool,
}

impl Experience {
    pub fn new(
        state: StateWindow,
        action: TradeAction,
        reward: f64,
        next_state: StateWindow,
        done: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }
}

/// Replay buffer for experience storage
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    /// Storage, oldest first
    buffer: VecDeque<Experience>,
    /// Maximum capacity
    capacity: usize,
}

impl ReplayBuffer {
    /// Create a new replay buffer with given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            // avoid reserving the full capacity up front for large buffers
            buffer: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Append an experience, evicting the oldest one when full
    pub fn push(&mut self, experience: Experience) {
        if self.capacity == 0 {
            return;
        }
        while self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(experience);
    }

    /// Convenience form of [`push`](Self::push)
    pub fn add(
        &mut self,
        state: StateWindow,
        action: TradeAction,
        reward: f64,
        next_state: StateWindow,
        done: bool,
    ) {
        self.push(Experience::new(state, action, reward, next_state, done));
    }

    /// Draw `batch_size` experiences uniformly with replacement
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<Experience>> {
        if self.buffer.is_empty() {
            return Err(TraderError::EmptyBuffer);
        }

        let len = self.buffer.len();
        Ok((0..batch_size)
            .map(|_| self.buffer[rng.gen_range(0..len)].clone())
            .collect())
    }

    /// Drop everything except the newest `n` experiences
    pub fn retain_latest(&mut self, n: usize) {
        let excess = self.buffer.len().saturating_sub(n);
        self.buffer.drain(..excess);
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.buffer.iter()
    }

    /// Clear all experiences
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get current number of experiences
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Check if buffer has enough samples for training
    pub fn has_enough_samples(&self, min_samples: usize) -> bool {
        self.buffer.len() >= min_samples
    }

    /// Get buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.buffer.len() as f64 / self.capacity as f64
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::core::Candle;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn make_experience(reward: f64) -> Experience {
        let window = StateWindow::new(vec![Candle::new(0.5, 0.6, 0.4, 0.5, 0.1)]).unwrap();
        Experience::new(
            window.clone(),
            TradeAction::new(0.5, -0.1, 0.2),
            reward,
            window,
            false,
        )
    }

    #[test]
    fn test_replay_buffer_push_evicts_oldest() {
        let mut buffer = ReplayBuffer::new(10);

        for i in 0..15 {
            buffer.push(make_experience(i as f64));
        }

        // Should only keep last 10, oldest first
        assert_eq!(buffer.len(), 10);
        let rewards: Vec<f64> = buffer.iter().map(|e| e.reward).collect();
        assert_eq!(rewards, (5..15).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_replay_buffer_sample() {
        let mut buffer = ReplayBuffer::new(100);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        for i in 0..50 {
            buffer.push(make_experience(i as f64));
        }

        let batch = buffer.sample(10, &mut rng).unwrap();
        assert_eq!(batch.len(), 10);
    }

    #[test]
    fn test_sample_larger_than_buffer() {
        let mut buffer = ReplayBuffer::new(100);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for i in 0..3 {
            buffer.push(make_experience(i as f64));
        }

        let batch = buffer.sample(20, &mut rng).unwrap();
        assert_eq!(batch.len(), 20);
        assert!(batch.iter().all(|e| (0.0..3.0).contains(&e.reward)));
    }

    #[test]
    fn test_sample_empty_fails() {
        let buffer = ReplayBuffer::new(10);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            buffer.sample(1, &mut rng),
            Err(TraderError::EmptyBuffer)
        ));
    }

    #[test]
    fn test_retain_latest() {
        let mut buffer = ReplayBuffer::new(10);
        for i in 0..8 {
            buffer.push(make_experience(i as f64));
        }

        buffer.retain_latest(3);
        let rewards: Vec<f64> = buffer.iter().map(|e| e.reward).collect();
        assert_eq!(rewards, vec![5.0, 6.0, 7.0]);
        assert!((buffer.fill_ratio() - 0.3).abs() < 1e-12);
    }
}
