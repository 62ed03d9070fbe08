//! Deep Deterministic Policy Gradient (DDPG)
//!
//! Actor-critic learner over encoded states. The update rules are coarse:
//! the critic moves every weight by the same clipped TD delta and the actor
//! moves every weight by the first component of its clipped policy gradient.
//! Weights are kept inside [-1, 1] after each update.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TraderError};
use crate::rl::config::{check_bound, DdpgConfig};
use crate::rl::core::StateInput;
use crate::rl::networks::linalg::clip;
use crate::rl::networks::{ActorWeights, CriticWeights, Matrix};

/// Bound applied to TD errors and policy gradients before an update
const SIGNAL_CLIP: f64 = 1.0;
/// Bound applied to every weight after an update
const WEIGHT_CLIP: f64 = 1.0;

/// Serialized learner: `{stateSize, actionSize, actorWeights, criticWeights}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DdpgSnapshot {
    pub state_size: usize,
    pub action_size: usize,
    pub actor_weights: ActorWeights,
    pub critic_weights: CriticWeights,
}

/// Actor-critic learner
#[derive(Debug, Clone)]
pub struct DdpgLearner {
    state_size: usize,
    action_size: usize,
    actor: ActorWeights,
    critic: CriticWeights,
    actor_lr: f64,
    critic_lr: f64,
    q_clip: f64,
}

impl DdpgLearner {
    /// Create a learner with freshly initialized weights
    pub fn new<R: Rng + ?Sized>(state_size: usize, config: &DdpgConfig, rng: &mut R) -> Result<Self> {
        if state_size == 0 || config.action_size == 0 {
            return Err(TraderError::InvalidConfig(
                "state size and action size must be positive".to_string(),
            ));
        }
        check_bound("ddpg.q_clip", config.q_clip)?;

        Ok(Self {
            state_size,
            action_size: config.action_size,
            actor: ActorWeights::init(state_size, config.action_size, rng),
            critic: CriticWeights::init(state_size, config.action_size, rng),
            actor_lr: config.actor_lr,
            critic_lr: config.critic_lr,
            q_clip: config.q_clip,
        })
    }

    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn action_size(&self) -> usize {
        self.action_size
    }

    pub fn actor_weights(&self) -> &ActorWeights {
        &self.actor
    }

    pub fn critic_weights(&self) -> &CriticWeights {
        &self.critic
    }

    fn check_state(&self, state: &[f64]) -> Result<()> {
        if state.len() != self.state_size {
            return Err(TraderError::shape("learner state", self.state_size, state.len()));
        }
        Ok(())
    }

    /// Policy output in [-1, 1]^action_size.
    ///
    /// Falls back to a zero vector if the network produces NaN.
    pub fn actor_forward<S: StateInput + ?Sized>(&self, state: &S) -> Result<Vec<f64>> {
        let state = state.flatten();
        self.check_state(&state)?;

        let output = self.actor.forward(&state)?;
        if output.iter().any(|a| a.is_nan()) {
            warn!("actor produced NaN output, using zero action");
            return Ok(vec![0.0; self.action_size]);
        }
        Ok(output)
    }

    /// Value estimate clipped to ±q_clip; NaN maps to 0
    pub fn critic_forward<S: StateInput + ?Sized>(&self, state: &S, action: &[f64]) -> Result<f64> {
        let state = state.flatten();
        self.check_state(&state)?;
        if action.len() != self.action_size {
            return Err(TraderError::shape("critic action", self.action_size, action.len()));
        }

        let q = self.critic.forward(&state, action)?;
        if q.is_nan() {
            warn!("critic produced NaN value, using 0");
            return Ok(0.0);
        }
        Ok(q.clamp(-self.q_clip, self.q_clip))
    }

    /// Nudge every critic weight by `critic_lr * clip(td_error)`
    pub fn update_critic(&mut self, td_error: f64) {
        let delta = self.critic_lr * neutralize(clip(td_error, SIGNAL_CLIP));
        for layer in self.critic.layers_mut() {
            nudge_layer(layer, delta);
        }
    }

    /// `clip(Q(s, μ(s)) · (1 − a²), ±1)` per action dimension
    pub fn get_actor_gradient<S: StateInput + ?Sized>(&self, state: &S) -> Result<Vec<f64>> {
        let state = state.flatten();
        let actions = self.actor_forward(&state[..])?;
        let value = self.critic_forward(&state[..], &actions)?;

        Ok(actions
            .iter()
            .map(|a| clip(value * (1.0 - a * a), SIGNAL_CLIP))
            .collect())
    }

    /// Nudge every actor weight by `actor_lr * clip(gradient[0])`
    pub fn update_actor(&mut self, gradient: &[f64]) -> Result<()> {
        let g0 = gradient
            .first()
            .copied()
            .ok_or_else(|| TraderError::shape("actor gradient", self.action_size, 0))?;

        let delta = self.actor_lr * neutralize(clip(g0, SIGNAL_CLIP));
        for layer in self.actor.layers_mut() {
            nudge_layer(layer, delta);
        }
        Ok(())
    }

    /// Soft update toward `source`: `θ ← (1 − tau)·θ + tau·θ_source`
    pub fn soft_update_from(&mut self, source: &DdpgLearner, tau: f64) -> Result<()> {
        if self.state_size != source.state_size {
            return Err(TraderError::shape("target state size", self.state_size, source.state_size));
        }
        if self.action_size != source.action_size {
            return Err(TraderError::shape(
                "target action size",
                self.action_size,
                source.action_size,
            ));
        }

        for (target, (_, src)) in self.actor.layers_mut().into_iter().zip(source.actor.layers()) {
            target.blend_from(src, tau);
        }
        for (target, (_, src)) in self.critic.layers_mut().into_iter().zip(source.critic.layers()) {
            target.blend_from(src, tau);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> DdpgSnapshot {
        DdpgSnapshot {
            state_size: self.state_size,
            action_size: self.action_size,
            actor_weights: self.actor.clone(),
            critic_weights: self.critic.clone(),
        }
    }

    /// Rebuild from a snapshot, checking declared sizes against the matrices
    pub fn from_snapshot(snapshot: DdpgSnapshot, config: &DdpgConfig) -> Result<Self> {
        let DdpgSnapshot {
            state_size,
            action_size,
            actor_weights,
            critic_weights,
        } = snapshot;

        if state_size == 0 || action_size == 0 {
            return Err(TraderError::CheckpointShapeMismatch(format!(
                "declared sizes must be positive (state {state_size}, action {action_size})"
            )));
        }
        check_bound("ddpg.q_clip", config.q_clip)?;
        actor_weights.validate(state_size, action_size)?;
        critic_weights.validate(state_size, action_size)?;
        debug!(state_size, action_size, "restored learner weights");

        Ok(Self {
            state_size,
            action_size,
            actor: actor_weights,
            critic: critic_weights,
            actor_lr: config.actor_lr,
            critic_lr: config.critic_lr,
            q_clip: config.q_clip,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn from_json(json: &str, config: &DdpgConfig) -> Result<Self> {
        let snapshot: DdpgSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot, config)
    }
}

fn neutralize(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x
    }
}

fn nudge_layer(layer: &mut Matrix, delta: f64) {
    layer.map_inplace(|w| neutralize(clip(w + delta, WEIGHT_CLIP)));
}
