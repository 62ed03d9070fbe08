//! Action Space
//!
//! Continuous trade decision produced by the actor.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraderError};

/// Dimension of the continuous action space
pub const ACTION_DIM: usize = 3;

/// Smallest allowed position magnitude
pub const MIN_POSITION: f64 = 0.01;

/// Trade direction implied by the sign of the position size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    Flat,
}

/// Continuous trade decision
///
/// All fields lie in [-1, 1]. `stop_loss` and `take_profit` are signed
/// distances from entry, expressed as multiples of the recent price range.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeAction {
    /// Signed trade size: positive is long, negative is short
    pub position_size: f64,
    /// Signed stop-loss distance
    pub stop_loss: f64,
    /// Signed take-profit distance
    pub take_profit: f64,
}

impl TradeAction {
    /// Create an action, clamping every field into [-1, 1]
    pub fn new(position_size: f64, stop_loss: f64, take_profit: f64) -> Self {
        Self {
            position_size: clamp_unit(position_size),
            stop_loss: clamp_unit(stop_loss),
            take_profit: clamp_unit(take_profit),
        }
    }

    /// Build from raw (possibly noisy) network output
    ///
    /// The position output is multiplied by `position_scale`, snapped away
    /// from zero to at least [`MIN_POSITION`] and otherwise clamped and
    /// rounded to two decimals.
    pub fn from_network_output(values: &[f64], position_scale: f64) -> Result<Self> {
        if values.len() < ACTION_DIM {
            return Err(TraderError::shape("action output", ACTION_DIM, values.len()));
        }

        Ok(Self {
            position_size: snap_position(values[0] * position_scale),
            stop_loss: clamp_unit(values[1]),
            take_profit: clamp_unit(values[2]),
        })
    }

    /// Create from a stored action vector without rescaling
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        if values.len() != ACTION_DIM {
            return Err(TraderError::shape("action vector", ACTION_DIM, values.len()));
        }
        Ok(Self::new(values[0], values[1], values[2]))
    }

    /// Vector form consumed by the critic
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.position_size, self.stop_loss, self.take_profit]
    }

    pub fn direction(&self) -> Direction {
        if self.position_size > 0.0 {
            Direction::Long
        } else if self.position_size < 0.0 {
            Direction::Short
        } else {
            Direction::Flat
        }
    }

    pub fn has_non_finite(&self) -> bool {
        !(self.position_size.is_finite() && self.stop_loss.is_finite() && self.take_profit.is_finite())
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(-1.0, 1.0)
}

fn snap_position(raw: f64) -> f64 {
    if raw.is_nan() {
        return MIN_POSITION;
    }
    if (0.0..MIN_POSITION).contains(&raw) {
        MIN_POSITION
    } else if raw > -MIN_POSITION && raw < 0.0 {
        -MIN_POSITION
    } else {
        (raw.clamp(-1.0, 1.0) * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_clamping() {
        let action = TradeAction::new(2.0, -3.0, 0.5);
        assert_eq!(action.position_size, 1.0);
        assert_eq!(action.stop_loss, -1.0);
        assert_eq!(action.take_profit, 0.5);
    }

    #[test]
    fn test_position_snaps_away_from_zero() {
        let long = TradeAction::from_network_output(&[0.0, 0.0, 0.0], 50.0).unwrap();
        assert_eq!(long.position_size, MIN_POSITION);

        let short = TradeAction::from_network_output(&[-0.0001, 0.0, 0.0], 50.0).unwrap();
        assert_eq!(short.position_size, -MIN_POSITION);
    }

    #[test]
    fn test_position_scaled_and_rounded() {
        let action = TradeAction::from_network_output(&[0.003337, -0.2, 0.4], 50.0).unwrap();
        assert_eq!(action.position_size, 0.17);
        assert_eq!(action.stop_loss, -0.2);

        let saturated = TradeAction::from_network_output(&[-0.9, 1.5, -1.5], 50.0).unwrap();
        assert_eq!(saturated.position_size, -1.0);
        assert_eq!(saturated.stop_loss, 1.0);
        assert_eq!(saturated.take_profit, -1.0);
    }

    #[test]
    fn test_short_output_rejected() {
        assert!(TradeAction::from_network_output(&[0.1, 0.2], 1.0).is_err());
    }

    #[test]
    fn test_direction() {
        assert_eq!(TradeAction::new(0.5, -0.1, 0.2).direction(), Direction::Long);
        assert_eq!(TradeAction::new(-0.5, -0.1, 0.2).direction(), Direction::Short);
        assert_eq!(TradeAction::default().direction(), Direction::Flat);
    }
}
