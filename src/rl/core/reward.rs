//! Reward Functions
//!
//! Settles a proposed trade against the bars that follow the entry and turns
//! the outcome into a bounded scalar reward.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::action::{Direction, TradeAction};
use super::state::Candle;

// Re-export config
pub use crate::rl::config::RewardConfig;

/// Why a trade never reached the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// NaN/infinite action, entry, range, or an empty forward window
    InvalidInput,
    /// Stop-loss / take-profit signs or ordering inconsistent with the trade
    InconsistentLevels,
}

/// How a simulated trade ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Rejected(RejectReason),
    /// Zero position: nothing at risk
    #[default]
    Flat,
    StopLoss { exit_price: f64 },
    TakeProfit { exit_price: f64 },
    /// Neither level touched; marked at the terminal close
    Floating { exit_price: f64 },
}

impl TradeOutcome {
    pub fn exit_price(&self) -> Option<f64> {
        match self {
            TradeOutcome::StopLoss { exit_price }
            | TradeOutcome::TakeProfit { exit_price }
            | TradeOutcome::Floating { exit_price } => Some(*exit_price),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, TradeOutcome::Rejected(_))
    }
}

/// Reward signal components
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RewardSignal {
    /// How the trade settled
    pub outcome: TradeOutcome,
    /// tanh-scaled PnL of the realized exit
    pub pnl_reward: f64,
    /// Penalty for a stop distance outside its band
    pub stop_loss_penalty: f64,
    /// Penalty for a take-profit distance outside its band
    pub take_profit_penalty: f64,
    /// Penalty for an oversized position
    pub size_penalty: f64,
    /// Clamped sum of the components
    pub total: f64,
}

impl RewardSignal {
    /// Zero reward for a trade that never reached the simulation
    pub fn rejected(reason: RejectReason) -> Self {
        Self {
            outcome: TradeOutcome::Rejected(reason),
            ..Default::default()
        }
    }

    /// Calculate total from components, clamped to the configured bounds
    pub fn calculate_total(&mut self, config: &RewardConfig) {
        let sum =
            self.pnl_reward + self.stop_loss_penalty + self.take_profit_penalty + self.size_penalty;
        self.total = if sum.is_nan() {
            0.0
        } else {
            sum.clamp(config.bounds[0], config.bounds[1])
        };
    }
}

/// Everything needed to settle one trade
#[derive(Debug, Clone, Copy)]
pub struct TradeSetup<'a> {
    /// Proposed action
    pub action: &'a TradeAction,
    /// Entry price (close of the last state bar)
    pub entry_price: f64,
    /// Recent range used to convert distances into price levels
    pub range: f64,
    /// Bars after the entry, in time order
    pub forward_path: &'a [Candle],
}

/// Trait for computing rewards
pub trait RewardFunction: Send + Sync {
    /// Compute reward for a proposed trade
    fn compute(&self, setup: &TradeSetup<'_>) -> RewardSignal;
}

/// Stop-loss / take-profit trade simulator with risk shaping
#[derive(Debug, Clone, Default)]
pub struct RewardEvaluator {
    config: RewardConfig,
}

impl RewardEvaluator {
    /// Create with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Convenience wrapper returning only the total
    pub fn calculate_reward(
        &self,
        action: &TradeAction,
        entry_price: f64,
        forward_path: &[Candle],
        range: f64,
    ) -> f64 {
        self.compute(&TradeSetup {
            action,
            entry_price,
            range,
            forward_path,
        })
        .total
    }

    /// Direction-relative validity: the stop sits on the adverse side (≤ 0),
    /// the target on the favorable side (≥ 0), and they differ.
    fn levels_consistent(action: &TradeAction) -> bool {
        action.stop_loss <= 0.0
            && action.take_profit >= 0.0
            && action.stop_loss < action.take_profit
    }

    /// Price levels for (stop, target)
    fn boundary_levels(action: &TradeAction, entry: f64, range: f64) -> (f64, f64) {
        let stop_dist = range * action.stop_loss.abs();
        let target_dist = range * action.take_profit.abs();
        match action.direction() {
            Direction::Short => (entry + stop_dist, entry - target_dist),
            _ => (entry - stop_dist, entry + target_dist),
        }
    }

    /// Walk the forward path bar by bar; a stop breach wins within a bar
    fn simulate(direction: Direction, stop: f64, target: f64, path: &[Candle]) -> TradeOutcome {
        for bar in path {
            let (stopped, reached) = match direction {
                Direction::Long => (bar.low < stop, bar.high > target),
                Direction::Short => (bar.high > stop, bar.low < target),
                Direction::Flat => return TradeOutcome::Flat,
            };
            if stopped {
                return TradeOutcome::StopLoss { exit_price: stop };
            }
            if reached {
                return TradeOutcome::TakeProfit { exit_price: target };
            }
        }

        // path is non-empty here
        let terminal = path[path.len() - 1].close;
        let closed_beyond_target = match direction {
            Direction::Long => terminal > target,
            Direction::Short => terminal < target,
            Direction::Flat => false,
        };
        if closed_beyond_target {
            TradeOutcome::TakeProfit { exit_price: target }
        } else {
            TradeOutcome::Floating {
                exit_price: terminal,
            }
        }
    }

    fn band_penalty(&self, distance: f64, band: [f64; 2]) -> f64 {
        if distance < band[0] || distance > band[1] {
            self.config.band_penalty
        } else {
            0.0
        }
    }
}

impl RewardFunction for RewardEvaluator {
    fn compute(&self, setup: &TradeSetup<'_>) -> RewardSignal {
        let action = setup.action;
        let entry = setup.entry_price;

        if action.has_non_finite()
            || !entry.is_finite()
            || entry <= 0.0
            || !setup.range.is_finite()
            || setup.forward_path.is_empty()
        {
            debug!(?action, entry, range = setup.range, "invalid reward inputs");
            return RewardSignal::rejected(RejectReason::InvalidInput);
        }

        let direction = action.direction();
        if direction != Direction::Flat && !Self::levels_consistent(action) {
            debug!(?action, "invalid trade: inconsistent stop/target");
            return RewardSignal::rejected(RejectReason::InconsistentLevels);
        }

        let (stop, target) = Self::boundary_levels(action, entry, setup.range);
        let outcome = Self::simulate(direction, stop, target, setup.forward_path);

        let mut signal = RewardSignal {
            outcome,
            ..Default::default()
        };

        if let Some(exit_price) = outcome.exit_price() {
            let change = (exit_price - entry) / entry;
            signal.pnl_reward = (change * self.config.reward_scale).tanh() * action.position_size;
        }

        signal.stop_loss_penalty =
            self.band_penalty(action.stop_loss.abs(), self.config.stop_loss_band);
        signal.take_profit_penalty =
            self.band_penalty(action.take_profit.abs(), self.config.take_profit_band);
        if action.position_size.abs() > self.config.max_position {
            signal.size_penalty = self.config.size_penalty;
        }

        signal.calculate_total(&self.config);

        debug!(
            ?outcome,
            entry,
            stop,
            target,
            reward = signal.total,
            "trade settled"
        );

        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_bar(price: f64) -> Candle {
        Candle::new(price, price + 0.01, price - 0.01, price, 0.5)
    }

    fn bar(high: f64, low: f64, close: f64) -> Candle {
        Candle::new(close, high, low, close, 0.5)
    }

    #[test]
    fn test_default_signal_is_flat() {
        let signal = RewardSignal::default();
        assert_eq!(signal.outcome, TradeOutcome::Flat);
        assert_eq!(signal.outcome.exit_price(), None);
        assert_eq!(signal.total, 0.0);
    }

    #[test]
    fn test_short_with_positive_stop_rejected() {
        let evaluator = RewardEvaluator::new();
        let action = TradeAction::new(-0.5, 0.2, -0.3);
        let path = vec![flat_bar(0.5); 5];

        let signal = evaluator.compute(&TradeSetup {
            action: &action,
            entry_price: 0.5,
            range: 0.2,
            forward_path: &path,
        });

        assert_eq!(signal.total, 0.0);
        assert_eq!(
            signal.outcome,
            TradeOutcome::Rejected(RejectReason::InconsistentLevels)
        );
    }

    #[test]
    fn test_long_take_profit_positive() {
        let evaluator = RewardEvaluator::new();
        let action = TradeAction::new(0.5, -0.2, 0.3);
        // target = 0.5 + 0.2 * 0.3 = 0.56, stop = 0.46
        let path = vec![bar(0.52, 0.49, 0.51), bar(0.60, 0.50, 0.58), bar(0.59, 0.40, 0.42)];

        let signal = evaluator.compute(&TradeSetup {
            action: &action,
            entry_price: 0.5,
            range: 0.2,
            forward_path: &path,
        });

        assert!(matches!(signal.outcome, TradeOutcome::TakeProfit { .. }));
        assert!(signal.total > 0.0);
    }

    #[test]
    fn test_long_stop_loss_negative() {
        let evaluator = RewardEvaluator::new();
        let action = TradeAction::new(0.5, -0.2, 0.3);
        let path = vec![bar(0.51, 0.45, 0.47), bar(0.70, 0.46, 0.69)];

        let reward = evaluator.calculate_reward(&action, 0.5, &path, 0.2);
        assert!(reward < 0.0);
    }

    #[test]
    fn test_short_take_profit_positive() {
        let evaluator = RewardEvaluator::new();
        let action = TradeAction::new(-0.5, -0.2, 0.3);
        // short: stop = 0.54, target = 0.44
        let path = vec![bar(0.52, 0.43, 0.45)];

        let signal = evaluator.compute(&TradeSetup {
            action: &action,
            entry_price: 0.5,
            range: 0.2,
            forward_path: &path,
        });

        assert!(matches!(signal.outcome, TradeOutcome::TakeProfit { .. }));
        assert!(signal.total > 0.0);
    }

    #[test]
    fn test_floating_uses_terminal_close() {
        let evaluator = RewardEvaluator::new();
        let action = TradeAction::new(0.5, -0.5, 0.5);
        let path = vec![bar(0.52, 0.49, 0.50), bar(0.53, 0.50, 0.52)];

        let signal = evaluator.compute(&TradeSetup {
            action: &action,
            entry_price: 0.5,
            range: 0.2,
            forward_path: &path,
        });

        assert_eq!(signal.outcome, TradeOutcome::Floating { exit_price: 0.52 });
        assert!(signal.pnl_reward > 0.0);
    }

    #[test]
    fn test_penalties_applied() {
        let evaluator = RewardEvaluator::new();
        // tight stop, tight target, oversized
        let action = TradeAction::new(0.9, -0.01, 0.02);
        let path = vec![bar(0.501, 0.4999, 0.5)];

        let signal = evaluator.compute(&TradeSetup {
            action: &action,
            entry_price: 0.5,
            range: 0.2,
            forward_path: &path,
        });

        assert_eq!(signal.stop_loss_penalty, -0.1);
        assert_eq!(signal.take_profit_penalty, -0.1);
        assert_eq!(signal.size_penalty, -0.05);
    }

    #[test]
    fn test_nan_entry_yields_zero() {
        let evaluator = RewardEvaluator::new();
        let action = TradeAction::new(0.5, -0.2, 0.3);
        let path = vec![flat_bar(0.5)];

        assert_eq!(evaluator.calculate_reward(&action, f64::NAN, &path, 0.2), 0.0);
        assert_eq!(evaluator.calculate_reward(&action, 0.5, &[], 0.2), 0.0);
    }

    #[test]
    fn test_total_clamped() {
        let config = RewardConfig {
            bounds: [-0.05, 0.05],
            ..Default::default()
        };
        let evaluator = RewardEvaluator::with_config(config);
        let action = TradeAction::new(1.0, -0.2, 0.3);
        let path = vec![bar(0.9, 0.49, 0.9)];

        let reward = evaluator.calculate_reward(&action, 0.5, &path, 0.2);
        assert!(reward <= 0.05);
    }
}
