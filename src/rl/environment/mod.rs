//! Historical Market Environment for RL Training
//!
//! The learner only sees market data through [`MarketDataSource`]: state
//! windows ending at a bar index, and the bars that follow it.

mod historical;

pub use historical::{min_max_normalize, HistoricalSeries, OhlcvColumns};

use rand::Rng;

use crate::error::{Result, TraderError};
use crate::rl::core::{Candle, StateWindow};

/// Source of normalized bars for training and evaluation
pub trait MarketDataSource {
    /// Number of bars available
    fn len(&self) -> usize;

    /// Bars per state window
    fn lookback(&self) -> usize;

    /// Bar at `index`, if any
    fn bar(&self, index: usize) -> Option<&Candle>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `lookback` bars ending at `index` (inclusive)
    fn get_state(&self, index: usize) -> Result<StateWindow> {
        let lookback = self.lookback();
        let min = lookback.saturating_sub(1);
        if lookback == 0 || index < min || index >= self.len() {
            return Err(TraderError::IndexOutOfBounds {
                index,
                min,
                max: self.len(),
            });
        }

        let bars = (index + 1 - lookback..=index)
            .filter_map(|i| self.bar(i).copied())
            .collect();
        StateWindow::new(bars)
    }

    /// The `bars` bars strictly after `index`
    fn forward_path(&self, index: usize, bars: usize) -> Result<Vec<Candle>> {
        let end = index + bars;
        if bars == 0 || end >= self.len() {
            return Err(TraderError::IndexOutOfBounds {
                index: end,
                min: index + 1,
                max: self.len(),
            });
        }
        Ok((index + 1..=end).filter_map(|i| self.bar(i).copied()).collect())
    }

    /// Valid decision indices `[lookback + bars_predicted, len - lookback - bars_predicted)`
    fn index_bounds(&self, bars_predicted: usize) -> Result<(usize, usize)> {
        let margin = self.lookback() + bars_predicted;
        let max = self.len().saturating_sub(margin);
        if margin >= max {
            return Err(TraderError::IndexOutOfBounds {
                index: margin,
                min: margin,
                max,
            });
        }
        Ok((margin, max))
    }

    /// Uniformly drawn decision index within [`index_bounds`](Self::index_bounds)
    fn random_index<R: Rng + ?Sized>(&self, bars_predicted: usize, rng: &mut R) -> Result<usize>
    where
        Self: Sized,
    {
        let (min, max) = self.index_bounds(bars_predicted)?;
        Ok(rng.gen_range(min..max))
    }
}
