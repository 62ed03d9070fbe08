//! State Representation
//!
//! A state is a window of `lookback` consecutive normalized OHLCV bars.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraderError};

/// Number of features per bar (open, high, low, close, volume)
pub const BAR_FEATURES: usize = 5;

/// One OHLCV bar, normalized to [0, 1] by the data source
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Feature vector fed to the encoder
    pub fn features(&self) -> [f64; BAR_FEATURES] {
        [self.open, self.high, self.low, self.close, self.volume]
    }

    /// Whether any field is NaN or infinite
    pub fn has_non_finite(&self) -> bool {
        self.features().iter().any(|v| !v.is_finite())
    }
}

/// Ordered window of consecutive bars ending at the decision point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateWindow {
    bars: Vec<Candle>,
}

impl StateWindow {
    /// Build a window; it must hold at least one bar
    pub fn new(bars: Vec<Candle>) -> Result<Self> {
        if bars.is_empty() {
            return Err(TraderError::shape("state window", 1, 0));
        }
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[Candle] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Most recent bar (the entry bar)
    pub fn last(&self) -> &Candle {
        // non-empty by construction
        &self.bars[self.bars.len() - 1]
    }

    /// Close of the most recent bar
    pub fn entry_price(&self) -> f64 {
        self.last().close
    }

    /// Max high minus min low across the window
    pub fn range(&self) -> f64 {
        let high = self
            .bars
            .iter()
            .map(|b| b.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let low = self.bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        high - low
    }

    /// Whether any bar carries a NaN or infinite value
    pub fn has_non_finite(&self) -> bool {
        self.bars.iter().any(Candle::has_non_finite)
    }

    /// Per-bar feature rows, in time order
    pub fn feature_rows(&self) -> impl Iterator<Item = [f64; BAR_FEATURES]> + '_ {
        self.bars.iter().map(Candle::features)
    }
}

/// Anything the learner accepts as a state, flattened row-major if nested
pub trait StateInput {
    fn flatten(&self) -> Cow<'_, [f64]>;
}

impl StateInput for [f64] {
    fn flatten(&self) -> Cow<'_, [f64]> {
        Cow::Borrowed(self)
    }
}

impl StateInput for Vec<f64> {
    fn flatten(&self) -> Cow<'_, [f64]> {
        Cow::Borrowed(self.as_slice())
    }
}

impl<const N: usize> StateInput for [f64; N] {
    fn flatten(&self) -> Cow<'_, [f64]> {
        Cow::Borrowed(self.as_slice())
    }
}

impl StateInput for [Vec<f64>] {
    fn flatten(&self) -> Cow<'_, [f64]> {
        Cow::Owned(self.iter().flatten().copied().collect())
    }
}

impl StateInput for Vec<Vec<f64>> {
    fn flatten(&self) -> Cow<'_, [f64]> {
        StateInput::flatten(self.as_slice())
    }
}

impl StateInput for StateWindow {
    fn flatten(&self) -> Cow<'_, [f64]> {
        Cow::Owned(self.feature_rows().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(high: f64, low: f64, close: f64) -> Candle {
        Candle::new(close, high, low, close, 0.5)
    }

    #[test]
    fn test_empty_window_rejected() {
        assert!(StateWindow::new(Vec::new()).is_err());
    }

    #[test]
    fn test_window_range_and_entry() {
        let window =
            StateWindow::new(vec![bar(0.6, 0.4, 0.5), bar(0.8, 0.5, 0.7), bar(0.7, 0.3, 0.6)])
                .unwrap();

        assert!((window.range() - 0.5).abs() < 1e-12);
        assert_eq!(window.entry_price(), 0.6);
    }

    #[test]
    fn test_nested_state_flattens_row_major() {
        let nested = vec![vec![1.0, 2.0], vec![3.0]];
        assert_eq!(StateInput::flatten(&nested).as_ref(), &[1.0, 2.0, 3.0]);

        let window = StateWindow::new(vec![bar(0.6, 0.4, 0.5)]).unwrap();
        assert_eq!(window.flatten().len(), BAR_FEATURES);
    }

    #[test]
    fn test_non_finite_detected() {
        let window = StateWindow::new(vec![bar(0.6, f64::NAN, 0.5)]).unwrap();
        assert!(window.has_non_finite());
    }
}
