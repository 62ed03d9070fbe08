//! Historical OHLCV series loaded from column-oriented JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::MarketDataSource;
use crate::error::{Result, TraderError};
use crate::rl::core::Candle;

/// Raw price history, one array per field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OhlcvColumns {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl OhlcvColumns {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    fn check_lengths(&self) -> Result<()> {
        let n = self.len();
        for (name, col) in [
            ("open column", &self.open),
            ("high column", &self.high),
            ("low column", &self.low),
            ("volume column", &self.volume),
        ] {
            if col.len() != n {
                return Err(TraderError::shape(name, n, col.len()));
            }
        }
        Ok(())
    }
}

/// Min-max scale the trailing `data_points` values into [0, 1].
///
/// Constant (or non-finite) columns scale to 0.
pub fn min_max_normalize(values: &[f64], data_points: usize) -> Vec<f64> {
    let tail = &values[values.len().saturating_sub(data_points)..];
    let min = tail.iter().copied().fold(f64::INFINITY, f64::min);
    let max = tail.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    if !span.is_finite() || span <= 0.0 {
        return vec![0.0; tail.len()];
    }
    tail.iter().map(|v| (v - min) / span).collect()
}

/// Normalized bar series served as state windows
#[derive(Debug, Clone)]
pub struct HistoricalSeries {
    bars: Vec<Candle>,
    lookback: usize,
}

impl HistoricalSeries {
    /// Normalize the trailing `data_points` bars of `columns`
    pub fn from_columns(columns: &OhlcvColumns, lookback: usize, data_points: usize) -> Result<Self> {
        columns.check_lengths()?;
        if lookback == 0 {
            return Err(TraderError::InvalidConfig("lookback must be positive".to_string()));
        }

        let open = min_max_normalize(&columns.open, data_points);
        let high = min_max_normalize(&columns.high, data_points);
        let low = min_max_normalize(&columns.low, data_points);
        let close = min_max_normalize(&columns.close, data_points);
        let volume = min_max_normalize(&columns.volume, data_points);

        let bars = (0..close.len())
            .map(|i| Candle::new(open[i], high[i], low[i], close[i], volume[i]))
            .collect();

        Ok(Self { bars, lookback })
    }

    /// Use already-normalized bars as-is
    pub fn from_bars(bars: Vec<Candle>, lookback: usize) -> Result<Self> {
        if lookback == 0 {
            return Err(TraderError::InvalidConfig("lookback must be positive".to_string()));
        }
        Ok(Self { bars, lookback })
    }

    pub fn from_json_str(json: &str, lookback: usize, data_points: usize) -> Result<Self> {
        let columns: OhlcvColumns = serde_json::from_str(json)?;
        Self::from_columns(&columns, lookback, data_points)
    }

    /// Read and normalize a JSON file of OHLCV columns
    pub async fn load(path: impl AsRef<Path>, lookback: usize, data_points: usize) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let series = Self::from_json_str(&raw, lookback, data_points)?;

        info!(
            path = %path.display(),
            bars = series.len(),
            lookback,
            "Loaded historical series"
        );
        Ok(series)
    }

    pub fn bars(&self) -> &[Candle] {
        &self.bars
    }
}

impl MarketDataSource for HistoricalSeries {
    fn len(&self) -> usize {
        self.bars.len()
    }

    fn lookback(&self) -> usize {
        self.lookback
    }

    fn bar(&self, index: usize) -> Option<&Candle> {
        self.bars.get(index)
    }
}
