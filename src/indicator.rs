pub mod ma;
pub mod macd;
pub mod rsi;
pub mod snapshot;
pub mod volume;

use error_stack::Report;

use crate::error::IndicatorError;
use crate::model::Bar;

/// A technical analysis indicator that operates on a slice of bars.
///
/// Bars must be in ascending chronological order (oldest first).
pub trait Indicator: Send + Sync {
    /// Unique name of this indicator (e.g., "rsi", "sma").
    fn name(&self) -> &str;

    /// Minimum number of bars required to produce at least one output value.
    fn required_bars(&self) -> usize;

    /// Calculate indicator values from bars.
    ///
    /// Returns one value per output point. The number of values may be less
    /// than the number of input bars depending on the indicator's lookback.
    fn calculate(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>>;
}

/// Extract close prices from a slice of bars.
pub fn close_prices(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Extract volumes from a slice of bars.
pub fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume).collect()
}
