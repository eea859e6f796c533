use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, close_prices};
use crate::model::Bar;

/// Simple Moving Average of closing prices.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// Trailing-window averages over any value slice.
    pub fn calculate_values(&self, values: &[f64]) -> Result<Vec<f64>, Report<IndicatorError>> {
        if values.len() < self.period {
            bail!(IndicatorError::InsufficientData {
                required: self.period,
                available: values.len(),
            });
        }
        Ok(values
            .windows(self.period)
            .map(|w| w.iter().sum::<f64>() / self.period as f64)
            .collect())
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        "sma"
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn calculate(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>> {
        self.calculate_values(&close_prices(bars))
    }
}

/// Exponential Moving Average, seeded with the SMA of the first `period` values.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    pub fn calculate_values(&self, values: &[f64]) -> Result<Vec<f64>, Report<IndicatorError>> {
        if values.len() < self.period {
            bail!(IndicatorError::InsufficientData {
                required: self.period,
                available: values.len(),
            });
        }

        let k = 2.0 / (self.period as f64 + 1.0);
        let mut ema = values[..self.period].iter().sum::<f64>() / self.period as f64;
        let mut results = Vec::with_capacity(values.len() - self.period + 1);
        results.push(ema);

        for &value in &values[self.period..] {
            ema = value * k + ema * (1.0 - k);
            results.push(ema);
        }

        Ok(results)
    }
}
