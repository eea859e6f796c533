use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, close_prices};
use crate::model::Bar;

/// RSI (Relative Strength Index) using Wilder's smoothing method.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn required_bars(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>> {
        let prices = close_prices(bars);
        if prices.len() < self.required_bars() {
            bail!(IndicatorError::InsufficientData {
                required: self.required_bars(),
                available: prices.len(),
            });
        }

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
        let period = self.period as f64;

        // Seed using simple average of first `period` gains/losses
        let mut avg_gain = deltas[..self.period].iter().map(|&d| d.max(0.0)).sum::<f64>() / period;
        let mut avg_loss =
            deltas[..self.period].iter().map(|&d| (-d).max(0.0)).sum::<f64>() / period;

        let mut results = Vec::with_capacity(deltas.len() - self.period + 1);
        results.push(rsi_value(avg_gain, avg_loss));

        for &delta in &deltas[self.period..] {
            avg_gain = (avg_gain * (period - 1.0) + delta.max(0.0)) / period;
            avg_loss = (avg_loss * (period - 1.0) + (-delta).max(0.0)) / period;
            results.push(rsi_value(avg_gain, avg_loss));
        }

        Ok(results)
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // 0/0: a flat window has no RSI.
        if avg_gain == 0.0 {
            return f64::NAN;
        }
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
