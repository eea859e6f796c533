use error_stack::{Report, bail};
use tracing::debug;

use crate::error::IndicatorError;
use crate::indicator::Indicator;
use crate::indicator::ma::Sma;
use crate::indicator::macd::{Macd, MacdPoint};
use crate::indicator::rsi::Rsi;
use crate::indicator::volume::VolumeMA;
use crate::model::{Bar, BarSeries};

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const AVERAGE_WINDOW: usize = 20;
pub const DEFAULT_MIN_BARS: usize = 30;

/// Indicator values as of the last bar of a series.
///
/// `rsi` and `macd` are `None` while their warm-up exceeds the series length.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub rsi: Option<f64>,
    pub macd: Option<MacdPoint>,
    pub volume_average: f64,
    pub sma: f64,
}

/// Computes RSI(14), MACD(12,26,9), volume MA(20) and SMA(20) for a series.
pub struct IndicatorEngine {
    min_bars: usize,
    rsi: Rsi,
    macd: Macd,
    volume: VolumeMA,
    sma: Sma,
}

impl IndicatorEngine {
    pub fn new(min_bars: usize) -> Result<Self, Report<IndicatorError>> {
        if min_bars < AVERAGE_WINDOW {
            bail!(IndicatorError::InvalidParameter {
                name: format!("min_bars must be >= {AVERAGE_WINDOW}"),
            });
        }
        Ok(Self {
            min_bars,
            rsi: Rsi::new(RSI_PERIOD)?,
            macd: Macd::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)?,
            volume: VolumeMA::new(AVERAGE_WINDOW)?,
            sma: Sma::new(AVERAGE_WINDOW)?,
        })
    }

    /// Produce the snapshot for the last bar, refusing series shorter than
    /// `min_bars`.
    pub fn snapshot(&self, bars: &[Bar]) -> Result<IndicatorSnapshot, Report<IndicatorError>> {
        if bars.len() < self.min_bars {
            bail!(IndicatorError::InsufficientData {
                required: self.min_bars,
                available: bars.len(),
            });
        }

        let rsi = optional_last(&self.rsi, self.rsi.calculate(bars))?;
        let macd = match self.macd.calculate_full(bars) {
            Ok(points) => points.last().copied(),
            Err(report) if is_insufficient(&report) => {
                debug!(
                    indicator = self.macd.name(),
                    bars = bars.len(),
                    required = self.macd.required_bars(),
                    "indicator still warming up"
                );
                None
            }
            Err(report) => return Err(report),
        };

        let volume_average = last_value(&self.volume, self.volume.calculate(bars)?)?;
        let sma = last_value(&self.sma, self.sma.calculate(bars)?)?;

        Ok(IndicatorSnapshot {
            rsi,
            macd,
            volume_average,
            sma,
        })
    }
}

fn is_insufficient(report: &Report<IndicatorError>) -> bool {
    matches!(
        report.current_context(),
        IndicatorError::InsufficientData { .. }
    )
}

fn optional_last(
    indicator: &dyn Indicator,
    values: Result<Vec<f64>, Report<IndicatorError>>,
) -> Result<Option<f64>, Report<IndicatorError>> {
    match values {
        Ok(values) => Ok(values.last().copied().filter(|v| !v.is_nan())),
        Err(report) if is_insufficient(&report) => {
            debug!(
                indicator = indicator.name(),
                required = indicator.required_bars(),
                "indicator still warming up"
            );
            Ok(None)
        }
        Err(report) => Err(report),
    }
}

fn last_value(indicator: &dyn Indicator, values: Vec<f64>) -> Result<f64, Report<IndicatorError>> {
    match values.last() {
        Some(&v) => Ok(v),
        None => bail!(IndicatorError::InsufficientData {
            required: indicator.required_bars(),
            available: 0,
        }),
    }
}

/// Overwrite the last bar's close with a live price, widening its high/low
/// range when the price falls outside it.
///
/// This is an explicit pre-processing step: indicators computed afterwards
/// reflect the live price instead of the last completed bar's close.
/// Returns `false` (and leaves the series untouched) when the price is not
/// positive or the series is empty.
pub fn splice_live_price(series: &mut BarSeries, price: f64) -> bool {
    if price.is_nan() || price <= 0.0 {
        return false;
    }
    let Some(last) = series.bars.last_mut() else {
        return false;
    };
    last.close = price;
    last.high = last.high.max(price);
    last.low = last.low.min(price);
    true
}
