use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Sma;
use crate::indicator::{Indicator, volumes};
use crate::model::Bar;

/// Volume Moving Average: simple average of traded volume over a period,
/// inclusive of the current bar.
pub struct VolumeMA {
    period: usize,
}

impl VolumeMA {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

impl Indicator for VolumeMA {
    fn name(&self) -> &str {
        "volume_ma"
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn calculate(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>> {
        Sma::new(self.period)?.calculate_values(&volumes(bars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::bars_with_volumes;

    #[test]
    fn volume_ma_period_zero_invalid() {
        assert!(VolumeMA::new(0).is_err());
    }

    #[test]
    fn volume_ma_insufficient_data() {
        let vma = VolumeMA::new(5).unwrap();
        assert!(vma.calculate(&bars_with_volumes(&[1.0; 4])).is_err());
    }

    #[test]
    fn volume_ma_known_value() {
        let vma = VolumeMA::new(3).unwrap();
        let values = vma.calculate(&bars_with_volumes(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert!((values[0] - 2.0).abs() < 1e-9);
        assert!((values[1] - 3.0).abs() < 1e-9);
    }
}
