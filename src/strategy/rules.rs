use error_stack::{Report, bail};
use tracing::debug;

use crate::config::ScoringConfig;
use crate::error::{IndicatorError, ScoreError};
use crate::indicator::snapshot::{IndicatorEngine, IndicatorSnapshot};
use crate::model::{Bar, BarSeries, Evidence, ScoreResult};
use crate::strategy::Scorer;

pub const MOMENTUM_POINTS: u8 = 20;
pub const LARGE_GAIN_POINTS: u8 = 10;
pub const VOLUME_POINTS: u8 = 20;
pub const RSI_POINTS: u8 = 20;
pub const MACD_POINTS: u8 = 20;
pub const DISPARITY_POINTS: u8 = 10;
pub const MAX_SCORE: u8 = 100;

pub const REASON_LARGE_GAIN: &str = "🔥 large intraday gain";
pub const REASON_VOLUME_SPIKE: &str = "🟢 volume spike";
pub const REASON_MACD_CROSS: &str = "🟢 uptrend (MACD above signal)";

/// Rule-weighted technical score over the last bar of a series.
///
/// Each satisfied rule adds a fixed increment:
///
/// | rule | points |
/// |---|---|
/// | close > open | 20 |
/// | intraday gain above `large_gain_pct` | +10 |
/// | volume > `volume_surge_multiplier` × 20-bar average | 20 |
/// | RSI inside `[rsi_low, rsi_high]` | 20 |
/// | MACD line > signal line | 20 |
/// | close / SMA20 × 100 inside `[disparity_low, disparity_high]` | 10 |
///
/// A close under `price_floor` short-circuits to a zero result.
pub struct RuleScorer {
    params: ScoringConfig,
    engine: IndicatorEngine,
}

impl RuleScorer {
    pub fn new(params: ScoringConfig) -> Result<Self, Report<IndicatorError>> {
        let engine = IndicatorEngine::new(params.min_bars)?;
        Ok(Self { params, engine })
    }

    /// Score a bar series. Series too short for the indicator engine score 0.
    pub fn score_series(&self, series: &BarSeries) -> Result<ScoreResult, Report<ScoreError>> {
        let Some(last) = series.last() else {
            return Ok(ScoreResult::zero());
        };
        if last.close < self.params.price_floor {
            return Ok(ScoreResult::zero());
        }

        let snapshot = match self.engine.snapshot(&series.bars) {
            Ok(snapshot) => snapshot,
            Err(report) => {
                if let IndicatorError::InsufficientData {
                    required,
                    available,
                } = *report.current_context()
                {
                    debug!(
                        symbol = %series.symbol,
                        required,
                        available,
                        "insufficient bars, scoring as zero"
                    );
                    return Ok(ScoreResult::zero());
                }
                return Err(report.change_context(ScoreError::Indicator));
            }
        };

        Ok(self.score_snapshot(last, &snapshot))
    }

    /// Apply the weighted rules to an already computed snapshot.
    pub fn score_snapshot(&self, last: &Bar, snapshot: &IndicatorSnapshot) -> ScoreResult {
        let p = &self.params;
        if last.close < p.price_floor {
            return ScoreResult::zero();
        }

        let mut score: u8 = 0;
        let mut reasons = Vec::new();

        if last.close > last.open {
            score += MOMENTUM_POINTS;
            if last.open > 0.0 && (last.close - last.open) / last.open > p.large_gain_pct {
                score += LARGE_GAIN_POINTS;
                reasons.push(REASON_LARGE_GAIN.to_owned());
            }
        }

        if last.volume > snapshot.volume_average * p.volume_surge_multiplier {
            score += VOLUME_POINTS;
            reasons.push(REASON_VOLUME_SPIKE.to_owned());
        }

        if snapshot
            .rsi
            .is_some_and(|rsi| (p.rsi_low..=p.rsi_high).contains(&rsi))
        {
            score += RSI_POINTS;
        }

        if snapshot.macd.is_some_and(|m| m.macd > m.signal) {
            score += MACD_POINTS;
            reasons.push(REASON_MACD_CROSS.to_owned());
        }

        if snapshot.sma > 0.0 {
            let disparity = last.close / snapshot.sma * 100.0;
            if (p.disparity_low..=p.disparity_high).contains(&disparity) {
                score += DISPARITY_POINTS;
            }
        }

        ScoreResult {
            score: score.min(MAX_SCORE),
            reasons,
            reference_price: last.close,
            rsi: snapshot.rsi,
        }
    }
}

impl Scorer for RuleScorer {
    fn name(&self) -> &'static str {
        "rules"
    }

    fn score(&self, evidence: &Evidence) -> Result<ScoreResult, Report<ScoreError>> {
        match evidence {
            Evidence::Bars(series) => self.score_series(series),
            other => bail!(ScoreError::UnsupportedEvidence {
                scorer: self.name(),
                evidence: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::macd::MacdPoint;
    use crate::indicator::test_support::{bar, bars_from_closes};
    use crate::model::VoteSummary;

    fn scorer() -> RuleScorer {
        RuleScorer::new(ScoringConfig::default()).unwrap()
    }

    fn bullish_snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi: Some(50.0),
            macd: Some(MacdPoint {
                macd: 0.4,
                signal: 0.1,
            }),
            volume_average: 1_000.0,
            sma: 9.85,
        }
    }

    #[test]
    fn every_rule_firing_caps_at_100() {
        // gap (10-9)/9 = 11%, volume 2x, RSI 50, MACD above, disparity 101.5
        let result = scorer().score_snapshot(&bar(9.0, 10.0, 2_000.0), &bullish_snapshot());
        assert_eq!(result.score, 100);
        assert_eq!(result.reference_price, 10.0);
        assert_eq!(
            result.reasons,
            vec![REASON_LARGE_GAIN, REASON_VOLUME_SPIKE, REASON_MACD_CROSS]
        );
    }

    #[test]
    fn stretched_price_misses_disparity_bonus() {
        let snapshot = IndicatorSnapshot {
            sma: 8.0,
            ..bullish_snapshot()
        };
        // disparity 125 -> 20 + 10 + 20 + 20 + 20
        let result = scorer().score_snapshot(&bar(9.0, 10.0, 2_000.0), &snapshot);
        assert_eq!(result.score, 90);
        assert_eq!(result.reasons.len(), 3);
    }

    #[test]
    fn below_price_floor_scores_zero_regardless() {
        let result = scorer().score_snapshot(&bar(1.5, 2.0, 50_000.0), &bullish_snapshot());
        assert_eq!(result, ScoreResult::zero());
    }

    #[test]
    fn price_floor_is_configurable() {
        let scorer = RuleScorer::new(ScoringConfig {
            price_floor: 3.0,
            ..ScoringConfig::default()
        })
        .unwrap();
        let result = scorer.score_snapshot(&bar(3.9, 4.0, 10.0), &bullish_snapshot());
        assert!(result.score > 0);
        assert_eq!(result.reference_price, 4.0);
    }

    #[test]
    fn small_gain_gets_momentum_without_bonus() {
        let snapshot = IndicatorSnapshot {
            rsi: Some(90.0),
            macd: None,
            volume_average: 1_000.0,
            sma: 100.0,
        };
        let result = scorer().score_snapshot(&bar(10.0, 10.2, 100.0), &snapshot);
        assert_eq!(result.score, 20);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn rsi_band_is_inclusive_and_silent() {
        let snapshot = IndicatorSnapshot {
            rsi: Some(35.0),
            macd: None,
            volume_average: 1_000.0,
            sma: 100.0,
        };
        let result = scorer().score_snapshot(&bar(10.0, 10.0, 100.0), &snapshot);
        assert_eq!(result.score, RSI_POINTS);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn missing_indicators_do_not_score() {
        let snapshot = IndicatorSnapshot {
            rsi: None,
            macd: None,
            volume_average: 1_000.0,
            sma: 10.0,
        };
        let result = scorer().score_snapshot(&bar(10.0, 10.0, 100.0), &snapshot);
        // only disparity (100) fires
        assert_eq!(result.score, DISPARITY_POINTS);
    }

    #[test]
    fn short_series_scores_zero() {
        let series = BarSeries {
            symbol: "NVDA".into(),
            bars: bars_from_closes(&[50.0; 29]),
            live_price: None,
        };
        assert_eq!(scorer().score_series(&series).unwrap(), ScoreResult::zero());
    }

    #[test]
    fn flat_series_earns_no_rsi_points() {
        let series = BarSeries {
            symbol: "FLAT".into(),
            bars: bars_from_closes(&[10.0; 40]),
            live_price: None,
        };
        let result = scorer().score_series(&series).unwrap();
        // MACD is 0 == signal and volume is flat; only disparity (100) fires
        assert_eq!(result.score, DISPARITY_POINTS);
        assert_eq!(result.rsi, None);
    }

    #[test]
    fn series_below_floor_scores_zero() {
        let closes: Vec<f64> = (0..60).map(|i| 2.0 + (i % 3) as f64 * 0.01).collect();
        let series = BarSeries {
            symbol: "PENNY".into(),
            bars: bars_from_closes(&closes),
            live_price: None,
        };
        assert_eq!(scorer().score_series(&series).unwrap(), ScoreResult::zero());
    }

    #[test]
    fn scores_are_multiples_of_ten_and_repeatable() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 20.0 + (i as f64 * 0.7).sin() * 2.0 + i as f64 * 0.05)
            .collect();
        let mut bars = bars_from_closes(&closes);
        for (i, b) in bars.iter_mut().enumerate() {
            b.open = b.close * 0.99;
            b.volume = 1_000.0 + (i % 7) as f64 * 300.0;
        }
        let series = BarSeries {
            symbol: "AMD".into(),
            bars,
            live_price: None,
        };
        let first = scorer().score_series(&series).unwrap();
        let second = scorer().score_series(&series).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.score % 10, 0);
        assert!(first.score <= 100);
    }

    #[test]
    fn vote_evidence_is_rejected() {
        let evidence = Evidence::Votes(VoteSummary {
            symbol: "TSLA".into(),
            buy: 1,
            sell: 0,
            neutral: 0,
            close: 10.0,
            rsi: None,
        });
        let err = scorer().score(&evidence).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ScoreError::UnsupportedEvidence { .. }
        ));
    }
}
