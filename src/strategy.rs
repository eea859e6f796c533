pub mod rules;
pub mod votes;

use error_stack::{Report, ResultExt};

use crate::config::{ScanMode, ScoringConfig};
use crate::error::ScoreError;
use crate::model::{Evidence, ScoreResult};
use crate::strategy::rules::RuleScorer;
use crate::strategy::votes::VoteScorer;

/// Converts per-symbol evidence into a 0..=100 score.
///
/// Implementations are pure: the same evidence always yields the same result.
pub trait Scorer: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, evidence: &Evidence) -> Result<ScoreResult, Report<ScoreError>>;
}

/// Build the scorer matching the configured scan mode.
pub fn build_scorer(
    mode: ScanMode,
    scoring: &ScoringConfig,
) -> Result<Box<dyn Scorer>, Report<ScoreError>> {
    match mode {
        ScanMode::Technical => {
            let scorer = RuleScorer::new(scoring.clone()).change_context(ScoreError::Indicator)?;
            Ok(Box::new(scorer))
        }
        ScanMode::Votes => Ok(Box::new(VoteScorer)),
    }
}

/// Whether a result clears the alert threshold.
///
/// Results without a reference price (excluded symbols) never qualify.
pub fn is_alert_worthy(result: &ScoreResult, threshold: u8) -> bool {
    result.score >= threshold && result.reference_price > 0.0
}
