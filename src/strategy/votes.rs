use error_stack::{Report, bail};

use crate::error::ScoreError;
use crate::model::{Evidence, ScoreResult, VoteSummary};
use crate::strategy::Scorer;

/// Share of upstream "buy" votes, as a 0..=100 score.
///
/// Carries no reasons; the reference price and RSI come straight from the
/// aggregator's own indicator columns.
pub struct VoteScorer;

impl VoteScorer {
    pub fn score_votes(&self, votes: &VoteSummary) -> ScoreResult {
        let total = votes.total();
        let score = if total == 0 {
            0
        } else {
            // buy <= total, so the quotient is at most 100
            (u64::from(votes.buy) * 100 / u64::from(total)) as u8
        };
        ScoreResult {
            score,
            reasons: Vec::new(),
            reference_price: votes.close,
            rsi: votes.rsi,
        }
    }
}

impl Scorer for VoteScorer {
    fn name(&self) -> &'static str {
        "votes"
    }

    fn score(&self, evidence: &Evidence) -> Result<ScoreResult, Report<ScoreError>> {
        match evidence {
            Evidence::Votes(votes) => Ok(self.score_votes(votes)),
            other => bail!(ScoreError::UnsupportedEvidence {
                scorer: self.name(),
                evidence: other.kind(),
            }),
        }
    }
}
