use std::collections::HashMap;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::SourceError;
use crate::model::{Evidence, Interval, VoteSummary, WatchlistEntry};
use crate::source::{SignalSource, http_client, request_error};

const TRADINGVIEW_SCAN_URL: &str = "https://scanner.tradingview.com/america/scan";
const SOURCE_NAME: &str = "tradingview";

const MOVING_AVERAGES: &[&str] = &[
    "EMA10", "SMA10", "EMA20", "SMA20", "EMA30", "SMA30", "EMA50", "SMA50", "EMA100", "SMA100",
    "EMA200", "SMA200",
];

/// Oscillator columns, in request order after the moving averages.
const OSCILLATORS: &[&str] = &[
    "RSI",
    "RSI[1]",
    "Stoch.K",
    "Stoch.D",
    "Stoch.K[1]",
    "Stoch.D[1]",
    "CCI20",
    "CCI20[1]",
    "Mom",
    "Mom[1]",
    "MACD.macd",
    "MACD.signal",
];

/// TradingView scanner client (aggregated-summary mode, batched).
///
/// Requests the raw indicator columns for every `VENUE:SYMBOL` in one POST
/// and turns them into buy/sell/neutral votes locally.
pub struct TradingViewSource {
    client: reqwest::Client,
    interval: Interval,
}

impl TradingViewSource {
    pub fn new(interval: Interval, timeout: Duration) -> Result<Self, Report<SourceError>> {
        Ok(Self {
            client: http_client(SOURCE_NAME, timeout)?,
            interval,
        })
    }

    fn columns(&self) -> Vec<String> {
        let suffix = self.interval.tradingview_suffix();
        std::iter::once("close")
            .chain(MOVING_AVERAGES.iter().copied())
            .chain(OSCILLATORS.iter().copied())
            .map(|c| format!("{c}{suffix}"))
            .collect()
    }

    async fn scan(
        &self,
        entries: &[WatchlistEntry],
    ) -> Result<HashMap<String, Evidence>, Report<SourceError>> {
        if entries.is_empty() {
            return Ok(HashMap::new());
        }

        let tickers: Vec<String> = entries.iter().map(|e| e.to_string()).collect();
        let body = json!({
            "symbols": { "tickers": tickers, "query": { "types": [] } },
            "columns": self.columns(),
        });

        let response = self
            .client
            .post(TRADINGVIEW_SCAN_URL)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(SOURCE_NAME, e))?;

        if !response.status().is_success() {
            return Err(Report::new(SourceError::Request {
                source_name: SOURCE_NAME.into(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        let scan: ScanResponse =
            response
                .json()
                .await
                .change_context(SourceError::ResponseParse {
                    source_name: SOURCE_NAME.into(),
                })?;

        let summaries = scan.into_summaries();
        info!(
            requested = entries.len(),
            resolved = summaries.len(),
            interval = %self.interval,
            "tradingview scan complete"
        );

        Ok(summaries
            .into_iter()
            .map(|s| (s.symbol.clone(), Evidence::Votes(s)))
            .collect())
    }
}

impl SignalSource for TradingViewSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn fetch_one<'a>(
        &'a self,
        entry: &'a WatchlistEntry,
    ) -> BoxFuture<'a, Result<Evidence, Report<SourceError>>> {
        Box::pin(async move {
            let mut found = self.scan(std::slice::from_ref(entry)).await?;
            found.remove(&entry.symbol).ok_or_else(|| {
                Report::new(SourceError::NotFound {
                    source_name: SOURCE_NAME.into(),
                    symbol: entry.symbol.clone(),
                })
            })
        })
    }

    fn fetch_many<'a>(
        &'a self,
        entries: &'a [WatchlistEntry],
    ) -> BoxFuture<'a, Result<HashMap<String, Evidence>, Report<SourceError>>> {
        Box::pin(self.scan(entries))
    }
}

// ── Scanner response ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ScanResponse {
    #[serde(default)]
    data: Vec<ScanRow>,
}

#[derive(Debug, Deserialize)]
struct ScanRow {
    /// `VENUE:SYMBOL`
    s: String,
    d: Vec<Option<f64>>,
}

impl ScanResponse {
    fn into_summaries(self) -> Vec<VoteSummary> {
        self.data.into_iter().filter_map(ScanRow::into_summary).collect()
    }
}

impl ScanRow {
    fn into_summary(self) -> Option<VoteSummary> {
        let symbol = self
            .s
            .split_once(':')
            .map_or(self.s.as_str(), |(_, s)| s)
            .to_owned();

        let value = |i: usize| self.d.get(i).copied().flatten();
        let Some(close) = value(0).filter(|c| *c > 0.0) else {
            debug!(symbol = %symbol, "tradingview row without close, skipping");
            return None;
        };

        let mut tally = Tally::default();
        for i in 0..MOVING_AVERAGES.len() {
            tally.add(value(1 + i).map(|ma| moving_average_vote(ma, close)));
        }

        let osc = |name: &str| {
            OSCILLATORS
                .iter()
                .position(|c| *c == name)
                .and_then(|i| value(1 + MOVING_AVERAGES.len() + i))
        };
        let pair = |a: &str, b: &str| osc(a).zip(osc(b));

        tally.add(pair("RSI", "RSI[1]").map(|(now, prev)| rsi_vote(now, prev)));
        tally.add(
            pair("Stoch.K", "Stoch.D")
                .zip(pair("Stoch.K[1]", "Stoch.D[1]"))
                .map(|((k, d), (k1, d1))| stoch_vote(k, d, k1, d1)),
        );
        tally.add(pair("CCI20", "CCI20[1]").map(|(now, prev)| cci_vote(now, prev)));
        tally.add(pair("Mom", "Mom[1]").map(|(now, prev)| momentum_vote(now, prev)));
        tally.add(pair("MACD.macd", "MACD.signal").map(|(m, s)| macd_vote(m, s)));

        Some(VoteSummary {
            symbol,
            buy: tally.buy,
            sell: tally.sell,
            neutral: tally.neutral,
            close,
            rsi: osc("RSI"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vote {
    Buy,
    Sell,
    Neutral,
}

#[derive(Debug, Default)]
struct Tally {
    buy: u32,
    sell: u32,
    neutral: u32,
}

impl Tally {
    /// Missing inputs cast no vote.
    fn add(&mut self, vote: Option<Vote>) {
        match vote {
            Some(Vote::Buy) => self.buy += 1,
            Some(Vote::Sell) => self.sell += 1,
            Some(Vote::Neutral) => self.neutral += 1,
            None => {}
        }
    }
}

fn moving_average_vote(ma: f64, close: f64) -> Vote {
    if ma < close {
        Vote::Buy
    } else if ma > close {
        Vote::Sell
    } else {
        Vote::Neutral
    }
}

fn rsi_vote(now: f64, prev: f64) -> Vote {
    if now < 30.0 && prev < now {
        Vote::Buy
    } else if now > 70.0 && prev > now {
        Vote::Sell
    } else {
        Vote::Neutral
    }
}

fn stoch_vote(k: f64, d: f64, k1: f64, d1: f64) -> Vote {
    if k < 20.0 && d < 20.0 && k > d && k1 < d1 {
        Vote::Buy
    } else if k > 80.0 && d > 80.0 && k < d && k1 > d1 {
        Vote::Sell
    } else {
        Vote::Neutral
    }
}

fn cci_vote(now: f64, prev: f64) -> Vote {
    if now < -100.0 && now > prev {
        Vote::Buy
    } else if now > 100.0 && now < prev {
        Vote::Sell
    } else {
        Vote::Neutral
    }
}

fn momentum_vote(now: f64, prev: f64) -> Vote {
    if now > prev {
        Vote::Buy
    } else if now < prev {
        Vote::Sell
    } else {
        Vote::Neutral
    }
}

fn macd_vote(macd: f64, signal: f64) -> Vote {
    if macd > signal {
        Vote::Buy
    } else if macd < signal {
        Vote::Sell
    } else {
        Vote::Neutral
    }
}
