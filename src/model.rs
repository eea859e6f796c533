use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bar sampling interval supported by the signal sources.
///
/// String representations match the config file format (e.g. `"5m"`, `"1d"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Min1,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour4,
    Day1,
}

impl Interval {
    /// Parse a config-format string into an `Interval`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::Min1),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "30m" => Some(Self::Min30),
            "1h" => Some(Self::Hour1),
            "4h" => Some(Self::Hour4),
            "1d" => Some(Self::Day1),
            _ => None,
        }
    }

    /// Return the config-format string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
        }
    }

    /// Return the Yahoo chart `interval` query value.
    ///
    /// Yahoo has no 4h bars; 1h is the closest coarser-grained substitute.
    pub fn yahoo_interval(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Hour1 | Self::Hour4 => "60m",
            Self::Day1 => "1d",
        }
    }

    /// Return the TradingView scanner column suffix (empty for daily).
    pub fn tradingview_suffix(self) -> &'static str {
        match self {
            Self::Min1 => "|1",
            Self::Min5 => "|5",
            Self::Min15 => "|15",
            Self::Min30 => "|30",
            Self::Hour1 => "|60",
            Self::Hour4 => "|240",
            Self::Day1 => "",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How far back a bar request reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lookback {
    Day1,
    Day5,
    Month1,
    Month3,
    Month6,
    Year1,
}

impl Lookback {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1d" => Some(Self::Day1),
            "5d" => Some(Self::Day5),
            "1mo" => Some(Self::Month1),
            "3mo" => Some(Self::Month3),
            "6mo" => Some(Self::Month6),
            "1y" => Some(Self::Year1),
            _ => None,
        }
    }

    /// Config-format string, which is also the Yahoo chart `range` value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day1 => "1d",
            Self::Day5 => "5d",
            Self::Month1 => "1mo",
            Self::Month3 => "3mo",
            Self::Month6 => "6mo",
            Self::Year1 => "1y",
        }
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One sampling interval of a symbol's price history.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bars for one symbol in ascending chronological order (oldest first).
#[derive(Debug, Clone, PartialEq)]
pub struct BarSeries {
    pub symbol: String,
    pub bars: Vec<Bar>,
    /// Most recent traded price reported alongside the bars, if any.
    pub live_price: Option<f64>,
}

impl BarSeries {
    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }
}

/// Buy/sell/neutral votes from an upstream multi-indicator aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteSummary {
    pub symbol: String,
    pub buy: u32,
    pub sell: u32,
    pub neutral: u32,
    pub close: f64,
    pub rsi: Option<f64>,
}

impl VoteSummary {
    pub fn total(&self) -> u32 {
        self.buy + self.sell + self.neutral
    }
}

/// Per-symbol input handed from a signal source to a scorer.
#[derive(Debug, Clone, PartialEq)]
pub enum Evidence {
    Bars(BarSeries),
    Votes(VoteSummary),
}

impl Evidence {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bars(_) => "bar-series",
            Self::Votes(_) => "vote-summary",
        }
    }
}

/// A symbol to scan plus the venue used to disambiguate lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub venue: String,
}

impl fmt::Display for WatchlistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.venue, self.symbol)
    }
}

/// Outcome of scoring one symbol. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    /// 0..=100.
    pub score: u8,
    pub reasons: Vec<String>,
    /// 0.0 when the symbol was excluded before pricing.
    pub reference_price: f64,
    pub rsi: Option<f64>,
}

impl ScoreResult {
    /// Result for a symbol that was excluded or could not be evaluated.
    pub fn zero() -> Self {
        Self {
            score: 0,
            reasons: Vec::new(),
            reference_price: 0.0,
            rsi: None,
        }
    }
}
