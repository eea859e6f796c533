use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum SourceError {
    #[display("failed to build http client for {source_name}")]
    Client { source_name: String },
    #[display("request to {source_name} failed")]
    Request { source_name: String },
    #[display("request to {source_name} timed out")]
    Timeout { source_name: String },
    #[display("failed to parse response from {source_name}")]
    ResponseParse { source_name: String },
    #[display("{source_name} has no data for {symbol}")]
    NotFound { source_name: String, symbol: String },
    #[display("{source_name} does not support batched requests")]
    Unsupported { source_name: String },
}

impl SourceError {
    /// Whether another attempt for the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Timeout { .. })
    }
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum ScoreError {
    #[display("{scorer} scorer cannot use {evidence} evidence")]
    UnsupportedEvidence {
        scorer: &'static str,
        evidence: &'static str,
    },
    #[display("indicator computation failed")]
    Indicator,
}

#[derive(Debug, Display, Error)]
pub enum WatchlistError {
    #[display("watchlist is empty")]
    Empty,
}

#[derive(Debug, Display, Error)]
pub enum NotifyError {
    #[display("notification request failed")]
    Request,
    #[display("notification rejected with status {status}")]
    Rejected { status: u16 },
}
