pub mod tradingview;
pub mod yahoo;

use std::collections::HashMap;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;

use crate::error::SourceError;
use crate::model::{Evidence, WatchlistEntry};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 market-scanner";

/// Supplier of per-symbol evidence (bar series or aggregated votes).
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn SignalSource`).
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `fetch_many` resolves a whole watchlist in one request.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Fetch evidence for a single entry.
    fn fetch_one<'a>(
        &'a self,
        entry: &'a WatchlistEntry,
    ) -> BoxFuture<'a, Result<Evidence, Report<SourceError>>>;

    /// Fetch evidence for many entries in one call, keyed by symbol.
    ///
    /// Symbols the upstream could not resolve are absent from the map.
    fn fetch_many<'a>(
        &'a self,
        entries: &'a [WatchlistEntry],
    ) -> BoxFuture<'a, Result<HashMap<String, Evidence>, Report<SourceError>>> {
        let _ = entries;
        let source_name = self.name().to_owned();
        Box::pin(async move { Err(Report::new(SourceError::Unsupported { source_name })) })
    }
}

/// Build a reqwest client whose every request is bounded by `timeout`.
pub fn http_client(
    source_name: &str,
    timeout: Duration,
) -> Result<reqwest::Client, Report<SourceError>> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .change_context(SourceError::Client {
            source_name: source_name.into(),
        })
}

/// Classify a transport error so the scan loop can decide whether to retry.
pub(crate) fn request_error(source_name: &str, err: reqwest::Error) -> Report<SourceError> {
    let context = if err.is_timeout() {
        SourceError::Timeout {
            source_name: source_name.into(),
        }
    } else {
        SourceError::Request {
            source_name: source_name.into(),
        }
    };
    Report::new(err).change_context(context)
}
