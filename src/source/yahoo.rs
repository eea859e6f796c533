use std::time::Duration;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::SourceError;
use crate::model::{Bar, BarSeries, Evidence, Interval, Lookback, WatchlistEntry};
use crate::source::{SignalSource, http_client, request_error};
use crate::watchlist::Screener;

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const YAHOO_SCREENER_URL: &str =
    "https://query1.finance.yahoo.com/v1/finance/screener/predefined/saved";
const SOURCE_NAME: &str = "yahoo";

/// Bar-series parameters shared by every request in a scan.
#[derive(Debug, Clone, Copy)]
pub struct BarRequest {
    pub interval: Interval,
    pub lookback: Lookback,
    pub include_extended_hours: bool,
}

/// Yahoo Finance chart client (bar-series mode, one request per symbol).
pub struct YahooSource {
    client: reqwest::Client,
    request: BarRequest,
}

impl YahooSource {
    pub fn new(request: BarRequest, timeout: Duration) -> Result<Self, Report<SourceError>> {
        Ok(Self {
            client: http_client(SOURCE_NAME, timeout)?,
            request,
        })
    }

    async fn fetch_series(&self, symbol: &str) -> Result<BarSeries, Report<SourceError>> {
        let yahoo_symbol = normalize_symbol(symbol);
        let url = format!("{YAHOO_CHART_URL}/{yahoo_symbol}");
        let params = [
            ("range", self.request.lookback.as_str()),
            ("interval", self.request.interval.yahoo_interval()),
            (
                "includePrePost",
                if self.request.include_extended_hours {
                    "true"
                } else {
                    "false"
                },
            ),
        ];

        debug!(symbol, url = %url, "fetching yahoo chart");

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| request_error(SOURCE_NAME, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Report::new(not_found(symbol)));
        }
        if !status.is_success() {
            return Err(Report::new(SourceError::Request {
                source_name: SOURCE_NAME.into(),
            })
            .attach(format!("HTTP status: {status}")));
        }

        let body: ChartResponse =
            response
                .json()
                .await
                .change_context(SourceError::ResponseParse {
                    source_name: SOURCE_NAME.into(),
                })?;

        let series = body.into_series(symbol)?;
        if let Some(last) = series.last() {
            debug!(
                symbol,
                bars = series.bars.len(),
                last_bar = %last.open_time,
                "yahoo chart received"
            );
        }
        Ok(series)
    }
}

impl SignalSource for YahooSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn fetch_one<'a>(
        &'a self,
        entry: &'a WatchlistEntry,
    ) -> BoxFuture<'a, Result<Evidence, Report<SourceError>>> {
        Box::pin(async move {
            let series = self.fetch_series(&entry.symbol).await?;
            Ok(Evidence::Bars(series))
        })
    }
}

/// Yahoo uses hyphens instead of dots for share classes (BRK-B, not BRK.B).
fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase().replace('.', "-")
}

fn not_found(symbol: &str) -> SourceError {
    SourceError::NotFound {
        source_name: SOURCE_NAME.into(),
        symbol: symbol.into(),
    }
}

// ── Chart response types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    /// Unix seconds of `regular_market_price`.
    regular_market_time: Option<i64>,
}

impl ChartMeta {
    /// The regular-session price, unless the series already holds newer
    /// (extended-hours) bars.
    fn live_price(&self, last_bar: &Bar) -> Option<f64> {
        let quoted_at = DateTime::from_timestamp(self.regular_market_time?, 0)?;
        if quoted_at < last_bar.open_time {
            debug!(
                quoted_at = %quoted_at,
                last_bar = %last_bar.open_time,
                "regular market price older than last bar, not splicing"
            );
            return None;
        }
        self.regular_market_price
    }
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl ChartResponse {
    fn into_series(self, symbol: &str) -> Result<BarSeries, Report<SourceError>> {
        if let Some(error) = self.chart.error {
            return Err(Report::new(not_found(symbol))
                .attach(format!("{}: {}", error.code, error.description)));
        }

        let result = self
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| Report::new(not_found(symbol)))?;

        let timestamps = result.timestamp.unwrap_or_default();
        let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

        // Rows with any missing price are gaps (halts, empty extended-hours
        // slots) and are dropped.
        let bars: Vec<Bar> = timestamps
            .iter()
            .enumerate()
            .filter_map(|(i, &ts)| {
                let open = quote.open.get(i).copied().flatten()?;
                let high = quote.high.get(i).copied().flatten()?;
                let low = quote.low.get(i).copied().flatten()?;
                let close = quote.close.get(i).copied().flatten()?;
                if close <= 0.0 {
                    return None;
                }
                let volume = quote.volume.get(i).copied().flatten().unwrap_or(0.0);
                Some(Bar {
                    open_time: DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now),
                    open,
                    high,
                    low,
                    close,
                    volume,
                })
            })
            .collect();

        let Some(last) = bars.last() else {
            return Err(Report::new(not_found(symbol)).attach("chart contained no complete bars"));
        };
        let live_price = result.meta.live_price(last);

        Ok(BarSeries {
            symbol: symbol.to_owned(),
            bars,
            live_price,
        })
    }
}

// ── Screener ──────────────────────────────────────────────────────────────────

/// Yahoo predefined screeners ("day_gainers", "most_actives").
pub struct YahooScreener {
    client: reqwest::Client,
}

impl YahooScreener {
    pub fn new(timeout: Duration) -> Result<Self, Report<SourceError>> {
        Ok(Self {
            client: http_client(SOURCE_NAME, timeout)?,
        })
    }

    async fn predefined(
        &self,
        screener_id: &str,
        count: usize,
    ) -> Result<Vec<String>, Report<SourceError>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let count_str = count.to_string();
        let response = self
            .client
            .get(YAHOO_SCREENER_URL)
            .query(&[("scrIds", screener_id), ("count", count_str.as_str())])
            .send()
            .await
            .map_err(|e| request_error(SOURCE_NAME, e))?;

        if !response.status().is_success() {
            return Err(Report::new(SourceError::Request {
                source_name: SOURCE_NAME.into(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        let body: ScreenerResponse =
            response
                .json()
                .await
                .change_context(SourceError::ResponseParse {
                    source_name: SOURCE_NAME.into(),
                })?;

        Ok(body.symbols(count))
    }
}

impl Screener for YahooScreener {
    fn top_gainers(&self, count: usize) -> BoxFuture<'_, Result<Vec<String>, Report<SourceError>>> {
        Box::pin(self.predefined("day_gainers", count))
    }

    fn most_active(&self, count: usize) -> BoxFuture<'_, Result<Vec<String>, Report<SourceError>>> {
        Box::pin(self.predefined("most_actives", count))
    }
}

#[derive(Debug, Deserialize)]
struct ScreenerResponse {
    finance: ScreenerFinance,
}

#[derive(Debug, Deserialize)]
struct ScreenerFinance {
    #[serde(default)]
    result: Vec<ScreenerResult>,
}

#[derive(Debug, Deserialize)]
struct ScreenerResult {
    #[serde(default)]
    quotes: Vec<ScreenerQuote>,
}

#[derive(Debug, Deserialize)]
struct ScreenerQuote {
    symbol: String,
}

impl ScreenerResponse {
    fn symbols(self, count: usize) -> Vec<String> {
        self.finance
            .result
            .into_iter()
            .flat_map(|r| r.quotes)
            .map(|q| q.symbol)
            .take(count)
            .collect()
    }
}
