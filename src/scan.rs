use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use derive_more::Display;
use error_stack::Report;
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use tracing::{debug, info, warn};

use crate::alert::{Alert, format_batch, format_heartbeat, sort_alerts};
use crate::config::{AppConfig, RiskConfig};
use crate::error::SourceError;
use crate::indicator::snapshot::splice_live_price;
use crate::model::{Evidence, ScoreResult, WatchlistEntry};
use crate::notifier::{Notifier, deliver};
use crate::source::SignalSource;
use crate::strategy::{Scorer, is_alert_worthy};

/// Knobs for one scan run, resolved from `AppConfig` once at start-up.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub threshold: u8,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub request_delay: Duration,
    pub splice_live_price: bool,
    pub risk: RiskConfig,
    pub heartbeat: bool,
    pub max_chars: usize,
    pub utc_offset: FixedOffset,
}

impl ScanSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            threshold: config.scan.threshold,
            max_attempts: config.scan.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.scan.retry_delay_ms),
            request_delay: Duration::from_millis(config.scan.request_delay_ms),
            splice_live_price: config.scan.splice_live_price,
            risk: config.risk,
            heartbeat: config.scan.heartbeat,
            max_chars: config.notify.max_chars,
            utc_offset: report_offset(config.general.report_utc_offset_hours),
        }
    }
}

/// Fixed offset used for message timestamps; UTC if `hours` is out of range.
pub fn report_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FailureKind {
    #[display("fetch")]
    Fetch,
    #[display("score")]
    Score,
}

/// What happened to one watchlist entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    Scored(ScoreResult),
    /// Upstream had nothing for the symbol.
    Skipped { reason: String },
    Failed { kind: FailureKind },
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub scanned: usize,
    pub alerted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Sorted by score, then symbol.
    pub alerts: Vec<Alert>,
}

/// Runs watchlist → fetch → score → threshold → one batched notification.
pub struct Scanner {
    source: Box<dyn SignalSource>,
    scorer: Box<dyn Scorer>,
    notifier: Box<dyn Notifier>,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(
        source: Box<dyn SignalSource>,
        scorer: Box<dyn Scorer>,
        notifier: Box<dyn Notifier>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            source,
            scorer,
            notifier,
            settings,
        }
    }

    pub async fn run(&self, entries: &[WatchlistEntry]) -> ScanReport {
        info!(
            symbols = entries.len(),
            source = self.source.name(),
            scorer = self.scorer.name(),
            threshold = self.settings.threshold,
            "scan started"
        );

        let outcomes = if self.source.supports_batch() {
            self.collect_batched(entries).await
        } else {
            self.collect_sequential(entries).await
        };

        let mut report = ScanReport {
            scanned: entries.len(),
            ..ScanReport::default()
        };

        for (entry, outcome) in entries.iter().zip(outcomes) {
            match outcome {
                SymbolOutcome::Scored(result) => {
                    if is_alert_worthy(&result, self.settings.threshold) {
                        info!(
                            symbol = %entry.symbol,
                            score = result.score,
                            price = result.reference_price,
                            "alert"
                        );
                        report
                            .alerts
                            .push(Alert::new(entry.clone(), result, &self.settings.risk));
                    } else {
                        debug!(symbol = %entry.symbol, score = result.score, "below threshold");
                    }
                }
                SymbolOutcome::Skipped { reason } => {
                    debug!(symbol = %entry.symbol, reason = %reason, "skipped");
                    report.skipped += 1;
                }
                SymbolOutcome::Failed { kind } => {
                    debug!(symbol = %entry.symbol, kind = %kind, "failed");
                    report.failed += 1;
                }
            }
        }

        sort_alerts(&mut report.alerts);
        report.alerted = report.alerts.len();

        self.notify(&report).await;

        info!(
            scanned = report.scanned,
            alerted = report.alerted,
            skipped = report.skipped,
            failed = report.failed,
            "scan complete"
        );
        report
    }

    /// One call for the whole watchlist.
    async fn collect_batched(&self, entries: &[WatchlistEntry]) -> Vec<SymbolOutcome> {
        let source = self.source.as_ref();
        let fetched = self
            .with_retry("batch", move || source.fetch_many(entries))
            .await;

        let mut found = match fetched {
            Ok(found) => found,
            Err(e) => {
                warn!(error = ?e, "batched fetch failed, no symbol can be scored");
                return entries
                    .iter()
                    .map(|_| SymbolOutcome::Failed {
                        kind: FailureKind::Fetch,
                    })
                    .collect();
            }
        };

        entries
            .iter()
            .map(|entry| match found.remove(&entry.symbol) {
                Some(evidence) => self.evaluate(entry, evidence),
                None => SymbolOutcome::Skipped {
                    reason: format!("{} returned no data", self.source.name()),
                },
            })
            .collect()
    }

    /// One call per symbol, paced by `request_delay`.
    async fn collect_sequential(&self, entries: &[WatchlistEntry]) -> Vec<SymbolOutcome> {
        let pacer: Option<DefaultDirectRateLimiter> = Quota::with_period(self.settings.request_delay)
            .map(|quota| RateLimiter::direct(quota.allow_burst(nonzero!(1u32))));
        let source = self.source.as_ref();

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(pacer) = &pacer {
                pacer.until_ready().await;
            }

            let outcome = match self
                .with_retry(&entry.symbol, move || source.fetch_one(entry))
                .await
            {
                Ok(evidence) => self.evaluate(entry, evidence),
                Err(e) => fetch_failure(entry, e),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Retry transient failures up to `max_attempts` with a fixed pause.
    async fn with_retry<'a, T, F>(
        &self,
        label: &str,
        mut attempt: F,
    ) -> Result<T, Report<SourceError>>
    where
        F: FnMut() -> BoxFuture<'a, Result<T, Report<SourceError>>>,
    {
        let mut tries = 1;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e)
                    if e.current_context().is_transient()
                        && tries < self.settings.max_attempts =>
                {
                    warn!(
                        symbol = label,
                        attempt = tries,
                        max_attempts = self.settings.max_attempts,
                        error = %e.current_context(),
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                    tries += 1;
                }
                Err(e) => return Err(e.attach(format!("attempts: {tries}"))),
            }
        }
    }

    fn evaluate(&self, entry: &WatchlistEntry, mut evidence: Evidence) -> SymbolOutcome {
        if self.settings.splice_live_price {
            if let Evidence::Bars(series) = &mut evidence {
                if let Some(price) = series.live_price {
                    splice_live_price(series, price);
                }
            }
        }

        match self.scorer.score(&evidence) {
            Ok(result) => SymbolOutcome::Scored(result),
            Err(e) => {
                warn!(symbol = %entry.symbol, error = ?e, "scoring failed");
                SymbolOutcome::Failed {
                    kind: FailureKind::Score,
                }
            }
        }
    }

    async fn notify(&self, report: &ScanReport) {
        let now = Utc::now().with_timezone(&self.settings.utc_offset);
        if !report.alerts.is_empty() {
            let text = format_batch(
                &report.alerts,
                &self.settings.risk,
                now,
                self.settings.max_chars,
            );
            deliver(self.notifier.as_ref(), &text).await;
        } else if self.settings.heartbeat {
            deliver(
                self.notifier.as_ref(),
                &format_heartbeat(now, report.scanned),
            )
            .await;
        } else {
            info!("nothing cleared the threshold, no message sent");
        }
    }
}

fn fetch_failure(entry: &WatchlistEntry, report: Report<SourceError>) -> SymbolOutcome {
    match report.current_context() {
        SourceError::NotFound { source_name, .. } => SymbolOutcome::Skipped {
            reason: format!("{source_name} has no data"),
        },
        _ => {
            warn!(symbol = %entry.symbol, error = ?report, "fetch failed, skipping symbol");
            SymbolOutcome::Failed {
                kind: FailureKind::Fetch,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::NotifyError;
    use crate::config::ScoringConfig;
    use crate::indicator::test_support::{bar, bars_from_closes};
    use crate::model::{Bar, BarSeries, VoteSummary};
    use crate::strategy::rules::RuleScorer;
    use crate::strategy::votes::VoteScorer;

    type Scripted = Result<u32, SourceError>;

    /// Serves buy-vote counts out of 10 per symbol, in scripted order.
    struct FakeSource {
        batch: bool,
        script: Mutex<HashMap<String, VecDeque<Scripted>>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeSource {
        fn new(batch: bool, script: Vec<(&str, Vec<Scripted>)>) -> (Self, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let source = Self {
                batch,
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|(s, r)| (s.to_string(), r.into_iter().collect()))
                        .collect(),
                ),
                calls: Arc::clone(&calls),
            };
            (source, calls)
        }

        fn next(&self, symbol: &str) -> Result<Evidence, Report<SourceError>> {
            self.calls.lock().unwrap().push(symbol.to_owned());
            let next = self
                .script
                .lock()
                .unwrap()
                .get_mut(symbol)
                .and_then(VecDeque::pop_front);
            match next {
                Some(Ok(buy)) => Ok(votes(symbol, buy)),
                Some(Err(e)) => Err(Report::new(e)),
                None => Err(Report::new(not_found(symbol))),
            }
        }
    }

    fn not_found(symbol: &str) -> SourceError {
        SourceError::NotFound {
            source_name: "fake".into(),
            symbol: symbol.into(),
        }
    }

    fn request_failed() -> SourceError {
        SourceError::Request {
            source_name: "fake".into(),
        }
    }

    fn votes(symbol: &str, buy: u32) -> Evidence {
        Evidence::Votes(VoteSummary {
            symbol: symbol.into(),
            buy,
            sell: 10 - buy,
            neutral: 0,
            close: 20.0,
            rsi: Some(55.0),
        })
    }

    impl SignalSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn supports_batch(&self) -> bool {
            self.batch
        }

        fn fetch_one<'a>(
            &'a self,
            entry: &'a WatchlistEntry,
        ) -> BoxFuture<'a, Result<Evidence, Report<SourceError>>> {
            let result = self.next(&entry.symbol);
            Box::pin(async move { result })
        }

        fn fetch_many<'a>(
            &'a self,
            entries: &'a [WatchlistEntry],
        ) -> BoxFuture<'a, Result<HashMap<String, Evidence>, Report<SourceError>>> {
            let found = entries
                .iter()
                .filter_map(|e| self.next(&e.symbol).ok().map(|ev| (e.symbol.clone(), ev)))
                .collect();
            Box::pin(async move { Ok(found) })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl Notifier for RecordingNotifier {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), Report<NotifyError>>> {
            self.sent.lock().unwrap().push(text.to_owned());
            Box::pin(async { Ok(()) })
        }
    }

    fn settings() -> ScanSettings {
        ScanSettings {
            threshold: 70,
            max_attempts: 3,
            retry_delay: Duration::ZERO,
            request_delay: Duration::ZERO,
            splice_live_price: false,
            risk: RiskConfig::default(),
            heartbeat: false,
            max_chars: 4000,
            utc_offset: report_offset(9),
        }
    }

    fn entries(symbols: &[&str]) -> Vec<WatchlistEntry> {
        symbols
            .iter()
            .map(|s| WatchlistEntry {
                symbol: s.to_string(),
                venue: "NASDAQ".into(),
            })
            .collect()
    }

    fn scanner(source: FakeSource, settings: ScanSettings) -> (Scanner, Arc<Mutex<Vec<String>>>) {
        let notifier = RecordingNotifier::default();
        let sent = Arc::clone(&notifier.sent);
        let scanner = Scanner::new(
            Box::new(source),
            Box::new(VoteScorer),
            Box::new(notifier),
            settings,
        );
        (scanner, sent)
    }

    #[tokio::test]
    async fn two_of_five_above_threshold_send_one_batch() {
        let (source, _) = FakeSource::new(
            false,
            vec![
                ("AAA", vec![Ok(3)]),
                ("BBB", vec![Ok(8)]),
                ("CCC", vec![Ok(5)]),
                ("DDD", vec![Ok(9)]),
                ("EEE", vec![Ok(6)]),
            ],
        );
        let (scanner, sent) = scanner(source, settings());
        let report = scanner
            .run(&entries(&["AAA", "BBB", "CCC", "DDD", "EEE"]))
            .await;

        assert_eq!(report.scanned, 5);
        assert_eq!(report.alerted, 2);
        let order: Vec<&str> = report.alerts.iter().map(|a| a.entry.symbol.as_str()).collect();
        assert_eq!(order, vec!["DDD", "BBB"]);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].matches("📊 Score:").count(), 2);
        assert!(sent[0].find("*DDD*").unwrap() < sent[0].find("*BBB*").unwrap());
    }

    #[tokio::test]
    async fn failing_symbol_does_not_affect_the_others() {
        let (source, calls) = FakeSource::new(
            false,
            vec![
                ("AAA", vec![Ok(9)]),
                ("X", vec![Err(request_failed()), Err(request_failed()), Err(request_failed())]),
                ("CCC", vec![Ok(8)]),
            ],
        );
        let (scanner, sent) = scanner(source, settings());
        let report = scanner.run(&entries(&["AAA", "X", "CCC"])).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.alerted, 2);
        let x_calls = calls.lock().unwrap().iter().filter(|s| *s == "X").count();
        assert_eq!(x_calls, 3);
        assert!(!sent.lock().unwrap()[0].contains("*X*"));
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let (source, calls) = FakeSource::new(false, vec![("AAA", vec![Err(request_failed()), Ok(9)])]);
        let (scanner, _) = scanner(source, settings());
        let report = scanner.run(&entries(&["AAA"])).await;

        assert_eq!(report.alerted, 1);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn not_found_is_skipped_without_retry() {
        let (source, calls) = FakeSource::new(false, vec![("GONE", vec![Err(not_found("GONE"))])]);
        let (scanner, sent) = scanner(source, settings());
        let report = scanner.run(&entries(&["GONE"])).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_alerts_sends_nothing_by_default() {
        let (source, _) = FakeSource::new(false, vec![("AAA", vec![Ok(2)])]);
        let (scanner, sent) = scanner(source, settings());
        let report = scanner.run(&entries(&["AAA"])).await;

        assert_eq!(report.alerted, 0);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn heartbeat_is_sent_when_enabled() {
        let (source, _) = FakeSource::new(false, vec![("AAA", vec![Ok(2)])]);
        let (scanner, sent) = scanner(
            source,
            ScanSettings {
                heartbeat: true,
                ..settings()
            },
        );
        scanner.run(&entries(&["AAA"])).await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("💤"));
    }

    #[tokio::test]
    async fn batched_source_is_called_once_and_missing_symbols_skip() {
        let (source, calls) = FakeSource::new(
            true,
            vec![("AAA", vec![Ok(9)]), ("BBB", vec![Ok(1)])],
        );
        let (scanner, sent) = scanner(source, settings());
        let report = scanner.run(&entries(&["AAA", "BBB", "CCC"])).await;

        assert_eq!(report.alerted, 1);
        assert_eq!(report.skipped, 1);
        // one fetch_many touching each symbol once
        assert_eq!(calls.lock().unwrap().len(), 3);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        assert_eq!(report_offset(9).local_minus_utc(), 9 * 3600);
        assert_eq!(report_offset(99).local_minus_utc(), 0);
    }

    /// Serves fixed bar series per symbol.
    struct BarSource {
        series: HashMap<String, BarSeries>,
    }

    impl SignalSource for BarSource {
        fn name(&self) -> &'static str {
            "bars"
        }

        fn fetch_one<'a>(
            &'a self,
            entry: &'a WatchlistEntry,
        ) -> BoxFuture<'a, Result<Evidence, Report<SourceError>>> {
            let result = self
                .series
                .get(&entry.symbol)
                .cloned()
                .map(Evidence::Bars)
                .ok_or_else(|| Report::new(not_found(&entry.symbol)));
            Box::pin(async move { result })
        }
    }

    fn technical_scanner(
        series: Vec<BarSeries>,
        settings: ScanSettings,
    ) -> (Scanner, Arc<Mutex<Vec<String>>>) {
        let source = BarSource {
            series: series.into_iter().map(|s| (s.symbol.clone(), s)).collect(),
        };
        let notifier = RecordingNotifier::default();
        let sent = Arc::clone(&notifier.sent);
        let scanner = Scanner::new(
            Box::new(source),
            Box::new(RuleScorer::new(ScoringConfig::default()).unwrap()),
            Box::new(notifier),
            settings,
        );
        (scanner, sent)
    }

    /// 59 bars swinging 100/101, then a red bar 100 -> 99, quoted live at 106.
    fn reversal_series(symbol: &str) -> BarSeries {
        let mut bars: Vec<Bar> = (0..59)
            .map(|i| bar(100.0 + (i % 2) as f64, 100.0 + (i % 2) as f64, 1_000.0))
            .collect();
        bars.push(bar(100.0, 99.0, 1_000.0));
        BarSeries {
            symbol: symbol.into(),
            bars,
            live_price: Some(106.0),
        }
    }

    #[tokio::test]
    async fn technical_mode_scores_last_completed_bar_without_splice() {
        let (scanner, sent) = technical_scanner(vec![reversal_series("NVDA")], settings());
        let report = scanner.run(&entries(&["NVDA"])).await;

        // red last bar: no momentum, no gain bonus, at most RSI + MACD + disparity
        assert_eq!(report.alerted, 0);
        assert_eq!(report.failed, 0);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn technical_mode_splices_live_price_before_scoring() {
        let (scanner, sent) = technical_scanner(
            vec![reversal_series("NVDA")],
            ScanSettings {
                splice_live_price: true,
                ..settings()
            },
        );
        let report = scanner.run(&entries(&["NVDA"])).await;

        assert_eq!(report.alerted, 1);
        let alert = &report.alerts[0];
        assert_eq!(alert.result.reference_price, 106.0);
        assert!(alert.result.score >= 70);
        assert!(
            alert
                .result
                .reasons
                .iter()
                .any(|r| r == crate::strategy::rules::REASON_LARGE_GAIN)
        );

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Price: $106.00"));
    }

    #[tokio::test]
    async fn technical_mode_short_series_scores_zero_and_sends_nothing() {
        let short = BarSeries {
            symbol: "NEW".into(),
            bars: bars_from_closes(&[50.0; 20]),
            live_price: Some(55.0),
        };
        let (scanner, sent) = technical_scanner(
            vec![short],
            ScanSettings {
                threshold: 0,
                splice_live_price: true,
                ..settings()
            },
        );
        let report = scanner.run(&entries(&["NEW"])).await;

        assert_eq!(report.alerted, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.skipped, 0);
        assert!(sent.lock().unwrap().is_empty());
    }
}
