mod alert;
mod config;
mod error;
mod indicator;
mod model;
mod notifier;
mod scan;
mod source;
mod strategy;
mod watchlist;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Utc};
use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tracing::{Instrument, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use alert::{format_fatal, format_start};
use config::{AppConfig, CHAT_ID_ENV, Credentials, ScanMode, TOKEN_ENV};
use error::SourceError;
use model::WatchlistEntry;
use notifier::telegram::TelegramNotifier;
use notifier::terminal::TerminalNotifier;
use notifier::{Notifier, deliver};
use scan::{ScanSettings, Scanner, report_offset};
use source::SignalSource;
use source::tradingview::TradingViewSource;
use source::yahoo::{BarRequest, YahooScreener, YahooSource};
use strategy::{Scorer, build_scorer};
use watchlist::Screener;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
/// Gap between the start announcement and the first request.
const START_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("watchlist error")]
    Watchlist,
    #[display("signal source error")]
    Source,
    #[display("scorer error")]
    Scorer,
    #[display("notifier error")]
    Notifier,
}

#[derive(Parser)]
#[command(name = "market-scanner", about = "Technical-signal market scanner")]
struct Cli {
    /// Path to the TOML configuration file [default: config.toml, if present]
    #[arg(short, long)]
    config: Option<String>,

    /// Log messages instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Override `scan.threshold`
    #[arg(long)]
    threshold: Option<u8>,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(report) => {
            // Credentials live in the environment, so the error can still be
            // reported with default notifier settings.
            let fallback = AppConfig::default();
            let timeout = Duration::from_secs(fallback.http.timeout_secs);
            if let Ok(notifier) = build_notifier(&fallback, cli.dry_run, timeout) {
                let offset = report_offset(fallback.general.report_utc_offset_hours);
                notify_fatal(notifier.as_ref(), offset, &report).await;
            }
            return Err(report);
        }
    };

    init_tracing(&config);

    let span = tracing::info_span!(
        "scan",
        run_id = %Uuid::new_v4(),
        mode = %config.scan.mode
    );
    execute(config, cli.dry_run).instrument(span).await
}

fn load_config(cli: &Cli) -> Result<AppConfig, Report<AppError>> {
    let (path, required) = match &cli.config {
        Some(path) => (PathBuf::from(path), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    let mut config = config::load(&path, required).change_context(AppError::Config)?;
    if let Some(threshold) = cli.threshold {
        config.scan.threshold = threshold;
        config::validate(&config).change_context(AppError::Config)?;
    }
    Ok(config)
}

/// Best-effort "bot error" message for a run that cannot proceed.
async fn notify_fatal(
    notifier: &dyn Notifier,
    offset: FixedOffset,
    report: &Report<AppError>,
) -> bool {
    let text = format_fatal(
        Utc::now().with_timezone(&offset),
        &report.current_context().to_string(),
    );
    deliver(notifier, &text).await
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

async fn execute(config: AppConfig, dry_run: bool) -> Result<(), Report<AppError>> {
    let timeout = Duration::from_secs(config.http.timeout_secs);
    let offset = report_offset(config.general.report_utc_offset_hours);
    let notifier = build_notifier(&config, dry_run, timeout)?;

    if config.scan.announce_start {
        let text = format_start(Utc::now().with_timezone(&offset));
        deliver(notifier.as_ref(), &text).await;
        tokio::time::sleep(START_PAUSE).await;
    }

    let plan = match prepare(&config, timeout).await {
        Ok(plan) => plan,
        Err(report) => {
            notify_fatal(notifier.as_ref(), offset, &report).await;
            return Err(report);
        }
    };

    let scanner = Scanner::new(
        plan.source,
        plan.scorer,
        notifier,
        ScanSettings::from_config(&config),
    );
    scanner.run(&plan.entries).await;
    Ok(())
}

struct ScanPlan {
    entries: Vec<WatchlistEntry>,
    source: Box<dyn SignalSource>,
    scorer: Box<dyn Scorer>,
}

async fn prepare(config: &AppConfig, timeout: Duration) -> Result<ScanPlan, Report<AppError>> {
    let screener = if config.watchlist.dynamic {
        match YahooScreener::new(timeout) {
            Ok(screener) => Some(screener),
            Err(e) => {
                warn!(error = ?e, "screener unavailable, using the configured groups only");
                None
            }
        }
    } else {
        None
    };

    let entries = watchlist::build(
        &config.watchlist,
        screener.as_ref().map(|s| s as &dyn Screener),
    )
    .await
    .change_context(AppError::Watchlist)?;

    let source = build_source(config, timeout).change_context(AppError::Source)?;
    let scorer =
        build_scorer(config.scan.mode, &config.scoring).change_context(AppError::Scorer)?;

    Ok(ScanPlan {
        entries,
        source,
        scorer,
    })
}

fn build_source(
    config: &AppConfig,
    timeout: Duration,
) -> Result<Box<dyn SignalSource>, Report<SourceError>> {
    let interval = config.scan.interval();
    let source: Box<dyn SignalSource> = match config.scan.mode {
        ScanMode::Technical => {
            let request = BarRequest {
                interval,
                lookback: config.scan.lookback(),
                include_extended_hours: config.scan.include_extended_hours,
            };
            Box::new(YahooSource::new(request, timeout)?)
        }
        ScanMode::Votes => Box::new(TradingViewSource::new(interval, timeout)?),
    };
    Ok(source)
}

fn build_notifier(
    config: &AppConfig,
    dry_run: bool,
    timeout: Duration,
) -> Result<Box<dyn Notifier>, Report<AppError>> {
    if dry_run {
        info!("dry run, messages go to the log");
        return Ok(Box::new(TerminalNotifier));
    }

    match Credentials::from_env() {
        Some(credentials) => {
            let notifier =
                TelegramNotifier::new(credentials, config.notify.parse_mode.clone(), timeout)
                    .change_context(AppError::Notifier)?;
            Ok(Box::new(notifier))
        }
        None => {
            warn!(
                "{TOKEN_ENV} / {CHAT_ID_ENV} not set, messages go to the log"
            );
            Ok(Box::new(TerminalNotifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::future::BoxFuture;

    use super::*;
    use crate::error::NotifyError;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
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

    fn cli(config: Option<&str>, threshold: Option<u8>) -> Cli {
        Cli {
            config: config.map(str::to_owned),
            dry_run: true,
            threshold,
        }
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let err = load_config(&cli(Some("/nonexistent/market-scanner.toml"), None)).unwrap_err();
        assert!(matches!(err.current_context(), AppError::Config));
    }

    #[test]
    fn threshold_override_is_validated() {
        let path = std::env::temp_dir().join(format!("market-scanner-{}.toml", Uuid::new_v4()));
        std::fs::write(&path, "[scan]\nthreshold = 70\n").unwrap();
        let path_str = path.to_string_lossy().into_owned();

        let config = load_config(&cli(Some(&path_str), Some(85))).unwrap();
        assert_eq!(config.scan.threshold, 85);
        assert!(load_config(&cli(Some(&path_str), Some(101))).is_err());

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn config_failure_is_announced_with_default_notifier() {
        let err = load_config(&cli(Some("/nonexistent/market-scanner.toml"), None)).unwrap_err();
        let notifier = RecordingNotifier::default();
        assert!(notify_fatal(&notifier, report_offset(9), &err).await);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("bot error: configuration error"));
    }

    #[test]
    fn dry_run_notifier_is_log_only() {
        let notifier =
            build_notifier(&AppConfig::default(), true, Duration::from_secs(5)).unwrap();
        assert_eq!(notifier.name(), "terminal");
    }
}
