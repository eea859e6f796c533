use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::indicator::snapshot::DEFAULT_MIN_BARS;
use crate::model::{Interval, Lookback};

pub const TOKEN_ENV: &str = "TELEGRAM_TOKEN";
pub const CHAT_ID_ENV: &str = "CHAT_ID";

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_utc_offset_hours() -> i32 {
    9
}

fn default_threshold() -> u8 {
    70
}

fn default_interval() -> String {
    "5m".into()
}

fn default_lookback() -> String {
    "5d".into()
}

fn default_request_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_price_floor() -> f64 {
    5.0
}

fn default_rsi_low() -> f64 {
    35.0
}

fn default_rsi_high() -> f64 {
    75.0
}

fn default_large_gain_pct() -> f64 {
    0.05
}

fn default_volume_surge_multiplier() -> f64 {
    1.5
}

fn default_disparity_low() -> f64 {
    98.0
}

fn default_disparity_high() -> f64 {
    110.0
}

fn default_min_bars() -> usize {
    DEFAULT_MIN_BARS
}

fn default_stop_pct() -> f64 {
    0.035
}

fn default_target_pct() -> f64 {
    0.05
}

fn default_gainers() -> usize {
    10
}

fn default_most_active() -> usize {
    5
}

fn default_venue() -> String {
    "NASDAQ".into()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_chars() -> usize {
    4000
}

fn default_parse_mode() -> Option<String> {
    Some("Markdown".into())
}

fn default_groups() -> Vec<WatchlistGroup> {
    let group = |name: &str, symbols: &[&str]| WatchlistGroup {
        name: name.into(),
        symbols: symbols.iter().map(|s| (*s).into()).collect(),
    };
    vec![
        group("leveraged-etf", &["SOXL", "SOXS", "TQQQ", "SQQQ"]),
        group("ai-semis", &["NVDA"]),
        group("momentum", &["TSLA", "MSTR", "COIN"]),
    ]
}

fn default_venue_overrides() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("SOXL".into(), "AMEX".into()),
        ("SOXS".into(), "AMEX".into()),
    ])
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub scan: ScanConfig,
    pub scoring: ScoringConfig,
    pub risk: RiskConfig,
    pub watchlist: WatchlistConfig,
    pub http: HttpConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Offset applied to timestamps shown in notification headers.
    #[serde(default = "default_utc_offset_hours")]
    pub report_utc_offset_hours: i32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            report_utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Bar series + rule-weighted technical score.
    #[default]
    Technical,
    /// Upstream buy/sell/neutral votes + vote-ratio score.
    Votes,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Technical => write!(f, "technical"),
            Self::Votes => write!(f, "votes"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub mode: ScanMode,
    /// Minimum score (inclusive) for a symbol to be alert-worthy.
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_lookback")]
    pub lookback: String,
    #[serde(default = "default_true")]
    pub include_extended_hours: bool,
    #[serde(default)]
    pub splice_live_price: bool,
    /// Pause between per-symbol requests in per-symbol fetch mode.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Send a "nothing found" message when no symbol clears the threshold.
    #[serde(default)]
    pub heartbeat: bool,
    #[serde(default)]
    pub announce_start: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::default(),
            threshold: default_threshold(),
            interval: default_interval(),
            lookback: default_lookback(),
            include_extended_hours: true,
            splice_live_price: false,
            request_delay_ms: default_request_delay_ms(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            heartbeat: false,
            announce_start: false,
        }
    }
}

impl ScanConfig {
    /// Parsed interval. Only valid after `validate`.
    pub fn interval(&self) -> Interval {
        Interval::from_str(&self.interval).unwrap_or(Interval::Min5)
    }

    /// Parsed lookback. Only valid after `validate`.
    pub fn lookback(&self) -> Lookback {
        Lookback::from_str(&self.lookback).unwrap_or(Lookback::Day5)
    }
}

/// Rule-weighted score parameters. The thresholds are named rather than
/// fixed because observed deployments disagree on them (e.g. a $3 vs $5
/// price floor, 35 vs 40 lower RSI bound).
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_price_floor")]
    pub price_floor: f64,
    #[serde(default = "default_rsi_low")]
    pub rsi_low: f64,
    #[serde(default = "default_rsi_high")]
    pub rsi_high: f64,
    #[serde(default = "default_large_gain_pct")]
    pub large_gain_pct: f64,
    #[serde(default = "default_volume_surge_multiplier")]
    pub volume_surge_multiplier: f64,
    #[serde(default = "default_disparity_low")]
    pub disparity_low: f64,
    #[serde(default = "default_disparity_high")]
    pub disparity_high: f64,
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            price_floor: default_price_floor(),
            rsi_low: default_rsi_low(),
            rsi_high: default_rsi_high(),
            large_gain_pct: default_large_gain_pct(),
            volume_surge_multiplier: default_volume_surge_multiplier(),
            disparity_low: default_disparity_low(),
            disparity_high: default_disparity_high(),
            min_bars: default_min_bars(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_stop_pct")]
    pub stop_pct: f64,
    #[serde(default = "default_target_pct")]
    pub target_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_pct: default_stop_pct(),
            target_pct: default_target_pct(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WatchlistConfig {
    /// Union the fixed list with screener top gainers / most active.
    #[serde(default = "default_true")]
    pub dynamic: bool,
    #[serde(default = "default_gainers")]
    pub gainers: usize,
    #[serde(default = "default_most_active")]
    pub most_active: usize,
    #[serde(default = "default_groups")]
    pub groups: Vec<WatchlistGroup>,
    #[serde(default)]
    pub venues: VenueConfig,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            dynamic: true,
            gainers: default_gainers(),
            most_active: default_most_active(),
            groups: default_groups(),
            venues: VenueConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchlistGroup {
    pub name: String,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    #[serde(default = "default_venue")]
    pub default: String,
    #[serde(default = "default_venue_overrides")]
    pub overrides: BTreeMap<String, String>,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            default: default_venue(),
            overrides: default_venue_overrides(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    /// Upper bound for every outbound request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Telegram `parse_mode`; omit for plain text.
    #[serde(default = "default_parse_mode")]
    pub parse_mode: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            parse_mode: default_parse_mode(),
        }
    }
}

/// Notifier secrets, sourced only from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub token: String,
    pub chat_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl Credentials {
    /// Read both secrets from the environment. `None` when either is absent
    /// or blank.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let token = lookup(TOKEN_ENV).filter(|v| !v.trim().is_empty())?;
        let chat_id = lookup(CHAT_ID_ENV).filter(|v| !v.trim().is_empty())?;
        Some(Self { token, chat_id })
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
///
/// When `required` is false and the file does not exist, built-in defaults
/// are used instead.
pub fn load(path: &Path, required: bool) -> Result<AppConfig, Report<ConfigError>> {
    if !required && !path.exists() {
        let config = AppConfig::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

pub fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_scan(&config.scan)?;
    validate_scoring(&config.scoring)?;
    validate_risk(&config.risk)?;
    validate_watchlist(&config.watchlist)?;
    validate_output(config)?;
    Ok(())
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate_scan(scan: &ScanConfig) -> Result<(), Report<ConfigError>> {
    if scan.threshold > 100 {
        return Err(invalid(format!(
            "scan.threshold {} exceeds the maximum score of 100",
            scan.threshold
        )));
    }
    if Interval::from_str(&scan.interval).is_none() {
        return Err(invalid(format!(
            "scan.interval: unknown interval \"{}\"",
            scan.interval
        )));
    }
    if Lookback::from_str(&scan.lookback).is_none() {
        return Err(invalid(format!(
            "scan.lookback: unknown lookback \"{}\"",
            scan.lookback
        )));
    }
    if scan.max_attempts == 0 {
        return Err(invalid("scan.max_attempts must be >= 1".into()));
    }
    Ok(())
}

fn validate_scoring(scoring: &ScoringConfig) -> Result<(), Report<ConfigError>> {
    if scoring.price_floor < 0.0 {
        return Err(invalid("scoring.price_floor must be >= 0".into()));
    }
    if scoring.rsi_low > scoring.rsi_high {
        return Err(invalid(format!(
            "scoring.rsi_low ({}) must not exceed scoring.rsi_high ({})",
            scoring.rsi_low, scoring.rsi_high
        )));
    }
    if scoring.disparity_low > scoring.disparity_high {
        return Err(invalid(format!(
            "scoring.disparity_low ({}) must not exceed scoring.disparity_high ({})",
            scoring.disparity_low, scoring.disparity_high
        )));
    }
    if scoring.min_bars < crate::indicator::snapshot::AVERAGE_WINDOW {
        return Err(invalid(format!(
            "scoring.min_bars must be >= {}",
            crate::indicator::snapshot::AVERAGE_WINDOW
        )));
    }
    Ok(())
}

fn validate_risk(risk: &RiskConfig) -> Result<(), Report<ConfigError>> {
    if !(0.0..1.0).contains(&risk.stop_pct) {
        return Err(invalid(format!(
            "risk.stop_pct {} must be in [0, 1)",
            risk.stop_pct
        )));
    }
    if risk.target_pct < 0.0 {
        return Err(invalid("risk.target_pct must be >= 0".into()));
    }
    Ok(())
}

fn validate_watchlist(watchlist: &WatchlistConfig) -> Result<(), Report<ConfigError>> {
    if watchlist.venues.default.trim().is_empty() {
        return Err(invalid("watchlist.venues.default must not be empty".into()));
    }
    for (symbol, venue) in &watchlist.venues.overrides {
        if venue.trim().is_empty() {
            return Err(invalid(format!(
                "watchlist.venues.overrides[\"{symbol}\"] must not be empty"
            )));
        }
    }
    let mut seen = std::collections::HashSet::new();
    for group in &watchlist.groups {
        if !seen.insert(group.name.as_str()) {
            return Err(invalid(format!(
                "watchlist.groups: duplicate name \"{}\"",
                group.name
            )));
        }
    }
    Ok(())
}

fn validate_output(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !(-14..=14).contains(&config.general.report_utc_offset_hours) {
        return Err(invalid(
            "general.report_utc_offset_hours must be within -14..=14".into(),
        ));
    }
    if config.http.timeout_secs == 0 {
        return Err(invalid("http.timeout_secs must be >= 1".into()));
    }
    if config.notify.max_chars < 100 {
        return Err(invalid("notify.max_chars must be >= 100".into()));
    }
    Ok(())
}
