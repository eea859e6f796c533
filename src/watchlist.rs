use std::collections::{BTreeMap, HashSet};

use error_stack::Report;
use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::config::{VenueConfig, WatchlistConfig};
use crate::error::{SourceError, WatchlistError};
use crate::model::WatchlistEntry;

/// Upstream lists of "interesting" symbols for the current session.
pub trait Screener: Send + Sync {
    fn top_gainers(&self, count: usize) -> BoxFuture<'_, Result<Vec<String>, Report<SourceError>>>;
    fn most_active(&self, count: usize) -> BoxFuture<'_, Result<Vec<String>, Report<SourceError>>>;
}

/// Symbol → listing venue lookup with a default for unknown symbols.
#[derive(Debug, Clone)]
pub struct VenueTable {
    default: String,
    overrides: BTreeMap<String, String>,
}

impl VenueTable {
    pub fn from_config(config: &VenueConfig) -> Self {
        Self {
            default: config.default.trim().to_uppercase(),
            overrides: config
                .overrides
                .iter()
                .map(|(symbol, venue)| (symbol.trim().to_uppercase(), venue.trim().to_uppercase()))
                .collect(),
        }
    }

    pub fn venue_for(&self, symbol: &str) -> &str {
        self.overrides
            .get(symbol)
            .map_or(self.default.as_str(), String::as_str)
    }
}

/// Assemble the ordered, de-duplicated watchlist for one run.
///
/// Configured groups come first (in config order), then top gainers, then
/// most-active names. A failing screener only loses its own contribution.
pub async fn build(
    config: &WatchlistConfig,
    screener: Option<&dyn Screener>,
) -> Result<Vec<WatchlistEntry>, Report<WatchlistError>> {
    let venues = VenueTable::from_config(&config.venues);
    let mut builder = Builder::new(&venues);

    for group in &config.groups {
        builder.extend(group.symbols.iter().map(String::as_str));
    }
    let fixed = builder.len();

    if config.dynamic {
        if let Some(screener) = screener {
            match screener.top_gainers(config.gainers).await {
                Ok(symbols) => builder.extend(symbols.iter().map(String::as_str)),
                Err(e) => warn!(error = ?e, "top gainers unavailable, continuing without"),
            }
            match screener.most_active(config.most_active).await {
                Ok(symbols) => builder.extend(symbols.iter().map(String::as_str)),
                Err(e) => warn!(error = ?e, "most active unavailable, continuing without"),
            }
        } else {
            warn!("dynamic watchlist enabled but no screener configured");
        }
    }

    let entries = builder.finish();
    if entries.is_empty() {
        return Err(Report::new(WatchlistError::Empty));
    }

    info!(
        total = entries.len(),
        fixed,
        dynamic = entries.len() - fixed,
        "watchlist built"
    );
    Ok(entries)
}

struct Builder<'v> {
    venues: &'v VenueTable,
    seen: HashSet<String>,
    entries: Vec<WatchlistEntry>,
}

impl<'v> Builder<'v> {
    fn new(venues: &'v VenueTable) -> Self {
        Self {
            venues,
            seen: HashSet::new(),
            entries: Vec::new(),
        }
    }

    fn extend<'s>(&mut self, symbols: impl IntoIterator<Item = &'s str>) {
        for raw in symbols {
            let symbol = raw.trim().to_uppercase();
            if symbol.is_empty() || !self.seen.insert(symbol.clone()) {
                continue;
            }
            let venue = self.venues.venue_for(&symbol).to_owned();
            self.entries.push(WatchlistEntry { symbol, venue });
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn finish(self) -> Vec<WatchlistEntry> {
        self.entries
    }
}
