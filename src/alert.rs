use std::cmp::Ordering;
use std::fmt::Write;

use chrono::{DateTime, FixedOffset};

use crate::config::RiskConfig;
use crate::model::{ScoreResult, WatchlistEntry};

pub const TRUNCATION_MARKER: &str = "\n…(truncated)";
const RULE: &str = "––––––––––––––––";

/// Stop-loss / target levels derived from a reference price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskLevels {
    pub stop_loss: f64,
    pub target_price: f64,
}

impl RiskLevels {
    pub fn derive(price: f64, risk: &RiskConfig) -> Self {
        Self {
            stop_loss: price * (1.0 - risk.stop_pct),
            target_price: price * (1.0 + risk.target_pct),
        }
    }
}

/// An alert-worthy symbol, ready to format.
#[derive(Debug, Clone)]
pub struct Alert {
    pub entry: WatchlistEntry,
    pub result: ScoreResult,
    pub risk: RiskLevels,
}

impl Alert {
    pub fn new(entry: WatchlistEntry, result: ScoreResult, risk: &RiskConfig) -> Self {
        let levels = RiskLevels::derive(result.reference_price, risk);
        Self {
            entry,
            result,
            risk: levels,
        }
    }

    /// Render one entry of the batch message.
    pub fn format(&self, risk: &RiskConfig) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "🛰️ *{}* ({})", self.entry.symbol, self.entry.venue);
        let _ = writeln!(out, "📊 Score: {}", self.result.score);
        let _ = writeln!(out, "💰 Price: ${:.2}", self.result.reference_price);
        if let Some(rsi) = self.result.rsi {
            let _ = writeln!(out, "📈 RSI: {rsi:.1}");
        }
        let _ = writeln!(
            out,
            "🛑 Stop: ${:.2} (-{:.1}%)",
            self.risk.stop_loss,
            risk.stop_pct * 100.0
        );
        let _ = write!(
            out,
            "🎯 Target: ${:.2} (+{:.1}%)",
            self.risk.target_price,
            risk.target_pct * 100.0
        );
        if !self.result.reasons.is_empty() {
            let _ = write!(out, "\n📝 {}", self.result.reasons.join(", "));
        }
        out
    }
}

/// Highest score first, then symbol, so the batch does not depend on the
/// order symbols finished in.
pub fn sort_alerts(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| match b.result.score.cmp(&a.result.score) {
        Ordering::Equal => a.entry.symbol.cmp(&b.entry.symbol),
        other => other,
    });
}

/// Assemble the single batched message for a scan. `alerts` must be sorted.
///
/// An oversized batch keeps the header and as many whole entries as fit in
/// `max_chars` together with the marker, so Markdown markers stay paired.
pub fn format_batch(
    alerts: &[Alert],
    risk: &RiskConfig,
    generated_at: DateTime<FixedOffset>,
    max_chars: usize,
) -> String {
    let header = format!(
        "📡 *Market scan* – {} – {} alert(s)",
        generated_at.format("%Y-%m-%d %H:%M"),
        alerts.len()
    );
    let entries: Vec<String> = alerts
        .iter()
        .map(|alert| format!("\n{RULE}\n{}", alert.format(risk)))
        .collect();

    let full_len =
        header.chars().count() + entries.iter().map(|e| e.chars().count()).sum::<usize>();
    if full_len <= max_chars {
        return entries.iter().fold(header, |mut out, entry| {
            out.push_str(entry);
            out
        });
    }

    let budget = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut used = header.chars().count();
    if used > budget {
        return truncate_message(&header, max_chars);
    }

    let mut out = header;
    for entry in &entries {
        let len = entry.chars().count();
        if used + len > budget {
            break;
        }
        out.push_str(entry);
        used += len;
    }
    out.push_str(TRUNCATION_MARKER);
    out
}

pub fn format_heartbeat(generated_at: DateTime<FixedOffset>, scanned: usize) -> String {
    format!(
        "💤 *Market scan* – {} – still alive, nothing cleared the threshold ({} symbols scanned)",
        generated_at.format("%Y-%m-%d %H:%M"),
        scanned
    )
}

pub fn format_start(generated_at: DateTime<FixedOffset>) -> String {
    format!(
        "🚀 *Market scan* – {} – run started",
        generated_at.format("%Y-%m-%d %H:%M")
    )
}

pub fn format_fatal(generated_at: DateTime<FixedOffset>, error: &str) -> String {
    format!(
        "⚠️ *Market scan* – {} – bot error: {}",
        generated_at.format("%Y-%m-%d %H:%M"),
        error
    )
}

/// Cut `text` to at most `max_chars` characters and mark the cut.
///
/// Counts `char`s, never splitting a multi-byte sequence.
pub fn truncate_message(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_owned(),
        Some((byte_index, _)) => {
            let mut out = String::with_capacity(byte_index + TRUNCATION_MARKER.len());
            out.push_str(&text[..byte_index]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
    }
}
