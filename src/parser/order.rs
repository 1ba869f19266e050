use chrono::DateTime;
use tracing::{debug, warn};

use super::records::MessageRecord;

/// How a batch is put into newest-first order. Chosen once per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingStrategy {
    /// At least one record carries a timestamp: sort on it, descending.
    ByTimestampDescending,
    /// No timestamps at all: the page is assumed oldest-first, so reverse it.
    ReverseInputOrder,
}

impl OrderingStrategy {
    pub fn for_batch(records: &[MessageRecord]) -> Self {
        if records.iter().any(has_timestamp) {
            OrderingStrategy::ByTimestampDescending
        } else {
            OrderingStrategy::ReverseInputOrder
        }
    }
}

/// Reorder newest-first and renumber `index` as 1..=N in the new order.
///
/// Timestamps compare as strings, so records without one sort last and ties
/// keep their input order. String order only matches time order when every
/// timestamp shares an offset and precision; a warning is logged otherwise.
pub fn newest_first(mut records: Vec<MessageRecord>) -> Vec<MessageRecord> {
    match OrderingStrategy::for_batch(&records) {
        OrderingStrategy::ByTimestampDescending => {
            if !string_order_is_chronological(&records) {
                warn!("Mixed or unparseable timestamp offsets; string order may not be chronological");
            }
            // sort_by is stable; comparing b to a gives descending order
            records.sort_by(|a, b| sort_key(b).cmp(sort_key(a)));
            debug!("Ordered {} records by timestamp, newest first", records.len());
        }
        OrderingStrategy::ReverseInputOrder => {
            records.reverse();
            debug!("No timestamps; reversed {} records", records.len());
        }
    }

    for (i, r) in records.iter_mut().enumerate() {
        r.index = i + 1;
    }
    records
}

fn has_timestamp(r: &MessageRecord) -> bool {
    r.timestamp.as_deref().is_some_and(|t| !t.is_empty())
}

fn sort_key(r: &MessageRecord) -> &str {
    r.timestamp.as_deref().unwrap_or("")
}

/// True when every non-empty timestamp parses as RFC 3339 and all share one
/// UTC offset.
fn string_order_is_chronological(records: &[MessageRecord]) -> bool {
    let mut offsets = Vec::new();
    for ts in records.iter().filter_map(|r| r.timestamp.as_deref()).filter(|t| !t.is_empty()) {
        match DateTime::parse_from_rfc3339(ts) {
            Ok(dt) => offsets.push(dt.offset().local_minus_utc()),
            Err(_) => {
                debug!(timestamp = ts, "Unparseable timestamp");
                return false;
            }
        }
    }
    offsets.sort_unstable();
    offsets.dedup();
    offsets.len() <= 1
}

// ── Tests ──
