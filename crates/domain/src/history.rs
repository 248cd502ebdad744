//! Per-decision view over an identifier's recorded attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AttemptRecord;

/// Gap reported when an identifier has no recorded attempts.
///
/// Always below any positive quiet time, and below any real elapsed time.
pub const NO_HISTORY_GAP_MILLIS: i64 = -1;

/// Length of the trailing max-per-day window.
pub const DAY_WINDOW_MILLIS: i64 = 86_400_000;

/// Snapshot of an identifier's history computed at decision time.
///
/// Never persisted. `items` are ordered newest-first, so the first item always
/// carries the greatest timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    count: usize,
    most_recent_gap_millis: i64,
    items: Vec<AttemptRecord>,
}

impl HistorySnapshot {
    /// Builds a snapshot from records and the instant the decision is made at.
    ///
    /// Records are re-sorted newest-first in case the store returned them in
    /// another order. A newest record stamped after `now` yields a gap of zero.
    #[must_use]
    pub fn from_records(mut items: Vec<AttemptRecord>, now: DateTime<Utc>) -> Self {
        items.sort_by_key(|item| std::cmp::Reverse(item.timestamp()));

        let most_recent_gap_millis = items
            .first()
            .map_or(NO_HISTORY_GAP_MILLIS, |newest| newest.age_millis(now).max(0));

        Self {
            count: items.len(),
            most_recent_gap_millis,
            items,
        }
    }

    /// Snapshot for an identifier without any history.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            count: 0,
            most_recent_gap_millis: NO_HISTORY_GAP_MILLIS,
            items: Vec::new(),
        }
    }

    /// Number of records found.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Milliseconds since the newest record, or [`NO_HISTORY_GAP_MILLIS`].
    #[must_use]
    pub fn most_recent_gap_millis(&self) -> i64 {
        self.most_recent_gap_millis
    }

    /// Records, newest-first.
    #[must_use]
    pub fn items(&self) -> &[AttemptRecord] {
        &self.items
    }

    /// Returns whether no attempt was ever recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Counts records no older than `window_millis` relative to `now`.
    #[must_use]
    pub fn count_within(&self, now: DateTime<Utc>, window_millis: i64) -> usize {
        self.items
            .iter()
            .filter(|item| item.age_millis(now) <= window_millis)
            .count()
    }
}

impl Default for HistorySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
