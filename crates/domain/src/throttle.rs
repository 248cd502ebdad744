//! Throttle configuration, denial reasons and decision outcomes.

use chrono::{DateTime, Utc};
use quietgate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize, Serializer};

use crate::{DAY_WINDOW_MILLIS, HistorySnapshot};

/// Collection used when none is configured.
pub const DEFAULT_COLLECTION: &str = "captcha";

/// Limits applied by a throttle engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    collection: String,
    max_per_day: Option<u32>,
    quiet_time_millis: Option<u64>,
}

impl ThrottleConfig {
    /// Creates a validated configuration.
    ///
    /// Zero limits are treated as disabled rules.
    pub fn new(
        collection: impl Into<String>,
        max_per_day: Option<u32>,
        quiet_time_millis: Option<u64>,
    ) -> AppResult<Self> {
        let collection = collection.into();
        validate_collection_name(&collection)?;

        Ok(Self {
            collection,
            max_per_day: max_per_day.filter(|value| *value > 0),
            quiet_time_millis: quiet_time_millis.filter(|value| *value > 0),
        })
    }

    /// Returns a copy with a different max-per-day limit.
    #[must_use]
    pub fn with_max_per_day(mut self, max_per_day: Option<u32>) -> Self {
        self.max_per_day = max_per_day.filter(|value| *value > 0);
        self
    }

    /// Returns a copy with a different quiet time.
    #[must_use]
    pub fn with_quiet_time_millis(mut self, quiet_time_millis: Option<u64>) -> Self {
        self.quiet_time_millis = quiet_time_millis.filter(|value| *value > 0);
        self
    }

    /// Logical record-set name in the backing store.
    #[must_use]
    pub fn collection(&self) -> &str {
        self.collection.as_str()
    }

    /// Maximum attempts within the trailing 24 hours, if enabled.
    #[must_use]
    pub fn max_per_day(&self) -> Option<u32> {
        self.max_per_day
    }

    /// Minimum milliseconds between attempts, if enabled.
    #[must_use]
    pub fn quiet_time_millis(&self) -> Option<u64> {
        self.quiet_time_millis
    }

    /// Applies the configured rules to a snapshot taken at `now`.
    ///
    /// The max-per-day rule runs first and short-circuits the quiet-time rule.
    #[must_use]
    pub fn judge(&self, snapshot: &HistorySnapshot, now: DateTime<Utc>) -> Option<ThrottleDenial> {
        if let Some(max_per_day) = self.max_per_day {
            let recent = snapshot.count_within(now, DAY_WINDOW_MILLIS);
            if recent >= max_per_day as usize {
                return Some(ThrottleDenial::ExceededMaxPerDay);
            }
        }

        if let Some(quiet_time) = self.quiet_time_millis {
            // The no-history sentinel never trips this rule.
            if !snapshot.is_empty()
                && i128::from(snapshot.most_recent_gap_millis()) < i128::from(quiet_time)
            {
                return Some(ThrottleDenial::SubmittedTooFrequently);
            }
        }

        None
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_owned(),
            max_per_day: None,
            quiet_time_millis: None,
        }
    }
}

fn validate_collection_name(collection: &str) -> AppResult<()> {
    validate_key_segment("collection name", collection)
}

/// Checks that `value` is safe to embed in a store key or key pattern.
///
/// Only ASCII letters, digits, `_`, `-` and `.` are accepted, so separators and
/// glob characters can never widen a scan over neighbouring keys.
pub fn validate_key_segment(label: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Configuration(format!("{label} must not be empty")));
    }

    let valid = value
        .chars()
        .all(|character| character.is_ascii_alphanumeric() || "_-.".contains(character));
    if !valid {
        return Err(AppError::Configuration(format!(
            "{label} '{value}' may only contain ASCII letters, digits, '_', '-' or '.'"
        )));
    }

    Ok(())
}

/// Reason a throttle decision denied an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ThrottleDenial {
    /// Too many attempts within the trailing 24 hours.
    #[serde(rename = "Exceeded Max Per Day")]
    ExceededMaxPerDay,
    /// The previous attempt is more recent than the quiet time.
    #[serde(rename = "Submitted too frequently")]
    SubmittedTooFrequently,
}

impl ThrottleDenial {
    /// Human-readable reason surfaced to downstream handlers.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::ExceededMaxPerDay => "Exceeded Max Per Day",
            Self::SubmittedTooFrequently => "Submitted too frequently",
        }
    }
}

impl std::fmt::Display for ThrottleDenial {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.message())
    }
}

impl Serialize for ThrottleDenial {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.message())
    }
}

/// Terminal state of a single decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleVerdict {
    /// Attempt permitted and scheduled for recording.
    Allowed,
    /// Denied by the max-per-day rule.
    DeniedByCount,
    /// Denied by the quiet-time rule.
    DeniedByFrequency,
}

/// Result of evaluating an identifier, handed to request handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    /// History as observed before this attempt.
    pub hits: HistorySnapshot,
    /// Denial reason, absent when the attempt was allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ThrottleDenial>,
}

impl DecisionOutcome {
    /// Outcome for a permitted attempt.
    #[must_use]
    pub fn allowed(hits: HistorySnapshot) -> Self {
        Self { hits, error: None }
    }

    /// Outcome for a denied attempt.
    #[must_use]
    pub fn denied(hits: HistorySnapshot, reason: ThrottleDenial) -> Self {
        Self {
            hits,
            error: Some(reason),
        }
    }

    /// Returns whether the attempt was permitted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.error.is_none()
    }

    /// Maps the outcome to its terminal state.
    #[must_use]
    pub fn verdict(&self) -> ThrottleVerdict {
        match self.error {
            None => ThrottleVerdict::Allowed,
            Some(ThrottleDenial::ExceededMaxPerDay) => ThrottleVerdict::DeniedByCount,
            Some(ThrottleDenial::SubmittedTooFrequently) => ThrottleVerdict::DeniedByFrequency,
        }
    }
}
