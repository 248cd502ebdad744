//! Shared primitives for all Rust crates in quietgate.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across quietgate crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl AsRef<str> for NonEmptyString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Common application error categories.
///
/// Throttle denials are not errors; they travel inside the decision outcome.
#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or unusable configuration detected while wiring components.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The backing record store could not be opened.
    #[error("store connection error: {0}")]
    StoreConnection(String),

    /// Reading from the backing record store failed.
    #[error("store query error: {0}")]
    StoreQuery(String),

    /// Writing to or deleting from the backing record store failed.
    #[error("store write error: {0}")]
    StoreWrite(String),

    /// Caller is not allowed to use an administrative surface.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether the error originated in the backing record store.
    #[must_use]
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::StoreConnection(_) | Self::StoreQuery(_) | Self::StoreWrite(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, NonEmptyString};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn non_empty_string_keeps_original_value() {
        let result = NonEmptyString::new("203.0.113.7");
        assert_eq!(
            result.map(String::from).unwrap_or_default(),
            "203.0.113.7"
        );
    }

    #[test]
    fn store_failures_are_classified() {
        assert!(AppError::StoreQuery("boom".to_owned()).is_store_failure());
        assert!(AppError::StoreConnection("boom".to_owned()).is_store_failure());
        assert!(!AppError::Configuration("boom".to_owned()).is_store_failure());
    }
}
