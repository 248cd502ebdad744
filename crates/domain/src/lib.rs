//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod attempt;
mod history;
mod throttle;

pub use attempt::AttemptRecord;
pub use history::{DAY_WINDOW_MILLIS, HistorySnapshot, NO_HISTORY_GAP_MILLIS};
pub use throttle::{
    DEFAULT_COLLECTION, DecisionOutcome, ThrottleConfig, ThrottleDenial, ThrottleVerdict,
    validate_key_segment,
};
