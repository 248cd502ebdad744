//! Attempt history and throttle decisions.
//!
//! The history store wraps an external record store and opens its collection
//! lazily. The throttle service applies the max-per-day and quiet-time rules
//! on top of it and records permitted attempts.

mod history;
mod ports;
mod service;


pub use history::HistoryStore;
pub use ports::{AttemptCollection, Clock, RecordStore};
pub use service::{ThrottleService, ThrottleServiceBuilder};
