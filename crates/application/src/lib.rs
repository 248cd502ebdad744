//! Application services and ports.

#![forbid(unsafe_code)]

mod throttle_service;

pub use throttle_service::{
    AttemptCollection, Clock, HistoryStore, RecordStore, ThrottleService, ThrottleServiceBuilder,
};
