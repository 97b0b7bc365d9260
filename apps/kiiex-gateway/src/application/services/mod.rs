//! Application Services
//!
//! - `OrderProcessor`: commands to venue requests, venue replies to events
//! - `ReconciliationTracker`: in-flight order set and status polling

mod order_processor;
mod tracker;

pub use order_processor::OrderProcessor;
pub use tracker::{DEFAULT_POLL_INTERVAL, PollSummary, ReconciliationTracker};
