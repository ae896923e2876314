//! Logic Module - Capture, Scoring Input & Delivery
//!
//! - `counters` - shared event counters
//! - `keywords` / `capture` - input stream to flagged/unflagged events
//! - `subject` - report subject label
//! - `cloud_sync` - collector client and delivery loop

pub mod capture;
pub mod cloud_sync;
pub mod counters;
pub mod keywords;
pub mod subject;
