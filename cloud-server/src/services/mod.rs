//! Collector services
//!
//! Handlers stay thin; everything that touches more than one record set or
//! carries a decision lives here, written against `dyn Store`.

pub mod accounts;
pub mod activity;
pub mod alerts;
pub mod ingest;
pub mod registry;
