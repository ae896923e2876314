//! Cloud Sync Module - Agent to Collector Communication
//!
//! This module handles:
//! - Collector availability probing
//! - Periodic report delivery with confirmed-success counter clearing

pub mod client;
pub mod sync;

pub use client::{CloudClient, CloudConfig};
pub use sync::{DeliveryAgent, SyncConfig};
