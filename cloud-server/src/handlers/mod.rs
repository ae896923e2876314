//! HTTP handlers

pub mod health;
pub mod auth;
pub mod activity;
pub mod sources;
pub mod alerts;
