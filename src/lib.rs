//! Relaycast - range-aware media relay and audio acquisition service
//!
//! This library crate exposes the core functionality for integration testing.

pub mod acquisition;
pub mod config;
pub mod server;
pub mod sources;
pub mod streaming;
