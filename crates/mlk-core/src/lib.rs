//! Core of the engagement pipeline: a resumable discovery coordinator feeding
//! a deduplicating queue drained by a single rate-aware worker.
//!
//! This crate is framework-agnostic. The scraper, the text generator and the
//! messaging account live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod cursor;
pub mod discovery;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod pacing;
pub mod ports;
pub mod processed;
pub mod queue;
pub mod retry;
pub mod settings;
pub mod stats;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, ErrorKind, ProviderError, ProviderResult, Result};
