//! Request governance for the Telegram ⇄ AI relay.
//!
//! This crate is framework-agnostic. Telegram and the hosted AI
//! service live behind ports (traits) implemented in adapter crates.

pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod janitor;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod pipeline;
pub mod ports;
pub mod rate_limit;
pub mod replies;
pub mod retry;

pub use errors::{Error, MessageError, Result};
