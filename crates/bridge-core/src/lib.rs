//! Core domain + relay pipeline for the Telegram <-> Discord bridge.
//!
//! This crate is intentionally framework-agnostic. Telegram and Discord live
//! behind the `OutboundPort` trait, implemented in their adapter crates; ffmpeg
//! and HTTP downloads live behind `AudioTranscoder` and `MediaFetcher`.

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod fetcher;
pub mod lifecycle;
pub mod logging;
pub mod policy;
pub mod ports;
pub mod size_guard;
pub mod temp_store;
pub mod transcoder;
pub mod utils;

pub use errors::{Error, Result};
