//! # aqlab-common
//!
//! Shared code for the audio quality lab core: error types, configuration
//! loading, duration parsing, and small ID/time helpers used by
//! `aqlab-core`'s store, scanner, queue, probe, analysis, and metadata
//! writer modules.

pub mod config;
pub mod duration;
pub mod error;

pub use error::{Error, Result};
