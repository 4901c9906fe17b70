#![forbid(unsafe_code)]

//! Core domain model and persistence for insulin dosage logging.
//!
//! This crate provides:
//! - Blood glucose unit conversion
//! - Dosage engine (meal, correction, total)
//! - Settings file store and typed insulin settings
//! - Append-only text log with time-windowed queries

pub mod types;
pub mod error;
pub mod units;
pub mod config;
pub mod config_store;
pub mod settings;
pub mod logging;
pub mod record;
pub mod log_store;
pub mod engine;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use units::GlucoseUnit;
pub use config::Config;
pub use config_store::ConfigStore;
pub use settings::{InsulinSettings, Setting};
pub use log_store::{EntrySink, LogQuery, LogStore, TimeFilter};
pub use engine::prepare_entry;
