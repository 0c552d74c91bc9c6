//! vgmsplit Common Utilities
//!
//! Shared infrastructure for all vgmsplit crates:
//! - Error taxonomy and result aliases
//! - Persisted application settings (repaired on read)
//! - Render defaults
//! - Tracing/logging initialization

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
