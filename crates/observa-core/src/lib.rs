//! Observa Core: error type, configuration and data directories.

pub mod config;
pub mod error;

pub use config::{DataPaths, ObservaConfig};
pub use error::{Error, Result};
