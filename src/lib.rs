//! Configuration surface for the retrofix legacy archive normaliser.
//!
//! The normaliser binary and library consume [`RepairConfig`] to learn where
//! the canonical archive store and the normalised overlay live, how many
//! workers to run, and which executables implement each legacy tool.

pub mod config;

pub use config::{ConfigError, RepairConfig, ToolNames};
