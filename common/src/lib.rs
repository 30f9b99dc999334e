//! Shared infrastructure for retrofix crates.
//!
//! The normaliser never installs a process-wide logger. Instead each
//! component receives a [`LogSink`] that forwards records to whichever
//! `log::Log` implementation the caller owns: [`StderrLog`] in the binary,
//! or a `RecordingLog` (behind the `test-support` feature) in tests.

pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use logging::{LogSink, StderrLog, level_for_verbosity};
