//! Injectable logging handles built on the `log` facade.
//!
//! [`LogSink`] is a cheap, copyable reference to a `log::Log` plus the
//! target string stamped on every record. Components take a sink in their
//! constructor rather than reaching for the global logger, so two passes in
//! one process can report to different destinations.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;

/// Copyable handle that emits records to an injected `log::Log`.
#[derive(Clone, Copy)]
pub struct LogSink<'a> {
    inner: &'a dyn Log,
    target: &'static str,
}

impl<'a> LogSink<'a> {
    /// Creates a sink that writes to `inner` using the default target.
    #[must_use]
    pub fn new(inner: &'a dyn Log) -> Self {
        Self {
            inner,
            target: "retrofix",
        }
    }

    /// Returns a copy of this sink that stamps records with `target`.
    #[must_use]
    pub fn with_target(self, target: &'static str) -> Self {
        Self { target, ..self }
    }

    /// Returns the target stamped on emitted records.
    #[must_use]
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Emits a record at `level` if the underlying logger accepts it.
    pub fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder()
            .level(level)
            .target(self.target)
            .build();
        if !self.inner.enabled(&metadata) {
            return;
        }
        self.inner.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .build(),
        );
    }

    /// Emits an error-level record.
    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Error, args);
    }

    /// Emits a warn-level record.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Warn, args);
    }

    /// Emits an info-level record.
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Info, args);
    }

    /// Emits a debug-level record.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Debug, args);
    }
}

impl fmt::Debug for LogSink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Maps `-v`/`-q` style flags to a level filter.
///
/// Quiet wins; otherwise warnings are shown by default and each `-v` lowers
/// the threshold by one level.
#[must_use]
pub fn level_for_verbosity(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Line-oriented logger writing `LEVEL target: message` to a writer.
///
/// The binary wraps stderr; tests can hand in any `Write + Send`.
pub struct StderrLog {
    max_level: LevelFilter,
    out: Mutex<Box<dyn Write + Send>>,
}

impl StderrLog {
    /// Creates a logger writing to the process's stderr.
    #[must_use]
    pub fn new(max_level: LevelFilter) -> Self {
        Self::with_writer(max_level, Box::new(io::stderr()))
    }

    /// Creates a logger writing to `out`.
    #[must_use]
    pub fn with_writer(max_level: LevelFilter, out: Box<dyn Write + Send>) -> Self {
        Self {
            max_level,
            out: Mutex::new(out),
        }
    }

    /// Returns the most verbose level this logger accepts.
    #[must_use]
    pub fn max_level(&self) -> LevelFilter {
        self.max_level
    }
}

impl Log for StderrLog {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // A poisoned lock only means another thread panicked mid-write.
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Logging must never fail the caller.
        let _ = writeln!(
            out,
            "{:<5} {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        if let Ok(mut out) = self.out.lock() {
            let _ = out.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingLog;
    use rstest::rstest;
    use std::sync::Arc;

    #[rstest]
    #[case::quiet(3, true, LevelFilter::Error)]
    #[case::default(0, false, LevelFilter::Warn)]
    #[case::verbose(1, false, LevelFilter::Info)]
    #[case::very_verbose(2, false, LevelFilter::Debug)]
    #[case::saturates(9, false, LevelFilter::Trace)]
    fn verbosity_maps_to_level(
        #[case] verbosity: u8,
        #[case] quiet: bool,
        #[case] expected: LevelFilter,
    ) {
        assert_eq!(level_for_verbosity(verbosity, quiet), expected);
    }

    #[test]
    fn sink_stamps_target_and_level() {
        let log = RecordingLog::default();
        let sink = LogSink::new(&log).with_target("retrofix::checker");

        sink.warn(format_args!("cannot open {}", "a.zip"));

        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::Warn);
        assert_eq!(records[0].target, "retrofix::checker");
        assert_eq!(records[0].message, "cannot open a.zip");
    }

    #[test]
    fn sink_respects_logger_filter() {
        let log = RecordingLog::with_max_level(LevelFilter::Info);
        let sink = LogSink::new(&log);

        sink.debug(format_args!("hidden"));
        sink.info(format_args!("shown"));

        assert_eq!(log.messages(), vec!["shown".to_owned()]);
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("buffer lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stderr_log_writes_filtered_lines() {
        let buf = SharedBuf::default();
        let log = StderrLog::with_writer(LevelFilter::Warn, Box::new(buf.clone()));
        let sink = LogSink::new(&log);

        sink.info(format_args!("dropped"));
        sink.error(format_args!("kept"));

        let text = String::from_utf8(buf.0.lock().expect("lock").clone()).expect("utf8");
        assert_eq!(text, "ERROR retrofix: kept\n");
    }
}
