//! # Logger and Observer Dispatch
//!
//! The [`Logger`] carries everything a run reports while it executes: log
//! lines at a configured verbosity, JSON-encoded events, progress updates,
//! and a destruction notification. At most one handler is registered per
//! notification kind; registering replaces the previous handler.
//!
//! A `Logger` is a cheaply clonable shared handle. The orchestrator does
//! not own it: the caller may keep using the same instance independently,
//! including attaching it to several concurrently running tests, in which
//! case handlers observe interleaved emissions and must tolerate that.
//!
//! Emission is synchronous on the emitting execution context. A missing
//! handler is a silent no-op. A handler that panics is contained at the
//! emission boundary and never disturbs the run that emitted.

use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::constants::verbosity;

type LogHandler = Box<dyn FnMut(u32, &str) + Send>;
type EventHandler = Box<dyn FnMut(&str) + Send>;
type ProgressHandler = Box<dyn FnMut(f64, &str) + Send>;
type DestroyHandler = Box<dyn FnOnce() + Send>;

/// Run every external callback through one boundary that converts a panic
/// into a discarded diagnostic, so observer bugs cannot alter control flow.
pub(crate) fn guarded_invoke<F: FnOnce()>(slot: &str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(handler = slot, "observer panicked during emission, discarded");
    }
}

struct LoggerInner {
    verbosity: u32,
    logfile: Option<PathBuf>,
    on_log: Option<LogHandler>,
    on_event: Option<EventHandler>,
    on_progress: Option<ProgressHandler>,
    on_destroy: Option<DestroyHandler>,
}

impl Drop for LoggerInner {
    fn drop(&mut self) {
        if let Some(handler) = self.on_destroy.take() {
            guarded_invoke("on_destroy", handler);
        }
    }
}

/// Shared logging and event-dispatch handle for test runs.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Mutex<LoggerInner>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// A logger at `WARNING` verbosity with no handlers and no logfile.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoggerInner {
                verbosity: verbosity::WARNING,
                logfile: None,
                on_log: None,
                on_event: None,
                on_progress: None,
                on_destroy: None,
            })),
        }
    }

    /// Set the logger verbosity.
    pub fn set_verbosity(&self, verbosity: u32) -> &Self {
        self.inner.lock().verbosity = verbosity;
        self
    }

    /// Increase the verbosity by one level.
    pub fn increase_verbosity(&self) -> &Self {
        let mut inner = self.inner.lock();
        inner.verbosity = inner.verbosity.saturating_add(1);
        self
    }

    /// The configured verbosity.
    pub fn verbosity(&self) -> u32 {
        self.inner.lock().verbosity
    }

    #[deprecated(note = "use verbosity()")]
    pub fn get_verbosity(&self) -> u32 {
        self.verbosity()
    }

    /// Register the log-line handler, replacing any previous one.
    ///
    /// The handler receives the severity level and the log line. It is not
    /// invoked for lines above the configured verbosity.
    pub fn on_log(&self, handler: impl FnMut(u32, &str) + Send + 'static) -> &Self {
        self.inner.lock().on_log = Some(Box::new(handler));
        self
    }

    /// Register the event handler, replacing any previous one.
    ///
    /// Events are serialized JSON objects whose schema is test-specific;
    /// the engine only transports the string.
    pub fn on_event(&self, handler: impl FnMut(&str) + Send + 'static) -> &Self {
        self.inner.lock().on_event = Some(Box::new(handler));
        self
    }

    /// Register the progress handler, replacing any previous one.
    ///
    /// Progress is a fraction in `0.0..=1.0` plus a short human-readable
    /// label for the phase in progress.
    pub fn on_progress(&self, handler: impl FnMut(f64, &str) + Send + 'static) -> &Self {
        self.inner.lock().on_progress = Some(Box::new(handler));
        self
    }

    /// Register the destroy handler, replacing any previous one.
    ///
    /// Fires exactly once, when the last clone of this logger is dropped;
    /// no emission is possible through the instance afterwards.
    pub fn on_destroy(&self, handler: impl FnOnce() + Send + 'static) -> &Self {
        self.inner.lock().on_destroy = Some(Box::new(handler));
        self
    }

    /// Append formatted log lines to `path`, independent of `on_log`.
    ///
    /// When both a logfile and an `on_log` handler are configured, both
    /// receive every emitted line.
    pub fn set_logfile(&self, path: impl Into<PathBuf>) -> &Self {
        self.inner.lock().logfile = Some(path.into());
        self
    }

    /// Emit a log line at the given severity level.
    pub fn log(&self, level: u32, message: &str) {
        // The handler is moved out of the lock for the duration of the
        // call: a handler that emits through this same logger finds the
        // slot empty instead of deadlocking on the inner mutex.
        let (handler, logfile) = {
            let mut inner = self.inner.lock();
            if level > inner.verbosity {
                return;
            }
            (inner.on_log.take(), inner.logfile.clone())
        };

        if let Some(path) = logfile {
            append_logfile_line(&path, level, message);
        }

        if let Some(mut handler) = handler {
            guarded_invoke("on_log", AssertUnwindSafe(|| handler(level, message)));
            let mut inner = self.inner.lock();
            // Keep a replacement the handler may have registered meanwhile.
            if inner.on_log.is_none() {
                inner.on_log = Some(handler);
            }
        }
    }

    /// Emit a warning-level line.
    pub fn warn(&self, message: &str) {
        self.log(verbosity::WARNING, message);
    }

    /// Emit an info-level line.
    pub fn info(&self, message: &str) {
        self.log(verbosity::INFO, message);
    }

    /// Emit a debug-level line.
    pub fn debug(&self, message: &str) {
        self.log(verbosity::DEBUG, message);
    }

    /// Emit a very-verbose debug line.
    pub fn debug2(&self, message: &str) {
        self.log(verbosity::DEBUG2, message);
    }

    /// Deliver a serialized JSON event to the event handler, if any.
    pub fn event(&self, serialized: &str) {
        let handler = self.inner.lock().on_event.take();
        if let Some(mut handler) = handler {
            guarded_invoke("on_event", AssertUnwindSafe(|| handler(serialized)));
            let mut inner = self.inner.lock();
            if inner.on_event.is_none() {
                inner.on_event = Some(handler);
            }
        }
    }

    /// Deliver a progress update to the progress handler, if any.
    pub fn progress(&self, fraction: f64, message: &str) {
        let handler = self.inner.lock().on_progress.take();
        if let Some(mut handler) = handler {
            guarded_invoke("on_progress", AssertUnwindSafe(|| handler(fraction, message)));
            let mut inner = self.inner.lock();
            if inner.on_progress.is_none() {
                inner.on_progress = Some(handler);
            }
        }
    }
}

fn level_name(level: u32) -> &'static str {
    match level {
        verbosity::WARNING => "warning",
        verbosity::INFO => "info",
        verbosity::DEBUG => "debug",
        _ => "debug2",
    }
}

fn append_logfile_line(path: &Path, level: u32, message: &str) {
    let line = format!(
        "[{}] <{}> {}\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        level_name(level),
        message
    );
    let written = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
    if let Err(error) = written {
        tracing::debug!(path = %path.display(), %error, "logfile append failed");
    }
}
