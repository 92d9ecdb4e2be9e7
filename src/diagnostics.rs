//! Logging handles passed into every component.
//!
//! Components never reach for a process-wide logger directly. They hold a
//! [`Logger`], a cheap cloneable handle around a [`Sink`]. The default sink
//! forwards to the `log` facade, so `env_logger` (see [`init_logger`]) or any
//! other `log` backend picks the messages up; tests swap in a
//! [`CaptureSink`] and assert on what was reported.

use std::{
    fmt::Display,
    sync::{Arc, Mutex},
};

use log::Level;

/// Destination for diagnostic messages.
pub trait Sink: Send + Sync {
    fn report(&self, level: Level, target: &str, message: &str);
}

/// Forwards everything to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl Sink for LogSink {
    fn report(&self, level: Level, target: &str, message: &str) {
        log::log!(target: target, level, "{}", message);
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct CaptureSink {
    records: Mutex<Vec<(Level, String)>>,
}

impl CaptureSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<(Level, String)> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// True if any captured message at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl Sink for CaptureSink {
    fn report(&self, level: Level, _target: &str, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push((level, message.to_string()));
        }
    }
}

#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn Sink>,
    target: &'static str,
}

impl Logger {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            target: "frame_ngin",
        }
    }

    /// Same sink, different `log` target.
    pub fn with_target(&self, target: &'static str) -> Self {
        Self {
            sink: self.sink.clone(),
            target,
        }
    }

    pub fn debug(&self, message: impl Display) {
        self.report(Level::Debug, message);
    }

    pub fn info(&self, message: impl Display) {
        self.report(Level::Info, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.report(Level::Warn, message);
    }

    pub fn error(&self, message: impl Display) {
        self.report(Level::Error, message);
    }

    fn report(&self, level: Level, message: impl Display) {
        self.sink.report(level, self.target, &message.to_string());
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Arc::new(LogSink))
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").field("target", &self.target).finish()
    }
}

/// Installs `env_logger` with `filter` unless `RUST_LOG` overrides it.
pub fn init_logger(filter: &str) {
    let env = env_logger::Env::default().default_filter_or(filter);
    if let Err(e) = env_logger::Builder::from_env(env).try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    }
}
