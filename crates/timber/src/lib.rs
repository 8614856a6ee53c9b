#![deny(missing_docs)]

//! Formats the `tracing` events produced by `artemis` and the libraries it
//! uses, and writes them to stderr so command output on stdout stays clean.

use clap::ValueEnum;

mod formatter;

pub use tracing_core::Level;

/// possible log levels
pub const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// The `--log` argument
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Only errors
    Error,
    /// Errors and warnings
    Warn,
    /// Endpoint and transport selection
    Info,
    /// Every executed document
    Debug,
    /// Everything, with thread ids
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Initializes a global tracing subscriber. Nothing is logged without a level.
///
/// The format gets more detailed as the level does: errors and warnings are
/// compact one-liners, trace output carries thread ids so interleaved batch
/// workers can be told apart.
pub fn init(level: Option<LogLevel>) {
    let Some(level) = level else {
        return;
    };
    let level = Level::from(level);
    if level <= Level::WARN {
        formatter::least_verbose(level);
    } else if level < Level::TRACE {
        formatter::verbose(level);
    } else {
        formatter::very_verbose(level);
    }
}
