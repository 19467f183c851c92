//! Internal diagnostics
//!
//! Cold-path logging for lifecycle events: processor start and halt, caller
//! misuse, handler failures. Every line carries the sequence the component
//! was at, which is usually the only context that matters when untangling a
//! stalled pipeline. Nothing here is called from a claim or wait loop.
//!
//! Silent by default. Set `SLIPSTREAM_LOG` to `error`, `warn`, `info`, or
//! `debug` to open the tap; debug builds report errors even without it.

use std::fmt;
use std::sync::OnceLock;

/// Severity of a diagnostic line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }

    fn from_env(value: &str) -> Option<Level> {
        match value {
            "error" => Some(Level::Error),
            "warn" => Some(Level::Warn),
            "info" => Some(Level::Info),
            "debug" | "trace" => Some(Level::Debug),
            _ => None,
        }
    }
}

/// The threshold is read from the environment once; diagnostics must stay
/// cheap enough that a stray call in a warm path costs one load and a branch.
fn threshold() -> Option<Level> {
    static THRESHOLD: OnceLock<Option<Level>> = OnceLock::new();
    *THRESHOLD.get_or_init(|| {
        match std::env::var("SLIPSTREAM_LOG") {
            Ok(value) => Level::from_env(&value),
            // Errors should not vanish silently while developing.
            Err(_) if cfg!(debug_assertions) => Some(Level::Error),
            Err(_) => None,
        }
    })
}

pub(crate) fn enabled(level: Level) -> bool {
    threshold().is_some_and(|max| level <= max)
}

pub(crate) fn emit(level: Level, component: &'static str, sequence: i64, args: fmt::Arguments<'_>) {
    eprintln!(
        "[slipstream {}] {} seq={}: {}",
        level.tag(),
        component,
        sequence,
        args
    );
}

/// Emit one diagnostic line: level, component name, the sequence the
/// component is at, then a message.
macro_rules! diag {
    ($level:ident, $component:expr, $sequence:expr, $($arg:tt)*) => {
        if $crate::exchange::internal_log::enabled($crate::exchange::internal_log::Level::$level) {
            $crate::exchange::internal_log::emit(
                $crate::exchange::internal_log::Level::$level,
                $component,
                $sequence,
                format_args!($($arg)*),
            );
        }
    };
}

pub(crate) use diag;
