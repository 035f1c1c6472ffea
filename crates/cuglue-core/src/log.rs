//! Level-gated diagnostic output
//!
//! One process-wide threshold, `Error` by default. A message is written iff
//! its level is at or below the threshold, i.e. at least as severe. Lines go
//! to stdout (or a sink installed with [`set_sink`]) and are flushed
//! immediately.
//!
//! Each message becomes one line: a bracketed level tag, a space, the
//! formatted message and a newline, e.g. `[WARN] Ignoring invalid ...`.
//! Messages are not printed raw, so callers never add their own newline.
//!
//! The threshold is a relaxed atomic: concurrent `set_level` calls race
//! benignly, and a change only affects messages logged after it. Logging
//! never fails; write errors are dropped.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Log severity, ordered from most to least severe
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Threshold that suppresses every message except `Quiet` ones
    Quiet = 0,
    /// Failures
    Error = 1,
    /// Suspicious but recoverable conditions
    Warning = 2,
    /// Informational messages
    Info = 3,
    /// Debugging output
    Debug = 4,
    /// Per-call tracing
    Trace = 5,
    /// Tracing of the bridge internals themselves
    DebugTrace = 6,
}

impl LogLevel {
    /// All levels in ascending order
    pub const ALL: [LogLevel; 7] = [
        LogLevel::Quiet,
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
        LogLevel::DebugTrace,
    ];

    /// Level from its numeric value
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Parse a level name (`"warning"`, `"WARN"`, ...) or number (`"2"`)
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return Self::from_u8(n);
        }
        match s.to_ascii_lowercase().as_str() {
            "quiet" | "none" | "off" => Some(LogLevel::Quiet),
            "error" => Some(LogLevel::Error),
            "warning" | "warn" => Some(LogLevel::Warning),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            "debugtrace" | "debug_trace" => Some(LogLevel::DebugTrace),
            _ => None,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            LogLevel::Quiet => "[QUIET]",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warning => "[WARN]",
            LogLevel::Info => "[INFO]",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
            LogLevel::DebugTrace => "[DEBUGTRACE]",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
            LogLevel::DebugTrace => "debugtrace",
        };
        f.write_str(name)
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Error as u8);

type Sink = Box<dyn Write + Send>;

static SINK: Lazy<Mutex<Option<Sink>>> = Lazy::new(|| Mutex::new(None));

/// Set the process-wide threshold
pub fn set_level(level: LogLevel) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Current process-wide threshold
pub fn level() -> LogLevel {
    LogLevel::from_u8(LEVEL.load(Ordering::Relaxed)).unwrap_or(LogLevel::Error)
}

/// Whether a message at `level` would be written
#[inline]
pub fn enabled(level: LogLevel) -> bool {
    level <= self::level()
}

/// Redirect log output away from stdout
pub fn set_sink(sink: Box<dyn Write + Send>) {
    *SINK.lock() = Some(sink);
}

/// Send log output to stdout again
pub fn reset_sink() {
    *SINK.lock() = None;
}

/// Write one message if `level` passes the threshold
pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let mut sink = SINK.lock();
    match sink.as_mut() {
        Some(w) => write_line(w.as_mut(), level, args),
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            write_line(&mut out, level, args);
        }
    }
}

fn write_line(w: &mut dyn Write, level: LogLevel, args: fmt::Arguments<'_>) {
    let _ = writeln!(w, "{} {}", level.tag(), args);
    let _ = w.flush();
}

/// Log at an explicit level
#[macro_export]
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        if $crate::log::enabled($level) {
            $crate::log::log($level, format_args!($($arg)+));
        }
    };
}

/// Log at `Error`
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::log_at!($crate::log::LogLevel::Error, $($arg)+) };
}

/// Log at `Warning`
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)+) => { $crate::log_at!($crate::log::LogLevel::Warning, $($arg)+) };
}

/// Log at `Info`
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => { $crate::log_at!($crate::log::LogLevel::Info, $($arg)+) };
}

/// Log at `Debug`
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => { $crate::log_at!($crate::log::LogLevel::Debug, $($arg)+) };
}

/// Log at `Trace`
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)+) => { $crate::log_at!($crate::log::LogLevel::Trace, $($arg)+) };
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    /// Serializes tests that touch the global threshold or sink
    pub(crate) static LOG_TEST_LOCK: Mutex<()> = parking_lot::const_mutex(());

    #[derive(Clone, Default)]
    pub(crate) struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        pub(crate) fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_levels() {
        assert_eq!(LogLevel::parse("warn"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse(" 4 "), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("debug_trace"), Some(LogLevel::DebugTrace));
        assert_eq!(LogLevel::parse("7"), None);
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_ordering() {
        assert!(LogLevel::Quiet < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Trace < LogLevel::DebugTrace);
    }

    #[test]
    fn test_filtering_follows_threshold() {
        let _guard = LOG_TEST_LOCK.lock();
        let capture = Capture::default();
        set_sink(Box::new(capture.clone()));
        let previous = level();

        set_level(LogLevel::Warning);
        log(LogLevel::Info, format_args!("filter-info-suppressed"));
        log(LogLevel::Error, format_args!("filter-error-shown"));

        set_level(LogLevel::Info);
        log(LogLevel::Info, format_args!("filter-info-after-change"));

        set_level(previous);
        reset_sink();

        let text = capture.text();
        assert!(!text.contains("filter-info-suppressed"));
        assert!(text.contains("[ERROR] filter-error-shown\n"));
        assert!(text.contains("[INFO] filter-info-after-change\n"));
    }

    #[test]
    fn test_macros_respect_level() {
        let _guard = LOG_TEST_LOCK.lock();
        let capture = Capture::default();
        set_sink(Box::new(capture.clone()));
        let previous = level();

        set_level(LogLevel::Error);
        crate::log_debug!("macro-debug {}", 1);
        crate::log_error!("macro-error {}", 2);

        set_level(previous);
        reset_sink();

        let text = capture.text();
        assert!(!text.contains("macro-debug 1"));
        assert!(text.contains("macro-error 2"));
    }

    #[test]
    fn test_default_threshold_is_error() {
        let _guard = LOG_TEST_LOCK.lock();
        assert!(enabled(LogLevel::Error));
        assert!(!enabled(LogLevel::Warning));
    }
}
