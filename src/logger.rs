use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::INFO.priority());

/// Target used for every record handed to the `log` facade.
pub const LOG_TARGET: &str = "sched_assist";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    FATAL,
    ERROR,
    WARN,
    INFO,
    DEBUG,
    TRACE,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::FATAL => "FATAL",
            LogLevel::ERROR => "ERROR",
            LogLevel::WARN => "WARN",
            LogLevel::INFO => "INFO",
            LogLevel::DEBUG => "DEBUG",
            LogLevel::TRACE => "TRACE",
        }
    }

    const fn priority(self) -> u8 {
        match self {
            LogLevel::FATAL => 1,
            LogLevel::ERROR => 2,
            LogLevel::WARN => 3,
            LogLevel::INFO => 4,
            LogLevel::DEBUG => 5,
            LogLevel::TRACE => 6,
        }
    }

    fn from_priority(value: u8) -> Self {
        match value {
            0 | 1 => LogLevel::FATAL,
            2 => LogLevel::ERROR,
            3 => LogLevel::WARN,
            4 => LogLevel::INFO,
            5 => LogLevel::DEBUG,
            _ => LogLevel::TRACE,
        }
    }

    /// FATAL has no counterpart in `log`; it maps to `Error`.
    fn facade_level(self) -> log::Level {
        match self {
            LogLevel::FATAL | LogLevel::ERROR => log::Level::Error,
            LogLevel::WARN => log::Level::Warn,
            LogLevel::INFO => log::Level::Info,
            LogLevel::DEBUG => log::Level::Debug,
            LogLevel::TRACE => log::Level::Trace,
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("fatal") {
            Some(LogLevel::FATAL)
        } else if value.eq_ignore_ascii_case("error") {
            Some(LogLevel::ERROR)
        } else if value.eq_ignore_ascii_case("warn") || value.eq_ignore_ascii_case("warning") {
            Some(LogLevel::WARN)
        } else if value.eq_ignore_ascii_case("info") {
            Some(LogLevel::INFO)
        } else if value.eq_ignore_ascii_case("debug") {
            Some(LogLevel::DEBUG)
        } else if value.eq_ignore_ascii_case("trace") {
            Some(LogLevel::TRACE)
        } else {
            None
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<5}", self.as_str())
    }
}

pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    let current = LOG_LEVEL.load(Ordering::Relaxed);
    if level.priority() > current {
        return;
    }

    if level == LogLevel::FATAL {
        log::log!(target: LOG_TARGET, log::Level::Error, "[FATAL] {}", args);
    } else {
        log::log!(target: LOG_TARGET, level.facade_level(), "{}", args);
    }
}

pub fn set_max_level(level: LogLevel) {
    LOG_LEVEL.store(level.priority(), Ordering::Relaxed);
}

pub fn max_level() -> LogLevel {
    LogLevel::from_priority(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Returns true if a record at `level` would currently be emitted.
pub fn enabled(level: LogLevel) -> bool {
    level.priority() <= LOG_LEVEL.load(Ordering::Relaxed)
}

pub fn parse_level_directive(cmdline: &str) -> Option<LogLevel> {
    for token in cmdline.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            if key.eq_ignore_ascii_case("log") || key.eq_ignore_ascii_case("loglevel") {
                if let Some(level) = LogLevel::from_str(value) {
                    return Some(level);
                }
            }
        }
    }
    None
}

// ============================================================================
// Rate limiting
// ============================================================================

/// Default rate limit window (5 s, same as printk_ratelimited)
pub const DEFAULT_RATELIMIT_INTERVAL_NS: u64 = 5_000_000_000;

/// Default number of messages allowed per window
pub const DEFAULT_RATELIMIT_BURST: u32 = 10;

/// Lock-free message rate limiter.
///
/// The clock is supplied by the caller (the host run-queue clock), so the
/// limiter can be used from contexts that cannot read time on their own.
/// Races between CPUs may let a few extra messages through at a window
/// boundary; that is acceptable for diagnostics.
pub struct RateLimit {
    interval_ns: u64,
    burst: u32,
    window_start: AtomicU64,
    printed: AtomicU32,
    missed: AtomicU32,
}

impl RateLimit {
    pub const fn new(interval_ns: u64, burst: u32) -> Self {
        Self {
            interval_ns,
            burst,
            window_start: AtomicU64::new(0),
            printed: AtomicU32::new(0),
            missed: AtomicU32::new(0),
        }
    }

    pub const fn default_limits() -> Self {
        Self::new(DEFAULT_RATELIMIT_INTERVAL_NS, DEFAULT_RATELIMIT_BURST)
    }

    /// Returns true if a message may be emitted at `now_ns`.
    pub fn allow(&self, now_ns: u64) -> bool {
        let start = self.window_start.load(Ordering::Relaxed);
        if now_ns.saturating_sub(start) >= self.interval_ns || now_ns < start {
            // New window
            if self
                .window_start
                .compare_exchange(start, now_ns, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let missed = self.missed.swap(0, Ordering::Relaxed);
                self.printed.store(0, Ordering::Relaxed);
                if missed > 0 {
                    log(
                        LogLevel::WARN,
                        format_args!("{} messages suppressed by rate limit", missed),
                    );
                }
            }
        }

        if self.printed.fetch_add(1, Ordering::Relaxed) < self.burst {
            true
        } else {
            self.missed.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Messages dropped in the current window
    pub fn missed(&self) -> u32 {
        self.missed.load(Ordering::Relaxed)
    }
}
