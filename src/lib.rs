//! sched-assist
//!
//! UX ("user experience") task placement and preemption policy for a
//! CFS/EEVDF fair scheduler. The host scheduler calls into this crate from
//! its wakeup, load-balance and pick-next paths through the hook-shaped
//! entry points in [`sched_assist::hooks`].
//!
//! Nothing here blocks, sleeps or allocates. State owned by this crate is
//! limited to the per-CPU UX run-queues, the published configuration and
//! diagnostic counters; everything else is read from the host through
//! [`sched_assist::SchedEnv`].

#![no_std]

pub mod logger;
pub mod sched_assist;

pub use sched_assist::*;

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::logger::log($level, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::FATAL, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::ERROR, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::WARN, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::INFO, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::DEBUG, $($arg)*);
    }};
}

#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::TRACE, $($arg)*);
    }};
}

/// Rate-limited warning for hot paths.
///
/// `$limit` is a `logger::RateLimit`, `$now_ns` the caller's monotonic clock.
#[macro_export]
macro_rules! kwarn_ratelimited {
    ($limit:expr, $now_ns:expr, $($arg:tt)*) => {{
        if $limit.allow($now_ns) {
            $crate::klog!($crate::logger::LogLevel::WARN, $($arg)*);
        }
    }};
}
