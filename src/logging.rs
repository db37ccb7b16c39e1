//! Internal logging helpers for structured siftdb events.

/// Single logging target for siftdb.
pub(crate) const LOG_TARGET: &str = "siftdb";

macro_rules! sift_log {
    ($level:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!($level) {
            log::log!(
                target: crate::logging::LOG_TARGET,
                $level,
                "event={} {}",
                $event,
                format_args!($fmt $(, $args)*)
            );
        }
    }};
}

pub(crate) use sift_log;
