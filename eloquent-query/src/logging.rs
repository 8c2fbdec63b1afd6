//! Logging setup driven by environment variables.
//!
//! # Environment Variables
//!
//! - `ELOQUENT_DEBUG=true|1|yes` - Enable debug logging
//! - `ELOQUENT_LOG_LEVEL=trace|debug|info|warn|error|off` - Set a specific level
//! - `ELOQUENT_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! ```rust,no_run
//! use eloquent_query::logging;
//!
//! logging::init();
//! ```
//!
//! Statements are logged at `debug` with the rendered SQL and the parameter
//! count; eager-load branches log at `trace`.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `ELOQUENT_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("ELOQUENT_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Get the configured log level from `ELOQUENT_LOG_LEVEL`.
///
/// Defaults to "debug" if `ELOQUENT_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("ELOQUENT_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            "off" => "off",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Get the configured log format from `ELOQUENT_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    env::var("ELOQUENT_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize logging. Subsequent calls are no-ops.
///
/// Without the `tracing-subscriber` feature this only records that
/// initialization happened; install your own subscriber instead.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("ELOQUENT_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "eloquent={},eloquent_query={},eloquent_sqlite={}",
                level, level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            match get_log_format() {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "compact" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().compact())
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().pretty())
                        .init();
                }
            }

            tracing::info!(level = level, format = get_log_format(), "logging initialized");
        }
    });
}

/// Initialize logging with a specific level.
///
/// # Safety
///
/// Modifies environment variables; call at startup before spawning threads.
pub fn init_with_level(level: &str) {
    // SAFETY: called at program startup before threads are spawned.
    unsafe {
        env::set_var("ELOQUENT_LOG_LEVEL", level);
    }
    init();
}

/// Conditional debug logging, active only when `ELOQUENT_DEBUG` is set.
#[macro_export]
macro_rules! eloquent_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

/// Conditional trace logging.
#[macro_export]
macro_rules! eloquent_trace {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::trace!($($arg)*);
        }
    };
}
