//! Error handling helpers for soft failures
//!
//! Cache corruption and stale metadata must never abort a resolution; these
//! helpers log the problem and let the caller carry on.

use tracing::{debug, warn};

/// Execute an operation and log errors without failing
///
/// Returns `Some(T)` on success, `None` on error (after logging at warn level).
///
/// # Example
/// ```rust
/// use modresolve::utils::log_error;
///
/// let parsed: Option<u32> = log_error(|| "12".parse::<u32>(), "Bad number");
/// assert_eq!(parsed, Some(12));
/// ```
pub fn log_error<F, T, E>(operation: F, context: &str) -> Option<T>
where
    F: FnOnce() -> Result<T, E>,
    E: std::fmt::Display,
{
    match operation() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {}", context, e);
            None
        }
    }
}

/// Execute an operation and return a default value on error
///
/// Logs at debug level: failure is expected here and the default is acceptable.
///
/// # Example
/// ```rust
/// use modresolve::utils::with_default;
///
/// let count = with_default(|| "x".parse::<u32>(), 0, "Failed to read count");
/// assert_eq!(count, 0);
/// ```
pub fn with_default<F, T, E>(operation: F, default: T, context: &str) -> T
where
    F: FnOnce() -> Result<T, E>,
    E: std::fmt::Display,
{
    match operation() {
        Ok(value) => value,
        Err(e) => {
            debug!("{}: {}, using default", context, e);
            default
        }
    }
}
