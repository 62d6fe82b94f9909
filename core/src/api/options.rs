//! Configuration options for the Dollar runtime.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Configuration options for a [`Runtime`](super::Runtime).
///
/// These are the initial values; the live flags sit in [`Configuration`]
/// and may be toggled while the runtime is in use.
///
/// # Example
///
/// ```
/// use dollar_core::api::RuntimeOptions;
///
/// let options = RuntimeOptions {
///     fail_fast: true,
///     max_depth: 200,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Surface unhandled errors at the root scope as `Err` instead of
    /// converting them into error values.
    ///
    /// Default: false
    pub fail_fast: bool,

    /// Maximum nesting of lambda evaluation and notification on one thread.
    ///
    /// Default: 1000
    pub max_depth: usize,

    /// Log scope operations (declare, set, sub-scope creation).
    ///
    /// Default: false
    pub debug_scope: bool,

    /// Log listener registration and notification.
    ///
    /// Default: false
    pub debug_events: bool,

    /// Minimum collection size before a parallel fix uses the thread pool.
    ///
    /// Default: 2
    pub parallel_threshold: usize,

    /// Learned type predictions older than this are dropped on load.
    ///
    /// Set to `None` to keep them forever.
    ///
    /// Default: 7 days
    pub prediction_expiry: Option<Duration>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_depth: 1000,
            debug_scope: false,
            debug_events: false,
            parallel_threshold: 2,
            prediction_expiry: Some(Duration::from_secs(7 * 24 * 60 * 60)),
        }
    }
}

/// Live runtime flags, shared by every scope of a runtime.
#[derive(Debug)]
pub struct Configuration {
    fail_fast: AtomicBool,
    debug_scope: AtomicBool,
    debug_events: AtomicBool,
    max_depth: AtomicUsize,
    parallel_threshold: AtomicUsize,
    prediction_expiry: Option<Duration>,
}

impl Configuration {
    pub fn new(options: &RuntimeOptions) -> Self {
        Self {
            fail_fast: AtomicBool::new(options.fail_fast),
            debug_scope: AtomicBool::new(options.debug_scope),
            debug_events: AtomicBool::new(options.debug_events),
            max_depth: AtomicUsize::new(options.max_depth),
            parallel_threshold: AtomicUsize::new(options.parallel_threshold),
            prediction_expiry: options.prediction_expiry,
        }
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast.load(Ordering::Relaxed)
    }

    pub fn set_fail_fast(&self, value: bool) {
        self.fail_fast.store(value, Ordering::Relaxed);
    }

    pub fn debug_scope(&self) -> bool {
        self.debug_scope.load(Ordering::Relaxed)
    }

    pub fn set_debug_scope(&self, value: bool) {
        self.debug_scope.store(value, Ordering::Relaxed);
    }

    pub fn debug_events(&self) -> bool {
        self.debug_events.load(Ordering::Relaxed)
    }

    pub fn set_debug_events(&self, value: bool) {
        self.debug_events.store(value, Ordering::Relaxed);
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth.load(Ordering::Relaxed)
    }

    pub fn set_max_depth(&self, value: usize) {
        self.max_depth.store(value, Ordering::Relaxed);
    }

    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold.load(Ordering::Relaxed)
    }

    pub fn set_parallel_threshold(&self, value: usize) {
        self.parallel_threshold.store(value, Ordering::Relaxed);
    }

    pub fn prediction_expiry(&self) -> Option<Duration> {
        self.prediction_expiry
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(&RuntimeOptions::default())
    }
}
