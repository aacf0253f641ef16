//! Runtime configuration.
//!
//! Every [`Runtime`](crate::Runtime) owns one [`Config`]. There is no global
//! configuration: two runtimes in one process never share handlers or limits.
//!
//! # Example
//!
//! ```ignore
//! use spark_ui_core::{Config, Runtime};
//!
//! let runtime = Runtime::with_config(
//!     Config::default()
//!         .max_update_count(50)
//!         .async_flush(false)
//!         .error_handler(|err| eprintln!("{err}")),
//! );
//! ```

use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Warning};
use crate::reactive::ChangePolicy;

/// Default number of times one watcher may re-run within a single flush.
pub const DEFAULT_MAX_UPDATE_COUNT: u32 = 100;

/// Handler receiving errors that were not captured by a component.
pub type ErrorHandler = Rc<dyn Fn(&Error)>;

/// Handler receiving warnings.
pub type WarnHandler = Rc<dyn Fn(&Warning)>;

/// Knobs for one reactive runtime.
#[derive(Clone)]
pub struct Config {
    /// Re-runs of one watcher per flush before it is reported as a runaway loop.
    pub max_update_count: u32,
    /// When false, invalidated watchers are flushed immediately instead of
    /// on the next deferred tick.
    pub async_flush: bool,
    /// Default dirty-check policy for watchers that do not set their own.
    pub change_policy: ChangePolicy,
    /// Suppress warnings entirely.
    pub silent: bool,
    /// Receives uncaptured errors. Falls back to `tracing::error!`.
    pub error_handler: Option<ErrorHandler>,
    /// Receives warnings. Falls back to `tracing::warn!`.
    pub warn_handler: Option<WarnHandler>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_update_count: DEFAULT_MAX_UPDATE_COUNT,
            async_flush: true,
            change_policy: ChangePolicy::default(),
            silent: false,
            error_handler: None,
            warn_handler: None,
        }
    }
}

impl Config {
    /// Set the runaway-update threshold.
    pub fn max_update_count(mut self, count: u32) -> Self {
        self.max_update_count = count;
        self
    }

    /// Choose between deferred (batched) and immediate flushing.
    pub fn async_flush(mut self, enabled: bool) -> Self {
        self.async_flush = enabled;
        self
    }

    /// Set the default dirty-check policy.
    pub fn change_policy(mut self, policy: ChangePolicy) -> Self {
        self.change_policy = policy;
        self
    }

    /// Silence warnings.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Install a central error handler.
    pub fn error_handler(mut self, handler: impl Fn(&Error) + 'static) -> Self {
        self.error_handler = Some(Rc::new(handler));
        self
    }

    /// Install a warning handler.
    pub fn warn_handler(mut self, handler: impl Fn(&Warning) + 'static) -> Self {
        self.warn_handler = Some(Rc::new(handler));
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("max_update_count", &self.max_update_count)
            .field("async_flush", &self.async_flush)
            .field("change_policy", &self.change_policy)
            .field("silent", &self.silent)
            .field("error_handler", &self.error_handler.is_some())
            .field("warn_handler", &self.warn_handler.is_some())
            .finish()
    }
}
