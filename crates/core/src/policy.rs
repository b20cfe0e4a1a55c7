//! What happens when a GPU call fails.
//!
//! Library code always returns `Result`. The policy decides, at the engine
//! boundary, whether an unrecoverable error terminates the process or is
//! handed back to the caller.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::error;

/// Failure handling at the engine boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the error and abort the process.
    #[default]
    Abort,
    /// Return the error to the caller.
    Propagate,
}

impl FailurePolicy {
    /// Apply the policy to the outcome of `context`.
    ///
    /// Under [`FailurePolicy::Abort`] an `Err` never returns.
    ///
    /// # Example
    /// ```no_run
    /// use lumen_core::FailurePolicy;
    ///
    /// let value: Result<u32, String> = Err("device lost".into());
    /// // Logs "draw failed: device lost" and aborts.
    /// let _ = FailurePolicy::Abort.enforce("draw", value);
    /// ```
    pub fn enforce<T, E: Display>(self, context: &str, result: Result<T, E>) -> Result<T, E> {
        match (self, result) {
            (_, Ok(value)) => Ok(value),
            (FailurePolicy::Abort, Err(err)) => {
                error!("{context} failed: {err}");
                error!("Unrecoverable GPU error, aborting");
                std::process::abort()
            }
            (FailurePolicy::Propagate, Err(err)) => {
                error!("{context} failed: {err}");
                Err(err)
            }
        }
    }

    pub fn is_abort(self) -> bool {
        matches!(self, FailurePolicy::Abort)
    }
}
