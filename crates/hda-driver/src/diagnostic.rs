//! Result tiers
//!
//! A [`Diagnostic`] wraps the outcome of a best-effort step: it is always
//! logged and never stops the pipeline. A [`Fatal`] result aborts the
//! pipeline and determines the exit code.

use crate::error::PipelineError;
use std::fmt;

/// Result of a step whose failure aborts the pipeline
pub type Fatal<T> = Result<T, PipelineError>;

/// Outcome of a best-effort step
#[derive(Debug)]
#[must_use = "diagnostics must be reported"]
pub struct Diagnostic<T, E> {
    what: &'static str,
    outcome: Result<T, E>,
}

impl<T, E: fmt::Display> Diagnostic<T, E> {
    /// Wrap the outcome of the step named `what`
    pub const fn new(what: &'static str, outcome: Result<T, E>) -> Self {
        Self { what, outcome }
    }

    /// Whether the step succeeded
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Borrow the outcome without reporting it
    pub const fn outcome(&self) -> &Result<T, E> {
        &self.outcome
    }

    /// Log the outcome and keep the value, if any
    pub fn report(self) -> Option<T> {
        match self.outcome {
            Ok(value) => {
                tracing::debug!("{}: ok", self.what);
                Some(value)
            }
            Err(e) => {
                tracing::warn!("{} failed (continuing): {e}", self.what);
                None
            }
        }
    }
}
