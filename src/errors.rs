//! Attribute Database Error Hierarchy
//!
//! A single status-like error type shared by the schema, tree, query and
//! data source layers. Independent failures collected during one Get/Set are
//! folded into [`Error::Aggregated`] so partial results can still be returned.

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Path/schema mismatch, wrong cardinality or a value of the wrong kind
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing attribute, group or repeated index
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation is not allowed in the current state (e.g. setting a read-only attribute)
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Broken engine invariant or a request the engine cannot reconcile
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Several independent failures reported together
    #[error("{} errors occurred: {}", .0.len(), join_messages(.0))]
    Aggregated(Vec<Error>),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A fan-out task panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

fn join_messages(errors: &[Error]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

impl Error {
    /// Folds a list of independent failures into one status.
    ///
    /// No errors is success, a single error is returned as is, and anything
    /// more becomes [`Error::Aggregated`]. Nested aggregates are flattened.
    pub fn aggregate(errors: Vec<Error>) -> Result<()> {
        let mut flat = Vec::with_capacity(errors.len());
        for e in errors {
            match e {
                Error::Aggregated(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Ok(()),
            1 => Err(flat.remove(0)),
            _ => Err(Error::Aggregated(flat)),
        }
    }

    /// Returns every leaf error contained in this one.
    pub fn errors(&self) -> Vec<&Error> {
        match self {
            Error::Aggregated(inner) => inner.iter().flat_map(|e| e.errors()).collect(),
            other => vec![other],
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_failed_precondition(&self) -> bool {
        matches!(self, Error::FailedPrecondition(_))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}

/// Appends the error of `result`, if any, to `errors`.
pub(crate) fn append_if_error<T>(
    errors: &mut Vec<Error>,
    result: Result<T>,
) {
    if let Err(e) = result {
        errors.push(e);
    }
}
