//! The kinds of error which the model can report.
//!
//! Most functions in this crate return [`anyhow::Result`] so that context can be attached as errors
//! propagate. Where a caller needs to know what *kind* of failure occurred, the root cause is one of
//! the variants of [`EioError`], which can be recovered with
//! [`anyhow::Error::downcast_ref`].
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// An error raised while loading or querying the model
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EioError {
    /// Input tables are structurally inconsistent with each other
    #[error("data integrity: {0}")]
    DataIntegrity(String),
    /// A named item (sheet, sector, pollutant, population etc.) does not exist
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What sort of thing was being looked up
        kind: &'static str,
        /// The name that was requested
        name: String,
    },
    /// A final demand category code is missing from a demand table
    #[error("missing final demand category {code} in {table}")]
    MissingCategory {
        /// The category code that was looked for
        code: String,
        /// Which table was being read
        table: String,
    },
    /// A cell could not be parsed as a number
    #[error("could not parse {value:?} as a number: {reason}")]
    Parse {
        /// The offending cell contents
        value: String,
        /// Why parsing failed
        reason: String,
    },
    /// Computing a cached value failed. Every caller waiting on the value receives this error.
    #[error(transparent)]
    Computation(ComputationError),
    /// The request was cancelled before it was dispatched
    #[error("request {0} cancelled")]
    Cancelled(String),
}

impl EioError {
    /// Shorthand for creating a [`EioError::NotFound`]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

/// The failure of a cached computation, shared between every request which was waiting on it.
///
/// The underlying error is kept as the source, so its kind can still be found with [`error_kind`].
#[derive(Debug, Clone)]
pub struct ComputationError {
    key: String,
    cause: Arc<anyhow::Error>,
}

impl ComputationError {
    /// Wrap the error raised while computing the value for `key`
    pub fn new(key: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            key: key.into(),
            cause: Arc::new(cause),
        }
    }

    /// The cache key of the failed computation
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ComputationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "computing {}", self.key)
    }
}

impl std::error::Error for ComputationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&**self.cause)
    }
}

impl PartialEq for ComputationError {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && format!("{:#}", self.cause) == format!("{:#}", other.cause)
    }
}

/// Get the [`EioError`] at the root of `err`, if there is one.
///
/// Failed cached computations are looked through, so the kind of the underlying failure is
/// returned rather than [`EioError::Computation`] where there is one.
pub fn error_kind(err: &anyhow::Error) -> Option<&EioError> {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<EioError>())
        .last()
}
