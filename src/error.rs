//! Error types for coordinator-side freezing helpers.
//!
//! The core freeze/thaw operations report boolean outcomes; only the
//! helpers that wait on a whole task set can fail.

use thiserror::Error;

/// Errors reported while driving a freezing episode across a task set.
///
/// # Examples
///
/// ```
/// use quiesce::FreezeError;
///
/// let err = FreezeError::Timeout { frozen: 3, total: 4, stragglers: vec![12] };
/// assert_eq!(
///     err.to_string(),
///     "freezing timed out: 3/4 tasks frozen, stragglers [12]"
/// );
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FreezeError {
    /// Some targets never reached the refrigerator before the deadline.
    #[error("freezing timed out: {frozen}/{total} tasks frozen, stragglers {stragglers:?}")]
    Timeout {
        frozen: usize,
        total: usize,
        stragglers: Vec<usize>,
    },
    /// A freeze helper ran while no freezing condition was active.
    #[error("no freezing condition is active")]
    NotFreezing,
    #[error("unknown task {0}")]
    UnknownTask(usize),
}

/// Result type for coordinator helpers.
pub type FreezeResult<T> = Result<T, FreezeError>;
