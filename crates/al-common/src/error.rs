//! Error types for the shared data model.

use thiserror::Error;

/// Result type alias for data model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the shared data model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A sample was pushed into a set whose quota is already filled.
    #[error("sample set is complete ({quota} of {quota} samples)")]
    SetComplete { quota: usize },

    /// A row was built from a sample set that is still missing samples.
    #[error("sample set is incomplete ({filled} of {quota} samples)")]
    SetIncomplete { filled: usize, quota: usize },
}
