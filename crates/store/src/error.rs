//! Store failure kinds.

/// Failure kinds surfaced by store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A uniqueness or concurrent-modification conflict.
    #[error("conflict: {0}")]
    Conflict(String),
    /// A temporary failure; the caller may retry.
    #[error("transient: {0}")]
    Transient(String),
    /// An unrecoverable failure (e.g. journal IO).
    #[error("fatal: {0}")]
    Fatal(String),
}

impl StoreError {
    /// Returns `true` if the operation may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
