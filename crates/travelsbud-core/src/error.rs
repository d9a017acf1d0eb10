use thiserror::Error;

use travelsbud_db::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not signed in")]
    Unauthenticated,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store write failed ({op}): {source}")]
    StoreWrite {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("store read failed ({op}): {source}")]
    StoreRead {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("blob storage failed: {0}")]
    Blob(String),
}

impl CoreError {
    /// Map a store failure during a write step named `op`.
    pub(crate) fn write(op: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| match source {
            StoreError::NotFound(path) => Self::NotFound(path),
            source => Self::StoreWrite { op, source },
        }
    }

    /// Map a store failure during a read step named `op`.
    pub(crate) fn read(op: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| match source {
            StoreError::NotFound(path) => Self::NotFound(path),
            source => Self::StoreRead { op, source },
        }
    }
}

/// Failures surfacing outside an explicitly named step: begin, commit,
/// or the background task running the transaction.
impl From<StoreError> for CoreError {
    fn from(source: StoreError) -> Self {
        Self::write("commit")(source)
    }
}
