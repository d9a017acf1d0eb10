use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    #[error("malformed document at {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("account already exists: {0}")]
    DuplicateAccount(String),

    #[error("database lock poisoned: {0}")]
    Poisoned(String),

    #[error("background task failed: {0}")]
    Background(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
