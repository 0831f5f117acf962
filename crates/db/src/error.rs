use artgen_core::error::CoreError;

/// Errors from the ledger and record stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A domain-level error, e.g. an unknown owner account.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store could not be reached or could not complete the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// `true` when the failure is infrastructural rather than a missing or
    /// invalid entity. Callers must not assume a write happened or did not.
    pub fn is_unavailable(&self) -> bool {
        match self {
            StoreError::Core(_) => false,
            StoreError::Unavailable(_) => true,
            StoreError::Database(sqlx::Error::RowNotFound) => false,
            StoreError::Database(_) => true,
        }
    }

    /// `true` for a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::Core(CoreError::NotFound { .. })
                | StoreError::Database(sqlx::Error::RowNotFound)
        )
    }
}
