//! Error types for the `emotionsim-db` crate.

/// Errors that can occur in the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Serialization of a record column failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be mapped back onto a typed field.
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}
