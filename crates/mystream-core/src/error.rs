use thiserror::Error;

/// Errors that can occur in mystream-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("replication stream failed: {0}")]
    Replication(String),

    #[error("unsupported mutation kind: {0}")]
    UnsupportedMutation(String),

    #[error("row image for '{table}' has {values} values but {columns} columns are declared")]
    ColumnMismatch {
        table: String,
        values: usize,
        columns: usize,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("event stream closed")]
    Closed,

    #[error("input is not connected")]
    NotConnected,

    #[error("input is already connected")]
    AlreadyConnected,
}

pub type Result<T> = std::result::Result<T, Error>;
