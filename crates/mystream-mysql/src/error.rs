use thiserror::Error;

/// Errors raised while talking to a MySQL or MariaDB source.
#[derive(Debug, Error)]
pub enum MySqlError {
    #[error("invalid source address: {0}")]
    InvalidAddr(String),

    #[error("mysql error: {0}")]
    Driver(#[from] mysql_async::Error),

    #[error("failed to decode binlog event: {0}")]
    Decode(#[from] std::io::Error),

    #[error("binary logging is disabled on the source")]
    BinlogDisabled,

    #[error("no table map for table id {0}")]
    MissingTableMap(u64),

    #[error("session is closed")]
    Closed,
}

pub type MySqlResult<T> = Result<T, MySqlError>;

impl From<MySqlError> for mystream_core::Error {
    fn from(err: MySqlError) -> Self {
        mystream_core::Error::Replication(err.to_string())
    }
}
