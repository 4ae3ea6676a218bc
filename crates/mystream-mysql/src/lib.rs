pub mod binlog;
mod client;
pub mod column_cache;
mod connect;
pub mod convert;
mod error;
pub mod snapshot;

pub use client::{MySqlReplicationClient, MySqlSession};
pub use connect::{build_opts, connect_mysql};
pub use error::{MySqlError, MySqlResult};
