pub mod channel;
pub mod error;
pub mod input;
pub mod message;
pub mod mock;
pub mod replication;
pub mod settings;
pub mod translator;
pub mod types;

pub use channel::{event_channel, EventReceiver, EventSender};
pub use error::{Error, Result};
pub use input::{Input, StreamInput};
pub use message::{decode_data, encode_data, noop_ack, AckFn, Delivery, Message, META_EVENT, META_TABLE};
pub use replication::{
    split_addr, Flavor, Position, ReplicationClient, ReplicationSession, RowHandler, SessionConfig,
    TlsOptions, DEFAULT_MYSQL_PORT,
};
pub use settings::ConnectorSettings;
pub use translator::{translate, Translator};
pub use types::{ChangeEvent, Column, MutationKind, Operation, RowImage, RowMap, RowsNotification, TableSchema, Value};
