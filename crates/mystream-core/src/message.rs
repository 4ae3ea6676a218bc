use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{ChangeEvent, RowMap};

/// Metadata key carrying the source table name.
pub const META_TABLE: &str = "table";
/// Metadata key carrying the normalized operation.
pub const META_EVENT: &str = "event";

/// An encoded change event handed to the host pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: Vec<u8>,
    metadata: BTreeMap<String, String>,
}

impl Message {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            metadata: BTreeMap::new(),
        }
    }

    /// Encode a change event: `data` becomes the JSON payload, `table` and
    /// `event` travel as metadata.
    pub fn from_event(event: &ChangeEvent) -> Result<Self> {
        let mut message = Self::new(encode_data(&event.data)?);
        message.meta_set(META_TABLE, &event.table);
        message.meta_set(META_EVENT, event.event.as_str());
        Ok(message)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn meta_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn meta_get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Decode the payload back into a row map.
    pub fn decode_data(&self) -> Result<RowMap> {
        decode_data(&self.payload)
    }
}

/// Outcome the host reports when acknowledging a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed(String),
}

/// Acknowledgement callback returned with every message.
pub type AckFn = Box<dyn FnOnce(Delivery) -> Result<()> + Send + Sync>;

/// An acknowledgement that ignores the outcome and always succeeds.
///
/// Redelivery on failure is left to the host pipeline.
pub fn noop_ack() -> AckFn {
    Box::new(|_delivery| Ok(()))
}

/// Encode row data as a JSON object.
pub fn encode_data(data: &RowMap) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(data)?)
}

/// Decode a JSON object produced by [`encode_data`].
pub fn decode_data(payload: &[u8]) -> Result<RowMap> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Operation, Value};

    fn orders_event() -> ChangeEvent {
        ChangeEvent {
            table: "orders".into(),
            event: Operation::Insert,
            data: [
                ("id".to_string(), Value::Int(1)),
                ("total".to_string(), Value::Float(9.99)),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn test_message_from_event() {
        let message = Message::from_event(&orders_event()).unwrap();

        assert_eq!(message.meta_get(META_TABLE), Some("orders"));
        assert_eq!(message.meta_get(META_EVENT), Some("insert"));
        assert_eq!(message.payload(), br#"{"id":1,"total":9.99}"#);
    }

    #[test]
    fn test_data_roundtrip() {
        let data: RowMap = [
            ("id".to_string(), Value::Int(-7)),
            ("big".to_string(), Value::UInt(u64::MAX)),
            ("price".to_string(), Value::Float(19.99)),
            ("name".to_string(), Value::String("widget".into())),
            ("active".to_string(), Value::Bool(true)),
            ("note".to_string(), Value::Null),
            (
                "tags".to_string(),
                Value::Array(vec![Value::String("a".into()), Value::Int(2)]),
            ),
            (
                "attrs".to_string(),
                Value::Object([("color".to_string(), Value::String("red".into()))].into_iter().collect()),
            ),
        ]
        .into_iter()
        .collect();

        let decoded = decode_data(&encode_data(&data).unwrap()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(decode_data(b"[1,2,3]").is_err());
    }

    #[test]
    fn test_noop_ack_always_succeeds() {
        assert!(noop_ack()(Delivery::Delivered).is_ok());
        assert!(noop_ack()(Delivery::Failed("sink unavailable".into())).is_ok());
    }
}
