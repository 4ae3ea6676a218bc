use std::future::Future;

use tracing::{debug, trace};

use crate::channel::EventSender;
use crate::error::{Error, Result};
use crate::replication::RowHandler;
use crate::types::{ChangeEvent, MutationKind, Operation, RowImage, RowMap, RowsNotification, TableSchema};

/// Turns rows events into normalized change events and pushes them into the
/// event channel.
#[derive(Debug)]
pub struct Translator {
    database: String,
    sender: EventSender,
}

impl Translator {
    pub fn new(database: impl Into<String>, sender: EventSender) -> Self {
        Self {
            database: database.into(),
            sender,
        }
    }

    /// The events a notification produces, without sending them.
    pub fn translate(&self, notification: &RowsNotification) -> Result<Vec<ChangeEvent>> {
        translate(&self.database, notification)
    }

    /// Record a failure that readers will see once the channel drains.
    pub fn fail(&self, message: impl Into<String>) {
        self.sender.fail(message);
    }
}

impl RowHandler for Translator {
    fn on_rows(&self, notification: RowsNotification) -> impl Future<Output = Result<()>> + Send {
        async move {
            let events = self.translate(&notification)?;

            if !events.is_empty() {
                debug!(
                    table = %notification.table.name,
                    kind = %notification.kind,
                    count = events.len(),
                    "Translated rows event"
                );
            }

            for event in events {
                self.sender.send(event).await?;
            }
            Ok(())
        }
    }
}

/// Translate one notification for the given database.
///
/// Inserts and deletes yield one event per row image. Updates carry
/// (before, after) pairs and yield one event per pair, built from the
/// after-image.
pub fn translate(database: &str, notification: &RowsNotification) -> Result<Vec<ChangeEvent>> {
    if notification.table.schema != database {
        trace!(
            schema = %notification.table.schema,
            table = %notification.table.name,
            "Skipping rows event for another database"
        );
        return Ok(vec![]);
    }

    let (op, start, step) = match &notification.kind {
        MutationKind::Insert => (Operation::Insert, 0, 1),
        MutationKind::Delete => (Operation::Delete, 0, 1),
        MutationKind::Update => (Operation::Update, 1, 2),
        MutationKind::Other(kind) => return Err(Error::UnsupportedMutation(kind.clone())),
    };

    notification
        .rows
        .iter()
        .skip(start)
        .step_by(step)
        .map(|image| {
            Ok(ChangeEvent {
                table: notification.table.name.clone(),
                event: op,
                data: image_to_row(&notification.table, image)?,
            })
        })
        .collect()
}

/// Map values to column names by position.
fn image_to_row(table: &TableSchema, image: &RowImage) -> Result<RowMap> {
    if image.len() > table.columns.len() {
        return Err(Error::ColumnMismatch {
            table: table.name.clone(),
            values: image.len(),
            columns: table.columns.len(),
        });
    }

    Ok(table
        .columns
        .iter()
        .zip(image.iter())
        .map(|(column, value)| (column.name.clone(), value.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::event_channel;
    use crate::types::Value;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn orders() -> TableSchema {
        TableSchema::new("shop", "orders", ["id", "total"])
    }

    fn row(id: i64, total: f64) -> RowImage {
        vec![Value::Int(id), Value::Float(total)]
    }

    fn notification(kind: MutationKind, rows: Vec<RowImage>) -> RowsNotification {
        RowsNotification {
            table: orders(),
            kind,
            rows,
        }
    }

    fn data(id: i64, total: f64) -> RowMap {
        [
            ("id".to_string(), Value::Int(id)),
            ("total".to_string(), Value::Float(total)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_insert_single_row() {
        let events = translate("shop", &notification(MutationKind::Insert, vec![row(1, 9.99)])).unwrap();

        assert_eq!(
            events,
            vec![ChangeEvent {
                table: "orders".into(),
                event: Operation::Insert,
                data: data(1, 9.99),
            }]
        );
    }

    #[test]
    fn test_insert_and_delete_one_event_per_image() {
        let rows = vec![row(1, 1.0), row(2, 2.0), row(3, 3.0)];

        for kind in [MutationKind::Insert, MutationKind::Delete] {
            let events = translate("shop", &notification(kind.clone(), rows.clone())).unwrap();
            assert_eq!(events.len(), 3);
            for (i, event) in events.iter().enumerate() {
                assert_eq!(Some(event.event), kind.operation());
                assert_eq!(event.data, data(i as i64 + 1, (i + 1) as f64));
            }
        }
    }

    #[test]
    fn test_update_uses_after_images_only() {
        let rows = vec![row(1, 9.99), row(1, 19.99), row(2, 5.0), row(2, 6.0)];
        let events = translate("shop", &notification(MutationKind::Update, rows)).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, Operation::Update);
        assert_eq!(events[0].data, data(1, 19.99));
        assert_eq!(events[1].data, data(2, 6.0));
    }

    #[test]
    fn test_other_database_produces_nothing() {
        let mut n = notification(MutationKind::Insert, vec![row(1, 9.99)]);
        n.table.schema = "other_db".into();

        assert!(translate("shop", &n).unwrap().is_empty());
    }

    #[test]
    fn test_other_database_skipped_before_kind_check() {
        let mut n = notification(MutationKind::Other("partial_update".into()), vec![]);
        n.table.schema = "other_db".into();

        assert!(translate("shop", &n).unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_kind_errors() {
        let n = notification(MutationKind::Other("partial_update".into()), vec![row(1, 1.0)]);

        match translate("shop", &n) {
            Err(Error::UnsupportedMutation(kind)) => assert_eq!(kind, "partial_update"),
            other => panic!("Expected UnsupportedMutation, got {:?}", other),
        }
    }

    #[test]
    fn test_columns_follow_declared_order() {
        let table = TableSchema::new("shop", "orders", ["b", "a"]);
        let n = RowsNotification {
            table,
            kind: MutationKind::Insert,
            rows: vec![vec![Value::Int(1), Value::Int(2)]],
        };

        let events = translate("shop", &n).unwrap();
        assert_eq!(events[0].data.get("b"), Some(&Value::Int(1)));
        assert_eq!(events[0].data.get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_too_many_values_errors() {
        let n = notification(
            MutationKind::Insert,
            vec![vec![Value::Int(1), Value::Int(2), Value::Int(3)]],
        );

        assert!(matches!(
            translate("shop", &n),
            Err(Error::ColumnMismatch { values: 3, columns: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_on_rows_sends_in_order() {
        let (tx, rx) = event_channel(CancellationToken::new());
        let translator = Translator::new("shop", tx);
        let cancel = CancellationToken::new();

        let n = notification(MutationKind::Insert, vec![row(1, 1.0), row(2, 2.0)]);
        let producer = tokio::spawn(async move { translator.on_rows(n).await });

        assert_eq!(rx.recv(&cancel).await.unwrap().data, data(1, 1.0));
        assert_eq!(rx.recv(&cancel).await.unwrap().data, data(2, 2.0));
        producer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_on_rows_blocks_on_full_channel() {
        let (tx, rx) = event_channel(CancellationToken::new());
        let translator = Translator::new("shop", tx);
        let cancel = CancellationToken::new();

        let n = notification(MutationKind::Insert, vec![row(1, 1.0), row(2, 2.0)]);
        let pending = tokio::time::timeout(Duration::from_millis(50), translator.on_rows(n)).await;
        assert!(pending.is_err(), "second row should wait for the reader");

        assert_eq!(rx.recv(&cancel).await.unwrap().data, data(1, 1.0));
    }

    #[tokio::test]
    async fn test_on_rows_unsupported_sends_nothing() {
        let (tx, rx) = event_channel(CancellationToken::new());
        let translator = Translator::new("shop", tx);

        let n = notification(MutationKind::Other("truncate".into()), vec![row(1, 1.0)]);
        assert!(translator.on_rows(n).await.is_err());
        drop(translator);

        assert!(matches!(
            rx.recv(&CancellationToken::new()).await,
            Err(Error::Closed)
        ));
    }
}
