//! Decoding of binlog rows events.

use mysql_async::binlog::events::{Event, EventData, RowsEventData};
use mysql_async::BinlogStream;
use mystream_core::{MutationKind, RowImage};

use crate::convert::{convert_binlog_row, expand_image, flatten_images};
use crate::error::{MySqlError, MySqlResult};

/// Rows of one binlog rows event, before column names are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRows {
    pub schema: String,
    pub table: String,
    pub kind: MutationKind,
    pub images: Vec<RowImage>,
}

impl DecodedRows {
    /// Widest image in the event.
    pub fn width(&self) -> usize {
        self.images.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Decode a rows event. Other events yield `None`.
///
/// Images are expanded to the full table width, so a column left out of
/// a minimal row image reads as NULL.
pub fn decode_rows_event(stream: &BinlogStream, event: &Event) -> MySqlResult<Option<DecodedRows>> {
    let Some(EventData::RowsEvent(data)) = event.read_data()? else {
        return Ok(None);
    };

    let table_id = data.table_id();
    let tme = stream
        .get_tme(table_id)
        .ok_or(MySqlError::MissingTableMap(table_id))?;

    let width = data.num_columns() as usize;
    let before_cols = data
        .columns_before_image()
        .map(|bits| present_columns(width, |i| bits.get(i).as_deref().copied().unwrap_or(false)))
        .unwrap_or_default();
    let after_cols = data
        .columns_after_image()
        .map(|bits| present_columns(width, |i| bits.get(i).as_deref().copied().unwrap_or(false)))
        .unwrap_or_default();

    let rows_kind = RowsEventKind::of(&data);
    let mut pairs = Vec::new();
    for row in data.rows(tme) {
        let (before, after) = row?;
        pairs.push((
            before.map(|row| expand_image(convert_binlog_row(row), &before_cols)),
            after.map(|row| expand_image(convert_binlog_row(row), &after_cols)),
        ));
    }

    Ok(Some(DecodedRows {
        schema: tme.database_name().into_owned(),
        table: tme.table_name().into_owned(),
        images: flatten_images(pairs, rows_kind.paired()),
        kind: rows_kind.mutation_kind(),
    }))
}

fn present_columns(width: usize, is_set: impl Fn(usize) -> bool) -> Vec<bool> {
    (0..width).map(is_set).collect()
}

/// Shape of a binlog rows event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowsEventKind {
    Write,
    Update,
    Delete,
    PartialUpdate,
}

impl RowsEventKind {
    fn of(data: &RowsEventData<'_>) -> Self {
        match data {
            RowsEventData::WriteRowsEventV1(_) | RowsEventData::WriteRowsEvent(_) => Self::Write,
            RowsEventData::UpdateRowsEventV1(_) | RowsEventData::UpdateRowsEvent(_) => Self::Update,
            RowsEventData::DeleteRowsEventV1(_) | RowsEventData::DeleteRowsEvent(_) => Self::Delete,
            RowsEventData::PartialUpdateRowsEvent(_) => Self::PartialUpdate,
        }
    }

    fn mutation_kind(self) -> MutationKind {
        match self {
            Self::Write => MutationKind::Insert,
            Self::Update => MutationKind::Update,
            Self::Delete => MutationKind::Delete,
            Self::PartialUpdate => MutationKind::Other("partial_update".to_string()),
        }
    }

    /// Whether rows come as before, after pairs.
    fn paired(self) -> bool {
        matches!(self, Self::Update | Self::PartialUpdate)
    }
}
