//! Conversion of driver values and binlog rows into connector values.

use chrono::{NaiveDate, NaiveTime};
use mysql_async::binlog::row::BinlogRow;
use mysql_async::binlog::value::BinlogValue;
use mysql_async::Value as SqlValue;
use mystream_core::{RowImage, Value};

/// Convert a driver value.
///
/// Text and blob columns arrive as bytes: valid UTF-8 becomes a string,
/// anything else is hex encoded. Temporal values are rendered the way
/// MySQL prints them.
pub fn convert_value(value: SqlValue) -> Value {
    match value {
        SqlValue::NULL => Value::Null,
        SqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => Value::String(s),
            Err(e) => Value::String(hex::encode(e.into_bytes())),
        },
        SqlValue::Int(n) => Value::Int(n),
        SqlValue::UInt(n) => Value::from_u64(n),
        SqlValue::Float(f) => Value::Float(f64::from(f)),
        SqlValue::Double(d) => Value::Float(d),
        SqlValue::Date(year, month, day, hour, min, sec, micro) => {
            Value::String(format_date(year, month, day, hour, min, sec, micro))
        }
        SqlValue::Time(negative, days, hour, min, sec, micro) => {
            Value::String(format_time(negative, days, hour, min, sec, micro))
        }
    }
}

fn format_date(year: u16, month: u8, day: u8, hour: u8, min: u8, sec: u8, micro: u32) -> String {
    let date = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day));
    let time = NaiveTime::from_hms_micro_opt(u32::from(hour), u32::from(min), u32::from(sec), micro);

    match (date, time) {
        (Some(date), Some(_)) if hour == 0 && min == 0 && sec == 0 && micro == 0 => {
            date.format("%Y-%m-%d").to_string()
        }
        (Some(date), Some(time)) if micro == 0 => {
            date.and_time(time).format("%Y-%m-%d %H:%M:%S").to_string()
        }
        (Some(date), Some(time)) => date.and_time(time).format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        // Zero dates such as 0000-00-00 are legal in MySQL but not in chrono.
        _ if hour == 0 && min == 0 && sec == 0 && micro == 0 => {
            format!("{:04}-{:02}-{:02}", year, month, day)
        }
        _ => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            year, month, day, hour, min, sec
        ),
    }
}

fn format_time(negative: bool, days: u32, hour: u8, min: u8, sec: u8, micro: u32) -> String {
    let hours = days * 24 + u32::from(hour);
    let sign = if negative { "-" } else { "" };

    if micro == 0 {
        format!("{}{:02}:{:02}:{:02}", sign, hours, min, sec)
    } else {
        format!("{}{:02}:{:02}:{:02}.{:06}", sign, hours, min, sec, micro)
    }
}

/// Convert one decoded binlog row into a row image.
pub fn convert_binlog_row(row: BinlogRow) -> RowImage {
    row.unwrap().into_iter().map(convert_binlog_value).collect()
}

fn convert_binlog_value(value: BinlogValue<'static>) -> Value {
    match value {
        BinlogValue::Value(v) => convert_value(v),
        // JSON documents and partial JSON diffs keep their driver rendering.
        other => Value::String(format!("{:?}", other)),
    }
}

/// Spread an image over the full table width.
///
/// The binlog only carries the columns set in the image bitmap
/// (`binlog_row_image=MINIMAL` or `NOBLOB`). Absent columns become
/// `Value::Null` so values stay aligned with their column names.
pub fn expand_image(values: RowImage, present: &[bool]) -> RowImage {
    let mut values = values.into_iter();
    present
        .iter()
        .map(|&set| if set { values.next().unwrap_or(Value::Null) } else { Value::Null })
        .collect()
}

/// Flatten before/after pairs into the image order a notification expects.
///
/// Update events keep strict before, after pairing: a missing side becomes
/// an empty image so the after images stay at odd positions.
pub fn flatten_images(pairs: Vec<(Option<RowImage>, Option<RowImage>)>, paired: bool) -> Vec<RowImage> {
    let mut images = Vec::with_capacity(pairs.len() * if paired { 2 } else { 1 });

    for (before, after) in pairs {
        if paired {
            images.push(before.unwrap_or_default());
            images.push(after.unwrap_or_default());
        } else {
            images.extend(before.or(after));
        }
    }

    images
}
