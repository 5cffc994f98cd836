//! Decoding raw row slices into [`SqlValue`]s.
//!
//! The token parser slices each column value out of the row; this module
//! interprets those bytes using the column metadata.

use bytes::Bytes;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use rust_decimal::Decimal;
use tdslink_protocol::{ColumnMeta, RawValue, TypeId};

use crate::codepage;
use crate::error::TypeError;
use crate::numeric;
use crate::value::SqlValue;

fn need(data: &[u8], n: usize) -> Result<(), TypeError> {
    if data.len() < n {
        return Err(TypeError::Truncated {
            needed: n,
            have: data.len(),
        });
    }
    Ok(())
}

/// SQL Server's DATE epoch.
fn date_epoch() -> NaiveDate {
    // 0001-01-01 always exists.
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// The DATETIME/SMALLDATETIME epoch, 1900-01-01.
fn datetime_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Decode one column value.
pub fn decode_value(col: &ColumnMeta, raw: &RawValue) -> Result<SqlValue, TypeError> {
    if raw.is_null {
        return Ok(SqlValue::Null);
    }

    let data = &raw.data;

    match col.type_id {
        TypeId::Null => Ok(SqlValue::Null),
        TypeId::Bit | TypeId::BitN => {
            need(data, 1)?;
            Ok(SqlValue::Bit(data[0] != 0))
        }
        TypeId::TinyInt => {
            need(data, 1)?;
            Ok(SqlValue::TinyInt(data[0]))
        }
        TypeId::SmallInt => decode_int(data, 2),
        TypeId::Int => decode_int(data, 4),
        TypeId::BigInt => decode_int(data, 8),
        TypeId::IntN => decode_int(data, data.len()),
        TypeId::Real => {
            need(data, 4)?;
            Ok(SqlValue::Real(f32::from_le_bytes([
                data[0], data[1], data[2], data[3],
            ])))
        }
        TypeId::Float => decode_float8(data),
        TypeId::FloatN => match data.len() {
            4 => {
                need(data, 4)?;
                Ok(SqlValue::Real(f32::from_le_bytes([
                    data[0], data[1], data[2], data[3],
                ])))
            }
            _ => decode_float8(data),
        },
        TypeId::SmallMoney => decode_money(data, 4),
        TypeId::Money => decode_money(data, 8),
        TypeId::MoneyN => decode_money(data, data.len()),
        TypeId::DateTime => decode_datetime(data),
        TypeId::SmallDateTime => decode_smalldatetime(data),
        TypeId::DateTimeN => match data.len() {
            4 => decode_smalldatetime(data),
            _ => decode_datetime(data),
        },
        TypeId::Date => decode_date(data),
        TypeId::Time => decode_time(data, col.scale),
        TypeId::DateTime2 => decode_datetime2(data, col.scale),
        TypeId::DateTimeOffset => decode_datetimeoffset(data, col.scale),
        TypeId::DecimalN | TypeId::NumericN => {
            need(data, 2)?;
            let decimal = numeric::wire_to_decimal(data[0], &data[1..], col.scale)?;
            Ok(SqlValue::Decimal(decimal))
        }
        TypeId::Guid => decode_guid(data),
        TypeId::NVarChar | TypeId::NChar | TypeId::NText => {
            Ok(SqlValue::String(decode_utf16(data)?))
        }
        TypeId::Xml => Ok(SqlValue::Xml(decode_utf16(data)?)),
        TypeId::BigVarChar | TypeId::BigChar | TypeId::Text => {
            let code_page = col
                .collation
                .map_or(1252, |c| c.code_page());
            Ok(SqlValue::String(codepage::decode_narrow(data, code_page)?))
        }
        TypeId::BigVarBinary | TypeId::BigBinary | TypeId::Image | TypeId::Udt => {
            Ok(SqlValue::Binary(Bytes::copy_from_slice(data)))
        }
    }
}

fn decode_int(data: &[u8], width: usize) -> Result<SqlValue, TypeError> {
    need(data, width)?;
    match width {
        1 => Ok(SqlValue::TinyInt(data[0])),
        2 => Ok(SqlValue::SmallInt(i16::from_le_bytes([data[0], data[1]]))),
        4 => Ok(SqlValue::Int(i32::from_le_bytes([
            data[0], data[1], data[2], data[3],
        ]))),
        8 => Ok(SqlValue::BigInt(i64::from_le_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ]))),
        other => Err(TypeError::InvalidBinary(format!(
            "integer of width {other}"
        ))),
    }
}

fn decode_float8(data: &[u8]) -> Result<SqlValue, TypeError> {
    need(data, 8)?;
    Ok(SqlValue::Float(f64::from_le_bytes([
        data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
    ])))
}

/// MONEY is a fixed-point count of 1/10000ths. The 8-byte form stores the
/// high dword first.
fn decode_money(data: &[u8], width: usize) -> Result<SqlValue, TypeError> {
    need(data, width)?;
    let ten_thousandths = match width {
        4 => i64::from(i32::from_le_bytes([data[0], data[1], data[2], data[3]])),
        8 => {
            let high = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            let low = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
            (i64::from(high) << 32) | i64::from(low)
        }
        other => {
            return Err(TypeError::InvalidBinary(format!("money of width {other}")));
        }
    };
    Ok(SqlValue::Decimal(Decimal::new(ten_thousandths, 4)))
}

fn decode_datetime(data: &[u8]) -> Result<SqlValue, TypeError> {
    need(data, 8)?;
    let days = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let ticks = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);

    let date = datetime_epoch() + Duration::days(i64::from(days));
    // Ticks are 1/300ths of a second since midnight.
    let nanos = u64::from(ticks) * 10_000_000 / 3;
    let time = time_from_nanos(nanos)?;

    Ok(SqlValue::DateTime(date.and_time(time)))
}

fn decode_smalldatetime(data: &[u8]) -> Result<SqlValue, TypeError> {
    need(data, 4)?;
    let days = u16::from_le_bytes([data[0], data[1]]);
    let minutes = u16::from_le_bytes([data[2], data[3]]);

    let date = datetime_epoch() + Duration::days(i64::from(days));
    let time = NaiveTime::from_num_seconds_from_midnight_opt(u32::from(minutes) * 60, 0)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("{minutes} minutes")))?;

    Ok(SqlValue::DateTime(date.and_time(time)))
}

fn decode_date(data: &[u8]) -> Result<SqlValue, TypeError> {
    need(data, 3)?;
    let days = read_day_number(data);
    let date = date_epoch() + Duration::days(i64::from(days));
    Ok(SqlValue::Date(date))
}

fn read_day_number(data: &[u8]) -> u32 {
    u32::from(data[0]) | (u32::from(data[1]) << 8) | (u32::from(data[2]) << 16)
}

fn read_scaled_ticks(data: &[u8], scale: u8) -> u64 {
    let mut le = [0u8; 8];
    le[..data.len().min(8)].copy_from_slice(&data[..data.len().min(8)]);
    let stored = u64::from_le_bytes(le);
    // Stored ticks are 10^(7-scale) units of 100ns each.
    stored * 10u64.pow(7 - u32::from(scale.min(7)))
}

fn time_from_nanos(nanos: u64) -> Result<NaiveTime, TypeError> {
    let secs = (nanos / 1_000_000_000) as u32;
    let nano_part = (nanos % 1_000_000_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nano_part)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("{secs} seconds from midnight")))
}

fn decode_time(data: &[u8], scale: u8) -> Result<SqlValue, TypeError> {
    let width = TypeId::time_width(scale);
    need(data, width)?;
    let ticks = read_scaled_ticks(&data[..width], scale);
    Ok(SqlValue::Time(time_from_nanos(ticks * 100)?))
}

fn decode_datetime2_parts(data: &[u8], scale: u8) -> Result<NaiveDateTime, TypeError> {
    let width = TypeId::time_width(scale);
    need(data, width + 3)?;
    let ticks = read_scaled_ticks(&data[..width], scale);
    let time = time_from_nanos(ticks * 100)?;
    let days = read_day_number(&data[width..width + 3]);
    let date = date_epoch() + Duration::days(i64::from(days));
    Ok(date.and_time(time))
}

fn decode_datetime2(data: &[u8], scale: u8) -> Result<SqlValue, TypeError> {
    Ok(SqlValue::DateTime(decode_datetime2_parts(data, scale)?))
}

fn decode_datetimeoffset(data: &[u8], scale: u8) -> Result<SqlValue, TypeError> {
    let width = TypeId::time_width(scale);
    need(data, width + 5)?;
    let utc = decode_datetime2_parts(&data[..width + 3], scale)?;
    let offset_minutes = i16::from_le_bytes([data[width + 3], data[width + 4]]);

    let offset = chrono::FixedOffset::east_opt(i32::from(offset_minutes) * 60)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("offset {offset_minutes} minutes")))?;

    // The wire carries UTC; the offset only positions the local clock.
    Ok(SqlValue::DateTimeOffset(
        offset.from_utc_datetime(&utc).fixed_offset(),
    ))
}

fn decode_guid(data: &[u8]) -> Result<SqlValue, TypeError> {
    need(data, 16)?;

    // The first three groups are little-endian on the wire.
    let bytes = [
        data[3], data[2], data[1], data[0], //
        data[5], data[4], //
        data[7], data[6], //
        data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
    ];

    Ok(SqlValue::Uuid(uuid::Uuid::from_bytes(bytes)))
}

/// Decode a UTF-16LE byte slice.
pub fn decode_utf16(data: &[u8]) -> Result<String, TypeError> {
    if data.len() % 2 != 0 {
        return Err(TypeError::InvalidEncoding(
            "UTF-16 data must have even length".to_string(),
        ));
    }

    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    String::from_utf16(&units).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
}
