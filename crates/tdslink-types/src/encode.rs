//! Encoding [`SqlValue`]s for RPC parameters and bulk-copy rows.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use tdslink_protocol::{ColumnMeta, MAX_SENTINEL, PLP_NULL, RpcParam, TypeId};

use crate::codepage;
use crate::error::TypeError;
use crate::numeric;
use crate::value::SqlValue;

fn date_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn datetime_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

// =============================================================================
// RPC parameters
// =============================================================================

/// Choose a wire type for `value` and encode it as an RPC parameter.
pub fn to_param(name: &str, value: &SqlValue) -> Result<RpcParam, TypeError> {
    let (meta, body) = match value {
        SqlValue::Null => {
            let meta = ColumnMeta::new("", TypeId::IntN).with_max_length(4);
            return Ok(RpcParam::null(name, meta));
        }
        SqlValue::Bit(v) => {
            let mut buf = BytesMut::with_capacity(1);
            buf.put_u8(u8::from(*v));
            (
                ColumnMeta::new("", TypeId::BitN).with_max_length(1),
                buf.freeze(),
            )
        }
        SqlValue::TinyInt(v) => int_param(1, i64::from(*v)),
        SqlValue::SmallInt(v) => int_param(2, i64::from(*v)),
        SqlValue::Int(v) => int_param(4, i64::from(*v)),
        SqlValue::BigInt(v) => int_param(8, *v),
        SqlValue::Real(v) => {
            let mut buf = BytesMut::with_capacity(4);
            buf.put_f32_le(*v);
            (
                ColumnMeta::new("", TypeId::FloatN).with_max_length(4),
                buf.freeze(),
            )
        }
        SqlValue::Float(v) => {
            let mut buf = BytesMut::with_capacity(8);
            buf.put_f64_le(*v);
            (
                ColumnMeta::new("", TypeId::FloatN).with_max_length(8),
                buf.freeze(),
            )
        }
        SqlValue::Decimal(d) => {
            let scale = d.scale() as u8;
            let precision = decimal_precision(d).max(scale).min(38);
            let (sign, magnitude) = numeric::decimal_to_wire(d, precision, scale, name)?;
            let mut buf = BytesMut::new();
            buf.put_u8(sign);
            buf.put_slice(&numeric::magnitude_bytes(magnitude, precision));
            (
                ColumnMeta::new("", TypeId::DecimalN).with_precision_scale(precision, scale),
                buf.freeze(),
            )
        }
        SqlValue::String(s) => return Ok(RpcParam::nvarchar(name, s)),
        SqlValue::Binary(b) => {
            let max_length = if b.len() > 8000 {
                MAX_SENTINEL
            } else {
                b.len().max(1) as u32
            };
            (
                ColumnMeta::new("", TypeId::BigVarBinary).with_max_length(max_length),
                b.clone(),
            )
        }
        SqlValue::Uuid(u) => {
            let mut buf = BytesMut::with_capacity(16);
            put_guid(&mut buf, u);
            (
                ColumnMeta::new("", TypeId::Guid).with_max_length(16),
                buf.freeze(),
            )
        }
        SqlValue::Date(d) => {
            let mut buf = BytesMut::with_capacity(3);
            put_day_number(&mut buf, *d, "@date")?;
            (ColumnMeta::new("", TypeId::Date), buf.freeze())
        }
        SqlValue::Time(t) => {
            let mut buf = BytesMut::with_capacity(5);
            put_time_ticks(&mut buf, *t, 7);
            (
                ColumnMeta::new("", TypeId::Time).with_scale(7),
                buf.freeze(),
            )
        }
        SqlValue::DateTime(dt) => {
            let mut buf = BytesMut::with_capacity(8);
            put_time_ticks(&mut buf, dt.time(), 7);
            put_day_number(&mut buf, dt.date(), "@datetime")?;
            (
                ColumnMeta::new("", TypeId::DateTime2).with_scale(7),
                buf.freeze(),
            )
        }
        SqlValue::DateTimeOffset(dto) => {
            let utc = dto.naive_utc();
            let offset_minutes = (dto.offset().local_minus_utc() / 60) as i16;
            let mut buf = BytesMut::with_capacity(10);
            put_time_ticks(&mut buf, utc.time(), 7);
            put_day_number(&mut buf, utc.date(), "@datetimeoffset")?;
            buf.put_i16_le(offset_minutes);
            (
                ColumnMeta::new("", TypeId::DateTimeOffset).with_scale(7),
                buf.freeze(),
            )
        }
        SqlValue::Xml(x) => {
            let mut buf = BytesMut::new();
            for u in x.encode_utf16() {
                buf.put_u16_le(u);
            }
            (ColumnMeta::new("", TypeId::Xml), buf.freeze())
        }
    };

    Ok(RpcParam::new(name, meta, body))
}

fn int_param(width: u32, value: i64) -> (ColumnMeta, Bytes) {
    let mut buf = BytesMut::with_capacity(width as usize);
    match width {
        1 => buf.put_u8(value as u8),
        2 => buf.put_i16_le(value as i16),
        4 => buf.put_i32_le(value as i32),
        _ => buf.put_i64_le(value),
    }
    (
        ColumnMeta::new("", TypeId::IntN).with_max_length(width),
        buf.freeze(),
    )
}

fn decimal_precision(d: &Decimal) -> u8 {
    let mut mantissa = d.mantissa().unsigned_abs();
    let mut digits = 1u8;
    while mantissa >= 10 {
        mantissa /= 10;
        digits += 1;
    }
    digits
}

// =============================================================================
// Shared wire primitives
// =============================================================================

/// Write a UUID in the server's mixed-endian layout: the first three groups
/// little-endian, the rest as-is.
pub fn put_guid(dst: &mut BytesMut, uuid: &uuid::Uuid) {
    let b = uuid.as_bytes();
    dst.put_slice(&[b[3], b[2], b[1], b[0], b[5], b[4], b[7], b[6]]);
    dst.put_slice(&b[8..16]);
}

/// Write a 3-byte day number (days since 0001-01-01).
pub fn put_day_number(dst: &mut BytesMut, date: NaiveDate, column: &str) -> Result<(), TypeError> {
    let days = date.signed_duration_since(date_epoch()).num_days();
    if !(0..1 << 24).contains(&days) {
        return Err(TypeError::out_of_range(column, "DATE"));
    }
    dst.put_u8(days as u8);
    dst.put_u8((days >> 8) as u8);
    dst.put_u8((days >> 16) as u8);
    Ok(())
}

/// Write time-of-day ticks at `scale` (3/4/5 bytes).
pub fn put_time_ticks(dst: &mut BytesMut, time: NaiveTime, scale: u8) {
    let ticks7 = u64::from(time.num_seconds_from_midnight()) * 10_000_000
        + u64::from(time.nanosecond()) / 100;
    let stored = ticks7 / 10u64.pow(7 - u32::from(scale.min(7)));

    let width = TypeId::time_width(scale);
    dst.put_slice(&stored.to_le_bytes()[..width]);
}

/// Write an 8-byte DATETIME (day count since 1900, 1/300s ticks).
pub fn put_datetime(dst: &mut BytesMut, dt: NaiveDateTime, column: &str) -> Result<(), TypeError> {
    let days = dt.date().signed_duration_since(datetime_epoch()).num_days();
    if i32::try_from(days).is_err() {
        return Err(TypeError::out_of_range(column, "DATETIME"));
    }

    let nanos = u64::from(dt.time().num_seconds_from_midnight()) * 1_000_000_000
        + u64::from(dt.time().nanosecond());
    let ticks = (u128::from(nanos) * 3 / 10_000_000) as u32;

    dst.put_i32_le(days as i32);
    dst.put_u32_le(ticks);
    Ok(())
}

/// Write a 4-byte SMALLDATETIME (unsigned day count, minutes).
pub fn put_smalldatetime(
    dst: &mut BytesMut,
    dt: NaiveDateTime,
    column: &str,
) -> Result<(), TypeError> {
    let days = dt.date().signed_duration_since(datetime_epoch()).num_days();
    if !(0..=65_535).contains(&days) {
        return Err(TypeError::out_of_range(column, "SMALLDATETIME"));
    }

    let minutes = dt.time().num_seconds_from_midnight() / 60;
    dst.put_u16_le(days as u16);
    dst.put_u16_le(minutes as u16);
    Ok(())
}

fn money_ten_thousandths(d: &Decimal, column: &str) -> Result<i64, TypeError> {
    let negative = d.is_sign_negative();
    let magnitude = numeric::rescale_magnitude(
        d.mantissa().unsigned_abs(),
        d.scale() as u8,
        4,
        38,
        column,
    )?;

    if magnitude > i64::MAX as u128 {
        return Err(TypeError::out_of_range(column, "MONEY"));
    }

    let v = magnitude as i64;
    Ok(if negative { -v } else { v })
}

// =============================================================================
// Bulk-copy cells
// =============================================================================

/// Encode one bulk-copy row cell for `col`.
///
/// Bulk rows use the row-token value layout with explicit null markers: a
/// zero length byte for byte-length types, 0xFFFF for short variable types
/// and the 8-byte PLP sentinel for `(MAX)` columns. MAX columns carry the
/// chunk/terminator framing even when non-empty.
pub fn encode_bcp_cell(
    col: &ColumnMeta,
    value: &SqlValue,
    dst: &mut BytesMut,
) -> Result<(), TypeError> {
    let ty = col.type_id;

    if value.is_null() {
        if col.is_plp() {
            dst.put_u64_le(PLP_NULL);
        } else if ty.is_short_len() {
            dst.put_u16_le(0xFFFF);
        } else {
            dst.put_u8(0);
        }
        return Ok(());
    }

    match ty {
        TypeId::IntN => {
            let v = integer_value(value, col)?;
            put_checked_int(dst, v, col)
        }
        TypeId::BitN => {
            let v = value
                .as_bool()
                .ok_or_else(|| TypeError::unsupported(value.type_name(), "BIT", &col.name))?;
            dst.put_u8(1);
            dst.put_u8(u8::from(v));
            Ok(())
        }
        TypeId::FloatN => {
            let v = float_value(value, col)?;
            if col.max_length == 4 {
                dst.put_u8(4);
                dst.put_f32_le(v as f32);
            } else {
                dst.put_u8(8);
                dst.put_f64_le(v);
            }
            Ok(())
        }
        TypeId::MoneyN => {
            let d = decimal_value(value, col)?;
            let v = money_ten_thousandths(&d, &col.name)?;
            if col.max_length == 4 {
                if i32::try_from(v).is_err() {
                    return Err(TypeError::out_of_range(&col.name, "SMALLMONEY"));
                }
                dst.put_u8(4);
                dst.put_i32_le(v as i32);
            } else {
                dst.put_u8(8);
                dst.put_i32_le((v >> 32) as i32);
                dst.put_u32_le(v as u32);
            }
            Ok(())
        }
        TypeId::DateTimeN => {
            let dt = datetime_value(value, col)?;
            if col.max_length == 4 {
                dst.put_u8(4);
                put_smalldatetime(dst, dt, &col.name)
            } else {
                dst.put_u8(8);
                put_datetime(dst, dt, &col.name)
            }
        }
        TypeId::Date => {
            let d = match value {
                SqlValue::Date(d) => *d,
                SqlValue::DateTime(dt) => dt.date(),
                other => {
                    return Err(TypeError::unsupported(other.type_name(), "DATE", &col.name));
                }
            };
            dst.put_u8(3);
            put_day_number(dst, d, &col.name)
        }
        TypeId::Time => {
            let t = match value {
                SqlValue::Time(t) => *t,
                SqlValue::DateTime(dt) => dt.time(),
                other => {
                    return Err(TypeError::unsupported(other.type_name(), "TIME", &col.name));
                }
            };
            dst.put_u8(TypeId::time_width(col.scale) as u8);
            put_time_ticks(dst, t, col.scale);
            Ok(())
        }
        TypeId::DateTime2 => {
            let dt = datetime_value(value, col)?;
            dst.put_u8((TypeId::time_width(col.scale) + 3) as u8);
            put_time_ticks(dst, dt.time(), col.scale);
            put_day_number(dst, dt.date(), &col.name)
        }
        TypeId::DateTimeOffset => {
            let dto = match value {
                SqlValue::DateTimeOffset(v) => *v,
                other => {
                    return Err(TypeError::unsupported(
                        other.type_name(),
                        "DATETIMEOFFSET",
                        &col.name,
                    ));
                }
            };
            let utc = dto.naive_utc();
            dst.put_u8((TypeId::time_width(col.scale) + 5) as u8);
            put_time_ticks(dst, utc.time(), col.scale);
            put_day_number(dst, utc.date(), &col.name)?;
            dst.put_i16_le((dto.offset().local_minus_utc() / 60) as i16);
            Ok(())
        }
        TypeId::DecimalN | TypeId::NumericN => {
            let (sign, magnitude) = match value {
                SqlValue::Decimal(d) => {
                    numeric::decimal_to_wire(d, col.precision, col.scale, &col.name)?
                }
                SqlValue::Float(f) => {
                    numeric::double_to_magnitude(*f, col.precision, col.scale, &col.name)?
                }
                other => match integer_value_opt(other) {
                    Some(v) => numeric::decimal_to_wire(
                        &Decimal::from(v),
                        col.precision,
                        col.scale,
                        &col.name,
                    )?,
                    None => {
                        return Err(TypeError::unsupported(
                            other.type_name(),
                            "DECIMAL",
                            &col.name,
                        ));
                    }
                },
            };
            let bytes = numeric::magnitude_bytes(magnitude, col.precision);
            dst.put_u8((bytes.len() + 1) as u8);
            dst.put_u8(sign);
            dst.put_slice(&bytes);
            Ok(())
        }
        TypeId::Guid => {
            let u = match value {
                SqlValue::Uuid(u) => u,
                other => {
                    return Err(TypeError::unsupported(
                        other.type_name(),
                        "UNIQUEIDENTIFIER",
                        &col.name,
                    ));
                }
            };
            dst.put_u8(16);
            put_guid(dst, u);
            Ok(())
        }
        TypeId::NVarChar | TypeId::NChar => {
            let s = string_value(value, col)?;
            let bytes: Vec<u8> = s.encode_utf16().flat_map(u16::to_le_bytes).collect();
            put_var_bytes(dst, col, &bytes)
        }
        TypeId::BigVarChar | TypeId::BigChar => {
            let s = string_value(value, col)?;
            let code_page = col.collation.map_or(1252, |c| c.code_page());
            let bytes = codepage::encode_narrow(&s, code_page)?;
            put_var_bytes(dst, col, &bytes)
        }
        TypeId::BigVarBinary | TypeId::BigBinary | TypeId::Udt => {
            let bytes = value.as_bytes().ok_or_else(|| {
                TypeError::unsupported(value.type_name(), "VARBINARY", &col.name)
            })?;
            put_var_bytes(dst, col, bytes)
        }
        TypeId::Xml => {
            let s = string_value(value, col)?;
            let bytes: Vec<u8> = s.encode_utf16().flat_map(u16::to_le_bytes).collect();
            put_plp(dst, &bytes);
            Ok(())
        }
        other => Err(TypeError::unsupported(
            value.type_name(),
            other.name(),
            &col.name,
        )),
    }
}

fn put_var_bytes(dst: &mut BytesMut, col: &ColumnMeta, bytes: &[u8]) -> Result<(), TypeError> {
    if col.is_plp() {
        put_plp(dst, bytes);
        return Ok(());
    }

    if bytes.len() > col.max_length as usize || bytes.len() >= 0xFFFF {
        return Err(TypeError::StringTooLong {
            column: col.name.clone(),
            length: bytes.len(),
            max: col.max_length as usize,
        });
    }

    dst.put_u16_le(bytes.len() as u16);
    dst.put_slice(bytes);
    Ok(())
}

fn put_plp(dst: &mut BytesMut, bytes: &[u8]) {
    dst.put_u64_le(bytes.len() as u64);
    if !bytes.is_empty() {
        dst.put_u32_le(bytes.len() as u32);
        dst.put_slice(bytes);
    }
    dst.put_u32_le(0);
}

fn integer_value_opt(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Bit(v) => Some(i64::from(*v)),
        _ => value.as_i64(),
    }
}

fn integer_value(value: &SqlValue, col: &ColumnMeta) -> Result<i64, TypeError> {
    integer_value_opt(value)
        .ok_or_else(|| TypeError::unsupported(value.type_name(), "INT", &col.name))
}

fn float_value(value: &SqlValue, col: &ColumnMeta) -> Result<f64, TypeError> {
    value
        .as_f64()
        .or_else(|| value.as_i64().map(|v| v as f64))
        .ok_or_else(|| TypeError::unsupported(value.type_name(), "FLOAT", &col.name))
}

fn decimal_value(value: &SqlValue, col: &ColumnMeta) -> Result<Decimal, TypeError> {
    match value {
        SqlValue::Decimal(d) => Ok(*d),
        other => integer_value_opt(other)
            .map(Decimal::from)
            .ok_or_else(|| TypeError::unsupported(other.type_name(), "DECIMAL", &col.name)),
    }
}

fn datetime_value(value: &SqlValue, col: &ColumnMeta) -> Result<NaiveDateTime, TypeError> {
    match value {
        SqlValue::DateTime(dt) => Ok(*dt),
        SqlValue::Date(d) => d
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| TypeError::InvalidDateTime("midnight".to_string())),
        other => Err(TypeError::unsupported(
            other.type_name(),
            "DATETIME",
            &col.name,
        )),
    }
}

fn string_value(value: &SqlValue, col: &ColumnMeta) -> Result<String, TypeError> {
    match value {
        SqlValue::String(s) | SqlValue::Xml(s) => Ok(s.clone()),
        other => Err(TypeError::unsupported(
            other.type_name(),
            col.type_id.name(),
            &col.name,
        )),
    }
}

fn put_checked_int(dst: &mut BytesMut, v: i64, col: &ColumnMeta) -> Result<(), TypeError> {
    match col.max_length {
        1 => {
            let v = u8::try_from(v)
                .map_err(|_| TypeError::out_of_range(&col.name, "TINYINT"))?;
            dst.put_u8(1);
            dst.put_u8(v);
        }
        2 => {
            let v = i16::try_from(v)
                .map_err(|_| TypeError::out_of_range(&col.name, "SMALLINT"))?;
            dst.put_u8(2);
            dst.put_i16_le(v);
        }
        4 => {
            let v = i32::try_from(v)
                .map_err(|_| TypeError::out_of_range(&col.name, "INT"))?;
            dst.put_u8(4);
            dst.put_i32_le(v);
        }
        _ => {
            dst.put_u8(8);
            dst.put_i64_le(v);
        }
    }
    Ok(())
}
