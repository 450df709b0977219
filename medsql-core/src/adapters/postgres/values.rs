//! Decoding of PostgreSQL column values into [`ScalarValue`].
//!
//! Result rows arrive in the binary protocol, so a value is only read as
//! text when its binary form is its text form: enums and a short list of
//! text-like extension types. Domains decode as their base type. Ranges,
//! composites and anything else without an arm are reported as
//! unsupported rather than passed through as wire bytes.

use crate::models::ScalarValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::types::{Oid, PgInterval, PgMoney};
use sqlx::postgres::{PgRow, PgTypeInfo, PgTypeKind};
use sqlx::types::BigDecimal;
use sqlx::{Column, Decode, Postgres, Row, TypeInfo, ValueRef};

/// Non-enum types whose binary send format is their text.
const TEXT_FORMAT_TYPES: &[&str] = &["CITEXT", "XML", "UNKNOWN"];

/// Numeric sign words marking the special values.
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_POS_INF: u16 = 0xD000;
const NUMERIC_NEG_INF: u16 = 0xF000;

type Decoded = Result<Option<ScalarValue>, sqlx::Error>;

pub(crate) fn decode_row(row: &PgRow) -> Vec<ScalarValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(index, column)| decode_cell(row, index, column.type_info()))
        .collect()
}

fn decode_cell(row: &PgRow, index: usize, type_info: &PgTypeInfo) -> ScalarValue {
    let decoded = match type_info.kind() {
        PgTypeKind::Domain(base) => return decode_cell(row, index, base),
        PgTypeKind::Enum(_) => get::<String>(row, index).map(|v| v.map(ScalarValue::Text)),
        PgTypeKind::Array(element) => decode_array(row, index, element),
        PgTypeKind::Simple => decode_simple(row, index, type_info.name()),
        PgTypeKind::Pseudo | PgTypeKind::Composite(_) | PgTypeKind::Range(_) => Ok(None),
    };

    match decoded {
        Ok(Some(value)) => value,
        Ok(None) => null_or_unsupported(row, index, type_info.name()),
        Err(e) => {
            if type_info.name() == "NUMERIC" {
                if let Some(special) = raw_numeric_special(row, index) {
                    return ScalarValue::Decimal(special.to_string());
                }
            }
            tracing::debug!(
                "Could not decode column {} of type {}: {}",
                index,
                type_info.name(),
                e
            );
            unsupported(type_info.name())
        }
    }
}

/// Decodes a built-in scalar type. `Ok(None)` means SQL NULL or no arm.
fn decode_simple(row: &PgRow, index: usize, type_name: &str) -> Decoded {
    match type_name {
        "BOOL" => get::<bool>(row, index).map(|v| v.map(ScalarValue::Bool)),
        "INT2" => get::<i16>(row, index).map(|v| v.map(|n| ScalarValue::Int(i64::from(n)))),
        "INT4" => get::<i32>(row, index).map(|v| v.map(|n| ScalarValue::Int(i64::from(n)))),
        "INT8" => get::<i64>(row, index).map(|v| v.map(ScalarValue::Int)),
        "OID" => get::<Oid>(row, index).map(|v| v.map(|oid| ScalarValue::Int(i64::from(oid.0)))),
        "FLOAT4" => get::<f32>(row, index).map(|v| v.map(|n| ScalarValue::Float(f64::from(n)))),
        "FLOAT8" => get::<f64>(row, index).map(|v| v.map(ScalarValue::Float)),
        "NUMERIC" => get::<BigDecimal>(row, index).map(|v| v.map(decimal)),
        "MONEY" => get::<PgMoney>(row, index)
            .map(|v| v.map(|m| ScalarValue::Decimal(m.to_bigdecimal(2).to_string()))),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            get::<String>(row, index).map(|v| v.map(ScalarValue::Text))
        }
        "DATE" => get::<NaiveDate>(row, index).map(|v| v.map(ScalarValue::Date)),
        "TIME" => get::<NaiveTime>(row, index).map(|v| v.map(ScalarValue::Time)),
        "TIMESTAMP" => get::<NaiveDateTime>(row, index).map(|v| v.map(ScalarValue::Timestamp)),
        "TIMESTAMPTZ" => {
            get::<DateTime<Utc>>(row, index).map(|v| v.map(ScalarValue::TimestampTz))
        }
        "INTERVAL" => get::<PgInterval>(row, index).map(|v| v.map(interval)),
        "UUID" => get::<uuid::Uuid>(row, index).map(|v| v.map(ScalarValue::Uuid)),
        "JSON" | "JSONB" => get::<serde_json::Value>(row, index).map(|v| v.map(ScalarValue::Json)),
        "BYTEA" => get::<Vec<u8>>(row, index).map(|v| v.map(ScalarValue::Bytes)),
        other if is_text_format(other) => {
            get::<String>(row, index).map(|v| v.map(ScalarValue::Text))
        }
        _ => Ok(None),
    }
}

/// Decodes a one-dimensional array by element type.
fn decode_array(row: &PgRow, index: usize, element: &PgTypeInfo) -> Decoded {
    if matches!(element.kind(), PgTypeKind::Enum(_)) {
        return array::<String, _>(row, index, ScalarValue::Text);
    }
    match element.name() {
        "BOOL" => array::<bool, _>(row, index, ScalarValue::Bool),
        "INT2" => array::<i16, _>(row, index, |n| ScalarValue::Int(i64::from(n))),
        "INT4" => array::<i32, _>(row, index, |n| ScalarValue::Int(i64::from(n))),
        "INT8" => array::<i64, _>(row, index, ScalarValue::Int),
        "FLOAT4" => array::<f32, _>(row, index, |n| ScalarValue::Float(f64::from(n))),
        "FLOAT8" => array::<f64, _>(row, index, ScalarValue::Float),
        "NUMERIC" => array::<BigDecimal, _>(row, index, decimal),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => array::<String, _>(row, index, ScalarValue::Text),
        "DATE" => array::<NaiveDate, _>(row, index, ScalarValue::Date),
        "TIME" => array::<NaiveTime, _>(row, index, ScalarValue::Time),
        "TIMESTAMP" => array::<NaiveDateTime, _>(row, index, ScalarValue::Timestamp),
        "TIMESTAMPTZ" => array::<DateTime<Utc>, _>(row, index, ScalarValue::TimestampTz),
        "INTERVAL" => array::<PgInterval, _>(row, index, interval),
        "UUID" => array::<uuid::Uuid, _>(row, index, ScalarValue::Uuid),
        "JSON" | "JSONB" => array::<serde_json::Value, _>(row, index, ScalarValue::Json),
        _ => Ok(None),
    }
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> Result<Option<T>, sqlx::Error>
where
    T: Decode<'r, Postgres>,
{
    // The type kind and name were checked by the caller; unchecked lets
    // domains decode through their base type.
    row.try_get_unchecked::<Option<T>, _>(index)
}

fn array<'r, T, F>(row: &'r PgRow, index: usize, convert: F) -> Decoded
where
    Vec<Option<T>>: Decode<'r, Postgres>,
    F: Fn(T) -> ScalarValue,
{
    get::<Vec<Option<T>>>(row, index).map(|v| {
        v.map(|items| {
            ScalarValue::Array(
                items
                    .into_iter()
                    .map(|item| item.map_or(ScalarValue::Null, &convert))
                    .collect(),
            )
        })
    })
}

fn decimal(value: BigDecimal) -> ScalarValue {
    ScalarValue::Decimal(value.to_string())
}

fn interval(value: PgInterval) -> ScalarValue {
    ScalarValue::Interval {
        months: value.months,
        days: value.days,
        microseconds: value.microseconds,
    }
}

fn is_text_format(type_name: &str) -> bool {
    TEXT_FORMAT_TYPES.contains(&type_name)
}

/// NULL stays NULL; any other value without a decoder is unsupported.
fn null_or_unsupported(row: &PgRow, index: usize, type_name: &str) -> ScalarValue {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => ScalarValue::Null,
        _ => {
            tracing::debug!("No decoder for column {} of type {}", index, type_name);
            unsupported(type_name)
        }
    }
}

fn raw_numeric_special(row: &PgRow, index: usize) -> Option<&'static str> {
    let raw = row.try_get_raw(index).ok()?;
    numeric_special(raw.as_bytes().ok()?)
}

/// Reads the sign word of a binary NUMERIC header
/// (ndigits, weight, sign, dscale) and names the special values.
fn numeric_special(bytes: &[u8]) -> Option<&'static str> {
    let sign = u16::from_be_bytes([*bytes.get(4)?, *bytes.get(5)?]);
    match sign {
        NUMERIC_NAN => Some("NaN"),
        NUMERIC_POS_INF => Some("Infinity"),
        NUMERIC_NEG_INF => Some("-Infinity"),
        _ => None,
    }
}

fn unsupported(type_name: &str) -> ScalarValue {
    ScalarValue::Unsupported {
        type_name: type_name.to_string(),
    }
}
