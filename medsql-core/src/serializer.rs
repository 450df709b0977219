//! Conversion of execution outcomes into transport JSON.
//!
//! Every [`ScalarValue`] variant has a defined representation, so
//! serialization cannot fail.

use crate::models::{ExecutionOutcome, ScalarValue};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Number, Value, json};
use std::fmt::Write;

const MICROS_PER_SECOND: u64 = 1_000_000;

/// Stateless serializer for [`ExecutionOutcome`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultSerializer;

impl ResultSerializer {
    /// Serializes an outcome.
    ///
    /// - `Rows` → array of objects keyed by column, in column order
    /// - `Acknowledgement` → `{"message": "executed", "rows_affected": n}`
    /// - `Failure` → `{"error": message}`
    pub fn serialize(outcome: &ExecutionOutcome) -> Value {
        match outcome {
            ExecutionOutcome::Rows { columns, rows } => Value::Array(
                rows.iter()
                    .map(|row| {
                        let object: Map<String, Value> = columns
                            .iter()
                            .zip(row.iter())
                            .map(|(column, value)| (column.clone(), Self::scalar(value)))
                            .collect();
                        Value::Object(object)
                    })
                    .collect(),
            ),
            ExecutionOutcome::Acknowledgement { rows_affected } => json!({
                "message": "executed",
                "rows_affected": rows_affected,
            }),
            ExecutionOutcome::Failure { message, .. } => json!({ "error": message }),
        }
    }

    /// Serializes one value.
    pub fn scalar(value: &ScalarValue) -> Value {
        match value {
            ScalarValue::Null => Value::Null,
            ScalarValue::Bool(b) => Value::Bool(*b),
            ScalarValue::Int(i) => Value::from(*i),
            ScalarValue::Float(f) => {
                Number::from_f64(*f).map_or_else(|| Value::String(f.to_string()), Value::Number)
            }
            ScalarValue::Decimal(text) | ScalarValue::Text(text) => Value::String(text.clone()),
            ScalarValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            ScalarValue::Time(time) => Value::String(time.format("%H:%M:%S%.f").to_string()),
            ScalarValue::Timestamp(ts) => {
                Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            ScalarValue::TimestampTz(ts) => Value::String(ts.to_rfc3339()),
            ScalarValue::Interval {
                months,
                days,
                microseconds,
            } => Value::String(iso_duration(*months, *days, *microseconds)),
            ScalarValue::Uuid(id) => Value::String(id.hyphenated().to_string()),
            ScalarValue::Json(value) => value.clone(),
            ScalarValue::Bytes(bytes) => Value::String(format!("base64:{}", STANDARD.encode(bytes))),
            ScalarValue::Array(items) => Value::Array(items.iter().map(Self::scalar).collect()),
            ScalarValue::Unsupported { type_name } => {
                Value::String(format!("<unsupported {}>", type_name))
            }
        }
    }
}

/// ISO-8601 duration such as `P1M2DT3.5S`; a zero interval is `PT0S`.
fn iso_duration(months: i32, days: i32, microseconds: i64) -> String {
    let mut out = String::from("P");
    let years = months / 12;
    let months = months % 12;
    if years != 0 {
        let _ = write!(out, "{}Y", years);
    }
    if months != 0 {
        let _ = write!(out, "{}M", months);
    }
    if days != 0 {
        let _ = write!(out, "{}D", days);
    }

    if microseconds != 0 {
        out.push('T');
        let negative = microseconds < 0;
        let total = microseconds.unsigned_abs();
        let hours = total / (3600 * MICROS_PER_SECOND);
        let minutes = (total / (60 * MICROS_PER_SECOND)) % 60;
        let seconds = (total / MICROS_PER_SECOND) % 60;
        let fraction = total % MICROS_PER_SECOND;
        let sign = if negative { "-" } else { "" };

        if hours != 0 {
            let _ = write!(out, "{}{}H", sign, hours);
        }
        if minutes != 0 {
            let _ = write!(out, "{}{}M", sign, minutes);
        }
        if seconds != 0 || fraction != 0 {
            let _ = write!(out, "{}{}", sign, seconds);
            if fraction != 0 {
                let digits = format!("{:06}", fraction);
                let _ = write!(out, ".{}", digits.trim_end_matches('0'));
            }
            out.push('S');
        }
    }

    if out == "P" {
        out.push_str("T0S");
    }
    out
}
