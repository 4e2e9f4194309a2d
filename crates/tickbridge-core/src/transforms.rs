//! Stateless value transforms used by field mappings.
//!
//! Every function takes a borrowed [`serde_json::Value`] and either produces
//! a converted value or a [`ConversionError`] that embeds the original
//! input. None of them fall back to a sentinel such as `0.0` on failure.
//!
//! Plain functions (`to_float`, `side_from_string`, ...) can be passed
//! directly to [`FieldMapping::with_transform`](crate::FieldMapping::with_transform);
//! parameterized transforms such as [`local_offset`] return a closure.

use std::sync::Arc;

use serde_json::Value;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::error::ConversionError;

/// Shareable transform function stored inside a [`FieldMapping`](crate::FieldMapping).
///
/// Reference-counted so mappings clone without re-binding behavior.
pub type Transform = Arc<dyn Fn(&Value) -> Result<Value, ConversionError> + Send + Sync>;

const MS_PER_SECOND: f64 = 1_000.0;
const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

fn render(value: &Value) -> String {
    value.to_string()
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Convert a numeric or numeric-looking text value to a float.
pub fn to_float(value: &Value) -> Result<Value, ConversionError> {
    let number = coerce_f64(value).ok_or_else(|| ConversionError::NotNumeric {
        input: render(value),
    })?;
    serde_json::Number::from_f64(number)
        .map(Value::Number)
        .ok_or_else(|| ConversionError::NotNumeric {
            input: render(value),
        })
}

/// Convert a value to an integer, truncating floating input toward zero.
///
/// Text input must be an integer literal; `"12.5"` is rejected rather than
/// silently truncated.
pub fn to_int(value: &Value) -> Result<Value, ConversionError> {
    let fail = || ConversionError::NotInteger {
        input: render(value),
    };

    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Value::from(i));
            }
            if let Some(u) = n.as_u64() {
                return Ok(Value::from(u));
            }
            let f = n.as_f64().ok_or_else(fail)?;
            if !f.is_finite() || f < i64::MIN as f64 || f > i64::MAX as f64 {
                return Err(fail());
            }
            Ok(Value::from(f.trunc() as i64))
        }
        Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| fail()),
        _ => Err(fail()),
    }
}

fn format_utc(datetime: OffsetDateTime, input: &Value) -> Result<Value, ConversionError> {
    // Second precision with a literal Z suffix.
    let fmt = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
    datetime
        .to_offset(UtcOffset::UTC)
        .format(fmt)
        .map(Value::String)
        .map_err(|_| ConversionError::InvalidTimestamp {
            input: render(input),
        })
}

fn parse_offset_timestamp(text: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(text, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(text, &Iso8601::DEFAULT))
        .ok()
}

/// Normalize an ISO-8601/RFC-3339 timestamp in any offset to UTC.
///
/// Output is always second precision with a literal `Z` suffix, e.g.
/// `2024-01-01T00:00:00Z`. Input without an explicit offset is rejected;
/// use [`local_offset`] when the source emits naive local timestamps.
pub fn iso_timestamp(value: &Value) -> Result<Value, ConversionError> {
    let text = value.as_str().ok_or_else(|| ConversionError::InvalidTimestamp {
        input: render(value),
    })?;
    let parsed =
        parse_offset_timestamp(text.trim()).ok_or_else(|| ConversionError::InvalidTimestamp {
            input: render(value),
        })?;
    format_utc(parsed, value)
}

fn epoch_to_utc(seconds: f64, input: &Value) -> Result<Value, ConversionError> {
    if !seconds.is_finite() {
        return Err(ConversionError::EpochOutOfRange {
            input: render(input),
        });
    }
    // The cast saturates at the i128 bounds; from_unix_timestamp_nanos then
    // rejects anything outside the representable date range.
    let nanos = (seconds * NANOS_PER_SECOND) as i128;
    let datetime = OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|_| {
        ConversionError::EpochOutOfRange {
            input: render(input),
        }
    })?;
    format_utc(datetime, input)
}

/// Convert a Unix epoch in milliseconds to a normalized UTC timestamp.
pub fn unix_timestamp_ms(value: &Value) -> Result<Value, ConversionError> {
    let millis = coerce_f64(value).ok_or_else(|| ConversionError::NotNumeric {
        input: render(value),
    })?;
    epoch_to_utc(millis / MS_PER_SECOND, value)
}

/// Convert a Unix epoch in seconds to a normalized UTC timestamp.
pub fn unix_timestamp_sec(value: &Value) -> Result<Value, ConversionError> {
    let seconds = coerce_f64(value).ok_or_else(|| ConversionError::NotNumeric {
        input: render(value),
    })?;
    epoch_to_utc(seconds, value)
}

fn parse_naive(text: &str) -> Option<PrimitiveDateTime> {
    let with_subsecond =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    let plain = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(text, with_subsecond)
        .or_else(|_| PrimitiveDateTime::parse(text, plain))
        .ok()
}

/// Build a transform that converts timestamps from a fixed local offset to UTC.
///
/// Timestamps without an explicit offset are assumed to be in the given
/// offset (e.g. `9` for JST); timestamps that already carry an offset are
/// converted directly and the assumed offset is ignored.
pub fn local_offset(
    offset_hours: i8,
) -> impl Fn(&Value) -> Result<Value, ConversionError> + Send + Sync + 'static {
    move |value| {
        let invalid = || ConversionError::InvalidTimestamp {
            input: render(value),
        };
        let text = value.as_str().ok_or_else(invalid)?.trim();

        if let Some(parsed) = parse_offset_timestamp(text) {
            return format_utc(parsed, value);
        }

        let naive = parse_naive(text).ok_or_else(invalid)?;
        let offset = UtcOffset::from_hms(offset_hours, 0, 0).map_err(|_| invalid())?;
        format_utc(naive.assume_offset(offset), value)
    }
}

/// Normalize a side token to exactly `"buy"` or `"sell"`.
///
/// Accepted tokens (case-insensitive): `buy`, `bid`, `b` map to `buy`;
/// `sell`, `ask`, `offer`, `s`, `a` map to `sell`. Anything else fails.
pub fn side_from_string(value: &Value) -> Result<Value, ConversionError> {
    let fail = || ConversionError::UnknownSide {
        input: render(value),
    };
    let normalized = value.as_str().ok_or_else(fail)?.trim().to_ascii_lowercase();

    match normalized.as_str() {
        "buy" | "bid" | "b" => Ok(Value::String("buy".to_string())),
        "sell" | "ask" | "offer" | "s" | "a" => Ok(Value::String("sell".to_string())),
        _ => Err(fail()),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Uppercase a string value. Total: non-string input is stringified first.
pub fn uppercase(value: &Value) -> Result<Value, ConversionError> {
    Ok(Value::String(stringify(value).to_uppercase()))
}

/// Lowercase a string value. Total: non-string input is stringified first.
pub fn lowercase(value: &Value) -> Result<Value, ConversionError> {
    Ok(Value::String(stringify(value).to_lowercase()))
}
