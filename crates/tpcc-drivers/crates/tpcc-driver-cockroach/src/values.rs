//! Parameter binding and result decoding between `Value` and the wire types

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tokio_postgres::Row as PgRow;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};
use tpcc_core::{Row, Value, decode_utf8_lossy_dropping};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// A parameter that cannot be represented in the type the server inferred
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("value {value} is out of range for type {target}")]
pub(crate) struct OutOfRange {
    value: String,
    target: String,
}

impl OutOfRange {
    fn new(value: impl ToString, target: &Type) -> Self {
        Self {
            value: value.to_string(),
            target: target.name().to_string(),
        }
    }
}

/// Owned parameter value matched to the statement's inferred parameter type,
/// so tokio-postgres writes the binary width the server expects.
#[derive(Debug, PartialEq)]
pub(crate) enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    DateTimeUtc(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl PgValue {
    /// Convert a `Value` for a parameter whose type the server inferred as `target_type`.
    pub(crate) fn from_value_for_type(
        value: &Value,
        target_type: &Type,
    ) -> Result<Self, OutOfRange> {
        let converted = match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => Self::coerce_int(i64::from(*v), target_type)?,
            Value::Int32(v) => Self::coerce_int(i64::from(*v), target_type)?,
            Value::Int64(v) => Self::coerce_int(*v, target_type)?,
            Value::Float32(v) => Self::coerce_float(f64::from(*v), target_type)?,
            Value::Float64(v) => Self::coerce_float(*v, target_type)?,
            Value::Decimal(v) => Self::coerce_decimal(*v, target_type)?,
            Value::String(v) => Self::coerce_string(v, target_type)?,
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => match *target_type {
                Type::TEXT | Type::VARCHAR => PgValue::String(v.to_string()),
                _ => PgValue::Uuid(*v),
            },
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::DateTimeUtc(v) => match *target_type {
                Type::TIMESTAMP => PgValue::DateTime(v.naive_utc()),
                Type::DATE => PgValue::Date(v.date_naive()),
                _ => PgValue::DateTimeUtc(*v),
            },
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => match *target_type {
                Type::TIMESTAMPTZ => PgValue::DateTimeUtc(v.and_utc()),
                Type::DATE => PgValue::Date(v.date()),
                _ => PgValue::DateTime(*v),
            },
        };
        Ok(converted)
    }

    /// Pick the variant matching the target column type
    fn coerce_int(value: i64, target_type: &Type) -> Result<Self, OutOfRange> {
        let narrowed = match *target_type {
            Type::INT2 => i16::try_from(value)
                .map(PgValue::Int16)
                .map_err(|_| OutOfRange::new(value, target_type))?,
            Type::INT4 => i32::try_from(value)
                .map(PgValue::Int32)
                .map_err(|_| OutOfRange::new(value, target_type))?,
            Type::NUMERIC => PgValue::Decimal(Decimal::from(value)),
            Type::FLOAT4 => PgValue::Float32(value as f32),
            Type::FLOAT8 => PgValue::Float64(value as f64),
            Type::TEXT | Type::VARCHAR => PgValue::String(value.to_string()),
            _ => PgValue::Int64(value),
        };
        Ok(narrowed)
    }

    fn coerce_float(value: f64, target_type: &Type) -> Result<Self, OutOfRange> {
        match *target_type {
            Type::FLOAT4 => Ok(PgValue::Float32(value as f32)),
            Type::NUMERIC => Ok(Decimal::from_f64(value)
                .map(PgValue::Decimal)
                .unwrap_or(PgValue::Float64(value))),
            Type::INT2 | Type::INT4 | Type::INT8 if value.fract() == 0.0 => {
                // `as` saturates, so bounds are checked on the float first
                if value < i64::MIN as f64 || value >= i64::MAX as f64 {
                    return Err(OutOfRange::new(value, target_type));
                }
                Self::coerce_int(value as i64, target_type)
            }
            _ => Ok(PgValue::Float64(value)),
        }
    }

    fn coerce_decimal(value: Decimal, target_type: &Type) -> Result<Self, OutOfRange> {
        if matches!(*target_type, Type::INT2 | Type::INT4 | Type::INT8) && value.fract().is_zero() {
            return value
                .to_i64()
                .ok_or_else(|| OutOfRange::new(value, target_type))
                .and_then(|v| Self::coerce_int(v, target_type));
        }
        let converted = match *target_type {
            Type::FLOAT4 => value
                .to_f32()
                .map(PgValue::Float32)
                .unwrap_or(PgValue::Decimal(value)),
            Type::FLOAT8 => value
                .to_f64()
                .map(PgValue::Float64)
                .unwrap_or(PgValue::Decimal(value)),
            Type::TEXT | Type::VARCHAR => PgValue::String(value.to_string()),
            _ => PgValue::Decimal(value),
        };
        Ok(converted)
    }

    /// Coerce string parameters into typed values when the statement
    /// provides a concrete target type.
    fn coerce_string(value: &str, target_type: &Type) -> Result<Self, OutOfRange> {
        let fallback = || PgValue::String(value.to_string());
        let converted = match *target_type {
            Type::INT2 | Type::INT4 | Type::INT8 => match value.trim().parse::<i64>() {
                Ok(v) => Self::coerce_int(v, target_type)?,
                Err(_) => fallback(),
            },
            Type::NUMERIC => value
                .trim()
                .parse::<Decimal>()
                .map(PgValue::Decimal)
                .unwrap_or_else(|_| fallback()),
            Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(value)
                .map(PgValue::Json)
                .unwrap_or_else(|_| fallback()),
            Type::DATE => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(PgValue::Date)
                .unwrap_or_else(|_| fallback()),
            Type::TIMESTAMP => parse_naive_timestamp(value)
                .map(PgValue::DateTime)
                .unwrap_or_else(fallback),
            Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(value)
                .map(|ts| ts.with_timezone(&Utc))
                .ok()
                .or_else(|| parse_naive_timestamp(value).map(|ts| ts.and_utc()))
                .map(PgValue::DateTimeUtc)
                .unwrap_or_else(fallback),
            _ => fallback(),
        };
        Ok(converted)
    }
}

fn parse_naive_timestamp(value: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

impl ToSql for PgValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::Decimal(v) => v.to_sql(ty, out),
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Uuid(v) => v.to_sql(ty, out),
            PgValue::Json(v) => v.to_sql(ty, out),
            PgValue::DateTimeUtc(v) => v.to_sql(ty, out),
            PgValue::Date(v) => v.to_sql(ty, out),
            PgValue::Time(v) => v.to_sql(ty, out),
            PgValue::DateTime(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

/// Convert statement parameters using the types the server inferred for them.
///
/// Fails with the 1-based position of the first parameter that does not fit.
pub(crate) fn bind_params(
    params: &[Value],
    param_types: &[Type],
) -> Result<Vec<PgValue>, (usize, OutOfRange)> {
    params
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let target_type = param_types.get(i).unwrap_or(&Type::UNKNOWN);
            PgValue::from_value_for_type(value, target_type).map_err(|e| (i + 1, e))
        })
        .collect()
}

/// NUMERIC decoded as text; used when the value does not fit a `Decimal`
#[derive(Debug)]
struct PgNumericString(String);

impl PgNumericString {
    fn parse(raw: &[u8]) -> Result<String, BoxError> {
        if raw.len() < 8 {
            return Err("invalid NUMERIC payload: too short".into());
        }

        let ndigits = i16::from_be_bytes([raw[0], raw[1]]) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]);
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        let dscale = i16::from_be_bytes([raw[6], raw[7]]) as usize;

        if raw.len() < 8 + ndigits * 2 {
            return Err("invalid NUMERIC payload: truncated digits".into());
        }
        match sign {
            0xC000 => return Ok("NaN".to_string()),
            0xD000 => return Ok("Infinity".to_string()),
            0xF000 => return Ok("-Infinity".to_string()),
            _ => {}
        }

        let digits: Vec<u16> = (0..ndigits)
            .map(|i| u16::from_be_bytes([raw[8 + i * 2], raw[9 + i * 2]]))
            .collect();
        if digits.iter().any(|g| *g > 9999) {
            return Err("invalid NUMERIC payload: group out of range".into());
        }
        if digits.is_empty() {
            return Ok("0".to_string());
        }

        let integer_groups = if weight >= 0 { weight as usize + 1 } else { 0 };
        let mut integer_text = String::new();
        for index in 0..integer_groups {
            let group = digits.get(index).copied().unwrap_or(0);
            if index == 0 {
                integer_text.push_str(&group.to_string());
            } else {
                integer_text.push_str(&format!("{group:04}"));
            }
        }
        if integer_text.is_empty() {
            integer_text.push('0');
        }

        let mut fraction_text = String::new();
        if dscale > 0 {
            // Groups between the decimal point and the first stored fractional group
            let leading_zero_groups = if weight < -1 { (-weight - 1) as usize } else { 0 };
            fraction_text.push_str(&"0000".repeat(leading_zero_groups));
            for group in digits.iter().skip(integer_groups.min(digits.len())) {
                fraction_text.push_str(&format!("{group:04}"));
            }
            if fraction_text.len() < dscale {
                fraction_text.push_str(&"0".repeat(dscale - fraction_text.len()));
            } else {
                fraction_text.truncate(dscale);
            }
        }

        let mut output = String::new();
        if sign == 0x4000 {
            output.push('-');
        }
        output.push_str(&integer_text);
        if !fraction_text.is_empty() {
            output.push('.');
            output.push_str(&fraction_text);
        }
        Ok(output)
    }
}

impl<'a> FromSql<'a> for PgNumericString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(Self(Self::parse(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Raw payload of a type without a dedicated decoder, read as UTF-8 text
#[derive(Debug)]
struct PgFallbackString(String);

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(Self(decode_utf8_lossy_dropping(raw)))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize) -> Option<T> {
    match row.try_get::<_, Option<T>>(idx) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(column = idx, error = %e, "failed to decode column, using NULL");
            None
        }
    }
}

/// Render the internal `"char"` byte the way the server prints it
fn internal_char_text(byte: i8) -> String {
    char::from(byte as u8).to_string()
}

/// Convert one column of a wire row into a `Value`
fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_().name();

    let value = match type_name {
        "bool" => get::<bool>(row, idx).map(Value::Bool),
        "int2" => get::<i16>(row, idx).map(Value::Int16),
        "int4" => get::<i32>(row, idx).map(Value::Int32),
        "int8" => get::<i64>(row, idx).map(Value::Int64),
        "float4" => get::<f32>(row, idx).map(Value::Float32),
        "float8" => get::<f64>(row, idx).map(Value::Float64),
        "numeric" => match row.try_get::<_, Option<Decimal>>(idx) {
            Ok(value) => value.map(Value::Decimal),
            Err(_) => get::<PgNumericString>(row, idx).map(|v| Value::String(v.0)),
        },
        "text" | "varchar" | "bpchar" | "name" => get::<String>(row, idx).map(Value::String),
        // Single-byte internal type; the wire carries the raw byte
        "char" => get::<i8>(row, idx).map(|b| Value::String(internal_char_text(b))),
        "bytea" => get::<Vec<u8>>(row, idx).map(Value::Bytes),
        "uuid" => get::<uuid::Uuid>(row, idx).map(Value::Uuid),
        "json" | "jsonb" => get::<serde_json::Value>(row, idx).map(Value::Json),
        "date" => get::<NaiveDate>(row, idx).map(Value::Date),
        "time" => get::<NaiveTime>(row, idx).map(Value::Time),
        "timestamp" => get::<NaiveDateTime>(row, idx).map(Value::DateTime),
        "timestamptz" => get::<DateTime<Utc>>(row, idx).map(Value::DateTimeUtc),
        _ => get::<PgFallbackString>(row, idx).map(|v| Value::String(v.0)),
    };

    value.unwrap_or(Value::Null)
}

/// Convert a wire row into a normalized `Row`
pub(crate) fn row_from_pg(row: &PgRow) -> Row {
    let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..row.len()).map(|idx| postgres_to_value(row, idx)).collect();
    Row::new(columns, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn numeric_payload(weight: i16, sign: u16, dscale: i16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(digits.len() as i16).to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_integers_follow_target_width() {
        assert_eq!(
            PgValue::from_value_for_type(&Value::Int64(7), &Type::INT4).unwrap(),
            PgValue::Int32(7)
        );
        assert_eq!(
            PgValue::from_value_for_type(&Value::Int32(7), &Type::INT8).unwrap(),
            PgValue::Int64(7)
        );
        assert_eq!(
            PgValue::from_value_for_type(&Value::Int64(3), &Type::INT2).unwrap(),
            PgValue::Int16(3)
        );
    }

    #[test]
    fn test_numbers_bind_to_numeric_as_decimal() {
        assert_eq!(
            PgValue::from_value_for_type(&Value::Int64(10), &Type::NUMERIC).unwrap(),
            PgValue::Decimal(Decimal::from(10))
        );
        assert_eq!(
            PgValue::from_value_for_type(&Value::Float64(12.5), &Type::NUMERIC).unwrap(),
            PgValue::Decimal(Decimal::from_str("12.5").unwrap())
        );
        assert_eq!(
            PgValue::from_value_for_type(&Value::String("99.95".into()), &Type::NUMERIC).unwrap(),
            PgValue::Decimal(Decimal::from_str("99.95").unwrap())
        );
    }

    #[test]
    fn test_decimal_binds_to_float_column() {
        let value = Value::Decimal(Decimal::from_str("0.25").unwrap());
        assert_eq!(
            PgValue::from_value_for_type(&value, &Type::FLOAT8).unwrap(),
            PgValue::Float64(0.25)
        );
    }

    #[test]
    fn test_timestamps_follow_zone_of_target() {
        let naive = NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        assert_eq!(
            PgValue::from_value_for_type(&Value::DateTime(naive), &Type::TIMESTAMPTZ).unwrap(),
            PgValue::DateTimeUtc(naive.and_utc())
        );
        assert_eq!(
            PgValue::from_value_for_type(&Value::DateTimeUtc(naive.and_utc()), &Type::TIMESTAMP).unwrap(),
            PgValue::DateTime(naive)
        );
        assert_eq!(
            PgValue::from_value_for_type(&Value::String("2024-05-01T12:00:00".into()), &Type::TIMESTAMP).unwrap(),
            PgValue::DateTime(naive)
        );
    }

    #[test]
    fn test_unparsable_string_is_sent_as_text() {
        assert_eq!(
            PgValue::from_value_for_type(&Value::String("abc".into()), &Type::INT4).unwrap(),
            PgValue::String("abc".into())
        );
    }

    #[test]
    fn test_integers_outside_target_width_are_rejected() {
        let err = PgValue::from_value_for_type(&Value::Int64(70_000), &Type::INT2).unwrap_err();
        assert_eq!(err.to_string(), "value 70000 is out of range for type int2");

        assert!(PgValue::from_value_for_type(&Value::Int64(5_000_000_000), &Type::INT4).is_err());
        assert!(PgValue::from_value_for_type(&Value::Int32(-40_000), &Type::INT2).is_err());
        assert!(PgValue::from_value_for_type(&Value::Float64(3.0e10), &Type::INT4).is_err());
        assert!(PgValue::from_value_for_type(&Value::Float64(1.0e19), &Type::INT8).is_err());
        assert!(
            PgValue::from_value_for_type(&Value::String("40000".into()), &Type::INT2).is_err()
        );
        assert!(
            PgValue::from_value_for_type(
                &Value::Decimal(Decimal::from_str("99999999999999999999").unwrap()),
                &Type::INT8
            )
            .is_err()
        );

        // Boundaries still fit
        assert_eq!(
            PgValue::from_value_for_type(&Value::Int64(i32::MAX as i64), &Type::INT4).unwrap(),
            PgValue::Int32(i32::MAX)
        );
        assert_eq!(
            PgValue::from_value_for_type(&Value::Int64(-32_768), &Type::INT2).unwrap(),
            PgValue::Int16(i16::MIN)
        );
    }

    #[test]
    fn test_bind_params_reports_position_of_bad_parameter() {
        let (position, err) = bind_params(
            &[Value::Int32(1), Value::Int64(5_000_000_000)],
            &[Type::INT4, Type::INT4],
        )
        .unwrap_err();
        assert_eq!(position, 2);
        assert!(err.to_string().contains("int4"));
    }

    #[test]
    fn test_internal_char_decodes_from_single_byte() {
        let byte = i8::from_sql(&Type::CHAR, b"a").unwrap();
        assert_eq!(internal_char_text(byte), "a");
        assert_eq!(internal_char_text(b'Z' as i8), "Z");
    }

    #[test]
    fn test_bind_params_without_inferred_types() {
        let bound = bind_params(&[Value::Int64(1), Value::Null], &[]).unwrap();
        assert_eq!(bound, vec![PgValue::Int64(1), PgValue::Null]);
    }

    #[test]
    fn test_numeric_text_decoding() {
        // 12345.6789
        let raw = numeric_payload(1, 0x0000, 4, &[1, 2345, 6789]);
        assert_eq!(PgNumericString::parse(&raw).unwrap(), "12345.6789");

        // -0.05
        let raw = numeric_payload(-1, 0x4000, 2, &[500]);
        assert_eq!(PgNumericString::parse(&raw).unwrap(), "-0.05");

        // 0.00001
        let raw = numeric_payload(-2, 0x0000, 5, &[1000]);
        assert_eq!(PgNumericString::parse(&raw).unwrap(), "0.00001");

        let raw = numeric_payload(0, 0xC000, 0, &[]);
        assert_eq!(PgNumericString::parse(&raw).unwrap(), "NaN");

        assert!(PgNumericString::parse(&[0, 1]).is_err());
    }
}
