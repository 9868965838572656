//! Typed column values
//!
//! NULLs keep their column type so every bind parameter sent to Postgres
//! has an explicit type.

use super::ColumnType;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    BigInt(Option<i64>),
    Integer(Option<i32>),
    Double(Option<f64>),
    Boolean(Option<bool>),
    Date(Option<NaiveDate>),
    Timestamp(Option<NaiveDateTime>),
    Json(Option<Value>),
}

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

impl SqlValue {
    pub fn null(ty: ColumnType) -> Self {
        match ty {
            ColumnType::Text => SqlValue::Text(None),
            ColumnType::BigInt => SqlValue::BigInt(None),
            ColumnType::Integer => SqlValue::Integer(None),
            ColumnType::Double => SqlValue::Double(None),
            ColumnType::Boolean => SqlValue::Boolean(None),
            ColumnType::Date => SqlValue::Date(None),
            ColumnType::Timestamp => SqlValue::Timestamp(None),
            ColumnType::Jsonb => SqlValue::Json(None),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Text(v) => v.is_none(),
            SqlValue::BigInt(v) => v.is_none(),
            SqlValue::Integer(v) => v.is_none(),
            SqlValue::Double(v) => v.is_none(),
            SqlValue::Boolean(v) => v.is_none(),
            SqlValue::Date(v) => v.is_none(),
            SqlValue::Timestamp(v) => v.is_none(),
            SqlValue::Json(v) => v.is_none(),
        }
    }

    /// Convert a JSON value to the column's type. Absent and JSON null map to NULL.
    pub fn coerce(ty: ColumnType, value: Option<&Value>) -> Result<Self, String> {
        let value = match value {
            None | Some(Value::Null) => return Ok(Self::null(ty)),
            Some(v) => v,
        };

        let mismatch = || format!("expected {}, got {}", ty.sql_name(), value);

        let coerced = match ty {
            ColumnType::Text => SqlValue::Text(Some(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
            ColumnType::BigInt => SqlValue::BigInt(Some(as_i64(value).ok_or_else(mismatch)?)),
            ColumnType::Integer => {
                let wide = as_i64(value).ok_or_else(mismatch)?;
                SqlValue::Integer(Some(i32::try_from(wide).map_err(|_| mismatch())?))
            },
            ColumnType::Double => SqlValue::Double(Some(match value {
                Value::String(s) => s.trim().parse().map_err(|_| mismatch())?,
                other => other.as_f64().ok_or_else(mismatch)?,
            })),
            ColumnType::Boolean => SqlValue::Boolean(Some(value.as_bool().ok_or_else(mismatch)?)),
            ColumnType::Date => {
                let raw = value.as_str().ok_or_else(mismatch)?;
                let day = raw.get(..10).unwrap_or(raw);
                SqlValue::Date(Some(NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| mismatch())?))
            },
            ColumnType::Timestamp => {
                let raw = value.as_str().ok_or_else(mismatch)?;
                SqlValue::Timestamp(Some(parse_timestamp(raw).ok_or_else(mismatch)?))
            },
            ColumnType::Jsonb => SqlValue::Json(Some(value.clone())),
        };
        Ok(coerced)
    }

    /// Stable text form used to compare conflict keys
    pub fn key_repr(&self) -> String {
        match self {
            SqlValue::Text(v) => v.clone().unwrap_or_default(),
            SqlValue::BigInt(v) => v.map(|n| n.to_string()).unwrap_or_default(),
            SqlValue::Integer(v) => v.map(|n| n.to_string()).unwrap_or_default(),
            SqlValue::Double(v) => v.map(|n| n.to_string()).unwrap_or_default(),
            SqlValue::Boolean(v) => v.map(|b| b.to_string()).unwrap_or_default(),
            SqlValue::Date(v) => v.map(|d| d.to_string()).unwrap_or_default(),
            SqlValue::Timestamp(v) => v.map(|t| t.to_string()).unwrap_or_default(),
            SqlValue::Json(v) => v.as_ref().map(Value::to_string).unwrap_or_default(),
        }
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_keeps_type() {
        assert_eq!(SqlValue::coerce(ColumnType::BigInt, None).unwrap(), SqlValue::BigInt(None));
        assert_eq!(
            SqlValue::coerce(ColumnType::Jsonb, Some(&Value::Null)).unwrap(),
            SqlValue::Json(None)
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            SqlValue::coerce(ColumnType::Integer, Some(&json!(2023))).unwrap(),
            SqlValue::Integer(Some(2023))
        );
        assert_eq!(
            SqlValue::coerce(ColumnType::BigInt, Some(&json!("42"))).unwrap(),
            SqlValue::BigInt(Some(42))
        );
        assert!(SqlValue::coerce(ColumnType::Integer, Some(&json!(1.5))).is_err());
        assert!(SqlValue::coerce(ColumnType::Integer, Some(&json!(i64::MAX))).is_err());
    }

    #[test]
    fn test_dates_and_timestamps() {
        assert_eq!(
            SqlValue::coerce(ColumnType::Date, Some(&json!("2024-02-01"))).unwrap(),
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 1))
        );
        let ts = SqlValue::coerce(ColumnType::Timestamp, Some(&json!("2024-02-01T10:20:30.123456")))
            .unwrap();
        assert!(matches!(ts, SqlValue::Timestamp(Some(_))));
        let day_only = SqlValue::coerce(ColumnType::Timestamp, Some(&json!("2024-02-01"))).unwrap();
        assert_eq!(day_only.key_repr(), "2024-02-01 00:00:00");
        assert!(SqlValue::coerce(ColumnType::Date, Some(&json!("yesterday"))).is_err());
    }

    #[test]
    fn test_text_accepts_scalars() {
        assert_eq!(
            SqlValue::coerce(ColumnType::Text, Some(&json!(7))).unwrap(),
            SqlValue::Text(Some("7".into()))
        );
    }
}
