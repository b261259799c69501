//! PostgreSQL plumbing shared by the source and destination connections:
//! connecting, decoding rows into records, and binding values to whatever
//! type the server infers for each placeholder.

use std::error::Error as StdError;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres_types::{to_sql_checked, IsNull, Kind, ToSql, Type};
use rust_decimal::Decimal;
use tokio_postgres::{Client, NoTls, Row};
use uuid::Uuid;

use pypeline_utils::error::Error;
use pypeline_utils::{PypelineResult, Record, Value};

use crate::query::SqlParam;

type BoxError = Box<dyn StdError + Sync + Send>;

/// Connect and drive the connection on a background task.
pub(crate) async fn connect(config: &str) -> PypelineResult<Client> {
    let (client, connection) = tokio_postgres::connect(config, NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "postgres connection error");
        }
    });

    Ok(client)
}

/// True when `client` is open and answers a trivial query.
pub(crate) async fn is_alive(client: Option<&Client>) -> bool {
    match client {
        Some(c) if !c.is_closed() => c.simple_query("SELECT 1").await.is_ok(),
        _ => false,
    }
}

pub(crate) fn decode_row(row: &Row) -> PypelineResult<Record> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| -> PypelineResult<(String, Value)> {
            let value = decode_value(row, idx, column.type_()).map_err(|e| match e {
                Error::Storage(msg) => Error::storage(format!("column `{}`: {msg}", column.name())),
                other => other,
            })?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

fn decode_value(row: &Row, idx: usize, ty: &Type) -> PypelineResult<Value> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(v.into())),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(v.into())),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(|v| Value::Int(v.into())),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(idx)?.map(Value::Decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        }
        Type::UUID => row.try_get::<_, Option<Uuid>>(idx)?.map(Value::Uuid),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<serde_json::Value>>(idx)?.map(Value::Json),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(idx)?.map(Value::Timestamp),
        Type::TIMESTAMPTZ => row.try_get::<_, Option<DateTime<Utc>>>(idx)?.map(Value::TimestampTz),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date),
        _ => {
            return Err(Error::storage(format!(
                "unsupported type `{ty}`, cast it in the extract query"
            )))
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

fn is_text(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN) || ty.name() == "citext"
}

/// Enum columns take the label as text.
fn is_text_like(ty: &Type) -> bool {
    is_text(ty) || matches!(ty.kind(), Kind::Enum(_))
}

/// A record value bound to a placeholder of a server-inferred type.
///
/// Each column type has an explicit encoding. A value that cannot be
/// converted, or a column type outside the list in `accepts`, is an error
/// rather than a guess at the wire format.
#[derive(Debug)]
pub(crate) struct PgValue<'a>(pub &'a Value);

impl ToSql for PgValue<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let value = self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }
        match *ty {
            Type::BOOL => to_bool(value, ty)?.to_sql(ty, out),
            Type::INT2 => i16::try_from(to_int(value, ty)?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(to_int(value, ty)?)?.to_sql(ty, out),
            Type::INT8 => to_int(value, ty)?.to_sql(ty, out),
            Type::OID => u32::try_from(to_int(value, ty)?)?.to_sql(ty, out),
            Type::FLOAT4 => (to_float(value, ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => to_float(value, ty)?.to_sql(ty, out),
            Type::NUMERIC => to_decimal(value, ty)?.to_sql(ty, out),
            Type::UUID => match value {
                Value::Uuid(v) => v.to_sql(ty, out),
                Value::Text(s) => Uuid::parse_str(s.trim())?.to_sql(ty, out),
                _ => Err(mismatch(value, ty)),
            },
            Type::JSON | Type::JSONB => to_json(value)?.to_sql(ty, out),
            Type::TIMESTAMP => to_timestamp(value, ty)?.to_sql(ty, out),
            Type::TIMESTAMPTZ => to_timestamptz(value, ty)?.to_sql(ty, out),
            Type::DATE => to_date(value, ty)?.to_sql(ty, out),
            _ if is_text_like(ty) => {
                out.extend_from_slice(value.to_string().as_bytes());
                Ok(IsNull::No)
            }
            _ => Err(mismatch(value, ty)),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::BOOL
                | Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::OID
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::NUMERIC
                | Type::UUID
                | Type::JSON
                | Type::JSONB
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
        ) || is_text_like(ty)
    }

    to_sql_checked!();
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) => "integer",
        Value::Float(_) => "float",
        Value::Decimal(_) => "decimal",
        Value::Text(_) => "text",
        Value::Uuid(_) => "uuid",
        Value::Timestamp(_) => "timestamp",
        Value::TimestampTz(_) => "timestamptz",
        Value::Date(_) => "date",
        Value::Json(_) => "json",
    }
}

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot bind a {} value to a column of type `{ty}`", kind(value)).into()
}

fn to_bool(value: &Value, ty: &Type) -> Result<bool, BoxError> {
    match value {
        Value::Bool(v) => Ok(*v),
        Value::Int(0) => Ok(false),
        Value::Int(1) => Ok(true),
        Value::Text(s) => match s.trim() {
            "t" | "true" | "TRUE" | "1" => Ok(true),
            "f" | "false" | "FALSE" | "0" => Ok(false),
            other => Err(format!("`{other}` is not a boolean").into()),
        },
        _ => Err(mismatch(value, ty)),
    }
}

fn to_int(value: &Value, ty: &Type) -> Result<i64, BoxError> {
    match value {
        Value::Int(v) => Ok(*v),
        Value::Bool(v) => Ok(i64::from(*v)),
        Value::Float(v) if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64 => Ok(*v as i64),
        Value::Decimal(d) if d.fract().is_zero() => Ok(i64::try_from(*d)?),
        Value::Text(s) => Ok(s.trim().parse()?),
        _ => Err(mismatch(value, ty)),
    }
}

fn to_float(value: &Value, ty: &Type) -> Result<f64, BoxError> {
    match value {
        Value::Int(v) => Ok(*v as f64),
        Value::Float(v) => Ok(*v),
        Value::Decimal(d) => Ok(f64::try_from(*d)?),
        Value::Text(s) => Ok(s.trim().parse()?),
        _ => Err(mismatch(value, ty)),
    }
}

fn to_decimal(value: &Value, ty: &Type) -> Result<Decimal, BoxError> {
    match value {
        Value::Int(v) => Ok(Decimal::from(*v)),
        Value::Float(v) => Ok(Decimal::try_from(*v)?),
        Value::Decimal(d) => Ok(*d),
        Value::Text(s) => Ok(s.trim().parse()?),
        _ => Err(mismatch(value, ty)),
    }
}

fn to_json(value: &Value) -> Result<serde_json::Value, BoxError> {
    match value {
        Value::Json(v) => Ok(v.clone()),
        Value::Text(s) => Ok(serde_json::from_str(s)?),
        other => Ok(serde_json::to_value(other)?),
    }
}

fn to_timestamp(value: &Value, ty: &Type) -> Result<NaiveDateTime, BoxError> {
    match value {
        Value::Timestamp(v) => Ok(*v),
        Value::TimestampTz(v) => Ok(v.naive_utc()),
        Value::Date(v) => Ok(v.and_time(NaiveTime::MIN)),
        Value::Text(s) => Ok(parse_timestamp(s)?),
        _ => Err(mismatch(value, ty)),
    }
}

fn to_timestamptz(value: &Value, ty: &Type) -> Result<DateTime<Utc>, BoxError> {
    match value {
        Value::TimestampTz(v) => Ok(*v),
        Value::Timestamp(v) => Ok(v.and_utc()),
        Value::Date(v) => Ok(v.and_time(NaiveTime::MIN).and_utc()),
        Value::Text(s) => Ok(DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .or_else(|_| parse_timestamp(s).map(|t| t.and_utc()))?),
        _ => Err(mismatch(value, ty)),
    }
}

fn to_date(value: &Value, ty: &Type) -> Result<NaiveDate, BoxError> {
    match value {
        Value::Date(v) => Ok(*v),
        Value::Timestamp(v) => Ok(v.date()),
        Value::TimestampTz(v) => Ok(v.date_naive()),
        Value::Text(s) => Ok(s.trim().parse()?),
        _ => Err(mismatch(value, ty)),
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    s.parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
}

/// A statement parameter borrowed for one `execute` call.
#[derive(Debug)]
pub(crate) enum PgParam<'a> {
    Value(PgValue<'a>),
    Json(&'a serde_json::Value),
    Array(Vec<PgValue<'a>>),
}

impl<'a> From<&'a SqlParam> for PgParam<'a> {
    fn from(param: &'a SqlParam) -> Self {
        match param {
            SqlParam::Value(v) => PgParam::Value(PgValue(v)),
            SqlParam::Json(v) => PgParam::Json(v),
            SqlParam::Array(values) => PgParam::Array(values.iter().map(PgValue).collect()),
        }
    }
}

impl PgParam<'_> {
    pub(crate) fn as_tosql(&self) -> &(dyn ToSql + Sync) {
        match self {
            PgParam::Value(v) => v,
            PgParam::Json(v) => v,
            PgParam::Array(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value, ty: &Type) -> Result<(IsNull, BytesMut), BoxError> {
        let mut out = BytesMut::new();
        let is_null = PgValue(value).to_sql(ty, &mut out)?;
        Ok((is_null, out))
    }

    #[test]
    fn null_binds_to_any_type() {
        let (is_null, out) = encode(&Value::Null, &Type::UUID).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn ints_narrow_to_column_width() {
        let (_, out) = encode(&Value::Int(7), &Type::INT4).unwrap();
        assert_eq!(&out[..], &7i32.to_be_bytes());

        let (_, out) = encode(&Value::Int(7), &Type::INT2).unwrap();
        assert_eq!(&out[..], &7i16.to_be_bytes());

        assert!(encode(&Value::Int(i64::MAX), &Type::INT4).is_err());
    }

    #[test]
    fn text_parses_into_uuid_columns() {
        let id = "6f1c2f4e-0a7b-4c33-9d7e-1f0e2a3b4c5d";
        let (_, out) = encode(&Value::from(id), &Type::UUID).unwrap();
        assert_eq!(&out[..], Uuid::parse_str(id).unwrap().as_bytes());

        assert!(encode(&Value::from("not-a-uuid"), &Type::UUID).is_err());
    }

    #[test]
    fn text_columns_take_string_form() {
        let (_, out) = encode(&Value::Int(42), &Type::TEXT).unwrap();
        assert_eq!(&out[..], b"42");

        let (_, out) = encode(&Value::from("plain"), &Type::VARCHAR).unwrap();
        assert_eq!(&out[..], b"plain");
    }

    #[test]
    fn text_parses_into_timestamps() {
        assert!(encode(&Value::from("2020-01-01 10:00:00"), &Type::TIMESTAMP).is_ok());
        assert!(encode(&Value::from("2020-01-01T10:00:00"), &Type::TIMESTAMP).is_ok());
        assert!(encode(&Value::from("2020-01-01T10:00:00+02:00"), &Type::TIMESTAMPTZ).is_ok());
        assert!(encode(&Value::from("yesterday"), &Type::DATE).is_err());
    }

    #[test]
    fn ints_into_numeric_encode_as_decimal() {
        let (_, out) = encode(&Value::Int(5), &Type::NUMERIC).unwrap();
        assert_ne!(&out[..], &5i64.to_be_bytes());

        let mut expected = BytesMut::new();
        Decimal::from(5).to_sql(&Type::NUMERIC, &mut expected).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn text_and_floats_parse_into_numeric() {
        let amount: Decimal = "12.50".parse().unwrap();
        let mut expected = BytesMut::new();
        amount.to_sql(&Type::NUMERIC, &mut expected).unwrap();

        let (_, out) = encode(&Value::from("12.50"), &Type::NUMERIC).unwrap();
        assert_eq!(out, expected);
        let (_, out) = encode(&Value::Decimal(amount), &Type::NUMERIC).unwrap();
        assert_eq!(out, expected);
        assert!(encode(&Value::Float(0.25), &Type::NUMERIC).is_ok());
        assert!(encode(&Value::Float(f64::NAN), &Type::NUMERIC).is_err());
    }

    #[test]
    fn decimals_narrow_to_int_columns_only_when_whole() {
        let (_, out) = encode(&Value::Decimal(Decimal::from(9)), &Type::INT8).unwrap();
        assert_eq!(&out[..], &9i64.to_be_bytes());

        let half: Decimal = "0.5".parse().unwrap();
        assert!(encode(&Value::Decimal(half), &Type::INT8).is_err());
    }

    #[test]
    fn mismatched_and_unsupported_types_are_errors() {
        assert!(encode(&Value::from(true), &Type::UUID).is_err());
        assert!(encode(&Value::Json(serde_json::json!({"a": 1})), &Type::INT8).is_err());
        assert!(encode(&Value::Int(1), &Type::BYTEA).is_err());
        assert!(!PgValue::accepts(&Type::BYTEA));
        assert!(!PgValue::accepts(&Type::INTERVAL));
        assert!(PgValue::accepts(&Type::NUMERIC));
    }

    #[test]
    fn enum_columns_take_the_label() {
        let mood = Type::new("mood".into(), 0, Kind::Enum(vec!["happy".into()]), "public".into());
        assert!(PgValue::accepts(&mood));
        let (_, out) = encode(&Value::from("happy"), &mood).unwrap();
        assert_eq!(&out[..], b"happy");
    }

    #[test]
    fn array_params_accept_any_member_type() {
        let ids = SqlParam::Array(vec![Value::from("a"), Value::from("b")]);
        let param = PgParam::from(&ids);
        let mut out = BytesMut::new();
        let text_array = Type::TEXT_ARRAY;
        assert!(param.as_tosql().to_sql_checked(&text_array, &mut out).is_ok());
    }
}
