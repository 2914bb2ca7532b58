use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use sqlx::types::{BigDecimal, Uuid};
use sqlx::{Column, Postgres, Row as _, TypeInfo};

use super::{BoxError, QueryResponse, RemoteQuery, Row};

/// Queries use PostgreSQL's `$1, $2, ...` placeholders, numbered in binding
/// order: the query's own params first, then the reference.
#[async_trait]
impl RemoteQuery for PgPool {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResponse, BoxError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind(query, param);
        }

        let records = query.fetch_all(self).await?;
        let rows = records
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(QueryResponse::Rows(rows))
    }
}

fn bind<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(flag) => query.bind(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => query.bind(integer),
            None => query.bind(number.as_f64()),
        },
        Value::String(text) => query.bind(text.clone()),
        nested => query.bind(sqlx::types::Json(nested.clone())),
    }
}

fn decode_row(record: &PgRow) -> Result<Row, sqlx::Error> {
    let mut row = Row::new();
    for (index, column) in record.columns().iter().enumerate() {
        let value = decode_column(record, index, column.type_info().name())?;
        row.insert(column.name().to_owned(), value.unwrap_or(Value::Null));
    }
    Ok(row)
}

/// Decode one column by its PostgreSQL type. Types without a mapping fail
/// the query rather than turning into `null`.
fn decode_column(record: &PgRow, index: usize, type_name: &str) -> Result<Option<Value>, sqlx::Error> {
    let value = match type_name {
        "BOOL" => record.try_get::<Option<bool>, _>(index)?.map(Value::from),
        "INT2" => record.try_get::<Option<i16>, _>(index)?.map(Value::from),
        "INT4" => record.try_get::<Option<i32>, _>(index)?.map(Value::from),
        "INT8" => record.try_get::<Option<i64>, _>(index)?.map(Value::from),
        "FLOAT4" => record
            .try_get::<Option<f32>, _>(index)?
            .map(|real| float_value(real as f64)),
        "FLOAT8" => record.try_get::<Option<f64>, _>(index)?.map(float_value),
        // Kept as text so no precision is lost.
        "NUMERIC" => record
            .try_get::<Option<BigDecimal>, _>(index)?
            .map(|decimal| Value::String(decimal.to_string())),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => record
            .try_get::<Option<String>, _>(index)?
            .map(Value::String),
        "JSON" | "JSONB" => record.try_get::<Option<Value>, _>(index)?,
        "UUID" => record
            .try_get::<Option<Uuid>, _>(index)?
            .map(|uuid| Value::String(uuid.to_string())),
        "TIMESTAMPTZ" => record
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(|at| Value::String(timestamptz_text(at))),
        "TIMESTAMP" => record
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|at| Value::String(timestamp_text(at))),
        "DATE" => record
            .try_get::<Option<NaiveDate>, _>(index)?
            .map(|date| Value::String(date.to_string())),
        "TIME" => record
            .try_get::<Option<NaiveTime>, _>(index)?
            .map(|time| Value::String(time.to_string())),
        "BYTEA" => record
            .try_get::<Option<Vec<u8>>, _>(index)?
            .map(|bytes| Value::Array(bytes.into_iter().map(Value::from).collect())),
        "BOOL[]" => array(record.try_get::<Option<Vec<bool>>, _>(index)?, Value::from),
        "INT2[]" => array(record.try_get::<Option<Vec<i16>>, _>(index)?, Value::from),
        "INT4[]" => array(record.try_get::<Option<Vec<i32>>, _>(index)?, Value::from),
        "INT8[]" => array(record.try_get::<Option<Vec<i64>>, _>(index)?, Value::from),
        "FLOAT8[]" => array(record.try_get::<Option<Vec<f64>>, _>(index)?, float_value),
        "TEXT[]" | "VARCHAR[]" => array(record.try_get::<Option<Vec<String>>, _>(index)?, Value::String),
        "UUID[]" => array(record.try_get::<Option<Vec<Uuid>>, _>(index)?, |uuid| {
            Value::String(uuid.to_string())
        }),
        other => return Err(unsupported(index, other)),
    };
    Ok(value)
}

fn array<T>(items: Option<Vec<T>>, to_value: impl Fn(T) -> Value) -> Option<Value> {
    items.map(|items| Value::Array(items.into_iter().map(to_value).collect()))
}

/// Non-finite floats have no JSON form.
fn float_value(real: f64) -> Value {
    Number::from_f64(real).map_or(Value::Null, Value::Number)
}

fn timestamptz_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn timestamp_text(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn unsupported(index: usize, type_name: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: index.to_string(),
        source: format!("unsupported column type {}", type_name).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::chrono::TimeZone;

    #[test]
    fn timestamps_render_as_iso_8601() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(timestamptz_text(at), "2024-03-01T12:30:05Z");
        assert_eq!(timestamp_text(at.naive_utc()), "2024-03-01T12:30:05");
    }

    #[test]
    fn unsupported_types_are_errors() {
        let err = unsupported(3, "POINT");
        assert!(matches!(err, sqlx::Error::ColumnDecode { ref index, .. } if index == "3"));
        assert!(err.to_string().contains("unsupported column type POINT"));
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), Value::Null);
    }
}
