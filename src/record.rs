//! Driver-neutral result rows
//!
//! Executors hand rows back as [`Record`]s: column names paired with
//! `sea_query::Value`s. The Postgres executor decodes `may_postgres::Row`
//! by column type; test executors build records directly.

use may_postgres::types::Type;
use may_postgres::Row;
use sea_query::Value;

use crate::error::OrmError;
use crate::value::ValueType;

/// One result row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, builder style.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push(column.into());
        self.values.push(value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Decode a `may_postgres::Row` by inspecting each column's type.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Postgres` if a column fails to decode and
    /// `OrmError::Parse` for column types with no mapping.
    pub fn from_pg_row(row: &Row) -> Result<Self, OrmError> {
        let mut record = Record::new();
        for (idx, column) in row.columns().iter().enumerate() {
            let value = decode_column(row, idx, column.type_())?;
            record.push(column.name(), value);
        }
        Ok(record)
    }
}

fn decode_column(row: &Row, idx: usize, ty: &Type) -> Result<Value, OrmError> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.into_value(),
        Type::INT2 => Value::SmallInt(row.try_get::<_, Option<i16>>(idx)?),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.into_value(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.into_value(),
        Type::FLOAT4 => Value::Float(row.try_get::<_, Option<f32>>(idx)?),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.into_value(),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx)?.into_value()
        }
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .into_value(),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .into_value(),
        Type::DATE => row.try_get::<_, Option<chrono::NaiveDate>>(idx)?.into_value(),
        Type::UUID => row.try_get::<_, Option<uuid::Uuid>>(idx)?.into_value(),
        Type::NUMERIC => row
            .try_get::<_, Option<rust_decimal::Decimal>>(idx)?
            .into_value(),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .into_value(),
        Type::BYTEA => Value::Bytes(row.try_get::<_, Option<Vec<u8>>>(idx)?),
        ref other => {
            return Err(OrmError::Parse(format!(
                "unsupported column type {other} at index {idx}"
            )))
        }
    };
    Ok(value)
}
