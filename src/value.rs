//! Value conversions between model fields and `sea_query::Value`
//!
//! Models expose their fields as `sea_query::Value`s (see [`crate::model::Model`]).
//! The [`ValueType`] trait maps Rust field types to and from those values, with
//! lenient integer widening so an `INT4` column can land in an `i64` field.
//!
//! ```rust
//! use sluice::value::ValueType;
//! use sea_query::Value;
//!
//! let value = 42i64.into_value();
//! assert!(matches!(value, Value::BigInt(Some(42))));
//! assert_eq!(i64::from_value(Value::Int(Some(7))), Some(7));
//! assert_eq!(Option::<i64>::from_value(Value::BigInt(None)), Some(None));
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sea_query::Value;
use uuid::Uuid;

use crate::error::OrmError;

/// Maps a Rust type to its `sea_query::Value` representation.
pub trait ValueType: Sized {
    /// Convert into a `sea_query::Value`.
    fn into_value(self) -> Value;

    /// Convert a `sea_query::Value` into this type.
    ///
    /// Returns `None` when the variant does not fit or when a non-`Option` type
    /// receives a null.
    fn from_value(value: Value) -> Option<Self>;

    /// The typed null for this type, used by `Option<T>`.
    fn null_value() -> Value;
}

/// Convert `value` into `T`, naming `column` in the error.
///
/// # Errors
///
/// Returns `OrmError::Parse` when the value does not fit `T`.
pub fn convert<T: ValueType>(value: Value, column: &str) -> Result<T, OrmError> {
    let shown = format!("{value:?}");
    T::from_value(value).ok_or_else(|| {
        OrmError::Parse(format!(
            "cannot convert {shown} into {} for column {column}",
            std::any::type_name::<T>()
        ))
    })
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::TinyInt(Some(v)) => Some(i64::from(*v)),
        Value::SmallInt(Some(v)) => Some(i64::from(*v)),
        Value::Int(Some(v)) => Some(i64::from(*v)),
        Value::BigInt(Some(v)) => Some(*v),
        Value::TinyUnsigned(Some(v)) => Some(i64::from(*v)),
        Value::SmallUnsigned(Some(v)) => Some(i64::from(*v)),
        Value::Unsigned(Some(v)) => Some(i64::from(*v)),
        Value::BigUnsigned(Some(v)) => i64::try_from(*v).ok(),
        _ => None,
    }
}

impl ValueType for i32 {
    fn into_value(self) -> Value {
        Value::Int(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        as_i64(&value).and_then(|v| i32::try_from(v).ok())
    }

    fn null_value() -> Value {
        Value::Int(None)
    }
}

impl ValueType for i64 {
    fn into_value(self) -> Value {
        Value::BigInt(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        as_i64(&value)
    }

    fn null_value() -> Value {
        Value::BigInt(None)
    }
}

impl ValueType for f64 {
    fn into_value(self) -> Value {
        Value::Double(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Double(Some(v)) => Some(v),
            Value::Float(Some(v)) => Some(f64::from(v)),
            other => as_i64(&other).map(|v| v as f64),
        }
    }

    fn null_value() -> Value {
        Value::Double(None)
    }
}

impl ValueType for bool {
    fn into_value(self) -> Value {
        Value::Bool(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Bool(None)
    }
}

impl ValueType for String {
    fn into_value(self) -> Value {
        Value::String(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(Some(v)) => Some(String::clone(&v)),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::String(None)
    }
}

// Types whose `Value` variant is owned by sea-query's own conversion traits.
macro_rules! sea_value_type {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ValueType for $ty {
                fn into_value(self) -> Value {
                    Value::from(self)
                }

                fn from_value(value: Value) -> Option<Self> {
                    <$ty as sea_query::ValueType>::try_from(value).ok()
                }

                fn null_value() -> Value {
                    Value::from(None::<$ty>)
                }
            }
        )*
    };
}

sea_value_type!(
    DateTime<Utc>,
    NaiveDateTime,
    NaiveDate,
    Uuid,
    Decimal,
    serde_json::Value,
);

impl<T: ValueType> ValueType for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => T::null_value(),
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        if is_null(&value) {
            return Some(None);
        }
        T::from_value(value).map(Some)
    }

    fn null_value() -> Value {
        T::null_value()
    }
}

/// `true` when the value is a typed SQL null.
pub fn is_null(value: &Value) -> bool {
    match value {
        Value::Bool(v) => v.is_none(),
        Value::TinyInt(v) => v.is_none(),
        Value::SmallInt(v) => v.is_none(),
        Value::Int(v) => v.is_none(),
        Value::BigInt(v) => v.is_none(),
        Value::TinyUnsigned(v) => v.is_none(),
        Value::SmallUnsigned(v) => v.is_none(),
        Value::Unsigned(v) => v.is_none(),
        Value::BigUnsigned(v) => v.is_none(),
        Value::Float(v) => v.is_none(),
        Value::Double(v) => v.is_none(),
        Value::String(v) => v.is_none(),
        Value::Char(v) => v.is_none(),
        Value::Bytes(v) => v.is_none(),
        Value::Json(v) => v.is_none(),
        Value::ChronoDate(v) => v.is_none(),
        Value::ChronoTime(v) => v.is_none(),
        Value::ChronoDateTime(v) => v.is_none(),
        Value::ChronoDateTimeUtc(v) => v.is_none(),
        Value::ChronoDateTimeLocal(v) => v.is_none(),
        Value::ChronoDateTimeWithTimeZone(v) => v.is_none(),
        Value::Uuid(v) => v.is_none(),
        Value::Decimal(v) => v.is_none(),
        _ => false,
    }
}

/// `true` when the value is null or the zero value of its type.
///
/// Zero keys mean "not yet inserted" for single auto-increment tables and "no
/// parent" for eager-load foreign keys.
pub fn is_zero(value: &Value) -> bool {
    if is_null(value) {
        return true;
    }
    match value {
        Value::Bool(Some(v)) => !*v,
        Value::Float(Some(v)) => *v == 0.0,
        Value::Double(Some(v)) => *v == 0.0,
        Value::String(Some(v)) => v.is_empty(),
        Value::Uuid(Some(v)) => v.is_nil(),
        other => as_i64(other) == Some(0),
    }
}

/// Hashable projection of a key value, used to group ids and owner slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyValue {
    Int(i64),
    Text(String),
    Uuid(Uuid),
    Bool(bool),
    Other(String),
}

impl KeyValue {
    pub(crate) fn from_value(value: &Value) -> Self {
        if let Some(v) = as_i64(value) {
            return KeyValue::Int(v);
        }
        match value {
            Value::String(Some(s)) => KeyValue::Text(String::clone(s)),
            Value::Uuid(Some(u)) => KeyValue::Uuid(Uuid::clone(u)),
            Value::Bool(Some(b)) => KeyValue::Bool(*b),
            other => KeyValue::Other(format!("{other:?}")),
        }
    }
}
