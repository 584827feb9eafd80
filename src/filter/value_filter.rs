//! Leaf predicates of a filter
//!
//! A [`ValueFilter`] has a kind (`Int64`, `String`, `Date`, `Bool` or `Nil`) and
//! holds at most one operator. Setting an operator replaces the previous one;
//! operators that make no sense for the kind (`like` on an integer, `lt` on a
//! bool) leave the filter unchanged. A value of the wrong kind is remembered
//! and reported as a configuration error when the statement is built.
//!
//! ```
//! use sluice::filter::{in_list, ValueFilter, ValueKind};
//!
//! let by_subject = ValueFilter::string().like("%rust%");
//! assert!(!by_subject.is_empty());
//!
//! let ignored = ValueFilter::int64().like("%1%");
//! assert!(ignored.is_empty());
//!
//! let ids = in_list(vec![vec![1i64, 2], vec![3]]).unwrap().unwrap();
//! assert_eq!(ids.kind(), ValueKind::Int64);
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sea_query::{BinOper, Expr, ExprTrait, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::dialect::DatabaseSystem;
use crate::error::OrmError;
use crate::value::is_null;

/// Kind of a value filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int64,
    String,
    Date,
    Bool,
    Nil,
}

/// Custom predicate built from the qualified column expression
pub type RawFn = Arc<dyn Fn(Expr) -> Expr + Send + Sync>;

#[derive(Clone)]
pub enum Operator {
    Equals(Value),
    NotEquals(Value),
    Like(String),
    ILike(String),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// `true` renders `IS NULL`, `false` renders `IS NOT NULL`
    Nil(bool),
    Raw(RawFn),
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Operator::NotEquals(v) => f.debug_tuple("NotEquals").field(v).finish(),
            Operator::Like(v) => f.debug_tuple("Like").field(v).finish(),
            Operator::ILike(v) => f.debug_tuple("ILike").field(v).finish(),
            Operator::Lt(v) => f.debug_tuple("Lt").field(v).finish(),
            Operator::Lte(v) => f.debug_tuple("Lte").field(v).finish(),
            Operator::Gt(v) => f.debug_tuple("Gt").field(v).finish(),
            Operator::Gte(v) => f.debug_tuple("Gte").field(v).finish(),
            Operator::In(v) => f.debug_tuple("In").field(v).finish(),
            Operator::NotIn(v) => f.debug_tuple("NotIn").field(v).finish(),
            Operator::Nil(v) => f.debug_tuple("Nil").field(v).finish(),
            Operator::Raw(_) => f.write_str("Raw(..)"),
        }
    }
}

impl ValueKind {
    fn supports(self, operator: &Operator) -> bool {
        use Operator::*;
        match (self, operator) {
            (_, Raw(_) | Nil(_)) => true,
            (ValueKind::Nil, _) => false,
            (_, Equals(_) | NotEquals(_)) => true,
            (ValueKind::String, Like(_) | ILike(_)) => true,
            (_, Like(_) | ILike(_)) => false,
            (ValueKind::Int64 | ValueKind::Date, Lt(_) | Lte(_) | Gt(_) | Gte(_)) => true,
            (_, Lt(_) | Lte(_) | Gt(_) | Gte(_)) => false,
            (ValueKind::Date, In(_) | NotIn(_)) => false,
            (_, In(_) | NotIn(_)) => true,
        }
    }

    fn accepts(self, value: &Value) -> bool {
        is_null(value) || kind_of(value) == Some(self)
    }
}

/// Kind a value belongs to; `None` for values no filter kind covers.
pub fn kind_of(value: &Value) -> Option<ValueKind> {
    if is_null(value) {
        return Some(ValueKind::Nil);
    }
    match value {
        Value::Bool(_) => Some(ValueKind::Bool),
        Value::TinyInt(_)
        | Value::SmallInt(_)
        | Value::Int(_)
        | Value::BigInt(_)
        | Value::TinyUnsigned(_)
        | Value::SmallUnsigned(_)
        | Value::Unsigned(_)
        | Value::BigUnsigned(_) => Some(ValueKind::Int64),
        Value::String(_) | Value::Char(_) | Value::Uuid(_) => Some(ValueKind::String),
        Value::ChronoDate(_)
        | Value::ChronoDateTime(_)
        | Value::ChronoDateTimeUtc(_)
        | Value::ChronoDateTimeLocal(_)
        | Value::ChronoDateTimeWithTimeZone(_) => Some(ValueKind::Date),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct ValueFilter {
    kind: ValueKind,
    operator: Option<Operator>,
    invalid: Option<String>,
}

impl ValueFilter {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            operator: None,
            invalid: None,
        }
    }

    pub fn int64() -> Self {
        Self::new(ValueKind::Int64)
    }

    pub fn string() -> Self {
        Self::new(ValueKind::String)
    }

    pub fn date() -> Self {
        Self::new(ValueKind::Date)
    }

    pub fn boolean() -> Self {
        Self::new(ValueKind::Bool)
    }

    pub fn nil() -> Self {
        Self::new(ValueKind::Nil)
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn operator(&self) -> Option<&Operator> {
        self.operator.as_ref()
    }

    /// `true` until an applicable operator is set.
    pub fn is_empty(&self) -> bool {
        self.operator.is_none()
    }

    pub fn equals(self, value: impl Into<Value>) -> Self {
        self.checked(value.into(), Operator::Equals)
    }

    pub fn not_equals(self, value: impl Into<Value>) -> Self {
        self.checked(value.into(), Operator::NotEquals)
    }

    pub fn like(self, pattern: impl Into<String>) -> Self {
        self.with_operator(Operator::Like(pattern.into()))
    }

    /// Case-insensitive `LIKE`; plain `LIKE` on systems without `ILIKE`.
    pub fn ilike(self, pattern: impl Into<String>) -> Self {
        self.with_operator(Operator::ILike(pattern.into()))
    }

    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.checked(value.into(), Operator::Lt)
    }

    pub fn lte(self, value: impl Into<Value>) -> Self {
        self.checked(value.into(), Operator::Lte)
    }

    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.checked(value.into(), Operator::Gt)
    }

    pub fn gte(self, value: impl Into<Value>) -> Self {
        self.checked(value.into(), Operator::Gte)
    }

    pub fn is_in(self, values: impl IntoValues) -> Self {
        self.checked_list(collect_values(values), Operator::In)
    }

    pub fn not_in(self, values: impl IntoValues) -> Self {
        self.checked_list(collect_values(values), Operator::NotIn)
    }

    pub fn is_null(self) -> Self {
        self.with_operator(Operator::Nil(true))
    }

    pub fn is_not_null(self) -> Self {
        self.with_operator(Operator::Nil(false))
    }

    pub fn raw(self, build: impl Fn(Expr) -> Expr + Send + Sync + 'static) -> Self {
        self.with_operator(Operator::Raw(Arc::new(build)))
    }

    /// Replace the operator, unless it does not apply to this kind.
    pub fn with_operator(mut self, operator: Operator) -> Self {
        if self.kind.supports(&operator) {
            self.operator = Some(operator);
        } else {
            log::debug!("{operator:?} ignored on a {:?} filter", self.kind);
        }
        self
    }

    fn checked(mut self, value: Value, operator: fn(Value) -> Operator) -> Self {
        if !self.kind.accepts(&value) {
            self.invalid = Some(format!("{value:?} is not a {:?} value", self.kind));
            return self;
        }
        self.with_operator(operator(value))
    }

    fn checked_list(mut self, values: Vec<Value>, operator: fn(Vec<Value>) -> Operator) -> Self {
        if let Some(bad) = values.iter().find(|v| !self.kind.accepts(v)) {
            self.invalid = Some(format!("{bad:?} is not a {:?} value", self.kind));
            return self;
        }
        self.with_operator(operator(values))
    }

    /// `true` when the operator is `Equals`.
    pub fn is_equality(&self) -> bool {
        matches!(self.operator, Some(Operator::Equals(_)))
    }

    /// The `Equals` operand, if any.
    pub fn equality(&self) -> Option<&Value> {
        match &self.operator {
            Some(Operator::Equals(value)) => Some(value),
            _ => None,
        }
    }

    /// Predicate on `column`, or `None` when no operator is set
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Configuration` when a value of the wrong kind was given.
    pub(crate) fn to_condition(
        &self,
        column: Expr,
        system: DatabaseSystem,
    ) -> Result<Option<Expr>, OrmError> {
        if let Some(reason) = &self.invalid {
            return Err(OrmError::Configuration(reason.clone()));
        }
        let Some(operator) = &self.operator else {
            return Ok(None);
        };
        let condition = match operator {
            Operator::Equals(v) if is_null(v) => column.is_null(),
            Operator::Equals(v) => column.eq(v.clone()),
            Operator::NotEquals(v) if is_null(v) => column.is_not_null(),
            Operator::NotEquals(v) => column.ne(v.clone()),
            Operator::Like(pattern) => column.like(pattern.clone()),
            Operator::ILike(pattern) => match system {
                DatabaseSystem::Postgres => {
                    column.binary(BinOper::Custom("ILIKE"), Expr::val(pattern.clone()))
                }
                DatabaseSystem::MySql | DatabaseSystem::Sqlite => column.like(pattern.clone()),
            },
            Operator::Lt(v) => column.lt(v.clone()),
            Operator::Lte(v) => column.lte(v.clone()),
            Operator::Gt(v) => column.gt(v.clone()),
            Operator::Gte(v) => column.gte(v.clone()),
            Operator::In(values) if values.is_empty() => Expr::cust("1 = 0"),
            Operator::In(values) => column.is_in(values.clone()),
            Operator::NotIn(values) if values.is_empty() => Expr::cust("1 = 1"),
            Operator::NotIn(values) => column.is_not_in(values.clone()),
            Operator::Nil(true) => column.is_null(),
            Operator::Nil(false) => column.is_not_null(),
            Operator::Raw(build) => build(column),
        };
        Ok(Some(condition))
    }
}

/// Values that can be flattened into an `IN` list
pub trait IntoValues {
    fn push_values(self, out: &mut Vec<Value>);
}

macro_rules! scalar_into_values {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoValues for $ty {
                fn push_values(self, out: &mut Vec<Value>) {
                    out.push(self.into());
                }
            }
        )*
    };
}

scalar_into_values!(
    i32,
    i64,
    bool,
    String,
    &str,
    DateTime<Utc>,
    NaiveDate,
    NaiveDateTime,
    Uuid,
    Value,
);

impl<T: IntoValues> IntoValues for Vec<T> {
    fn push_values(self, out: &mut Vec<Value>) {
        for item in self {
            item.push_values(out);
        }
    }
}

impl<T: IntoValues + Clone> IntoValues for &[T] {
    fn push_values(self, out: &mut Vec<Value>) {
        for item in self {
            item.clone().push_values(out);
        }
    }
}

fn collect_values(values: impl IntoValues) -> Vec<Value> {
    let mut out = Vec::new();
    values.push_values(&mut out);
    out
}

/// Equality filter whose kind follows the value; a null gives `Nil(true)`
///
/// # Errors
///
/// Returns `OrmError::Configuration` for values no filter kind covers.
pub fn equals(value: impl Into<Value>) -> Result<ValueFilter, OrmError> {
    let value = value.into();
    match kind_of(&value) {
        Some(ValueKind::Nil) => Ok(ValueFilter::nil().is_null()),
        Some(kind) => Ok(ValueFilter::new(kind).equals(value)),
        None => Err(OrmError::Configuration(format!(
            "Unknown type for value {value:?} in equals filter"
        ))),
    }
}

/// `IN` filter over flattened values; `None` for an empty list
///
/// # Errors
///
/// Returns `OrmError::Configuration` when the values mix kinds or no filter
/// kind covers them.
pub fn in_list(values: impl IntoValues) -> Result<Option<ValueFilter>, OrmError> {
    let values = collect_values(values);
    let Some(first) = values.first() else {
        return Ok(None);
    };
    let kind = kind_of(first).ok_or_else(|| {
        OrmError::Configuration(format!("Unknown type for value {first:?} in IN filter"))
    })?;
    if let Some(other) = values.iter().find(|v| kind_of(v) != Some(kind)) {
        return Err(OrmError::Configuration(format!(
            "Inconsistent values in IN filter: {first:?} and {other:?}"
        )));
    }
    if kind == ValueKind::Nil {
        return Ok(Some(ValueFilter::nil().is_null()));
    }
    Ok(Some(ValueFilter::new(kind).is_in(values)))
}

/// `LIKE` filter on a string column.
pub fn like(pattern: impl Into<String>) -> ValueFilter {
    ValueFilter::string().like(pattern)
}
