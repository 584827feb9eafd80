//! Declarative filters
//!
//! A filter is a plain struct describing one query shape: value predicates on
//! its own columns, nested filters for related tables (joined, eagerly loaded,
//! or both) and the [`FilterOptions`] every filter carries (ordering,
//! pagination, projection, row locking, eager-load intent).
//!
//! Filters describe themselves through [`Filter::fields`]; the query builder
//! walks that description against the schema registry.
//!
//! # Example
//!
//! ```
//! use sluice::filter::{Filter, FilterField, FilterOptions, JoinSpec, ValueFilter};
//!
//! #[derive(Debug, Default)]
//! struct CategoryFilter {
//!     options: FilterOptions,
//!     id: Option<ValueFilter>,
//!     name: Option<ValueFilter>,
//! }
//!
//! impl Filter for CategoryFilter {
//!     fn options(&self) -> &FilterOptions {
//!         &self.options
//!     }
//!
//!     fn fields(&self) -> Vec<FilterField<'_>> {
//!         vec![
//!             FilterField::value("id", &self.id),
//!             FilterField::value("name", &self.name),
//!         ]
//!     }
//! }
//!
//! #[derive(Debug, Default)]
//! struct PostFilter {
//!     options: FilterOptions,
//!     subject: Option<ValueFilter>,
//!     category: Option<CategoryFilter>,
//! }
//!
//! impl Filter for PostFilter {
//!     fn options(&self) -> &FilterOptions {
//!         &self.options
//!     }
//!
//!     fn fields(&self) -> Vec<FilterField<'_>> {
//!         vec![
//!             FilterField::value("subject", &self.subject),
//!             FilterField::join(
//!                 "category",
//!                 JoinSpec::inner("id", "category_id"),
//!                 self.category.as_ref(),
//!             ),
//!         ]
//!     }
//! }
//! ```

mod value_filter;

pub use value_filter::{
    equals, in_list, kind_of, like, IntoValues, Operator, RawFn, ValueFilter, ValueKind,
};

use std::any::{Any, TypeId};

use crate::model::Model;

/// Type identity for filters behind `dyn Filter`; implemented for every `'static` type.
pub trait AsAnyFilter: Any + Send + Sync {
    fn filter_type(&self) -> TypeId;
    fn filter_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> AsAnyFilter for T {
    fn filter_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn filter_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A query shape over one registered table
pub trait Filter: AsAnyFilter {
    fn options(&self) -> &FilterOptions;

    /// Value and nested fields, in declaration order.
    fn fields(&self) -> Vec<FilterField<'_>>;
}

/// A filter whose rows load into a known model type
///
/// The typed CRUD functions use this to construct results.
pub trait TypedFilter: Filter + Sized {
    type Model: Model + Default;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

/// `JOIN child AS alias ON alias.child_column = parent.parent_column`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub child_column: &'static str,
    pub parent_column: &'static str,
}

impl JoinSpec {
    pub const fn inner(child_column: &'static str, parent_column: &'static str) -> Self {
        Self {
            kind: JoinKind::Inner,
            child_column,
            parent_column,
        }
    }

    pub const fn left(child_column: &'static str, parent_column: &'static str) -> Self {
        Self {
            kind: JoinKind::Left,
            child_column,
            parent_column,
        }
    }
}

/// One field of a filter
pub enum FilterField<'a> {
    /// Predicate on a column of the filter's own table
    Value {
        column: &'static str,
        filter: Option<&'a ValueFilter>,
    },
    /// Nested filters on a related table
    ///
    /// `name` is the relation name used to find the owner's relation field
    /// when the nested filter asks for eager loading. Without a `join` the
    /// field only carries eager-load intent.
    Nested {
        name: &'static str,
        join: Option<JoinSpec>,
        filters: Vec<&'a dyn Filter>,
        collection: bool,
    },
}

impl<'a> FilterField<'a> {
    pub fn value(column: &'static str, filter: &'a Option<ValueFilter>) -> Self {
        FilterField::Value {
            column,
            filter: filter.as_ref(),
        }
    }

    pub fn join<F: Filter>(name: &'static str, join: JoinSpec, filter: Option<&'a F>) -> Self {
        FilterField::Nested {
            name,
            join: Some(join),
            filters: filter.map(|f| f as &dyn Filter).into_iter().collect(),
            collection: false,
        }
    }

    /// Repeated joins against the same relation, one per filter.
    pub fn join_many<F: Filter>(name: &'static str, join: JoinSpec, filters: &'a [F]) -> Self {
        FilterField::Nested {
            name,
            join: Some(join),
            filters: filters.iter().map(|f| f as &dyn Filter).collect(),
            collection: true,
        }
    }

    /// Eager-load intent only; predicates on this filter are rejected.
    pub fn eager<F: Filter>(name: &'static str, filter: Option<&'a F>) -> Self {
        FilterField::Nested {
            name,
            join: None,
            filters: filter.map(|f| f as &dyn Filter).into_iter().collect(),
            collection: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

/// Statement modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOption {
    /// `FOR UPDATE OF <root table>` where the system supports it
    SelectForUpdate,
    SelectDistinct,
}

/// Options shared by every filter
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Load this filter's relation eagerly when it is nested in a parent filter
    pub subqueryload: bool,
    pub request_options: Vec<RequestOption>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub load_columns: Vec<String>,
    pub dont_load_columns: Vec<String>,
}

impl FilterOptions {
    pub fn allow_subqueryload(&mut self) -> &mut Self {
        self.subqueryload = true;
        self
    }

    pub fn add_option(&mut self, option: RequestOption) -> &mut Self {
        if !self.has_option(option) {
            self.request_options.push(option);
        }
        self
    }

    pub fn has_option(&self, option: RequestOption) -> bool {
        self.request_options.contains(&option)
    }

    /// Append an ordering directive; directives apply in the order added.
    pub fn order_by(&mut self, column: impl Into<String>, direction: Direction) -> &mut Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn set_limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn set_offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    pub fn load_columns(&mut self, columns: &[&str]) -> &mut Self {
        self.load_columns
            .extend(columns.iter().map(|c| (*c).to_string()));
        self
    }

    pub fn dont_load_columns(&mut self, columns: &[&str]) -> &mut Self {
        self.dont_load_columns
            .extend(columns.iter().map(|c| (*c).to_string()));
        self
    }
}

/// `true` when the filter or anything nested below it holds a predicate.
pub fn has_any_filter(filter: &dyn Filter) -> bool {
    filter.fields().iter().any(|field| match field {
        FilterField::Value { filter, .. } => filter.is_some_and(|f| !f.is_empty()),
        FilterField::Nested { filters, .. } => filters.iter().any(|f| has_any_filter(*f)),
    })
}
