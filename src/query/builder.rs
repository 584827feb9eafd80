//! Filter applier: SELECT and COUNT statements from a filter tree
//!
//! The root table is aliased by its own name. Each joined nested filter gets
//! `"<parent alias>_<child table>"`, or `"<child table><position>"` when it is a
//! member of a collection, and is walked with that alias as its root. Nested
//! filters with no predicate anywhere below them add neither a join nor a
//! condition.

use sea_query::{Asterisk, Expr, ExprTrait, Func, JoinType, LockType, Order, Query, SelectStatement};

use super::projection::projected_columns;
use super::{col, iden, table_ref};
use crate::dialect::DatabaseSystem;
use crate::error::OrmError;
use crate::filter::{has_any_filter, Direction, Filter, FilterField, JoinKind, OrderBy, RequestOption};
use crate::schema::{self, Table};

/// Joins and conditions of one walk over a filter tree
struct Walk {
    system: DatabaseSystem,
    predicates: Vec<Expr>,
    orderings: Vec<(String, OrderBy)>,
}

impl Walk {
    fn new(system: DatabaseSystem) -> Self {
        Self {
            system,
            predicates: Vec::new(),
            orderings: Vec::new(),
        }
    }

    fn apply(
        &mut self,
        select: &mut SelectStatement,
        alias: &str,
        table: &Table,
        filter: &dyn Filter,
    ) -> Result<(), OrmError> {
        let fields = filter.fields();
        if fields.is_empty() {
            return Err(OrmError::Configuration(format!(
                "Filter {} declares no fields",
                filter.filter_name()
            )));
        }
        self.orderings.extend(
            filter
                .options()
                .order_by
                .iter()
                .map(|o| (alias.to_string(), o.clone())),
        );

        for field in fields {
            match field {
                FilterField::Value { column, filter } => {
                    let Some(value_filter) = filter else {
                        continue;
                    };
                    if !table.has_column(column) {
                        return Err(OrmError::Configuration(format!(
                            "Cannot find column {column} inside table {}",
                            table.name()
                        )));
                    }
                    if let Some(expr) = value_filter.to_condition(col(alias, column), self.system)? {
                        self.predicates.push(expr);
                    }
                }
                FilterField::Nested {
                    name,
                    join,
                    filters,
                    collection,
                } => {
                    for (position, child) in filters.into_iter().enumerate() {
                        if !has_any_filter(child) {
                            continue;
                        }
                        let Some(join) = join else {
                            return Err(OrmError::Configuration(format!(
                                "Nested filter {name} of {} has predicates but is not declared as a join",
                                filter.filter_name()
                            )));
                        };
                        let child_table = schema::registry().get_by_filter(child)?;
                        let child_alias = if collection {
                            format!("{}{position}", child_table.name())
                        } else {
                            format!("{alias}_{}", child_table.name())
                        };
                        let join_type = match join.kind {
                            JoinKind::Inner => JoinType::InnerJoin,
                            JoinKind::Left => JoinType::LeftJoin,
                        };
                        select.join_as(
                            join_type,
                            table_ref(&child_table, self.system),
                            iden(&child_alias),
                            col(&child_alias, join.child_column).eq(col(alias, join.parent_column)),
                        );
                        self.apply(select, &child_alias, &child_table, child)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn from_root(select: &mut SelectStatement, table: &Table, system: DatabaseSystem) {
    if table.schema().is_some() {
        select.from_as(table_ref(table, system), iden(table.name()));
    } else {
        select.from(iden(table.name()));
    }
}

/// SELECT for `filter` over its registered `table`
///
/// # Errors
///
/// Returns `OrmError::Configuration` for malformed filters or empty projections,
/// and `OrmError::TableNotFound` for unregistered nested filters.
pub fn build_select(
    table: &Table,
    filter: &dyn Filter,
    system: DatabaseSystem,
) -> Result<SelectStatement, OrmError> {
    let options = filter.options();
    let alias = table.name();
    let mut select = Query::select();

    for column in projected_columns(table, options)? {
        select.column((iden(alias), iden(&column.name)));
    }
    from_root(&mut select, table, system);

    let mut walk = Walk::new(system);
    walk.apply(&mut select, alias, table, filter)?;
    for predicate in walk.predicates {
        select.and_where(predicate);
    }

    for (order_alias, order) in walk.orderings {
        let direction = match order.direction {
            Direction::Asc => Order::Asc,
            Direction::Desc => Order::Desc,
        };
        select.order_by((iden(&order_alias), iden(&order.column)), direction);
    }
    if let Some(limit) = options.limit {
        select.limit(limit);
    }
    if let Some(offset) = options.offset {
        select.offset(offset);
    }
    if options.has_option(RequestOption::SelectDistinct) {
        select.distinct();
    }
    if options.has_option(RequestOption::SelectForUpdate) {
        if system.can_select_for_update() {
            select.lock_with_tables(LockType::Update, [iden(alias)]);
        } else {
            log::debug!("{system} cannot lock rows, ignoring SelectForUpdate on {alias}");
        }
    }
    Ok(select)
}

/// `SELECT COUNT(*)` with the same joins and conditions as [`build_select`]
///
/// With `SelectDistinct`, counts distinct root keys instead.
///
/// # Errors
///
/// See [`build_select`].
pub fn build_count(
    table: &Table,
    filter: &dyn Filter,
    system: DatabaseSystem,
) -> Result<SelectStatement, OrmError> {
    let alias = table.name();
    let mut inner = Query::select();
    from_root(&mut inner, table, system);

    let mut walk = Walk::new(system);
    walk.apply(&mut inner, alias, table, filter)?;
    for predicate in walk.predicates {
        inner.and_where(predicate);
    }

    let count = Func::count(Expr::col(Asterisk));
    if !filter.options().has_option(RequestOption::SelectDistinct) {
        inner.expr_as(count, iden("count"));
        return Ok(inner);
    }

    let distinct_columns: Vec<&str> = if table.keys().is_empty() {
        table.column_names().collect()
    } else {
        table.keys().iter().map(String::as_str).collect()
    };
    for column in distinct_columns {
        inner.column((iden(alias), iden(column)));
    }
    inner.distinct();

    let mut outer = Query::select();
    outer
        .expr_as(count, iden("count"))
        .from_subquery(inner, iden("counted"));
    Ok(outer)
}
