//! INSERT, UPDATE and DELETE for one model row
//!
//! Column values are read from the model through the table's column to field
//! index map. Keys are matched with `key = value` for every declared key.

use sea_query::{DeleteStatement, Expr, ExprTrait, InsertStatement, Query, UpdateStatement};

use super::{iden, table_ref};
use crate::dialect::{Capability, DatabaseSystem};
use crate::error::OrmError;
use crate::model::Model;
use crate::schema::Table;

fn key_predicates(table: &Table, model: &dyn Model) -> Result<Vec<Expr>, OrmError> {
    if table.keys().is_empty() {
        return Err(OrmError::Configuration(format!(
            "Table {} declares no keys",
            table.name()
        )));
    }
    table
        .keys()
        .iter()
        .map(|key| {
            let index = table.field_index(key).ok_or_else(|| {
                OrmError::Configuration(format!("Key {key} is not a column of table {}", table.name()))
            })?;
            Ok(Expr::col(iden(key)).eq(model.value(index)))
        })
        .collect()
}

/// INSERT of every column, minus the keys when they auto-increment
///
/// Generated keys are requested with `RETURNING` where the system supports it.
///
/// # Errors
///
/// Returns `OrmError::Query` when the statement cannot be assembled.
pub fn build_insert(
    table: &Table,
    model: &dyn Model,
    system: DatabaseSystem,
) -> Result<InsertStatement, OrmError> {
    let generated = table.is_auto_increment() && !table.keys().is_empty();
    let columns: Vec<_> = table
        .columns()
        .iter()
        .filter(|c| !(generated && table.is_key(&c.name)))
        .collect();

    let mut insert = Query::insert();
    insert.into_table(table_ref(table, system));
    if columns.is_empty() {
        insert.or_default_values();
    } else {
        insert.columns(columns.iter().map(|c| iden(&c.name)));
        insert
            .values(columns.iter().map(|c| Expr::val(model.value(c.field_index))))
            .map_err(|e| OrmError::Query(format!("Failed to build insert into {}: {e}", table.name())))?;
    }
    if generated && system.has_capability(Capability::Returning) {
        insert.returning(Query::returning().columns(table.keys().iter().map(|k| iden(k))));
    }
    Ok(insert)
}

/// UPDATE of every non-key column, matched by key
///
/// # Errors
///
/// Returns `OrmError::Configuration` for tables without keys or without
/// non-key columns.
pub fn build_update(
    table: &Table,
    model: &dyn Model,
    system: DatabaseSystem,
) -> Result<UpdateStatement, OrmError> {
    let predicates = key_predicates(table, model)?;
    let values: Vec<_> = table
        .columns()
        .iter()
        .filter(|c| !table.is_key(&c.name))
        .map(|c| (iden(&c.name), Expr::val(model.value(c.field_index))))
        .collect();
    if values.is_empty() {
        return Err(OrmError::Configuration(format!(
            "Table {} has no columns to update",
            table.name()
        )));
    }

    let mut update = Query::update();
    update.table(table_ref(table, system)).values(values);
    for predicate in predicates {
        update.and_where(predicate);
    }
    Ok(update)
}

/// DELETE matched by key
///
/// # Errors
///
/// Returns `OrmError::Configuration` for tables without keys.
pub fn build_delete(
    table: &Table,
    model: &dyn Model,
    system: DatabaseSystem,
) -> Result<DeleteStatement, OrmError> {
    let predicates = key_predicates(table, model)?;
    let mut delete = Query::delete();
    delete.from_table(table_ref(table, system));
    for predicate in predicates {
        delete.and_where(predicate);
    }
    Ok(delete)
}
