//! Statement building
//!
//! Turns a filter tree plus its registered [`Table`] into `sea_query`
//! statements. Nothing here executes SQL; the CRUD layer renders statements
//! through the session's [`DatabaseSystem`] and runs them.
//!
//! - [`build_select`] / [`build_count`] walk a filter (joins, predicates,
//!   ordering, pagination, projection, row locking)
//! - [`build_insert`], [`build_update`], [`build_delete`] map a model's
//!   current values onto its table

mod builder;
mod mutation;
mod projection;

pub use builder::{build_count, build_select};
pub use mutation::{build_delete, build_insert, build_update};

use sea_query::{DynIden, Expr, IntoTableRef, TableRef};

use crate::dialect::{Capability, DatabaseSystem};
use crate::error::OrmError;
use crate::model::Model;
use crate::record::Record;
use crate::schema::Table;

pub(crate) fn iden(name: &str) -> DynIden {
    DynIden::from(name.to_string())
}

/// `alias.column`
pub(crate) fn col(alias: &str, column: &str) -> Expr {
    Expr::col((iden(alias), iden(column)))
}

/// The table, schema-qualified when it has a schema and the system supports one.
pub(crate) fn table_ref(table: &Table, system: DatabaseSystem) -> TableRef {
    match table.schema() {
        Some(schema) if system.has_capability(Capability::Schema) => {
            (iden(schema), iden(table.name())).into_table_ref()
        }
        _ => iden(table.name()).into_table_ref(),
    }
}

/// Copy every mapped column of `record` into `model`; unmapped columns are ignored.
///
/// # Errors
///
/// Returns the conversion failure of the first column that does not fit its field.
pub(crate) fn hydrate(table: &Table, record: &Record, model: &mut dyn Model) -> Result<(), OrmError> {
    for (column, value) in record.iter() {
        if let Some(index) = table.field_index(column) {
            model.set_value(index, value.clone())?;
        }
    }
    Ok(())
}
