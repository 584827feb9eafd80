//! Generic CRUD over registered models
//!
//! Every function looks the model (or filter) up in the schema registry,
//! builds its statement with [`crate::query`], renders it for the session's
//! system and runs it through the session, so hooks, cancellation and the open
//! transaction all apply.
//!
//! ```no_run
//! # use sluice::filter::{Filter, FilterField, FilterOptions, TypedFilter, ValueFilter};
//! # use sluice::model::{FieldDef, Model};
//! # use sluice::{crud, OrmError, Session};
//! # #[derive(Default)] struct Category { id: i64 }
//! # impl Model for Category {
//! #     fn fields() -> Vec<FieldDef> { vec![FieldDef::column("id")] }
//! #     fn value(&self, _: usize) -> sea_query::Value { self.id.into() }
//! #     fn set_value(&mut self, _: usize, v: sea_query::Value) -> Result<(), OrmError> {
//! #         self.id = sluice::value::convert(v, "id")?; Ok(())
//! #     }
//! # }
//! # #[derive(Default)] struct CategoryFilter { options: FilterOptions, id: Option<ValueFilter> }
//! # impl Filter for CategoryFilter {
//! #     fn options(&self) -> &FilterOptions { &self.options }
//! #     fn fields(&self) -> Vec<FilterField<'_>> { vec![FilterField::value("id", &self.id)] }
//! # }
//! # impl TypedFilter for CategoryFilter { type Model = Category; }
//! # fn run(session: &Session) -> Result<(), OrmError> {
//! let filter = CategoryFilter {
//!     id: Some(ValueFilter::int64().equals(3i64)),
//!     ..Default::default()
//! };
//! let mut category = crud::select_one(session, &filter)?;
//! crud::save(session, &mut category)?;
//! # Ok(())
//! # }
//! ```

use sea_query::Values;
use std::any::TypeId;
use std::sync::Arc;

use crate::dialect::{Capability, DatabaseSystem};
use crate::eager;
use crate::error::OrmError;
use crate::filter::{equals, Filter, FilterField, FilterOptions, TypedFilter, ValueFilter};
use crate::model::Model;
use crate::query::{build_count, build_delete, build_insert, build_select, build_update, hydrate};
use crate::record::Record;
use crate::schema::{self, Table};
use crate::session::{Session, StatementKind};
use crate::value::{convert, is_zero};

/// Equality filter over a table's own columns, built from a model's values
struct KeyFilter {
    options: FilterOptions,
    values: Vec<(&'static str, Option<ValueFilter>)>,
}

impl KeyFilter {
    /// # Errors
    ///
    /// Returns `OrmError::Configuration` when the table's filter does not
    /// declare one of `columns`.
    fn new<'c>(
        table: &Table,
        model: &dyn Model,
        columns: impl IntoIterator<Item = &'c str>,
    ) -> Result<Self, OrmError> {
        let mut values = Vec::new();
        for column in columns {
            let (Some(name), Some(index)) = (table.filter_column(column), table.field_index(column))
            else {
                return Err(OrmError::Configuration(format!(
                    "Cannot find field {column} inside table {} filter",
                    table.name()
                )));
            };
            values.push((name, Some(equals(model.value(index))?)));
        }
        Ok(Self {
            options: FilterOptions::default(),
            values,
        })
    }
}

impl Filter for KeyFilter {
    fn options(&self) -> &FilterOptions {
        &self.options
    }

    fn fields(&self) -> Vec<FilterField<'_>> {
        self.values
            .iter()
            .map(|(column, filter)| FilterField::value(*column, filter))
            .collect()
    }
}

fn typed_table<F: TypedFilter>(filter: &F) -> Result<Arc<Table>, OrmError> {
    let table = schema::registry().get_by_filter(filter)?;
    if table.model_type() != TypeId::of::<F::Model>() {
        return Err(OrmError::Configuration(format!(
            "Filter {} is registered for {}, not {}",
            filter.filter_name(),
            table.model_name(),
            std::any::type_name::<F::Model>()
        )));
    }
    Ok(table)
}

fn fetch(
    session: &Session,
    table: &Table,
    filter: &dyn Filter,
    kind: StatementKind,
) -> Result<Vec<Record>, OrmError> {
    let system = session.system();
    let mut select = build_select(table, filter, system)?;
    if kind == StatementKind::SelectOne && filter.options().limit.is_none() {
        select.limit(1);
    }
    let (sql, values) = system.build_select(&select);
    log::debug!("{sql}");
    session.query_statement(kind, &sql, &values)
}

fn load<M: Model + Default>(table: &Table, record: &Record) -> Result<M, OrmError> {
    let mut model = M::default();
    hydrate(table, record, &mut model)?;
    Ok(model)
}

/// The first row matching `filter`, with requested relations loaded
///
/// # Errors
///
/// Returns `OrmError::RowNotFound` (carrying the TitleCased table name) when
/// nothing matches, and any build, execution or eager-load failure.
pub fn select_one<F: TypedFilter>(session: &Session, filter: &F) -> Result<F::Model, OrmError> {
    let table = typed_table(filter)?;
    let records = fetch(session, &table, filter, StatementKind::SelectOne)?;
    let record = records
        .first()
        .ok_or_else(|| OrmError::RowNotFound(table.display_name()))?;
    let mut model: F::Model = load(&table, record)?;
    eager::resolve(session, table, std::slice::from_mut(&mut model), filter)?;
    Ok(model)
}

/// Every row matching `filter`, with requested relations loaded
///
/// # Errors
///
/// Returns any build, execution or eager-load failure. No rows is not an error.
pub fn select_all<F: TypedFilter>(session: &Session, filter: &F) -> Result<Vec<F::Model>, OrmError> {
    let table = typed_table(filter)?;
    let records = fetch(session, &table, filter, StatementKind::Select)?;
    let mut models = records
        .iter()
        .map(|record| load::<F::Model>(&table, record))
        .collect::<Result<Vec<_>, _>>()?;
    if !models.is_empty() {
        eager::resolve(session, table, &mut models, filter)?;
    }
    Ok(models)
}

/// Reload `model` from the row matching every non-zero column it holds
///
/// # Errors
///
/// Returns `OrmError::Configuration` when a non-zero column is not declared by
/// the table's filter, `OrmError::RowNotFound` when nothing matches.
pub fn select_one_from_model<M: Model>(session: &Session, model: &mut M) -> Result<(), OrmError> {
    let table = schema::registry().get_by_model::<M>()?;
    if table.filter_type().is_none() {
        return Err(OrmError::Configuration(format!(
            "Table {} has no registered filter",
            table.name()
        )));
    }
    let columns: Vec<&str> = table
        .columns()
        .iter()
        .filter(|c| !is_zero(&model.value(c.field_index)))
        .map(|c| c.name.as_str())
        .collect();
    if columns.is_empty() {
        return Err(OrmError::Configuration(format!(
            "No value set on {} to select by",
            table.model_name()
        )));
    }

    let filter = KeyFilter::new(&table, model, columns)?;
    let records = fetch(session, &table, &filter, StatementKind::SelectOne)?;
    let record = records
        .first()
        .ok_or_else(|| OrmError::RowNotFound(table.display_name()))?;
    hydrate(&table, record, model)
}

/// `SELECT COUNT(*)` over the rows `filter` matches
///
/// # Errors
///
/// Returns any build or execution failure, or `OrmError::Parse` for an
/// unreadable count.
pub fn count(session: &Session, filter: &dyn Filter) -> Result<u64, OrmError> {
    let table = schema::registry().get_by_filter(filter)?;
    let system = session.system();
    let (sql, values) = system.build_select(&build_count(&table, filter, system)?);
    log::debug!("{sql}");
    let records = session.query_statement(StatementKind::Select, &sql, &values)?;
    let value = records
        .first()
        .and_then(|record| record.get("count"))
        .cloned()
        .ok_or_else(|| OrmError::Parse("count query returned no count column".to_string()))?;
    let count: i64 = convert(value, "count")?;
    u64::try_from(count).map_err(|_| OrmError::Parse(format!("negative count {count}")))
}

/// Insert `model`, writing generated keys back into it
///
/// # Errors
///
/// Returns the `before_insert` failure (nothing is written), or any build or
/// execution failure.
pub fn insert<M: Model>(session: &Session, model: &mut M) -> Result<(), OrmError> {
    let table = schema::registry().get_by_model::<M>()?;
    model.before_insert(session)?;

    let system = session.system();
    let (sql, values) = system.build_insert(&build_insert(&table, model, system)?);
    log::debug!("{sql}");

    let generated = table.is_auto_increment() && !table.keys().is_empty();
    if generated && system.has_capability(Capability::Returning) {
        let records = session.query_statement(StatementKind::Insert, &sql, &values)?;
        if let Some(record) = records.first() {
            hydrate(&table, record, model)?;
        }
        return Ok(());
    }

    session.execute_statement(StatementKind::Insert, &sql, &values)?;
    if let (DatabaseSystem::MySql, Some(key)) = (system, table.single_auto_key()) {
        let sql = format!("SELECT LAST_INSERT_ID() AS {}", system.quote_identifier(key));
        let records = session.query_statement(StatementKind::Select, &sql, &Values(Vec::new()))?;
        if let Some(record) = records.first() {
            hydrate(&table, record, model)?;
        }
    }
    Ok(())
}

/// Update every non-key column of `model`, matched by key
///
/// # Errors
///
/// Returns the `before_update` failure (nothing is written),
/// `OrmError::RowNotFound` when no row has the key, or any build or execution
/// failure.
pub fn update<M: Model>(session: &Session, model: &mut M) -> Result<(), OrmError> {
    let table = schema::registry().get_by_model::<M>()?;
    model.before_update(session)?;

    let system = session.system();
    let (sql, values) = system.build_update(&build_update(&table, model, system)?);
    log::debug!("{sql}");
    let affected = session.execute_statement(StatementKind::Update, &sql, &values)?;
    if affected == 0 {
        return Err(OrmError::RowNotFound(table.display_name()));
    }
    Ok(())
}

/// Delete the row with `model`'s key; returns the number of rows removed.
///
/// # Errors
///
/// Returns any build or execution failure. An absent row is `Ok(0)`.
pub fn delete<M: Model>(session: &Session, model: &M) -> Result<u64, OrmError> {
    let table = schema::registry().get_by_model::<M>()?;
    let system = session.system();
    let (sql, values) = system.build_delete(&build_delete(&table, model, system)?);
    log::debug!("{sql}");
    session.execute_statement(StatementKind::Delete, &sql, &values)
}

/// Insert or update `model`
///
/// With a single auto-increment key, a zero key inserts and anything else
/// updates. Otherwise the row is looked up by its keys first.
///
/// # Errors
///
/// Returns `OrmError::Configuration` for keyless tables or keys the table's
/// filter does not declare, the model hook failure, or any execution failure.
pub fn save<M: Model>(session: &Session, model: &mut M) -> Result<(), OrmError> {
    let table = schema::registry().get_by_model::<M>()?;
    if let Some(key) = table.single_auto_key() {
        let index = table.field_index(key).ok_or_else(|| {
            OrmError::Configuration(format!("Key {key} is not a column of table {}", table.name()))
        })?;
        return if is_zero(&model.value(index)) {
            insert(session, model)
        } else {
            update(session, model)
        };
    }
    if table.keys().is_empty() {
        return Err(OrmError::Configuration(format!(
            "Table {} declares no keys to save by",
            table.name()
        )));
    }
    let keys: Vec<&str> = table.keys().iter().map(String::as_str).collect();
    upsert(session, &table, model, &keys)
}

/// Insert or update `model`, looking it up by `keys` instead of the table's keys
///
/// # Errors
///
/// See [`save`].
pub fn save_with_keys<M: Model>(session: &Session, model: &mut M, keys: &[&str]) -> Result<(), OrmError> {
    let table = schema::registry().get_by_model::<M>()?;
    if keys.is_empty() {
        return Err(OrmError::Configuration(format!(
            "No keys given to save {}",
            table.name()
        )));
    }
    upsert(session, &table, model, keys)
}

fn upsert<M: Model>(session: &Session, table: &Table, model: &mut M, keys: &[&str]) -> Result<(), OrmError> {
    let filter = KeyFilter::new(table, model, keys.iter().copied())?;
    let exists = !fetch(session, table, &filter, StatementKind::SelectOne)?.is_empty();
    log::debug!(
        "saving {} by {}: {}",
        table.name(),
        keys.join(", "),
        if exists { "update" } else { "insert" }
    );
    if exists {
        update(session, model)
    } else {
        insert(session, model)
    }
}
