//! Schema registry
//!
//! Maps model types and filter types to their [`Table`] metadata. Tables are
//! registered once at startup through [`register`]:
//!
//! ```no_run
//! # use sluice::model::{FieldDef, Model};
//! # use sluice::filter::{Filter, FilterField, FilterOptions};
//! # use sluice::OrmError;
//! # #[derive(Default)] struct PostTag;
//! # impl Model for PostTag {
//! #     fn fields() -> Vec<FieldDef> { vec![FieldDef::column("post_id"), FieldDef::column("tag_id")] }
//! #     fn value(&self, _: usize) -> sea_query::Value { 0i64.into() }
//! #     fn set_value(&mut self, _: usize, _: sea_query::Value) -> Result<(), OrmError> { Ok(()) }
//! # }
//! # #[derive(Default)] struct PostTagFilter { options: FilterOptions }
//! # impl Filter for PostTagFilter {
//! #     fn options(&self) -> &FilterOptions { &self.options }
//! #     fn fields(&self) -> Vec<FilterField<'_>> { vec![] }
//! # }
//! # fn main() -> Result<(), OrmError> {
//! sluice::schema::register::<PostTag>("default", "post_tag")
//!     .with_keys(&["post_id", "tag_id"])
//!     .with_auto_increment(false)
//!     .with_filter::<PostTagFilter>()
//!     .register()?;
//! # Ok(())
//! # }
//! ```
//!
//! Lookups are O(1) by model type, filter type or `(database, table)`.

mod table;

pub use table::{Column, Table, TableRelation};

use once_cell::sync::Lazy;
use regex::Regex;
use sea_query::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use crate::eager::{self, LoadedRows, LoaderFn};
use crate::error::OrmError;
use crate::filter::{Filter, FilterField};
use crate::model::{loader_key, FieldDef, Model};
use crate::registry::Seal;
use crate::session::Session;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex pattern"));

fn validate_identifier(kind: &str, ident: &str) -> Result<(), OrmError> {
    if IDENTIFIER.is_match(ident) {
        Ok(())
    } else {
        Err(OrmError::Configuration(format!("Invalid {kind} name: {ident:?}")))
    }
}

#[derive(Default)]
struct Inner {
    by_name: HashMap<(String, String), Arc<Table>>,
    by_model: HashMap<TypeId, Arc<Table>>,
    by_filter: HashMap<TypeId, Arc<Table>>,
}

/// Process-wide table registry
#[derive(Default)]
pub struct SchemaRegistry {
    inner: RwLock<Inner>,
    seal: Seal,
}

static REGISTRY: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::new);

/// The process-wide schema registry.
pub fn registry() -> &'static SchemaRegistry {
    &REGISTRY
}

/// Start registering `M` as `table` of database `database`.
pub fn register<M: Model>(database: &str, table: &str) -> TableBuilder<'static, M> {
    registry().table::<M>(database, table)
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seal(&self) {
        self.seal.seal();
    }

    pub fn is_sealed(&self) -> bool {
        self.seal.is_sealed()
    }

    pub fn table<M: Model>(&self, database: &str, table: &str) -> TableBuilder<'_, M> {
        TableBuilder {
            registry: self,
            database: database.to_string(),
            name: table.to_string(),
            schema: None,
            keys: None,
            auto_increment: true,
            filter: None,
            loaders: Vec::new(),
            _model: PhantomData,
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, OrmError> {
        self.inner
            .read()
            .map_err(|e| OrmError::Configuration(format!("Failed to lock schema registry: {e}")))
    }

    fn insert(&self, table: Table) -> Result<Arc<Table>, OrmError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| OrmError::Configuration(format!("Failed to lock schema registry: {e}")))?;

        let name_key = (table.database.clone(), table.name.clone());
        let mut replaced: Vec<Arc<Table>> = Vec::new();
        for old in [
            inner.by_model.get(&table.model_type).cloned(),
            inner.by_name.get(&name_key).cloned(),
        ]
        .into_iter()
        .flatten()
        {
            if !replaced.iter().any(|seen| Arc::ptr_eq(seen, &old)) {
                replaced.push(old);
            }
        }
        for old in replaced {
            log::warn!(
                "replacing registration of {}.{} ({})",
                old.database,
                old.name,
                old.model_name
            );
            inner
                .by_name
                .remove(&(old.database.clone(), old.name.clone()));
            inner.by_model.remove(&old.model_type);
            if let Some(filter_type) = old.filter_type {
                inner.by_filter.remove(&filter_type);
            }
        }

        let table = Arc::new(table);
        inner.by_name.insert(name_key, Arc::clone(&table));
        inner.by_model.insert(table.model_type, Arc::clone(&table));
        if let Some(filter_type) = table.filter_type {
            inner.by_filter.insert(filter_type, Arc::clone(&table));
        }
        Ok(table)
    }

    /// # Errors
    ///
    /// Returns `OrmError::TableNotFound` if `M` was never registered.
    pub fn get_by_model<M: Model>(&self) -> Result<Arc<Table>, OrmError> {
        self.get_by_model_type(TypeId::of::<M>(), std::any::type_name::<M>())
    }

    /// # Errors
    ///
    /// Returns `OrmError::TableNotFound` if the model type was never registered.
    pub fn get_by_model_type(&self, model_type: TypeId, name: &str) -> Result<Arc<Table>, OrmError> {
        self.read()?
            .by_model
            .get(&model_type)
            .cloned()
            .ok_or_else(|| OrmError::TableNotFound(name.to_string()))
    }

    /// # Errors
    ///
    /// Returns `OrmError::TableNotFound` if the filter's type was never registered.
    pub fn get_by_filter(&self, filter: &dyn Filter) -> Result<Arc<Table>, OrmError> {
        self.read()?
            .by_filter
            .get(&filter.filter_type())
            .cloned()
            .ok_or_else(|| OrmError::TableNotFound(filter.filter_name().to_string()))
    }

    /// # Errors
    ///
    /// Returns `OrmError::TableNotFound` if nothing is registered under that name.
    pub fn get(&self, database: &str, table: &str) -> Result<Arc<Table>, OrmError> {
        self.read()?
            .by_name
            .get(&(database.to_string(), table.to_string()))
            .cloned()
            .ok_or_else(|| OrmError::TableNotFound(format!("{database}.{table}")))
    }
}

/// Pending registration of one model type
pub struct TableBuilder<'r, M> {
    registry: &'r SchemaRegistry,
    database: String,
    name: String,
    schema: Option<String>,
    keys: Option<Vec<String>>,
    auto_increment: bool,
    filter: Option<(TypeId, Vec<&'static str>)>,
    loaders: Vec<(String, LoaderFn)>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> TableBuilder<'_, M> {
    /// Key columns; defaults to `id` when the model has that column.
    pub fn with_keys(mut self, keys: &[&str]) -> Self {
        self.keys = Some(keys.iter().map(|k| (*k).to_string()).collect());
        self
    }

    pub fn with_auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    /// Index `F` back to this table; replaces any previous filter type.
    ///
    /// The value fields `F` declares are what key lookups built from a model
    /// (`save`, `select_one_from_model`) may filter on.
    pub fn with_filter<F: Filter + Default>(mut self) -> Self {
        let columns = F::default()
            .fields()
            .into_iter()
            .filter_map(|field| match field {
                FilterField::Value { column, .. } => Some(column),
                FilterField::Nested { .. } => None,
            })
            .collect();
        self.filter = Some((TypeId::of::<F>(), columns));
        self
    }

    /// Register the subquery loader serving this table, keyed by `mapper`.
    pub fn with_loader<L>(mut self, mapper: &str, loader: L) -> Self
    where
        L: Fn(&Session, &[Value]) -> Result<LoadedRows, OrmError> + Send + Sync + 'static,
    {
        self.loaders.push((mapper.to_string(), Arc::new(loader)));
        self
    }

    /// Validate and store the table
    ///
    /// # Errors
    ///
    /// Returns `OrmError::RegistrySealed` after sealing, and
    /// `OrmError::Configuration` for models without columns, invalid
    /// identifiers, or keys and loader mappers that are not columns. Nothing is
    /// stored when validation fails.
    pub fn register(self) -> Result<Arc<Table>, OrmError> {
        self.registry.seal.check(&self.name)?;
        validate_identifier("database", &self.database)?;
        validate_identifier("table", &self.name)?;
        if let Some(schema) = &self.schema {
            validate_identifier("schema", schema)?;
        }

        let mut columns = Vec::new();
        let mut relations = Vec::new();
        for (field_index, field) in M::fields().into_iter().enumerate() {
            match field {
                FieldDef::Column(name) => {
                    validate_identifier("column", name)?;
                    columns.push(Column {
                        name: name.to_string(),
                        field_index,
                    });
                }
                FieldDef::Excluded(_) => {}
                FieldDef::Relation { name, relation } => relations.push(TableRelation {
                    name: name.to_string(),
                    field_index,
                    relation,
                }),
            }
        }
        if columns.is_empty() {
            log::error!(
                "model {} registered as {} declares no columns",
                std::any::type_name::<M>(),
                self.name
            );
            return Err(OrmError::Configuration(format!(
                "Model {} for table {} has no columns",
                std::any::type_name::<M>(),
                self.name
            )));
        }

        let column_index: HashMap<String, usize> = columns
            .iter()
            .map(|c| (c.name.clone(), c.field_index))
            .collect();
        let keys = match self.keys {
            Some(keys) => keys,
            None if column_index.contains_key("id") => vec!["id".to_string()],
            None => Vec::new(),
        };
        if let Some(bad) = keys.iter().find(|k| !column_index.contains_key(k.as_str())) {
            return Err(OrmError::Configuration(format!(
                "Key {bad} is not a column of table {}",
                self.name
            )));
        }

        if let Some((mapper, _)) = self
            .loaders
            .iter()
            .find(|(mapper, _)| !column_index.contains_key(mapper.as_str()))
        {
            return Err(OrmError::Configuration(format!(
                "Loader mapper {mapper} is not a column of table {}",
                self.name
            )));
        }
        if !self.loaders.is_empty() {
            eager::loaders().check_open(&self.name)?;
        }

        let (filter_type, filter_columns) = match self.filter {
            Some((filter_type, columns)) => (Some(filter_type), columns),
            None => (None, Vec::new()),
        };
        let table = Table {
            database: self.database,
            name: self.name,
            schema: self.schema,
            columns,
            column_index,
            keys,
            auto_increment: self.auto_increment,
            relations,
            model_type: TypeId::of::<M>(),
            model_name: std::any::type_name::<M>(),
            filter_type,
            filter_columns,
        };
        let table = self.registry.insert(table)?;

        for (mapper, loader) in self.loaders {
            eager::loaders().insert(loader_key(table.name(), &mapper), &mapper, loader)?;
        }

        log::info!(
            "registered table {}.{} for {}",
            table.database(),
            table.name(),
            table.model_name()
        );
        Ok(table)
    }
}
