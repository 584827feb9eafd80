//! Model trait and field descriptors
//!
//! A model is a plain struct that describes itself through [`FieldDef`]s and
//! exposes indexed getters and setters, so the query builder and the eager
//! resolver can read and write columns without knowing the concrete type. The
//! field index is the position of the field in [`Model::fields`].
//!
//! # Example
//!
//! ```
//! use sea_query::Value;
//! use sluice::model::{FieldDef, HasOne, Model, Relation, RelationSlot};
//! use sluice::value::convert;
//! use sluice::OrmError;
//!
//! #[derive(Debug, Default, Clone)]
//! struct Category {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Model for Category {
//!     fn fields() -> Vec<FieldDef> {
//!         vec![FieldDef::column("id"), FieldDef::column("name")]
//!     }
//!
//!     fn value(&self, index: usize) -> Value {
//!         match index {
//!             0 => self.id.into(),
//!             _ => self.name.clone().into(),
//!         }
//!     }
//!
//!     fn set_value(&mut self, index: usize, value: Value) -> Result<(), OrmError> {
//!         match index {
//!             0 => self.id = convert(value, "id")?,
//!             _ => self.name = convert(value, "name")?,
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Debug, Default, Clone)]
//! struct Post {
//!     id: i64,
//!     category_id: i64,
//!     category: HasOne<Category>,
//! }
//!
//! impl Model for Post {
//!     fn fields() -> Vec<FieldDef> {
//!         vec![
//!             FieldDef::column("id"),
//!             FieldDef::column("category_id"),
//!             FieldDef::relation("category", Relation::to("category", "category_id")),
//!         ]
//!     }
//!
//!     fn value(&self, index: usize) -> Value {
//!         match index {
//!             0 => self.id.into(),
//!             _ => self.category_id.into(),
//!         }
//!     }
//!
//!     fn set_value(&mut self, index: usize, value: Value) -> Result<(), OrmError> {
//!         match index {
//!             0 => self.id = convert(value, "id")?,
//!             _ => self.category_id = convert(value, "category_id")?,
//!         }
//!         Ok(())
//!     }
//!
//!     fn relation_mut(&mut self, index: usize) -> Option<&mut dyn RelationSlot> {
//!         match index {
//!             2 => Some(&mut self.category),
//!             _ => None,
//!         }
//!     }
//! }
//! ```

use sea_query::Value;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::error::OrmError;
use crate::session::Session;

/// Type identity and sharing for models behind `dyn Model`
///
/// Implemented for every `'static` type, so models never implement it by hand.
/// On a `Box<dyn Model>` call these through `&**boxed`, otherwise the box itself
/// answers.
pub trait AsAnyModel: Any + Send + Sync {
    fn model_type(&self) -> TypeId;
    fn model_name(&self) -> &'static str;
    fn into_shared(self: Box<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAnyModel for T {
    fn model_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn model_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn into_shared(self: Box<Self>) -> Arc<dyn Any + Send + Sync> {
        let shared: Arc<T> = Arc::from(self);
        shared
    }
}

/// A relation field: the loader table plus the owner column holding the key,
/// and the column on loaded rows that points back at the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub table: &'static str,
    pub owner_column: &'static str,
    pub mapper: &'static str,
}

impl Relation {
    /// The owner holds a foreign key to `table.id`.
    pub const fn to(table: &'static str, owner_column: &'static str) -> Self {
        Self {
            table,
            owner_column,
            mapper: "id",
        }
    }

    /// Rows of `table` point back at the owner through `mapper`.
    pub const fn reverse(
        table: &'static str,
        owner_column: &'static str,
        mapper: &'static str,
    ) -> Self {
        Self {
            table,
            owner_column,
            mapper,
        }
    }

    /// Key of the loader serving this relation.
    pub fn loader_key(&self) -> String {
        loader_key(self.table, self.mapper)
    }
}

/// `"<table>"` for `id` mappers, `"<table>_per_<mapper>"` otherwise.
pub fn loader_key(table: &str, mapper: &str) -> String {
    if mapper == "id" {
        table.to_string()
    } else {
        format!("{table}_per_{mapper}")
    }
}

/// One declared field of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDef {
    /// A mapped column
    Column(&'static str),
    /// Present on the struct but never read from or written to the database
    Excluded(&'static str),
    /// A relation slot filled by the eager resolver
    Relation {
        name: &'static str,
        relation: Relation,
    },
}

impl FieldDef {
    pub const fn column(name: &'static str) -> Self {
        FieldDef::Column(name)
    }

    pub const fn excluded(name: &'static str) -> Self {
        FieldDef::Excluded(name)
    }

    pub const fn relation(name: &'static str, relation: Relation) -> Self {
        FieldDef::Relation { name, relation }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldDef::Column(name) | FieldDef::Excluded(name) => name,
            FieldDef::Relation { name, .. } => name,
        }
    }
}

/// A row type mapped to a registered table
///
/// The object-safe part (`value`, `set_value`, `relation_mut` and the hooks) is
/// what the engine uses on loaded rows of any type.
pub trait Model: AsAnyModel {
    /// Field descriptors in declaration order.
    fn fields() -> Vec<FieldDef>
    where
        Self: Sized;

    /// Current value of the column at `index`.
    fn value(&self, index: usize) -> Value;

    /// Store a value read from the database into the column at `index`.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Parse` when the value cannot be converted.
    fn set_value(&mut self, index: usize, value: Value) -> Result<(), OrmError>;

    /// Relation slot at `index`, if that field is a relation.
    fn relation_mut(&mut self, _index: usize) -> Option<&mut dyn RelationSlot> {
        None
    }

    /// Runs before the row is inserted; an error aborts the insert.
    ///
    /// # Errors
    ///
    /// Whatever the model decides.
    fn before_insert(&mut self, _session: &Session) -> Result<(), OrmError> {
        Ok(())
    }

    /// Runs before the row is updated; an error aborts the update.
    ///
    /// # Errors
    ///
    /// Whatever the model decides.
    fn before_update(&mut self, _session: &Session) -> Result<(), OrmError> {
        Ok(())
    }
}

/// Destination for eagerly loaded rows
pub trait RelationSlot: Send + Sync {
    /// Attach one loaded row: assign for to-one slots, append for to-many slots.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Configuration` when `row` is not the slot's model type.
    fn attach(&mut self, row: Arc<dyn Any + Send + Sync>) -> Result<(), OrmError>;
}

fn slot_mismatch<M>() -> OrmError {
    OrmError::Configuration(format!(
        "Loaded row does not fit a relation of {}",
        std::any::type_name::<M>()
    ))
}

/// To-one relation slot
pub struct HasOne<M>(Option<Arc<M>>);

impl<M> HasOne<M> {
    pub fn get(&self) -> Option<&M> {
        self.0.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.0.is_some()
    }

    pub fn set(&mut self, row: Arc<M>) {
        self.0 = Some(row);
    }
}

impl<M> Default for HasOne<M> {
    fn default() -> Self {
        Self(None)
    }
}

impl<M> Clone for HasOne<M> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<M: fmt::Debug> fmt::Debug for HasOne<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HasOne").field(&self.0).finish()
    }
}

impl<M: Any + Send + Sync> RelationSlot for HasOne<M> {
    fn attach(&mut self, row: Arc<dyn Any + Send + Sync>) -> Result<(), OrmError> {
        let row = row.downcast::<M>().map_err(|_| slot_mismatch::<M>())?;
        self.0 = Some(row);
        Ok(())
    }
}

/// To-many relation slot
pub struct HasMany<M>(Vec<Arc<M>>);

impl<M> HasMany<M> {
    pub fn iter(&self) -> impl Iterator<Item = &M> {
        self.0.iter().map(|row| row.as_ref())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, row: Arc<M>) {
        self.0.push(row);
    }
}

impl<M> Default for HasMany<M> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<M> Clone for HasMany<M> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<M: fmt::Debug> fmt::Debug for HasMany<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HasMany").field(&self.0).finish()
    }
}

impl<M: Any + Send + Sync> RelationSlot for HasMany<M> {
    fn attach(&mut self, row: Arc<dyn Any + Send + Sync>) -> Result<(), OrmError> {
        let row = row.downcast::<M>().map_err(|_| slot_mismatch::<M>())?;
        self.0.push(row);
        Ok(())
    }
}
