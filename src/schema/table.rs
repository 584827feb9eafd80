//! Registered table metadata

use std::any::TypeId;
use std::collections::HashMap;

use crate::model::Relation;

/// A mapped column and the model field that holds it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub field_index: usize,
}

/// A relation field declared on the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRelation {
    pub name: String,
    pub field_index: usize,
    pub relation: Relation,
}

/// Metadata for one registered model type
///
/// Built by [`super::TableBuilder`] and immutable once registered.
#[derive(Debug, Clone)]
pub struct Table {
    pub(super) database: String,
    pub(super) name: String,
    pub(super) schema: Option<String>,
    pub(super) columns: Vec<Column>,
    pub(super) column_index: HashMap<String, usize>,
    pub(super) keys: Vec<String>,
    pub(super) auto_increment: bool,
    pub(super) relations: Vec<TableRelation>,
    pub(super) model_type: TypeId,
    pub(super) model_name: &'static str,
    pub(super) filter_type: Option<TypeId>,
    pub(super) filter_columns: Vec<&'static str>,
}

impl Table {
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Columns in registration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index.contains_key(column)
    }

    /// Model field index holding `column`.
    pub fn field_index(&self, column: &str) -> Option<usize> {
        self.column_index.get(column).copied()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_key(&self, column: &str) -> bool {
        self.keys.iter().any(|k| k == column)
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// The key column when the table has exactly one auto-incrementing key.
    pub fn single_auto_key(&self) -> Option<&str> {
        match self.keys.as_slice() {
            [key] if self.auto_increment => Some(key.as_str()),
            _ => None,
        }
    }

    pub fn relations(&self) -> &[TableRelation] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&TableRelation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn model_type(&self) -> TypeId {
        self.model_type
    }

    pub fn model_name(&self) -> &'static str {
        self.model_name
    }

    pub fn filter_type(&self) -> Option<TypeId> {
        self.filter_type
    }

    /// The registered filter's value field for `column`, if it declares one.
    pub fn filter_column(&self, column: &str) -> Option<&'static str> {
        self.filter_columns.iter().copied().find(|c| *c == column)
    }

    /// `post_tag` becomes `PostTag`; used in not-found messages.
    pub fn display_name(&self) -> String {
        title_case(&self.name)
    }
}

pub(crate) fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
