//! Column projection
//!
//! The deny list is subtracted from the allow list first. A non-empty
//! remainder is loaded as is; an empty one falls back to every column minus
//! the deny list. Unknown names never add columns.

use std::collections::HashSet;

use crate::error::OrmError;
use crate::filter::FilterOptions;
use crate::schema::{Column, Table};

/// Columns to select, in registration order
///
/// # Errors
///
/// Returns `OrmError::Configuration` when nothing is left to select.
pub(crate) fn projected_columns<'t>(
    table: &'t Table,
    options: &FilterOptions,
) -> Result<Vec<&'t Column>, OrmError> {
    let deny: HashSet<&str> = options.dont_load_columns.iter().map(String::as_str).collect();
    let allow: HashSet<&str> = options
        .load_columns
        .iter()
        .map(String::as_str)
        .filter(|c| !deny.contains(c))
        .collect();

    let columns: Vec<&Column> = if allow.is_empty() {
        table
            .columns()
            .iter()
            .filter(|c| !deny.contains(c.name.as_str()))
            .collect()
    } else {
        table
            .columns()
            .iter()
            .filter(|c| allow.contains(c.name.as_str()))
            .collect()
    };

    if columns.is_empty() {
        return Err(OrmError::Configuration(format!(
            "No column left to load from table {}",
            table.name()
        )));
    }
    Ok(columns)
}
