//! Database systems and their capabilities
//!
//! The query builder never hard-codes a dialect: it asks [`DatabaseSystem`]
//! whether row locking, schemas or `RETURNING` are available, and renders
//! statements through the matching `sea_query` backend (which also fixes the
//! placeholder convention).

use sea_query::{
    DeleteStatement, InsertStatement, MysqlQueryBuilder, PostgresQueryBuilder, SelectStatement,
    SqliteQueryBuilder, UpdateStatement, Values,
};
use serde::Deserialize;
use std::fmt;

/// Supported database management systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseSystem {
    #[default]
    #[serde(alias = "postgresql")]
    Postgres,
    MySql,
    #[serde(alias = "sqlite3")]
    Sqlite,
}

/// Features only some systems provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Namespaced (schema-qualified) tables
    Schema,
    /// Native UUID column type
    Uuid,
    /// `SELECT ... FOR UPDATE OF <table>`
    SelectForUpdate,
    /// `INSERT ... RETURNING`
    Returning,
}

/// Placeholder convention for bound parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ...
    Numbered,
    /// `?`
    Question,
}

macro_rules! render_with_backend {
    ($($name:ident => $stmt:ty),* $(,)?) => {
        $(
            pub fn $name(&self, statement: &$stmt) -> (String, Values) {
                match self {
                    DatabaseSystem::Postgres => statement.build(PostgresQueryBuilder),
                    DatabaseSystem::MySql => statement.build(MysqlQueryBuilder),
                    DatabaseSystem::Sqlite => statement.build(SqliteQueryBuilder),
                }
            }
        )*
    };
}

impl DatabaseSystem {
    pub fn driver_name(&self) -> &'static str {
        match self {
            DatabaseSystem::Postgres => "postgres",
            DatabaseSystem::MySql => "mysql",
            DatabaseSystem::Sqlite => "sqlite3",
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        match (self, capability) {
            (DatabaseSystem::Postgres, _) => true,
            (DatabaseSystem::MySql, Capability::Schema) => true,
            (DatabaseSystem::MySql, _) => false,
            (DatabaseSystem::Sqlite, Capability::Returning) => true,
            (DatabaseSystem::Sqlite, _) => false,
        }
    }

    pub fn can_select_for_update(&self) -> bool {
        self.has_capability(Capability::SelectForUpdate)
    }

    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            DatabaseSystem::Postgres => PlaceholderStyle::Numbered,
            DatabaseSystem::MySql | DatabaseSystem::Sqlite => PlaceholderStyle::Question,
        }
    }

    /// Placeholder text for the 1-based parameter `position`.
    pub fn placeholder(&self, position: usize) -> String {
        match self.placeholder_style() {
            PlaceholderStyle::Numbered => format!("${position}"),
            PlaceholderStyle::Question => "?".to_string(),
        }
    }

    /// Quote an identifier (table, alias or column name).
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            DatabaseSystem::MySql => format!("`{}`", ident.replace('`', "``")),
            DatabaseSystem::Postgres | DatabaseSystem::Sqlite => {
                format!("\"{}\"", ident.replace('"', "\"\""))
            }
        }
    }

    /// Quote a string literal for statements that cannot take bound parameters.
    pub fn quote_literal(&self, value: &str) -> String {
        match self {
            DatabaseSystem::MySql => {
                format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
            }
            DatabaseSystem::Postgres | DatabaseSystem::Sqlite => {
                format!("'{}'", value.replace('\'', "''"))
            }
        }
    }

    render_with_backend!(
        build_select => SelectStatement,
        build_insert => InsertStatement,
        build_update => UpdateStatement,
        build_delete => DeleteStatement,
    );
}

impl fmt::Display for DatabaseSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver_name())
    }
}
