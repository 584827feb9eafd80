//! Error types for sluice
//!
//! Every fallible operation in the crate returns [`OrmError`]. Registration and
//! filter-shape problems surface as configuration errors at registration or at
//! first build time; database failures are passed through unchanged.

use may_postgres::Error as PostgresError;
use std::fmt;

use crate::connection::ConnectionError;
use crate::transaction::TransactionError;

/// Crate-wide error type
#[derive(Debug)]
pub enum OrmError {
    /// A model or filter type (or a `(database, table)` pair) was never registered
    TableNotFound(String),
    /// No database registered under this name
    DatabaseNotFound(String),
    /// `select_one` (or an update) matched zero rows; carries the TitleCased table name
    RowNotFound(String),
    /// A database name was registered twice
    DuplicateRegistration(String),
    /// Missing loader, malformed filter or model shape, bad key declaration
    Configuration(String),
    /// A relation loader returned neither a single row nor a homogeneous collection
    LoaderShape(String),
    /// Registration attempted after the registries were sealed
    RegistrySealed(String),
    /// The session context was cancelled or its deadline passed
    Cancelled,
    /// `PostgreSQL` error from `may_postgres`
    Postgres(PostgresError),
    /// Statement could not be executed by a non-Postgres executor
    Query(String),
    /// Row or value conversion failed
    Parse(String),
    /// Connection could not be established
    Connection(ConnectionError),
    /// Transaction state error
    Transaction(TransactionError),
}

impl OrmError {
    /// `true` for [`OrmError::RowNotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrmError::RowNotFound(_))
    }

    /// `true` for the programmer-error class (registrations and shapes)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            OrmError::TableNotFound(_)
                | OrmError::Configuration(_)
                | OrmError::LoaderShape(_)
                | OrmError::RegistrySealed(_)
        )
    }
}

impl fmt::Display for OrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrmError::TableNotFound(s) => write!(f, "Table not found: {s}"),
            OrmError::DatabaseNotFound(s) => write!(f, "Database not found: {s}"),
            OrmError::RowNotFound(s) => write!(f, "{s} not found"),
            OrmError::DuplicateRegistration(s) => {
                write!(f, "Database already registered: {s}")
            }
            OrmError::Configuration(s) => write!(f, "Configuration error: {s}"),
            OrmError::LoaderShape(s) => write!(f, "Loader shape error: {s}"),
            OrmError::RegistrySealed(s) => {
                write!(f, "Registry is sealed, cannot register {s}")
            }
            OrmError::Cancelled => write!(f, "Operation cancelled"),
            OrmError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            OrmError::Query(s) => write!(f, "Query error: {s}"),
            OrmError::Parse(s) => write!(f, "Parse error: {s}"),
            OrmError::Connection(e) => write!(f, "{e}"),
            OrmError::Transaction(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OrmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OrmError::Postgres(e) => Some(e),
            OrmError::Connection(e) => Some(e),
            OrmError::Transaction(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for OrmError {
    fn from(err: PostgresError) -> Self {
        OrmError::Postgres(err)
    }
}

impl From<ConnectionError> for OrmError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::PostgresError(e) => OrmError::Postgres(e),
            other => OrmError::Connection(other),
        }
    }
}

impl From<TransactionError> for OrmError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Executor(e) => *e,
            other => OrmError::Transaction(other),
        }
    }
}
