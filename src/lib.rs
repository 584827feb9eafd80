//! # sluice
//!
//! Filter-driven ORM on the `may` coroutine runtime.
//!
//! Models and filters are plain structs that describe themselves; the schema
//! registry maps them to tables, the query builder turns a filter tree into
//! SQL (joins, predicates, ordering, pagination, projection, row locking) and
//! the eager resolver loads requested relations in batches after the primary
//! query. Statements are built with `sea-query` and run through a [`Session`].
//!
//! ```no_run
//! use sluice::{crud, Context, Session};
//! # use sluice::OrmError;
//! # fn main() -> Result<(), OrmError> {
//! let config = sluice::DatabaseConfig::load().map_err(|e| OrmError::Configuration(e.to_string()))?;
//! sluice::database::register_from_config(&config)?;
//! // ... register tables with sluice::schema::register ...
//! sluice::seal();
//!
//! let session = Session::open_with_context(&config.name, Context::background())?;
//! # let _ = session;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod crud;
pub mod database;
pub mod dialect;
pub mod eager;
pub mod error;
pub mod executor;
pub mod filter;
pub mod hook;
pub mod metrics;
pub mod model;
pub mod query;
pub mod record;
pub mod registry;
pub mod schema;
pub mod session;
pub mod transaction;
pub mod value;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
#[cfg(test)]
mod tests_cfg;

pub use config::DatabaseConfig;
pub use connection::{connect, ConnectionError};
pub use database::Database;
pub use dialect::{Capability, DatabaseSystem};
pub use eager::{LoadedRows, BATCH_SIZE};
pub use error::OrmError;
pub use executor::{Executor, PgExecutor};
pub use filter::{Filter, FilterField, FilterOptions, TypedFilter, ValueFilter};
pub use hook::{ExecutorHook, LoggingHook, NoopHook};
pub use model::{FieldDef, HasMany, HasOne, Model, Relation};
pub use record::Record;
pub use registry::seal;
pub use schema::Table;
pub use session::{Context, Session};
pub use transaction::{IsolationLevel, Transaction, TransactionError};
