//! Database registry
//!
//! A [`Database`] pairs a name and a [`DatabaseSystem`] with the executor that
//! reaches it and an optional execution hook. Databases are registered once at
//! startup and looked up by name when sessions are opened.
//!
//! Statements outside a transaction share the database's executor. A
//! transaction holds its own executor from [`Database::transaction_executor`]
//! until it ends, so `BEGIN` on one session never captures another session's
//! statements.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::DatabaseConfig;
use crate::connection::{connect, ConnectionError};
use crate::dialect::DatabaseSystem;
use crate::error::OrmError;
use crate::executor::{Executor, PgExecutor};
use crate::hook::{ExecutorHook, LoggingHook, NoopHook};
use crate::registry::Seal;

/// Opens the executor a transaction holds until it commits or rolls back
pub type ExecutorFactory = Arc<dyn Fn() -> Result<Arc<dyn Executor>, OrmError> + Send + Sync>;

/// A registered database
pub struct Database {
    name: String,
    system: DatabaseSystem,
    executor: Arc<dyn Executor>,
    transaction_executor: Option<ExecutorFactory>,
    hook: Arc<dyn ExecutorHook>,
    interval_style: Option<String>,
}

impl Database {
    pub fn new(
        name: impl Into<String>,
        system: DatabaseSystem,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            name: name.into(),
            system,
            executor,
            transaction_executor: None,
            hook: Arc::new(NoopHook),
            interval_style: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ExecutorHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Dedicated executors for transactions, one per `begin`
    ///
    /// Without a factory, transactions run on the shared executor. That is only
    /// sound when a single session uses this database at a time.
    pub fn with_transaction_executor<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Executor>, OrmError> + Send + Sync + 'static,
    {
        self.transaction_executor = Some(Arc::new(factory));
        self
    }

    /// Postgres `intervalstyle` set on every new session.
    pub fn with_interval_style(mut self, style: impl Into<String>) -> Self {
        self.interval_style = Some(style.into());
        self
    }

    /// Connect with the built-in Postgres driver and build a database from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::UnsupportedSystem` for systems without a built-in
    /// driver, or the connection failure.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        if config.system != DatabaseSystem::Postgres {
            return Err(ConnectionError::UnsupportedSystem(
                config.system.driver_name().to_string(),
            ));
        }
        let client = connect(&config.url)?;
        let url = config.url.clone();
        let interval_style = config.interval_style.clone();
        let mut database = Database::new(
            config.name.clone(),
            config.system,
            Arc::new(PgExecutor::new(client)),
        )
        .with_transaction_executor(move || {
            let executor = PgExecutor::new(connect(&url)?);
            if let Some(style) = &interval_style {
                let sql = format!(
                    "SET intervalstyle = {}",
                    DatabaseSystem::Postgres.quote_literal(style)
                );
                executor.execute(&sql, &[])?;
            }
            Ok(Arc::new(executor) as Arc<dyn Executor>)
        });
        if let Some(style) = &config.interval_style {
            database = database.with_interval_style(style.clone());
        }
        if config.log_statements {
            database = database.with_hook(Arc::new(LoggingHook));
        }
        Ok(database)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system(&self) -> DatabaseSystem {
        self.system
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// The executor a new transaction should hold
    ///
    /// # Errors
    ///
    /// Returns the factory's failure, typically a connection error.
    pub fn transaction_executor(&self) -> Result<Arc<dyn Executor>, OrmError> {
        match &self.transaction_executor {
            Some(factory) => factory(),
            None => Ok(Arc::clone(&self.executor)),
        }
    }

    pub fn hook(&self) -> &Arc<dyn ExecutorHook> {
        &self.hook
    }

    pub fn interval_style(&self) -> Option<&str> {
        self.interval_style.as_deref()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("system", &self.system)
            .field("interval_style", &self.interval_style)
            .field("dedicated_transactions", &self.transaction_executor.is_some())
            .finish_non_exhaustive()
    }
}

static DATABASES: Lazy<RwLock<HashMap<String, Arc<Database>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));
static SEAL: Seal = Seal::new();

pub(crate) fn seal() {
    SEAL.seal();
}

/// Register a database under its name
///
/// # Errors
///
/// Returns `OrmError::DuplicateRegistration` if the name is taken, or
/// `OrmError::RegistrySealed` after [`crate::seal`].
pub fn register(database: Database) -> Result<Arc<Database>, OrmError> {
    SEAL.check(&database.name)?;
    let mut databases = DATABASES
        .write()
        .map_err(|e| OrmError::Configuration(format!("Failed to lock database registry: {e}")))?;
    if databases.contains_key(&database.name) {
        return Err(OrmError::DuplicateRegistration(database.name));
    }
    log::info!(
        "registered database {} ({})",
        database.name,
        database.system.driver_name()
    );
    let database = Arc::new(database);
    databases.insert(database.name.clone(), Arc::clone(&database));
    Ok(database)
}

/// Connect using `config` and register the result
///
/// # Errors
///
/// Returns connection failures or `OrmError::DuplicateRegistration`.
pub fn register_from_config(config: &DatabaseConfig) -> Result<Arc<Database>, OrmError> {
    register(Database::connect(config)?)
}

/// Remove a database from the registry
///
/// # Errors
///
/// Returns `OrmError::DatabaseNotFound` if nothing is registered under `name`.
pub fn unregister(name: &str) -> Result<(), OrmError> {
    let mut databases = DATABASES
        .write()
        .map_err(|e| OrmError::Configuration(format!("Failed to lock database registry: {e}")))?;
    databases
        .remove(name)
        .map(|_| ())
        .ok_or_else(|| OrmError::DatabaseNotFound(name.to_string()))
}

/// Look up a registered database
///
/// # Errors
///
/// Returns `OrmError::DatabaseNotFound` if nothing is registered under `name`.
pub fn get(name: &str) -> Result<Arc<Database>, OrmError> {
    let databases = DATABASES
        .read()
        .map_err(|e| OrmError::Configuration(format!("Failed to lock database registry: {e}")))?;
    databases
        .get(name)
        .cloned()
        .ok_or_else(|| OrmError::DatabaseNotFound(name.to_string()))
}
