//! Sessions
//!
//! A [`Session`] is the execution handle every CRUD call runs against: a
//! registered [`Database`], a cancellation [`Context`], a per-session UUID and,
//! while one is open, a [`Transaction`]. Statements go through the database's
//! execution hook and are checked against the context before they run.
//!
//! A session is `Send` but must not be shared between concurrent callers; open
//! one per logical request (or per coroutine).

use sea_query::Values;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::database::{self, Database};
use crate::dialect::{Capability, DatabaseSystem};
use crate::error::OrmError;
use crate::executor::{with_converted_params, Executor};
use crate::record::Record;
use crate::transaction::{IsolationLevel, Transaction, TransactionError};

/// Cancellation token with an optional deadline
///
/// Clones share the cancel flag, so a handle kept by the caller can cancel a
/// session running elsewhere.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// # Errors
    ///
    /// Returns `OrmError::Cancelled` once cancelled or past the deadline.
    pub fn check(&self) -> Result<(), OrmError> {
        if self.is_cancelled() {
            return Err(OrmError::Cancelled);
        }
        Ok(())
    }
}

/// Which hook pair a statement is reported to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatementKind {
    SelectOne,
    Select,
    Insert,
    Update,
    Delete,
    Exec,
}

pub struct Session {
    database: Arc<Database>,
    context: Context,
    id: Uuid,
    transaction: Option<Transaction>,
}

impl Session {
    /// Open a session on a registered database with a background context
    ///
    /// The first successful open seals the schema, loader and database
    /// registries.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::DatabaseNotFound` for unknown names, or the failure of
    /// the system's session settings.
    pub fn open(name: &str) -> Result<Self, OrmError> {
        Self::open_with_context(name, Context::background())
    }

    /// Seals the registries on first use; see [`crate::registry`].
    ///
    /// # Errors
    ///
    /// See [`Session::open`].
    pub fn open_with_context(name: &str, context: Context) -> Result<Self, OrmError> {
        let database = database::get(name)?;
        crate::registry::seal();
        Self::with_database(database, context)
    }

    /// Open a session on a database handle that is not necessarily registered
    ///
    /// # Errors
    ///
    /// Returns the failure of the system's session settings.
    pub fn with_database(database: Arc<Database>, context: Context) -> Result<Self, OrmError> {
        let session = Self {
            database,
            context,
            id: Uuid::new_v4(),
            transaction: None,
        };
        session.on_created()?;
        Ok(session)
    }

    fn on_created(&self) -> Result<(), OrmError> {
        if self.system() != DatabaseSystem::Postgres {
            return Ok(());
        }
        if let Some(style) = self.database.interval_style() {
            let sql = format!("SET intervalstyle = {}", self.system().quote_literal(style));
            self.exec(&sql, &Values(Vec::new()))?;
        }
        Ok(())
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn system(&self) -> DatabaseSystem {
        self.database.system()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn uuid(&self) -> Uuid {
        self.id
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.system().has_capability(capability)
    }

    pub fn can_select_for_update(&self) -> bool {
        self.system().can_select_for_update()
    }

    /// Quote an identifier for this session's dialect.
    pub fn escape_value(&self, value: &str) -> String {
        self.system().quote_identifier(value)
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// # Errors
    ///
    /// Returns `TransactionError::AlreadyActive` or the `BEGIN` failure.
    pub fn begin(&mut self) -> Result<(), OrmError> {
        self.begin_with_isolation(IsolationLevel::default())
    }

    /// # Errors
    ///
    /// Returns `TransactionError::AlreadyActive`, the failure to obtain a
    /// transaction executor, or the `BEGIN` failure.
    pub fn begin_with_isolation(&mut self, level: IsolationLevel) -> Result<(), OrmError> {
        if self.transaction.is_some() {
            return Err(TransactionError::AlreadyActive.into());
        }
        self.context.check()?;
        let tx = Transaction::begin(self.database.transaction_executor()?, level)?;
        self.transaction = Some(tx);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `TransactionError::NotActive` or the `COMMIT` failure.
    pub fn commit(&mut self) -> Result<(), OrmError> {
        let tx = self.transaction.take().ok_or(TransactionError::NotActive)?;
        tx.commit()?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `TransactionError::NotActive` or the `ROLLBACK` failure.
    pub fn rollback(&mut self) -> Result<(), OrmError> {
        let tx = self.transaction.take().ok_or(TransactionError::NotActive)?;
        tx.rollback()?;
        Ok(())
    }

    /// Run `f` inside a transaction: commit when it succeeds, roll back when it fails
    ///
    /// # Errors
    ///
    /// Returns the error from `f` (after rolling back), or the begin/commit failure.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use sluice::{Session, OrmError};
    /// # fn run(session: &mut Session) -> Result<(), OrmError> {
    /// session.run_in_transaction(|s| {
    ///     s.exec("UPDATE post SET title = 'x'", &sea_query::Values(vec![]))?;
    ///     Ok(())
    /// })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn run_in_transaction<T, F>(&mut self, f: F) -> Result<T, OrmError>
    where
        F: FnOnce(&Session) -> Result<T, OrmError>,
    {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    log::warn!("rollback after failed transaction body also failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    fn executor(&self) -> &dyn Executor {
        match &self.transaction {
            Some(tx) => tx as &dyn Executor,
            None => self.database.executor().as_ref(),
        }
    }

    /// Execute a raw statement, reported to the hook as `exec`
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Cancelled` or the execution failure.
    pub fn exec(&self, sql: &str, args: &Values) -> Result<u64, OrmError> {
        self.execute_statement(StatementKind::Exec, sql, args)
    }

    /// Run a raw query, reported to the hook as `select`
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Cancelled` or the execution failure.
    pub fn query(&self, sql: &str, args: &Values) -> Result<Vec<Record>, OrmError> {
        self.query_statement(StatementKind::Select, sql, args)
    }

    pub(crate) fn execute_statement(
        &self,
        kind: StatementKind,
        sql: &str,
        args: &Values,
    ) -> Result<u64, OrmError> {
        self.context.check()?;
        self.before(kind, sql, args);
        let result = with_converted_params(args, |params| self.executor().execute(sql, params));
        self.after(kind, sql, args);
        result
    }

    pub(crate) fn query_statement(
        &self,
        kind: StatementKind,
        sql: &str,
        args: &Values,
    ) -> Result<Vec<Record>, OrmError> {
        self.context.check()?;
        self.before(kind, sql, args);
        let result = with_converted_params(args, |params| self.executor().query(sql, params));
        self.after(kind, sql, args);
        result
    }

    fn before(&self, kind: StatementKind, sql: &str, args: &Values) {
        let hook = self.database.hook();
        let ctx = &self.context;
        match kind {
            StatementKind::SelectOne => hook.before_select_one(ctx, sql, args),
            StatementKind::Select => hook.before_select(ctx, sql, args),
            StatementKind::Insert => hook.before_insert(ctx, sql, args),
            StatementKind::Update => hook.before_update(ctx, sql, args),
            StatementKind::Delete => hook.before_delete(ctx, sql, args),
            StatementKind::Exec => hook.before_exec(ctx, sql, args),
        }
    }

    fn after(&self, kind: StatementKind, sql: &str, args: &Values) {
        let hook = self.database.hook();
        let ctx = &self.context;
        match kind {
            StatementKind::SelectOne => hook.after_select_one(ctx, sql, args),
            StatementKind::Select => hook.after_select(ctx, sql, args),
            StatementKind::Insert => hook.after_insert(ctx, sql, args),
            StatementKind::Update => hook.after_update(ctx, sql, args),
            StatementKind::Delete => hook.after_delete(ctx, sql, args),
            StatementKind::Exec => hook.after_exec(ctx, sql, args),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(tx) = self.transaction.take() {
            log::warn!("session {} dropped with an open transaction, rolling back", self.id);
            if let Err(e) = tx.rollback() {
                log::error!("rollback on drop failed: {e}");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.database.name())
            .field("id", &self.id)
            .field("in_transaction", &self.transaction.is_some())
            .finish()
    }
}
