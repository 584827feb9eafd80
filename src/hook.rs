//! Execution hooks
//!
//! A database may carry an [`ExecutorHook`] that observes every statement the
//! session runs: it receives the session context, the final SQL text and the
//! bound parameters before and after execution. Hooks cannot alter control flow.

use sea_query::Values;

use crate::session::Context;

/// Before/after callbacks around each statement kind. Every method defaults to a no-op.
pub trait ExecutorHook: Send + Sync {
    fn before_select_one(&self, _ctx: &Context, _query: &str, _args: &Values) {}
    fn after_select_one(&self, _ctx: &Context, _query: &str, _args: &Values) {}
    fn before_select(&self, _ctx: &Context, _query: &str, _args: &Values) {}
    fn after_select(&self, _ctx: &Context, _query: &str, _args: &Values) {}
    fn before_insert(&self, _ctx: &Context, _query: &str, _args: &Values) {}
    fn after_insert(&self, _ctx: &Context, _query: &str, _args: &Values) {}
    fn before_update(&self, _ctx: &Context, _query: &str, _args: &Values) {}
    fn after_update(&self, _ctx: &Context, _query: &str, _args: &Values) {}
    fn before_delete(&self, _ctx: &Context, _query: &str, _args: &Values) {}
    fn after_delete(&self, _ctx: &Context, _query: &str, _args: &Values) {}
    fn before_exec(&self, _ctx: &Context, _query: &str, _args: &Values) {}
    fn after_exec(&self, _ctx: &Context, _query: &str, _args: &Values) {}
}

/// Hook that does nothing; the default for every database
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl ExecutorHook for NoopHook {}

/// Hook that logs every statement at `debug` before execution
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHook;

impl LoggingHook {
    fn log(kind: &str, query: &str, args: &Values) {
        log::debug!("[{kind}] {query} {:?}", args.0);
    }
}

impl ExecutorHook for LoggingHook {
    fn before_select_one(&self, _ctx: &Context, query: &str, args: &Values) {
        Self::log("select_one", query, args);
    }

    fn before_select(&self, _ctx: &Context, query: &str, args: &Values) {
        Self::log("select", query, args);
    }

    fn before_insert(&self, _ctx: &Context, query: &str, args: &Values) {
        Self::log("insert", query, args);
    }

    fn before_update(&self, _ctx: &Context, query: &str, args: &Values) {
        Self::log("update", query, args);
    }

    fn before_delete(&self, _ctx: &Context, query: &str, args: &Values) {
        Self::log("delete", query, args);
    }

    fn before_exec(&self, _ctx: &Context, query: &str, args: &Values) {
        Self::log("exec", query, args);
    }
}
