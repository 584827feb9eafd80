//! Helpers for tests that need a live Postgres
//!
//! Enabled with the `test-helpers` feature. Tests read the connection string
//! from `TEST_DATABASE_URL` and skip themselves when it is not set.

use sea_query::Values;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::database::{self, Database};
use crate::dialect::DatabaseSystem;
use crate::error::OrmError;
use crate::session::{Context, Session};

pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

/// A Postgres database reachable through `TEST_DATABASE_URL`
pub struct TestDatabase {
    config: DatabaseConfig,
}

impl TestDatabase {
    /// `None` when `TEST_DATABASE_URL` is unset or empty.
    pub fn from_env(name: &str) -> Option<Self> {
        let url = std::env::var(TEST_DATABASE_URL).ok().filter(|u| !u.is_empty())?;
        Some(Self {
            config: DatabaseConfig {
                name: name.to_string(),
                url,
                system: DatabaseSystem::Postgres,
                interval_style: None,
                log_statements: true,
            },
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Connect and register under the configured name, or return the existing registration.
    ///
    /// # Errors
    ///
    /// Returns the connection failure.
    pub fn register(&self) -> Result<Arc<Database>, OrmError> {
        if let Ok(existing) = database::get(&self.config.name) {
            return Ok(existing);
        }
        match database::register_from_config(&self.config) {
            Err(OrmError::DuplicateRegistration(_)) => database::get(&self.config.name),
            other => other,
        }
    }

    /// # Errors
    ///
    /// Returns the connection failure.
    pub fn session(&self) -> Result<Session, OrmError> {
        Session::with_database(self.register()?, Context::background())
    }

    /// Run each `;`-separated statement of `script`.
    ///
    /// # Errors
    ///
    /// Returns the first failing statement's error.
    pub fn execute_script(&self, script: &str) -> Result<(), OrmError> {
        let session = self.session()?;
        for statement in script.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            session.exec(statement, &Values(Vec::new()))?;
        }
        Ok(())
    }
}
