//! One-way seal shared by the process-wide registries
//!
//! Tables, loaders and databases are registered during startup. Once sealed,
//! every further registration fails with `OrmError::RegistrySealed` while
//! lookups keep working.
//!
//! The first [`Session::open`](crate::Session::open) on a registered database
//! seals all three registries, so registration after serving has started is
//! rejected even when the host never calls [`seal`]. Sessions built with
//! [`Session::with_database`](crate::Session::with_database) on an unregistered
//! handle do not seal.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::OrmError;

#[derive(Debug, Default)]
pub struct Seal(AtomicBool);

impl Seal {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn seal(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Fail with `RegistrySealed` naming `what` once sealed.
    pub fn check(&self, what: &str) -> Result<(), OrmError> {
        if self.is_sealed() {
            return Err(OrmError::RegistrySealed(what.to_string()));
        }
        Ok(())
    }
}

/// Seal the schema, loader and database registries.
///
/// Call once startup registration is complete, or let the first
/// `Session::open` do it. There is no unseal.
pub fn seal() {
    let first = !crate::schema::registry().is_sealed();
    crate::schema::registry().seal();
    crate::eager::loaders().seal();
    crate::database::seal();
    if first {
        log::info!("sluice registries sealed");
    }
}
