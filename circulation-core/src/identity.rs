//! Identity collaborator for ownership checks
//!
//! The engine never reaches into a global security context; the
//! request-handling layer injects whatever resolves the authenticated
//! member. Authentication itself stays outside the core.

use crate::{Error, Result};
use uuid::Uuid;

/// Supplies the authenticated member's ID
pub trait Identity: Send + Sync {
    /// ID of the member making the current request
    fn current_user(&self) -> Result<Uuid>;
}

/// Identity fixed to a single member (tests, demos, CLI tooling)
#[derive(Debug, Clone, Copy)]
pub struct StaticIdentity(
    /// The fixed member ID
    pub Uuid,
);

impl Identity for StaticIdentity {
    fn current_user(&self) -> Result<Uuid> {
        Ok(self.0)
    }
}

/// Identity with no authenticated member; every ownership check fails
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousIdentity;

impl Identity for AnonymousIdentity {
    fn current_user(&self) -> Result<Uuid> {
        Err(Error::Unauthorized("no authenticated member".to_string()))
    }
}
