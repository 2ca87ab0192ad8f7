//! Operator authorization
//!
//! Every mutating call passes its caller through an [`Authorizer`] before
//! touching state. Production uses [`FixedOperator`], a single identity fixed
//! at construction.

use crate::types::Identity;
use crate::{Error, Result};

/// Decides whether a caller may mutate the ledger
pub trait Authorizer: Send + Sync {
    /// The identity allowed to write
    fn operator(&self) -> Identity;

    /// Reject any caller other than the operator
    fn authorize(&self, caller: &Identity) -> Result<()> {
        if *caller == self.operator() {
            Ok(())
        } else {
            Err(Error::Unauthorized { caller: *caller })
        }
    }
}

/// Single immutable operator identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedOperator {
    operator: Identity,
}

impl FixedOperator {
    /// Fix the operator for the lifetime of the ledger
    pub fn new(operator: Identity) -> Self {
        Self { operator }
    }
}

impl Authorizer for FixedOperator {
    fn operator(&self) -> Identity {
        self.operator
    }
}
