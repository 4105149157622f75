//! Resource ceilings
//!
//! The counter only reports counts. Enforcing a ceiling is the interpreter's call, typically
//! right after each settle, and exceeding one fails the script rather than the VM.

use thiserror::Error;

use crate::Ledger;

/// Default ceiling on references and tracked values, the customary VM stack size limit.
pub const DEFAULT_MAX_REFERENCES: usize = 2 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Ceiling on the total reference count
    pub max_references: usize,
    /// Ceiling on the number of tracked values
    pub max_tracked_items: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        ExecutionLimits {
            max_references: DEFAULT_MAX_REFERENCES,
            max_tracked_items: DEFAULT_MAX_REFERENCES,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimitExceeded {
    #[error("reference count {count} exceeds the limit of {limit}")]
    References { count: usize, limit: usize },

    #[error("{count} tracked values exceed the limit of {limit}")]
    TrackedItems { count: usize, limit: usize },
}

impl ExecutionLimits {
    /// Check the ledger's current counts against both ceilings.
    pub fn check(&self, ledger: &Ledger) -> Result<(), LimitExceeded> {
        if ledger.count() > self.max_references {
            return Err(LimitExceeded::References {
                count: ledger.count(),
                limit: self.max_references,
            });
        }

        if ledger.tracked_len() > self.max_tracked_items {
            return Err(LimitExceeded::TrackedItems {
                count: ledger.tracked_len(),
                limit: self.max_tracked_items,
            });
        }

        Ok(())
    }
}
