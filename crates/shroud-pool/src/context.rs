//! Transaction context.

use shroud_types::AccountId;

/// Who submitted an operation, and when the environment executed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxContext {
    pub signer: AccountId,
    /// Unix timestamp supplied by the execution environment.
    pub timestamp: u64,
}

impl TxContext {
    pub fn new(signer: AccountId, timestamp: u64) -> Self {
        Self { signer, timestamp }
    }
}
