//! The four ledger operations a buyer needs before paying.
//!
//! An implementation is bound to one token, one owner and one spender; the
//! pre-flight gate in `x402-reqwest` only asks it for numbers and approvals.

use alloy_primitives::U256;
use std::time::Duration;

/// Identifier of a submitted approval, e.g. a transaction hash.
pub type ApprovalId = String;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Approval {0} was reverted")]
    Reverted(ApprovalId),
    #[error("Approval {id} not confirmed within {waited:?}")]
    ConfirmationTimeout { id: ApprovalId, waited: Duration },
}

/// Read balance and allowance, submit an approval, wait for it.
#[async_trait::async_trait]
pub trait LedgerAccess: Send + Sync {
    /// Token balance of the owner, in atomic units.
    async fn balance(&self) -> Result<U256, LedgerError>;

    /// Amount the spender may currently move on the owner's behalf.
    async fn allowance(&self) -> Result<U256, LedgerError>;

    /// Submits an approval of `amount` for the spender.
    async fn approve(&self, amount: U256) -> Result<ApprovalId, LedgerError>;

    /// Resolves once the approval is final.
    async fn await_confirmation(&self, approval: &ApprovalId) -> Result<(), LedgerError>;
}
