//! Funds and allowance check run before calling a protected resource.
//!
//! The gate asks a [`LedgerAccess`] for the buyer's token balance and the
//! allowance granted to the payment spender:
//!
//! - no tokens at all: the call is refused with [`PreflightError::NoFunds`],
//!   pointing at a faucet;
//! - allowance above the threshold: the call goes through;
//! - otherwise the gate approves `threshold`, waits for the approval to
//!   confirm, and only then lets the call through.

use alloy_primitives::U256;
use reqwest::{RequestBuilder, Response};
use std::sync::Arc;
use url::Url;
use x402_types::ledger::{ApprovalId, LedgerAccess, LedgerError};

#[cfg(feature = "telemetry")]
use tracing::{Instrument, instrument};

/// One million tokens with 18 decimals.
pub const DEFAULT_ALLOWANCE_THRESHOLD: U256 =
    U256::from_limbs([0x1bce_cced_a100_0000, 0xd3c2, 0, 0]);

/// Errors that stop the protected call from being made.
#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    /// The buyer holds no tokens. Claim some at `faucet_url` first.
    #[error("No tokens to pay with, claim some at {faucet_url}")]
    NoFunds { faucet_url: Url },
    /// Reading the ledger or confirming the approval failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The protected call itself failed.
    #[error("Request failed: {0}")]
    Http(#[source] reqwest::Error),
}

/// What the check did before letting the call through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preflight {
    /// The allowance already exceeded the threshold.
    AlreadyApproved,
    /// A fresh approval was submitted and confirmed.
    Approved(ApprovalId),
}

/// Guards protected calls behind the balance/allowance check.
#[derive(Clone)]
pub struct PreflightGate {
    ledger: Arc<dyn LedgerAccess>,
    threshold: U256,
    faucet_url: Url,
}

impl std::fmt::Debug for PreflightGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreflightGate")
            .field("threshold", &self.threshold)
            .field("faucet_url", &self.faucet_url.as_str())
            .finish_non_exhaustive()
    }
}

impl PreflightGate {
    /// A gate with [`DEFAULT_ALLOWANCE_THRESHOLD`].
    pub fn new(ledger: Arc<dyn LedgerAccess>, faucet_url: Url) -> Self {
        Self {
            ledger,
            threshold: DEFAULT_ALLOWANCE_THRESHOLD,
            faucet_url,
        }
    }

    pub fn with_threshold(&self, threshold: U256) -> Self {
        let mut this = self.clone();
        this.threshold = threshold;
        this
    }

    pub fn threshold(&self) -> U256 {
        self.threshold
    }

    pub fn faucet_url(&self) -> &Url {
        &self.faucet_url
    }

    /// Runs the check. Returns only once the buyer may pay.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.preflight", skip(self), fields(threshold = %self.threshold), err)
    )]
    pub async fn check(&self) -> Result<Preflight, PreflightError> {
        let balance = self.ledger.balance().await?;
        if balance.is_zero() {
            tracing::warn!(faucet_url = %self.faucet_url, "No tokens, refusing the call");
            return Err(PreflightError::NoFunds {
                faucet_url: self.faucet_url.clone(),
            });
        }

        let allowance = self.ledger.allowance().await?;
        if allowance > self.threshold {
            tracing::debug!(%balance, %allowance, "Allowance above threshold");
            return Ok(Preflight::AlreadyApproved);
        }

        tracing::info!(%allowance, threshold = %self.threshold, "Approving spender");
        let approval = self.ledger.approve(self.threshold).await?;
        self.ledger.await_confirmation(&approval).await?;
        tracing::info!(%approval, "Approval confirmed");
        Ok(Preflight::Approved(approval))
    }

    /// Runs [`check`](Self::check), then sends `request`.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, PreflightError> {
        self.check().await?;
        let fut = request.send();
        #[cfg(feature = "telemetry")]
        let fut = fut.instrument(tracing::info_span!("x402.preflight.send", otel.kind = "client"));
        fut.await.map_err(PreflightError::Http)
    }
}
