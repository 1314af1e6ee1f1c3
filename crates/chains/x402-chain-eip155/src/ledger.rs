//! ERC-20 balance, allowance and approval through an alloy provider.
//!
//! The provider decides how transactions are signed; [`Erc20Ledger`] only
//! builds the calls. Confirmation is awaited by polling for the receipt.

use alloy_primitives::{Address, B256, U256};
use alloy_provider::Provider;
use alloy_sol_types::sol;
use std::time::Duration;
use x402_types::ledger::{ApprovalId, LedgerAccess, LedgerError};

#[cfg(feature = "telemetry")]
use tracing::Instrument;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One token, one owner, one spender.
#[derive(Debug, Clone)]
pub struct Erc20Ledger<P> {
    token: IERC20::IERC20Instance<P>,
    owner: Address,
    spender: Address,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl<P: Provider> Erc20Ledger<P> {
    pub fn new(provider: P, token: Address, owner: Address, spender: Address) -> Self {
        Self {
            token: IERC20::new(token, provider),
            owner,
            spender,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn token(&self) -> Address {
        *self.token.address()
    }
}

fn backend<E: std::error::Error + Send + Sync + 'static>(e: E) -> LedgerError {
    LedgerError::Backend(Box::new(e))
}

#[async_trait::async_trait]
impl<P> LedgerAccess for Erc20Ledger<P>
where
    P: Provider + Send + Sync,
{
    async fn balance(&self) -> Result<U256, LedgerError> {
        let call = self.token.balanceOf(self.owner);
        let fut = call.call().into_future();
        #[cfg(feature = "telemetry")]
        let fut = fut.instrument(tracing::info_span!(
            "fetch_balance",
            token = %self.token.address(),
            owner = %self.owner,
            otel.kind = "client"
        ));
        fut.await.map_err(backend)
    }

    async fn allowance(&self) -> Result<U256, LedgerError> {
        let call = self.token.allowance(self.owner, self.spender);
        let fut = call.call().into_future();
        #[cfg(feature = "telemetry")]
        let fut = fut.instrument(tracing::info_span!(
            "fetch_allowance",
            token = %self.token.address(),
            owner = %self.owner,
            spender = %self.spender,
            otel.kind = "client"
        ));
        fut.await.map_err(backend)
    }

    async fn approve(&self, amount: U256) -> Result<ApprovalId, LedgerError> {
        let pending = self
            .token
            .approve(self.spender, amount)
            .from(self.owner)
            .send()
            .await
            .map_err(backend)?;
        let tx_hash = *pending.tx_hash();
        #[cfg(feature = "telemetry")]
        tracing::info!(%tx_hash, %amount, spender = %self.spender, "Approval submitted");
        Ok(tx_hash.to_string())
    }

    async fn await_confirmation(&self, approval: &ApprovalId) -> Result<(), LedgerError> {
        let tx_hash: B256 = approval.parse().map_err(backend)?;
        let provider = self.token.provider();
        let poll = async {
            loop {
                match provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => {
                        return if receipt.status() {
                            Ok(())
                        } else {
                            Err(LedgerError::Reverted(approval.clone()))
                        };
                    }
                    Ok(None) => {}
                    Err(e) => return Err(backend(e)),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        tokio::time::timeout(self.confirmation_timeout, poll)
            .await
            .map_err(|_| LedgerError::ConfirmationTimeout {
                id: approval.clone(),
                waited: self.confirmation_timeout,
            })?
    }
}
