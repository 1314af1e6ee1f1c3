//! EVM (`eip155`) support for x402 payment gating.
//!
//! - [`exact`] - the `exact` scheme as seen by a resource server: money
//!   prices become USDC amounts, token prices are checked and passed through.
//! - [`networks`] - well-known EVM networks and their USDC deployments.
//! - [`ledger`] - an alloy-backed ERC-20 implementation of
//!   [`LedgerAccess`](x402_types::ledger::LedgerAccess) for the buyer-side
//!   pre-flight gate (feature `client`).
//!
//! # Feature Flags
//!
//! - `server` - the `exact` scheme server
//! - `client` - the ERC-20 ledger
//! - `telemetry` - tracing spans around RPC calls

pub mod networks;

#[cfg(feature = "server")]
pub mod exact;
#[cfg(feature = "client")]
pub mod ledger;

#[cfg(feature = "server")]
pub use exact::{ExactEvmScheme, register_exact_evm_scheme};
#[cfg(feature = "client")]
pub use ledger::Erc20Ledger;
pub use networks::{KnownNetworkEip155, USDC};
