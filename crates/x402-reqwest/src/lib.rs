#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Buyer-side checks before calling an [x402](https://www.x402.org)-protected resource.
//!
//! Paying through the `exact` scheme moves tokens the buyer has approved for
//! the facilitator's spender. [`PreflightGate`] makes sure that is possible
//! before the protected call goes out: it refuses when the buyer has no
//! tokens, and tops up the allowance when it has run low.
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use x402_chain_eip155::ledger::Erc20Ledger;
//! use x402_reqwest::PreflightGate;
//! use std::sync::Arc;
//!
//! let ledger = Erc20Ledger::new(provider, token, owner, spender);
//! let gate = PreflightGate::new(Arc::new(ledger), "http://localhost:3001".parse()?);
//!
//! let response = gate
//!     .send(reqwest::Client::new().get("https://api.example.com/protected"))
//!     .await?;
//! ```
//!
//! ## Features
//!
//! - `telemetry`: `tracing` spans around the check and the protected call.

pub mod preflight;

pub use preflight::{DEFAULT_ALLOWANCE_THRESHOLD, Preflight, PreflightError, PreflightGate};
