#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for HTTP 402 payment gating with x402.
//!
//! Chain-agnostic building blocks shared by the resource server
//! (`x402-axum`), the buyer-side gate (`x402-reqwest`) and the scheme
//! implementations (`x402-chain-eip155`).
//!
//! # Modules
//!
//! - [`chain`] - CAIP-2 network identifiers and registration patterns
//! - [`config`] - `$VAR` resolution for configuration values
//! - [`extensions`] - The `bazaar` discovery extension
//! - [`facilitator`] - Verify/settle trait implemented by facilitator clients
//! - [`ledger`] - Balance/allowance/approval access used before paying
//! - [`price`] - Route prices: token amounts or money strings
//! - [`proto`] - Version 2 wire format and header names
//! - [`scheme`] - Scheme servers and the `(scheme, network)` registry
//! - [`util`] - Base64 header transport and money parsing

pub mod chain;
pub mod config;
pub mod extensions;
pub mod facilitator;
pub mod ledger;
pub mod price;
pub mod proto;
pub mod scheme;
pub mod util;
