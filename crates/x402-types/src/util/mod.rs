//! Small helpers shared by the gateway and the schemes.
//!
//! - [`b64`] carries JSON documents through HTTP headers.
//! - [`money_amount`] parses `"$0.01"`-style prices.

pub mod b64;
pub mod money_amount;

pub use b64::*;
