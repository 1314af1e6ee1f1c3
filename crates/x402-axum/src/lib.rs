//! Axum middleware gating routes behind [x402](https://www.x402.org) payments.
//!
//! A request to a protected route without payment gets `402 Payment Required`
//! with the accepted payment options. A request carrying a proof is verified
//! by a facilitator, served, and settled only when the handler succeeded.
//!
//! Two ways to protect routes:
//!
//! - [`X402Middleware::with_route`] gives an [`X402Layer`] for one axum route.
//! - [`PaymentProxy`] wraps a whole router and picks the route by path
//!   pattern, with an optional `matcher` filter.
//!
//! Both share a [`ResourceServer`](resource_server::ResourceServer): the scheme
//! registry plus a [`FacilitatorClient`](facilitator_client::FacilitatorClient).
//!
//! ## Features
//!
//! - `telemetry`: `tracing` spans around the gate and every facilitator call.

pub mod errors;
pub mod facilitator_client;
pub mod layer;
pub mod paygate;
pub mod paywall;
pub mod proxy;
pub mod resource_server;
pub mod route;
pub mod settlement;

pub use errors::{ConfigurationError, ErrorKind};
pub use layer::{X402Layer, X402Middleware};
pub use paywall::{BasicPaywall, Paywall, PaywallConfig, PaywallProvider};
pub use proxy::{PaymentProxy, PaymentProxyConfig};
pub use resource_server::{ResourceServer, SettlementResult, VerificationResult};
pub use route::{AcceptOption, ProtectedRoute, RouteConfig, RoutePattern};
