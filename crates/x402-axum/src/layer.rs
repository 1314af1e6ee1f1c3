//! Per-route payment middleware for axum.
//!
//! [`X402Middleware`] holds what all protected routes share: the
//! [`ResourceServer`], an optional base URL for resource URLs, and an optional
//! browser [`Paywall`]. [`X402Middleware::with_route`] validates one
//! [`RouteConfig`] and returns an [`X402Layer`] to put on that route.
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use std::sync::Arc;
//! use x402_axum::{AcceptOption, RouteConfig, X402Middleware};
//! use x402_chain_eip155::{KnownNetworkEip155, register_exact_evm_scheme};
//! use x402_types::chain::ChainId;
//! use x402_types::price::Price;
//! use x402_types::scheme::SchemeRegistry;
//!
//! # async fn build() -> Result<Router, Box<dyn std::error::Error>> {
//! let mut registry = SchemeRegistry::new();
//! register_exact_evm_scheme(&mut registry);
//! let x402 = X402Middleware::try_new("https://x402.org/facilitator", Arc::new(registry))?;
//!
//! let weather = x402
//!     .with_route(
//!         &RouteConfig::new(vec![AcceptOption::new(
//!             "exact",
//!             ChainId::base_sepolia(),
//!             "0xc2983537C79A8f82ce6A7903Fe1F14D4761dBD17",
//!             Price::from("$0.001"),
//!         )])
//!         .with_description("Access to weather API"),
//!     )?
//!     .initialize()
//!     .await;
//!
//! let app: Router = Router::new().route("/weather", get(|| async { "sunny" }).layer(weather));
//! # Ok(app)
//! # }
//! ```

use axum_core::extract::Request;
use axum_core::response::Response;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;
use x402_types::facilitator::Facilitator;
use x402_types::scheme::SchemeRegistry;

use crate::errors::ConfigurationError;
use crate::facilitator_client::{FacilitatorClient, FacilitatorClientError};
use crate::paygate::Paygate;
use crate::paywall::Paywall;
use crate::resource_server::ResourceServer;
use crate::route::{ProtectedRoute, RouteConfig};

/// Shared configuration of every paid route in an application.
pub struct X402Middleware<F> {
    server: Arc<ResourceServer<F>>,
    base_url: Option<Arc<Url>>,
    paywall: Option<Paywall>,
}

impl<F> Clone for X402Middleware<F> {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
            base_url: self.base_url.clone(),
            paywall: self.paywall.clone(),
        }
    }
}

impl<F: fmt::Debug> fmt::Debug for X402Middleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X402Middleware")
            .field("server", &self.server)
            .field("base_url", &self.base_url)
            .field("paywall", &self.paywall)
            .finish()
    }
}

impl X402Middleware<FacilitatorClient> {
    /// A middleware backed by the facilitator at `url`.
    pub fn try_new(
        url: &str,
        registry: Arc<SchemeRegistry>,
    ) -> Result<Self, FacilitatorClientError> {
        let facilitator = FacilitatorClient::try_from(url)?;
        Ok(Self::new(Arc::new(ResourceServer::new(registry, facilitator))))
    }

    pub fn facilitator_url(&self) -> &Url {
        self.server.facilitator().base_url()
    }
}

impl<F> X402Middleware<F> {
    pub fn new(server: Arc<ResourceServer<F>>) -> Self {
        Self {
            server,
            base_url: None,
            paywall: None,
        }
    }

    pub fn server(&self) -> &Arc<ResourceServer<F>> {
        &self.server
    }

    /// Public origin used for resource URLs in challenges. Without it the
    /// request's `Host` header is used.
    pub fn with_base_url(&self, base_url: Url) -> Self {
        let mut this = self.clone();
        this.base_url = Some(Arc::new(base_url));
        this
    }

    /// Serve browsers an HTML page instead of the JSON challenge.
    pub fn with_paywall(&self, paywall: Paywall) -> Self {
        let mut this = self.clone();
        this.paywall = Some(paywall);
        this
    }

    /// Validates `config` and returns the layer guarding that route.
    pub fn with_route(&self, config: &RouteConfig) -> Result<X402Layer<F>, ConfigurationError> {
        let name = config
            .resource
            .as_ref()
            .map(Url::to_string)
            .unwrap_or_else(|| config.description.clone());
        let route = self.server.build_route(&name, config)?;
        Ok(X402Layer {
            server: self.server.clone(),
            base_url: self.base_url.clone(),
            paywall: self.paywall.clone(),
            route: Arc::new(route),
        })
    }
}

/// The [`Layer`] for one protected route.
pub struct X402Layer<F> {
    server: Arc<ResourceServer<F>>,
    base_url: Option<Arc<Url>>,
    paywall: Option<Paywall>,
    route: Arc<ProtectedRoute>,
}

impl<F> Clone for X402Layer<F> {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
            base_url: self.base_url.clone(),
            paywall: self.paywall.clone(),
            route: self.route.clone(),
        }
    }
}

impl<F> X402Layer<F> {
    pub fn route(&self) -> &ProtectedRoute {
        &self.route
    }
}

impl<F> X402Layer<F>
where
    F: Facilitator + Send + Sync,
{
    /// Checks the route against the facilitator's `/supported` list. Call
    /// before serving; never fails.
    pub async fn initialize(mut self) -> Self {
        let route = Arc::make_mut(&mut self.route);
        self.server.initialize(std::iter::once(route)).await;
        self
    }
}

impl<S, F> Layer<S> for X402Layer<F>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = X402MiddlewareService<F>;

    fn layer(&self, inner: S) -> Self::Service {
        X402MiddlewareService {
            gate: self.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// The service produced by [`X402Layer`].
pub struct X402MiddlewareService<F> {
    gate: X402Layer<F>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<F> Clone for X402MiddlewareService<F> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<F> Service<Request> for X402MiddlewareService<F>
where
    F: Facilitator + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Paygate {
            server: self.gate.server.clone(),
            route: self.gate.route.clone(),
            resource: self
                .gate
                .route
                .resource
                .as_resource_info(self.gate.base_url.as_deref(), &req),
            paywall: self.gate.paywall.clone(),
        };
        // The ready service goes to the request; a fresh clone waits for the next one.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(gate.handle_request(inner, req))
    }
}
