//! Path-matching payment middleware for a whole router.
//!
//! Where [`X402Middleware`](crate::X402Middleware) guards a single route,
//! [`PaymentProxy`] sits in front of an entire application and decides per
//! request whether a payment is needed:
//!
//! 1. If `matcher` is non-empty and no matcher pattern covers the path, the
//!    request passes through untouched.
//! 2. Otherwise the most specific route pattern is looked up (see
//!    [`RouteTable`]). No match also passes through.
//! 3. A match runs the request through a [`Paygate`].
//!
//! ```json
//! {
//!   "routes": {
//!     "/protected": { "accepts": [ ... ], "description": "Premium music: x402 Remix", "mimeType": "text/html" }
//!   },
//!   "matcher": ["/protected/:path*"]
//! }
//! ```

use axum_core::extract::Request;
use axum_core::response::Response;
use http::Method;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;
use x402_types::facilitator::Facilitator;

use crate::errors::ConfigurationError;
use crate::paygate::Paygate;
use crate::paywall::Paywall;
use crate::resource_server::ResourceServer;
use crate::route::{ProtectedRoute, RouteConfig, RoutePattern, RouteTable};

/// Routes keyed by pattern, in declaration order, plus the path filter.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentProxyConfig {
    #[serde_as(as = "serde_with::Map<_, _>")]
    pub routes: Vec<(String, RouteConfig)>,
    #[serde(default)]
    pub matcher: Vec<String>,
}

pub struct PaymentProxy<F> {
    server: Arc<ResourceServer<F>>,
    routes: Arc<RouteTable<Arc<ProtectedRoute>>>,
    matcher: Arc<Vec<RoutePattern>>,
    base_url: Option<Arc<Url>>,
    paywall: Option<Paywall>,
}

impl<F> Clone for PaymentProxy<F> {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
            routes: self.routes.clone(),
            matcher: self.matcher.clone(),
            base_url: self.base_url.clone(),
            paywall: self.paywall.clone(),
        }
    }
}

impl<F> PaymentProxy<F> {
    /// Parses every pattern and resolves every route; the first problem is
    /// returned.
    pub fn try_new(
        config: &PaymentProxyConfig,
        server: Arc<ResourceServer<F>>,
    ) -> Result<Self, ConfigurationError> {
        let mut routes = RouteTable::new();
        for (pattern, route_config) in &config.routes {
            let parsed: RoutePattern = pattern.parse()?;
            let route = server.build_route(pattern, route_config)?;
            routes.insert(parsed, Arc::new(route));
        }
        let matcher = config
            .matcher
            .iter()
            .map(|pattern| pattern.parse())
            .collect::<Result<Vec<RoutePattern>, _>>()?;
        Ok(Self {
            server,
            routes: Arc::new(routes),
            matcher: Arc::new(matcher),
            base_url: None,
            paywall: None,
        })
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(Arc::new(base_url));
        self
    }

    pub fn with_paywall(mut self, paywall: Paywall) -> Self {
        self.paywall = Some(paywall);
        self
    }

    pub fn routes(&self) -> &RouteTable<Arc<ProtectedRoute>> {
        &self.routes
    }

    /// Whether the matcher lets the proxy look at this request at all.
    pub fn intercepts(&self, method: &Method, path: &str) -> bool {
        self.matcher.is_empty()
            || self
                .matcher
                .iter()
                .any(|pattern| pattern.matches(method, path))
    }

    /// The route guarding a request, if any.
    pub fn find_route(&self, method: &Method, path: &str) -> Option<&Arc<ProtectedRoute>> {
        if !self.intercepts(method, path) {
            return None;
        }
        self.routes.find(method, path)
    }
}

impl<F> PaymentProxy<F>
where
    F: Facilitator + Send + Sync,
{
    /// Checks all routes against the facilitator's `/supported` list.
    pub async fn initialize(mut self) -> Self {
        let table = Arc::make_mut(&mut self.routes);
        self.server
            .initialize(table.values_mut().map(Arc::make_mut))
            .await;
        self
    }
}

impl<S, F> Layer<S> for PaymentProxy<F>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = PaymentProxyService<F>;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentProxyService {
            proxy: self.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

pub struct PaymentProxyService<F> {
    proxy: PaymentProxy<F>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<F> Clone for PaymentProxyService<F> {
    fn clone(&self) -> Self {
        Self {
            proxy: self.proxy.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<F> Service<Request> for PaymentProxyService<F>
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
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let Some(route) = self
            .proxy
            .find_route(req.method(), req.uri().path())
            .cloned()
        else {
            return inner.call(req);
        };
        let gate = Paygate {
            server: self.proxy.server.clone(),
            resource: route
                .resource
                .as_resource_info(self.proxy.base_url.as_deref(), &req),
            route,
            paywall: self.proxy.paywall.clone(),
        };
        Box::pin(gate.handle_request(inner, req))
    }
}
