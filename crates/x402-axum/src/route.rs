//! Protected routes: how operators configure them and how requests find them.
//!
//! A [`RouteConfig`] is what an operator writes (usually in JSON). The
//! [`ResourceServer`](crate::resource_server::ResourceServer) resolves it once
//! at startup into a read-only [`ProtectedRoute`] with concrete requirements.
//!
//! [`RoutePattern`] is the key a route is registered under:
//!
//! | Pattern              | Matches                                  |
//! |----------------------|------------------------------------------|
//! | `/items/:id`         | `/items/42`                              |
//! | `GET /weather`       | `GET /weather` only                      |
//! | `/protected/:path*`  | `/protected`, `/protected/a/b`           |
//! | `/api/*`             | `/api`, `/api/weather`, `/api/a/b`       |
//!
//! A `*` that is not the last segment matches exactly one segment.

use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use url::Url;
use x402_types::chain::ChainId;
use x402_types::config::LiteralOrEnv;
use x402_types::extensions::{DiscoveryInfo, declare_discovery_extension};
use x402_types::price::Price;
use x402_types::proto::{PaymentRequired, PaymentRequirements, ResourceInfo, X402Version2};

use crate::errors::ConfigurationError;

/// Used when an accept option does not say how long a payment stays valid.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

/// One way a route can be paid for, as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOption {
    pub scheme: String,
    pub network: ChainId,
    /// Payout address; `$EVM_ADDRESS` style references are resolved on load.
    pub pay_to: LiteralOrEnv<String>,
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
}

impl AcceptOption {
    pub fn new<S, P>(scheme: S, network: ChainId, pay_to: P, price: Price) -> Self
    where
        S: Into<String>,
        P: Into<String>,
    {
        Self {
            scheme: scheme.into(),
            network,
            pay_to: LiteralOrEnv::from_literal(pay_to.into()),
            price,
            max_timeout_seconds: None,
        }
    }

    pub fn with_max_timeout_seconds(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = Some(seconds);
        self
    }
}

fn default_mime_type() -> String {
    "application/json".to_string()
}

/// Payment configuration of one protected route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    pub accepts: Vec<AcceptOption>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// Extensions advertised verbatim in the challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
    /// Declares the route discoverable; merged into `extensions` as `bazaar`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryInfo>,
    /// Fixed resource URL. Derived from the request when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Url>,
}

impl RouteConfig {
    pub fn new(accepts: Vec<AcceptOption>) -> Self {
        Self {
            accepts,
            description: String::new(),
            mime_type: default_mime_type(),
            extensions: None,
            discovery: None,
            resource: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_extensions(mut self, extensions: Map<String, Value>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryInfo) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_resource(mut self, resource: Url) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Configured extensions plus the discovery declaration, if any.
    pub(crate) fn resolved_extensions(&self) -> Option<Map<String, Value>> {
        let mut extensions = self.extensions.clone();
        if let Some(discovery) = &self.discovery {
            extensions
                .get_or_insert_with(Map::new)
                .extend(declare_discovery_extension(discovery.clone()));
        }
        extensions
    }
}

/// Description of a protected resource, minus the URL when it depends on the
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfoBuilder {
    pub description: String,
    pub mime_type: String,
    pub url: Option<String>,
}

impl Default for ResourceInfoBuilder {
    fn default() -> Self {
        Self {
            description: String::new(),
            mime_type: default_mime_type(),
            url: None,
        }
    }
}

impl ResourceInfoBuilder {
    /// The fixed URL if there is one. Otherwise the request's path and query
    /// joined below `base_url`, or on the request's `Host` when no base URL
    /// is set.
    pub fn as_resource_info<B>(&self, base_url: Option<&Url>, req: &http::Request<B>) -> ResourceInfo {
        ResourceInfo {
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            url: self.url.clone().unwrap_or_else(|| request_url(base_url, req)),
        }
    }
}

fn request_url<B>(base_url: Option<&Url>, req: &http::Request<B>) -> String {
    let uri = req.uri();
    if let Some(base_url) = base_url {
        // The request path goes below any path prefix of the base URL.
        let prefix = base_url.path().trim_end_matches('/');
        let mut url = base_url.clone();
        url.set_path(&format!("{prefix}{}", uri.path()));
        url.set_query(uri.query());
        url.set_fragment(None);
        return url.to_string();
    }
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    match req.headers().get(http::header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("http://{host}{path_and_query}"),
        None => path_and_query.to_string(),
    }
}

/// A route ready to serve: requirements are concrete and never change.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectedRoute {
    /// In declaration order; the first match wins.
    pub accepts: Vec<PaymentRequirements>,
    pub resource: ResourceInfoBuilder,
    pub extensions: Option<Map<String, Value>>,
}

impl ProtectedRoute {
    /// The first requirement the buyer's `accepted` entry refers to.
    pub fn find_requirement(&self, accepted: &PaymentRequirements) -> Option<&PaymentRequirements> {
        self.accepts
            .iter()
            .find(|requirement| requirement.is_accepted_by(accepted))
    }

    /// The 402 document listing every accepted way to pay.
    pub fn payment_required(&self, resource: ResourceInfo, error: Option<String>) -> PaymentRequired {
        PaymentRequired {
            x402_version: X402Version2,
            error,
            resource,
            accepts: self.accepts.clone(),
            extensions: self.extensions.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `:name`, or `*` before the last segment.
    Param,
    /// `:name*` or a trailing `*`; zero or more segments.
    CatchAll,
}

/// An optional method followed by a path pattern, e.g. `GET /items/:id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    source: String,
    method: Option<Method>,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    /// Whether a request with `method` and `path` falls under this pattern.
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        if self.method.as_ref().is_some_and(|m| m != method) {
            return false;
        }
        let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::CatchAll => return true,
                Segment::Param if i < parts.len() => {}
                Segment::Literal(literal) if parts.get(i) == Some(&literal.as_str()) => {}
                _ => return false,
            }
        }
        parts.len() == self.segments.len()
    }

    /// Literal segments first, then total segments. Higher is more specific.
    pub fn specificity(&self) -> (usize, usize) {
        let literals = self
            .segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Literal(_)))
            .count();
        (literals, self.segments.len())
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for RoutePattern {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &'static str| ConfigurationError::InvalidRoutePattern {
            pattern: s.to_string(),
            reason,
        };
        let source = s.trim();
        let (method, path) = match source.split_once(char::is_whitespace) {
            Some((method, path)) => {
                let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| invalid("invalid HTTP method"))?;
                (Some(method), path.trim())
            }
            None => (None, source),
        };
        if !path.starts_with('/') {
            return Err(invalid("path must start with '/'"));
        }
        let raw: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (i, part) in raw.iter().enumerate() {
            let last = i + 1 == raw.len();
            let segment = if *part == "*" {
                if last { Segment::CatchAll } else { Segment::Param }
            } else if let Some(name) = part.strip_prefix(':') {
                match name.strip_suffix('*') {
                    Some(_) if !last => return Err(invalid("catch-all must be the last segment")),
                    Some("") => return Err(invalid("empty parameter name")),
                    Some(_) => Segment::CatchAll,
                    None if name.is_empty() => return Err(invalid("empty parameter name")),
                    None => Segment::Param,
                }
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }
        Ok(RoutePattern {
            source: source.to_string(),
            method,
            segments,
        })
    }
}

/// Values keyed by [`RoutePattern`], looked up by the most specific match.
///
/// Equally specific patterns resolve to the one added first.
#[derive(Debug, Clone)]
pub struct RouteTable<T> {
    entries: Vec<(RoutePattern, T)>,
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> RouteTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pattern: RoutePattern, value: T) {
        self.entries.push((pattern, value));
    }

    pub fn find(&self, method: &Method, path: &str) -> Option<&T> {
        let mut best: Option<&(RoutePattern, T)> = None;
        for entry in &self.entries {
            if !entry.0.matches(method, path) {
                continue;
            }
            if best.is_none_or(|current| entry.0.specificity() > current.0.specificity()) {
                best = Some(entry);
            }
        }
        best.map(|(_, value)| value)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
