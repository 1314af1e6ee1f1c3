//! Payment schemes known to a resource server.
//!
//! A [`SchemeServer`] knows how to turn an operator's [`Price`] into a concrete
//! token amount for one scheme (`exact`, ...). The [`SchemeRegistry`] maps
//! `(scheme, network pattern)` to the server responsible for it. It is filled
//! once at startup and only read afterwards; a lookup that finds nothing fails
//! with [`UnsupportedScheme`] instead of falling back to some default.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::chain::{ChainId, ChainIdPattern};
use crate::price::{AssetAmount, Price};
use crate::proto::{PaymentRequirements, SupportedPaymentKind};
use crate::util::money_amount::MoneyAmountParseError;

/// Server-side half of a payment scheme.
pub trait SchemeServer: Send + Sync {
    /// Scheme identifier as it appears on the wire.
    fn scheme(&self) -> &str;

    /// Resolves a route price into a token amount on `network`.
    fn parse_price(&self, price: &Price, network: &ChainId) -> Result<AssetAmount, SchemeError>;

    /// Checks that `address` is a well-formed account or token address on
    /// `network`. Used for `payTo` and `asset` when routes are built.
    fn validate_address(&self, address: &str, network: &ChainId) -> Result<(), SchemeError>;

    /// Adjusts a requirement with what the facilitator advertises for it,
    /// e.g. a fee payer address in `extra`.
    fn enhance_requirements(
        &self,
        requirements: PaymentRequirements,
        _supported: &SupportedPaymentKind,
    ) -> PaymentRequirements {
        requirements
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemeError {
    #[error("No default asset for scheme {scheme} on network {network}")]
    UnsupportedNetwork { scheme: String, network: ChainId },
    #[error("Invalid money price: {0}")]
    InvalidMoney(#[from] MoneyAmountParseError),
    #[error("Invalid token amount {0}, expected atomic units")]
    InvalidAmount(String),
    #[error("Invalid address {address:?} on network {network}")]
    InvalidAddress { address: String, network: ChainId },
}

/// No scheme server is registered for a `(scheme, network)` pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported scheme {scheme} on network {network}")]
pub struct UnsupportedScheme {
    pub scheme: String,
    pub network: ChainId,
}

struct SchemeEntry {
    scheme: String,
    pattern: ChainIdPattern,
    server: Arc<dyn SchemeServer>,
}

/// `(scheme, network pattern) -> SchemeServer`.
///
/// When several patterns match a network, an exact network wins over a set,
/// and a set over a namespace wildcard. Among equally specific patterns the one
/// registered first wins.
#[derive(Default)]
pub struct SchemeRegistry {
    entries: Vec<SchemeEntry>,
}

impl Debug for SchemeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let slugs: Vec<String> = self
            .entries
            .iter()
            .map(|entry| format!("{}@{}", entry.scheme, entry.pattern))
            .collect();
        f.debug_tuple("SchemeRegistry").field(&slugs).finish()
    }
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and_register<S, P>(mut self, scheme: S, pattern: P, server: Arc<dyn SchemeServer>) -> Self
    where
        S: Into<String>,
        P: Into<ChainIdPattern>,
    {
        self.register(scheme, pattern, server);
        self
    }

    /// Inserts a server, replacing any server registered under the same
    /// scheme and pattern. The replaced server is returned.
    pub fn register<S, P>(
        &mut self,
        scheme: S,
        pattern: P,
        server: Arc<dyn SchemeServer>,
    ) -> Option<Arc<dyn SchemeServer>>
    where
        S: Into<String>,
        P: Into<ChainIdPattern>,
    {
        let scheme = scheme.into();
        let pattern = pattern.into();
        let existing = self
            .entries
            .iter_mut()
            .find(|entry| entry.scheme == scheme && entry.pattern == pattern);
        match existing {
            Some(entry) => {
                tracing::warn!(%scheme, %pattern, "Replacing registered scheme server");
                Some(std::mem::replace(&mut entry.server, server))
            }
            None => {
                tracing::debug!(%scheme, %pattern, "Registered scheme server");
                self.entries.push(SchemeEntry {
                    scheme,
                    pattern,
                    server,
                });
                None
            }
        }
    }

    pub fn lookup(
        &self,
        scheme: &str,
        network: &ChainId,
    ) -> Result<&dyn SchemeServer, UnsupportedScheme> {
        let mut best: Option<&SchemeEntry> = None;
        for entry in &self.entries {
            if entry.scheme != scheme || !entry.pattern.matches(network) {
                continue;
            }
            let better = match best {
                Some(current) => entry.pattern.specificity() > current.pattern.specificity(),
                None => true,
            };
            if better {
                best = Some(entry);
            }
        }
        best.map(|entry| entry.server.as_ref())
            .ok_or_else(|| UnsupportedScheme {
                scheme: scheme.to_string(),
                network: network.clone(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
