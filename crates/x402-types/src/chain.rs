//! CAIP-2 network identifiers and the patterns used to register schemes against them.
//!
//! A [`ChainId`] is the concrete `namespace:reference` pair carried on the wire
//! (`eip155:84532`, `solana:devnet`). A [`ChainIdPattern`] is what a scheme
//! server is registered under: one network, a set of networks within a
//! namespace, or the whole namespace (`eip155:*`).

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A CAIP-2 network identifier, `namespace:reference`.
///
/// ```
/// use x402_types::chain::ChainId;
///
/// let network: ChainId = "eip155:84532".parse().unwrap();
/// assert_eq!(network.namespace(), "eip155");
/// assert_eq!(network.reference(), "84532");
/// assert_eq!(network.to_string(), "eip155:84532");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    pub namespace: String,
    pub reference: String,
}

impl ChainId {
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

/// A network identifier or pattern that does not follow `namespace:reference`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid network identifier {0}, expected namespace:reference")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((namespace, reference)) if !namespace.is_empty() && !reference.is_empty() => {
                Ok(ChainId::new(namespace, reference))
            }
            _ => Err(ChainIdFormatError(s.to_string())),
        }
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The set of networks a scheme server is registered for.
///
/// Patterns are ordered by [`ChainIdPattern::specificity`]: a registry lookup
/// prefers an exact network over a set, and a set over a namespace wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChainIdPattern {
    /// `eip155:*`
    Wildcard { namespace: String },
    /// `eip155:84532`
    Exact { namespace: String, reference: String },
    /// `eip155:{8453,84532}`
    Set {
        namespace: String,
        references: BTreeSet<String>,
    },
}

impl ChainIdPattern {
    pub fn wildcard<S: Into<String>>(namespace: S) -> Self {
        Self::Wildcard {
            namespace: namespace.into(),
        }
    }

    pub fn exact<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self::Exact {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    pub fn set<N, I, R>(namespace: N, references: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self::Set {
            namespace: namespace.into(),
            references: references.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, chain_id: &ChainId) -> bool {
        match self {
            ChainIdPattern::Wildcard { namespace } => chain_id.namespace == *namespace,
            ChainIdPattern::Exact {
                namespace,
                reference,
            } => chain_id.namespace == *namespace && chain_id.reference == *reference,
            ChainIdPattern::Set {
                namespace,
                references,
            } => chain_id.namespace == *namespace && references.contains(&chain_id.reference),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            ChainIdPattern::Wildcard { namespace }
            | ChainIdPattern::Exact { namespace, .. }
            | ChainIdPattern::Set { namespace, .. } => namespace,
        }
    }

    /// Lookup rank: higher wins when several patterns match the same network.
    pub fn specificity(&self) -> u8 {
        match self {
            ChainIdPattern::Exact { .. } => 2,
            ChainIdPattern::Set { .. } => 1,
            ChainIdPattern::Wildcard { .. } => 0,
        }
    }
}

impl fmt::Display for ChainIdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainIdPattern::Wildcard { namespace } => write!(f, "{namespace}:*"),
            ChainIdPattern::Exact {
                namespace,
                reference,
            } => write!(f, "{namespace}:{reference}"),
            ChainIdPattern::Set {
                namespace,
                references,
            } => {
                let joined = references.iter().cloned().collect::<Vec<_>>().join(",");
                write!(f, "{namespace}:{{{joined}}}")
            }
        }
    }
}

impl FromStr for ChainIdPattern {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ChainIdFormatError(s.to_string());
        let (namespace, rest) = s.split_once(':').ok_or_else(invalid)?;
        if namespace.is_empty() || rest.is_empty() {
            return Err(invalid());
        }
        if rest == "*" {
            return Ok(ChainIdPattern::wildcard(namespace));
        }
        if let Some(inner) = rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            let references = inner
                .split(',')
                .map(str::trim)
                .map(|item| (!item.is_empty()).then(|| item.to_string()))
                .collect::<Option<BTreeSet<_>>>()
                .ok_or_else(invalid)?;
            return Ok(ChainIdPattern::Set {
                namespace: namespace.to_string(),
                references,
            });
        }
        Ok(ChainIdPattern::exact(namespace, rest))
    }
}

impl Serialize for ChainIdPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChainIdPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl From<ChainId> for ChainIdPattern {
    fn from(chain_id: ChainId) -> Self {
        ChainIdPattern::exact(chain_id.namespace, chain_id.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_parses_and_prints() {
        let chain_id: ChainId = "eip155:84532".parse().unwrap();
        assert_eq!(chain_id, ChainId::new("eip155", "84532"));
        assert_eq!(chain_id.to_string(), "eip155:84532");
    }

    #[test]
    fn chain_id_keeps_colons_in_reference() {
        let chain_id: ChainId = "bip122:000000000019d6689c085ae165831e93:extra"
            .parse()
            .unwrap();
        assert_eq!(chain_id.namespace, "bip122");
        assert_eq!(chain_id.reference, "000000000019d6689c085ae165831e93:extra");
    }

    #[test]
    fn chain_id_rejects_malformed() {
        assert!("eip155".parse::<ChainId>().is_err());
        assert!(":84532".parse::<ChainId>().is_err());
        assert!("eip155:".parse::<ChainId>().is_err());
    }

    #[test]
    fn chain_id_serde_is_a_plain_string() {
        let chain_id = ChainId::new("solana", "EtWTRABZaYq6iMfeYKouRu166VU2xqa1");
        let json = serde_json::to_string(&chain_id).unwrap();
        assert_eq!(json, "\"solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1\"");
        let back: ChainId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chain_id);
        assert!(serde_json::from_str::<ChainId>("\"nocolon\"").is_err());
    }

    #[test]
    fn pattern_parsing() {
        assert_eq!(
            "eip155:*".parse::<ChainIdPattern>().unwrap(),
            ChainIdPattern::wildcard("eip155")
        );
        assert_eq!(
            "eip155:84532".parse::<ChainIdPattern>().unwrap(),
            ChainIdPattern::exact("eip155", "84532")
        );
        assert_eq!(
            "eip155:{8453, 84532}".parse::<ChainIdPattern>().unwrap(),
            ChainIdPattern::set("eip155", ["8453", "84532"])
        );
        assert!("eip155:{}".parse::<ChainIdPattern>().is_err());
        assert!("eip155:{1,,2}".parse::<ChainIdPattern>().is_err());
        assert!(":*".parse::<ChainIdPattern>().is_err());
    }

    #[test]
    fn pattern_matching() {
        let base_sepolia = ChainId::new("eip155", "84532");
        let base = ChainId::new("eip155", "8453");
        let solana = ChainId::new("solana", "devnet");

        let wildcard = ChainIdPattern::wildcard("eip155");
        assert!(wildcard.matches(&base_sepolia));
        assert!(wildcard.matches(&base));
        assert!(!wildcard.matches(&solana));

        let exact = ChainIdPattern::from(base_sepolia.clone());
        assert!(exact.matches(&base_sepolia));
        assert!(!exact.matches(&base));

        let set = ChainIdPattern::set("eip155", ["1", "8453"]);
        assert!(set.matches(&base));
        assert!(!set.matches(&base_sepolia));
        assert!(!set.matches(&solana));
    }

    #[test]
    fn pattern_specificity_orders_exact_set_wildcard() {
        let exact = ChainIdPattern::exact("eip155", "1");
        let set = ChainIdPattern::set("eip155", ["1"]);
        let wildcard = ChainIdPattern::wildcard("eip155");
        assert!(exact.specificity() > set.specificity());
        assert!(set.specificity() > wildcard.specificity());
    }

    #[test]
    fn pattern_display_roundtrips_through_from_str() {
        for text in ["eip155:*", "eip155:84532", "eip155:{1,8453}"] {
            let pattern: ChainIdPattern = text.parse().unwrap();
            assert_eq!(pattern.to_string(), text);
        }
    }
}
