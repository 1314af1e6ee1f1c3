//! Route prices as operators write them.

use serde::{Deserialize, Serialize};

/// A concrete amount of a specific token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAmount {
    /// Atomic units as a decimal string.
    pub amount: String,
    pub asset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// The price of one accepts entry.
///
/// ```
/// use x402_types::price::Price;
///
/// let money: Price = serde_json::from_str("\"$0.01\"").unwrap();
/// assert!(matches!(money, Price::Money(_)));
///
/// let asset: Price = serde_json::from_str(
///     r#"{"amount": "10000", "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e"}"#,
/// ).unwrap();
/// assert!(matches!(asset, Price::Asset(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    /// Used as is, no conversion.
    Asset(AssetAmount),
    /// `"$0.01"`, converted to the scheme's default asset on the route's network.
    Money(String),
}

impl From<AssetAmount> for Price {
    fn from(value: AssetAmount) -> Self {
        Price::Asset(value)
    }
}

impl From<&str> for Price {
    fn from(value: &str) -> Self {
        Price::Money(value.to_string())
    }
}
