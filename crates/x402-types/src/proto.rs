//! x402 version 2 wire format.
//!
//! Everything here serializes to camelCase JSON exactly as it travels between
//! the buyer, the resource server and the facilitator:
//!
//! - [`PaymentRequired`] is the 402 challenge (body and `PAYMENT-REQUIRED` header).
//! - [`PaymentPayload`] is the buyer's proof (`PAYMENT-SIGNATURE` header).
//! - [`VerifyRequest`] / [`SettleRequest`] go to the facilitator, which answers
//!   with [`VerifyResponse`] / [`SettleResponse`].
//! - [`SupportedResponse`] is the facilitator's `/supported` capability list.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{VecSkipError, serde_as};
use std::collections::HashMap;
use std::fmt;

use crate::chain::ChainId;

/// HTTP header names used by the protocol.
pub mod headers {
    /// Proof sent by the buyer, base64 JSON [`super::PaymentPayload`].
    pub const PAYMENT_SIGNATURE: &str = "PAYMENT-SIGNATURE";
    /// Proof header used by version 1 clients; still accepted.
    pub const X_PAYMENT: &str = "X-PAYMENT";
    /// Challenge, base64 JSON [`super::PaymentRequired`].
    pub const PAYMENT_REQUIRED: &str = "PAYMENT-REQUIRED";
    /// Settlement receipt, base64 JSON [`super::SettleResponse`].
    pub const PAYMENT_RESPONSE: &str = "PAYMENT-RESPONSE";
}

/// Version marker that serializes as the integer `2` and rejects anything else.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version2;

impl X402Version2 {
    pub const VALUE: u8 = 2;
}

impl Serialize for X402Version2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version2 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version = u8::deserialize(deserializer)?;
        if version == Self::VALUE {
            Ok(X402Version2)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported x402Version {version}, expected {}",
                Self::VALUE
            )))
        }
    }
}

impl fmt::Display for X402Version2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// What the buyer is paying for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mime_type: String,
}

/// One acceptable way to pay for a resource: an entry of the `accepts` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: ChainId,
    /// Atomic token units as a decimal string.
    pub amount: String,
    pub pay_to: String,
    pub max_timeout_seconds: u64,
    pub asset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl PaymentRequirements {
    /// Whether a buyer's `accepted` entry refers to this requirement.
    ///
    /// Scheme and network compare exactly; the asset compares case-insensitively
    /// since EVM addresses may arrive checksummed or lowercased.
    pub fn is_accepted_by(&self, accepted: &PaymentRequirements) -> bool {
        self.scheme == accepted.scheme
            && self.network == accepted.network
            && self.asset.eq_ignore_ascii_case(&accepted.asset)
    }
}

/// The buyer's signed proof of payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
    pub accepted: PaymentRequirements,
    /// Scheme-specific proof, opaque to the resource server.
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

/// Body of an HTTP 402 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: X402Version2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub resource: ResourceInfo,
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Request body of the facilitator's `/verify` and `/settle` endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub x402_version: X402Version2,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

pub type SettleRequest = VerifyRequest;

impl VerifyRequest {
    pub fn new(payment_payload: PaymentPayload, payment_requirements: PaymentRequirements) -> Self {
        Self {
            x402_version: X402Version2,
            payment_payload,
            payment_requirements,
        }
    }
}

/// Facilitator verdict on a proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResponse {
    Valid {
        payer: String,
    },
    Invalid {
        reason: String,
        payer: Option<String>,
    },
}

impl VerifyResponse {
    pub fn valid<S: Into<String>>(payer: S) -> Self {
        VerifyResponse::Valid {
            payer: payer.into(),
        }
    }

    pub fn invalid<S: Into<String>>(payer: Option<String>, reason: S) -> Self {
        VerifyResponse::Invalid {
            reason: reason.into(),
            payer,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<String>,
}

impl Serialize for VerifyResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            VerifyResponse::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                payer: Some(payer.clone()),
                invalid_reason: None,
            },
            VerifyResponse::Invalid { reason, payer } => VerifyResponseWire {
                is_valid: false,
                payer: payer.clone(),
                invalid_reason: Some(reason.clone()),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        if wire.is_valid {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            Ok(VerifyResponse::Valid { payer })
        } else {
            Ok(VerifyResponse::Invalid {
                reason: wire
                    .invalid_reason
                    .unwrap_or_else(|| "unspecified".to_string()),
                payer: wire.payer,
            })
        }
    }
}

/// Facilitator outcome of a settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleResponse {
    Success {
        payer: String,
        transaction: String,
        network: String,
    },
    Error {
        reason: String,
        payer: Option<String>,
        network: String,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    #[serde(default)]
    network: String,
}

impl Serialize for SettleResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            SettleResponse::Success {
                payer,
                transaction,
                network,
            } => SettleResponseWire {
                success: true,
                error_reason: None,
                payer: Some(payer.clone()),
                transaction: Some(transaction.clone()),
                network: network.clone(),
            },
            SettleResponse::Error {
                reason,
                payer,
                network,
            } => SettleResponseWire {
                success: false,
                error_reason: Some(reason.clone()),
                payer: payer.clone(),
                transaction: None,
                network: network.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        if wire.success {
            Ok(SettleResponse::Success {
                payer: wire
                    .payer
                    .ok_or_else(|| serde::de::Error::missing_field("payer"))?,
                transaction: wire
                    .transaction
                    .ok_or_else(|| serde::de::Error::missing_field("transaction"))?,
                network: wire.network,
            })
        } else {
            Ok(SettleResponse::Error {
                reason: wire
                    .error_reason
                    .unwrap_or_else(|| "unspecified".to_string()),
                payer: wire.payer,
                network: wire.network,
            })
        }
    }
}

/// One `(version, scheme, network)` combination a facilitator can handle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    pub x402_version: u8,
    pub scheme: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Response of the facilitator's `/supported` endpoint.
///
/// Kinds the client cannot decode are skipped rather than failing the whole
/// response.
#[serde_as]
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    #[serde_as(as = "VecSkipError<_>")]
    pub kinds: Vec<SupportedPaymentKind>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub signers: HashMap<ChainId, Vec<String>>,
}

impl SupportedResponse {
    /// Finds the version 2 kind advertised for `scheme` on `network`.
    pub fn find_kind(&self, scheme: &str, network: &ChainId) -> Option<&SupportedPaymentKind> {
        let network = network.to_string();
        self.kinds.iter().find(|kind| {
            kind.x402_version == X402Version2::VALUE
                && kind.scheme == scheme
                && kind.network == network
        })
    }
}
