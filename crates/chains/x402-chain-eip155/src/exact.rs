//! The `exact` scheme on EVM networks, resource-server side.
//!
//! The buyer signs a transfer of exactly `amount` of `asset` to `payTo`; the
//! facilitator checks and submits it. On the resource server the scheme only
//! needs to turn route prices into token amounts.

use alloy_primitives::{Address, U256};
use std::str::FromStr;
use std::sync::Arc;
use x402_types::chain::{ChainId, ChainIdPattern};
use x402_types::price::{AssetAmount, Price};
use x402_types::scheme::{SchemeError, SchemeRegistry, SchemeServer};
use x402_types::util::money_amount::MoneyAmount;

use crate::networks::{EIP155_NAMESPACE, USDC};

pub const EXACT_SCHEME: &str = "exact";

#[derive(Debug, Clone, Copy, Default)]
pub struct ExactEvmScheme;

impl SchemeServer for ExactEvmScheme {
    fn scheme(&self) -> &str {
        EXACT_SCHEME
    }

    fn parse_price(&self, price: &Price, network: &ChainId) -> Result<AssetAmount, SchemeError> {
        match price {
            Price::Asset(asset) => {
                U256::from_str_radix(&asset.amount, 10)
                    .map_err(|_| SchemeError::InvalidAmount(asset.amount.clone()))?;
                Ok(asset.clone())
            }
            Price::Money(money) => {
                let deployment =
                    USDC::by_chain_id(network).ok_or_else(|| SchemeError::UnsupportedNetwork {
                        scheme: EXACT_SCHEME.to_string(),
                        network: network.clone(),
                    })?;
                let money = MoneyAmount::parse(money)?;
                Ok(deployment.parse(&money)?)
            }
        }
    }

    /// Accepts 20-byte hex addresses, with or without `0x`.
    fn validate_address(&self, address: &str, network: &ChainId) -> Result<(), SchemeError> {
        Address::from_str(address)
            .map(|_| ())
            .map_err(|_| SchemeError::InvalidAddress {
                address: address.to_string(),
                network: network.clone(),
            })
    }
}

/// Registers [`ExactEvmScheme`] for every `eip155` network.
pub fn register_exact_evm_scheme(registry: &mut SchemeRegistry) {
    registry.register(
        EXACT_SCHEME,
        ChainIdPattern::wildcard(EIP155_NAMESPACE),
        Arc::new(ExactEvmScheme),
    );
}
