//! Well-known EVM networks and their USDC deployments.
//!
//! Money prices (`"$0.01"`) on an `eip155` network are charged in the USDC
//! deployment listed here for that network.

use alloy_primitives::{Address, U256, address};
use serde_json::json;
use x402_types::chain::ChainId;
use x402_types::price::AssetAmount;
use x402_types::util::money_amount::{MoneyAmount, MoneyAmountParseError};

/// The CAIP-2 namespace for EVM-compatible chains.
pub const EIP155_NAMESPACE: &str = "eip155";

/// Per-network instances for the EVM networks with a known USDC deployment.
///
/// ```
/// use x402_chain_eip155::networks::{KnownNetworkEip155, USDC};
/// use x402_types::chain::ChainId;
///
/// assert_eq!(ChainId::base_sepolia().to_string(), "eip155:84532");
/// assert_eq!(USDC::base_sepolia().decimals, 6);
/// ```
pub trait KnownNetworkEip155<A> {
    /// eip155:8453
    fn base() -> A;
    /// eip155:84532
    fn base_sepolia() -> A;
    /// eip155:137
    fn polygon() -> A;
    /// eip155:80002
    fn polygon_amoy() -> A;
    /// eip155:43114
    fn avalanche() -> A;
    /// eip155:43113
    fn avalanche_fuji() -> A;
}

impl KnownNetworkEip155<ChainId> for ChainId {
    fn base() -> ChainId {
        ChainId::new(EIP155_NAMESPACE, "8453")
    }

    fn base_sepolia() -> ChainId {
        ChainId::new(EIP155_NAMESPACE, "84532")
    }

    fn polygon() -> ChainId {
        ChainId::new(EIP155_NAMESPACE, "137")
    }

    fn polygon_amoy() -> ChainId {
        ChainId::new(EIP155_NAMESPACE, "80002")
    }

    fn avalanche() -> ChainId {
        ChainId::new(EIP155_NAMESPACE, "43114")
    }

    fn avalanche_fuji() -> ChainId {
        ChainId::new(EIP155_NAMESPACE, "43113")
    }
}

/// An ERC-20 token on a specific EVM chain, with its EIP-712 domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip155TokenDeployment {
    pub chain_id: u64,
    pub address: Address,
    pub decimals: u8,
    pub name: &'static str,
    pub version: &'static str,
}

impl Eip155TokenDeployment {
    const fn new(
        chain_id: u64,
        address: Address,
        name: &'static str,
        version: &'static str,
    ) -> Self {
        Self {
            chain_id,
            address,
            decimals: 6,
            name,
            version,
        }
    }

    pub fn chain(&self) -> ChainId {
        ChainId::new(EIP155_NAMESPACE, self.chain_id.to_string())
    }

    /// Converts a money amount into atomic units of this token.
    ///
    /// `"$0.01"` of a 6-decimals token is `10000`. Amounts more precise than
    /// the token are rejected.
    pub fn parse(&self, money: &MoneyAmount) -> Result<AssetAmount, MoneyAmountParseError> {
        let (mantissa, exponent) = money.to_token_scale(self.decimals as u32)?;
        let amount = U256::from(mantissa) * U256::from(10).pow(U256::from(exponent));
        Ok(AssetAmount {
            amount: amount.to_string(),
            asset: self.address.to_checksum(None),
            extra: Some(json!({ "name": self.name, "version": self.version })),
        })
    }
}

/// Circle USDC.
#[allow(clippy::upper_case_acronyms)]
pub struct USDC;

const USDC_BASE: Eip155TokenDeployment = Eip155TokenDeployment::new(
    8453,
    address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
    "USD Coin",
    "2",
);
const USDC_BASE_SEPOLIA: Eip155TokenDeployment = Eip155TokenDeployment::new(
    84532,
    address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
    "USDC",
    "2",
);
const USDC_POLYGON: Eip155TokenDeployment = Eip155TokenDeployment::new(
    137,
    address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
    "USDC",
    "2",
);
const USDC_POLYGON_AMOY: Eip155TokenDeployment = Eip155TokenDeployment::new(
    80002,
    address!("0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582"),
    "USDC",
    "2",
);
const USDC_AVALANCHE: Eip155TokenDeployment = Eip155TokenDeployment::new(
    43114,
    address!("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
    "USD Coin",
    "2",
);
const USDC_AVALANCHE_FUJI: Eip155TokenDeployment = Eip155TokenDeployment::new(
    43113,
    address!("0x5425890298aed601595a70AB815c96711a31Bc65"),
    "USD Coin",
    "2",
);

const USDC_DEPLOYMENTS: [Eip155TokenDeployment; 6] = [
    USDC_BASE,
    USDC_BASE_SEPOLIA,
    USDC_POLYGON,
    USDC_POLYGON_AMOY,
    USDC_AVALANCHE,
    USDC_AVALANCHE_FUJI,
];

impl USDC {
    pub fn by_chain_id(chain_id: &ChainId) -> Option<Eip155TokenDeployment> {
        if chain_id.namespace != EIP155_NAMESPACE {
            return None;
        }
        let reference: u64 = chain_id.reference.parse().ok()?;
        USDC_DEPLOYMENTS
            .into_iter()
            .find(|deployment| deployment.chain_id == reference)
    }
}

impl KnownNetworkEip155<Eip155TokenDeployment> for USDC {
    fn base() -> Eip155TokenDeployment {
        USDC_BASE
    }

    fn base_sepolia() -> Eip155TokenDeployment {
        USDC_BASE_SEPOLIA
    }

    fn polygon() -> Eip155TokenDeployment {
        USDC_POLYGON
    }

    fn polygon_amoy() -> Eip155TokenDeployment {
        USDC_POLYGON_AMOY
    }

    fn avalanche() -> Eip155TokenDeployment {
        USDC_AVALANCHE
    }

    fn avalanche_fuji() -> Eip155TokenDeployment {
        USDC_AVALANCHE_FUJI
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usdc_lookup_by_chain_id() {
        let deployment = USDC::by_chain_id(&ChainId::base_sepolia()).unwrap();
        assert_eq!(deployment, USDC::base_sepolia());
        assert_eq!(
            deployment.address.to_checksum(None),
            "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
        );
        assert_eq!(deployment.chain(), ChainId::base_sepolia());

        assert!(USDC::by_chain_id(&ChainId::new("eip155", "1")).is_none());
        assert!(USDC::by_chain_id(&ChainId::new("solana", "84532")).is_none());
    }

    #[test]
    fn parse_money_into_atomic_units() {
        let usdc = USDC::base();
        let cent = usdc.parse(&MoneyAmount::parse("$0.01").unwrap()).unwrap();
        assert_eq!(cent.amount, "10000");
        assert_eq!(cent.asset, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
        assert_eq!(
            cent.extra,
            Some(json!({"name": "USD Coin", "version": "2"}))
        );

        let thousand = usdc.parse(&MoneyAmount::parse("1,000").unwrap()).unwrap();
        assert_eq!(thousand.amount, "1000000000");
    }

    #[test]
    fn parse_rejects_excess_precision() {
        let usdc = USDC::polygon();
        let err = usdc
            .parse(&MoneyAmount::parse("0.0000001").unwrap())
            .unwrap_err();
        assert_eq!(err, MoneyAmountParseError::WrongPrecision { money: 7, token: 6 });
    }
}
