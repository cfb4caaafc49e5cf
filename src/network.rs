//! Static network presets
//!
//! Per-chain metadata (contract address, short coin type, token list) is read
//! from JSON records and validated into typed presets once at construction.

use crate::error::{MesonError, MesonResult};

use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashSet;

const MAINNET_PRESETS: &str = include_str!("../presets/mainnets.json");
const TESTNET_PRESETS: &str = include_str!("../presets/testnets.json");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNetwork {
    id: String,
    name: String,
    chain_id: String,
    short_slip44: String,
    url: Option<String>,
    meson_address: String,
    #[serde(default)]
    tokens: Vec<RawToken>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToken {
    addr: String,
    symbol: String,
    decimals: u8,
    token_index: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPreset {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub token_index: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPreset {
    pub id: String,
    pub name: String,
    pub chain_id: u64,
    /// SLIP-44 coin type truncated to two bytes, as packed into swap identifiers
    pub short_coin_type: u16,
    pub url: Option<String>,
    pub meson_address: Address,
    pub tokens: Vec<TokenPreset>,
}

impl NetworkPreset {
    pub fn token(&self, index: u8) -> Option<&TokenPreset> {
        self.tokens.iter().find(|t| t.token_index == index)
    }

    pub fn token_by_address(&self, address: Address) -> Option<&TokenPreset> {
        self.tokens.iter().find(|t| t.address == address)
    }
}

impl TryFrom<RawNetwork> for NetworkPreset {
    type Error = MesonError;

    fn try_from(raw: RawNetwork) -> MesonResult<Self> {
        if raw.id.is_empty() {
            return Err(MesonError::Config("network preset without id".to_string()));
        }
        let chain_id = parse_hex_u64(&raw.chain_id)
            .ok_or_else(|| invalid(&raw.id, "chainId", &raw.chain_id))?;
        let short_coin_type = parse_hex_u64(&raw.short_slip44)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(|| invalid(&raw.id, "shortSlip44", &raw.short_slip44))?;
        let meson_address = raw
            .meson_address
            .parse::<Address>()
            .map_err(|_| invalid(&raw.id, "mesonAddress", &raw.meson_address))?;

        let mut seen = HashSet::new();
        let mut tokens = Vec::with_capacity(raw.tokens.len());
        for token in raw.tokens {
            if !seen.insert(token.token_index) {
                return Err(MesonError::Config(format!(
                    "network {} lists token index {} twice",
                    raw.id, token.token_index
                )));
            }
            let address = token
                .addr
                .parse::<Address>()
                .map_err(|_| invalid(&raw.id, "token addr", &token.addr))?;
            tokens.push(TokenPreset {
                address,
                symbol: token.symbol,
                decimals: token.decimals,
                token_index: token.token_index,
            });
        }

        Ok(Self {
            id: raw.id,
            name: raw.name,
            chain_id,
            short_coin_type,
            url: raw.url,
            meson_address,
            tokens,
        })
    }
}

fn parse_hex_u64(value: &str) -> Option<u64> {
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}

fn invalid(network: &str, field: &str, value: &str) -> MesonError {
    MesonError::Config(format!("network {}: invalid {} {:?}", network, field, value))
}

/// Read-only lookup over the presets of one network class
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    networks: Vec<NetworkPreset>,
}

impl NetworkRegistry {
    /// Presets bundled with the crate
    pub fn builtin(testnet: bool) -> MesonResult<Self> {
        Self::from_json(if testnet {
            TESTNET_PRESETS
        } else {
            MAINNET_PRESETS
        })
    }

    pub fn from_json(json: &str) -> MesonResult<Self> {
        let raw: Vec<RawNetwork> = serde_json::from_str(json)
            .map_err(|e| MesonError::Config(format!("invalid network presets: {}", e)))?;
        let networks = raw
            .into_iter()
            .map(NetworkPreset::try_from)
            .collect::<MesonResult<Vec<_>>>()?;
        Self::from_presets(networks)
    }

    pub fn from_presets(networks: Vec<NetworkPreset>) -> MesonResult<Self> {
        let mut ids = HashSet::new();
        for network in &networks {
            if !ids.insert(network.id.as_str()) {
                return Err(MesonError::Config(format!(
                    "duplicate network id {}",
                    network.id
                )));
            }
        }
        Ok(Self { networks })
    }

    pub fn get(&self, id: &str) -> Option<&NetworkPreset> {
        self.networks.iter().find(|n| n.id == id)
    }

    pub fn by_short_coin_type(&self, coin_type: u16) -> Option<&NetworkPreset> {
        self.networks
            .iter()
            .find(|n| n.short_coin_type == coin_type)
    }

    pub fn by_chain_id(&self, chain_id: u64) -> Option<&NetworkPreset> {
        self.networks.iter().find(|n| n.chain_id == chain_id)
    }

    pub fn token(&self, coin_type: u16, index: u8) -> Option<&TokenPreset> {
        self.by_short_coin_type(coin_type)?.token(index)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.networks.iter().map(|n| n.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkPreset> {
        self.networks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_presets_are_valid() {
        let mainnets = NetworkRegistry::builtin(false).unwrap();
        let eth = mainnets.get("eth").unwrap();
        assert_eq!(eth.chain_id, 1);
        assert_eq!(eth.short_coin_type, 0x003c);
        assert_eq!(eth.token(1).unwrap().symbol, "USDC");
        assert_eq!(mainnets.by_chain_id(0x38).unwrap().id, "bnb");
        assert_eq!(mainnets.by_short_coin_type(0x03c6).unwrap().id, "polygon");

        let testnets = NetworkRegistry::builtin(true).unwrap();
        assert!(testnets.get("eth").is_none());
        assert_eq!(testnets.by_short_coin_type(0x003c).unwrap().id, "goerli");
    }

    #[test]
    fn test_missing_lookups_are_none() {
        let registry = NetworkRegistry::builtin(false).unwrap();
        assert!(registry.get("solana").is_none());
        assert!(registry.by_short_coin_type(0xffff).is_none());
        assert!(registry.token(0x003c, 200).is_none());
    }

    #[test]
    fn test_invalid_records_are_rejected() {
        let bad_coin_type = r#"[{"id":"x","name":"X","chainId":"0x1","shortSlip44":"0x10000",
            "mesonAddress":"0x25aB3Efd52e6470681CE037cD546Dc60726948D3","tokens":[]}]"#;
        assert!(NetworkRegistry::from_json(bad_coin_type).is_err());

        let bad_address = r#"[{"id":"x","name":"X","chainId":"0x1","shortSlip44":"0x0001",
            "mesonAddress":"0x1234","tokens":[]}]"#;
        assert!(NetworkRegistry::from_json(bad_address).is_err());

        let duplicate_token = r#"[{"id":"x","name":"X","chainId":"0x1","shortSlip44":"0x0001",
            "mesonAddress":"0x25aB3Efd52e6470681CE037cD546Dc60726948D3","tokens":[
            {"addr":"0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48","symbol":"A","decimals":6,"tokenIndex":1},
            {"addr":"0xdAC17F958D2ee523a2206206994597C13D831ec7","symbol":"B","decimals":6,"tokenIndex":1}]}]"#;
        assert!(NetworkRegistry::from_json(duplicate_token).is_err());
    }

    #[test]
    fn test_duplicate_network_ids_are_rejected() {
        let registry = NetworkRegistry::builtin(false).unwrap();
        let mut presets: Vec<_> = registry.iter().cloned().collect();
        presets.push(presets[0].clone());
        assert!(NetworkRegistry::from_presets(presets).is_err());
    }
}
