use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoordinatorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkSymbol {
    Eth,
    Sol,
    Base,
    Bsc,
    Arb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
}

impl NetworkSymbol {
    pub const ALL: [NetworkSymbol; 5] = [
        NetworkSymbol::Eth,
        NetworkSymbol::Sol,
        NetworkSymbol::Base,
        NetworkSymbol::Bsc,
        NetworkSymbol::Arb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkSymbol::Eth => "ETH",
            NetworkSymbol::Sol => "SOL",
            NetworkSymbol::Base => "BASE",
            NetworkSymbol::Bsc => "BSC",
            NetworkSymbol::Arb => "ARB",
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            NetworkSymbol::Sol => ChainFamily::Solana,
            _ => ChainFamily::Evm,
        }
    }

    /// Canonical chain name used as `NetworkDescriptor::id`.
    pub fn chain_name(&self) -> &'static str {
        match self {
            NetworkSymbol::Eth => "ethereum",
            NetworkSymbol::Sol => "solana",
            NetworkSymbol::Base => "base",
            NetworkSymbol::Bsc => "bsc",
            NetworkSymbol::Arb => "arbitrum",
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            NetworkSymbol::Eth => Some(1),
            NetworkSymbol::Sol => None,
            NetworkSymbol::Base => Some(8453),
            NetworkSymbol::Bsc => Some(56),
            NetworkSymbol::Arb => Some(42161),
        }
    }

    /// Environment variable that overrides this network's RPC endpoint.
    pub fn rpc_env_var(&self) -> &'static str {
        match self {
            NetworkSymbol::Eth => "ETH_RPC_URL",
            NetworkSymbol::Sol => "SOLANA_RPC_URL",
            NetworkSymbol::Base => "BASE_RPC_URL",
            NetworkSymbol::Bsc => "BSC_RPC_URL",
            NetworkSymbol::Arb => "ARBITRUM_RPC_URL",
        }
    }
}

impl fmt::Display for NetworkSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkSymbol {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ETH" => Ok(NetworkSymbol::Eth),
            "SOL" => Ok(NetworkSymbol::Sol),
            "BASE" => Ok(NetworkSymbol::Base),
            "BSC" => Ok(NetworkSymbol::Bsc),
            "ARB" => Ok(NetworkSymbol::Arb),
            _ => Err(CoordinatorError::UnknownNetwork(s.to_string())),
        }
    }
}

/// Public RPC endpoints (rate limited; override per network in production)
mod public_rpcs {
    pub const ETHEREUM: &str = "https://eth.llamarpc.com";
    pub const SOLANA: &str = "https://api.mainnet-beta.solana.com";
    pub const BASE: &str = "https://mainnet.base.org";
    pub const BSC: &str = "https://bsc-dataseed.binance.org";
    pub const ARBITRUM: &str = "https://arb1.arbitrum.io/rpc";
}

mod routers {
    /// Uniswap V2 Router02
    pub const ETHEREUM: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";
    /// Uniswap V2 Router02 (Base deployment)
    pub const BASE: &str = "0x4752ba5DBc23f44D87826276BF6Fd6b1C372aD24";
    /// PancakeSwap V2 router
    pub const BSC: &str = "0x10ED43C718714eb63d5aA57B78B54704E256024E";
    /// SushiSwap router
    pub const ARBITRUM: &str = "0x1b02dA8Cb0d097eB8D57A175b88c7D8b47997506";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    pub symbol: NetworkSymbol,
    pub id: String,
    pub rpc_endpoint: String,
    pub router_address: Option<String>,
    pub chain_id: Option<u64>,
    pub family: ChainFamily,
}

impl NetworkDescriptor {
    pub fn default_for(symbol: NetworkSymbol) -> Self {
        let (rpc, router) = match symbol {
            NetworkSymbol::Eth => (public_rpcs::ETHEREUM, Some(routers::ETHEREUM)),
            NetworkSymbol::Sol => (public_rpcs::SOLANA, None),
            NetworkSymbol::Base => (public_rpcs::BASE, Some(routers::BASE)),
            NetworkSymbol::Bsc => (public_rpcs::BSC, Some(routers::BSC)),
            NetworkSymbol::Arb => (public_rpcs::ARBITRUM, Some(routers::ARBITRUM)),
        };
        Self {
            symbol,
            id: symbol.chain_name().to_string(),
            rpc_endpoint: rpc.to_string(),
            router_address: router.map(str::to_string),
            chain_id: symbol.chain_id(),
            family: symbol.family(),
        }
    }

    fn validate(&self) -> Result<()> {
        let bad = |reason: String| Err(CoordinatorError::InvalidNetworkTable(reason));
        if self.id.trim().is_empty() {
            return bad(format!("{}: empty id", self.symbol));
        }
        if self.rpc_endpoint.trim().is_empty() {
            return bad(format!("{}: empty rpc endpoint", self.symbol));
        }
        if self.family != self.symbol.family() {
            return bad(format!("{}: wrong chain family {:?}", self.symbol, self.family));
        }
        match (self.family, self.router_address.as_deref()) {
            (ChainFamily::Evm, None) => bad(format!("{}: EVM network needs a router", self.symbol)),
            (ChainFamily::Evm, Some(r)) if r.trim().is_empty() => {
                bad(format!("{}: empty router address", self.symbol))
            }
            (ChainFamily::Solana, Some(_)) => {
                bad(format!("{}: non-EVM network cannot carry a router", self.symbol))
            }
            _ => Ok(()),
        }
    }
}

/// The fixed table of supported networks.
#[derive(Debug, Clone)]
pub struct NetworkTable {
    entries: HashMap<NetworkSymbol, NetworkDescriptor>,
}

impl NetworkTable {
    /// Defaults with per-network RPC overrides applied.
    pub fn with_overrides(rpc_overrides: &HashMap<NetworkSymbol, String>) -> Result<Self> {
        let descriptors = NetworkSymbol::ALL.iter().map(|&symbol| {
            let mut d = NetworkDescriptor::default_for(symbol);
            if let Some(url) = rpc_overrides.get(&symbol) {
                d.rpc_endpoint = url.trim().to_string();
            }
            d
        });
        Self::from_descriptors(descriptors)
    }

    /// Builds a table from explicit descriptors. Every supported symbol must be
    /// present exactly once and satisfy the descriptor invariants.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = NetworkDescriptor>) -> Result<Self> {
        let mut entries = HashMap::new();
        for d in descriptors {
            d.validate()?;
            if entries.insert(d.symbol, d.clone()).is_some() {
                return Err(CoordinatorError::InvalidNetworkTable(format!(
                    "{}: duplicate entry",
                    d.symbol
                )));
            }
        }
        if let Some(missing) = NetworkSymbol::ALL.iter().find(|s| !entries.contains_key(s)) {
            return Err(CoordinatorError::InvalidNetworkTable(format!("{missing}: missing entry")));
        }
        Ok(Self { entries })
    }

    pub fn get(&self, symbol: NetworkSymbol) -> &NetworkDescriptor {
        // from_descriptors guarantees every symbol is present
        &self.entries[&symbol]
    }

    pub fn lookup(&self, symbol: &str) -> Result<&NetworkDescriptor> {
        let symbol: NetworkSymbol = symbol.parse()?;
        Ok(self.get(symbol))
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkDescriptor> {
        NetworkSymbol::ALL.iter().map(move |s| self.get(*s))
    }
}

impl Default for NetworkTable {
    fn default() -> Self {
        let entries = NetworkSymbol::ALL
            .iter()
            .map(|&s| (s, NetworkDescriptor::default_for(s)))
            .collect();
        Self { entries }
    }
}
