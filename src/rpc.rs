//! Per-network RPC client handles.
//!
//! Balance and height queries only. Transaction construction and submission
//! belong to the execution layer, which borrows these handles.

use anyhow::{anyhow, Context, Result};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, U256};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::network::{ChainFamily, NetworkDescriptor, NetworkSymbol, NetworkTable};

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(15);

/// EVM provider for one network. Every call is bounded by `timeout`.
#[derive(Clone)]
pub struct EvmRpcClient {
    url: String,
    expected_chain_id: Option<u64>,
    timeout: Duration,
    provider: Arc<Provider<Http>>,
}

impl EvmRpcClient {
    pub fn new(url: &str, expected_chain_id: Option<u64>, timeout: Duration) -> Result<Self> {
        let provider = Provider::<Http>::try_from(url).with_context(|| format!("bad EVM RPC url {url:?}"))?;
        Ok(Self {
            url: url.to_string(),
            expected_chain_id,
            timeout,
            provider: Arc::new(provider),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn bounded<T, E>(&self, call: impl Future<Output = std::result::Result<T, E>>) -> Result<T>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| anyhow!("rpc call to {} timed out after {:?}", self.url, self.timeout))?
            .map_err(anyhow::Error::from)
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let id = self.bounded(self.provider.get_chainid()).await?;
        u256_to_u64(id)
    }

    pub async fn block_number(&self) -> Result<u64> {
        Ok(self.bounded(self.provider.get_block_number()).await?.as_u64())
    }

    /// Native balance in wei.
    pub async fn balance(&self, address: &str) -> Result<u128> {
        let address: Address = address
            .parse()
            .map_err(|e| anyhow!("bad EVM address {address:?}: {e}"))?;
        let wei = self.bounded(self.provider.get_balance(address, None)).await?;
        u128::try_from(wei).map_err(|_| anyhow!("balance {wei} does not fit in u128"))
    }

    /// Confirms the endpoint serves the expected chain, then returns its height.
    pub async fn probe(&self) -> Result<u64> {
        if let Some(expected) = self.expected_chain_id {
            let actual = self.chain_id().await?;
            if actual != expected {
                return Err(anyhow!("{} serves chain {actual}, expected {expected}", self.url));
            }
        }
        self.block_number().await
    }
}

fn u256_to_u64(v: U256) -> Result<u64> {
    u64::try_from(v).map_err(|_| anyhow!("quantity {v} does not fit in u64"))
}

#[derive(Clone)]
pub enum NetworkClient {
    Evm(EvmRpcClient),
    Solana(Arc<RpcClient>),
}

impl NetworkClient {
    pub fn for_network(d: &NetworkDescriptor, timeout: Duration) -> Result<Self> {
        Ok(match d.family {
            ChainFamily::Evm => NetworkClient::Evm(EvmRpcClient::new(&d.rpc_endpoint, d.chain_id, timeout)?),
            ChainFamily::Solana => NetworkClient::Solana(Arc::new(RpcClient::new_with_timeout_and_commitment(
                d.rpc_endpoint.clone(),
                timeout,
                CommitmentConfig::confirmed(),
            ))),
        })
    }

    /// Cheap liveness check: block number for EVM, slot for Solana.
    pub async fn probe(&self) -> Result<u64> {
        match self {
            NetworkClient::Evm(c) => c.probe().await,
            NetworkClient::Solana(c) => Ok(c.get_slot().await?),
        }
    }

    /// Native balance in the chain's smallest unit (wei or lamports).
    pub async fn native_balance(&self, address: &str) -> Result<u128> {
        match self {
            NetworkClient::Evm(c) => c.balance(address).await,
            NetworkClient::Solana(c) => {
                let pubkey: Pubkey = address
                    .parse()
                    .map_err(|e| anyhow!("bad solana address {address:?}: {e}"))?;
                Ok(u128::from(c.get_balance(&pubkey).await?))
            }
        }
    }

    pub fn as_solana(&self) -> Option<&RpcClient> {
        match self {
            NetworkClient::Solana(c) => Some(c.as_ref()),
            NetworkClient::Evm(_) => None,
        }
    }

    pub fn as_evm(&self) -> Option<&EvmRpcClient> {
        match self {
            NetworkClient::Evm(c) => Some(c),
            NetworkClient::Solana(_) => None,
        }
    }
}

/// One client per network in the table.
#[derive(Clone)]
pub struct RpcClients {
    clients: HashMap<NetworkSymbol, NetworkClient>,
}

impl RpcClients {
    pub fn get(&self, symbol: NetworkSymbol) -> Option<&NetworkClient> {
        self.clients.get(&symbol)
    }
}

/// Builds a client for every network in `table`. Fails on the first
/// endpoint that is not a usable URL.
pub fn build_clients(table: &NetworkTable, timeout: Duration) -> Result<RpcClients> {
    let clients = table
        .iter()
        .map(|d| {
            NetworkClient::for_network(d, timeout)
                .with_context(|| format!("building {} client", d.symbol))
                .map(|c| (d.symbol, c))
        })
        .collect::<Result<HashMap<_, _>>>()?;
    Ok(RpcClients { clients })
}
