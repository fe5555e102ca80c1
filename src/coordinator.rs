//! Single owner of trading configuration, runtime state and per-asset trade locks.
//!
//! Handlers (scan loop, executor, command handlers) share one
//! `Arc<TradingStateCoordinator>` and go through its methods; nobody keeps a
//! private copy of the state.

use anyhow::Result as AnyResult;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Position, PositionStatus};
use crate::error::{CoordinatorError, Result};
use crate::network::{ChainFamily, NetworkDescriptor, NetworkSymbol, NetworkTable};
use crate::risk::{ConfigPatch, TradingConfig};
use crate::rpc::{build_clients, NetworkClient, RpcClients, DEFAULT_RPC_TIMEOUT};
use crate::state::{EphemeralStore, GlobalTradingState, StatePersistence, StateSnapshot};
use crate::wallet::{WalletHandle, WalletSet};

/// Identifies one asset on one network. EVM addresses are hex and compared
/// case-insensitively; Solana mints are base58 and kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub network: NetworkSymbol,
    pub token: String,
}

impl LockKey {
    pub fn new(network: NetworkSymbol, token: &str) -> Self {
        let token = token.trim();
        let token = match network.family() {
            ChainFamily::Evm => token.to_ascii_lowercase(),
            ChainFamily::Solana => token.to_string(),
        };
        Self { network, token }
    }
}

/// Held locks, each tagged with the generation of the acquisition that took it.
type LockTable = DashMap<LockKey, u64>;

/// Holds a trade lock until dropped.
#[derive(Debug)]
pub struct TradeLock {
    key: LockKey,
    generation: u64,
    locks: Arc<LockTable>,
}

impl TradeLock {
    pub fn key(&self) -> &LockKey {
        &self.key
    }
}

impl Drop for TradeLock {
    // Only removes the entry this guard took. If the key was released and
    // re-acquired meanwhile, the newer holder keeps it.
    fn drop(&mut self) {
        let generation = self.generation;
        if self.locks.remove_if(&self.key, |_, g| *g == generation).is_some() {
            debug!(network = %self.key.network, token = %self.key.token, "coordinator.lock_guard_released");
        }
    }
}

pub struct TradingStateCoordinator {
    networks: NetworkTable,
    clients: RpcClients,
    wallets: OnceLock<WalletSet>,
    state: RwLock<GlobalTradingState>,
    locks: Arc<LockTable>,
    next_generation: AtomicU64,
    store: Arc<dyn StatePersistence>,
}

impl TradingStateCoordinator {
    /// Ephemeral coordinator with default RPC clients: state starts from
    /// defaults and is lost on restart.
    pub fn new(networks: NetworkTable) -> AnyResult<Self> {
        let clients = build_clients(&networks, DEFAULT_RPC_TIMEOUT)?;
        Ok(Self::from_parts(networks, clients, GlobalTradingState::default(), Arc::new(EphemeralStore)))
    }

    /// Restores from `store` if it holds a snapshot. Trade locks always start empty.
    pub fn with_persistence(
        networks: NetworkTable,
        clients: RpcClients,
        store: Arc<dyn StatePersistence>,
    ) -> AnyResult<Self> {
        let state = match store.load()? {
            Some(snap) => {
                info!(
                    positions = snap.state.active_positions.len(),
                    "coordinator.state_restored"
                );
                snap.state
            }
            None => GlobalTradingState::default(),
        };
        Ok(Self::from_parts(networks, clients, state, store))
    }

    fn from_parts(
        networks: NetworkTable,
        clients: RpcClients,
        state: GlobalTradingState,
        store: Arc<dyn StatePersistence>,
    ) -> Self {
        Self {
            networks,
            clients,
            wallets: OnceLock::new(),
            state: RwLock::new(state),
            locks: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            store,
        }
    }

    // --- networks & wallets ---

    pub fn network(&self, symbol: &str) -> Result<&NetworkDescriptor> {
        self.networks.lookup(symbol)
    }

    pub fn networks(&self) -> &NetworkTable {
        &self.networks
    }

    pub fn client(&self, symbol: &str) -> Result<&NetworkClient> {
        let symbol: NetworkSymbol = symbol.parse()?;
        self.clients
            .get(symbol)
            .ok_or_else(|| CoordinatorError::UnknownNetwork(symbol.to_string()))
    }

    /// Installs the process wallets. Allowed once; wallets are never rotated.
    pub fn install_wallets(&self, wallets: WalletSet) -> Result<()> {
        self.wallets
            .set(wallets)
            .map_err(|_| CoordinatorError::WalletsAlreadyInitialized)?;
        info!("coordinator.wallets_installed");
        Ok(())
    }

    pub fn wallets_ready(&self) -> bool {
        self.wallets.get().is_some()
    }

    pub fn wallet(&self, symbol: &str) -> Result<WalletHandle> {
        let symbol: NetworkSymbol = symbol.parse()?;
        let wallets = self.wallets.get().ok_or(CoordinatorError::WalletNotInitialized)?;
        Ok(wallets.handle_for(symbol))
    }

    // --- trade locks ---

    /// Atomic check-and-set. Returns `true` only for the caller that took the lock.
    pub fn try_acquire_lock(&self, network: NetworkSymbol, token: &str) -> bool {
        self.acquire(LockKey::new(network, token)).is_some()
    }

    // Shard-locked entry: check and insert happen under one write lock.
    fn acquire(&self, key: LockKey) -> Option<u64> {
        let (network, token) = (key.network, key.token.clone());
        match self.locks.entry(key) {
            Entry::Occupied(_) => {
                debug!(%network, token = %token, "coordinator.lock_busy");
                None
            }
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                slot.insert(generation);
                debug!(%network, token = %token, generation, "coordinator.lock_acquired");
                Some(generation)
            }
        }
    }

    /// Releasing a key that is not held is a no-op.
    pub fn release_lock(&self, network: NetworkSymbol, token: &str) {
        if self.locks.remove(&LockKey::new(network, token)).is_some() {
            debug!(%network, token, "coordinator.lock_released");
        }
    }

    pub fn is_locked(&self, network: NetworkSymbol, token: &str) -> bool {
        self.locks.contains_key(&LockKey::new(network, token))
    }

    pub fn locked_count(&self) -> usize {
        self.locks.len()
    }

    /// Like `try_acquire_lock`, but the lock is released when the guard drops.
    pub fn lock_guard(&self, network: NetworkSymbol, token: &str) -> Option<TradeLock> {
        let key = LockKey::new(network, token);
        let generation = self.acquire(key.clone())?;
        Some(TradeLock { key, generation, locks: Arc::clone(&self.locks) })
    }

    // --- configuration ---

    pub async fn config(&self) -> TradingConfig {
        self.state.read().await.config.clone()
    }

    pub async fn update_config(&self, patch: ConfigPatch) -> Result<TradingConfig> {
        if patch.is_empty() {
            return Ok(self.config().await);
        }
        let mut st = self.state.write().await;
        st.config.apply(&patch)?;
        let updated = st.config.clone();
        info!(
            auto_pilot = updated.auto_pilot_enabled,
            risk_fraction = %updated.risk_fraction,
            base_trade_amount = %updated.base_trade_amount,
            risk_level = %updated.risk_level,
            trading_mode = %updated.trading_mode,
            "coordinator.config_updated"
        );
        self.persist_locked(st).await;
        Ok(updated)
    }

    /// Entry point for command handlers holding a raw JSON patch.
    pub async fn update_config_json(&self, patch: &Value) -> Result<TradingConfig> {
        let patch = ConfigPatch::from_json(patch)?;
        self.update_config(patch).await
    }

    // --- positions ---

    pub async fn record_position(&self, position: Position) -> Result<()> {
        let mut st = self.state.write().await;
        if st.active_positions.iter().any(|p| p.id == position.id) {
            return Err(CoordinatorError::DuplicatePosition(position.id));
        }
        info!(
            id = %position.id,
            network = %position.network,
            token = %position.token,
            entry_amount = %position.entry_amount,
            "coordinator.position_recorded"
        );
        st.active_positions.push(position);
        self.persist_locked(st).await;
        Ok(())
    }

    pub async fn close_position(&self, id: Uuid) -> Result<Position> {
        let mut st = self.state.write().await;
        let idx = st
            .active_positions
            .iter()
            .position(|p| p.id == id)
            .ok_or(CoordinatorError::PositionNotFound(id))?;
        let closed = st.active_positions.remove(idx);
        info!(id = %closed.id, network = %closed.network, token = %closed.token, "coordinator.position_closed");
        self.persist_locked(st).await;
        Ok(closed)
    }

    /// Flags a position whose exit has been submitted but not yet confirmed.
    pub async fn mark_closing(&self, id: Uuid) -> Result<Position> {
        let mut st = self.state.write().await;
        let pos = st
            .active_positions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(CoordinatorError::PositionNotFound(id))?;
        pos.status = PositionStatus::Closing;
        let marked = pos.clone();
        info!(id = %marked.id, network = %marked.network, token = %marked.token, "coordinator.position_closing");
        self.persist_locked(st).await;
        Ok(marked)
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.state.read().await.active_positions.clone()
    }

    pub async fn positions_len(&self) -> usize {
        self.state.read().await.active_positions.len()
    }

    // --- last traded ---

    /// Overwrites the entry; no history is kept.
    pub async fn set_last_traded(&self, network: NetworkSymbol, token: &str) {
        let mut st = self.state.write().await;
        st.last_traded_tokens.insert(network, token.to_string());
        debug!(%network, token, "coordinator.last_traded");
        self.persist_locked(st).await;
    }

    pub async fn last_traded(&self, network: NetworkSymbol) -> Option<String> {
        self.state.read().await.last_traded_tokens.get(&network).cloned()
    }

    pub async fn last_traded_tokens(&self) -> HashMap<NetworkSymbol, String> {
        self.state.read().await.last_traded_tokens.clone()
    }

    // --- persistence ---

    pub async fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::new(self.state.read().await.clone())
    }

    /// Saves the current state and reports the store's error, if any.
    pub async fn persist(&self) -> AnyResult<()> {
        let st = self.state.write().await;
        self.save(StateSnapshot::new(st.clone())).await
    }

    // Runs the blocking save off the async workers.
    async fn save(&self, snapshot: StateSnapshot) -> AnyResult<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save(&snapshot)).await?
    }

    // The write guard is held until the save finishes so snapshots land in
    // mutation order. Non-durable stores are skipped entirely.
    async fn persist_locked(&self, st: RwLockWriteGuard<'_, GlobalTradingState>) {
        if !self.store.is_durable() {
            return;
        }
        if let Err(e) = self.save(StateSnapshot::new(st.clone())).await {
            warn!(error = %e, "coordinator.persist_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskLevel;
    use crate::state::JsonFileStore;
    use crate::wallet::{KeySource, MnemonicKeySource};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn coordinator() -> TradingStateCoordinator {
        TradingStateCoordinator::new(NetworkTable::default()).unwrap()
    }

    fn clients() -> RpcClients {
        build_clients(&NetworkTable::default(), DEFAULT_RPC_TIMEOUT).unwrap()
    }

    /// Counts saves; `durable` decides whether the coordinator bothers saving.
    #[derive(Default)]
    struct CountingStore {
        durable: bool,
        saves: AtomicUsize,
    }

    impl StatePersistence for CountingStore {
        fn load(&self) -> AnyResult<Option<StateSnapshot>> {
            Ok(None)
        }

        fn save(&self, _snapshot: &StateSnapshot) -> AnyResult<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_durable(&self) -> bool {
            self.durable
        }
    }

    #[test]
    fn every_network_has_a_client() {
        let c = coordinator();
        assert!(c.client("sol").unwrap().as_solana().is_some());
        assert!(c.client("BSC").unwrap().as_evm().is_some());
        assert!(c.client("DOT").is_err());
    }

    #[test]
    fn unknown_network_is_rejected() {
        let c = coordinator();
        assert_eq!(c.network("ETH").unwrap().id, "ethereum");
        assert_eq!(
            c.network("MATIC").unwrap_err(),
            CoordinatorError::UnknownNetwork("MATIC".into())
        );
    }

    #[test]
    fn wallet_before_install_fails() {
        let c = coordinator();
        assert_eq!(c.wallet("ETH").unwrap_err(), CoordinatorError::WalletNotInitialized);
        assert_eq!(c.wallet("XYZ").unwrap_err(), CoordinatorError::UnknownNetwork("XYZ".into()));
    }

    #[test]
    fn wallets_install_once() {
        let c = coordinator();
        let src = MnemonicKeySource::new("test test test test test test test test test test test junk", "");
        c.install_wallets(src.derive().unwrap()).unwrap();
        assert!(c.wallets_ready());
        assert_eq!(c.wallet("SOL").unwrap().family(), ChainFamily::Solana);
        assert_eq!(c.wallet("arb").unwrap().address(), c.wallet("BSC").unwrap().address());
        assert_eq!(
            c.install_wallets(src.derive().unwrap()).unwrap_err(),
            CoordinatorError::WalletsAlreadyInitialized
        );
    }

    #[test]
    fn second_acquire_fails_until_release() {
        let c = coordinator();
        assert!(c.try_acquire_lock(NetworkSymbol::Eth, "0xabc"));
        assert!(!c.try_acquire_lock(NetworkSymbol::Eth, "0xabc"));
        // other network, same token: independent
        assert!(c.try_acquire_lock(NetworkSymbol::Base, "0xabc"));

        c.release_lock(NetworkSymbol::Eth, "0xabc");
        assert!(c.try_acquire_lock(NetworkSymbol::Eth, "0xabc"));
    }

    #[test]
    fn release_is_idempotent() {
        let c = coordinator();
        c.release_lock(NetworkSymbol::Sol, "mint");
        c.release_lock(NetworkSymbol::Sol, "mint");
        assert!(c.try_acquire_lock(NetworkSymbol::Sol, "mint"));
        assert_eq!(c.locked_count(), 1);
    }

    #[test]
    fn evm_lock_keys_ignore_case_solana_keys_do_not() {
        let c = coordinator();
        assert!(c.try_acquire_lock(NetworkSymbol::Eth, "0xAbC"));
        assert!(!c.try_acquire_lock(NetworkSymbol::Eth, "0xabc"));

        assert!(c.try_acquire_lock(NetworkSymbol::Sol, "AbC"));
        assert!(c.try_acquire_lock(NetworkSymbol::Sol, "abc"));
    }

    #[test]
    fn guard_releases_on_drop() {
        let c = coordinator();
        {
            let g = c.lock_guard(NetworkSymbol::Bsc, "0xdead").unwrap();
            assert_eq!(g.key().token, "0xdead");
            assert!(c.lock_guard(NetworkSymbol::Bsc, "0xDEAD").is_none());
            assert!(c.is_locked(NetworkSymbol::Bsc, "0xdead"));
        }
        assert!(!c.is_locked(NetworkSymbol::Bsc, "0xdead"));
    }

    #[test]
    fn stale_guard_does_not_release_a_newer_holder() {
        let c = coordinator();
        let guard = c.lock_guard(NetworkSymbol::Eth, "0xabc").unwrap();
        c.release_lock(NetworkSymbol::Eth, "0xabc");
        assert!(c.try_acquire_lock(NetworkSymbol::Eth, "0xABC"));

        drop(guard);
        assert!(c.is_locked(NetworkSymbol::Eth, "0xabc"));
        assert!(!c.try_acquire_lock(NetworkSymbol::Eth, "0xabc"));

        c.release_lock(NetworkSymbol::Eth, "0xabc");
        assert!(c.try_acquire_lock(NetworkSymbol::Eth, "0xabc"));
    }

    #[tokio::test]
    async fn risk_fraction_out_of_range_is_rejected() {
        let c = coordinator();
        for bad in [json!({"riskFraction": 0}), json!({"riskFraction": 1.5})] {
            assert!(matches!(
                c.update_config_json(&bad).await,
                Err(CoordinatorError::InvalidRiskFraction(_))
            ));
        }
        let cfg = c.update_config_json(&json!({"riskFraction": 0.25})).await.unwrap();
        assert_eq!(cfg.risk_fraction, dec!(0.25));
        assert_eq!(c.config().await.risk_fraction, dec!(0.25));
    }

    #[tokio::test]
    async fn unknown_config_field_leaves_state_untouched() {
        let c = coordinator();
        let before = c.config().await;
        let err = c
            .update_config_json(&json!({"autoPilotEnabled": true, "slippage": 5}))
            .await
            .unwrap_err();
        assert_eq!(err, CoordinatorError::InvalidConfigField("slippage".into()));
        assert_eq!(c.config().await, before);
    }

    #[tokio::test]
    async fn typed_patch_merges_only_given_fields() {
        let c = coordinator();
        let cfg = c
            .update_config(ConfigPatch {
                risk_level: Some(RiskLevel::Low),
                auto_pilot_enabled: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cfg.risk_level, RiskLevel::Low);
        assert!(cfg.auto_pilot_enabled);
        assert_eq!(cfg.trading_mode, "short term");
    }

    #[tokio::test]
    async fn close_unknown_position_fails() {
        let c = coordinator();
        let id = Uuid::new_v4();
        assert_eq!(c.close_position(id).await.unwrap_err(), CoordinatorError::PositionNotFound(id));
    }

    #[tokio::test]
    async fn record_then_close_removes_position() {
        let c = coordinator();
        let a = Position::open(NetworkSymbol::Eth, "0xa", dec!(0.1));
        let b = Position::open(NetworkSymbol::Sol, "mintB", dec!(2));
        c.record_position(a.clone()).await.unwrap();
        c.record_position(b.clone()).await.unwrap();
        assert_eq!(
            c.record_position(a.clone()).await.unwrap_err(),
            CoordinatorError::DuplicatePosition(a.id)
        );

        let closed = c.close_position(a.id).await.unwrap();
        assert_eq!(closed, a);
        assert_eq!(c.positions().await, vec![b]);
        assert!(c.close_position(a.id).await.is_err());
    }

    #[tokio::test]
    async fn closing_position_stays_active_until_closed() {
        let c = coordinator();
        let p = Position::open(NetworkSymbol::Sol, "mintC", dec!(1));
        c.record_position(p.clone()).await.unwrap();

        let marked = c.mark_closing(p.id).await.unwrap();
        assert_eq!(marked.status, PositionStatus::Closing);
        assert_eq!(c.positions_len().await, 1);
        assert_eq!(c.positions().await[0].status, PositionStatus::Closing);

        c.close_position(p.id).await.unwrap();
        assert_eq!(c.positions_len().await, 0);
        assert!(matches!(c.mark_closing(p.id).await, Err(CoordinatorError::PositionNotFound(_))));
    }

    #[tokio::test]
    async fn mutations_skip_non_durable_stores() {
        for durable in [false, true] {
            let store = Arc::new(CountingStore { durable, ..Default::default() });
            let c = TradingStateCoordinator::with_persistence(NetworkTable::default(), clients(), store.clone()).unwrap();
            c.set_last_traded(NetworkSymbol::Eth, "0x1").await;
            c.record_position(Position::open(NetworkSymbol::Eth, "0x1", dec!(1))).await.unwrap();
            // empty patch changes nothing and saves nothing
            c.update_config(ConfigPatch::default()).await.unwrap();

            let expected = if durable { 2 } else { 0 };
            assert_eq!(store.saves.load(Ordering::SeqCst), expected);

            // an explicit persist always reaches the store
            c.persist().await.unwrap();
            assert_eq!(store.saves.load(Ordering::SeqCst), expected + 1);
        }
    }

    #[tokio::test]
    async fn last_traded_overwrites() {
        let c = coordinator();
        c.set_last_traded(NetworkSymbol::Eth, "0xABC").await;
        assert_eq!(c.last_traded(NetworkSymbol::Eth).await.as_deref(), Some("0xABC"));
        c.set_last_traded(NetworkSymbol::Eth, "0xDEF").await;
        let all = c.last_traded_tokens().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[&NetworkSymbol::Eth], "0xDEF");
    }

    #[tokio::test]
    async fn file_store_restores_state_but_not_locks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let pos = Position::open(NetworkSymbol::Arb, "0xfeed", dec!(0.3));
        {
            let c = TradingStateCoordinator::with_persistence(
                NetworkTable::default(),
                clients(),
                Arc::new(JsonFileStore::new(&path)),
            )
            .unwrap();
            c.record_position(pos.clone()).await.unwrap();
            c.set_last_traded(NetworkSymbol::Arb, "0xfeed").await;
            assert!(c.try_acquire_lock(NetworkSymbol::Arb, "0xfeed"));
        }

        let c = TradingStateCoordinator::with_persistence(
            NetworkTable::default(),
            clients(),
            Arc::new(JsonFileStore::new(&path)),
        )
        .unwrap();
        assert_eq!(c.positions().await, vec![pos]);
        assert_eq!(c.last_traded(NetworkSymbol::Arb).await.as_deref(), Some("0xfeed"));
        assert!(!c.is_locked(NetworkSymbol::Arb, "0xfeed"));
        c.persist().await.unwrap();
    }
}
