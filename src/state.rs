use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::{Path, PathBuf}};

use crate::domain::Position;
use crate::network::NetworkSymbol;
use crate::risk::TradingConfig;

/// Mutable runtime state owned by the coordinator. The trade lock table is
/// kept separately so lock checks never contend with state readers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalTradingState {
    pub config: TradingConfig,
    pub last_traded_tokens: HashMap<NetworkSymbol, String>,
    pub active_positions: Vec<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    #[serde(flatten)]
    pub state: GlobalTradingState,
}

impl StateSnapshot {
    pub const VERSION: u32 = 1;

    pub fn new(state: GlobalTradingState) -> Self {
        Self { version: Self::VERSION, state }
    }
}

/// Persistence hook for coordinator state.
///
/// Whether positions should survive a restart is still a product decision, so
/// the default is `EphemeralStore` and file persistence is opt-in.
pub trait StatePersistence: Send + Sync {
    fn load(&self) -> Result<Option<StateSnapshot>>;
    fn save(&self, snapshot: &StateSnapshot) -> Result<()>;

    /// `false` when `save` keeps nothing, so callers can skip building snapshots.
    fn is_durable(&self) -> bool {
        true
    }
}

/// Keeps nothing; state is lost on restart.
#[derive(Debug, Default, Clone, Copy)]
pub struct EphemeralStore;

impl StatePersistence for EphemeralStore {
    fn load(&self) -> Result<Option<StateSnapshot>> {
        Ok(None)
    }

    fn save(&self, _snapshot: &StateSnapshot) -> Result<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}

/// Pretty-printed JSON file, rewritten on every save.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatePersistence for JsonFileStore {
    fn load(&self) -> Result<Option<StateSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let st: StateSnapshot = serde_json::from_str(&raw)?;
        if st.version != StateSnapshot::VERSION {
            anyhow::bail!(
                "unsupported state version {} in {}",
                st.version,
                self.path.display()
            );
        }
        Ok(Some(st))
    }

    fn save(&self, st: &StateSnapshot) -> Result<()> {
        let raw = serde_json::to_string_pretty(st)?;
        // write-then-rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
