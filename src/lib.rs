pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod monitoring;
pub mod network;
pub mod notifier;
pub mod risk;
pub mod rpc;
pub mod scanner;
pub mod state;
pub mod wallet;

pub use coordinator::{LockKey, TradeLock, TradingStateCoordinator};
pub use error::{CoordinatorError, Result};
pub use network::{NetworkDescriptor, NetworkSymbol, NetworkTable};
