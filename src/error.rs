use thiserror::Error;
use uuid::Uuid;

/// Local validation failures raised by the coordinator and the wallet layer.
///
/// Transport failures (RPC, scanner, Telegram) are not represented here; those
/// modules return `anyhow::Error` and the caller decides whether to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("wallets have not been initialized")]
    WalletNotInitialized,

    #[error("wallets are already initialized")]
    WalletsAlreadyInitialized,

    #[error("wallet derivation failed: {0}")]
    WalletDerivation(String),

    #[error("invalid config field: {0}")]
    InvalidConfigField(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidConfigValue { field: String, reason: String },

    #[error("risk fraction must be in (0, 1], got {0}")]
    InvalidRiskFraction(String),

    #[error("position not found: {0}")]
    PositionNotFound(Uuid),

    #[error("position already recorded: {0}")]
    DuplicatePosition(Uuid),

    #[error("invalid network table: {0}")]
    InvalidNetworkTable(String),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
