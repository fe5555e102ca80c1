use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::network::NetworkSymbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    /// Exit submitted, not yet confirmed.
    Closing,
}

/// An open trade, created when a trade executes and removed when closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub network: NetworkSymbol,
    pub token: String,
    /// Native units spent on entry.
    #[serde(with = "rust_decimal::serde::str")]
    pub entry_amount: Decimal,
    pub entry_time: DateTime<Utc>,
    pub status: PositionStatus,
}

impl Position {
    pub fn open(network: NetworkSymbol, token: impl Into<String>, entry_amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            network,
            token: token.into(),
            entry_amount,
            entry_time: Utc::now(),
            status: PositionStatus::Open,
        }
    }
}
