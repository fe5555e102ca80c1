use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoordinatorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl FromStr for RiskLevel {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(CoordinatorError::InvalidConfigValue {
                field: "risk_level".into(),
                reason: format!("expected low, medium or high, got {other:?}"),
            }),
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Global trading knobs, mutated by command handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    pub auto_pilot_enabled: bool,
    /// Fraction of capital compounded per trade, in (0, 1].
    #[serde(with = "rust_decimal::serde::str")]
    pub risk_fraction: Decimal,
    /// Nominal trade size in native units.
    #[serde(with = "rust_decimal::serde::str")]
    pub base_trade_amount: Decimal,
    pub risk_level: RiskLevel,
    pub trading_mode: String,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            auto_pilot_enabled: false,
            risk_fraction: Decimal::new(1, 1),
            base_trade_amount: Decimal::new(1, 2),
            risk_level: RiskLevel::Medium,
            trading_mode: "short term".to_string(),
        }
    }
}

impl TradingConfig {
    /// Size of the next trade when compounding `capital` at the configured fraction.
    pub fn compounded_trade_size(&self, capital: Decimal) -> Decimal {
        capital * self.risk_fraction
    }

    /// Validates the whole patch first, then merges it. Nothing is applied on error.
    pub fn apply(&mut self, patch: &ConfigPatch) -> Result<()> {
        patch.validate()?;

        if let Some(v) = patch.auto_pilot_enabled {
            self.auto_pilot_enabled = v;
        }
        if let Some(v) = patch.risk_fraction {
            self.risk_fraction = v;
        }
        if let Some(v) = patch.base_trade_amount {
            self.base_trade_amount = v;
        }
        if let Some(v) = patch.risk_level {
            self.risk_level = v;
        }
        if let Some(v) = &patch.trading_mode {
            self.trading_mode = v.trim().to_string();
        }
        Ok(())
    }
}

pub fn validate_risk_fraction(v: Decimal) -> Result<()> {
    if v <= Decimal::ZERO || v > Decimal::ONE {
        return Err(CoordinatorError::InvalidRiskFraction(v.to_string()));
    }
    Ok(())
}

/// A partial update to `TradingConfig`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch {
    pub auto_pilot_enabled: Option<bool>,
    pub risk_fraction: Option<Decimal>,
    pub base_trade_amount: Option<Decimal>,
    pub risk_level: Option<RiskLevel>,
    pub trading_mode: Option<String>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(v) = self.risk_fraction {
            validate_risk_fraction(v)?;
        }
        if let Some(v) = self.base_trade_amount {
            if v <= Decimal::ZERO {
                return Err(invalid("base_trade_amount", format!("must be positive, got {v}")));
            }
        }
        if let Some(v) = &self.trading_mode {
            if v.trim().is_empty() {
                return Err(invalid("trading_mode", "must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Parses a JSON object of recognized fields. Both snake_case and camelCase
    /// keys are accepted; any other key is rejected.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid("patch", "expected a JSON object".into()))?;

        let mut patch = ConfigPatch::default();
        for (key, v) in obj {
            match key.as_str() {
                "auto_pilot_enabled" | "autoPilotEnabled" => {
                    let b = v
                        .as_bool()
                        .ok_or_else(|| invalid("auto_pilot_enabled", format!("expected bool, got {v}")))?;
                    patch.auto_pilot_enabled = Some(b);
                }
                "risk_fraction" | "riskFraction" => {
                    patch.risk_fraction = Some(json_decimal("risk_fraction", v)?);
                }
                "base_trade_amount" | "baseTradeAmount" => {
                    patch.base_trade_amount = Some(json_decimal("base_trade_amount", v)?);
                }
                "risk_level" | "riskLevel" => {
                    let s = v
                        .as_str()
                        .ok_or_else(|| invalid("risk_level", format!("expected string, got {v}")))?;
                    patch.risk_level = Some(s.parse()?);
                }
                "trading_mode" | "tradingMode" => {
                    let s = v
                        .as_str()
                        .ok_or_else(|| invalid("trading_mode", format!("expected string, got {v}")))?;
                    patch.trading_mode = Some(s.to_string());
                }
                other => return Err(CoordinatorError::InvalidConfigField(other.to_string())),
            }
        }
        Ok(patch)
    }
}

fn invalid(field: &str, reason: String) -> CoordinatorError {
    CoordinatorError::InvalidConfigValue { field: field.to_string(), reason }
}

// Accepts JSON numbers and decimal strings ("0.25"). Numbers go through their
// textual form so 0.1 stays exactly 0.1. Digits past the representable scale
// are an error, never rounded away.
fn json_decimal(field: &str, v: &Value) -> Result<Decimal> {
    let raw = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(invalid(field, format!("expected decimal, got {other}"))),
    };
    let parsed = if raw.contains(['e', 'E']) {
        Decimal::from_scientific(&raw)
    } else {
        Decimal::from_str_exact(&raw)
    };
    parsed.map_err(|e| invalid(field, format!("{raw:?}: {e}")))
}
