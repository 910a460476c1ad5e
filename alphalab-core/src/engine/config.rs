//! Serializable engine configuration with eager validation.

use crate::construction::{ConstructorConfig, ConstructorError};
use crate::costs::{CostModel, CostModelError};
use crate::sizing::{SizerConfig, SizerError};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content-addressable hash of a config (hex blake3).
pub type ConfigId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("initial_capital must be positive and finite, got {value}")]
    InvalidCapital { value: f64 },
    #[error("stop_loss_pct must be in (0, 1), got {value}")]
    InvalidStopLoss { value: f64 },
    #[error("take_profit_pct must be positive and finite, got {value}")]
    InvalidTakeProfit { value: f64 },
    #[error("hard_max_hold_days must be at least 1")]
    InvalidMaxHold,
    #[error("vol_window_days must be at least 2, got {value}")]
    InvalidVolWindow { value: usize },
    #[error(transparent)]
    Costs(#[from] CostModelError),
    #[error(transparent)]
    Sizer(#[from] SizerError),
    #[error(transparent)]
    Constructor(#[from] ConstructorError),
    #[error("config TOML did not parse: {0}")]
    Toml(#[from] toml::de::Error),
}

/// When the engine feeds new signals into construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceCadence {
    Daily,
    /// First trading day of each ISO week.
    Weekly,
    /// First trading day of each calendar month.
    Monthly,
}

impl RebalanceCadence {
    /// `prev` is the previous trading day, `None` on the first bar of a run.
    /// The first bar always rebalances.
    pub fn is_rebalance_day(&self, date: NaiveDate, prev: Option<NaiveDate>) -> bool {
        let prev = match prev {
            Some(prev) => prev,
            None => return true,
        };
        match self {
            RebalanceCadence::Daily => true,
            RebalanceCadence::Weekly => date.iso_week() != prev.iso_week(),
            RebalanceCadence::Monthly => {
                (date.year(), date.month()) != (prev.year(), prev.month())
            }
        }
    }
}

/// Everything a run needs. Two configs with the same `config_id` produce
/// byte-identical runs on the same inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub costs: CostModel,
    pub rebalance: RebalanceCadence,
    /// Stop distance below (long) or above (short) the entry fill.
    pub stop_loss_pct: f64,
    /// Take-profit distance from the entry fill.
    pub take_profit_pct: f64,
    /// Hard holding ceiling in trading days. Independent of any horizon a
    /// signal advertises; this is the engine's own risk control.
    pub hard_max_hold_days: usize,
    /// Trailing window for instrument volatility estimates.
    pub vol_window_days: usize,
    pub sizer: SizerConfig,
    pub constructor: ConstructorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            costs: CostModel::retail(),
            rebalance: RebalanceCadence::Weekly,
            stop_loss_pct: 0.08,
            take_profit_pct: 0.15,
            hard_max_hold_days: 90,
            vol_window_days: 63,
            sizer: SizerConfig::default(),
            constructor: ConstructorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(ConfigError::InvalidCapital {
                value: self.initial_capital,
            });
        }
        if !self.stop_loss_pct.is_finite() || self.stop_loss_pct <= 0.0 || self.stop_loss_pct >= 1.0
        {
            return Err(ConfigError::InvalidStopLoss {
                value: self.stop_loss_pct,
            });
        }
        if !self.take_profit_pct.is_finite() || self.take_profit_pct <= 0.0 {
            return Err(ConfigError::InvalidTakeProfit {
                value: self.take_profit_pct,
            });
        }
        if self.hard_max_hold_days == 0 {
            return Err(ConfigError::InvalidMaxHold);
        }
        if self.vol_window_days < 2 {
            return Err(ConfigError::InvalidVolWindow {
                value: self.vol_window_days,
            });
        }
        self.costs.validate()?;
        self.sizer.validate()?;
        self.constructor.validate()?;
        Ok(())
    }

    /// Parse and validate a config from TOML. Missing fields take defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Deterministic content hash. Two runs with identical configs share an
    /// id and can share cached artifacts.
    pub fn config_id(&self) -> ConfigId {
        let json = serde_json::to_string(self).expect("EngineConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
