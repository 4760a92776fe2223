// 7.0 config.rs: all settings in one place. quoting, routing, metering, logging.
// 7.1 loaded from toml, then DEX_* env vars win over the file.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::balance::{
    BalanceError, BalanceStore, FileBalanceStore, MemoryBalanceStore, RequestMeter, DEFAULT_INITIAL_BALANCE,
    DEFAULT_REQUEST_COST,
};
use crate::quote::{FallbackRates, QuoteEstimator, DEFAULT_MIN_SWAP_AMOUNT};
use crate::routing::{build_router, PoolConfig, RoutingMode};
use crate::token::token;
use crate::types::Quote;

pub const DEFAULT_CONFIG_PATH: &str = "dex.toml";

pub const ENV_LOG_LEVEL: &str = "DEX_LOG_LEVEL";
pub const ENV_ROUTING_MODE: &str = "DEX_ROUTING_MODE";
pub const ENV_LEDGER_PATH: &str = "DEX_LEDGER_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub quote: QuoteConfig,
    pub routing: RoutingConfig,
    pub metering: MeteringConfig,
    pub telemetry: TelemetryConfig,
}

// 7.2: swap quoting. fallback_rates replaces the built-in table when non-empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    pub min_swap_amount: Decimal,
    pub fallback_rates: Vec<RateEntry>,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            min_swap_amount: DEFAULT_MIN_SWAP_AMOUNT,
            fallback_rates: Vec::new(),
        }
    }
}

// One directed pair of the fallback table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub token_in: String,
    pub token_out: String,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub mode: RoutingMode,
    pub pools: Vec<PoolConfig>,
}

// 7.3: request metering. no ledger_path means balances live in memory only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteringConfig {
    pub initial_balance: Decimal,
    pub request_cost: Decimal,
    pub ledger_path: Option<PathBuf>,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            initial_balance: DEFAULT_INITIAL_BALANCE,
            request_cost: DEFAULT_REQUEST_COST,
            ledger_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Applies DEX_* overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    // split out so tests don't have to touch the real environment
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.telemetry.log_level = level;
        }
        if let Some(mode) = lookup(ENV_ROUTING_MODE) {
            self.routing.mode = mode.parse().map_err(|reason| ConfigError::InvalidRouting { reason })?;
        }
        if let Some(path) = lookup(ENV_LEDGER_PATH) {
            self.metering.ledger_path = Some(PathBuf::from(path)).filter(|p| !p.as_os_str().is_empty());
        }
        Ok(())
    }

    // Preset with a small pool graph, so quotes route instead of falling back
    pub fn demo_pools() -> Self {
        let mut config = Self::default();
        config.routing.mode = RoutingMode::Pools;
        config.routing.pools = vec![
            pool("USDC", "ETH", dec!(5_000_000), dec!(2000), 30),
            pool("USDC", "USDT", dec!(10_000_000), dec!(10_000_000), 1), // 0.01% stable tier
            pool("DAI", "USDC", dec!(4_000_000), dec!(3_920_000), 5),
            pool("WBTC", "ETH", dec!(100), dec!(1680), 30),
        ];
        config
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        // quote checks
        if self.quote.min_swap_amount < Decimal::ZERO {
            return Err(ConfigError::InvalidQuote {
                reason: "min_swap_amount must not be negative".to_string(),
            });
        }
        if let Some(entry) = self.quote.fallback_rates.iter().find(|e| e.rate <= Decimal::ZERO) {
            return Err(ConfigError::InvalidQuote {
                reason: format!("fallback rate {}-{} must be positive", entry.token_in, entry.token_out),
            });
        }

        // routing checks
        for p in &self.routing.pools {
            if p.token_a == p.token_b {
                return Err(ConfigError::InvalidRouting {
                    reason: format!("pool {}-{} pairs a token with itself", p.token_a, p.token_b),
                });
            }
            if token(&p.token_a).is_none() || token(&p.token_b).is_none() {
                return Err(ConfigError::InvalidRouting {
                    reason: format!("pool {}-{} uses an unknown token", p.token_a, p.token_b),
                });
            }
            if p.reserve_a <= Decimal::ZERO || p.reserve_b <= Decimal::ZERO {
                return Err(ConfigError::InvalidRouting {
                    reason: format!("pool {}-{} needs positive reserves", p.token_a, p.token_b),
                });
            }
            if p.fee_bps >= 10_000 {
                return Err(ConfigError::InvalidRouting {
                    reason: format!("pool {}-{} fee of {} bps takes the whole input", p.token_a, p.token_b, p.fee_bps),
                });
            }
        }
        if self.routing.mode == RoutingMode::Pools && self.routing.pools.is_empty() {
            return Err(ConfigError::InvalidRouting {
                reason: "pools mode needs at least one pool".to_string(),
            });
        }

        // metering checks
        if self.metering.initial_balance < Decimal::ZERO || self.metering.request_cost <= Decimal::ZERO {
            return Err(ConfigError::InvalidMetering {
                reason: "initial_balance must be >= 0 and request_cost > 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn fallback_rates(&self) -> FallbackRates {
        if self.quote.fallback_rates.is_empty() {
            return FallbackRates::default();
        }
        FallbackRates::from_entries(
            self.quote
                .fallback_rates
                .iter()
                .map(|e| (e.token_in.clone(), e.token_out.clone(), e.rate)),
        )
    }

    pub fn estimator(&self) -> QuoteEstimator {
        QuoteEstimator::new(build_router(self.routing.mode, &self.routing.pools), self.fallback_rates())
    }

    pub fn meter(&self) -> Result<RequestMeter, BalanceError> {
        let initial = Quote::new(self.metering.initial_balance);
        let store: Arc<dyn BalanceStore> = match &self.metering.ledger_path {
            Some(path) => Arc::new(FileBalanceStore::open(path, initial)?),
            None => Arc::new(MemoryBalanceStore::new(initial)),
        };
        Ok(RequestMeter::new(store, Quote::new(self.metering.request_cost)))
    }
}

fn pool(a: &str, b: &str, reserve_a: Decimal, reserve_b: Decimal, fee_bps: u32) -> PoolConfig {
    PoolConfig {
        token_a: a.to_string(),
        token_b: b.to_string(),
        reserve_a,
        reserve_b,
        fee_bps,
        active: true,
    }
}

// Configuration loading and validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("Invalid config file: {0}")]
    Parse(String),

    #[error("Invalid quote settings: {reason}")]
    InvalidQuote { reason: String },

    #[error("Invalid routing settings: {reason}")]
    InvalidRouting { reason: String },

    #[error("Invalid metering settings: {reason}")]
    InvalidMetering { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::demo_pools().validate().is_ok());
    }

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            [quote]
            min_swap_amount = "0.05"
            fallback_rates = [
                { token_in = "USDC", token_out = "ETH", rate = "0.0004" },
            ]

            [routing]
            mode = "pools"

            [[routing.pools]]
            token_a = "USDC"
            token_b = "ETH"
            reserve_a = "1000000"
            reserve_b = "400"

            [metering]
            request_cost = "0.25"

            [telemetry]
            log_level = "debug"
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.quote.min_swap_amount, dec!(0.05));
        assert_eq!(config.routing.mode, RoutingMode::Pools);
        assert_eq!(config.routing.pools[0].fee_bps, 30);
        assert!(config.routing.pools[0].active);
        assert_eq!(config.metering.initial_balance, dec!(1000));
        assert_eq!(config.metering.request_cost, dec!(0.25));
        assert_eq!(config.telemetry.log_level, "debug");
        assert!(config.validate().is_ok());

        let rates = config.fallback_rates();
        assert_eq!(rates.rate("USDC", "ETH"), dec!(0.0004));
        // replaced table, not merged
        assert_eq!(rates.rate("ETH", "USDC"), Decimal::ONE);
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(Config::from_toml("[quote"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            Config::load("/definitely/not/here/dex.toml"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_LOG_LEVEL, "warn"),
            (ENV_ROUTING_MODE, "Pools"),
            (ENV_LEDGER_PATH, "/tmp/ledger.json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.telemetry.log_level, "warn");
        assert_eq!(config.routing.mode, RoutingMode::Pools);
        assert_eq!(config.metering.ledger_path, Some(PathBuf::from("/tmp/ledger.json")));
    }

    #[test]
    fn test_bad_env_mode() {
        let mut config = Config::default();
        let result = config.apply_overrides(|k| (k == ENV_ROUTING_MODE).then(|| "uniswap".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidRouting { .. })));
    }

    #[test]
    fn test_invalid_pools() {
        let mut config = Config::demo_pools();
        config.routing.pools[0].reserve_a = Decimal::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRouting { .. })));

        let mut config = Config::demo_pools();
        config.routing.pools[1].token_b = "DOGE".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRouting { .. })));

        let mut config = Config::default();
        config.routing.mode = RoutingMode::Pools;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRouting { .. })));
    }

    #[test]
    fn test_invalid_metering() {
        let mut config = Config::default();
        config.metering.request_cost = Decimal::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidMetering { .. })));
    }

    #[test]
    fn test_estimator_follows_mode() {
        assert_eq!(Config::default().estimator().router_name(), "fallback");
        assert_eq!(Config::demo_pools().estimator().router_name(), "pools");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::demo_pools();
        let text = toml::to_string(&config).unwrap();
        let back = Config::from_toml(&text).unwrap();
        assert_eq!(back, config);
    }
}
