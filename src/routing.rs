// 6.1 routing.rs: where live swap quotes come from. one trait, two implementations picked at startup.
// FallbackRouter = nothing configured, every request says so and the estimator uses its rate table.
// PoolRouter = constant product pools from config, direct or one intermediate hop.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::token::{Token, TokenError};

/// A swap the router is asked to price.
#[derive(Debug, Clone)]
pub struct RouteRequest<'a> {
    pub token_in: &'a Token,
    pub token_out: &'a Token,
    /// Input truncated to the input token's precision.
    pub amount_in: Decimal,
    pub raw_amount_in: u128,
}

impl<'a> RouteRequest<'a> {
    pub fn new(token_in: &'a Token, token_out: &'a Token, amount_in: Decimal) -> Result<Self, TokenError> {
        let raw_amount_in = token_in.to_base_units(amount_in)?;
        let amount_in = token_in.from_base_units(raw_amount_in)?;
        Ok(Self {
            token_in,
            token_out,
            amount_in,
            raw_amount_in,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub provider: String,
    /// Token symbols visited, input first.
    pub path: Vec<String>,
    pub amount_out: Decimal,
}

/// Why a router could not produce a route. Only the first two mean "try the fallback".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("No routing backend configured")]
    NotConfigured,

    #[error("Routing backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("No route found from {token_in} to {token_out}")]
    NoRoute { token_in: String, token_out: String },
}

impl RouteError {
    pub fn allows_fallback(&self) -> bool {
        matches!(self, RouteError::NotConfigured | RouteError::Unavailable { .. })
    }
}

pub trait RouteProvider: Send + Sync {
    fn name(&self) -> &str;

    fn route(&self, request: &RouteRequest<'_>) -> Result<Route, RouteError>;
}

impl std::fmt::Debug for dyn RouteProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RouteProvider({})", self.name())
    }
}

/// Null router for when no backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackRouter;

impl RouteProvider for FallbackRouter {
    fn name(&self) -> &str {
        "fallback"
    }

    fn route(&self, _request: &RouteRequest<'_>) -> Result<Route, RouteError> {
        Err(RouteError::NotConfigured)
    }
}

// Configuration for one x*y=k pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub token_a: String,
    pub token_b: String,
    pub reserve_a: Decimal,
    pub reserve_b: Decimal,
    // Fee tier in basis points, taken from the input
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_fee_bps() -> u32 {
    30
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct Pool {
    config: PoolConfig,
}

impl Pool {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    pub fn is_active(&self) -> bool {
        self.config.active
    }

    pub fn has(&self, symbol: &str) -> bool {
        self.config.token_a == symbol || self.config.token_b == symbol
    }

    /// The token on the other side of the pool from `symbol`.
    pub fn other(&self, symbol: &str) -> Option<&str> {
        if self.config.token_a == symbol {
            Some(&self.config.token_b)
        } else if self.config.token_b == symbol {
            Some(&self.config.token_a)
        } else {
            None
        }
    }

    // (reserve_in, reserve_out) when swapping token_in for the other side
    fn reserves(&self, token_in: &str) -> Option<(Decimal, Decimal)> {
        if self.config.token_a == token_in {
            Some((self.config.reserve_a, self.config.reserve_b))
        } else if self.config.token_b == token_in {
            Some((self.config.reserve_b, self.config.reserve_a))
        } else {
            None
        }
    }

    /// Exact-in output: `reserve_out * net / (reserve_in + net)` with the fee taken from the input.
    /// `None` for an empty reserve or when the math leaves Decimal's range.
    pub fn amount_out(&self, token_in: &str, amount_in: Decimal) -> Option<Decimal> {
        let (reserve_in, reserve_out) = self.reserves(token_in)?;
        if reserve_in <= Decimal::ZERO || reserve_out <= Decimal::ZERO {
            return None;
        }
        let fee = amount_in
            .checked_mul(Decimal::from(self.config.fee_bps))?
            .checked_div(Decimal::from(10_000))?;
        let net = amount_in.checked_sub(fee)?;
        reserve_out.checked_mul(net)?.checked_div(reserve_in.checked_add(net)?)
    }
}

/// Routes through configured pools, picking the path with the largest output.
#[derive(Debug, Clone, Default)]
pub struct PoolRouter {
    pools: Vec<Pool>,
}

impl PoolRouter {
    pub fn new(pools: impl IntoIterator<Item = PoolConfig>) -> Self {
        Self {
            pools: pools.into_iter().map(Pool::new).collect(),
        }
    }

    // every direct or single-intermediate path, as lists of pool indices
    fn candidate_paths(&self, token_in: &str, token_out: &str) -> Vec<Vec<usize>> {
        let mut paths = Vec::new();

        for (i, first) in self.pools.iter().enumerate() {
            let Some(mid) = first.other(token_in) else {
                continue;
            };
            if mid == token_out {
                paths.push(vec![i]);
                continue;
            }
            for (j, second) in self.pools.iter().enumerate() {
                if j != i && second.has(mid) && second.other(mid) == Some(token_out) {
                    paths.push(vec![i, j]);
                }
            }
        }

        paths
    }

    fn walk(&self, path: &[usize], token_in: &str, amount_in: Decimal) -> Option<(Vec<String>, Decimal)> {
        let mut symbol = token_in.to_string();
        let mut amount = amount_in;
        let mut visited = vec![symbol.clone()];

        for &idx in path {
            let pool = &self.pools[idx];
            amount = pool.amount_out(&symbol, amount)?;
            symbol = pool.other(&symbol)?.to_string();
            visited.push(symbol.clone());
        }

        Some((visited, amount))
    }
}

impl RouteProvider for PoolRouter {
    fn name(&self) -> &str {
        "pools"
    }

    fn route(&self, request: &RouteRequest<'_>) -> Result<Route, RouteError> {
        let token_in = request.token_in.symbol;
        let token_out = request.token_out.symbol;

        let paths = self.candidate_paths(token_in, token_out);
        if paths.is_empty() {
            return Err(RouteError::NoRoute {
                token_in: token_in.to_string(),
                token_out: token_out.to_string(),
            });
        }

        let live: Vec<_> = paths
            .iter()
            .filter(|p| p.iter().all(|&idx| self.pools[idx].is_active()))
            .collect();
        if live.is_empty() {
            return Err(RouteError::Unavailable {
                reason: format!("every pool between {token_in} and {token_out} is inactive"),
            });
        }

        // reserves are validated positive, so a failed walk means the amount overflowed
        let best = live
            .into_iter()
            .filter_map(|p| self.walk(p, token_in, request.amount_in))
            .max_by(|a, b| a.1.cmp(&b.1))
            .ok_or_else(|| RouteError::Unavailable {
                reason: format!("amount {} overflows every pool between {token_in} and {token_out}", request.amount_in),
            })?;

        let (path, amount_out) = best;
        let amount_out = amount_out.round_dp_with_strategy(
            request.token_out.decimals,
            rust_decimal::RoundingStrategy::ToZero,
        );
        debug!(?path, %amount_out, "pool route selected");

        Ok(Route {
            provider: self.name().to_string(),
            path,
            amount_out,
        })
    }
}

/// How the quote estimator finds live routes. Chosen once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    #[default]
    Fallback,
    Pools,
}

impl std::str::FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(RoutingMode::Fallback),
            "pools" => Ok(RoutingMode::Pools),
            other => Err(format!("unknown routing mode '{other}', expected fallback or pools")),
        }
    }
}

pub fn build_router(mode: RoutingMode, pools: &[PoolConfig]) -> Box<dyn RouteProvider> {
    match mode {
        RoutingMode::Fallback => Box::new(FallbackRouter),
        RoutingMode::Pools => Box::new(PoolRouter::new(pools.iter().cloned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::token;
    use rust_decimal_macros::dec;

    fn pool(a: &str, b: &str, ra: Decimal, rb: Decimal) -> PoolConfig {
        PoolConfig {
            token_a: a.to_string(),
            token_b: b.to_string(),
            reserve_a: ra,
            reserve_b: rb,
            fee_bps: 0,
            active: true,
        }
    }

    fn request<'a>(from: &str, to: &str, amount: Decimal) -> RouteRequest<'a> {
        RouteRequest::new(token(from).unwrap(), token(to).unwrap(), amount).unwrap()
    }

    #[test]
    fn fallback_router_is_not_configured() {
        let err = FallbackRouter.route(&request("USDC", "ETH", dec!(100))).unwrap_err();
        assert_eq!(err, RouteError::NotConfigured);
        assert!(err.allows_fallback());
    }

    #[test]
    fn no_route_does_not_allow_fallback() {
        let err = RouteError::NoRoute {
            token_in: "A".into(),
            token_out: "B".into(),
        };
        assert!(!err.allows_fallback());
        assert!(RouteError::Unavailable { reason: "down".into() }.allows_fallback());
    }

    #[test]
    fn constant_product_output() {
        let p = Pool::new(pool("USDC", "ETH", dec!(1_000_000), dec!(400)));
        // 400 * 1000 / (1_000_000 + 1000)
        let out = p.amount_out("USDC", dec!(1000)).unwrap();
        assert_eq!(out.round_dp(10), (dec!(400_000) / dec!(1_001_000)).round_dp(10));
        assert!(p.amount_out("DAI", dec!(1)).is_none());
    }

    #[test]
    fn fee_reduces_output() {
        let mut cfg = pool("USDC", "USDT", dec!(1_000_000), dec!(1_000_000));
        let free = Pool::new(cfg.clone()).amount_out("USDC", dec!(100)).unwrap();
        cfg.fee_bps = 30;
        let charged = Pool::new(cfg).amount_out("USDC", dec!(100)).unwrap();
        assert!(charged < free);
    }

    #[test]
    fn overflowing_amount_is_unavailable() {
        let cfg = pool("USDC", "USDT", dec!(10_000_000), dec!(10_000_000));
        assert!(Pool::new(cfg.clone()).amount_out("USDC", dec!(10_000_000_000_000_000_000_000)).is_none());

        let router = PoolRouter::new([cfg]);
        let err = router
            .route(&request("USDC", "USDT", dec!(10_000_000_000_000_000_000_000)))
            .unwrap_err();
        assert!(matches!(err, RouteError::Unavailable { .. }));
        assert!(err.allows_fallback());
    }

    #[test]
    fn direct_route() {
        let router = PoolRouter::new([pool("USDC", "ETH", dec!(1_000_000), dec!(400))]);
        let route = router.route(&request("ETH", "USDC", dec!(1))).unwrap();
        assert_eq!(route.path, vec!["ETH".to_string(), "USDC".to_string()]);
        assert!(route.amount_out > dec!(2490) && route.amount_out < dec!(2500));
        assert_eq!(route.provider, "pools");
    }

    #[test]
    fn two_hop_route() {
        let router = PoolRouter::new([
            pool("DAI", "USDC", dec!(1_000_000), dec!(1_000_000)),
            pool("USDC", "ETH", dec!(1_000_000), dec!(400)),
        ]);
        let route = router.route(&request("DAI", "ETH", dec!(100))).unwrap();
        assert_eq!(route.path, vec!["DAI", "USDC", "ETH"]);
        assert!(route.amount_out > Decimal::ZERO);
    }

    #[test]
    fn picks_best_path() {
        let router = PoolRouter::new([
            pool("USDC", "ETH", dec!(1_000_000), dec!(300)), // worse direct
            pool("USDC", "DAI", dec!(1_000_000), dec!(1_000_000)),
            pool("DAI", "ETH", dec!(1_000_000), dec!(500)),
        ]);
        let route = router.route(&request("USDC", "ETH", dec!(100))).unwrap();
        assert_eq!(route.path, vec!["USDC", "DAI", "ETH"]);
    }

    #[test]
    fn missing_pair_is_no_route() {
        let router = PoolRouter::new([pool("USDC", "ETH", dec!(1_000_000), dec!(400))]);
        let err = router.route(&request("WBTC", "DAI", dec!(1))).unwrap_err();
        assert!(matches!(err, RouteError::NoRoute { .. }));
    }

    #[test]
    fn inactive_pools_are_unavailable() {
        let mut cfg = pool("USDC", "ETH", dec!(1_000_000), dec!(400));
        cfg.active = false;
        let router = PoolRouter::new([cfg]);
        let err = router.route(&request("USDC", "ETH", dec!(1))).unwrap_err();
        assert!(matches!(err, RouteError::Unavailable { .. }));
    }

    #[test]
    fn request_truncates_to_token_precision() {
        let req = request("USDC", "ETH", dec!(1.23456789));
        assert_eq!(req.raw_amount_in, 1_234_567);
        assert_eq!(req.amount_in, dec!(1.234567));
    }

    #[test]
    fn build_router_by_mode() {
        assert_eq!(build_router(RoutingMode::Fallback, &[]).name(), "fallback");
        assert_eq!(build_router(RoutingMode::Pools, &[]).name(), "pools");
        assert_eq!("POOLS".parse::<RoutingMode>().unwrap(), RoutingMode::Pools);
        assert!("sdk".parse::<RoutingMode>().is_err());
    }
}
