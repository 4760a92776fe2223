// dex-core: trading core for a spot + perps DEX front end.
// two independent calculators: position risk math and swap quoting.
// all computation is deterministic. the only I/O is the optional file ledger.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Side, Price, Quote, Leverage, PositionId
//   2.x  asset.rs: perps asset table, leverage caps, funding rates
//   3.x  risk.rs: liquidation price, unrealized pnl, position validation
//   4.x  position.rs: position struct, open-form preview, position book, tp/sl
//   5.x  token.rs: spot token table, usd reference prices, base units
//   6.x  quote.rs: quote estimator, fallback rates, price impact, swap form
//   6.1  routing.rs: route provider seam, pool router, null router
//   7.x  config.rs: toml + env config, presets, validation
//   8.x  balance.rs: metered request ledger (memory or json file)
//   9.x  telemetry.rs: tracing subscriber setup

// core calculators
pub mod asset;
pub mod position;
pub mod quote;
pub mod risk;
pub mod token;
pub mod types;

// integration modules
pub mod balance;
pub mod config;
pub mod routing;
pub mod telemetry;

// re exports for convenience
pub use position::*;
pub use quote::*;
pub use risk::*;
pub use types::*;
pub use asset::{Asset, ASSETS};
pub use balance::{BalanceError, BalanceStore, FileBalanceStore, MemoryBalanceStore, Receipt, RequestMeter};
pub use config::{Config, ConfigError};
pub use routing::{FallbackRouter, PoolConfig, PoolRouter, Route, RouteError, RouteProvider, RouteRequest, RoutingMode};
pub use token::{Token, TokenError, TOKENS};
