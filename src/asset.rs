//! Perpetuals asset table.
//!
//! Every tradable asset has a reference price used when no live price is
//! supplied, a leverage cap, a collateral floor, and a funding rate charged
//! per period on position size. The table is static and read-only.

use crate::types::Price;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub symbol: &'static str,
    pub name: &'static str,
    /// Reference price in USDC.
    pub price: Decimal,
    pub max_leverage: u32,
    /// Minimum collateral in USDC.
    pub min_collateral: Decimal,
    /// Funding charged per period as a fraction of position size.
    pub funding_rate: Decimal,
}

impl Asset {
    pub fn reference_price(&self) -> Price {
        Price::new_unchecked(self.price)
    }

    pub fn allows_leverage(&self, leverage: u32) -> bool {
        (1..=self.max_leverage).contains(&leverage)
    }
}

pub const DEFAULT_FUNDING_RATE: Decimal = dec!(0.0001);

pub static ASSETS: [Asset; 4] = [
    Asset {
        symbol: "ETH",
        name: "Ethereum",
        price: dec!(2500),
        max_leverage: 50,
        min_collateral: dec!(10),
        funding_rate: dec!(0.0001),
    },
    Asset {
        symbol: "BTC",
        name: "Bitcoin",
        price: dec!(42000),
        max_leverage: 50,
        min_collateral: dec!(10),
        funding_rate: dec!(0.00008),
    },
    Asset {
        symbol: "SOL",
        name: "Solana",
        price: dec!(85),
        max_leverage: 20,
        min_collateral: dec!(10),
        funding_rate: dec!(0.00012),
    },
    Asset {
        symbol: "ARB",
        name: "Arbitrum",
        price: dec!(1.5),
        max_leverage: 10,
        min_collateral: dec!(10),
        funding_rate: dec!(0.0005),
    },
];

/// Looks up an asset by exact symbol.
pub fn asset(symbol: &str) -> Option<&'static Asset> {
    ASSETS.iter().find(|a| a.symbol == symbol)
}

pub fn funding_rate(symbol: &str) -> Decimal {
    asset(symbol).map(|a| a.funding_rate).unwrap_or(DEFAULT_FUNDING_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_assets() {
        let eth = asset("ETH").unwrap();
        assert_eq!(eth.name, "Ethereum");
        assert_eq!(eth.price, dec!(2500));
        assert_eq!(eth.max_leverage, 50);

        assert_eq!(asset("SOL").unwrap().max_leverage, 20);
        assert_eq!(asset("ARB").unwrap().max_leverage, 10);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(asset("eth").is_none());
        assert!(asset("DOGE").is_none());
    }

    #[test]
    fn leverage_bounds() {
        let arb = asset("ARB").unwrap();
        assert!(!arb.allows_leverage(0));
        assert!(arb.allows_leverage(1));
        assert!(arb.allows_leverage(10));
        assert!(!arb.allows_leverage(11));
    }

    #[test]
    fn funding_rates_default_for_unknown() {
        assert_eq!(funding_rate("BTC"), dec!(0.00008));
        assert_eq!(funding_rate("ARB"), dec!(0.0005));
        assert_eq!(funding_rate("DOGE"), dec!(0.0001));
    }
}
