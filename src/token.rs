// 5.0 token.rs: spot tokens. static table, reference usd prices, base unit conversion.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

pub type ChainId = u64;

pub const ETHEREUM_MAINNET: ChainId = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub symbol: &'static str,
    pub address: &'static str,
    pub decimals: u32,
    pub chain: ChainId,
    pub usd_price: Decimal,
}

impl Token {
    /// Whole-token amount to integer base units, rounded down.
    pub fn to_base_units(&self, amount: Decimal) -> Result<u128, TokenError> {
        if amount < Decimal::ZERO {
            return Err(TokenError::NegativeAmount(amount));
        }
        let scale = Decimal::from(10u64.pow(self.decimals));
        amount
            .checked_mul(scale)
            .and_then(|raw| raw.floor().to_u128())
            .ok_or(TokenError::Overflow {
                amount,
                decimals: self.decimals,
            })
    }

    /// Integer base units back to a whole-token amount.
    pub fn from_base_units(&self, raw: u128) -> Result<Decimal, TokenError> {
        let raw = i128::try_from(raw).map_err(|_| TokenError::RawOverflow(raw))?;
        Decimal::try_from_i128_with_scale(raw, self.decimals).map_err(|_| TokenError::RawOverflow(raw as u128))
    }
}

pub static TOKENS: [Token; 5] = [
    Token {
        symbol: "ETH",
        address: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
        decimals: 18,
        chain: ETHEREUM_MAINNET,
        usd_price: dec!(2500),
    },
    Token {
        symbol: "USDC",
        address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
        decimals: 6,
        chain: ETHEREUM_MAINNET,
        usd_price: dec!(1),
    },
    Token {
        symbol: "USDT",
        address: "0xdAC17F958D2ee523a2206206994597C13D831ec7",
        decimals: 6,
        chain: ETHEREUM_MAINNET,
        usd_price: dec!(1),
    },
    Token {
        symbol: "DAI",
        address: "0x6B175474E89094C44Da98b954EedeAC495271d0F",
        decimals: 18,
        chain: ETHEREUM_MAINNET,
        usd_price: dec!(0.98),
    },
    Token {
        symbol: "WBTC",
        address: "0x2260FAC5E5542a773Aa44fBCfeDd86c15aF1ba47",
        decimals: 8,
        chain: ETHEREUM_MAINNET,
        usd_price: dec!(42000),
    },
];

pub fn token(symbol: &str) -> Option<&'static Token> {
    TOKENS.iter().find(|t| t.symbol == symbol)
}

/// Reference USD price, zero for unknown tokens.
pub fn usd_price(symbol: &str) -> Decimal {
    token(symbol).map(|t| t.usd_price).unwrap_or(Decimal::ZERO)
}

/// Units of `token_out` per unit of `token_in` implied by reference prices.
/// Zero when either price is unknown.
pub fn spot_rate(token_in: &str, token_out: &str) -> Decimal {
    let price_in = usd_price(token_in);
    let price_out = usd_price(token_out);
    if price_in.is_zero() || price_out.is_zero() {
        return Decimal::ZERO;
    }
    price_in / price_out
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Amount {0} is negative")]
    NegativeAmount(Decimal),

    #[error("Amount {amount} overflows at {decimals} decimals")]
    Overflow { amount: Decimal, decimals: u32 },

    #[error("Raw amount {0} is out of range")]
    RawOverflow(u128),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        assert_eq!(token("USDC").unwrap().decimals, 6);
        assert_eq!(token("WBTC").unwrap().decimals, 8);
        assert!(token("usdc").is_none());
    }

    #[test]
    fn base_units_round_down() {
        let usdc = token("USDC").unwrap();
        assert_eq!(usdc.to_base_units(dec!(1.5)).unwrap(), 1_500_000);
        assert_eq!(usdc.to_base_units(dec!(0.0000019)).unwrap(), 1);

        let eth = token("ETH").unwrap();
        assert_eq!(eth.to_base_units(dec!(2)).unwrap(), 2_000_000_000_000_000_000);
        assert!(matches!(eth.to_base_units(dec!(-1)), Err(TokenError::NegativeAmount(_))));
    }

    #[test]
    fn base_units_back_to_amount() {
        let wbtc = token("WBTC").unwrap();
        assert_eq!(wbtc.from_base_units(25_000_000).unwrap(), dec!(0.25));
    }

    #[test]
    fn spot_rates() {
        assert_eq!(spot_rate("ETH", "USDC"), dec!(2500));
        assert_eq!(spot_rate("USDC", "ETH"), dec!(0.0004));
        assert_eq!(spot_rate("USDC", "DOGE"), Decimal::ZERO);
        assert_eq!(usd_price("DAI"), dec!(0.98));
    }
}
