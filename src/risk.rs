//! Leveraged position math.
//!
//! Liquidation price, unrealized PnL and the validation gate that must pass
//! before a position is built. Everything here is a pure function over its
//! arguments.
//!
//! The liquidation model is the simple full-collateral one: a position is
//! wiped out once the price has moved `1/leverage` against it. There is no
//! maintenance margin buffer.

use crate::asset::{asset, Asset};
use crate::types::{Leverage, Price, Quote, Side};
use rust_decimal::Decimal;
use tracing::debug;

/// Price at which the position's losses consume its collateral.
///
/// Long: `entry * (1 - 1/leverage)`. Short: `entry * (1 + 1/leverage)`.
/// A 1x long liquidates at zero.
pub fn liquidation_price(entry_price: Price, leverage: Leverage, side: Side) -> Decimal {
    let imf = leverage.initial_margin_fraction();

    match side {
        Side::Long => entry_price.value() * (Decimal::ONE - imf),
        Side::Short => entry_price.value() * (Decimal::ONE + imf),
    }
}

/// PnL of a position of notional `size` marked at `current_price`.
///
/// `size * (current - entry) / entry`, negated for shorts.
pub fn unrealized_pnl(entry_price: Price, current_price: Price, size: Quote, side: Side) -> Quote {
    let move_fraction = (current_price.value() - entry_price.value()) / entry_price.value();
    Quote::new(size.value() * move_fraction * side.sign())
}

/// Notional size backed by `collateral` at `leverage`.
pub fn position_size(collateral: Quote, leverage: Leverage) -> Quote {
    collateral.mul(leverage.as_decimal())
}

/// Inputs that passed [`validate_position`].
#[derive(Debug, Clone, Copy)]
pub struct ValidatedPosition {
    pub asset: &'static Asset,
    pub collateral: Quote,
    pub leverage: Leverage,
}

impl ValidatedPosition {
    pub fn size(&self) -> Quote {
        position_size(self.collateral, self.leverage)
    }
}

/// Gate every position must pass before size or liquidation is computed.
///
/// Checks run in order: asset symbol, collateral floor, leverage range.
pub fn validate_position(
    symbol: &str,
    collateral: Quote,
    leverage: u32,
) -> Result<ValidatedPosition, PositionError> {
    let asset = asset(symbol).ok_or_else(|| PositionError::UnsupportedAsset(symbol.to_string()))?;

    if collateral.value() < asset.min_collateral {
        return Err(PositionError::CollateralTooLow {
            minimum: asset.min_collateral,
        });
    }

    let leverage = Leverage::new(leverage)
        .filter(|l| asset.allows_leverage(l.value()))
        .ok_or(PositionError::InvalidLeverage {
            asset: asset.symbol,
            max: asset.max_leverage,
        })?;

    debug!(asset = asset.symbol, %collateral, %leverage, "position inputs validated");

    Ok(ValidatedPosition {
        asset,
        collateral,
        leverage,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("Asset {0} not supported")]
    UnsupportedAsset(String),

    #[error("Minimum collateral is {minimum} USDC")]
    CollateralTooLow { minimum: Decimal },

    #[error("Invalid leverage. Max for {asset} is {max}x")]
    InvalidLeverage { asset: &'static str, max: u32 },
}
