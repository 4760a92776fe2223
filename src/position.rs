// 4.0: open leveraged positions. value object + the book that replaces the UI's position list.
// 4.1 preview is what the open form shows before anything is validated.
// 4.2 exit triggers (tp/sl/liquidation) at the bottom of the impl.

use crate::asset::{asset, funding_rate};
use crate::risk::{self, position_size, validate_position, PositionError};
use crate::types::{Leverage, Price, PositionId, Quote, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub asset: String,
    pub side: Side,
    pub collateral: Quote,
    pub leverage: Leverage,
    pub entry_price: Price,
    /// Always `collateral * leverage`.
    pub size: Quote,
    pub take_profit: Option<Price>,
    pub stop_loss: Option<Price>,
    pub opened_at: Timestamp,
}

impl Position {
    pub fn liquidation_price(&self) -> Decimal {
        risk::liquidation_price(self.entry_price, self.leverage, self.side)
    }

    pub fn unrealized_pnl(&self, mark_price: Price) -> Quote {
        risk::unrealized_pnl(self.entry_price, mark_price, self.size, self.side)
    }

    /// Collateral plus PnL at `mark_price`.
    pub fn equity(&self, mark_price: Price) -> Quote {
        self.collateral.add(self.unrealized_pnl(mark_price))
    }

    /// Funding owed for one period at the asset's rate.
    pub fn funding_per_period(&self) -> Quote {
        self.size.mul(funding_rate(&self.asset))
    }

    // 4.2: liquidation wins over tp/sl when several are crossed at once
    pub fn exit_trigger(&self, mark_price: Price) -> Option<ExitTrigger> {
        let mark = mark_price.value();
        let liq = self.liquidation_price();

        let crossed = |level: Decimal, favourable: bool| match (self.side, favourable) {
            (Side::Long, true) | (Side::Short, false) => mark >= level,
            (Side::Long, false) | (Side::Short, true) => mark <= level,
        };

        if crossed(liq, false) {
            return Some(ExitTrigger::Liquidation);
        }
        if self.stop_loss.is_some_and(|sl| crossed(sl.value(), false)) {
            return Some(ExitTrigger::StopLoss);
        }
        if self.take_profit.is_some_and(|tp| crossed(tp.value(), true)) {
            return Some(ExitTrigger::TakeProfit);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTrigger {
    TakeProfit,
    StopLoss,
    Liquidation,
}

/// What the user asked for. Unvalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub asset: String,
    pub side: Side,
    pub collateral: Quote,
    pub leverage: u32,
    #[serde(default)]
    pub take_profit: Option<Price>,
    #[serde(default)]
    pub stop_loss: Option<Price>,
}

impl OpenRequest {
    pub fn new(asset: impl Into<String>, side: Side, collateral: Decimal, leverage: u32) -> Self {
        Self {
            asset: asset.into(),
            side,
            collateral: Quote::new(collateral),
            leverage,
            take_profit: None,
            stop_loss: None,
        }
    }

    pub fn with_take_profit(mut self, price: Price) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_stop_loss(mut self, price: Price) -> Self {
        self.stop_loss = Some(price);
        self
    }
}

// 4.1: size and liquidation shown while the form is being filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionPreview {
    pub size: Quote,
    pub liquidation_price: Decimal,
}

/// Preview against the asset's reference price. Zeros when collateral is
/// missing or not positive, or the asset is unknown.
pub fn preview(symbol: &str, side: Side, collateral: Option<Decimal>, leverage: Leverage) -> PositionPreview {
    let zero = PositionPreview {
        size: Quote::zero(),
        liquidation_price: Decimal::ZERO,
    };

    let (Some(collateral), Some(asset)) = (collateral, asset(symbol)) else {
        return zero;
    };
    if collateral <= Decimal::ZERO {
        return zero;
    }

    PositionPreview {
        size: position_size(Quote::new(collateral), leverage),
        liquidation_price: risk::liquidation_price(asset.reference_price(), leverage, side),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_price: Price,
    pub realized_pnl: Quote,
    /// Collateral plus realized PnL, floored at zero.
    pub returned: Quote,
}

/// Open positions for one wallet, keyed by a local sequential id.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: BTreeMap<PositionId, Position>,
    next_id: u64,
}

impl PositionBook {
    pub fn new() -> Self {
        Self {
            positions: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Opens at the asset's reference price.
    pub fn open(&mut self, request: OpenRequest, timestamp: Timestamp) -> Result<&Position, BookError> {
        let entry = asset(&request.asset)
            .map(|a| a.reference_price())
            .ok_or_else(|| PositionError::UnsupportedAsset(request.asset.clone()))?;
        self.open_at(request, entry, timestamp)
    }

    /// Opens at a caller supplied entry price, e.g. a fill confirmed by the venue.
    pub fn open_at(
        &mut self,
        request: OpenRequest,
        entry_price: Price,
        timestamp: Timestamp,
    ) -> Result<&Position, BookError> {
        let validated = validate_position(&request.asset, request.collateral, request.leverage)?;

        let id = PositionId(self.next_id.max(1));
        self.next_id = id.0 + 1;

        let position = Position {
            id,
            asset: validated.asset.symbol.to_string(),
            side: request.side,
            collateral: validated.collateral,
            leverage: validated.leverage,
            entry_price,
            size: validated.size(),
            take_profit: request.take_profit,
            stop_loss: request.stop_loss,
            opened_at: timestamp,
        };

        info!(
            %id,
            asset = %position.asset,
            side = %position.side,
            size = %position.size,
            entry = %entry_price,
            "position opened"
        );

        Ok(self.positions.entry(id).or_insert(position))
    }

    pub fn close(&mut self, id: PositionId, exit_price: Price) -> Result<ClosedPosition, BookError> {
        let position = self.positions.remove(&id).ok_or(BookError::NotFound(id))?;
        let realized_pnl = position.unrealized_pnl(exit_price);
        let returned = position.collateral.add(realized_pnl).max(Quote::zero());

        info!(%id, exit = %exit_price, pnl = %realized_pnl, "position closed");

        Ok(ClosedPosition {
            position,
            exit_price,
            realized_pnl,
            returned,
        })
    }

    /// Replaces both take-profit and stop-loss. `None` clears the level.
    pub fn update_orders(
        &mut self,
        id: PositionId,
        take_profit: Option<Price>,
        stop_loss: Option<Price>,
    ) -> Result<&Position, BookError> {
        let position = self.positions.get_mut(&id).ok_or(BookError::NotFound(id))?;
        position.take_profit = take_profit;
        position.stop_loss = stop_loss;
        Ok(position)
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions whose exit levels are crossed by `mark_price` for `symbol`.
    pub fn triggered(&self, symbol: &str, mark_price: Price) -> Vec<(PositionId, ExitTrigger)> {
        self.positions
            .values()
            .filter(|p| p.asset == symbol)
            .filter_map(|p| p.exit_trigger(mark_price).map(|t| (p.id, t)))
            .collect()
    }

    pub fn total_unrealized_pnl(&self, symbol: &str, mark_price: Price) -> Quote {
        self.positions
            .values()
            .filter(|p| p.asset == symbol)
            .map(|p| p.unrealized_pnl(mark_price))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookError {
    #[error(transparent)]
    Invalid(#[from] PositionError),

    #[error("Position {0} not found")]
    NotFound(PositionId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn price(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    fn eth_long_10x() -> OpenRequest {
        OpenRequest::new("ETH", Side::Long, dec!(100), 10)
    }

    #[test]
    fn open_uses_reference_price_and_sizes() {
        let mut book = PositionBook::new();
        let pos = book.open(eth_long_10x(), Timestamp::from_millis(0)).unwrap();

        assert_eq!(pos.id, PositionId(1));
        assert_eq!(pos.entry_price.value(), dec!(2500));
        assert_eq!(pos.size.value(), dec!(1000));
        assert_eq!(pos.liquidation_price(), dec!(2250));
    }

    #[test]
    fn open_rejects_invalid_inputs() {
        let mut book = PositionBook::new();
        let result = book.open(OpenRequest::new("ETH", Side::Long, dec!(5), 10), Timestamp::from_millis(0));
        assert!(matches!(result, Err(BookError::Invalid(PositionError::CollateralTooLow { .. }))));

        let result = book.open(OpenRequest::new("XRP", Side::Long, dec!(50), 2), Timestamp::from_millis(0));
        assert!(matches!(result, Err(BookError::Invalid(PositionError::UnsupportedAsset(_)))));
        assert!(book.is_empty());
    }

    #[test]
    fn ids_are_sequential() {
        let mut book = PositionBook::new();
        let a = book.open(eth_long_10x(), Timestamp::from_millis(0)).unwrap().id;
        let b = book.open(eth_long_10x(), Timestamp::from_millis(1)).unwrap().id;
        assert_eq!(a, PositionId(1));
        assert_eq!(b, PositionId(2));
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn default_book_starts_at_one() {
        let mut book = PositionBook::default();
        let id = book.open(eth_long_10x(), Timestamp::from_millis(0)).unwrap().id;
        assert_eq!(id, PositionId(1));
    }

    #[test]
    fn close_realizes_pnl_and_removes() {
        let mut book = PositionBook::new();
        let id = book.open(eth_long_10x(), Timestamp::from_millis(0)).unwrap().id;

        let closed = book.close(id, price(dec!(2750))).unwrap();
        assert_eq!(closed.realized_pnl.value(), dec!(100));
        assert_eq!(closed.returned.value(), dec!(200));
        assert!(book.get(id).is_none());

        assert_eq!(book.close(id, price(dec!(2750))), Err(BookError::NotFound(id)));
    }

    #[test]
    fn close_past_liquidation_returns_nothing() {
        let mut book = PositionBook::new();
        let id = book.open(eth_long_10x(), Timestamp::from_millis(0)).unwrap().id;

        let closed = book.close(id, price(dec!(2000))).unwrap();
        assert_eq!(closed.realized_pnl.value(), dec!(-200));
        assert_eq!(closed.returned, Quote::zero());
    }

    #[test]
    fn update_orders_replaces_levels() {
        let mut book = PositionBook::new();
        let request = eth_long_10x().with_take_profit(price(dec!(3000)));
        let id = book.open(request, Timestamp::from_millis(0)).unwrap().id;

        let pos = book.update_orders(id, None, Some(price(dec!(2400)))).unwrap();
        assert_eq!(pos.take_profit, None);
        assert_eq!(pos.stop_loss, Some(price(dec!(2400))));

        assert!(book.update_orders(PositionId(99), None, None).is_err());
    }

    #[test]
    fn long_exit_triggers() {
        let mut book = PositionBook::new();
        let request = eth_long_10x()
            .with_take_profit(price(dec!(3000)))
            .with_stop_loss(price(dec!(2400)));
        let pos = book.open(request, Timestamp::from_millis(0)).unwrap().clone();

        assert_eq!(pos.exit_trigger(price(dec!(2600))), None);
        assert_eq!(pos.exit_trigger(price(dec!(3000))), Some(ExitTrigger::TakeProfit));
        assert_eq!(pos.exit_trigger(price(dec!(2400))), Some(ExitTrigger::StopLoss));
        assert_eq!(pos.exit_trigger(price(dec!(2200))), Some(ExitTrigger::Liquidation));
    }

    #[test]
    fn short_exit_triggers() {
        let mut book = PositionBook::new();
        let request = OpenRequest::new("ETH", Side::Short, dec!(100), 10)
            .with_take_profit(price(dec!(2000)))
            .with_stop_loss(price(dec!(2600)));
        let pos = book.open(request, Timestamp::from_millis(0)).unwrap().clone();

        assert_eq!(pos.exit_trigger(price(dec!(2500))), None);
        assert_eq!(pos.exit_trigger(price(dec!(1999))), Some(ExitTrigger::TakeProfit));
        assert_eq!(pos.exit_trigger(price(dec!(2600))), Some(ExitTrigger::StopLoss));
        assert_eq!(pos.exit_trigger(price(dec!(2750))), Some(ExitTrigger::Liquidation));
    }

    #[test]
    fn triggered_filters_by_asset() {
        let mut book = PositionBook::new();
        book.open(eth_long_10x(), Timestamp::from_millis(0)).unwrap();
        book.open(OpenRequest::new("SOL", Side::Long, dec!(20), 20), Timestamp::from_millis(0)).unwrap();

        let hits = book.triggered("ETH", price(dec!(2100)));
        assert_eq!(hits, vec![(PositionId(1), ExitTrigger::Liquidation)]);
    }

    #[test]
    fn pnl_totals_per_asset() {
        let mut book = PositionBook::new();
        book.open(eth_long_10x(), Timestamp::from_millis(0)).unwrap();
        book.open(OpenRequest::new("ETH", Side::Short, dec!(50), 10), Timestamp::from_millis(1))
            .unwrap();
        book.open(OpenRequest::new("BTC", Side::Long, dec!(100), 5), Timestamp::from_millis(2))
            .unwrap();

        // +10% move: long 1000 makes 100, short 500 loses 50, btc is ignored
        assert_eq!(book.total_unrealized_pnl("ETH", price(dec!(2750))).value(), dec!(50));
        assert!(book.total_unrealized_pnl("SOL", price(dec!(90))).value().is_zero());
        assert_eq!(book.iter().filter(|p| p.asset == "ETH").count(), 2);
        assert_eq!(book.len(), 3);
    }

    #[test]
    fn funding_and_equity() {
        let mut book = PositionBook::new();
        let pos = book.open(eth_long_10x(), Timestamp::from_millis(0)).unwrap();

        assert_eq!(pos.funding_per_period().value(), dec!(0.1)); // 1000 * 0.0001
        assert_eq!(pos.equity(price(dec!(2625))).value(), dec!(150));
    }

    #[test]
    fn preview_matches_form() {
        let lev = Leverage::new(10).unwrap();
        let p = preview("ETH", Side::Long, Some(dec!(100)), lev);
        assert_eq!(p.size.value(), dec!(1000));
        assert_eq!(p.liquidation_price, dec!(2250));

        let p = preview("ETH", Side::Short, Some(dec!(100)), lev);
        assert_eq!(p.liquidation_price, dec!(2750));

        let empty = preview("ETH", Side::Long, None, lev);
        assert_eq!(empty.size, Quote::zero());
        assert_eq!(empty.liquidation_price, Decimal::ZERO);

        let negative = preview("ETH", Side::Long, Some(dec!(-5)), lev);
        assert_eq!(negative.liquidation_price, Decimal::ZERO);
    }
}
