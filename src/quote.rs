//! Swap quoting.
//!
//! A quote first asks the configured [`RouteProvider`]. When the router has
//! no backend or the backend is down, or a token has no metadata, the output
//! comes from a static pairwise rate table instead. Every [`SwapQuote`]
//! records which of the two produced it. A router that answers "no route"
//! is believed, and the error goes back to the caller.

use crate::routing::{Route, RouteError, RouteProvider, RouteRequest};
use crate::token::{spot_rate, token};
use crate::types::ValidationResult;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

pub const DEFAULT_MIN_SWAP_AMOUNT: Decimal = dec!(0.01);

/// Decimal places of a fallback estimate.
pub const FALLBACK_PRECISION: u32 = 6;

/// Parses a user-entered amount. Accepts plain and scientific notation.
pub fn parse_amount(amount: &str) -> Result<Decimal, AmountError> {
    let trimmed = amount.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| AmountError::Invalid(amount.to_string()))
}

/// Rejects non-numeric amounts and amounts below `min_amount`.
pub fn validate_amount(amount: &str, min_amount: Decimal) -> Result<Decimal, AmountError> {
    let parsed = parse_amount(amount)?;
    if parsed < min_amount {
        return Err(AmountError::BelowMinimum { minimum: min_amount });
    }
    Ok(parsed)
}

/// Record form of [`validate_amount`] with the default 0.01 minimum.
pub fn check_amount(amount: &str) -> ValidationResult {
    ValidationResult::from(&validate_amount(amount, DEFAULT_MIN_SWAP_AMOUNT))
}

/// Percentage shortfall of `amount_out` against `amount_in * spot_price`.
///
/// Never negative. Zero when the expected output is zero.
pub fn price_impact(amount_in: Decimal, amount_out: Decimal, spot_price: Decimal) -> Decimal {
    let impact = match amount_in.checked_mul(spot_price) {
        Some(expected) if expected.is_zero() => return Decimal::ZERO,
        Some(expected) => expected
            .checked_sub(amount_out)
            .and_then(|shortfall| shortfall.checked_div(expected))
            .and_then(|fraction| fraction.checked_mul(dec!(100))),
        // expected is past Decimal::MAX, compare output per unit of input instead
        None => amount_out
            .checked_div(amount_in)
            .and_then(|per_unit| per_unit.checked_div(spot_price))
            .and_then(|ratio| (Decimal::ONE - ratio).checked_mul(dec!(100))),
    };
    // every overflow above means the output dwarfs the expectation
    impact.unwrap_or(Decimal::ZERO).max(Decimal::ZERO)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Invalid amount")]
    Invalid(String),

    #[error("Minimum swap amount is {minimum}")]
    BelowMinimum { minimum: Decimal },
}

/// Static substitute rates used when no live quote can be had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackRates {
    rates: HashMap<(String, String), Decimal>,
}

impl Default for FallbackRates {
    fn default() -> Self {
        Self::from_entries([
            ("USDC", "ETH", dec!(0.0005)),
            ("ETH", "USDC", dec!(2000)),
            ("USDC", "USDT", dec!(0.99)),
            ("USDC", "DAI", dec!(0.98)),
        ])
    }
}

impl FallbackRates {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, S, Decimal)>,
        S: Into<String>,
    {
        let rates = entries
            .into_iter()
            .map(|(a, b, rate)| ((a.into(), b.into()), rate))
            .collect();
        Self { rates }
    }

    /// Rate for the directed pair, 1 when the pair is unknown.
    pub fn rate(&self, token_in: &str, token_out: &str) -> Decimal {
        self.rates
            .get(&(token_in.to_string(), token_out.to_string()))
            .copied()
            .unwrap_or(Decimal::ONE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    RouterNotConfigured,
    RouterUnavailable,
    MissingTokenMetadata,
    /// Amount does not fit the token's base units.
    AmountOutOfRange,
}

/// Where a quote's output amount came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuoteSource {
    Route { provider: String, path: Vec<String> },
    Fallback { reason: FallbackReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    /// Percent, never negative.
    pub price_impact: Decimal,
    pub source: QuoteSource,
}

impl SwapQuote {
    pub fn is_estimate(&self) -> bool {
        matches!(self.source, QuoteSource::Fallback { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("Amount must be positive")]
    NonPositiveAmount,

    #[error("Amount {amount} is too large to quote")]
    AmountTooLarge { amount: Decimal },

    #[error(transparent)]
    Route(#[from] RouteError),
}

#[derive(Debug)]
pub struct QuoteEstimator {
    router: Box<dyn RouteProvider>,
    fallback: FallbackRates,
}

impl QuoteEstimator {
    pub fn new(router: Box<dyn RouteProvider>, fallback: FallbackRates) -> Self {
        Self { router, fallback }
    }

    pub fn router_name(&self) -> &str {
        self.router.name()
    }

    pub fn quote(&self, token_in: &str, token_out: &str, amount_in: &str) -> Result<SwapQuote, QuoteError> {
        let amount = parse_amount(amount_in)?;
        if amount <= Decimal::ZERO {
            return Err(QuoteError::NonPositiveAmount);
        }

        let (Some(meta_in), Some(meta_out)) = (token(token_in), token(token_out)) else {
            warn!(token_in, token_out, "token metadata missing, using fallback rate");
            return self.fallback_quote(token_in, token_out, amount, FallbackReason::MissingTokenMetadata);
        };

        let request = match RouteRequest::new(meta_in, meta_out, amount) {
            Ok(request) => request,
            Err(e) => {
                warn!(token_in, error = %e, "amount does not fit base units, using fallback rate");
                return self.fallback_quote(token_in, token_out, amount, FallbackReason::AmountOutOfRange);
            }
        };

        match self.router.route(&request) {
            Ok(route) => Ok(self.routed_quote(token_in, token_out, request.amount_in, route)),
            Err(e) if e.allows_fallback() => {
                warn!(router = self.router.name(), error = %e, "router failed, using fallback rate");
                let reason = match e {
                    RouteError::NotConfigured => FallbackReason::RouterNotConfigured,
                    _ => FallbackReason::RouterUnavailable,
                };
                self.fallback_quote(token_in, token_out, amount, reason)
            }
            Err(e) => Err(e.into()),
        }
    }

    // amount is what the router priced, already truncated to the input token's decimals
    fn routed_quote(&self, token_in: &str, token_out: &str, amount: Decimal, route: Route) -> SwapQuote {
        let impact = price_impact(amount, route.amount_out, spot_rate(token_in, token_out));
        debug!(token_in, token_out, %amount, amount_out = %route.amount_out, %impact, "routed quote");

        SwapQuote {
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in: amount,
            amount_out: route.amount_out,
            price_impact: impact,
            source: QuoteSource::Route {
                provider: route.provider,
                path: route.path,
            },
        }
    }

    fn fallback_quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount: Decimal,
        reason: FallbackReason,
    ) -> Result<SwapQuote, QuoteError> {
        let rate = self.fallback.rate(token_in, token_out);
        let mut amount_out = amount
            .checked_mul(rate)
            .ok_or(QuoteError::AmountTooLarge { amount })?
            .round_dp_with_strategy(FALLBACK_PRECISION, RoundingStrategy::MidpointAwayFromZero);
        amount_out.rescale(FALLBACK_PRECISION);

        let impact = price_impact(amount, amount_out, spot_rate(token_in, token_out));
        debug!(token_in, token_out, %amount, %rate, %amount_out, "fallback quote");

        Ok(SwapQuote {
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in: amount,
            amount_out,
            price_impact: impact,
            source: QuoteSource::Fallback { reason },
        })
    }
}

/// The swap form's four fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapForm {
    pub from_token: String,
    pub to_token: String,
    pub from_amount: String,
    pub to_amount: String,
}

impl Default for SwapForm {
    fn default() -> Self {
        Self::new("USDC", "ETH")
    }
}

impl SwapForm {
    pub fn new(from_token: impl Into<String>, to_token: impl Into<String>) -> Self {
        Self {
            from_token: from_token.into(),
            to_token: to_token.into(),
            from_amount: String::new(),
            to_amount: String::new(),
        }
    }

    /// Swaps direction. Pure transposition, nothing is recomputed.
    pub fn flip(&mut self) {
        std::mem::swap(&mut self.from_token, &mut self.to_token);
        std::mem::swap(&mut self.from_amount, &mut self.to_amount);
    }

    /// Sets the input amount and, when it parses, fills in the estimated output.
    pub fn set_from_amount(&mut self, amount: &str, estimator: &QuoteEstimator) -> Result<(), QuoteError> {
        self.from_amount = amount.to_string();
        if parse_amount(amount).is_err() {
            return Ok(());
        }
        let quote = estimator.quote(&self.from_token, &self.to_token, amount)?;
        self.to_amount = quote.amount_out.to_string();
        Ok(())
    }
}
