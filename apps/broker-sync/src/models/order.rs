//! Order specification and lifecycle types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl OrderSide {
    /// Sign applied to fill quantities when reporting to the algorithm
    /// (buy positive, sell negative).
    #[must_use]
    pub const fn sign(&self) -> Decimal {
        match self {
            Self::Buy => Decimal::ONE,
            Self::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Order kind (market, limit, and the conditional variants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    /// Market order - execute at best available price.
    Market,
    /// Limit order - execute at specified price or better.
    Limit,
    /// Stop-market order - becomes a market order when the stop price trades.
    StopMarket,
    /// Stop-limit order - becomes a limit order when the stop price trades.
    StopLimit,
}

impl OrderKind {
    /// Conditional kinds only execute after a trigger condition fires and may
    /// acquire a second, execution-order remote id.
    #[must_use]
    pub const fn is_conditional(&self) -> bool {
        matches!(self, Self::StopMarket | Self::StopLimit)
    }

    /// Whether a limit price is required.
    #[must_use]
    pub const fn requires_limit_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit)
    }

    /// Whether a stop price is required.
    #[must_use]
    pub const fn requires_stop_price(&self) -> bool {
        matches!(self, Self::StopMarket | Self::StopLimit)
    }
}

/// Canonical order status.
///
/// Mutated only by the engine's state machine and only forward through the
/// lifecycle graph; terminal states have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order created locally, placement not yet acknowledged.
    New,
    /// Placement acknowledged by the broker.
    Submitted,
    /// Conditional order's trigger condition fired, no fill yet.
    Triggered,
    /// Some fills applied, cumulative quantity short of the order quantity.
    PartiallyFilled,
    /// Cumulative fill quantity equals the order quantity.
    Filled,
    /// Canceled at the broker before completing.
    Canceled,
    /// Rejected by the broker.
    Invalid,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Invalid)
    }

    /// Returns true if the order is still in flight.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::New => "NEW",
            Self::Submitted => "SUBMITTED",
            Self::Triggered => "TRIGGERED",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::Invalid => "INVALID",
        };
        write!(f, "{name}")
    }
}

/// Errors from order spec validation.
#[derive(Debug, Error)]
pub enum OrderSpecError {
    /// Instrument identifier is empty.
    #[error("Instrument must not be empty")]
    EmptyInstrument,

    /// Quantity is zero or negative.
    #[error("Quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    /// Limit price missing or non-positive for a kind that requires one.
    #[error("Limit price required and positive for {kind:?} orders")]
    InvalidLimitPrice {
        /// The offending order kind.
        kind: OrderKind,
    },

    /// Stop price missing or non-positive for a kind that requires one.
    #[error("Stop price required and positive for {kind:?} orders")]
    InvalidStopPrice {
        /// The offending order kind.
        kind: OrderKind,
    },
}

/// Immutable order specification.
///
/// Fixed at creation; only the owning record's `triggered` flag changes for
/// conditional kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Instrument identifier.
    pub instrument: String,
    /// Order side.
    pub side: OrderSide,
    /// Order kind.
    pub kind: OrderKind,
    /// Requested quantity (unsigned magnitude).
    pub quantity: Decimal,
    /// Limit price (Limit and StopLimit kinds).
    pub limit_price: Option<Decimal>,
    /// Stop/trigger price (StopMarket and StopLimit kinds).
    pub stop_price: Option<Decimal>,
}

impl OrderSpec {
    /// Validate instrument-specific preconditions.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or out of range.
    pub fn validate(&self) -> Result<(), OrderSpecError> {
        if self.instrument.trim().is_empty() {
            return Err(OrderSpecError::EmptyInstrument);
        }

        if self.quantity <= Decimal::ZERO {
            return Err(OrderSpecError::NonPositiveQuantity(self.quantity));
        }

        if self.kind.requires_limit_price()
            && !self.limit_price.is_some_and(|p| p > Decimal::ZERO)
        {
            return Err(OrderSpecError::InvalidLimitPrice { kind: self.kind });
        }

        if self.kind.requires_stop_price() && !self.stop_price.is_some_and(|p| p > Decimal::ZERO) {
            return Err(OrderSpecError::InvalidStopPrice { kind: self.kind });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limit_spec() -> OrderSpec {
        OrderSpec {
            instrument: "BTC-PERPETUAL".to_string(),
            side: OrderSide::Buy,
            kind: OrderKind::Limit,
            quantity: dec!(10),
            limit_price: Some(dec!(50000)),
            stop_price: None,
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Invalid.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
        assert!(!OrderStatus::Triggered.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }

    #[test]
    fn conditional_kinds() {
        assert!(OrderKind::StopMarket.is_conditional());
        assert!(OrderKind::StopLimit.is_conditional());
        assert!(!OrderKind::Market.is_conditional());
        assert!(!OrderKind::Limit.is_conditional());
    }

    #[test]
    fn side_sign() {
        assert_eq!(OrderSide::Buy.sign(), Decimal::ONE);
        assert_eq!(OrderSide::Sell.sign(), Decimal::NEGATIVE_ONE);
    }

    #[test]
    fn valid_limit_spec() {
        assert!(limit_spec().validate().is_ok());
    }

    #[test]
    fn limit_spec_requires_price() {
        let mut spec = limit_spec();
        spec.limit_price = None;
        assert!(matches!(
            spec.validate(),
            Err(OrderSpecError::InvalidLimitPrice { .. })
        ));
    }

    #[test]
    fn stop_limit_requires_both_prices() {
        let mut spec = limit_spec();
        spec.kind = OrderKind::StopLimit;
        assert!(matches!(
            spec.validate(),
            Err(OrderSpecError::InvalidStopPrice { .. })
        ));

        spec.stop_price = Some(dec!(49000));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn zero_quantity_rejected() {
        let mut spec = limit_spec();
        spec.quantity = Decimal::ZERO;
        assert!(matches!(
            spec.validate(),
            Err(OrderSpecError::NonPositiveQuantity(_))
        ));
    }

    #[test]
    fn empty_instrument_rejected() {
        let mut spec = limit_spec();
        spec.instrument = "  ".to_string();
        assert!(matches!(
            spec.validate(),
            Err(OrderSpecError::EmptyInstrument)
        ));
    }

    #[test]
    fn negative_stop_price_rejected() {
        let mut spec = limit_spec();
        spec.kind = OrderKind::StopMarket;
        spec.limit_price = None;
        spec.stop_price = Some(dec!(-1));
        assert!(matches!(
            spec.validate(),
            Err(OrderSpecError::InvalidStopPrice { .. })
        ));
    }
}
