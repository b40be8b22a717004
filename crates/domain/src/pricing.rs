//! Line and order total arithmetic.

use common::{AppError, AppResult, ErrorCode, Money};
use serde::{Deserialize, Serialize};

/// Flat sales tax applied to every order subtotal.
pub const TAX_RATE_PERCENT: i64 = 19;

fn out_of_range(what: &str) -> AppError {
    AppError::service(
        ErrorCode::ValidationInvalidInput,
        format!("{what} exceeds the largest representable amount"),
    )
}

/// Line total: `unit_price × quantity − discount`, never below zero.
pub fn line_total(unit_price: Money, quantity: i32, discount: Money) -> AppResult<Money> {
    unit_price
        .checked_multiply(i64::from(quantity))
        .and_then(|gross| gross.checked_sub(discount))
        .map(Money::floor_zero)
        .ok_or_else(|| out_of_range("line total"))
}

/// Tax owed on a subtotal, rounded to the cent.
pub fn tax_for(subtotal: Money) -> AppResult<Money> {
    subtotal
        .checked_percent(TAX_RATE_PERCENT)
        .ok_or_else(|| out_of_range("tax"))
}

/// Monetary breakdown of an order, fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax_amount: Money,
    pub shipping_cost: Money,
    pub discount: Money,
    pub total_amount: Money,
}

impl OrderTotals {
    /// Computes totals from line totals. Tax is levied on the subtotal only.
    pub fn compute(
        line_totals: impl IntoIterator<Item = Money>,
        shipping_cost: Money,
        discount: Money,
    ) -> AppResult<Self> {
        let subtotal = Money::checked_sum(line_totals).ok_or_else(|| out_of_range("subtotal"))?;
        let tax_amount = tax_for(subtotal)?;
        let total_amount = subtotal
            .checked_add(tax_amount)
            .and_then(|t| t.checked_add(shipping_cost))
            .and_then(|t| t.checked_sub(discount))
            .ok_or_else(|| out_of_range("order total"))?;
        Ok(Self {
            subtotal,
            tax_amount,
            shipping_cost,
            discount,
            total_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total() {
        assert_eq!(
            line_total(Money::from_cents(1000), 3, Money::from_cents(500)).unwrap(),
            Money::from_cents(2500)
        );
    }

    #[test]
    fn test_line_total_floors_at_zero() {
        assert_eq!(
            line_total(Money::from_cents(1000), 1, Money::from_cents(5000)).unwrap(),
            Money::zero()
        );
    }

    #[test]
    fn test_tax_rounds_half_up() {
        assert_eq!(tax_for(Money::from_cents(150)).unwrap(), Money::from_cents(29));
        assert_eq!(tax_for(Money::from_cents(100)).unwrap(), Money::from_cents(19));
    }

    #[test]
    fn test_overflowing_amounts_are_rejected() {
        let err = line_total(Money::from_cents(i64::MAX / 2), 3, Money::zero()).unwrap_err();
        assert!(err.is(ErrorCode::ValidationInvalidInput));

        let max_price = Money::from_units(10_000_000);

        // The line fits, the 19% tax on it does not.
        let line = line_total(max_price, 500_000_000, Money::zero()).unwrap();
        let err = OrderTotals::compute([line], Money::zero(), Money::zero()).unwrap_err();
        assert!(err.is(ErrorCode::ValidationInvalidInput));

        let err = OrderTotals::compute([Money::from_cents(i64::MAX); 2], Money::zero(), Money::zero())
            .unwrap_err();
        assert!(err.is(ErrorCode::ValidationInvalidInput));
    }

    #[test]
    fn test_order_totals() {
        let totals = OrderTotals::compute(
            [Money::from_units(100_000), Money::from_units(50_000)],
            Money::zero(),
            Money::zero(),
        )
        .unwrap();
        assert_eq!(totals.subtotal, Money::from_units(150_000));
        assert_eq!(totals.tax_amount, Money::from_units(28_500));
        assert_eq!(totals.total_amount, Money::from_units(178_500));
    }

    #[test]
    fn test_order_totals_with_shipping_and_discount() {
        let totals = OrderTotals::compute(
            [Money::from_cents(10_000)],
            Money::from_cents(1_500),
            Money::from_cents(500),
        )
        .unwrap();
        assert_eq!(totals.tax_amount, Money::from_cents(1_900));
        assert_eq!(
            totals.total_amount,
            totals.subtotal + totals.tax_amount + totals.shipping_cost - totals.discount
        );
        assert_eq!(totals.total_amount, Money::from_cents(12_900));
    }
}
