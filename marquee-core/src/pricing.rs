use rust_decimal::{Decimal, RoundingStrategy};

/// Currency precision used for every stored amount
pub const CURRENCY_SCALE: u32 = 2;

/// Round a monetary amount to cents, half away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Price of one seat at a showtime: base price times the showtime multiplier.
pub fn seat_price(base_price: Decimal, multiplier: Decimal) -> Decimal {
    round_currency(base_price * multiplier)
}

/// Sum of already-rounded seat prices.
///
/// Each element must be a locked-in per-seat price; the total is never
/// re-rounded, so it always equals what the seat rows add up to.
pub fn booking_total<I>(seat_prices: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    seat_prices
        .into_iter()
        .fold(Decimal::ZERO, |acc, price| acc + price)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(units: i64, scale: u32) -> Decimal {
        Decimal::new(units, scale)
    }

    #[test]
    fn test_peak_multiplier_pricing() {
        // $14.00 and $18.00 at 1.20
        let a = seat_price(dec(1400, 2), dec(120, 2));
        let b = seat_price(dec(1800, 2), dec(120, 2));

        assert_eq!(a, dec(1680, 2));
        assert_eq!(b, dec(2160, 2));
        assert_eq!(booking_total([a, b]), dec(3840, 2));
    }

    #[test]
    fn test_midpoint_rounds_up() {
        // 10.05 * 1.5 = 15.075
        assert_eq!(seat_price(dec(1005, 2), dec(150, 2)), dec(1508, 2));
        // 0.03 * 1.5 = 0.045
        assert_eq!(seat_price(dec(3, 2), dec(150, 2)), dec(5, 2));
    }

    #[test]
    fn test_total_is_sum_of_rounded_prices() {
        let price = seat_price(dec(3, 2), dec(150, 2));
        let total = booking_total([price, price]);

        // Summing first and rounding once would give 0.09
        assert_eq!(total, dec(10, 2));
        assert_ne!(total, round_currency(dec(3, 2) * dec(150, 2) * Decimal::TWO));
    }

    #[test]
    fn test_empty_total_is_zero() {
        assert_eq!(booking_total(Vec::new()), Decimal::ZERO);
    }
}
