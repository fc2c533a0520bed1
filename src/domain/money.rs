use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Money is an exact decimal amount in the unit of the owning product's currency.
/// Amounts entered by users carry at most two fractional digits.
pub type Money = Decimal;

/// Number of fractional digits kept for user-facing amounts.
pub const MONEY_SCALE: u32 = 2;

/// Format an amount with two decimals.
/// Example: 50 -> "50.00", -12.5 -> "-12.50"
pub fn format_money(amount: Money) -> String {
    format!("{:.2}", amount.round_dp(MONEY_SCALE))
}

/// Parse a decimal string into money, rejecting more than two fractional digits.
/// Example: "50" -> 50.00, "12.5" -> 12.50, "0.999" -> error
pub fn parse_money(input: &str) -> Result<Money, ParseMoneyError> {
    let amount = Decimal::from_str(input.trim()).map_err(|_| ParseMoneyError::InvalidFormat)?;
    if !has_money_scale(amount) {
        return Err(ParseMoneyError::TooManyDecimals);
    }
    Ok(amount)
}

/// True when the amount has no more than two significant fractional digits.
pub fn has_money_scale(amount: Money) -> bool {
    amount.normalize().scale() <= MONEY_SCALE
}

/// Split `total` into `parts` amounts that sum exactly to `total`.
///
/// Each part is `total / parts` truncated to cents; the leftover cents go to the
/// first part. Returns an empty vector when `parts` is zero.
pub fn split_evenly(total: Money, parts: u32) -> Vec<Money> {
    if parts == 0 {
        return Vec::new();
    }
    let count = Decimal::from(parts);
    let base = (total / count).round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero);
    let remainder = total - base * count;

    let mut amounts = vec![base; parts as usize];
    amounts[0] += remainder;
    amounts
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseMoneyError {
    #[error("invalid money format")]
    InvalidFormat,
    #[error("at most two decimal places allowed")]
    TooManyDecimals,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(dec!(50)), "50.00");
        assert_eq!(format_money(dec!(12.34)), "12.34");
        assert_eq!(format_money(dec!(0.01)), "0.01");
        assert_eq!(format_money(dec!(-50)), "-50.00");
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("50.00"), Ok(dec!(50.00)));
        assert_eq!(parse_money("50"), Ok(dec!(50)));
        assert_eq!(parse_money("12.5"), Ok(dec!(12.5)));
        assert_eq!(parse_money(" -7.25 "), Ok(dec!(-7.25)));
        assert_eq!(parse_money("1.230"), Ok(dec!(1.23)));
    }

    #[test]
    fn test_parse_money_invalid() {
        assert_eq!(parse_money("abc"), Err(ParseMoneyError::InvalidFormat));
        assert_eq!(parse_money("12.34.56"), Err(ParseMoneyError::InvalidFormat));
        assert_eq!(parse_money("0.999"), Err(ParseMoneyError::TooManyDecimals));
    }

    #[test]
    fn test_split_evenly_exact() {
        assert_eq!(split_evenly(dec!(300), 3), vec![dec!(100), dec!(100), dec!(100)]);
    }

    #[test]
    fn test_split_evenly_assigns_remainder_to_first_part() {
        let parts = split_evenly(dec!(100), 3);
        assert_eq!(parts, vec![dec!(33.34), dec!(33.33), dec!(33.33)]);
        assert_eq!(parts.iter().sum::<Decimal>(), dec!(100));

        let parts = split_evenly(dec!(0.05), 4);
        assert_eq!(parts, vec![dec!(0.02), dec!(0.01), dec!(0.01), dec!(0.01)]);
    }

    #[test]
    fn test_split_evenly_zero_parts() {
        assert!(split_evenly(dec!(10), 0).is_empty());
    }
}
