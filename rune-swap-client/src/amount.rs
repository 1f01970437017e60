//! Exact-decimal conversions between display amounts and base units
//!
//! Base-unit amounts can exceed the safe integer range of an `f64`, so
//! every conversion here runs on `BigDecimal` and truncates toward zero.
//! All functions are pure and perform no I/O.
use std::str::FromStr;

use bigdecimal::{
    num_bigint::BigInt, BigDecimal, FromPrimitive, RoundingMode, Zero,
};

use crate::error::{SwapClientError, SwapClientResult};

/// The error message for an amount that does not parse as a decimal
const ERR_UNPARSABLE_AMOUNT: &str = "amount does not parse as a decimal number";
/// The error message for a negative amount
const ERR_NEGATIVE_AMOUNT: &str = "amount must be non-negative";
/// The error message for base units that are not an integer
const ERR_NON_INTEGER_BASE_UNITS: &str = "base units must be a non-negative integer";
/// The error message for a fraction outside [0, 1]
const ERR_FRACTION_RANGE: &str = "fraction must be within [0, 1]";

/// 10^decimals as a `BigDecimal`
fn pow10(decimals: u8) -> BigDecimal {
    BigInt::from(10).pow(decimals as u32).into()
}

/// Parse a sanitized display amount into a non-negative `BigDecimal`
fn parse_display_amount(display: &str) -> SwapClientResult<BigDecimal> {
    let canonical = sanitize_localized_number(display);
    let value = BigDecimal::from_str(&canonical)
        .map_err(|_| SwapClientError::invalid_amount(ERR_UNPARSABLE_AMOUNT))?;

    if value < BigDecimal::zero() {
        return Err(SwapClientError::invalid_amount(ERR_NEGATIVE_AMOUNT));
    }

    Ok(value)
}

/// Convert a display-form amount into a base-unit integer amount
///
/// Multiplies by 10^decimals and truncates toward zero; an amount below
/// the asset's granularity becomes `"0"`, never rounds up.
pub fn to_base_units(display: &str, decimals: u8) -> SwapClientResult<String> {
    let value = parse_display_amount(display)?;
    let scaled = value * pow10(decimals);
    let truncated = scaled.with_scale_round(0, RoundingMode::Down);

    let (base_units, _scale) = truncated.into_bigint_and_scale();
    Ok(base_units.to_string())
}

/// Convert a base-unit integer amount into a display-form amount
pub fn to_display_units(base_units: &str, decimals: u8) -> SwapClientResult<BigDecimal> {
    let units = BigInt::from_str(base_units.trim())
        .map_err(|_| SwapClientError::invalid_amount(ERR_NON_INTEGER_BASE_UNITS))?;

    // `BigDecimal::new` is an exact division by 10^decimals
    Ok(BigDecimal::new(units, decimals as i64))
}

/// Take a fraction of a base-unit balance, floored to the asset's own
/// decimal granularity, returned as display text
///
/// Used for the 25% / 50% / 100%-of-balance shortcuts. The returned
/// display amount never round-trips to more base units than the source
/// balance held.
pub fn percentage_of_base_units(
    base_units: &str,
    decimals: u8,
    fraction: f64,
) -> SwapClientResult<String> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(SwapClientError::invalid_amount(ERR_FRACTION_RANGE));
    }
    let fraction = BigDecimal::from_f64(fraction)
        .ok_or_else(|| SwapClientError::invalid_amount(ERR_FRACTION_RANGE))?;

    let units = BigInt::from_str(base_units.trim())
        .map_err(|_| SwapClientError::invalid_amount(ERR_NON_INTEGER_BASE_UNITS))?;

    // Floor at base-unit granularity before converting back to display form
    let scaled = BigDecimal::from(units) * fraction;
    let floored = scaled.with_scale_round(0, RoundingMode::Down);
    let (floored_units, _scale) = floored.into_bigint_and_scale();

    let display = BigDecimal::new(floored_units, decimals as i64);
    Ok(display.normalized().to_string())
}

/// Normalize a locale-formatted number into canonical `1234.56` form
///
/// Grouping separators (spaces, apostrophes, and whichever of `.`/`,` is
/// not the decimal separator) are stripped; the decimal separator becomes
/// `.`. When both separators appear, the rightmost one is the decimal
/// separator. A lone comma followed by exactly three digits is treated as
/// a thousands separator, otherwise as a decimal separator.
pub fn sanitize_localized_number(text: &str) -> String {
    let compact: String =
        text.trim().chars().filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}' | '\'')).collect();

    let last_dot = compact.rfind('.');
    let last_comma = compact.rfind(',');

    match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            let (decimal_sep, group_sep) = if dot > comma { ('.', ',') } else { (',', '.') };
            compact
                .chars()
                .filter(|c| *c != group_sep)
                .map(|c| if c == decimal_sep { '.' } else { c })
                .collect()
        },
        (None, Some(comma)) => {
            let comma_count = compact.matches(',').count();
            let trailing_digits = compact.len() - comma - 1;
            if comma_count > 1 || trailing_digits == 3 {
                // Thousands grouping, e.g. "1,500" or "1,234,567"
                compact.chars().filter(|c| *c != ',').collect()
            } else {
                // Decimal separator, e.g. "1,5"
                compact.replace(',', ".")
            }
        },
        (Some(_), None) => {
            if compact.matches('.').count() > 1 {
                // Dotted thousands grouping, e.g. "1.234.567"
                compact.chars().filter(|c| *c != '.').collect()
            } else {
                compact
            }
        },
        (None, None) => compact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test the conversions called out in the swap flow: 1.5 at 8
    /// decimals, and truncation below the asset's granularity
    #[test]
    fn test_base_unit_scenarios() {
        assert_eq!(to_base_units("1.5", 8).unwrap(), "150000000");
        assert_eq!(to_base_units("0.000000001", 8).unwrap(), "0");
        assert_eq!(to_base_units("0", 8).unwrap(), "0");
    }

    /// Test that invalid and negative amounts are rejected
    #[test]
    fn test_invalid_amounts_rejected() {
        assert!(matches!(to_base_units("abc", 8), Err(SwapClientError::InvalidAmount(_))));
        assert!(matches!(to_base_units("-1.5", 8), Err(SwapClientError::InvalidAmount(_))));
        assert!(matches!(to_base_units("", 8), Err(SwapClientError::InvalidAmount(_))));
    }

    /// Test that display -> base -> display round-trips without drift at
    /// 18 decimals
    #[test]
    fn test_round_trip_without_drift() {
        let display = "1.123456789012345678";
        let base = to_base_units(display, 18).unwrap();
        assert_eq!(base, "1123456789012345678");

        let recovered = to_display_units(&base, 18).unwrap();
        assert_eq!(recovered, BigDecimal::from_str(display).unwrap());
    }

    /// Test that a percentage of a balance never exceeds the balance in
    /// base units after round-tripping
    #[test]
    fn test_percentage_floors_to_granularity() {
        // A third of 1000 base units at 2 decimals floors to 333
        let display = percentage_of_base_units("1000", 2, 1.0 / 3.0).unwrap();
        assert_eq!(display, "3.33");
        assert_eq!(to_base_units(&display, 2).unwrap(), "333");

        // 100% is the identity
        let all = percentage_of_base_units("150000000", 8, 1.0).unwrap();
        assert_eq!(to_base_units(&all, 8).unwrap(), "150000000");
    }

    /// Test locale normalization of thousands and decimal separators
    #[test]
    fn test_sanitize_localized_numbers() {
        assert_eq!(sanitize_localized_number("1,234.56"), "1234.56");
        assert_eq!(sanitize_localized_number("1.234,56"), "1234.56");
        assert_eq!(sanitize_localized_number("1 234,56"), "1234.56");
        assert_eq!(sanitize_localized_number("1'234.56"), "1234.56");
        assert_eq!(sanitize_localized_number("1,5"), "1.5");
        assert_eq!(sanitize_localized_number("1,500"), "1500");
        assert_eq!(sanitize_localized_number("1.234.567"), "1234567");
        assert_eq!(sanitize_localized_number("42"), "42");
    }
}
