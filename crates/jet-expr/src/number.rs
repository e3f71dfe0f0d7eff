//! Decimal and floating-point helpers shared by the value model and the
//! operator kernel.
//!
//! Decimal division is performed at scale 28 with half-even rounding; the
//! same rounding mode backs `Round`, `CCur` and the long conversions. The
//! rendering helpers reproduce the reference engine's string forms so that
//! values concatenated into text match stored data byte for byte.

use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::{BigInt, Sign};
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{EvalError, Result};

/// Scale used for decimal quotients (and the largest scale a NUMERIC
/// column can carry).
pub(crate) const MAX_NUMERIC_SCALE: i64 = 28;

/// Convert to the minimal scale >= 0: trailing zeros stripped, negative
/// scales expanded away. Zero always normalizes to plain `0` (stripping
/// alone does not reduce `0.000`).
pub(crate) fn normalize(bd: BigDecimal) -> BigDecimal {
    if bd.fractional_digit_count() == 0 {
        return bd;
    }
    if bd.is_zero() {
        return BigDecimal::zero();
    }
    let stripped = bd.normalized();
    if stripped.fractional_digit_count() < 0 {
        stripped.with_scale(0)
    } else {
        stripped
    }
}

/// Decimal quotient at scale 28, rounded half-even.
pub(crate) fn divide(num: &BigDecimal, denom: &BigDecimal) -> Result<BigDecimal> {
    if denom.is_zero() {
        return Err(EvalError::Arithmetic("division by zero".into()));
    }
    let (n, n_scale) = num.as_bigint_and_exponent();
    let (d, d_scale) = denom.as_bigint_and_exponent();

    // quotient * 10^28 = n * 10^(28 - n_scale + d_scale) / d
    let shift = MAX_NUMERIC_SCALE - n_scale + d_scale;
    let (numerator, denominator) = if shift >= 0 {
        (n * pow10(shift as u64), d)
    } else {
        (n, d * pow10(shift.unsigned_abs()))
    };

    Ok(BigDecimal::new(
        div_round_half_even(&numerator, &denominator),
        MAX_NUMERIC_SCALE,
    ))
}

fn pow10(exp: u64) -> BigInt {
    BigInt::from(10).pow(exp as u32)
}

/// Signed integer division rounded half-to-even.
fn div_round_half_even(a: &BigInt, b: &BigInt) -> BigInt {
    let negative = (a.sign() == Sign::Minus) != (b.sign() == Sign::Minus);
    let a_abs = a.abs();
    let b_abs = b.abs();
    let mut quotient = &a_abs / &b_abs;
    let remainder = &a_abs % &b_abs;

    let twice = &remainder * 2;
    if twice > b_abs || (twice == b_abs && &quotient % 2 != BigInt::zero()) {
        quotient += 1;
    }
    if negative {
        -quotient
    } else {
        quotient
    }
}

/// Round a decimal to an `i32`, half-even, failing on overflow.
pub(crate) fn to_long(bd: &BigDecimal) -> Result<i32> {
    let rounded = bd.with_scale_round(0, RoundingMode::HalfEven);
    rounded
        .to_i32()
        .ok_or_else(|| EvalError::Arithmetic(format!("value '{bd}' out of range for long")))
}

/// Convert a double through its shortest decimal rendering, so `0.1`
/// becomes the decimal `0.1` rather than the exact binary expansion.
pub(crate) fn f64_to_big_decimal(value: f64) -> Result<BigDecimal> {
    if !value.is_finite() {
        return Err(EvalError::Arithmetic(format!(
            "value '{value}' cannot be converted to decimal"
        )));
    }
    format!("{value}")
        .parse()
        .map_err(|_| EvalError::Arithmetic(format!("value '{value}' cannot be converted to decimal")))
}

/// Parse a string as a decimal the way the engine's string coercion does.
pub(crate) fn parse_big_decimal(text: &str) -> Result<BigDecimal> {
    text.trim()
        .parse()
        .map_err(|_| EvalError::Type(format!("invalid number '{text}'")))
}

/// Render a double in the engine's "General Number" shape: up to 15
/// significant digits, plain notation in the everyday range, scientific
/// notation (`E+nn`/`E-nn`) outside it.
pub(crate) fn format_double(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    // 15 significant digits: 1 leading + 14 fractional in scientific form.
    let sci = format!("{value:.14e}");
    let (mantissa, exp) = sci
        .split_once('e')
        .unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = digits.trim_end_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };

    let body = if (-4..15).contains(&exp) {
        render_plain(digits, exp)
    } else {
        render_scientific(digits, exp)
    };
    if negative {
        format!("-{body}")
    } else {
        body
    }
}

fn render_plain(digits: &str, exp: i32) -> String {
    if exp >= 0 {
        let int_len = exp as usize + 1;
        if digits.len() <= int_len {
            let mut s = digits.to_string();
            s.extend(std::iter::repeat('0').take(int_len - digits.len()));
            s
        } else {
            format!("{}.{}", &digits[..int_len], &digits[int_len..])
        }
    } else {
        let zeros: String = std::iter::repeat('0').take((-exp - 1) as usize).collect();
        format!("0.{zeros}{digits}")
    }
}

fn render_scientific(digits: &str, exp: i32) -> String {
    let mantissa = if digits.len() > 1 {
        format!("{}.{}", &digits[..1], &digits[1..])
    } else {
        digits.to_string()
    };
    if exp < 0 {
        format!("{mantissa}E-{:02}", -exp)
    } else {
        format!("{mantissa}E+{exp:02}")
    }
}

/// Render a decimal with the reference engine's `toString` rules: plain
/// notation unless the scale is negative or the adjusted exponent drops
/// below -6, scientific notation otherwise.
pub(crate) fn format_big_decimal(bd: &BigDecimal) -> String {
    let (unscaled, scale) = bd.as_bigint_and_exponent();
    let negative = unscaled.sign() == Sign::Minus;
    let digits = unscaled.abs().to_string();
    let adjusted = digits.len() as i64 - 1 - scale;

    let body = if scale >= 0 && adjusted >= -6 {
        if scale == 0 {
            digits
        } else if adjusted >= 0 {
            let split = digits.len() - scale as usize;
            format!("{}.{}", &digits[..split], &digits[split..])
        } else {
            let zeros: String = std::iter::repeat('0')
                .take((-adjusted - 1) as usize)
                .collect();
            format!("0.{zeros}{digits}")
        }
    } else {
        let mantissa = if digits.len() > 1 {
            format!("{}.{}", &digits[..1], &digits[1..])
        } else {
            digits
        };
        if adjusted < 0 {
            format!("{mantissa}E{adjusted}")
        } else {
            format!("{mantissa}E+{adjusted}")
        }
    };
    if negative {
        format!("-{body}")
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn bd(text: &str) -> BigDecimal {
        BigDecimal::from_str(text).unwrap()
    }

    #[test]
    fn normalize_strips_trailing_zeros() {
        assert_eq!(normalize(bd("1.2000")), bd("1.2"));
        assert_eq!(normalize(bd("5000")), bd("5000"));
        assert_eq!(
            normalize(bd("0.000")).as_bigint_and_exponent(),
            (BigInt::from(0), 0)
        );
    }

    #[test]
    fn normalize_expands_negative_scales() {
        let five_e3 = BigDecimal::new(BigInt::from(5), -3);
        assert_eq!(normalize(five_e3).as_bigint_and_exponent().1, 0);
    }

    #[test]
    fn normalize_is_idempotent() {
        for text in ["1.2000", "0.000", "42", "-7.50", "123.456"] {
            let once = normalize(bd(text));
            let twice = normalize(once.clone());
            assert_eq!(
                once.as_bigint_and_exponent(),
                twice.as_bigint_and_exponent()
            );
        }
    }

    #[test]
    fn divide_uses_scale_28_half_even() {
        let q = divide(&bd("1"), &bd("0.03")).unwrap();
        assert_eq!(format_big_decimal(&q), "33.3333333333333333333333333333");
        assert_eq!(q.fractional_digit_count(), 28);
    }

    #[test]
    fn divide_rounds_half_to_even() {
        // Quotients that land exactly on half of the last kept digit.
        let two_e28 = bd("20000000000000000000000000000");
        let up = divide(&bd("3"), &two_e28).unwrap(); // 1.5E-28 -> 2E-28
        assert_eq!(up.as_bigint_and_exponent(), (BigInt::from(2), 28));
        let down = divide(&bd("1"), &two_e28).unwrap(); // 0.5E-28 -> 0
        assert_eq!(down.as_bigint_and_exponent(), (BigInt::from(0), 28));

        let q = divide(&bd("1"), &bd("3")).unwrap();
        assert_eq!(format_big_decimal(&q), "0.3333333333333333333333333333");
    }

    #[test]
    fn divide_by_zero_is_arithmetic() {
        assert!(matches!(
            divide(&bd("1"), &bd("0")),
            Err(EvalError::Arithmetic(_))
        ));
    }

    #[test]
    fn half_even_integer_rounding() {
        assert_eq!(to_long(&bd("2.5")).unwrap(), 2);
        assert_eq!(to_long(&bd("3.5")).unwrap(), 4);
        assert_eq!(to_long(&bd("-2.5")).unwrap(), -2);
        assert!(to_long(&bd("3000000000")).is_err());
    }

    #[test]
    fn doubles_render_like_the_engine() {
        assert_eq!(format_double(0.0), "0");
        assert_eq!(format_double(1000000.0 / 52.0), "19230.7692307692");
        assert_eq!(format_double(-1.0 / 52.0), "-0.0192307692307692");
        assert_eq!(format_double(1.27413e-10), "1.27413E-10");
        assert_eq!(format_double(1e15), "1E+15");
        assert_eq!(format_double(0.0001), "0.0001");
        assert_eq!(format_double(42.0), "42");
    }

    #[test]
    fn decimals_render_like_the_engine() {
        assert_eq!(format_big_decimal(&bd("83333.3333")), "83333.3333");
        assert_eq!(
            format_big_decimal(&BigDecimal::new(BigInt::from(0), 8)),
            "0E-8"
        );
        assert_eq!(
            format_big_decimal(&BigDecimal::new(
                BigInt::from_str("2787019289824216980830").unwrap(),
                28
            )),
            "2.787019289824216980830E-7"
        );
        assert_eq!(format_big_decimal(&bd("-0.5")), "-0.5");
        assert_eq!(
            format_big_decimal(&BigDecimal::new(BigInt::from(5), -3)),
            "5E+3"
        );
    }

    #[test]
    fn f64_conversion_goes_through_shortest_rendering() {
        assert_eq!(f64_to_big_decimal(0.1).unwrap(), bd("0.1"));
        assert_eq!(f64_to_big_decimal(2.5).unwrap(), bd("2.5"));
        assert!(f64_to_big_decimal(f64::NAN).is_err());
    }
}
