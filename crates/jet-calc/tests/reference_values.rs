//! Decode/encode checks against values captured from a known-good database
//! file (the calculated-field fixture rows).

use bigdecimal::BigDecimal;
use jet_calc::{wrap_calculated_value, NumericCodec};
use num_bigint::{BigInt, Sign};
use pretty_assertions::assert_eq;

/// Build the wrapped on-disk bytes for a NUMERIC value with a full 16-byte
/// mantissa, applying the storage byte-order transform by hand.
fn reference_bytes(unscaled: &str, scale: u8, negative: bool) -> Vec<u8> {
    let magnitude = BigInt::parse_bytes(unscaled.as_bytes(), 10).unwrap();
    let (_, bytes) = magnitude.to_bytes_be();
    assert!(bytes.len() <= 16);
    let mut mantissa = vec![0u8; 16 - bytes.len()];
    mantissa.extend(bytes);
    // 16 bytes: two 8-byte swap groups.
    mantissa[0..8].reverse();
    mantissa[8..16].reverse();

    let mut payload = vec![18, 0, scale, if negative { 0x80 } else { 0x00 }];
    payload.extend(mantissa);
    wrap_calculated_value(&payload)
}

fn expected(unscaled: &str, scale: i64, negative: bool) -> BigDecimal {
    let magnitude = BigInt::parse_bytes(unscaled.as_bytes(), 10).unwrap();
    let signed = if negative { -magnitude } else { magnitude };
    BigDecimal::new(signed, scale)
}

#[test]
fn decodes_the_big_num_fixture_values() {
    let codec = NumericCodec::default();

    // Bruce Wayne: 56505085819.424791296572280180
    let bruce = codec
        .decode(&reference_bytes("56505085819424791296572280180", 18, false))
        .unwrap();
    assert_eq!(
        bruce.as_bigint_and_exponent(),
        expected("56505085819424791296572280180", 18, false).as_bigint_and_exponent()
    );

    // Bart Simpson: -0.0784734499180612994241100748
    let bart = codec
        .decode(&reference_bytes("784734499180612994241100748", 28, true))
        .unwrap();
    assert!(bart.as_bigint_and_exponent().0.sign() == Sign::Minus);
    assert_eq!(
        bart.as_bigint_and_exponent(),
        expected("784734499180612994241100748", 28, true).as_bigint_and_exponent()
    );

    // John Doe: 0E-8
    let john = codec.decode(&reference_bytes("0", 8, false)).unwrap();
    assert_eq!(john.as_bigint_and_exponent(), (BigInt::from(0), 8));

    // Test User: 2.787019289824216980830E-7
    let test_user = codec
        .decode(&reference_bytes("2787019289824216980830", 28, false))
        .unwrap();
    assert_eq!(
        test_user.as_bigint_and_exponent(),
        expected("2787019289824216980830", 28, false).as_bigint_and_exponent()
    );
}

#[test]
fn encoding_reproduces_the_on_disk_bytes() {
    let codec = NumericCodec::default();

    // Values within the 28-digit precision limit must encode to exactly
    // the bytes found in the fixture file.
    for (unscaled, scale, negative) in [
        ("784734499180612994241100748", 28u8, true),
        ("2787019289824216980830", 28, false),
        ("833333333", 4, false), // MonthlySalary: 83333.3333
        ("0", 8, false),
    ] {
        let value = expected(unscaled, i64::from(scale), negative);
        let encoded = codec.encode(&value).unwrap();
        assert_eq!(
            encoded,
            reference_bytes(unscaled, scale, negative),
            "bytes for {value}"
        );
    }
}

#[test]
fn monthly_and_weekly_salary_round_trip() {
    let codec = NumericCodec::default();
    for text in ["83333.3333", "-0.0833", "0.0000", "8.3333", "1000000.0000"] {
        let value: BigDecimal = text.parse().unwrap();
        let decoded = codec.decode(&codec.encode(&value).unwrap()).unwrap();
        assert_eq!(
            decoded.as_bigint_and_exponent(),
            value.as_bigint_and_exponent(),
            "round trip of {text}"
        );
    }
}
