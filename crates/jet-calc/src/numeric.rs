//! Specialised NUMERIC layout used inside the calculated-value wrapper.
//!
//! The payload is:
//!
//! ```text
//! i16  total_len   // little-endian; bytes remaining in the field minus 2
//! u8   scale       // 0..=28
//! u8   sign        // 0x80 if negative, else 0x00
//! [u8] mantissa    // unscaled magnitude, logically big-endian,
//!                  // zero-left-padded to data_len - 4 bytes
//! ```
//!
//! Before the mantissa lands in little-endian storage it is byte-swapped
//! with a quirk inherited from the engine: when the length is not a
//! multiple of 8, the leading 4 bytes are swapped as one group, and the
//! remainder is swapped in 8-byte groups. The same transform reverses the
//! encoding on read. This is not a plain endianness flip and must stay as
//! written.

use bigdecimal::BigDecimal;
use jet_format::DataType;
use num_bigint::{BigInt, Sign};

use crate::{unwrap_calculated_value, wrap_calculated_value, CalcError, Result};
use crate::CALC_EXTRA_DATA_LEN;

/// Widest mantissa the engine stores (128 bits).
const MAX_MANTISSA_LEN: usize = 16;
/// Payload bytes in front of the mantissa.
const NUMERIC_HEADER_LEN: usize = 4;

/// Codec for one calculated NUMERIC column.
#[derive(Debug, Clone, Copy)]
pub struct NumericCodec {
    /// Declared on-disk length of the column value including the wrapper.
    column_length: usize,
}

impl Default for NumericCodec {
    fn default() -> Self {
        // Room for the full 16-byte mantissa.
        NumericCodec::new(CALC_EXTRA_DATA_LEN + NUMERIC_HEADER_LEN + MAX_MANTISSA_LEN)
    }
}

impl NumericCodec {
    pub fn new(column_length: usize) -> NumericCodec {
        NumericCodec { column_length }
    }

    /// Precision reported for a calculated NUMERIC column: always the type
    /// maximum, whatever precision the column declaration carries.
    pub fn precision(&self) -> u32 {
        DataType::Numeric.max_precision()
    }

    fn data_len(&self) -> usize {
        let total = (CALC_EXTRA_DATA_LEN + NUMERIC_HEADER_LEN + MAX_MANTISSA_LEN)
            .min(self.column_length);
        total.saturating_sub(CALC_EXTRA_DATA_LEN)
    }

    /// Decode a stored (wrapped) calculated NUMERIC value.
    pub fn decode(&self, data: &[u8]) -> Result<BigDecimal> {
        let payload = unwrap_calculated_value(data);
        if payload.len() < NUMERIC_HEADER_LEN {
            return Err(CalcError::Malformed(format!(
                "numeric payload of {} bytes is shorter than its header",
                payload.len()
            )));
        }

        let total_len = i16::from_le_bytes([payload[0], payload[1]]);
        let total = if total_len > 0 {
            total_len as usize
        } else {
            payload.len() - 2
        };
        // Mantissas are stored in 4-byte units, at most 16 bytes.
        let mantissa_len = (total.saturating_sub(2) / 4 * 4).min(MAX_MANTISSA_LEN);
        let scale = payload[2];
        let negate = payload[3] != 0;

        let end = NUMERIC_HEADER_LEN + mantissa_len;
        if payload.len() < end {
            return Err(CalcError::Malformed(format!(
                "numeric payload truncated: need {end} bytes, have {}",
                payload.len()
            )));
        }
        let mut mantissa = payload[NUMERIC_HEADER_LEN..end].to_vec();
        fix_numeric_byte_order(&mut mantissa);

        let sign = if negate { Sign::Minus } else { Sign::Plus };
        let unscaled = BigInt::from_bytes_be(sign, &mantissa);
        Ok(BigDecimal::new(unscaled, i64::from(scale)))
    }

    /// Encode a value as a wrapped calculated NUMERIC.
    pub fn encode(&self, value: &BigDecimal) -> Result<Vec<u8>> {
        let data_len = self.data_len();
        let mantissa_space = data_len.saturating_sub(NUMERIC_HEADER_LEN);

        let mut dec = value.clone();
        if dec.fractional_digit_count() < 0 {
            // Negative scale never survives normalisation; expand it so the
            // scale byte stays in range.
            dec = dec.with_scale(0);
        }
        let max_scale = i64::from(DataType::Numeric.max_scale());
        if dec.fractional_digit_count() > max_scale {
            dec = dec.with_scale_round(max_scale, bigdecimal::RoundingMode::Down);
        }

        if dec.digits() > u64::from(self.precision()) {
            return Err(CalcError::Arithmetic(format!(
                "numeric value is too big for precision {}: {dec}",
                self.precision()
            )));
        }

        let (unscaled, scale) = dec.as_bigint_and_exponent();
        let negative = unscaled.sign() == Sign::Minus;
        let (_, magnitude) = unscaled.to_bytes_be();
        // `to_bytes_be` renders zero as one 0x00 byte; that pads fine.
        if magnitude.len() > mantissa_space {
            return Err(CalcError::Arithmetic(format!(
                "numeric value needs {} mantissa bytes but the column holds {mantissa_space}",
                magnitude.len()
            )));
        }

        let mut mantissa = vec![0u8; mantissa_space - magnitude.len()];
        mantissa.extend_from_slice(&magnitude);
        fix_numeric_byte_order(&mut mantissa);

        let mut payload = Vec::with_capacity(data_len);
        payload.extend_from_slice(&((data_len - 2) as i16).to_le_bytes());
        payload.push(scale as u8);
        payload.push(if negative { 0x80 } else { 0x00 });
        payload.extend_from_slice(&mantissa);

        Ok(wrap_calculated_value(&payload))
    }
}

/// The engine truncates leading zero bytes and *then* swaps endianness,
/// which leaves this odd grouping: a lone 4-byte swap when the length is
/// not a multiple of 8, followed by 8-byte swaps.
fn fix_numeric_byte_order(bytes: &mut [u8]) {
    let mut pos = 0;
    if bytes.len() % 8 != 0 {
        bytes[0..4].reverse();
        pos = 4;
    }
    while pos + 8 <= bytes.len() {
        bytes[pos..pos + 8].reverse();
        pos += 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn round_trip(codec: NumericCodec, text: &str) {
        let value = BigDecimal::from_str(text).unwrap();
        let encoded = codec.encode(&value).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(
            decoded.as_bigint_and_exponent(),
            value.as_bigint_and_exponent(),
            "round trip of {text}"
        );
    }

    #[test]
    fn swap_groups_match_the_engine() {
        let mut four = [1u8, 2, 3, 4];
        fix_numeric_byte_order(&mut four);
        assert_eq!(four, [4, 3, 2, 1]);

        let mut eight = [1u8, 2, 3, 4, 5, 6, 7, 8];
        fix_numeric_byte_order(&mut eight);
        assert_eq!(eight, [8, 7, 6, 5, 4, 3, 2, 1]);

        let mut twelve = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        fix_numeric_byte_order(&mut twelve);
        assert_eq!(twelve, [4, 3, 2, 1, 12, 11, 10, 9, 8, 7, 6, 5]);

        let mut sixteen: Vec<u8> = (1..=16).collect();
        fix_numeric_byte_order(&mut sixteen);
        assert_eq!(
            sixteen,
            vec![8, 7, 6, 5, 4, 3, 2, 1, 16, 15, 14, 13, 12, 11, 10, 9]
        );
    }

    #[test]
    fn swap_is_an_involution() {
        for len in [4usize, 8, 12, 16] {
            let original: Vec<u8> = (0..len as u8).collect();
            let mut swapped = original.clone();
            fix_numeric_byte_order(&mut swapped);
            fix_numeric_byte_order(&mut swapped);
            assert_eq!(swapped, original);
        }
    }

    #[test]
    fn known_four_byte_mantissa_layout() {
        // 1234.5678 -> unscaled 12345678 = 0x00BC614E, scale 4.
        let codec = NumericCodec::new(CALC_EXTRA_DATA_LEN + 8);
        let encoded = codec
            .encode(&BigDecimal::from_str("1234.5678").unwrap())
            .unwrap();
        let payload = unwrap_calculated_value(&encoded);
        assert_eq!(payload, [6, 0, 4, 0x00, 0x4E, 0x61, 0xBC, 0x00]);
    }

    #[test]
    fn sign_byte_is_0x80_for_negative_values() {
        let codec = NumericCodec::default();
        let encoded = codec
            .encode(&BigDecimal::from_str("-1234.5678").unwrap())
            .unwrap();
        let payload = unwrap_calculated_value(&encoded);
        assert_eq!(payload[3], 0x80);
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, BigDecimal::from_str("-1234.5678").unwrap());
    }

    #[test]
    fn round_trips_across_mantissa_widths() {
        // 4-byte mantissa: lone 4-swap path.
        round_trip(NumericCodec::new(CALC_EXTRA_DATA_LEN + 8), "1234.5678");
        // 8-byte mantissa: pure 8-swap path.
        round_trip(
            NumericCodec::new(CALC_EXTRA_DATA_LEN + 12),
            "12345678901234.5678",
        );
        // 12-byte mantissa: both groups.
        round_trip(
            NumericCodec::new(CALC_EXTRA_DATA_LEN + 16),
            "1234567890123456789012.5678",
        );
        // 16-byte mantissa (the default layout).
        round_trip(NumericCodec::default(), "56505085819.4247912965722801");
    }

    #[test]
    fn zero_keeps_its_scale() {
        // 0E-8: unscaled zero with scale 8 survives the trip unchanged.
        let codec = NumericCodec::default();
        let zero = BigDecimal::new(BigInt::from(0), 8);
        let encoded = codec.encode(&zero).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded.as_bigint_and_exponent(), (BigInt::from(0), 8));
    }

    #[test]
    fn precision_beyond_the_type_maximum_is_arithmetic() {
        let codec = NumericCodec::default();
        // 29 significant digits.
        let too_precise = BigDecimal::from_str("12345678901234567890123456789").unwrap();
        assert!(matches!(
            codec.encode(&too_precise),
            Err(CalcError::Arithmetic(_))
        ));
    }

    #[test]
    fn mantissa_wider_than_the_column_is_arithmetic() {
        let codec = NumericCodec::new(CALC_EXTRA_DATA_LEN + 8);
        let wide = BigDecimal::from_str("123456789012").unwrap();
        assert!(matches!(codec.encode(&wide), Err(CalcError::Arithmetic(_))));
    }

    #[test]
    fn excess_scale_is_reduced_to_the_type_maximum() {
        let codec = NumericCodec::default();
        let value = BigDecimal::from_str("0.00000000000000000000000000015").unwrap();
        let encoded = codec.encode(&value).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(
            decoded.as_bigint_and_exponent(),
            (BigInt::from(1), 28),
            "scale 29 rounds down into scale 28"
        );
    }

    #[test]
    fn reported_precision_is_the_type_maximum() {
        assert_eq!(NumericCodec::new(30).precision(), 28);
        assert_eq!(NumericCodec::default().precision(), 28);
    }
}
