#![forbid(unsafe_code)]

//! On-disk codec for calculated-column values.
//!
//! Every stored value of a calculated column is wrapped in 23 extra bytes:
//! a 20-byte header (16 format-private bytes followed by a 4-byte
//! little-endian data length) and a 3-byte trailer of padding. The payload
//! inside the wrapper is encoded as the column's underlying type by the
//! column layer, with two exceptions handled here because their calculated
//! encodings differ from the ordinary column forms:
//!
//! - booleans always occupy one payload byte (`0xFF` true, `0x00` false)
//!   instead of living in the row's null mask;
//! - NUMERIC values use a specialised layout with a non-standard
//!   byte-order transform (see [`numeric`]).

mod error;
pub mod numeric;

pub use error::{CalcError, Result};
pub use numeric::NumericCodec;

/// Offset of the 4-byte little-endian data length within the wrapper.
pub const CALC_DATA_LEN_OFFSET: usize = 16;
/// Offset at which wrapped payload starts.
pub const CALC_DATA_OFFSET: usize = CALC_DATA_LEN_OFFSET + 4;
/// Total overhead added by the wrapper (20-byte header + 3-byte trailer).
pub const CALC_EXTRA_DATA_LEN: usize = 23;

/// Strip the wrapper from a stored calculated value.
///
/// The 16 format-private header bytes are skipped without interpretation.
/// Data shorter than a header is passed through untouched. Only the first
/// `data_len` payload bytes are significant; anything beyond is padding.
pub fn unwrap_calculated_value(data: &[u8]) -> &[u8] {
    if data.len() < CALC_DATA_OFFSET {
        return data;
    }
    let data_len = u32::from_le_bytes([
        data[CALC_DATA_LEN_OFFSET],
        data[CALC_DATA_LEN_OFFSET + 1],
        data[CALC_DATA_LEN_OFFSET + 2],
        data[CALC_DATA_LEN_OFFSET + 3],
    ]) as usize;
    let payload = &data[CALC_DATA_OFFSET..];
    &payload[..payload.len().min(data_len)]
}

/// Wrap an encoded payload for storage.
///
/// The format-private prefix is zeroed; the trailer pads the result to
/// `payload.len() + 23` bytes.
pub fn wrap_calculated_value(payload: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; payload.len() + CALC_EXTRA_DATA_LEN];
    data[CALC_DATA_LEN_OFFSET..CALC_DATA_OFFSET]
        .copy_from_slice(&(payload.len() as u32).to_le_bytes());
    data[CALC_DATA_OFFSET..CALC_DATA_OFFSET + payload.len()].copy_from_slice(payload);
    data
}

/// Decode a stored calculated boolean.
///
/// Calculated booleans are not stored in the row's null mask; the wrapper
/// always carries one value byte.
pub fn read_calc_boolean(data: &[u8]) -> Result<bool> {
    let payload = unwrap_calculated_value(data);
    match payload.first() {
        Some(&b) => Ok(b != 0),
        None => Err(CalcError::Malformed(
            "calculated boolean has no value byte".into(),
        )),
    }
}

/// Encode a calculated boolean (`0xFF` true, `0x00` false).
pub fn write_calc_boolean(value: bool) -> Vec<u8> {
    wrap_calculated_value(&[if value { 0xFF } else { 0x00 }])
}
