//! Fixed-width scalar encodings
//!
//! Booleans are a 4-byte little-endian integer (0 or 1), numbers an 8-byte
//! little-endian IEEE-754 double. Strings need no helper: their encoding is
//! the raw bytes.

use byteorder::{ByteOrder, LittleEndian};
use shmtree_core::{Error, Result};

/// Encoded boolean width
pub const BOOLEAN_SIZE: usize = 4;
/// Encoded number width
pub const NUMBER_SIZE: usize = 8;

pub(crate) fn encode_bool(b: bool) -> [u8; BOOLEAN_SIZE] {
    let mut out = [0u8; BOOLEAN_SIZE];
    LittleEndian::write_u32(&mut out, u32::from(b));
    out
}

/// Any non-zero integer reads as true
pub(crate) fn decode_bool(bytes: &[u8]) -> Result<bool> {
    check_width(bytes, BOOLEAN_SIZE, "boolean")?;
    Ok(LittleEndian::read_u32(bytes) != 0)
}

pub(crate) fn encode_number(n: f64) -> [u8; NUMBER_SIZE] {
    let mut out = [0u8; NUMBER_SIZE];
    LittleEndian::write_f64(&mut out, n);
    out
}

pub(crate) fn decode_number(bytes: &[u8]) -> Result<f64> {
    check_width(bytes, NUMBER_SIZE, "number")?;
    Ok(LittleEndian::read_f64(bytes))
}

fn check_width(bytes: &[u8], width: usize, what: &str) -> Result<()> {
    if bytes.len() != width {
        return Err(Error::corruption(format!(
            "{what} region is {} bytes, expected {width}",
            bytes.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_layout() {
        assert_eq!(encode_bool(true), [1, 0, 0, 0]);
        assert_eq!(encode_bool(false), [0, 0, 0, 0]);
        assert!(decode_bool(&[7, 0, 0, 0]).unwrap());
    }

    #[test]
    fn test_number_is_le_double() {
        assert_eq!(encode_number(1.0), 1.0f64.to_le_bytes());
        assert_eq!(decode_number(&(-2.5f64).to_le_bytes()).unwrap(), -2.5);
    }

    #[test]
    fn test_wrong_width_is_corruption() {
        assert!(matches!(decode_bool(&[1, 0]), Err(Error::Corruption(_))));
        assert!(matches!(decode_number(&[0; 4]), Err(Error::Corruption(_))));
    }
}
