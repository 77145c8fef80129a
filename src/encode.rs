//! Byte level encoding of code parameters, shared by both assemblers and
//! the disassembler.

use crate::{code::FieldKind, error::AssembleError};

/// Addresses below this are image offsets and get the pointer base added.
pub const POINTER_LIMIT: i64 = 0x0200_0000;

/// `value` as `width` little-endian bytes. A value is accepted when it fits
/// either as a signed or as an unsigned number.
pub fn int(value: i64, width: usize) -> Result<Vec<u8>, AssembleError> {
    if width < 8 {
        let bits = 8 * width as u32;
        let min = -(1i64 << (bits - 1));
        let max = (1i64 << bits) - 1;
        if value < min || value > max {
            return Err(AssembleError::Range { value, width });
        }
    }
    let bytes = value.to_le_bytes();
    let fill = if value < 0 { 0xFF } else { 0 };
    Ok((0..width)
        .map(|i| bytes.get(i).copied().unwrap_or(fill))
        .collect())
}

/// Turns an image offset into the address the game sees.
pub fn pointer(value: i64, base: u32) -> i64 {
    if value > 0 && value < POINTER_LIMIT {
        value + base as i64
    } else {
        value
    }
}

/// The image offset an address points at, if it is one.
pub fn unpointer(raw: u64, base: u32) -> Option<u32> {
    let base = base as u64;
    if raw >= base && raw - base < POINTER_LIMIT as u64 {
        Some((raw - base) as u32)
    } else {
        None
    }
}

/// Encodes a single valued field: integers and addresses.
pub fn field(kind: &FieldKind, width: usize, value: i64, base: u32) -> Result<Vec<u8>, AssembleError> {
    if kind.is_pointer() {
        int(pointer(value, base), width)
    } else {
        int(value, width)
    }
}

/// Concatenates `values` as equal width elements.
pub fn array(values: &[i64], width: usize) -> Result<Vec<u8>, AssembleError> {
    let mut bytes = Vec::with_capacity(values.len() * width);
    for value in values {
        bytes.extend(int(*value, width)?);
    }
    Ok(bytes)
}

/// NUL padded text of exactly `len` bytes.
pub fn text(bytes: &[u8], len: usize) -> Result<Vec<u8>, AssembleError> {
    if bytes.len() > len {
        return Err(AssembleError::Range {
            value: bytes.len() as i64,
            width: len,
        });
    }
    let mut out = bytes.to_vec();
    out.resize(len, 0);
    Ok(out)
}

pub fn read_uint(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .rev()
        .fold(0, |acc, &b| (acc << 8) | b as u64)
}

pub fn read_int(bytes: &[u8], signed: bool) -> i64 {
    let raw = read_uint(bytes);
    let bits = 8 * bytes.len().min(8) as u32;
    if signed && bits < 64 && raw >> (bits - 1) & 1 == 1 {
        (raw | (u64::MAX << bits)) as i64
    } else {
        raw as i64
    }
}

/// Text of a string field, when it is printable ASCII followed only by
/// NUL padding.
pub fn read_text(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let (text, padding) = bytes.split_at(end);
    if padding.iter().any(|&b| b != 0) || !text.iter().all(|b| (0x20..0x7F).contains(b)) {
        return None;
    }
    Some(text.iter().map(|&b| b as char).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        assert_eq!(int(255, 1), Ok(vec![0xFF]));
        assert_eq!(int(-1, 1), Ok(vec![0xFF]));
        assert_eq!(int(-128, 1), Ok(vec![0x80]));
        assert_eq!(int(0x1234, 2), Ok(vec![0x34, 0x12]));
        assert_eq!(int(-2, 4), Ok(vec![0xFE, 0xFF, 0xFF, 0xFF]));
        assert_eq!(int(256, 1), Err(AssembleError::Range { value: 256, width: 1 }));
        assert_eq!(int(-129, 1), Err(AssembleError::Range { value: -129, width: 1 }));
        assert_eq!(int(i64::MIN, 8).map(|b| b.len()), Ok(8));
    }

    #[test]
    fn pointers() {
        let base = 0x0800_0000;
        assert_eq!(pointer(0, base), 0);
        assert_eq!(pointer(0x1234, base), 0x0800_1234);
        assert_eq!(pointer(0x0800_1234, base), 0x0800_1234);
        assert_eq!(unpointer(0x0800_1234, base), Some(0x1234));
        assert_eq!(unpointer(0x0300_0000, base), None);
        assert_eq!(unpointer(0x0A00_0000, base), None);
        let kind = FieldKind::Pointer { element: 1 };
        assert_eq!(field(&kind, 4, 0x10, base), Ok(vec![0x10, 0, 0, 0x08]));
    }

    #[test]
    fn reading() {
        assert_eq!(read_uint(&[0x34, 0x12]), 0x1234);
        assert_eq!(read_int(&[0xFE], true), -2);
        assert_eq!(read_int(&[0xFE], false), 0xFE);
        assert_eq!(read_int(&[0xFF; 8], true), -1);
    }

    #[test]
    fn strings() {
        assert_eq!(text(b"Eirika", 8), Ok(b"Eirika\0\0".to_vec()));
        assert!(text(b"toolong", 4).is_err());
        assert_eq!(read_text(b"Eirika\0\0").as_deref(), Some("Eirika"));
        assert_eq!(read_text(b"ab\0c"), None);
        assert_eq!(read_text(&[0x01, 0]), None);
        assert_eq!(read_text(b"full").as_deref(), Some("full"));
    }
}
