//! Fixed-width little-endian primitives and length-prefixed strings.

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use half::f16;

use ggscope_core::{GgufError, Result};

use crate::cursor::ByteCursor;

macro_rules! read_scalar {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $what:literal, $read:expr) => {
        $(#[$doc])*
        pub fn $name<R: Read>(cursor: &mut ByteCursor<R>) -> Result<$ty> {
            cursor.read_with($what, std::mem::size_of::<$ty>() as u64, $read)
        }
    };
}

read_scalar!(
    /// Read a u8.
    read_u8, u8, "u8", |r| r.read_u8()
);
read_scalar!(
    /// Read an i8.
    read_i8, i8, "i8", |r| r.read_i8()
);
read_scalar!(
    /// Read a little-endian u16.
    read_u16, u16, "u16", |r| r.read_u16::<LittleEndian>()
);
read_scalar!(
    /// Read a little-endian i16.
    read_i16, i16, "i16", |r| r.read_i16::<LittleEndian>()
);
read_scalar!(
    /// Read a little-endian u32.
    read_u32, u32, "u32", |r| r.read_u32::<LittleEndian>()
);
read_scalar!(
    /// Read a little-endian i32.
    read_i32, i32, "i32", |r| r.read_i32::<LittleEndian>()
);
read_scalar!(
    /// Read a little-endian u64.
    read_u64, u64, "u64", |r| r.read_u64::<LittleEndian>()
);
read_scalar!(
    /// Read a little-endian i64.
    read_i64, i64, "i64", |r| r.read_i64::<LittleEndian>()
);
read_scalar!(
    /// Read a little-endian f32.
    read_f32, f32, "f32", |r| r.read_f32::<LittleEndian>()
);
read_scalar!(
    /// Read a little-endian f64.
    read_f64, f64, "f64", |r| r.read_f64::<LittleEndian>()
);

/// Read a one-byte bool. Any nonzero byte is `true`.
pub fn read_bool<R: Read>(cursor: &mut ByteCursor<R>) -> Result<bool> {
    Ok(cursor.read_with("bool", 1, |r| r.read_u8())? != 0)
}

/// Read a u64 length-prefixed UTF-8 string.
///
/// No terminator is consumed; trailing NULs inside the declared length are
/// kept as part of the string.
pub fn read_string<R: Read>(
    cursor: &mut ByteCursor<R>,
    max_len: u64,
    what: &'static str,
) -> Result<String> {
    let len = read_u64(cursor)?;
    if len > max_len {
        return Err(GgufError::StringTooLarge {
            size: len,
            max: max_len,
        });
    }
    let offset = cursor.position();
    let bytes = cursor.read_bytes(len, what)?;
    String::from_utf8(bytes).map_err(|_| GgufError::InvalidUtf8 { what, offset })
}

/// Reinterpret little-endian bytes as f32 values.
pub fn decode_f32_slice(bytes: &[u8]) -> Vec<f32> {
    let mut out = vec![0f32; bytes.len() / 4];
    LittleEndian::read_f32_into(&bytes[..out.len() * 4], &mut out);
    out
}

/// Reinterpret little-endian bytes as f16 values, bit for bit.
pub fn decode_f16_slice(bytes: &[u8]) -> Vec<f16> {
    let mut bits = vec![0u16; bytes.len() / 2];
    LittleEndian::read_u16_into(&bytes[..bits.len() * 2], &mut bits);
    bits.into_iter().map(f16::from_bits).collect()
}

/// Encode f32 values as little-endian bytes.
pub fn encode_f32_slice(values: &[f32]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * 4];
    LittleEndian::write_f32_into(values, &mut out);
    out
}

/// Encode f16 values as little-endian bytes, bit for bit.
pub fn encode_f16_slice(values: &[f16]) -> Vec<u8> {
    let bits: Vec<u16> = values.iter().map(|v| v.to_bits()).collect();
    let mut out = vec![0u8; bits.len() * 2];
    LittleEndian::write_u16_into(&bits, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ggscope_core::ErrorKind;

    fn cursor(bytes: &[u8]) -> ByteCursor<&[u8]> {
        ByteCursor::new(bytes)
    }

    #[test]
    fn test_scalars_are_little_endian() {
        let mut c = cursor(&[0x34, 0x12]);
        assert_eq!(read_u16(&mut c).unwrap(), 0x1234);

        let bytes = (-2i32).to_le_bytes();
        let mut c = cursor(&bytes);
        assert_eq!(read_i32(&mut c).unwrap(), -2);

        let bytes = u64::MAX.to_le_bytes();
        let mut c = cursor(&bytes);
        assert_eq!(read_u64(&mut c).unwrap(), u64::MAX);

        let bytes = 1.5f32.to_le_bytes();
        let mut c = cursor(&bytes);
        assert_eq!(read_f32(&mut c).unwrap(), 1.5);

        let bytes = (-0.25f64).to_le_bytes();
        let mut c = cursor(&bytes);
        assert_eq!(read_f64(&mut c).unwrap(), -0.25);

        let mut c = cursor(&[0xFF]);
        assert_eq!(read_i8(&mut c).unwrap(), -1);
    }

    #[test]
    fn test_bool_nonzero_is_true() {
        let mut c = cursor(&[0, 1, 7]);
        assert!(!read_bool(&mut c).unwrap());
        assert!(read_bool(&mut c).unwrap());
        assert!(read_bool(&mut c).unwrap());
    }

    #[test]
    fn test_truncated_scalar() {
        let mut c = cursor(&[1, 2, 3]);
        let err = read_u64(&mut c).unwrap_err();
        assert!(matches!(
            err,
            GgufError::Truncated {
                what: "u64",
                needed: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_read_string() {
        let mut bytes = 5u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"llama");
        let mut c = cursor(&bytes);
        assert_eq!(read_string(&mut c, 1024, "key").unwrap(), "llama");
        assert_eq!(c.position(), 13);
    }

    #[test]
    fn test_string_length_is_bytes_not_chars() {
        let text = "héllo";
        let mut bytes = (text.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(text.as_bytes());
        let mut c = cursor(&bytes);
        assert_eq!(read_string(&mut c, 1024, "key").unwrap(), text);
    }

    #[test]
    fn test_string_keeps_trailing_nul() {
        let mut bytes = 3u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"ab\0");
        let mut c = cursor(&bytes);
        assert_eq!(read_string(&mut c, 1024, "key").unwrap(), "ab\0");
    }

    #[test]
    fn test_invalid_utf8() {
        let mut bytes = 2u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xC3, 0x28]);
        let mut c = cursor(&bytes);
        let err = read_string(&mut c, 1024, "key").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
        assert!(matches!(err, GgufError::InvalidUtf8 { offset: 8, .. }));
    }

    #[test]
    fn test_truncated_string() {
        let mut bytes = 10u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"short");
        let mut c = cursor(&bytes);
        let err = read_string(&mut c, 1024, "key").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedData);
    }

    #[test]
    fn test_string_over_limit() {
        let bytes = 4096u64.to_le_bytes();
        let mut c = cursor(&bytes);
        let err = read_string(&mut c, 1024, "key").unwrap_err();
        assert!(matches!(
            err,
            GgufError::StringTooLarge {
                size: 4096,
                max: 1024
            }
        ));
    }

    #[test]
    fn test_f16_slice_preserves_bits() {
        let bits = [0x3C00u16, 0xC000, 0x7BFF, 0x0001];
        let bytes: Vec<u8> = bits.iter().flat_map(|b| b.to_le_bytes()).collect();
        let values = decode_f16_slice(&bytes);
        let round: Vec<u16> = values.iter().map(|v| v.to_bits()).collect();
        assert_eq!(round, bits);
        assert_eq!(values[0].to_f32(), 1.0);
        assert_eq!(values[1].to_f32(), -2.0);
    }

    #[test]
    fn test_f32_slice() {
        let bytes: Vec<u8> = [1.0f32, -3.5].iter().flat_map(|f| f.to_le_bytes()).collect();
        assert_eq!(decode_f32_slice(&bytes), vec![1.0, -3.5]);
        assert_eq!(encode_f32_slice(&[1.0, -3.5]), bytes);
    }

    #[test]
    fn test_encode_f16_slice_keeps_nan_payload() {
        let nan = f16::from_bits(0x7E01);
        let bytes = encode_f16_slice(&[nan, f16::ONE]);
        assert_eq!(bytes, vec![0x01, 0x7E, 0x00, 0x3C]);
    }
}
