//! UTF-8 codec: conversion between raw bytes and Unicode scalar code points.
//!
//! This is deliberately independent of `std::str`'s own (perfectly good) UTF-8
//! handling: the wire format and the runtime's string object work in terms of
//! explicit Unicode scalar values (`char`), and decoding must reject every
//! kind of malformed input (surrogates, overlongs, truncated sequences, bad
//! start/continuation bytes) with a `value-error` rather than simply
//! failing generically.

use crate::exceptions::{ExcType, RunError};

/// Encodes a sequence of Unicode scalar values as UTF-8 bytes.
///
/// # Errors
/// Returns a `value-error` if any code point is a surrogate (`0xD800..=0xDFFF`)
/// or exceeds `0x10FFFF`.
pub fn encode(codepoints: &[char]) -> Result<Vec<u8>, RunError> {
    let mut out = Vec::with_capacity(codepoints.len());
    for &c in codepoints {
        encode_one(c, &mut out);
    }
    Ok(out)
}

fn encode_one(c: char, out: &mut Vec<u8>) {
    // `char` already excludes surrogates and values above 0x10FFFF, so this
    // can't fail; the branch structure mirrors `how_many_bytes` below so the
    // two stay obviously in sync.
    let codepoint = c as u32;
    match codepoint {
        0..=0x7f => out.push(codepoint as u8),
        0x80..=0x7ff => {
            out.push(0b1100_0000 | (codepoint >> 6) as u8);
            out.push(0b1000_0000 | (codepoint & 0x3f) as u8);
        }
        0x800..=0xffff => {
            out.push(0b1110_0000 | (codepoint >> 12) as u8);
            out.push(0b1000_0000 | ((codepoint >> 6) & 0x3f) as u8);
            out.push(0b1000_0000 | (codepoint & 0x3f) as u8);
        }
        _ => {
            out.push(0b1111_0000 | (codepoint >> 18) as u8);
            out.push(0b1000_0000 | ((codepoint >> 12) & 0x3f) as u8);
            out.push(0b1000_0000 | ((codepoint >> 6) & 0x3f) as u8);
            out.push(0b1000_0000 | (codepoint & 0x3f) as u8);
        }
    }
}

/// Decodes UTF-8 bytes into a sequence of Unicode scalar values.
///
/// # Errors
/// Returns a `value-error` for truncated sequences, invalid continuation or
/// start bytes, overlong encodings, or encoded surrogate halves.
pub fn decode(bytes: &[u8]) -> Result<Vec<char>, RunError> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let (codepoint, nbytes) = decode_one(&bytes[i..])?;
        let expected = how_many_bytes(codepoint)?;
        if nbytes != expected {
            return Err(ExcType::value_error(format!(
                "overlong encoding starting at byte {i}"
            )));
        }
        // SAFETY-equivalent: `how_many_bytes` already rejected surrogates and
        // out-of-range scalars, so `codepoint` is a valid `char`.
        out.push(char::from_u32(codepoint).ok_or_else(|| {
            ExcType::value_error(format!("invalid Unicode code point U+{codepoint:04X}"))
        })?);
        i += nbytes;
    }
    Ok(out)
}

fn how_many_bytes(codepoint: u32) -> Result<usize, RunError> {
    match codepoint {
        0..=0x7f => Ok(1),
        0x80..=0x7ff => Ok(2),
        0xd800..=0xdfff => Err(ExcType::value_error(format!(
            "invalid Unicode code point U+{codepoint:04X}"
        ))),
        0x800..=0xffff => Ok(3),
        0x10000..=0x10ffff => Ok(4),
        _ => Err(ExcType::value_error(format!(
            "invalid Unicode code point U+{codepoint:04X}"
        ))),
    }
}

fn decode_one(bytes: &[u8]) -> Result<(u32, usize), RunError> {
    let b0 = bytes[0];
    if b0 >> 7 == 0 {
        return Ok((u32::from(b0), 1));
    }
    if b0 >> 5 == 0b110 {
        check_len(bytes, 2)?;
        let b1 = continuation(bytes[1])?;
        return Ok((u32::from(b0 & 0x1f) << 6 | u32::from(b1), 2));
    }
    if b0 >> 4 == 0b1110 {
        check_len(bytes, 3)?;
        let b1 = continuation(bytes[1])?;
        let b2 = continuation(bytes[2])?;
        return Ok((
            u32::from(b0 & 0x0f) << 12 | u32::from(b1) << 6 | u32::from(b2),
            3,
        ));
    }
    if b0 >> 3 == 0b11110 {
        check_len(bytes, 4)?;
        let b1 = continuation(bytes[1])?;
        let b2 = continuation(bytes[2])?;
        let b3 = continuation(bytes[3])?;
        return Ok((
            u32::from(b0 & 0x07) << 18 | u32::from(b1) << 12 | u32::from(b2) << 6 | u32::from(b3),
            4,
        ));
    }
    Err(ExcType::value_error(format!("invalid start byte: 0x{b0:02x}")))
}

fn check_len(bytes: &[u8], n: usize) -> Result<(), RunError> {
    if bytes.len() < n {
        Err(ExcType::value_error("unexpected end of string"))
    } else {
        Ok(())
    }
}

fn continuation(byte: u8) -> Result<u8, RunError> {
    if byte >> 6 != 0b10 {
        Err(ExcType::value_error(format!(
            "invalid continuation byte: 0x{byte:02x}"
        )))
    } else {
        Ok(byte & 0x3f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip_ascii() {
        let cps: Vec<char> = "hello world".chars().collect();
        let bytes = encode(&cps).unwrap();
        assert_eq!(bytes, b"hello world");
        assert_eq!(decode(&bytes).unwrap(), cps);
    }

    #[test]
    fn encode_decode_roundtrip_multibyte() {
        let cps: Vec<char> = "héllo 世界 \u{1f600}".chars().collect();
        let bytes = encode(&cps).unwrap();
        assert_eq!(decode(&bytes).unwrap(), cps);
    }

    #[test]
    fn decode_rejects_overlong() {
        // 0xC0 0x80 is an overlong encoding of U+0000.
        let err = decode(&[0xC0, 0x80]).unwrap_err();
        assert!(matches!(err, RunError::Exc(_)));
    }

    #[test]
    fn decode_rejects_truncated_sequence() {
        assert!(decode(&[0xE2, 0x82]).is_err());
    }

    #[test]
    fn decode_rejects_lone_continuation_byte() {
        assert!(decode(&[0x80]).is_err());
    }

    #[test]
    fn decode_rejects_invalid_start_byte() {
        assert!(decode(&[0xFF]).is_err());
    }

    #[test]
    fn decode_empty_is_empty() {
        assert_eq!(decode(&[]).unwrap(), Vec::<char>::new());
    }
}
