//! Little/big-endian fixed-width reads and writes, plus the Adler-32-style
//! chunk/section checksum used throughout the format (§6 "Chunk checksum").
//!
//! The teacher crate inlines these as ad hoc `u32::from_le_bytes` calls at
//! each call site (see `src/ewf.rs`); here they are centralised because the
//! expanded spec touches many more section kinds that all share the same
//! primitive reads.

use crate::error::Error;

/// Adler-32 modulus, per RFC 1950 and `SPEC_FULL.md` §6.
const MOD_ADLER: u32 = 65521;

/// Compute the Adler-32-style checksum used for section headers, chunk
/// payloads, and the `table`/`table2` offset arrays. Seed is always 1.
pub fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;

    for chunk in data.chunks(5552) {
        for &byte in chunk {
            a += byte as u32;
            b += a;
        }
        a %= MOD_ADLER;
        b %= MOD_ADLER;
    }
    (b << 16) | a
}

pub fn read_u16_le(buf: &[u8]) -> Result<u16, Error> {
    let arr: [u8; 2] = buf
        .get(..2)
        .ok_or_else(|| Error::invalid_value("buffer too short for u16"))?
        .try_into()
        .unwrap();
    Ok(u16::from_le_bytes(arr))
}

pub fn read_u32_le(buf: &[u8]) -> Result<u32, Error> {
    let arr: [u8; 4] = buf
        .get(..4)
        .ok_or_else(|| Error::invalid_value("buffer too short for u32"))?
        .try_into()
        .unwrap();
    Ok(u32::from_le_bytes(arr))
}

pub fn read_u64_le(buf: &[u8]) -> Result<u64, Error> {
    let arr: [u8; 8] = buf
        .get(..8)
        .ok_or_else(|| Error::invalid_value("buffer too short for u64"))?
        .try_into()
        .unwrap();
    Ok(u64::from_le_bytes(arr))
}

pub fn write_u16_le(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u32_le(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u64_le(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Encode `bytes` as lowercase base16, matching the hex the teacher prints
/// for hash values (`MD5`, `SHA1`).
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adler32_of_empty_is_one() {
        assert_eq!(adler32(&[]), 1);
    }

    #[test]
    fn adler32_matches_known_vector() {
        // "Wikipedia" -> 0x11E60398 per the RFC 1950 worked example.
        assert_eq!(adler32(b"Wikipedia"), 0x11E60398);
    }

    #[test]
    fn roundtrip_u32() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, 0xDEADBEEF);
        assert_eq!(read_u32_le(&buf).unwrap(), 0xDEADBEEF);
    }

    #[test]
    fn hex_encoding() {
        assert_eq!(to_hex(&[0x0a, 0xff]), "0aff");
    }
}
