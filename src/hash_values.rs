//! Hash Values (`SPEC_FULL.md` §1.2, §3, §6) — unifies the legacy ASCII
//! `hash` section and the binary `digest` section (EnCase6+) behind one
//! canonical MD5/SHA1(/SHA256) getter-setter pair, matching
//! `libewf_hash_values`'s role in the original source.
//!
//! The teacher has no hash/digest support at all; grounded on the payload
//! layouts in §6 and the "unify both wire forms" note in §1.2.

use crate::endian::{adler32, read_u32_le, to_hex, write_u32_le};
use crate::error::Error;
use std::collections::HashMap;

/// Canonical ordered hash-value map; keys are `"MD5"`, `"SHA1"`, and
/// (EWF-X) `"SHA256"`, stored as lowercase hex per the teacher's existing
/// hex-printing convention in `to_hex`.
#[derive(Debug, Clone, Default)]
pub struct HashValues {
    order: Vec<String>,
    values: HashMap<String, String>,
}

impl HashValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, hex_digest: impl Into<String>) {
        if !self.values.contains_key(key) {
            self.order.push(key.to_string());
        }
        self.values.insert(key.to_string(), hex_digest.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .map(move |k| (k.as_str(), self.values[k].as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Decode a legacy `hash` section payload: 16-byte MD5 digest, 20-byte zero
/// pad, `u32 LE` checksum over the preceding 16 bytes.
pub fn decode_hash_section(payload: &[u8]) -> Result<HashValues, Error> {
    if payload.len() < 40 {
        return Err(Error::invalid_value("hash section payload too short"));
    }
    let md5 = &payload[0..16];
    let checksum = read_u32_le(&payload[36..40])?;
    let computed = adler32(md5);
    if checksum != computed {
        return Err(Error::checksum_mismatch("hash section checksum mismatch"));
    }
    let mut values = HashValues::new();
    values.set("MD5", to_hex(md5));
    Ok(values)
}

/// Encode a `hash` section payload. Falls back to an all-zero MD5 digest
/// when none has been set, matching the empty-placeholder form tools emit
/// for images acquired without hashing.
pub fn encode_hash_section(values: &HashValues) -> Result<Vec<u8>, Error> {
    let md5 = match values.get("MD5") {
        Some(hex) => from_hex(hex)?,
        None => vec![0u8; 16],
    };
    let mut out = Vec::with_capacity(40);
    out.extend_from_slice(&md5);
    out.extend_from_slice(&[0u8; 20]);
    let checksum = adler32(&md5);
    write_u32_le(&mut out, checksum);
    Ok(out)
}

/// Decode a `digest` section payload (EnCase6+): 16-byte MD5, 20-byte SHA1,
/// 40-byte zero pad, `u32 LE` checksum over the preceding 36 bytes.
pub fn decode_digest_section(payload: &[u8]) -> Result<HashValues, Error> {
    if payload.len() < 80 {
        return Err(Error::invalid_value("digest section payload too short"));
    }
    let md5 = &payload[0..16];
    let sha1 = &payload[16..36];
    let checksum = read_u32_le(&payload[76..80])?;
    let computed = adler32(&payload[0..36]);
    if checksum != computed {
        return Err(Error::checksum_mismatch("digest section checksum mismatch"));
    }
    let mut values = HashValues::new();
    values.set("MD5", to_hex(md5));
    values.set("SHA1", to_hex(sha1));
    Ok(values)
}

pub fn encode_digest_section(values: &HashValues) -> Result<Vec<u8>, Error> {
    let md5 = from_hex(
        values
            .get("MD5")
            .ok_or_else(|| Error::value_missing("digest section requires an MD5 digest"))?,
    )?;
    let sha1 = from_hex(
        values
            .get("SHA1")
            .ok_or_else(|| Error::value_missing("digest section requires a SHA1 digest"))?,
    )?;
    let mut out = Vec::with_capacity(80);
    out.extend_from_slice(&md5);
    out.extend_from_slice(&sha1);
    out.extend_from_slice(&[0u8; 40]);
    let checksum = adler32(&out);
    write_u32_le(&mut out, checksum);
    Ok(out)
}

/// Parse the legacy ASCII `hash` wire text some tools emit instead of the
/// binary layout (`"MD5 = <hex>\nSHA1 = <hex>\n"`), per §1.2.
pub fn decode_ascii_hash_text(text: &str) -> HashValues {
    let mut values = HashValues::new();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim();
            if !key.is_empty() && !value.is_empty() {
                values.set(key, value.to_string());
            }
        }
    }
    values
}

fn from_hex(s: &str) -> Result<Vec<u8>, Error> {
    if s.len() % 2 != 0 {
        return Err(Error::invalid_value("hex digest has odd length"));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| Error::invalid_value(format!("invalid hex digit in '{}'", s)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_hash_section() {
        let mut values = HashValues::new();
        values.set("MD5", "00112233445566778899aabbccddeeff".chars().take(32).collect::<String>());
        let payload = encode_hash_section(&values).unwrap();
        let decoded = decode_hash_section(&payload).unwrap();
        assert_eq!(decoded.get("MD5"), values.get("MD5"));
    }

    #[test]
    fn roundtrip_digest_section() {
        let mut values = HashValues::new();
        values.set("MD5", "a".repeat(32));
        values.set("SHA1", "b".repeat(40));
        let payload = encode_digest_section(&values).unwrap();
        let decoded = decode_digest_section(&payload).unwrap();
        assert_eq!(decoded.get("MD5"), Some("a".repeat(32).as_str()));
        assert_eq!(decoded.get("SHA1"), Some("b".repeat(40).as_str()));
    }

    #[test]
    fn parses_legacy_ascii_hash_text() {
        let values = decode_ascii_hash_text("MD5 = deadbeef\nSHA1 = cafebabe\n");
        assert_eq!(values.get("MD5"), Some("deadbeef"));
        assert_eq!(values.get("SHA1"), Some("cafebabe"));
    }
}
