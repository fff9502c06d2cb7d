//! Header Value Store (`SPEC_FULL.md` §4 component 6, §3 "Header Values").
//!
//! Grounded directly on `EwfHeaderSection` in the teacher's `src/ewf.rs`
//! (`decode`, `table_to_map`, `parse_metadata`), extended to (a) also emit
//! the textual blobs on write, (b) fold `xheader`'s UTF-8 payload in at the
//! lowest precedence per `SPEC_FULL.md` §1.2, and (c) expose the canonical
//! key aliases §3 lists (`c`/`cn` both mean case number, etc).

use std::collections::HashMap;

/// Canonical, code-independent identifiers for the well-known header keys.
pub const CANONICAL_KEYS: &[&str] = &[
    "case_number",
    "description",
    "examiner_name",
    "evidence_number",
    "notes",
    "acquiry_date",
    "system_date",
    "acquiry_operating_system",
    "acquiry_software_version",
    "password",
    "compression_level",
    "model",
    "serial_number",
];

/// Maps the single-/double-letter identifiers used on the wire (`c`, `cn`,
/// `a`, `e`, …) to the canonical name above — mirrors the teacher's
/// `print_info` `pretty()` lookup, generalised into a bidirectional table.
fn wire_alias_to_canonical(id: &str) -> Option<&'static str> {
    Some(match id {
        "c" | "cn" => "case_number",
        "a" => "description",
        "e" | "ex" => "examiner_name",
        "n" => "evidence_number",
        "t" | "nt" => "notes",
        "m" => "acquiry_date",
        "u" => "system_date",
        "ov" => "acquiry_operating_system",
        "av" => "acquiry_software_version",
        "p" => "password",
        "dc" => "compression_level",
        "md" => "model",
        "sn" => "serial_number",
        _ => return None,
    })
}

fn canonical_to_wire_alias(canonical: &str) -> Option<&'static str> {
    Some(match canonical {
        "case_number" => "c",
        "description" => "a",
        "examiner_name" => "e",
        "evidence_number" => "n",
        "notes" => "t",
        "acquiry_date" => "m",
        "system_date" => "u",
        "acquiry_operating_system" => "ov",
        "acquiry_software_version" => "av",
        "password" => "p",
        "compression_level" => "dc",
        "model" => "md",
        "serial_number" => "sn",
        _ => return None,
    })
}

/// An ordered (insertion order preserved) key/value store over both the
/// wire identifiers (`c`, `cn`, …) and the canonical names the handle
/// facade exposes.
#[derive(Debug, Clone, Default)]
pub struct HeaderValues {
    /// Keyed by wire identifier, in first-seen order.
    order: Vec<String>,
    raw: HashMap<String, String>,
}

impl HeaderValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a `header`/`header2` payload. ASCII first, then UTF-16LE with
    /// an optional BOM — identical decision to the teacher's `decode`.
    pub fn decode_text(raw: &[u8]) -> String {
        if let Ok(txt) = String::from_utf8(raw.to_vec()) {
            return txt;
        }
        if raw.len() % 2 == 0 {
            let utf16: Vec<u16> = raw
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            if let Ok(txt) = String::from_utf16(&utf16) {
                return txt;
            }
        }
        String::new()
    }

    fn table_to_pairs(keys: &str, vals: &str) -> Vec<(String, String)> {
        keys.split('\t')
            .zip(vals.split('\t'))
            .map(|(k, v)| {
                (
                    k.trim_matches('\0').to_string(),
                    v.trim_matches('\0').to_string(),
                )
            })
            .collect()
    }

    /// Parse one `header`/`header2`/`xheader` payload and merge it in.
    /// Later calls take precedence over earlier ones for duplicate keys,
    /// matching the teacher's "header2 values overwrite duplicates from
    /// header" rule (UTF-16 beats ASCII, and xheader, parsed last, beats
    /// both).
    pub fn merge_from_payload(&mut self, raw: &[u8]) {
        let txt = Self::decode_text(raw);
        let mut lines: Vec<&str> = txt
            .split(|c| c == '\n' || c == '\r')
            .filter(|l| !l.trim().is_empty())
            .collect();

        if let Some(first) = lines.first_mut() {
            *first = first.trim_start_matches('\u{FEFF}');
        }

        let mut pairs = Vec::new();
        let mut consumed_table = false;
        for i in 0..lines.len().saturating_sub(1) {
            if lines[i].contains('\t') && lines[i + 1].contains('\t') {
                pairs = Self::table_to_pairs(lines[i], lines[i + 1]);
                consumed_table = true;
                break;
            }
        }
        if !consumed_table {
            for l in lines {
                if let Some((k, v)) = l.split_once('\t') {
                    pairs.push((
                        k.trim_matches('\0').to_string(),
                        v.trim_matches('\0').to_string(),
                    ));
                }
            }
        }

        for (k, v) in pairs {
            self.set_wire(&k, v);
        }
    }

    fn set_wire(&mut self, wire_key: &str, value: String) {
        if !self.raw.contains_key(wire_key) {
            self.order.push(wire_key.to_string());
        }
        self.raw.insert(wire_key.to_string(), value);
    }

    /// Get by wire identifier (`c`, `cn`, `ov`, …).
    pub fn get_wire(&self, wire_key: &str) -> Option<&str> {
        self.raw.get(wire_key).map(|s| s.as_str())
    }

    /// Get by canonical name (`case_number`, `description`, …), falling
    /// back across every wire alias that maps to it.
    pub fn get_canonical(&self, canonical: &str) -> Option<&str> {
        if let Some(value) = canonical_to_wire_alias(canonical).and_then(|w| self.get_wire(w)) {
            return Some(value);
        }
        // Accept whichever wire alias is present even if it isn't the
        // "preferred" one recorded in canonical_to_wire_alias (e.g. images
        // that only set `n` for evidence_number).
        for key in &self.order {
            if wire_alias_to_canonical(key) == Some(canonical) {
                return self.raw.get(key).map(|s| s.as_str());
            }
        }
        None
    }

    pub fn set_canonical(&mut self, canonical: &str, value: impl Into<String>) {
        let wire_key = canonical_to_wire_alias(canonical).unwrap_or(canonical);
        self.set_wire(wire_key, value.into());
    }

    /// Iterate wire key/value pairs in insertion order (used by
    /// `print_info`-style summaries and by the section writer).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .map(move |k| (k.as_str(), self.raw[k].as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Encode as a tab-separated two-line table in the legacy `header`
    /// wire form: `main\nkey1\tkey2\t...\nval1\tval2\t...\n\n`.
    pub fn encode_table(&self) -> String {
        let keys: Vec<&str> = self.order.iter().map(|k| k.as_str()).collect();
        let vals: Vec<&str> = keys.iter().map(|k| self.raw[*k].as_str()).collect();
        format!("1\nmain\n{}\n{}\n\n", keys.join("\t"), vals.join("\t"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tab_separated_table() {
        let mut hv = HeaderValues::new();
        hv.merge_from_payload(b"1\nmain\nc\ta\n2024-CASE\tsample description\n\n");
        assert_eq!(hv.get_wire("c"), Some("2024-CASE"));
        assert_eq!(hv.get_canonical("case_number"), Some("2024-CASE"));
        assert_eq!(hv.get_canonical("description"), Some("sample description"));
    }

    #[test]
    fn later_payload_overrides_duplicate_keys() {
        let mut hv = HeaderValues::new();
        hv.merge_from_payload(b"1\nmain\nc\n2024-OLD\n\n");
        hv.merge_from_payload(b"1\nmain\nc\n2024-NEW\n\n");
        assert_eq!(hv.get_wire("c"), Some("2024-NEW"));
    }

    #[test]
    fn decodes_utf16le_with_bom() {
        let text = "1\r\nmain\r\nc\r\ncase-1\r\n\r\n";
        let mut raw = vec![0xFFu8, 0xFE];
        for ch in text.encode_utf16() {
            raw.extend_from_slice(&ch.to_le_bytes());
        }
        let decoded = HeaderValues::decode_text(&raw);
        assert!(decoded.contains("case-1"));
    }

    #[test]
    fn encode_table_roundtrips_through_merge() {
        let mut hv = HeaderValues::new();
        hv.set_canonical("case_number", "2024-CASE");
        hv.set_canonical("examiner_name", "A. Examiner");
        let encoded = hv.encode_table();

        let mut hv2 = HeaderValues::new();
        hv2.merge_from_payload(encoded.as_bytes());
        assert_eq!(hv2.get_canonical("case_number"), Some("2024-CASE"));
        assert_eq!(hv2.get_canonical("examiner_name"), Some("A. Examiner"));
    }
}
