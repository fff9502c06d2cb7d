//! Section Reader/Writer (`SPEC_FULL.md` §4.2) — the typed, checksummed
//! envelope that precedes every section's payload.
//!
//! Grounded on `EwfSectionDescriptor` in the teacher's `src/ewf.rs`, extended
//! with checksum validation (the teacher parses the descriptor but discards
//! `_checksum` unchecked) and a writer, which the read-only teacher has no
//! counterpart for.

use crate::endian::{adler32, read_u32_le, read_u64_le, write_u32_le, write_u64_le};
use crate::error::{Domain, Error, Kind};
use std::io::{Read, Seek, SeekFrom, Write};

/// Total on-disk size of a section descriptor.
pub const SECTION_DESCRIPTOR_SIZE: u64 = 76;
const TYPE_FIELD_SIZE: usize = 16;
const PAD_SIZE: usize = 40;

/// A parsed section header plus enough bookkeeping to locate its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDescriptor {
    pub section_type: String,
    pub start_offset: u64,
    pub next_offset: u64,
    /// Size of the section including this 76-byte descriptor.
    pub size: u64,
    pub checksum: u32,
}

impl SectionDescriptor {
    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.size
    }

    pub fn payload_offset(&self) -> u64 {
        self.start_offset + SECTION_DESCRIPTOR_SIZE
    }

    pub fn payload_size(&self) -> u64 {
        self.size.saturating_sub(SECTION_DESCRIPTOR_SIZE)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.section_type.as_str(), "done" | "next")
    }

    /// Read and validate the descriptor located at `offset`.
    pub fn read<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<Self, Error> {
        reader.seek(SeekFrom::Start(offset))?;
        let mut raw = [0u8; SECTION_DESCRIPTOR_SIZE as usize];
        reader.read_exact(&mut raw)?;

        let mut type_field = [0u8; TYPE_FIELD_SIZE];
        type_field.copy_from_slice(&raw[0..TYPE_FIELD_SIZE]);
        let mut section_type = String::from_utf8_lossy(&type_field).into_owned();
        section_type = section_type.trim_end_matches('\0').to_string();

        let next_offset = read_u64_le(&raw[16..24])?;
        let size = read_u64_le(&raw[24..32])?;
        let checksum = read_u32_le(&raw[72..76])?;

        let computed = adler32(&raw[0..72]);
        if computed != checksum {
            return Err(Error::checksum_mismatch(format!(
                "section descriptor at offset {:#x} ('{}'): checksum {:#x} != computed {:#x}",
                offset, section_type, checksum, computed
            )));
        }

        Ok(SectionDescriptor {
            section_type,
            start_offset: offset,
            next_offset,
            size,
            checksum,
        })
    }

    /// Serialise this descriptor (without validating it first — used by the
    /// writer, which always computes a fresh checksum).
    pub fn encode(section_type: &str, start_offset: u64, next_offset: u64, size: u64) -> Vec<u8> {
        let mut raw = vec![0u8; SECTION_DESCRIPTOR_SIZE as usize];
        let type_bytes = section_type.as_bytes();
        let copy_len = type_bytes.len().min(TYPE_FIELD_SIZE);
        raw[0..copy_len].copy_from_slice(&type_bytes[0..copy_len]);

        let mut tail = Vec::with_capacity(16);
        write_u64_le(&mut tail, next_offset);
        write_u64_le(&mut tail, size);
        raw[16..32].copy_from_slice(&tail);
        // bytes [32..72) are the 40-byte zero pad, already zeroed.
        let _ = PAD_SIZE;

        let checksum = adler32(&raw[0..72]);
        let mut checksum_bytes = Vec::with_capacity(4);
        write_u32_le(&mut checksum_bytes, checksum);
        raw[72..76].copy_from_slice(&checksum_bytes);

        let _ = start_offset; // kept for API symmetry with `read`
        raw
    }

    /// Write a section descriptor followed by `payload` and return the
    /// total number of bytes written (descriptor + payload).
    pub fn write<W: Write>(
        writer: &mut W,
        section_type: &str,
        start_offset: u64,
        next_offset: u64,
        payload: &[u8],
    ) -> Result<u64, Error> {
        let size = SECTION_DESCRIPTOR_SIZE + payload.len() as u64;
        let header = Self::encode(section_type, start_offset, next_offset, size);
        writer.write_all(&header)?;
        writer.write_all(payload)?;
        Ok(size)
    }
}

/// Builds a `done` or `next` terminator section (no payload).
pub fn encode_terminator(section_type: &str, start_offset: u64, next_offset: u64) -> Vec<u8> {
    SectionDescriptor::encode(section_type, start_offset, next_offset, SECTION_DESCRIPTOR_SIZE)
}

pub fn validate_known_type(section_type: &str) -> Result<(), Error> {
    const KNOWN: &[&str] = &[
        "header", "header2", "xheader", "volume", "disk", "data", "sectors", "table", "table2",
        "digest", "hash", "error2", "session", "ltree", "next", "done", "delta_chunk",
    ];
    if KNOWN.contains(&section_type) {
        Ok(())
    } else {
        Err(Error::new(
            Domain::Input,
            Kind::UnsupportedValue,
            format!("unknown section type '{}'", section_type),
        ))
    }
}
