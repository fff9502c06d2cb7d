//! Chunk Table Index (`SPEC_FULL.md` §4.4, component 8) — resolves a global
//! chunk index to `(segment, file offset, size, flags)` across every
//! segment file of an image, plus `table`/`table2` cross-validation.
//!
//! Grounded on `EWF::chunks: HashMap<usize, Vec<Chunk>>` and
//! `EWF::parse_table` in the teacher's `src/ewf.rs`, which builds
//! essentially this structure but only for reads, only from `table` (never
//! cross-checks `table2`), and without the restricted/unrestricted offset
//! table distinction.

use crate::chunk::ChunkFlags;
use crate::error::Error;

/// Hard cap on offsets described by one restricted `table` section, kept
/// for EnCase compatibility per §4.4.
pub const MAX_CHUNKS_PER_RESTRICTED_SECTION: u32 = 16375;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetSource {
    Authoritative,
    Tentative,
}

/// One per-chunk entry: which segment it lives in, where, how big, and how
/// it is stored.
#[derive(Debug, Clone, Copy)]
pub struct ChunkDescriptor {
    /// Index into the File I/O Pool (or delta pool) that holds this chunk.
    pub file_io_entry: i32,
    pub file_offset: u64,
    pub size_on_disk: u32,
    pub flags: ChunkFlags,
}

impl ChunkDescriptor {
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(ChunkFlags::COMPRESSED)
    }

    pub fn is_tentative(&self) -> bool {
        self.flags.contains(ChunkFlags::TENTATIVE)
    }
}

/// One raw 32-bit `table`/`table2` offset entry before it is resolved into
/// an absolute file offset and size.
#[derive(Debug, Clone, Copy)]
pub struct RawTableEntry {
    pub compressed: bool,
    pub relative_offset: u32,
}

pub fn decode_table_entry(raw: u32) -> RawTableEntry {
    const COMPRESSED_FLAG: u32 = 0x8000_0000;
    RawTableEntry {
        compressed: raw & COMPRESSED_FLAG != 0,
        relative_offset: raw & 0x7FFF_FFFF,
    }
}

pub fn encode_table_entry(entry: RawTableEntry) -> u32 {
    let mut v = entry.relative_offset & 0x7FFF_FFFF;
    if entry.compressed {
        v |= 0x8000_0000;
    }
    v
}

/// Flat, logically-concatenated sequence of Chunk Descriptors over every
/// segment of an image, with an overlay map for delta chunks (§4.9).
#[derive(Debug, Default, Clone)]
pub struct ChunkTableIndex {
    descriptors: Vec<ChunkDescriptor>,
    /// chunk index -> descriptor pointing into the delta-overlay pool.
    delta_overlay: std::collections::HashMap<usize, ChunkDescriptor>,
}

impl ChunkTableIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn resize(&mut self, n: usize, fill: ChunkDescriptor) {
        self.descriptors.resize(n, fill);
    }

    pub fn truncate(&mut self, n: usize) {
        self.descriptors.truncate(n);
        self.delta_overlay.retain(|&idx, _| idx < n);
    }

    /// Append one descriptor discovered while parsing a `table` section (or
    /// about to be written). `source` controls whether mismatched
    /// table/table2 checksums should mark it tentative.
    pub fn push(&mut self, desc: ChunkDescriptor, source: OffsetSource) {
        let mut desc = desc;
        if source == OffsetSource::Tentative {
            desc.flags |= ChunkFlags::TENTATIVE;
        }
        self.descriptors.push(desc);
    }

    pub fn set(&mut self, chunk_index: usize, desc: ChunkDescriptor, source: OffsetSource) {
        let mut desc = desc;
        if source == OffsetSource::Tentative {
            desc.flags |= ChunkFlags::TENTATIVE;
        }
        if chunk_index >= self.descriptors.len() {
            self.descriptors.resize(
                chunk_index + 1,
                ChunkDescriptor {
                    file_io_entry: -1,
                    file_offset: 0,
                    size_on_disk: 1,
                    flags: ChunkFlags::default(),
                },
            );
        }
        self.descriptors[chunk_index] = desc;
    }

    /// Overlay a delta-chunk replacement; it takes precedence in `get`.
    pub fn set_delta(&mut self, chunk_index: usize, desc: ChunkDescriptor) {
        let mut desc = desc;
        desc.flags |= ChunkFlags::DELTA;
        self.delta_overlay.insert(chunk_index, desc);
    }

    /// Resolve a global chunk index, preferring the delta overlay.
    pub fn get(&self, chunk_index: usize) -> Result<ChunkDescriptor, Error> {
        if let Some(desc) = self.delta_overlay.get(&chunk_index) {
            return Ok(*desc);
        }
        self.descriptors
            .get(chunk_index)
            .copied()
            .ok_or_else(|| Error::invalid_value(format!("chunk index {} out of range", chunk_index)))
    }

    pub fn has_delta(&self, chunk_index: usize) -> bool {
        self.delta_overlay.contains_key(&chunk_index)
    }

    /// Cap on how many chunks one `table` section may describe, per the
    /// `unrestrict_offset_table` setting.
    pub fn maximum_chunks_per_section(unrestrict_offset_table: bool, number_of_chunks: u32) -> u32 {
        if unrestrict_offset_table {
            number_of_chunks.max(1)
        } else {
            MAX_CHUNKS_PER_RESTRICTED_SECTION
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(offset: u64, compressed: bool) -> ChunkDescriptor {
        ChunkDescriptor {
            file_io_entry: 0,
            file_offset: offset,
            size_on_disk: 100,
            flags: if compressed {
                ChunkFlags::COMPRESSED
            } else {
                ChunkFlags::PACKED_WITH_CHECKSUM
            },
        }
    }

    #[test]
    fn table_entry_roundtrip() {
        let raw = encode_table_entry(RawTableEntry {
            compressed: true,
            relative_offset: 12345,
        });
        let decoded = decode_table_entry(raw);
        assert!(decoded.compressed);
        assert_eq!(decoded.relative_offset, 12345);
    }

    #[test]
    fn delta_overlay_takes_precedence() {
        let mut index = ChunkTableIndex::new();
        index.push(desc(0, false), OffsetSource::Authoritative);
        index.set_delta(0, desc(999, true));
        let resolved = index.get(0).unwrap();
        assert_eq!(resolved.file_offset, 999);
        assert!(resolved.flags.contains(ChunkFlags::DELTA));
    }

    #[test]
    fn tentative_flag_set_on_fallback_source() {
        let mut index = ChunkTableIndex::new();
        index.push(desc(0, false), OffsetSource::Tentative);
        assert!(index.get(0).unwrap().is_tentative());
    }

    #[test]
    fn out_of_range_is_an_error() {
        let index = ChunkTableIndex::new();
        assert!(index.get(0).is_err());
    }

    #[test]
    fn restricted_cap_is_16375() {
        assert_eq!(
            ChunkTableIndex::maximum_chunks_per_section(false, 999_999),
            16375
        );
        assert_eq!(
            ChunkTableIndex::maximum_chunks_per_section(true, 50),
            50
        );
    }
}
