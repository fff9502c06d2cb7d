//! Chunk Codec (`SPEC_FULL.md` §4.3, component 4) — packs/unpacks a single
//! chunk: optional compression, trailing 32-bit checksum, the "empty block"
//! fast path, and the EWF-S01 uncompressed-fallback rule.
//!
//! The teacher's `read_chunk` in `src/ewf.rs` only implements the unpack
//! half (decompress-if-compressed); the pack half and the empty-block
//! template are new, grounded on `libewf_chunk_data` / the write-coordinator
//! behaviour described in `original_source/libewf/libewf_write_io_handle.c`.

use crate::compression::{self, CompressionLevel};
use crate::endian::adler32;
use crate::error::Error;

/// Mirrors the Chunk Descriptor `flags` field in §3. Plain bitmask rather
/// than a crate-provided flags type, matching the teacher's preference for
/// simple fields (`compressed: bool`) over external flag abstractions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkFlags(pub u32);

impl ChunkFlags {
    pub const COMPRESSED: ChunkFlags = ChunkFlags(0x0000_0001);
    pub const DELTA: ChunkFlags = ChunkFlags(0x0000_0002);
    pub const TENTATIVE: ChunkFlags = ChunkFlags(0x0000_0004);
    pub const PACKED_WITH_CHECKSUM: ChunkFlags = ChunkFlags(0x0000_0008);

    pub fn contains(self, other: ChunkFlags) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for ChunkFlags {
    type Output = ChunkFlags;
    fn bitor(self, rhs: ChunkFlags) -> ChunkFlags {
        ChunkFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ChunkFlags {
    fn bitor_assign(&mut self, rhs: ChunkFlags) {
        self.0 |= rhs.0;
    }
}

/// Result of packing one chunk for storage.
pub struct PackedChunk {
    pub bytes: Vec<u8>,
    pub flags: ChunkFlags,
}

/// Precomputes the compressed representation of an all-zero chunk so that
/// all-zero chunks (sparse regions, trimmed SSD images, …) can be emitted
/// without running the codec on every write — the "empty-block fast path".
pub struct EmptyBlockTemplate {
    chunk_size: usize,
    compressed: Vec<u8>,
}

impl EmptyBlockTemplate {
    pub fn new(chunk_size: usize, level: CompressionLevel) -> Result<Self, Error> {
        let zeros = vec![0u8; chunk_size];
        let compressed = compression::compress(&zeros, level)?;
        Ok(EmptyBlockTemplate {
            chunk_size,
            compressed,
        })
    }

    fn matches(&self, input: &[u8]) -> bool {
        input.len() == self.chunk_size && input.iter().all(|&b| b == 0)
    }
}

/// Pack `input` (a logical chunk, possibly shorter than `chunk_size` for the
/// final chunk of an image) for storage.
///
/// Mirrors the decision tree in §4.3: empty-block fast path, then
/// compress-if-smaller, then fall back to uncompressed-plus-checksum when
/// compression does not pay for itself.
pub fn pack(
    input: &[u8],
    level: CompressionLevel,
    compression_enabled: bool,
    empty_template: Option<&EmptyBlockTemplate>,
) -> Result<PackedChunk, Error> {
    if let Some(template) = empty_template {
        if template.matches(input) {
            return Ok(PackedChunk {
                bytes: template.compressed.clone(),
                flags: ChunkFlags::COMPRESSED,
            });
        }
    }

    if compression_enabled {
        let compressed = compression::compress(input, level)?;
        // Only worth it if strictly smaller than storing raw + checksum.
        if compressed.len() < input.len() + 4 {
            return Ok(PackedChunk {
                bytes: compressed,
                flags: ChunkFlags::COMPRESSED,
            });
        }
    }

    let mut bytes = Vec::with_capacity(input.len() + 4);
    bytes.extend_from_slice(input);
    let checksum = adler32(input);
    bytes.extend_from_slice(&checksum.to_le_bytes());
    Ok(PackedChunk {
        bytes,
        flags: ChunkFlags::PACKED_WITH_CHECKSUM,
    })
}

/// Outcome of unpacking a chunk: either the verified/decompressed bytes, or
/// a checksum mismatch that the caller (Read-IO Coordinator) must record and
/// resolve per its zero-on-error policy.
pub enum UnpackOutcome {
    Ok(Vec<u8>),
    ChecksumMismatch { raw: Vec<u8> },
}

/// Unpack one on-disk chunk. `on_disk` is exactly the stored bytes (for
/// compressed chunks, the deflate stream; for raw chunks, payload + 4-byte
/// trailing checksum).
pub fn unpack(on_disk: &[u8], flags: ChunkFlags) -> Result<UnpackOutcome, Error> {
    if flags.contains(ChunkFlags::COMPRESSED) {
        let data = compression::decompress(on_disk)?;
        return Ok(UnpackOutcome::Ok(data));
    }

    if on_disk.len() < 4 {
        return Err(Error::invalid_value(
            "uncompressed chunk shorter than its trailing checksum",
        ));
    }
    let (payload, checksum_bytes) = on_disk.split_at(on_disk.len() - 4);
    let stored_checksum = u32::from_le_bytes(checksum_bytes.try_into().unwrap());
    let computed = adler32(payload);
    if stored_checksum == computed {
        Ok(UnpackOutcome::Ok(payload.to_vec()))
    } else {
        Ok(UnpackOutcome::ChecksumMismatch {
            raw: payload.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_for_every_level() {
        let chunk_size = 4096;
        for level in [CompressionLevel::None, CompressionLevel::Fast, CompressionLevel::Best] {
            let mut data = vec![0u8; chunk_size];
            for (i, b) in data.iter_mut().enumerate() {
                *b = (i % 251) as u8;
            }
            let packed = pack(&data, level, true, None).unwrap();
            let unpacked = unpack(&packed.bytes, packed.flags).unwrap();
            match unpacked {
                UnpackOutcome::Ok(bytes) => assert_eq!(bytes, data),
                UnpackOutcome::ChecksumMismatch { .. } => panic!("unexpected mismatch"),
            }
        }
    }

    #[test]
    fn trailing_checksum_matches_adler32() {
        let data = vec![0x7Au8; 128];
        let packed = pack(&data, CompressionLevel::None, false, None).unwrap();
        assert!(packed.flags.contains(ChunkFlags::PACKED_WITH_CHECKSUM));
        let (payload, checksum_bytes) = packed.bytes.split_at(packed.bytes.len() - 4);
        let checksum = u32::from_le_bytes(checksum_bytes.try_into().unwrap());
        assert_eq!(checksum, adler32(payload));
    }

    #[test]
    fn empty_block_uses_template() {
        let chunk_size = 32768;
        let template = EmptyBlockTemplate::new(chunk_size, CompressionLevel::Fast).unwrap();
        let zeros = vec![0u8; chunk_size];
        let packed = pack(&zeros, CompressionLevel::Fast, true, Some(&template)).unwrap();
        assert_eq!(packed.bytes, template.compressed);
    }

    #[test]
    fn checksum_mismatch_is_reported_not_errored() {
        let data = vec![1u8, 2, 3, 4];
        let mut packed = pack(&data, CompressionLevel::None, false, None).unwrap();
        let last = packed.bytes.len() - 1;
        packed.bytes[last] ^= 0xFF;
        match unpack(&packed.bytes, packed.flags).unwrap() {
            UnpackOutcome::ChecksumMismatch { raw } => assert_eq!(raw, data),
            UnpackOutcome::Ok(_) => panic!("expected checksum mismatch"),
        }
    }
}
