//! Delta Overlay (`SPEC_FULL.md` §4.9, component 13) — `.d01` "DVF" segment
//! streams carrying individual replacement chunks, read back in preference
//! to the base image's chunks.
//!
//! The teacher has no write path and no delta concept at all; grounded on
//! §4.9's payload layout and the `DVF` signature note in §4.6, reusing the
//! Section Reader/Writer envelope and the File I/O Pool.

use crate::endian::{adler32, read_u32_le, write_u32_le};
use crate::error::Error;
use crate::io_pool::FileIoPool;
use crate::section::SectionDescriptor;

/// 8-byte `DVF` signature, by analogy with the `EVF`/`LVF` signatures in §6.
pub const DVF_SIGNATURE: [u8; 8] = [0x44, 0x56, 0x46, 0x09, 0x0D, 0x0A, 0xFF, 0x00];

const DELTA_CHUNK_HEADER_SIZE: usize = 4 + 4 + 6 + 4; // index, size, padding, checksum

/// One decoded `delta_chunk` section payload.
#[derive(Debug, Clone)]
pub struct DeltaChunk {
    pub chunk_index: u32,
    pub data: Vec<u8>,
}

/// Decode one `delta_chunk` section payload: `u32 chunk_index`, `u32
/// chunk_data_size`, 6-byte padding, `u32 checksum` (header checksum over
/// the preceding 14 bytes), then `chunk_data_size` bytes, then a trailing
/// `u32` chunk checksum (Adler-32 over the chunk bytes).
pub fn decode_delta_chunk(payload: &[u8]) -> Result<DeltaChunk, Error> {
    if payload.len() < DELTA_CHUNK_HEADER_SIZE {
        return Err(Error::invalid_value("delta chunk payload too short"));
    }
    let chunk_index = read_u32_le(&payload[0..4])?;
    let chunk_data_size = read_u32_le(&payload[4..8])?;
    let header_checksum = read_u32_le(&payload[14..18])?;
    let computed = adler32(&payload[0..14]);
    if header_checksum != computed {
        return Err(Error::checksum_mismatch("delta chunk header checksum mismatch"));
    }

    let data_start = DELTA_CHUNK_HEADER_SIZE;
    let data_end = data_start + chunk_data_size as usize;
    if payload.len() < data_end + 4 {
        return Err(Error::invalid_value(
            "delta chunk payload shorter than declared chunk_data_size",
        ));
    }
    let data = payload[data_start..data_end].to_vec();
    let data_checksum = read_u32_le(&payload[data_end..data_end + 4])?;
    if data_checksum != adler32(&data) {
        return Err(Error::checksum_mismatch("delta chunk data checksum mismatch"));
    }

    Ok(DeltaChunk { chunk_index, data })
}

pub fn encode_delta_chunk(chunk: &DeltaChunk) -> Vec<u8> {
    let mut header = Vec::with_capacity(14);
    write_u32_le(&mut header, chunk.chunk_index);
    write_u32_le(&mut header, chunk.data.len() as u32);
    header.extend_from_slice(&[0u8; 6]);
    let header_checksum = adler32(&header);

    let mut out = header;
    write_u32_le(&mut out, header_checksum);
    out.extend_from_slice(&chunk.data);
    let data_checksum = adler32(&chunk.data);
    write_u32_le(&mut out, data_checksum);
    out
}

/// Read every `delta_chunk` section from one `.d01`-style segment file,
/// returning them in file order (later entries overlay earlier ones for the
/// same index, mirroring §4.9's "latest version wins").
pub fn read_delta_segment(pool: &mut FileIoPool, entry: usize) -> Result<Vec<DeltaChunk>, Error> {
    let size = pool.size(entry)?;
    let mut signature = [0u8; 13];
    pool.read_exact_at(entry, 0, &mut signature)?;
    if signature[0..8] != DVF_SIGNATURE {
        return Err(Error::invalid_value("not a DVF delta segment (bad signature)"));
    }

    let mut chunks = Vec::new();
    let mut offset = 13u64;
    while offset < size {
        let mut header_buf = vec![0u8; 76];
        pool.read_exact_at(entry, offset, &mut header_buf)?;
        let descriptor = SectionDescriptor::read(&mut std::io::Cursor::new(&header_buf), 0)
            .map(|mut d| {
                d.start_offset = offset;
                d
            })?;

        if descriptor.is_terminal() {
            break;
        }
        if descriptor.section_type == "delta_chunk" {
            let mut payload = vec![0u8; descriptor.payload_size() as usize];
            pool.read_exact_at(entry, descriptor.payload_offset(), &mut payload)?;
            chunks.push(decode_delta_chunk(&payload)?);
        }
        offset = descriptor.next_offset;
        if offset == 0 || offset <= descriptor.start_offset {
            break;
        }
    }
    Ok(chunks)
}

/// Append one delta chunk to an already-open `.d01` segment at `append_offset`,
/// returning the new end-of-file offset (the caller is the Write-IO
/// Coordinator, which tracks whether to rotate to a new delta segment by
/// size per §4.9).
pub fn append_delta_chunk(
    pool: &mut FileIoPool,
    entry: usize,
    append_offset: u64,
    chunk: &DeltaChunk,
) -> Result<u64, Error> {
    let payload = encode_delta_chunk(chunk);
    let header = SectionDescriptor::encode("delta_chunk", append_offset, 0, 76 + payload.len() as u64);
    pool.write_at(entry, append_offset, &header)?;
    pool.write_at(entry, append_offset + 76, &payload)?;
    Ok(append_offset + 76 + payload.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_delta_chunk_payload() {
        let chunk = DeltaChunk {
            chunk_index: 42,
            data: vec![1, 2, 3, 4, 5],
        };
        let encoded = encode_delta_chunk(&chunk);
        let decoded = decode_delta_chunk(&encoded).unwrap();
        assert_eq!(decoded.chunk_index, 42);
        assert_eq!(decoded.data, chunk.data);
    }

    #[test]
    fn detects_corrupted_header() {
        let chunk = DeltaChunk {
            chunk_index: 1,
            data: vec![9, 9, 9],
        };
        let mut encoded = encode_delta_chunk(&chunk);
        encoded[0] ^= 0xFF;
        assert!(decode_delta_chunk(&encoded).is_err());
    }

    #[test]
    fn write_then_read_delta_segment_roundtrips() {
        let dir = std::env::temp_dir().join(format!("ewf_delta_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scratch.d01");
        std::fs::write(&path, []).unwrap();

        let mut pool = FileIoPool::new(4);
        let entry = pool.append_handle(&path, true);
        pool.write_at(entry, 0, &DVF_SIGNATURE).unwrap();
        pool.write_at(entry, 8, &[0x01, 0x01, 0x00, 0x00, 0x00]).unwrap();

        let chunk = DeltaChunk {
            chunk_index: 7,
            data: vec![0xAA; 16],
        };
        let end = append_delta_chunk(&mut pool, entry, 13, &chunk).unwrap();
        let done = crate::section::encode_terminator("done", end, end);
        pool.write_at(entry, end, &done).unwrap();

        let chunks = read_delta_segment(&mut pool, entry).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 7);
        assert_eq!(chunks[0].data, chunk.data);

        std::fs::remove_dir_all(&dir).ok();
    }
}
