//! Segment File Engine (`SPEC_FULL.md` §4.6, component 10) — composes the
//! Section Reader/Writer and Chunk Table Index into a full segment file:
//! the section state machine, in both read and write directions.
//!
//! The teacher's `EWF::parse_file` in `src/ewf.rs` walks a single format's
//! section chain (`header`/`volume`/`sectors`/`table`/`next`/`done`) but
//! never writes one and never handles `header2`/`xheader`/`digest`/`hash`/
//! `session`/`error2`/`ltree`; this module generalises that walk to the
//! full state machine in §4.6 and adds the write direction the read-only
//! teacher never needed.

use crate::chunk::{ChunkFlags, PackedChunk};
use crate::chunk_table::{decode_table_entry, encode_table_entry, ChunkDescriptor, RawTableEntry};
use crate::endian::{adler32, read_u32_le, read_u64_le, write_u32_le, write_u64_le};
use crate::error::Error;
use crate::io_pool::FileIoPool;
use crate::section::SectionDescriptor;
use std::io::Cursor;

pub const EVF_SIGNATURE: [u8; 8] = [0x45, 0x56, 0x46, 0x09, 0x0D, 0x0A, 0xFF, 0x00];
pub const LVF_SIGNATURE: [u8; 8] = [0x4C, 0x56, 0x46, 0x09, 0x0D, 0x0A, 0xFF, 0x00];
pub const SEGMENT_FILE_HEADER_SIZE: u64 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVariant {
    Ewf,
    Ex01,
    Smart,
    Logical,
    EwfX,
}

impl FormatVariant {
    /// Name the `volume`/`disk`/`data` media-values section carries for
    /// this variant's first segment, per §4.6.
    pub fn media_section_name(self) -> &'static str {
        match self {
            FormatVariant::Smart => "volume",
            FormatVariant::Logical => "volume", // L01 carries a stripped-down volume section too
            _ => "disk",
        }
    }

    pub fn continuation_section_name(self) -> &'static str {
        "data"
    }
}

/// Decode the 13-byte per-segment file header (§6).
pub fn read_segment_header(pool: &mut FileIoPool, entry: usize) -> Result<(bool, u16), Error> {
    let mut raw = [0u8; SEGMENT_FILE_HEADER_SIZE as usize];
    pool.read_exact_at(entry, 0, &mut raw)?;
    let is_lvf = match raw[0..8] {
        _ if raw[0..8] == EVF_SIGNATURE => false,
        _ if raw[0..8] == LVF_SIGNATURE => true,
        _ => {
            return Err(Error::invalid_value("segment file has an unrecognised signature"));
        }
    };
    let segment_number = u16::from_le_bytes([raw[9], raw[10]]);
    Ok((is_lvf, segment_number))
}

pub fn encode_segment_header(is_lvf: bool, segment_number: u16) -> [u8; SEGMENT_FILE_HEADER_SIZE as usize] {
    let mut raw = [0u8; SEGMENT_FILE_HEADER_SIZE as usize];
    raw[0..8].copy_from_slice(if is_lvf { &LVF_SIGNATURE } else { &EVF_SIGNATURE });
    raw[8] = 0x01;
    raw[9..11].copy_from_slice(&segment_number.to_le_bytes());
    raw[11] = 0x00;
    raw[12] = 0x00;
    raw
}

/// A fully walked segment file: every section descriptor in file order.
#[derive(Debug, Clone)]
pub struct SegmentFile {
    pub entry: usize,
    pub is_lvf: bool,
    pub segment_number: u16,
    pub sections: Vec<SectionDescriptor>,
}

impl SegmentFile {
    pub fn first_of_type(&self, section_type: &str) -> Option<&SectionDescriptor> {
        self.sections.iter().find(|s| s.section_type == section_type)
    }

    pub fn all_of_type<'a>(&'a self, section_type: &'a str) -> impl Iterator<Item = &'a SectionDescriptor> {
        self.sections.iter().filter(move |s| s.section_type == section_type)
    }

    pub fn last(&self) -> Option<&SectionDescriptor> {
        self.sections.last()
    }
}

/// Walk a segment file's section chain starting right after the 13-byte
/// file header, following `next_offset` until a terminal `done`/`next`.
pub fn open_read(pool: &mut FileIoPool, entry: usize) -> Result<SegmentFile, Error> {
    let (is_lvf, segment_number) = read_segment_header(pool, entry)?;
    let size = pool.size(entry)?;

    let mut sections = Vec::new();
    let mut offset = SEGMENT_FILE_HEADER_SIZE;
    loop {
        if offset + 76 > size {
            break;
        }
        let mut raw = vec![0u8; 76];
        pool.read_exact_at(entry, offset, &mut raw)?;
        let mut descriptor = SectionDescriptor::read(&mut Cursor::new(&raw), 0)?;
        descriptor.start_offset = offset;
        let is_terminal = descriptor.is_terminal();
        let next_offset = descriptor.next_offset;
        sections.push(descriptor);
        if is_terminal {
            break;
        }
        if next_offset <= offset {
            return Err(Error::invalid_value(format!(
                "section chain does not advance at offset {:#x}",
                offset
            )));
        }
        offset = next_offset;
    }

    Ok(SegmentFile {
        entry,
        is_lvf,
        segment_number,
        sections,
    })
}

pub fn read_payload(pool: &mut FileIoPool, entry: usize, descriptor: &SectionDescriptor) -> Result<Vec<u8>, Error> {
    let mut payload = vec![0u8; descriptor.payload_size() as usize];
    pool.read_exact_at(entry, descriptor.payload_offset(), &mut payload)?;
    Ok(payload)
}

/// Decoded `table`/`table2` section: header fields plus the resolved
/// absolute-offset chunk descriptors it describes, per §6's `table`
/// layout and §4.4's MSB-compressed-flag convention.
pub struct DecodedTable {
    pub base_offset: u64,
    pub entries: Vec<RawTableEntry>,
}

pub fn decode_table_payload(payload: &[u8]) -> Result<DecodedTable, Error> {
    if payload.len() < 24 {
        return Err(Error::invalid_value("table section payload too short"));
    }
    let number_of_offsets = read_u32_le(&payload[0..4])?;
    let base_offset = read_u64_le(&payload[8..16])?;
    let header_checksum = read_u32_le(&payload[20..24])?;
    let computed_header_checksum = adler32(&payload[0..20]);
    if header_checksum != computed_header_checksum {
        return Err(Error::checksum_mismatch("table section header checksum mismatch"));
    }

    let entries_start = 24;
    let entries_end = entries_start + number_of_offsets as usize * 4;
    if payload.len() < entries_end + 4 {
        return Err(Error::invalid_value(
            "table section payload too short for declared offset count",
        ));
    }
    let entries_bytes = &payload[entries_start..entries_end];
    let data_checksum = read_u32_le(&payload[entries_end..entries_end + 4])?;
    if data_checksum != adler32(entries_bytes) {
        return Err(Error::checksum_mismatch("table section data checksum mismatch"));
    }

    let entries = entries_bytes
        .chunks_exact(4)
        .map(|c| decode_table_entry(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
        .collect();

    Ok(DecodedTable { base_offset, entries })
}

pub fn encode_table_payload(base_offset: u64, entries: &[RawTableEntry]) -> Vec<u8> {
    let mut header = Vec::with_capacity(24);
    write_u32_le(&mut header, entries.len() as u32);
    write_u32_le(&mut header, 0);
    write_u64_le(&mut header, base_offset);
    write_u32_le(&mut header, 0);
    let header_checksum = adler32(&header);
    write_u32_le(&mut header, header_checksum);

    let mut entry_bytes = Vec::with_capacity(entries.len() * 4);
    for entry in entries {
        write_u32_le(&mut entry_bytes, encode_table_entry(*entry));
    }
    let data_checksum = adler32(&entry_bytes);

    let mut out = header;
    out.extend_from_slice(&entry_bytes);
    write_u32_le(&mut out, data_checksum);
    out
}

/// Resolve a decoded `table`'s entries to absolute `ChunkDescriptor`s,
/// deriving each entry's on-disk size from the next entry's offset (or the
/// enclosing `sectors` section's end for the last entry), per §4.4.
pub fn resolve_table_entries(
    table: &DecodedTable,
    file_io_entry: i32,
    sectors_section_end: u64,
) -> Vec<ChunkDescriptor> {
    let mut out = Vec::with_capacity(table.entries.len());
    for (i, entry) in table.entries.iter().enumerate() {
        let absolute_offset = table.base_offset + entry.relative_offset as u64;
        let next_absolute = table
            .entries
            .get(i + 1)
            .map(|e| table.base_offset + e.relative_offset as u64)
            .unwrap_or(sectors_section_end);
        let size_on_disk = next_absolute.saturating_sub(absolute_offset).max(1) as u32;

        let mut flags = ChunkFlags::default();
        if entry.compressed {
            flags |= ChunkFlags::COMPRESSED;
        } else {
            flags |= ChunkFlags::PACKED_WITH_CHECKSUM;
        }
        out.push(ChunkDescriptor {
            file_io_entry,
            file_offset: absolute_offset,
            size_on_disk,
            flags,
        });
    }
    out
}

/// What to do with a segment's tail when reopening an interrupted write,
/// per `SPEC_FULL.md` §4.8's classification table over the last section's
/// type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeAction {
    /// The last segment is complete (`done`/`next`); start a fresh one.
    StartFreshSegment,
    /// Truncate the last segment's backing file to this offset and resume
    /// writing a chunks section there.
    TruncateToOffset(u64),
}

/// Classify where to resume writing a segment whose last section is
/// `segment.last()`, per §4.8. Returns `None` only for a segment with no
/// sections at all (a bare 13-byte header), in which case the caller
/// should resume right after the header.
pub fn classify_resume_point(segment: &SegmentFile) -> ResumeAction {
    let last = match segment.last() {
        Some(s) => s,
        None => return ResumeAction::TruncateToOffset(SEGMENT_FILE_HEADER_SIZE),
    };
    let idx = segment.sections.len() - 1;
    let preceding = &segment.sections[..idx];

    match last.section_type.as_str() {
        "done" | "next" => ResumeAction::StartFreshSegment,
        "data" | "hash" | "xhash" | "digest" | "error2" | "session" => {
            let boundary = preceding
                .iter()
                .rev()
                .find(|s| s.section_type == "table2" || s.section_type == "table")
                .map(|s| s.next_offset)
                .unwrap_or(SEGMENT_FILE_HEADER_SIZE);
            ResumeAction::TruncateToOffset(boundary)
        }
        "table2" => {
            let boundary = preceding
                .iter()
                .rev()
                .find(|s| s.section_type == "table")
                .map(|s| s.start_offset)
                .unwrap_or(last.start_offset);
            ResumeAction::TruncateToOffset(boundary)
        }
        "table" => {
            let boundary = preceding
                .iter()
                .rev()
                .find(|s| s.section_type == "sectors")
                .map(|s| s.start_offset)
                .unwrap_or(last.start_offset);
            ResumeAction::TruncateToOffset(boundary)
        }
        "sectors" => ResumeAction::TruncateToOffset(last.start_offset),
        _ => ResumeAction::TruncateToOffset(last.start_offset),
    }
}

/// Accumulates one chunks-section (`sectors` + `table` + `table2`) while
/// writing: packed chunk bytes plus the relative-offset table entries that
/// describe them, per §4.6/§4.7.
#[derive(Default)]
pub struct ChunksSectionBuilder {
    sectors_payload: Vec<u8>,
    entries: Vec<RawTableEntry>,
}

impl ChunksSectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, packed: &PackedChunk) {
        self.entries.push(RawTableEntry {
            compressed: packed.flags.contains(ChunkFlags::COMPRESSED),
            relative_offset: self.sectors_payload.len() as u32,
        });
        self.sectors_payload.extend_from_slice(&packed.bytes);
    }

    pub fn chunk_count(&self) -> usize {
        self.entries.len()
    }

    /// Relative offset the next pushed chunk will land at, used by a caller
    /// (the Write-IO Coordinator) that needs to compute a chunk's absolute
    /// file offset before it is actually pushed.
    pub fn next_relative_offset(&self) -> u32 {
        self.sectors_payload.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write `sectors`, `table`, `table2` in sequence at `start_offset`,
    /// returning the offset right after `table2` (where the caller appends
    /// whatever comes next).
    pub fn write(&self, pool: &mut FileIoPool, entry: usize, start_offset: u64) -> Result<u64, Error> {
        let sectors_next = start_offset + 76 + self.sectors_payload.len() as u64;
        let header = SectionDescriptor::encode(
            "sectors",
            start_offset,
            sectors_next,
            76 + self.sectors_payload.len() as u64,
        );
        pool.write_at(entry, start_offset, &header)?;
        pool.write_at(entry, start_offset + 76, &self.sectors_payload)?;

        let table_payload = encode_table_payload(start_offset + 76, &self.entries);
        let table_start = sectors_next;
        let table_next = table_start + 76 + table_payload.len() as u64;
        let table_header = SectionDescriptor::encode(
            "table",
            table_start,
            table_next,
            76 + table_payload.len() as u64,
        );
        pool.write_at(entry, table_start, &table_header)?;
        pool.write_at(entry, table_start + 76, &table_payload)?;

        let table2_start = table_next;
        let table2_next = table2_start + 76 + table_payload.len() as u64;
        let table2_header = SectionDescriptor::encode(
            "table2",
            table2_start,
            table2_next,
            76 + table_payload.len() as u64,
        );
        pool.write_at(entry, table2_start, &table2_header)?;
        pool.write_at(entry, table2_start + 76, &table_payload)?;

        Ok(table2_next)
    }

    /// Byte budget this chunks-section will occupy once written, used by
    /// the Write-IO Coordinator's segment/section-full tests (§4.7).
    pub fn byte_size(&self) -> u64 {
        let table_payload_size = 24 + self.entries.len() as u64 * 4 + 4;
        76 + self.sectors_payload.len() as u64 + 2 * (76 + table_payload_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionLevel;

    #[test]
    fn segment_header_roundtrips() {
        let raw = encode_segment_header(false, 3);
        let mut pool = FileIoPool::new(2);
        let dir = std::env::temp_dir().join(format!("ewf_seg_hdr_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("t.E01");
        std::fs::write(&path, raw).unwrap();
        let entry = pool.append_handle(&path, false);
        let (is_lvf, segment_number) = read_segment_header(&mut pool, entry).unwrap();
        assert!(!is_lvf);
        assert_eq!(segment_number, 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn chunks_section_roundtrips_through_table() {
        let dir = std::env::temp_dir().join(format!("ewf_seg_chunks_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("t.E01");
        std::fs::write(&path, []).unwrap();
        let mut pool = FileIoPool::new(2);
        let entry = pool.append_handle(&path, true);

        let mut builder = ChunksSectionBuilder::new();
        let packed1 = crate::chunk::pack(&[1u8; 64], CompressionLevel::None, false, None).unwrap();
        let packed2 = crate::chunk::pack(&[2u8; 64], CompressionLevel::None, false, None).unwrap();
        builder.push_chunk(&packed1);
        builder.push_chunk(&packed2);
        let end = builder.write(&mut pool, entry, 13).unwrap();

        let done = crate::section::encode_terminator("done", end, end);
        pool.write_at(entry, end, &done).unwrap();
        pool.write_at(entry, 0, &encode_segment_header(false, 1)).unwrap();

        let segment = open_read(&mut pool, entry).unwrap();
        let table_section = segment.first_of_type("table").unwrap().clone();
        let payload = read_payload(&mut pool, entry, &table_section).unwrap();
        let decoded = decode_table_payload(&payload).unwrap();
        assert_eq!(decoded.entries.len(), 2);

        let sectors_section = segment.first_of_type("sectors").unwrap();
        let descriptors = resolve_table_entries(&decoded, entry as i32, sectors_section.end_offset());
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].file_offset, sectors_section.payload_offset());

        std::fs::remove_dir_all(&dir).ok();
    }

    fn descriptor(section_type: &str, start_offset: u64, next_offset: u64) -> SectionDescriptor {
        SectionDescriptor {
            section_type: section_type.to_string(),
            start_offset,
            next_offset,
            size: next_offset.saturating_sub(start_offset),
            checksum: 0,
        }
    }

    fn fake_segment(sections: Vec<SectionDescriptor>) -> SegmentFile {
        SegmentFile {
            entry: 0,
            is_lvf: false,
            segment_number: 1,
            sections,
        }
    }

    #[test]
    fn resume_after_done_starts_a_fresh_segment() {
        let segment = fake_segment(vec![descriptor("done", 500, 500)]);
        assert_eq!(classify_resume_point(&segment), ResumeAction::StartFreshSegment);
    }

    #[test]
    fn resume_after_bare_table_drops_back_to_sectors_start() {
        let segment = fake_segment(vec![
            descriptor("header", 13, 100),
            descriptor("volume", 100, 200),
            descriptor("sectors", 200, 400),
            descriptor("table", 400, 500),
        ]);
        assert_eq!(classify_resume_point(&segment), ResumeAction::TruncateToOffset(200));
    }

    #[test]
    fn resume_after_table2_drops_back_to_table_start() {
        let segment = fake_segment(vec![
            descriptor("sectors", 200, 400),
            descriptor("table", 400, 460),
            descriptor("table2", 460, 520),
        ]);
        assert_eq!(classify_resume_point(&segment), ResumeAction::TruncateToOffset(400));
    }

    #[test]
    fn resume_after_trailing_metadata_drops_back_to_end_of_table2() {
        let segment = fake_segment(vec![
            descriptor("sectors", 200, 400),
            descriptor("table", 400, 460),
            descriptor("table2", 460, 520),
            descriptor("session", 520, 560),
        ]);
        assert_eq!(classify_resume_point(&segment), ResumeAction::TruncateToOffset(520));
    }

    #[test]
    fn resume_after_bare_sectors_drops_the_whole_section() {
        let segment = fake_segment(vec![descriptor("header", 13, 100), descriptor("sectors", 100, 300)]);
        assert_eq!(classify_resume_point(&segment), ResumeAction::TruncateToOffset(100));
    }
}
