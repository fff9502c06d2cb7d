//! Handle Facade (`SPEC_FULL.md` §4.11/§6, component 17) — the public
//! object a caller actually holds: open/create/close/clone, buffered and
//! random reads, buffered writes, header/hash/session/track getters and
//! setters, delta-overlay attach, and glob-based multi-segment discovery.
//!
//! The teacher's `Body`/`BodyFormat` in `src/lib.rs` plays this exact role
//! for its three read-only formats (`new`, `new_from`, `Read`+`Seek`,
//! `Clone` via `RAW`'s `File::try_clone`), and `EWF::find_files` in
//! `src/ewf.rs` is the direct precedent for glob-based segment discovery;
//! this module generalises both to the full read/write/delta/CUE surface
//! the rest of the crate's components were built for.

use crate::acquisition::{self, RangeList};
use crate::chunk::{self, ChunkFlags, EmptyBlockTemplate, PackedChunk};
use crate::chunk_table::{ChunkDescriptor, ChunkTableIndex, OffsetSource};
use crate::compression::{self, CompressionLevel};
use crate::delta::{self, DeltaChunk};
use crate::error::Error;
use crate::filename::{self, FormatFamily};
use crate::hash_values::HashValues;
use crate::header_values::HeaderValues;
use crate::io_pool::{self, FileIoPool};
use crate::ltree::LogicalFileEntry;
use crate::media_values::MediaValues;
use crate::odraw;
use crate::read_io::{ErrorPolicy, ReadIoCoordinator};
use crate::section::{self, SectionDescriptor};
use crate::segment::{self, ChunksSectionBuilder, FormatVariant, SegmentFile};
use crate::write_io::{WriteIoConfig, WriteIoState};
use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// A CD sector as treated by the CUE/TOC raw-passthrough read path.
const CD_SECTOR_SIZE: u32 = 2352;

/// Running state for a handle opened for writing; absent on read-only and
/// CUE/TOC-backed handles.
struct WriteState {
    config: WriteIoConfig,
    state: WriteIoState,
    builder: ChunksSectionBuilder,
    pending: Vec<u8>,
    family: FormatFamily,
    segment_number: u16,
    current_entry: usize,
    cursor: u64,
    chunks_section_start: u64,
    header_written: bool,
    total_chunks_written: u32,
    total_chunks_hint: Option<u32>,
    compression_level: CompressionLevel,
    compression_enabled: bool,
    empty_template: Option<EmptyBlockTemplate>,
}

/// The public handle: every lower component unified behind one object, per
/// §6's external-interface table.
pub struct EwfHandle {
    pool: FileIoPool,
    segments: Vec<SegmentFile>,
    format_variant: FormatVariant,
    media: MediaValues,
    header_values: HeaderValues,
    hash_values: HashValues,
    sessions: RangeList,
    tracks: RangeList,
    acquisition_errors: RangeList,
    chunk_table: ChunkTableIndex,
    read_io: ReadIoCoordinator,
    ltree_root: Option<LogicalFileEntry>,
    write: Option<WriteState>,
    delta_pool: Option<FileIoPool>,
    delta_entry: Option<usize>,
    delta_chunks: HashMap<usize, Vec<u8>>,
    raw_sector_mode: bool,
    abort: AtomicBool,
    base_name: String,
}

/// Guess the base name (directory + stem, minus the three-letter
/// extension) and format family from the first segment path a caller
/// names, mirroring the teacher's `find_files` precedent.
fn detect_family(path: &Path) -> Result<(String, FormatFamily), Error> {
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| Error::invalid_value("path has no file name"))?;
    if filename.len() < 4 {
        return Err(Error::invalid_value(
            "file name is too short to carry a segment extension",
        ));
    }
    let split_at = filename.len() - 3;
    let stem = &filename[..split_at.saturating_sub(1)];
    let ext = &filename[split_at..];
    let leading = ext
        .chars()
        .next()
        .ok_or_else(|| Error::invalid_value("file name has no extension"))?;
    let family = match leading {
        'E' | 'e' => FormatFamily::Ewf,
        'L' | 'l' => FormatFamily::Logical,
        'S' | 's' => FormatFamily::Smart,
        'D' | 'd' => FormatFamily::Delta,
        _ => {
            return Err(Error::unsupported_value(format!(
                "unrecognised segment extension '.{}'",
                ext
            )))
        }
    };
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    Ok((parent.join(stem).to_string_lossy().into_owned(), family))
}

fn decode_media_values(payload: &[u8], media: &mut MediaValues) -> Result<(), Error> {
    use crate::endian::read_u32_le;
    if payload.len() < 66 {
        return Err(Error::invalid_value(
            "volume/disk/data section payload too short",
        ));
    }
    media.media_type = read_u32_le(&payload[0..4])? as u8;
    media.number_of_chunks = read_u32_le(&payload[4..8])?;
    media.sectors_per_chunk = read_u32_le(&payload[8..12])?;
    media.bytes_per_sector = read_u32_le(&payload[12..16])?;
    media.number_of_sectors = crate::endian::read_u64_le(&payload[16..24])?;
    media.media_flags = payload[28];
    media.error_granularity = read_u32_le(&payload[42..46])?;
    media.set_identifier.copy_from_slice(&payload[50..66]);
    media.media_size = media.number_of_sectors * media.bytes_per_sector as u64;
    Ok(())
}

fn encode_media_values(media: &MediaValues) -> Vec<u8> {
    use crate::endian::{adler32, write_u32_le, write_u64_le};
    let mut out = Vec::with_capacity(1036);
    write_u32_le(&mut out, media.media_type as u32);
    write_u32_le(&mut out, media.number_of_chunks);
    write_u32_le(&mut out, media.sectors_per_chunk);
    write_u32_le(&mut out, media.bytes_per_sector);
    write_u64_le(&mut out, media.number_of_sectors);
    write_u32_le(&mut out, 0); // CHS geometry: unused by this implementation
    out.push(media.media_flags);
    out.extend_from_slice(&[0u8; 3]);
    write_u32_le(&mut out, 0); // PALM start sector: unused
    write_u32_le(&mut out, 0); // SMART number_of_sectors: unused
    out.push(0); // compression_level: tracked on HeaderValues instead
    out.push(0);
    write_u32_le(&mut out, media.error_granularity);
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&media.set_identifier);
    out.resize(1032, 0);
    let checksum = adler32(&out);
    write_u32_le(&mut out, checksum);
    out
}

fn flush_chunks_section(pool: &mut FileIoPool, ws: &mut WriteState, force: bool) -> Result<(), Error> {
    if ws.builder.is_empty() && !force {
        return Ok(());
    }
    let end = ws.builder.write(pool, ws.current_entry, ws.chunks_section_start)?;
    ws.cursor = end;
    ws.builder = ChunksSectionBuilder::new();
    ws.state.close_chunks_section();
    Ok(())
}

/// Close the current segment with a `next` terminator and open the
/// following one, carrying the media geometry over in a `data` section.
/// Assumes the caller already flushed the current chunks section.
fn roll_segment(
    pool: &mut FileIoPool,
    ws: &mut WriteState,
    base_name: &str,
    format_variant: FormatVariant,
    media: &MediaValues,
) -> Result<(), Error> {
    let next_header = section::encode_terminator("next", ws.cursor, 0);
    pool.write_at(ws.current_entry, ws.cursor, &next_header)?;

    ws.segment_number += 1;
    let path = filename::segment_filename(base_name, ws.family, ws.segment_number as u32)?;
    std::fs::write(&path, []).map_err(Error::from)?;
    let entry = pool.append_handle(PathBuf::from(&path), true);
    let header = segment::encode_segment_header(matches!(format_variant, FormatVariant::Logical), ws.segment_number);
    pool.write_at(entry, 0, &header)?;

    let payload = encode_media_values(media);
    let start = segment::SEGMENT_FILE_HEADER_SIZE;
    let next = start + 76 + payload.len() as u64;
    let sec_header = SectionDescriptor::encode(
        format_variant.continuation_section_name(),
        start,
        next,
        76 + payload.len() as u64,
    );
    pool.write_at(entry, start, &sec_header)?;
    pool.write_at(entry, start + 76, &payload)?;

    ws.current_entry = entry;
    ws.cursor = next;
    ws.chunks_section_start = next;
    ws.state = ws
        .config
        .start_segment(ws.total_chunks_hint.map(|h| h.saturating_sub(ws.total_chunks_written)))?;
    ws.state.open_chunks_section(ws.cursor);
    Ok(())
}

fn write_one_chunk(
    pool: &mut FileIoPool,
    ws: &mut WriteState,
    chunk_table: &mut ChunkTableIndex,
    base_name: &str,
    format_variant: FormatVariant,
    media: &mut MediaValues,
    input: &[u8],
) -> Result<(), Error> {
    let packed = chunk::pack(input, ws.compression_level, ws.compression_enabled, ws.empty_template.as_ref())?;
    let relative_offset = ws.builder.next_relative_offset();
    let absolute_offset = ws.chunks_section_start + 76 + relative_offset as u64;
    let on_disk_size = packed.bytes.len() as u64;

    chunk_table.push(
        ChunkDescriptor {
            file_io_entry: ws.current_entry as i32,
            file_offset: absolute_offset,
            size_on_disk: on_disk_size as u32,
            flags: packed.flags,
        },
        OffsetSource::Authoritative,
    );
    ws.builder.push_chunk(&packed);
    ws.state.record_chunk_written(on_disk_size);
    ws.total_chunks_written += 1;
    media.lock_chunk_size();

    let total_hint = ws.total_chunks_hint;
    if ws.config.is_section_full(&ws.state, ws.total_chunks_written, total_hint) {
        flush_chunks_section(pool, ws, false)?;
        if ws.config.is_segment_full(&ws.state, ws.total_chunks_written, total_hint) {
            roll_segment(pool, ws, base_name, format_variant, media)?;
        } else {
            ws.chunks_section_start = ws.cursor;
            ws.state.open_chunks_section(ws.cursor);
        }
    }
    Ok(())
}

impl EwfHandle {
    /// Discover and open every segment of an existing image, walking each
    /// segment's section chain and assembling the Chunk Table Index,
    /// Header/Hash Values, and acquisition metadata from what it finds.
    pub fn open_read(path: &str, cache_capacity: usize, error_policy: ErrorPolicy) -> Result<EwfHandle, Error> {
        let path_buf = PathBuf::from(path);
        let (base_name, family) = detect_family(&path_buf)?;
        let pattern = filename::glob_pattern(&base_name, family);
        let mut paths: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| Error::invalid_value(format!("invalid glob pattern '{}': {}", pattern, e)))?
            .filter_map(std::result::Result::ok)
            .collect();
        paths.sort();
        if paths.is_empty() {
            paths.push(path_buf.clone());
        }

        let mut pool = FileIoPool::new(io_pool::DEFAULT_MAXIMUM_CONCURRENT);
        let mut segments = Vec::with_capacity(paths.len());
        for p in &paths {
            let entry = pool.append_handle(p.clone(), false);
            segments.push(segment::open_read(&mut pool, entry)?);
        }

        let mut media = MediaValues::default();
        let mut header_values = HeaderValues::new();
        let mut hash_values = HashValues::new();
        let mut sessions = RangeList::new();
        let mut acquisition_errors = RangeList::new();
        let mut chunk_table = ChunkTableIndex::new();
        let mut ltree_root = None;
        let mut format_variant = match family {
            FormatFamily::Smart => FormatVariant::Smart,
            FormatFamily::Logical => FormatVariant::Logical,
            _ => FormatVariant::Ewf,
        };

        for segment in &segments {
            if segment.is_lvf {
                format_variant = FormatVariant::Logical;
            }
            let mut pending_sectors_end: Option<u64> = None;
            let mut skip_start: Option<u64> = None;

            for (i, desc) in segment.sections.iter().enumerate() {
                if let Some(skip) = skip_start {
                    if desc.start_offset == skip {
                        skip_start = None;
                        continue;
                    }
                }
                match desc.section_type.as_str() {
                    "header" | "header2" | "xheader" => {
                        let payload = segment::read_payload(&mut pool, segment.entry, desc)?;
                        let text = compression::decompress(&payload)?;
                        header_values.merge_from_payload(&text);
                    }
                    "volume" | "disk" | "data" => {
                        let payload = segment::read_payload(&mut pool, segment.entry, desc)?;
                        decode_media_values(&payload, &mut media)?;
                    }
                    "sectors" => {
                        pending_sectors_end = Some(desc.end_offset());
                    }
                    "table" => {
                        let sectors_end = pending_sectors_end.unwrap_or(desc.start_offset);
                        let decoded = match segment::read_payload(&mut pool, segment.entry, desc)
                            .and_then(|p| segment::decode_table_payload(&p))
                        {
                            Ok(decoded) => decoded,
                            Err(_) => {
                                let table2 = segment
                                    .sections
                                    .get(i + 1)
                                    .filter(|s| s.section_type == "table2")
                                    .cloned();
                                match table2 {
                                    Some(t2) => {
                                        let payload2 = segment::read_payload(&mut pool, segment.entry, &t2)?;
                                        let decoded2 = segment::decode_table_payload(&payload2)?;
                                        skip_start = Some(t2.start_offset);
                                        let descriptors =
                                            segment::resolve_table_entries(&decoded2, segment.entry as i32, sectors_end);
                                        for d in descriptors {
                                            chunk_table.push(d, OffsetSource::Tentative);
                                        }
                                        continue;
                                    }
                                    None => {
                                        return Err(Error::checksum_mismatch(
                                            "table section corrupt and no table2 fallback available",
                                        ))
                                    }
                                }
                            }
                        };
                        let descriptors = segment::resolve_table_entries(&decoded, segment.entry as i32, sectors_end);
                        for d in descriptors {
                            chunk_table.push(d, OffsetSource::Authoritative);
                        }
                    }
                    "session" => {
                        let payload = segment::read_payload(&mut pool, segment.entry, desc)?;
                        sessions = acquisition::decode_range_section(&payload)?;
                    }
                    "error2" => {
                        let payload = segment::read_payload(&mut pool, segment.entry, desc)?;
                        acquisition_errors = acquisition::decode_range_section(&payload)?;
                    }
                    "hash" => {
                        let payload = segment::read_payload(&mut pool, segment.entry, desc)?;
                        let legacy = crate::hash_values::decode_hash_section(&payload)?;
                        for (k, v) in legacy.iter() {
                            hash_values.set(k, v.to_string());
                        }
                    }
                    "digest" => {
                        let payload = segment::read_payload(&mut pool, segment.entry, desc)?;
                        let digest = crate::hash_values::decode_digest_section(&payload)?;
                        for (k, v) in digest.iter() {
                            hash_values.set(k, v.to_string());
                        }
                    }
                    "ltree" => {
                        let payload = segment::read_payload(&mut pool, segment.entry, desc)?;
                        ltree_root = Some(crate::ltree::parse_ltree(&payload)?);
                    }
                    _ => {}
                }
            }
        }

        Ok(EwfHandle {
            pool,
            segments,
            format_variant,
            media,
            header_values,
            hash_values,
            sessions,
            tracks: RangeList::new(),
            acquisition_errors,
            chunk_table,
            read_io: ReadIoCoordinator::new(cache_capacity, error_policy),
            ltree_root,
            write: None,
            delta_pool: None,
            delta_entry: None,
            delta_chunks: HashMap::new(),
            raw_sector_mode: false,
            abort: AtomicBool::new(false),
            base_name,
        })
    }

    /// Reopen a previously interrupted write (§4.8): walks the last
    /// segment backwards via [`segment::classify_resume_point`] to the
    /// most recent usable chunks-section boundary, truncates both the
    /// Chunk Table Index and the backing file to that point, and leaves
    /// the handle ready for further [`write_buffer`](Self::write_buffer)
    /// calls to pick up right where the interrupted write left off.
    pub fn open_write_resume(path: &str, cache_capacity: usize, config: WriteIoConfig) -> Result<EwfHandle, Error> {
        let mut handle = Self::open_read(path, cache_capacity, ErrorPolicy::ZeroFill)?;
        let last_segment = handle
            .segments
            .last()
            .cloned()
            .ok_or_else(|| Error::invalid_value("no segments found to resume"))?;

        let (entry, boundary, segment_number) = match segment::classify_resume_point(&last_segment) {
            segment::ResumeAction::StartFreshSegment => {
                let family = match handle.format_variant {
                    FormatVariant::Smart => FormatFamily::Smart,
                    FormatVariant::Logical => FormatFamily::Logical,
                    _ => FormatFamily::Ewf,
                };
                let next_number = last_segment.segment_number + 1;
                let next_path = filename::segment_filename(&handle.base_name, family, next_number as u32)?;
                std::fs::write(&next_path, []).map_err(Error::from)?;
                let entry = handle.pool.append_handle(PathBuf::from(&next_path), true);
                let header =
                    segment::encode_segment_header(matches!(handle.format_variant, FormatVariant::Logical), next_number);
                handle.pool.write_at(entry, 0, &header)?;
                (entry, segment::SEGMENT_FILE_HEADER_SIZE, next_number)
            }
            segment::ResumeAction::TruncateToOffset(offset) => {
                let entry = last_segment.entry;
                let mut keep = handle.chunk_table.len();
                while keep > 0 {
                    let d = handle.chunk_table.get(keep - 1)?;
                    if d.file_io_entry == entry as i32 && d.file_offset >= offset {
                        keep -= 1;
                    } else {
                        break;
                    }
                }
                handle.chunk_table.truncate(keep);
                handle.pool.resize(entry, offset)?;
                (entry, offset, last_segment.segment_number)
            }
        };

        let mut chunks_in_segment = 0u32;
        for i in (0..handle.chunk_table.len()).rev() {
            if handle.chunk_table.get(i)?.file_io_entry == entry as i32 {
                chunks_in_segment += 1;
            } else {
                break;
            }
        }

        let total_chunks_hint = if handle.media.media_size > 0 {
            Some(handle.media.number_of_chunks.saturating_sub(handle.chunk_table.len() as u32))
        } else {
            None
        };
        let mut state = config.start_segment(total_chunks_hint)?;
        state.remaining_segment_file_size = state
            .remaining_segment_file_size
            .saturating_sub(boundary.saturating_sub(segment::SEGMENT_FILE_HEADER_SIZE));
        state.number_of_chunks_written_to_segment = chunks_in_segment;

        let family = match handle.format_variant {
            FormatVariant::Smart => FormatFamily::Smart,
            FormatVariant::Logical => FormatFamily::Logical,
            _ => FormatFamily::Ewf,
        };

        handle.write = Some(WriteState {
            config,
            state,
            builder: ChunksSectionBuilder::new(),
            pending: Vec::new(),
            family,
            segment_number,
            current_entry: entry,
            cursor: boundary,
            chunks_section_start: boundary,
            header_written: true,
            total_chunks_written: handle.chunk_table.len() as u32,
            total_chunks_hint,
            compression_level: CompressionLevel::Fast,
            compression_enabled: true,
            empty_template: None,
        });

        Ok(handle)
    }

    /// Start a fresh image for writing: creates the first segment file,
    /// writes its 13-byte header, and defers the header/media sections to
    /// the first call to [`write_buffer`](Self::write_buffer) so that
    /// header values set afterwards are still captured.
    pub fn create(
        base_path: &str,
        format_variant: FormatVariant,
        media: MediaValues,
        config: WriteIoConfig,
    ) -> Result<EwfHandle, Error> {
        let family = match format_variant {
            FormatVariant::Smart => FormatFamily::Smart,
            FormatVariant::Logical => FormatFamily::Logical,
            _ => FormatFamily::Ewf,
        };
        let first_path = filename::segment_filename(base_path, family, 1)?;
        std::fs::write(&first_path, []).map_err(Error::from)?;

        let mut pool = FileIoPool::new(io_pool::DEFAULT_MAXIMUM_CONCURRENT);
        let entry = pool.append_handle(PathBuf::from(&first_path), true);
        let header = segment::encode_segment_header(matches!(format_variant, FormatVariant::Logical), 1);
        pool.write_at(entry, 0, &header)?;

        let total_chunks_hint = if media.media_size > 0 {
            Some(media.number_of_chunks)
        } else {
            None
        };

        let write_state = WriteState {
            state: config.start_segment(total_chunks_hint)?,
            config,
            builder: ChunksSectionBuilder::new(),
            pending: Vec::new(),
            family,
            segment_number: 1,
            current_entry: entry,
            cursor: segment::SEGMENT_FILE_HEADER_SIZE,
            chunks_section_start: 0,
            header_written: false,
            total_chunks_written: 0,
            total_chunks_hint,
            compression_level: CompressionLevel::Fast,
            compression_enabled: true,
            empty_template: None,
        };

        Ok(EwfHandle {
            pool,
            segments: Vec::new(),
            format_variant,
            media,
            header_values: HeaderValues::new(),
            hash_values: HashValues::new(),
            sessions: RangeList::new(),
            tracks: RangeList::new(),
            acquisition_errors: RangeList::new(),
            chunk_table: ChunkTableIndex::new(),
            read_io: ReadIoCoordinator::new(crate::chunk_cache::DEFAULT_CAPACITY, ErrorPolicy::ZeroFill),
            ltree_root: None,
            write: Some(write_state),
            delta_pool: None,
            delta_entry: None,
            delta_chunks: HashMap::new(),
            raw_sector_mode: false,
            abort: AtomicBool::new(false),
            base_name: base_path.to_string(),
        })
    }

    /// Build a handle over a CUE sheet's backing files, treating each
    /// sector as a one-sector "chunk" resolved through the same Chunk
    /// Table Index the EWF engine uses, but read back raw (no compression
    /// or trailing checksum — optical-disc sources carry neither).
    pub fn open_cue(cue_text: &str, backing_dir: &Path, cache_capacity: usize, error_policy: ErrorPolicy) -> Result<EwfHandle, Error> {
        let descriptor = odraw::cue::parse(cue_text)?;
        Self::from_descriptor(descriptor, backing_dir, cache_capacity, error_policy)
    }

    pub fn open_toc(toc_text: &str, backing_dir: &Path, cache_capacity: usize, error_policy: ErrorPolicy) -> Result<EwfHandle, Error> {
        let descriptor = odraw::toc::parse(toc_text)?;
        Self::from_descriptor(descriptor, backing_dir, cache_capacity, error_policy)
    }

    fn from_descriptor(
        descriptor: odraw::Descriptor,
        backing_dir: &Path,
        cache_capacity: usize,
        error_policy: ErrorPolicy,
    ) -> Result<EwfHandle, Error> {
        let mut pool = FileIoPool::new(io_pool::DEFAULT_MAXIMUM_CONCURRENT);
        let mut file_entries = Vec::with_capacity(descriptor.files.len());
        for file in &descriptor.files {
            let entry = pool.append_handle(backing_dir.join(&file.path), false);
            file_entries.push(entry);
        }

        let mut media = MediaValues::new(CD_SECTOR_SIZE, 1);
        let mut chunk_table = ChunkTableIndex::new();
        let mut total_sectors = 0u64;

        for track in &descriptor.tracks {
            let entry = *file_entries
                .get(track.file_index)
                .ok_or_else(|| Error::invalid_value("track references an unknown FILE index"))?;
            let end = track.start_sector + track.number_of_sectors;
            if end as usize > chunk_table.len() {
                chunk_table.resize(
                    end as usize,
                    ChunkDescriptor {
                        file_io_entry: -1,
                        file_offset: 0,
                        size_on_disk: 1,
                        flags: ChunkFlags::default(),
                    },
                );
            }
            for k in 0..track.number_of_sectors {
                let global_index = (track.start_sector + k) as usize;
                let file_sector = track.file_sector_offset + k;
                chunk_table.set(
                    global_index,
                    ChunkDescriptor {
                        file_io_entry: entry as i32,
                        file_offset: file_sector * CD_SECTOR_SIZE as u64,
                        size_on_disk: CD_SECTOR_SIZE,
                        flags: ChunkFlags::default(),
                    },
                    OffsetSource::Authoritative,
                );
            }
            total_sectors = total_sectors.max(end);
        }
        media.set_media_size(total_sectors * CD_SECTOR_SIZE as u64)?;

        let mut handle = EwfHandle {
            pool,
            segments: Vec::new(),
            format_variant: FormatVariant::Ewf,
            media,
            header_values: HeaderValues::new(),
            hash_values: HashValues::new(),
            sessions: RangeList::new(),
            tracks: RangeList::new(),
            acquisition_errors: RangeList::new(),
            chunk_table,
            read_io: ReadIoCoordinator::new(cache_capacity, error_policy),
            ltree_root: None,
            write: None,
            delta_pool: None,
            delta_entry: None,
            delta_chunks: HashMap::new(),
            raw_sector_mode: true,
            abort: AtomicBool::new(false),
            base_name: String::new(),
        };
        handle.attach_descriptor(&descriptor);
        Ok(handle)
    }

    /// Fold a descriptor's sessions and tracks into the Acquisition
    /// Metadata Store (used both by [`from_descriptor`](Self::from_descriptor)
    /// and by callers attaching a CUE/TOC sheet to an already-open image).
    pub fn attach_descriptor(&mut self, descriptor: &odraw::Descriptor) {
        for session in &descriptor.sessions {
            self.sessions.append(session.start_sector, session.number_of_sectors);
        }
        for track in &descriptor.tracks {
            self.tracks.append(track.start_sector, track.number_of_sectors);
        }
    }

    fn ensure_header_group_written(&mut self) -> Result<(), Error> {
        let already_written = match &self.write {
            Some(ws) => ws.header_written,
            None => return Err(Error::invalid_value("handle was not opened for writing")),
        };
        if already_written {
            return Ok(());
        }

        let entry = self.write.as_ref().unwrap().current_entry;
        let mut cursor = self.write.as_ref().unwrap().cursor;

        let ascii_payload = compression::compress(self.header_values.encode_table().as_bytes(), CompressionLevel::Fast)?;
        let mut next = cursor + 76 + ascii_payload.len() as u64;
        let header_bytes = SectionDescriptor::encode("header", cursor, next, 76 + ascii_payload.len() as u64);
        self.pool.write_at(entry, cursor, &header_bytes)?;
        self.pool.write_at(entry, cursor + 76, &ascii_payload)?;
        cursor = next;

        let utf16_text = self.header_values.encode_table();
        let mut utf16_bytes = vec![0xFFu8, 0xFE];
        for ch in utf16_text.encode_utf16() {
            utf16_bytes.extend_from_slice(&ch.to_le_bytes());
        }
        let header2_payload = compression::compress(&utf16_bytes, CompressionLevel::Fast)?;
        next = cursor + 76 + header2_payload.len() as u64;
        let header2_bytes = SectionDescriptor::encode("header2", cursor, next, 76 + header2_payload.len() as u64);
        self.pool.write_at(entry, cursor, &header2_bytes)?;
        self.pool.write_at(entry, cursor + 76, &header2_payload)?;
        cursor = next;

        let media_payload = encode_media_values(&self.media);
        next = cursor + 76 + media_payload.len() as u64;
        let media_section_name = self.format_variant.media_section_name();
        let media_header = SectionDescriptor::encode(media_section_name, cursor, next, 76 + media_payload.len() as u64);
        self.pool.write_at(entry, cursor, &media_header)?;
        self.pool.write_at(entry, cursor + 76, &media_payload)?;
        cursor = next;

        let chunk_size_for_template = self.media.chunk_size() as usize;
        let level_for_template = self.write.as_ref().unwrap().compression_level;
        let template = EmptyBlockTemplate::new(chunk_size_for_template, level_for_template)?;

        let ws = self.write.as_mut().unwrap();
        ws.cursor = cursor;
        ws.chunks_section_start = cursor;
        ws.state.open_chunks_section(cursor);
        ws.header_written = true;
        ws.empty_template = Some(template);
        Ok(())
    }

    /// Set the compression parameters used for chunks written from this
    /// point on. Must be called before the first [`write_buffer`](Self::write_buffer)
    /// call, since it also seeds the empty-block template.
    pub fn set_compression(&mut self, level: CompressionLevel, enabled: bool) -> Result<(), Error> {
        let ws = self
            .write
            .as_mut()
            .ok_or_else(|| Error::invalid_value("handle was not opened for writing"))?;
        ws.compression_level = level;
        ws.compression_enabled = enabled;
        Ok(())
    }

    /// Append `data` to the image being written, packing whole chunks as
    /// they accumulate and rotating sections/segments per the Write-IO
    /// Coordinator's budget. Returns `data.len()` (the whole buffer is
    /// always consumed, any partial final chunk stays pending until
    /// [`finalize`](Self::finalize)).
    pub fn write_buffer(&mut self, data: &[u8]) -> Result<usize, Error> {
        if self.media.bytes_per_sector == 0 || self.media.sectors_per_chunk == 0 {
            return Err(Error::invalid_value("media geometry must be set before writing"));
        }
        if self.abort.load(Ordering::SeqCst) {
            return Err(Error::aborted());
        }
        self.ensure_header_group_written()?;

        let chunk_size = self.media.chunk_size() as usize;
        {
            let ws = self
                .write
                .as_mut()
                .ok_or_else(|| Error::invalid_value("handle was not opened for writing"))?;
            ws.pending.extend_from_slice(data);
        }

        loop {
            let have_full_chunk = self
                .write
                .as_ref()
                .map(|ws| ws.pending.len() >= chunk_size)
                .unwrap_or(false);
            if !have_full_chunk {
                break;
            }
            if self.abort.load(Ordering::SeqCst) {
                return Err(Error::aborted());
            }
            let chunk_bytes: Vec<u8> = {
                let ws = self.write.as_mut().unwrap();
                ws.pending.drain(0..chunk_size).collect()
            };
            write_one_chunk(
                &mut self.pool,
                self.write.as_mut().unwrap(),
                &mut self.chunk_table,
                &self.base_name,
                self.format_variant,
                &mut self.media,
                &chunk_bytes,
            )?;
        }
        Ok(data.len())
    }

    /// Flush any pending partial chunk, close the current chunks section,
    /// write the trailing metadata sections for whatever acquisition data
    /// has been set, and terminate with `done`.
    pub fn finalize(&mut self) -> Result<(), Error> {
        self.ensure_header_group_written()?;
        let entry = self.write.as_ref().unwrap().current_entry;

        let leftover: Vec<u8> = {
            let ws = self.write.as_mut().unwrap();
            std::mem::take(&mut ws.pending)
        };
        if !leftover.is_empty() {
            write_one_chunk(
                &mut self.pool,
                self.write.as_mut().unwrap(),
                &mut self.chunk_table,
                &self.base_name,
                self.format_variant,
                &mut self.media,
                &leftover,
            )?;
        }
        flush_chunks_section(&mut self.pool, self.write.as_mut().unwrap(), true)?;
        let mut cursor = self.write.as_ref().unwrap().cursor;

        if let (Some(md5), Some(sha1)) = (
            self.hash_values.get("MD5").map(str::to_string),
            self.hash_values.get("SHA1").map(str::to_string),
        ) {
            let mut values = HashValues::new();
            values.set("MD5", md5);
            values.set("SHA1", sha1);
            let payload = crate::hash_values::encode_digest_section(&values)?;
            let next = cursor + 76 + payload.len() as u64;
            let header = SectionDescriptor::encode("digest", cursor, next, 76 + payload.len() as u64);
            self.pool.write_at(entry, cursor, &header)?;
            self.pool.write_at(entry, cursor + 76, &payload)?;
            cursor = next;
        }

        {
            let payload = acquisition::encode_range_section(&self.sessions);
            let next = cursor + 76 + payload.len() as u64;
            let header = SectionDescriptor::encode("session", cursor, next, 76 + payload.len() as u64);
            self.pool.write_at(entry, cursor, &header)?;
            self.pool.write_at(entry, cursor + 76, &payload)?;
            cursor = next;
        }

        {
            let payload = acquisition::encode_range_section(&self.acquisition_errors);
            let next = cursor + 76 + payload.len() as u64;
            let header = SectionDescriptor::encode("error2", cursor, next, 76 + payload.len() as u64);
            self.pool.write_at(entry, cursor, &header)?;
            self.pool.write_at(entry, cursor + 76, &payload)?;
            cursor = next;
        }

        {
            let payload = crate::hash_values::encode_hash_section(&self.hash_values)?;
            let next = cursor + 76 + payload.len() as u64;
            let header = SectionDescriptor::encode("hash", cursor, next, 76 + payload.len() as u64);
            self.pool.write_at(entry, cursor, &header)?;
            self.pool.write_at(entry, cursor + 76, &payload)?;
            cursor = next;
        }

        let done = section::encode_terminator("done", cursor, cursor);
        self.pool.write_at(entry, cursor, &done)?;
        self.write.as_mut().unwrap().cursor = cursor;
        Ok(())
    }

    /// Buffered sequential read from the current offset, preferring a
    /// delta-overlay replacement over the base chunk and checking the
    /// abort flag at each chunk boundary (§5).
    pub fn read_buffer(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if self.raw_sector_mode {
            return self.read_raw_sectors(buf);
        }

        let chunk_size = self.media.chunk_size() as u64;
        if chunk_size == 0 {
            return Ok(0);
        }
        let mut total = 0usize;
        while total < buf.len() {
            if self.abort.load(Ordering::SeqCst) {
                return Err(Error::aborted());
            }
            let offset = self.read_io.current_offset;
            if offset >= self.media.media_size {
                break;
            }
            let chunk_index = (offset / chunk_size) as usize;
            let offset_in_chunk = (offset % chunk_size) as usize;

            if let Some(data) = self.delta_chunks.get(&chunk_index) {
                if offset_in_chunk >= data.len() {
                    break;
                }
                let available = data.len() - offset_in_chunk;
                let want = (buf.len() - total).min(available);
                buf[total..total + want].copy_from_slice(&data[offset_in_chunk..offset_in_chunk + want]);
                total += want;
                self.read_io.seek(offset + want as u64);
            } else {
                let chunk_end = (chunk_index as u64 + 1) * chunk_size;
                let want = (chunk_end - offset).min((buf.len() - total) as u64) as usize;
                let n = self
                    .read_io
                    .read(&mut self.pool, &self.chunk_table, &self.media, &mut buf[total..total + want])?;
                if n == 0 {
                    break;
                }
                total += n;
            }
        }
        Ok(total)
    }

    fn read_raw_sectors(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let sector_size = self.media.bytes_per_sector as u64;
        if sector_size == 0 {
            return Ok(0);
        }
        let mut total = 0usize;
        while total < buf.len() {
            if self.abort.load(Ordering::SeqCst) {
                return Err(Error::aborted());
            }
            let offset = self.read_io.current_offset;
            if offset >= self.media.media_size {
                break;
            }
            let sector_index = (offset / sector_size) as usize;
            let descriptor = match self.chunk_table.get(sector_index) {
                Ok(d) if d.file_io_entry >= 0 => d,
                _ => break, // unmapped gap between tracks: stop short, not an error.
            };
            let offset_in_sector = (offset % sector_size) as usize;
            let available = sector_size as usize - offset_in_sector;
            let want = (buf.len() - total).min(available);
            self.pool.read_exact_at(
                descriptor.file_io_entry as usize,
                descriptor.file_offset + offset_in_sector as u64,
                &mut buf[total..total + want],
            )?;
            total += want;
            self.read_io.seek(offset + want as u64);
        }
        Ok(total)
    }

    /// Read `buf.len()` bytes starting at the given media offset, without
    /// disturbing any in-progress sequential position beyond leaving the
    /// cursor at `offset + n`.
    pub fn read_random(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, Error> {
        self.read_io.seek(offset);
        self.read_buffer(buf)
    }

    pub fn seek_offset(&mut self, offset: u64) -> u64 {
        self.read_io.seek(offset);
        offset
    }

    pub fn current_offset(&self) -> u64 {
        self.read_io.current_offset
    }

    pub fn media(&self) -> &MediaValues {
        &self.media
    }

    pub fn format_variant(&self) -> FormatVariant {
        self.format_variant
    }

    pub fn header_value(&self, canonical: &str) -> Option<&str> {
        self.header_values.get_canonical(canonical)
    }

    pub fn set_header_value(&mut self, canonical: &str, value: impl Into<String>) {
        self.header_values.set_canonical(canonical, value);
    }

    pub fn hash_value(&self, key: &str) -> Option<&str> {
        self.hash_values.get(key)
    }

    pub fn set_hash_value(&mut self, key: &str, hex_digest: impl Into<String>) {
        self.hash_values.set(key, hex_digest);
    }

    pub fn sessions(&self) -> &RangeList {
        &self.sessions
    }

    pub fn tracks(&self) -> &RangeList {
        &self.tracks
    }

    pub fn acquisition_errors(&self) -> &RangeList {
        &self.acquisition_errors
    }

    pub fn checksum_errors(&self) -> &RangeList {
        &self.read_io.checksum_errors
    }

    pub fn add_session(&mut self, start_sector: u64, number_of_sectors: u64) {
        self.sessions.append(start_sector, number_of_sectors);
    }

    pub fn add_track(&mut self, start_sector: u64, number_of_sectors: u64) {
        self.tracks.append(start_sector, number_of_sectors);
    }

    pub fn add_acquisition_error(&mut self, start_sector: u64, number_of_sectors: u64) {
        self.acquisition_errors.append(start_sector, number_of_sectors);
    }

    pub fn logical_tree(&self) -> Option<&LogicalFileEntry> {
        self.ltree_root.as_ref()
    }

    pub fn segment_paths(&self) -> Vec<PathBuf> {
        (0..self.pool.len()).map(|i| self.pool.path(i).to_path_buf()).collect()
    }

    /// Prepare a chunk for storage without writing it anywhere, e.g. for a
    /// caller computing a hash over the packed representation ahead of time.
    pub fn prepare_write_chunk(
        &self,
        input: &[u8],
        level: CompressionLevel,
        compression_enabled: bool,
    ) -> Result<PackedChunk, Error> {
        chunk::pack(input, level, compression_enabled, None)
    }

    /// Signal cooperative cancellation; checked at the next chunk boundary
    /// by [`read_buffer`](Self::read_buffer) and [`write_buffer`](Self::write_buffer).
    pub fn signal_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Create a fresh, empty `.d01`-style delta overlay segment for this
    /// handle, ready for [`write_delta_chunk`](Self::write_delta_chunk).
    pub fn create_delta_overlay(&mut self, path: &str) -> Result<(), Error> {
        std::fs::write(path, []).map_err(Error::from)?;
        let mut delta_pool = FileIoPool::new(4);
        let entry = delta_pool.append_handle(PathBuf::from(path), true);
        self.delta_pool = Some(delta_pool);
        self.delta_entry = Some(entry);
        Ok(())
    }

    /// Attach an existing delta overlay segment, loading its chunks into
    /// the in-memory overlay map (§4.9's "latest version wins" across
    /// repeated attaches is handled by insertion order into the map).
    pub fn open_delta_overlay(&mut self, path: &str) -> Result<(), Error> {
        let mut delta_pool = FileIoPool::new(4);
        let entry = delta_pool.append_handle(PathBuf::from(path), true);
        let chunks = delta::read_delta_segment(&mut delta_pool, entry)?;
        for chunk in chunks {
            self.delta_chunks.insert(chunk.chunk_index as usize, chunk.data);
        }
        self.delta_pool = Some(delta_pool);
        self.delta_entry = Some(entry);
        Ok(())
    }

    /// Append a replacement chunk to the open delta overlay, taking
    /// precedence over the base image's chunk on every subsequent read.
    pub fn write_delta_chunk(&mut self, chunk_index: usize, data: Vec<u8>) -> Result<(), Error> {
        let (pool, entry) = match (&mut self.delta_pool, self.delta_entry) {
            (Some(p), Some(e)) => (p, e),
            _ => return Err(Error::invalid_value("no delta overlay segment is open for writing")),
        };
        let size = pool.size(entry)?;
        let append_offset = if size == 0 {
            pool.write_at(entry, 0, &delta::DVF_SIGNATURE)?;
            pool.write_at(entry, 8, &[0x01, 0x01, 0x00, 0x00, 0x00])?;
            segment::SEGMENT_FILE_HEADER_SIZE
        } else {
            size.saturating_sub(76) // overwrite the previous `done` terminator
        };

        let chunk = DeltaChunk {
            chunk_index: chunk_index as u32,
            data,
        };
        let new_offset = delta::append_delta_chunk(pool, entry, append_offset, &chunk)?;
        let done = section::encode_terminator("done", new_offset, new_offset);
        pool.write_at(entry, new_offset, &done)?;

        self.delta_chunks.insert(chunk_index, chunk.data);
        self.read_io.invalidate_chunk(chunk_index);
        Ok(())
    }

    /// Backing files close automatically via `Drop`; kept as a named,
    /// explicit operation so callers following the handle-level API (§6)
    /// have one.
    pub fn close(self) {}
}

impl Clone for EwfHandle {
    /// Duplicate this handle's read-side state against the same backing
    /// paths, re-opened independently (their own `FileIoPool`, a fresh
    /// Chunk Cache), mirroring the teacher's `RAW`/`EWF` `Clone` via
    /// `File::try_clone` — except the File I/O Pool has no file descriptor
    /// to `try_clone`, so cloning re-opens by path instead. Any in-progress
    /// write state is not carried over; a clone is a read-only view.
    fn clone(&self) -> Self {
        let mut pool = FileIoPool::new(io_pool::DEFAULT_MAXIMUM_CONCURRENT);
        for i in 0..self.pool.len() {
            pool.append_handle(self.pool.path(i).to_path_buf(), false);
        }

        let mut read_io = ReadIoCoordinator::new(crate::chunk_cache::DEFAULT_CAPACITY, self.read_io.error_policy);
        read_io.seek(self.read_io.current_offset);

        EwfHandle {
            pool,
            segments: self.segments.clone(),
            format_variant: self.format_variant,
            media: self.media.clone(),
            header_values: self.header_values.clone(),
            hash_values: self.hash_values.clone(),
            sessions: self.sessions.clone(),
            tracks: self.tracks.clone(),
            acquisition_errors: self.acquisition_errors.clone(),
            chunk_table: self.chunk_table.clone(),
            read_io,
            ltree_root: self.ltree_root.clone(),
            write: None,
            delta_pool: None,
            delta_entry: None,
            delta_chunks: self.delta_chunks.clone(),
            raw_sector_mode: self.raw_sector_mode,
            abort: AtomicBool::new(false),
            base_name: self.base_name.clone(),
        }
    }
}

impl Read for EwfHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_buffer(buf).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

impl Seek for EwfHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_offset = match pos {
            SeekFrom::Start(o) => o as i64,
            SeekFrom::Current(o) => self.read_io.current_offset as i64 + o,
            SeekFrom::End(o) => self.media.media_size as i64 + o,
        };
        if new_offset < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start of image"));
        }
        Ok(self.seek_offset(new_offset as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_io::FormatClass;

    fn scratch_base(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("ewf_handle_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("image").to_string_lossy().into_owned()
    }

    fn small_config() -> WriteIoConfig {
        WriteIoConfig {
            chunk_size: 1024,
            maximum_segment_size: 1024 * 1024,
            unrestrict_offset_table: false,
            format_class: FormatClass::Modern,
        }
    }

    #[test]
    fn write_then_read_back_a_single_chunk_image() {
        let base = scratch_base("roundtrip");
        let mut media = MediaValues::new(512, 2); // chunk_size = 1024
        media.set_media_size(1024).unwrap();

        let mut handle = EwfHandle::create(&base, FormatVariant::Ewf, media, small_config()).unwrap();
        handle.set_header_value("case_number", "2024-CASE");
        handle.set_hash_value("MD5", "a".repeat(32));
        handle.set_hash_value("SHA1", "b".repeat(40));

        let data: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
        handle.write_buffer(&data).unwrap();
        handle.finalize().unwrap();

        let mut reader = EwfHandle::open_read(&format!("{}.E01", base), 4, ErrorPolicy::ZeroFill).unwrap();
        assert_eq!(reader.header_value("case_number"), Some("2024-CASE"));
        assert_eq!(reader.hash_value("MD5").map(str::to_string), Some("a".repeat(32)));

        let mut out = vec![0u8; 1024];
        let n = reader.read_buffer(&mut out).unwrap();
        assert_eq!(n, 1024);
        assert_eq!(out, data);

        std::fs::remove_dir_all(Path::new(&base).parent().unwrap()).ok();
    }

    #[test]
    fn delta_overlay_takes_precedence_over_base_chunk() {
        let base = scratch_base("delta");
        let mut media = MediaValues::new(512, 2);
        media.set_media_size(1024).unwrap();

        let mut handle = EwfHandle::create(&base, FormatVariant::Ewf, media, small_config()).unwrap();
        handle.write_buffer(&vec![1u8; 1024]).unwrap();
        handle.finalize().unwrap();

        let mut reader = EwfHandle::open_read(&format!("{}.E01", base), 4, ErrorPolicy::ZeroFill).unwrap();
        let delta_path = format!("{}.d01", base);
        reader.create_delta_overlay(&delta_path).unwrap();
        let replacement = vec![2u8; 1024];
        reader.write_delta_chunk(0, replacement.clone()).unwrap();

        reader.seek_offset(0);
        let mut out = vec![0u8; 1024];
        let n = reader.read_buffer(&mut out).unwrap();
        assert_eq!(n, 1024);
        assert_eq!(out, replacement);

        std::fs::remove_dir_all(Path::new(&base).parent().unwrap()).ok();
    }

    #[test]
    fn cue_backed_handle_reads_raw_sectors() {
        let dir = std::env::temp_dir().join(format!("ewf_handle_cue_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let bin_path = dir.join("image.bin");
        let sector_data: Vec<u8> = (0..(CD_SECTOR_SIZE * 2)).map(|i| (i % 200) as u8).collect();
        std::fs::write(&bin_path, &sector_data).unwrap();

        let cue_text = "FILE \"image.bin\" BINARY\nTRACK 01 AUDIO\n  INDEX 01 00:00:00\nREMARK LEAD-OUT 00:00:02\n";
        let mut handle = EwfHandle::open_cue(cue_text, &dir, 4, ErrorPolicy::ZeroFill).unwrap();

        let mut out = vec![0u8; CD_SECTOR_SIZE as usize];
        let n = handle.read_buffer(&mut out).unwrap();
        assert_eq!(n, CD_SECTOR_SIZE as usize);
        assert_eq!(out, sector_data[0..CD_SECTOR_SIZE as usize]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn clone_reopens_independently_at_the_same_offset() {
        let base = scratch_base("clone");
        let mut media = MediaValues::new(512, 2);
        media.set_media_size(1024).unwrap();
        let mut handle = EwfHandle::create(&base, FormatVariant::Ewf, media, small_config()).unwrap();
        handle.write_buffer(&vec![5u8; 1024]).unwrap();
        handle.finalize().unwrap();

        let mut reader = EwfHandle::open_read(&format!("{}.E01", base), 4, ErrorPolicy::ZeroFill).unwrap();
        reader.seek_offset(512);
        let mut cloned = reader.clone();

        let mut out = vec![0u8; 100];
        let n = cloned.read_buffer(&mut out).unwrap();
        assert_eq!(n, 100);
        assert!(out.iter().all(|&b| b == 5));

        std::fs::remove_dir_all(Path::new(&base).parent().unwrap()).ok();
    }

    /// Simulates a crash right after a `sectors` section was flushed but
    /// before its `table`/`table2` were written: hand-assembles that
    /// truncated segment, then checks that resume drops the orphaned
    /// `sectors` section and lets writing continue cleanly (§4.8, S5).
    #[test]
    fn resume_after_crash_drops_orphaned_sectors_and_completes() {
        let base = scratch_base("resume");
        let path = format!("{}.E01", base);

        let mut pool = FileIoPool::new(4);
        std::fs::write(&path, []).unwrap();
        let entry = pool.append_handle(PathBuf::from(&path), true);
        pool.write_at(entry, 0, &segment::encode_segment_header(false, 1)).unwrap();

        let mut media = MediaValues::new(512, 2); // chunk_size = 1024
        media.set_media_size(1024).unwrap();

        let mut cursor = segment::SEGMENT_FILE_HEADER_SIZE;
        let ascii_payload = compression::compress(b"header placeholder", CompressionLevel::Fast).unwrap();
        let header_next = cursor + 76 + ascii_payload.len() as u64;
        let header_bytes = SectionDescriptor::encode("header", cursor, header_next, 76 + ascii_payload.len() as u64);
        pool.write_at(entry, cursor, &header_bytes).unwrap();
        pool.write_at(entry, cursor + 76, &ascii_payload).unwrap();
        cursor = header_next;

        let media_payload = encode_media_values(&media);
        let volume_next = cursor + 76 + media_payload.len() as u64;
        let volume_bytes = SectionDescriptor::encode("volume", cursor, volume_next, 76 + media_payload.len() as u64);
        pool.write_at(entry, cursor, &volume_bytes).unwrap();
        pool.write_at(entry, cursor + 76, &media_payload).unwrap();
        cursor = volume_next;

        let packed = chunk::pack(&vec![9u8; 1024], CompressionLevel::None, false, None).unwrap();
        // Crash happens here: `sectors` is on disk, `table`/`table2` never written.
        let sectors_next = cursor + 76 + packed.bytes.len() as u64;
        let sectors_header = SectionDescriptor::encode("sectors", cursor, sectors_next, 76 + packed.bytes.len() as u64);
        pool.write_at(entry, cursor, &sectors_header).unwrap();
        pool.write_at(entry, cursor + 76, &packed.bytes).unwrap();
        drop(pool);

        let mut reader = EwfHandle::open_write_resume(&path, 4, small_config()).unwrap();
        assert!(reader.write.is_some());
        assert_eq!(reader.chunk_table.len(), 0, "the orphaned sectors section's chunk must be dropped");

        reader.write_buffer(&vec![9u8; 1024]).unwrap();
        reader.finalize().unwrap();

        let mut final_reader = EwfHandle::open_read(&path, 4, ErrorPolicy::ZeroFill).unwrap();
        let mut out = vec![0u8; 1024];
        let n = final_reader.read_buffer(&mut out).unwrap();
        assert_eq!(n, 1024);
        assert!(out.iter().all(|&b| b == 9));

        std::fs::remove_dir_all(Path::new(&base).parent().unwrap()).ok();
    }
}
