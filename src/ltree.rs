//! Logical File Tree (`SPEC_FULL.md` §4, component 15) — parses the
//! `ltree` section's in-image file entry tree (L01 "logical evidence
//! files") and serves restartable reads of its streams mapped to media
//! offsets.
//!
//! The teacher has no logical-evidence-file support; grounded on §3's
//! "Logical File Entry" data model and the xml-ish `ltree` payload
//! conventions referenced by `libewf_single_file_tree` in
//! `original_source/libewf`, rendered here as a tab-indented line format
//! (matching the teacher's own tab-delimited `header`/`header2` parsing
//! idiom rather than inventing an XML dependency the crate doesn't need).

use crate::error::Error;
use crate::io_pool::FileIoPool;

/// One node of the logical file tree (§3 "Logical File Entry").
#[derive(Debug, Clone, Default)]
pub struct LogicalFileEntry {
    pub name: String,
    pub entry_type: EntryType,
    pub flags: u32,
    pub size: u64,
    pub creation_time: u32,
    pub access_time: u32,
    pub modification_time: u32,
    pub entry_modification_time: u32,
    pub md5: Option<[u8; 16]>,
    pub media_data_offset: u64,
    pub media_data_size: u64,
    pub duplicate_media_data_offset: Option<u64>,
    pub children: Vec<LogicalFileEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryType {
    #[default]
    File,
    Directory,
}

impl LogicalFileEntry {
    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn find_child(&self, name: &str) -> Option<&LogicalFileEntry> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Parse an `ltree` section payload into its root entry. Each line is
/// tab-indented by depth and holds `name\ttype\tflags\tsize\tctime\tatime\t
/// mtime\tentry_mtime\tmedia_offset\tmedia_size[\tmd5]`.
pub fn parse_ltree(payload: &[u8]) -> Result<LogicalFileEntry, Error> {
    let text = crate::header_values::HeaderValues::decode_text(payload);
    let mut entries = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let depth = line.chars().take_while(|&c| c == '\t').count();
        entries.push((depth, parse_entry_line(line, depth)?));
    }
    if entries.is_empty() {
        return Err(Error::invalid_value("ltree payload is empty"));
    }

    let mut cursor = 0usize;
    let mut root = entries[cursor].1.clone();
    cursor += 1;
    root.children = build_children(&entries, &mut cursor, 1);
    Ok(root)
}

/// Consume every entry at `depth` from `entries[*cursor..]`, recursively
/// attaching deeper entries as children, and return the resulting sibling
/// list. `*cursor` is left pointing at the first entry shallower than
/// `depth` (or past the end).
fn build_children(
    entries: &[(usize, LogicalFileEntry)],
    cursor: &mut usize,
    depth: usize,
) -> Vec<LogicalFileEntry> {
    let mut siblings = Vec::new();
    while *cursor < entries.len() {
        let (entry_depth, _) = &entries[*cursor];
        if *entry_depth < depth {
            break;
        }
        if *entry_depth > depth {
            // Orphaned deeper entry with no declared parent at this level;
            // attach it to the previous sibling if one exists, else skip.
            if let Some(last) = siblings.last_mut() {
                let extra = build_children(entries, cursor, *entry_depth);
                let last: &mut LogicalFileEntry = last;
                last.children.extend(extra);
                continue;
            } else {
                *cursor += 1;
                continue;
            }
        }
        let mut entry = entries[*cursor].1.clone();
        *cursor += 1;
        entry.children = build_children(entries, cursor, depth + 1);
        siblings.push(entry);
    }
    siblings
}

fn parse_entry_line(line: &str, depth: usize) -> Result<LogicalFileEntry, Error> {
    let trimmed = &line[depth.min(line.len())..];
    let fields: Vec<&str> = trimmed.split('\t').collect();
    if fields.len() < 10 {
        return Err(Error::invalid_value(format!(
            "ltree entry line has {} fields, expected at least 10",
            fields.len()
        )));
    }

    let parse_u32 = |s: &str| s.parse::<u32>().unwrap_or(0);
    let parse_u64 = |s: &str| s.parse::<u64>().unwrap_or(0);

    let entry_type = if fields[1] == "dir" {
        EntryType::Directory
    } else {
        EntryType::File
    };

    let md5 = fields.get(10).and_then(|hex| {
        if hex.len() == 32 {
            let mut out = [0u8; 16];
            for i in 0..16 {
                out[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
            }
            Some(out)
        } else {
            None
        }
    });

    Ok(LogicalFileEntry {
        name: fields[0].to_string(),
        entry_type,
        flags: parse_u32(fields[2]),
        size: parse_u64(fields[3]),
        creation_time: parse_u32(fields[4]),
        access_time: parse_u32(fields[5]),
        modification_time: parse_u32(fields[6]),
        entry_modification_time: parse_u32(fields[7]),
        media_data_offset: parse_u64(fields[8]),
        media_data_size: parse_u64(fields[9]),
        duplicate_media_data_offset: None,
        md5,
        children: Vec::new(),
    })
}

/// A pull-style restartable iterator over one logical file entry's stream,
/// reading through the Read-IO Coordinator chunk-by-chunk rather than
/// buffering the whole stream up front (§9 "Generators / async").
pub struct LogicalFileStream<'a> {
    coordinator: &'a mut crate::read_io::ReadIoCoordinator,
    remaining: u64,
}

impl<'a> LogicalFileStream<'a> {
    pub fn new(coordinator: &'a mut crate::read_io::ReadIoCoordinator, entry: &LogicalFileEntry) -> Self {
        coordinator.seek(entry.media_data_offset);
        LogicalFileStream {
            coordinator,
            remaining: entry.media_data_size,
        }
    }

    pub fn read_next(
        &mut self,
        pool: &mut FileIoPool,
        index: &crate::chunk_table::ChunkTableIndex,
        media: &crate::media_values::MediaValues,
        buf: &mut [u8],
    ) -> Result<usize, Error> {
        let want = (buf.len() as u64).min(self.remaining) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.coordinator.read(pool, index, media, &mut buf[..want])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}
