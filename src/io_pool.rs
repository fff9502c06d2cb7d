//! File I/O Pool (`SPEC_FULL.md` §4.1, component 2) — opens a bounded
//! number of backing files concurrently, LRU-evicting and transparently
//! reopening on access.
//!
//! The teacher never pools file descriptors (`EWF::segments: Vec<File>`
//! holds every segment open for the handle's lifetime, and `RAW` in
//! `src/raw.rs` wraps exactly one `File`); this component generalises that
//! pattern to "however many segments an image has, open only
//! `maximum_concurrent` file descriptors at a time", which the spec
//! requires for images spanning hundreds of segments.

use crate::error::Error;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Default number of simultaneously open backing files, chosen to stay well
/// under common OS soft limits (1024) while still allowing reasonable
/// segment fan-out without constant reopen churn.
pub const DEFAULT_MAXIMUM_CONCURRENT: usize = 64;

/// A single tracked backing file: its path, open mode, and (if currently
/// open) its file descriptor plus an LRU generation counter.
struct Entry {
    path: PathBuf,
    writable: bool,
    open: Option<(File, u64)>,
}

/// Bounded pool of open file descriptors over a set of backing files
/// identified by small integer handles ("entries").
pub struct FileIoPool {
    entries: Vec<Entry>,
    maximum_concurrent: usize,
    open_count: usize,
    generation: u64,
}

impl FileIoPool {
    pub fn new(maximum_concurrent: usize) -> Self {
        FileIoPool {
            entries: Vec::new(),
            maximum_concurrent: maximum_concurrent.max(1),
            open_count: 0,
            generation: 0,
        }
    }

    /// Register a backing file without opening it yet, returning its entry
    /// index (stable for the pool's lifetime).
    pub fn append_handle(&mut self, path: impl Into<PathBuf>, writable: bool) -> usize {
        self.entries.push(Entry {
            path: path.into(),
            writable,
            open: None,
        });
        self.entries.len() - 1
    }

    pub fn path(&self, entry: usize) -> &Path {
        &self.entries[entry].path
    }

    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.open.as_ref().map(|(_, gen)| (i, *gen)))
            .min_by_key(|(_, gen)| *gen)
            .map(|(i, _)| i);
        if let Some(i) = victim {
            self.entries[i].open = None;
            self.open_count -= 1;
        }
    }

    fn ensure_open(&mut self, entry: usize) -> Result<(), Error> {
        if self.entries[entry].open.is_some() {
            self.generation += 1;
            self.entries[entry].open.as_mut().unwrap().1 = self.generation;
            return Ok(());
        }
        if self.open_count >= self.maximum_concurrent {
            self.evict_one();
        }
        let e = &self.entries[entry];
        let file = OpenOptions::new()
            .read(true)
            .write(e.writable)
            .create(e.writable)
            .open(&e.path)
            .map_err(|io_err| {
                Error::with_source(
                    crate::error::Domain::Io,
                    crate::error::Kind::OpenFailed,
                    format!("open {}: {}", e.path.display(), io_err),
                    io_err,
                )
            })?;
        self.generation += 1;
        self.entries[entry].open = Some((file, self.generation));
        self.open_count += 1;
        Ok(())
    }

    pub fn read_at(&mut self, entry: usize, offset: u64, buf: &mut [u8]) -> Result<usize, Error> {
        self.ensure_open(entry)?;
        let (file, _) = self.entries[entry].open.as_mut().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        Ok(file.read(buf)?)
    }

    pub fn read_exact_at(&mut self, entry: usize, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        self.ensure_open(entry)?;
        let (file, _) = self.entries[entry].open.as_mut().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_at(&mut self, entry: usize, offset: u64, buf: &[u8]) -> Result<usize, Error> {
        self.ensure_open(entry)?;
        let (file, _) = self.entries[entry].open.as_mut().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        Ok(file.write(buf)?)
    }

    pub fn size(&mut self, entry: usize) -> Result<u64, Error> {
        self.ensure_open(entry)?;
        let (file, _) = self.entries[entry].open.as_mut().unwrap();
        Ok(file.metadata()?.len())
    }

    pub fn resize(&mut self, entry: usize, new_size: u64) -> Result<(), Error> {
        self.ensure_open(entry)?;
        let (file, _) = self.entries[entry].open.as_mut().unwrap();
        file.set_len(new_size)?;
        Ok(())
    }

    /// Always `false` for regular files; the teacher's `RAW`/`EWF` wrappers
    /// never target raw block devices, and neither does this pool — kept as
    /// a named surface per §6 so callers can branch on it without a special
    /// case today becoming a breaking API change later.
    pub fn is_device(&self, _entry: usize) -> bool {
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn scratch_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    #[test]
    fn reads_back_written_content() {
        let dir = std::env::temp_dir().join(format!("ewf_pool_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let p1 = scratch_file(&dir, "a.bin", b"hello");
        let p2 = scratch_file(&dir, "b.bin", b"world!");

        let mut pool = FileIoPool::new(1); // force eviction between reads
        let e1 = pool.append_handle(p1, false);
        let e2 = pool.append_handle(p2, false);

        let mut buf = [0u8; 5];
        pool.read_exact_at(e1, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        let mut buf2 = [0u8; 6];
        pool.read_exact_at(e2, 0, &mut buf2).unwrap();
        assert_eq!(&buf2, b"world!");

        // e1 should have been evicted and is transparently reopened here.
        pool.read_exact_at(e1, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn size_reports_file_length() {
        let dir = std::env::temp_dir().join(format!("ewf_pool_size_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let p1 = scratch_file(&dir, "c.bin", b"0123456789");
        let mut pool = FileIoPool::new(4);
        let e1 = pool.append_handle(p1, false);
        assert_eq!(pool.size(e1).unwrap(), 10);
        std::fs::remove_dir_all(&dir).ok();
    }
}
