//! Media Values — geometry of the acquired medium (`SPEC_FULL.md` §3).
//!
//! Grounded on `EwfVolumeSection` in the teacher's `src/ewf.rs`, extended
//! with the remaining `volume`/`disk` fields the distilled spec names but
//! the teacher's read-only reimplementation never populated (media type,
//! flags, error granularity, set identifier).

use crate::error::{Domain, Error, Kind};

/// Removable media, per `volume`/`disk` payload media_type encoding.
pub const MEDIA_TYPE_REMOVABLE: u8 = 1;
pub const MEDIA_TYPE_FIXED: u8 = 2;
pub const MEDIA_TYPE_OPTICAL: u8 = 3;
pub const MEDIA_TYPE_RAM: u8 = 14;

#[derive(Debug, Clone, Default)]
pub struct MediaValues {
    pub bytes_per_sector: u32,
    pub sectors_per_chunk: u32,
    pub number_of_chunks: u32,
    pub number_of_sectors: u64,
    pub media_size: u64,
    pub media_type: u8,
    pub media_flags: u8,
    pub error_granularity: u32,
    pub set_identifier: [u8; 16],
    /// Whether any chunk has already been written; once true, `chunk_size`
    /// is frozen (§3 invariant).
    chunk_size_locked: bool,
}

impl MediaValues {
    pub fn new(bytes_per_sector: u32, sectors_per_chunk: u32) -> Self {
        MediaValues {
            bytes_per_sector,
            sectors_per_chunk,
            media_flags: 0x01, // "primary" / physical media by convention
            ..Default::default()
        }
    }

    /// `chunk_size = sectors_per_chunk × bytes_per_sector`.
    pub fn chunk_size(&self) -> u32 {
        self.sectors_per_chunk * self.bytes_per_sector
    }

    /// Lock the chunk geometry; called the first time a chunk is written.
    pub fn lock_chunk_size(&mut self) {
        self.chunk_size_locked = true;
    }

    pub fn set_bytes_per_sector(&mut self, value: u32) -> Result<(), Error> {
        if self.chunk_size_locked {
            return Err(Error::new(
                Domain::Runtime,
                Kind::ConflictingValue,
                "bytes_per_sector cannot change after a chunk has been written",
            ));
        }
        self.bytes_per_sector = value;
        Ok(())
    }

    pub fn set_sectors_per_chunk(&mut self, value: u32) -> Result<(), Error> {
        if self.chunk_size_locked {
            return Err(Error::new(
                Domain::Runtime,
                Kind::ConflictingValue,
                "sectors_per_chunk cannot change after a chunk has been written",
            ));
        }
        self.sectors_per_chunk = value;
        Ok(())
    }

    /// Set the logical media size in bytes, deriving `number_of_sectors`
    /// and `number_of_chunks` (rounded up to a whole chunk).
    pub fn set_media_size(&mut self, media_size: u64) -> Result<(), Error> {
        if self.bytes_per_sector == 0 {
            return Err(Error::invalid_value(
                "bytes_per_sector must be set before media_size",
            ));
        }
        self.media_size = media_size;
        self.number_of_sectors = media_size / self.bytes_per_sector as u64;
        if media_size % self.bytes_per_sector as u64 != 0 {
            self.number_of_sectors += 1;
        }
        self.recompute_number_of_chunks();
        Ok(())
    }

    fn recompute_number_of_chunks(&mut self) {
        let chunk_size = self.chunk_size() as u64;
        if chunk_size == 0 {
            self.number_of_chunks = 0;
            return;
        }
        let total_bytes = self.number_of_sectors * self.bytes_per_sector as u64;
        let chunks = total_bytes.div_ceil(chunk_size);
        self.number_of_chunks = chunks as u32;
    }

    /// Verify the §3 size identity: `media_size == number_of_sectors ×
    /// bytes_per_sector` (when `media_size` is known / nonzero).
    pub fn validate(&self) -> Result<(), Error> {
        if self.media_size != 0 {
            let expected = self.number_of_sectors * self.bytes_per_sector as u64;
            if expected != self.media_size {
                return Err(Error::new(
                    Domain::Runtime,
                    Kind::InvalidValue,
                    format!(
                        "media_size {} does not match number_of_sectors*bytes_per_sector {}",
                        self.media_size, expected
                    ),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_is_sectors_times_bytes() {
        let mv = MediaValues::new(512, 64);
        assert_eq!(mv.chunk_size(), 32768);
    }

    #[test]
    fn media_size_rounds_up_partial_sector() {
        let mut mv = MediaValues::new(512, 64);
        mv.set_media_size(1000).unwrap();
        assert_eq!(mv.number_of_sectors, 2);
    }

    #[test]
    fn chunk_count_rounds_up_to_whole_chunks() {
        let mut mv = MediaValues::new(512, 64);
        mv.set_media_size(32768 + 100).unwrap();
        assert_eq!(mv.number_of_chunks, 2);
    }

    #[test]
    fn cannot_change_geometry_after_lock() {
        let mut mv = MediaValues::new(512, 64);
        mv.lock_chunk_size();
        assert!(mv.set_sectors_per_chunk(32).is_err());
    }
}
