//! Write-IO Coordinator (`SPEC_FULL.md` §4.7, component 11) — decides when
//! to roll chunks-sections and segment files, tracking remaining budget.
//!
//! The teacher has no write path at all; these formulas are transcribed
//! directly from `original_source/libewf/libewf_write_io_handle.c`'s
//! `libewf_write_io_handle_estimate_number_of_chunks_per_segment_file` /
//! `_calculate_chunks_data_size`, adapted to the Rust rendition's explicit
//! `Result`/struct-field shape instead of out-parameters.

use crate::chunk_table::MAX_CHUNKS_PER_RESTRICTED_SECTION;
use crate::error::Error;

/// Reserve one `76`-byte section header for the terminal `next`/`done`.
const TERMINATOR_RESERVE: u64 = 76;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatClass {
    /// EWF-S01 / Encase1: assumes every chunk compresses; uses the `+16`
    /// heuristic and a 2-table-entries-per-chunk layout.
    LegacyCompressedOnly,
    /// EnCase2+/Ex01/FTK/L01: chunks may be stored raw with a trailing
    /// checksum; uses `chunk_size + 4` and a 4-table-entries-per-chunk
    /// layout (`table` + `table2`, 2 bytes overhead counted per entry).
    Modern,
}

/// Tunable write parameters, mirroring the handle-level setters in §6.
#[derive(Debug, Clone, Copy)]
pub struct WriteIoConfig {
    pub chunk_size: u64,
    pub maximum_segment_size: u64,
    pub unrestrict_offset_table: bool,
    pub format_class: FormatClass,
}

/// Per-image, per-segment, per-section running counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteIoState {
    pub remaining_segment_file_size: u64,
    pub chunks_per_segment_file: u32,
    pub chunks_per_section: u32,
    pub number_of_chunks_written_to_segment: u32,
    pub number_of_chunks_written_to_section: u32,
    pub chunks_section_offset: Option<u64>,
}

impl WriteIoConfig {
    /// Per-chunk on-disk cost used by the estimate, per format class.
    fn bytes_per_chunk_estimate(&self) -> u64 {
        match self.format_class {
            FormatClass::LegacyCompressedOnly => self.chunk_size + 16,
            FormatClass::Modern => self.chunk_size + 4,
        }
    }

    fn table_entry_overhead_multiplier(&self) -> u64 {
        match self.format_class {
            FormatClass::LegacyCompressedOnly => 2,
            FormatClass::Modern => 4,
        }
    }

    fn max_chunks_per_section(&self, number_of_chunks_remaining: u32) -> u32 {
        if self.unrestrict_offset_table {
            number_of_chunks_remaining.max(1)
        } else {
            MAX_CHUNKS_PER_RESTRICTED_SECTION
        }
    }

    /// Estimate how many chunks can fit in a fresh segment file, per §4.7's
    /// "Chunks-per-segment estimate".
    pub fn estimate_chunks_per_segment_file(
        &self,
        number_of_chunks_remaining: Option<u32>,
    ) -> Result<u32, Error> {
        if self.chunk_size == 0 {
            return Err(Error::invalid_value("chunk_size must be nonzero"));
        }
        let max_chunks_per_section = self.max_chunks_per_section(
            number_of_chunks_remaining.unwrap_or(MAX_CHUNKS_PER_RESTRICTED_SECTION),
        );

        let reserved = TERMINATOR_RESERVE
            + 3 * 76 // sectors + table + table2 headers
            + self.table_entry_overhead_multiplier() * max_chunks_per_section as u64;

        let available = self.maximum_segment_size.saturating_sub(reserved);
        let per_chunk = self.bytes_per_chunk_estimate();
        let mut estimate = (available / per_chunk).max(1) as u64;

        if let Some(remaining) = number_of_chunks_remaining {
            estimate = estimate.min(remaining as u64);
        }

        Ok(estimate.clamp(1, u32::MAX as u64 / 2) as u32)
    }

    /// Begin tracking a fresh segment file.
    pub fn start_segment(&self, number_of_chunks_remaining: Option<u32>) -> Result<WriteIoState, Error> {
        let chunks_per_segment_file = self.estimate_chunks_per_segment_file(number_of_chunks_remaining)?;
        Ok(WriteIoState {
            remaining_segment_file_size: self.maximum_segment_size,
            chunks_per_segment_file,
            chunks_per_section: self.max_chunks_per_section(
                number_of_chunks_remaining.unwrap_or(MAX_CHUNKS_PER_RESTRICTED_SECTION),
            ),
            number_of_chunks_written_to_segment: 0,
            number_of_chunks_written_to_section: 0,
            chunks_section_offset: None,
        })
    }

    /// §4.7 "Test segment full".
    pub fn is_segment_full(
        &self,
        state: &WriteIoState,
        number_of_chunks_written: u32,
        number_of_chunks: Option<u32>,
    ) -> bool {
        if let Some(total) = number_of_chunks {
            if number_of_chunks_written >= total {
                return true;
            }
        }
        if matches!(self.format_class, FormatClass::LegacyCompressedOnly)
            && state.number_of_chunks_written_to_segment >= state.chunks_per_segment_file
        {
            return true;
        }
        state.remaining_segment_file_size < self.bytes_per_chunk_estimate()
    }

    /// §4.7 "Test chunks-section full".
    pub fn is_section_full(
        &self,
        state: &WriteIoState,
        number_of_chunks_written: u32,
        number_of_chunks: Option<u32>,
    ) -> bool {
        if state.chunks_section_offset.is_none() {
            return false;
        }
        if let Some(total) = number_of_chunks {
            if number_of_chunks_written >= total {
                return true;
            }
        }
        if !self.unrestrict_offset_table
            && state.number_of_chunks_written_to_section >= MAX_CHUNKS_PER_RESTRICTED_SECTION
        {
            return true;
        }
        if (state.number_of_chunks_written_to_section as u64) > (1u64 << 31) {
            return true;
        }
        if matches!(self.format_class, FormatClass::LegacyCompressedOnly)
            && state.number_of_chunks_written_to_section >= state.chunks_per_section
        {
            return true;
        }
        state.remaining_segment_file_size < self.bytes_per_chunk_estimate()
    }
}

impl WriteIoState {
    /// Record one chunk having been packed and written to the current
    /// section/segment.
    pub fn record_chunk_written(&mut self, on_disk_size: u64) {
        self.number_of_chunks_written_to_segment += 1;
        self.number_of_chunks_written_to_section += 1;
        self.remaining_segment_file_size = self.remaining_segment_file_size.saturating_sub(on_disk_size);
    }

    pub fn open_chunks_section(&mut self, offset: u64) {
        self.chunks_section_offset = Some(offset);
        self.number_of_chunks_written_to_section = 0;
    }

    pub fn close_chunks_section(&mut self) {
        self.chunks_section_offset = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modern_config() -> WriteIoConfig {
        WriteIoConfig {
            chunk_size: 32768,
            maximum_segment_size: 1024 * 1024 * 1024,
            unrestrict_offset_table: false,
            format_class: FormatClass::Modern,
        }
    }

    #[test]
    fn estimate_is_bounded_by_known_media_size() {
        let config = modern_config();
        let estimate = config.estimate_chunks_per_segment_file(Some(5)).unwrap();
        assert_eq!(estimate, 5);
    }

    #[test]
    fn estimate_is_at_least_one() {
        let mut config = modern_config();
        config.maximum_segment_size = 100; // far too small for even one chunk's overhead
        let estimate = config.estimate_chunks_per_segment_file(None).unwrap();
        assert_eq!(estimate, 1);
    }

    #[test]
    fn segment_full_when_remaining_size_below_chunk_cost() {
        let config = modern_config();
        let mut state = config.start_segment(None).unwrap();
        state.remaining_segment_file_size = 10;
        assert!(config.is_segment_full(&state, 0, None));
    }

    #[test]
    fn section_full_respects_restricted_cap() {
        let config = modern_config();
        let mut state = config.start_segment(None).unwrap();
        state.open_chunks_section(1000);
        state.number_of_chunks_written_to_section = MAX_CHUNKS_PER_RESTRICTED_SECTION;
        assert!(config.is_section_full(&state, 0, None));
    }

    #[test]
    fn section_not_full_before_chunks_section_is_opened() {
        let config = modern_config();
        let state = config.start_segment(None).unwrap();
        assert!(!config.is_section_full(&state, 0, None));
    }
}
