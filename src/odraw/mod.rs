//! CUE/TOC Descriptor Parser (`SPEC_FULL.md` §4.10, component 16) — the
//! session/track/index semantic-action engine shared by [`cue`] and
//! [`toc`], which differ only in their top-level keyword set.
//!
//! The teacher has no optical-disc descriptor support at all; grounded
//! entirely on `original_source/libodraw/libodraw_cue_parser.c`'s
//! `cue_parser_state_t` (the YACC semantic-value struct) and its track/
//! session/lead-out closure actions, reimplemented as explicit method
//! calls on [`ParserState`] instead of grammar reductions.

pub mod cue;
pub mod toc;

use crate::error::Error;

/// Minute:Second:Frame timecode, 75 frames/second, per §4.10/GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Msf {
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
}

pub const FRAMES_PER_SECOND: u32 = 75;
pub const SECONDS_PER_MINUTE: u32 = 60;

impl Msf {
    /// Parse `MM:SS:FF`.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() != 3 {
            return Err(Error::invalid_value(format!("'{}' is not a valid MSF", text)));
        }
        let minutes = parts[0]
            .parse()
            .map_err(|_| Error::invalid_value(format!("invalid MSF minutes in '{}'", text)))?;
        let seconds: u32 = parts[1]
            .parse()
            .map_err(|_| Error::invalid_value(format!("invalid MSF seconds in '{}'", text)))?;
        let frames: u32 = parts[2]
            .parse()
            .map_err(|_| Error::invalid_value(format!("invalid MSF frames in '{}'", text)))?;
        if seconds >= SECONDS_PER_MINUTE || frames >= FRAMES_PER_SECOND {
            return Err(Error::invalid_value(format!(
                "MSF '{}' has an out-of-range seconds/frames field",
                text
            )));
        }
        Ok(Msf { minutes, seconds, frames })
    }

    /// Convert to an absolute frame count (LBA units), per GLOSSARY.
    pub fn to_frames(self) -> u64 {
        (self.minutes as u64 * SECONDS_PER_MINUTE as u64 + self.seconds as u64) * FRAMES_PER_SECOND as u64
            + self.frames as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Audio,
    Cdg,
    Mode1Cooked,
    Mode1Raw,
    Mode2Formless,
    Mode2Cooked2324,
    Mode2Cooked2336,
    Mode2Raw,
    Cdi2336,
    Cdi2352,
    Unknown,
}

impl TrackType {
    /// Map a CUE/TOC mode string to a track type, per §4.10's mode table.
    pub fn from_mode_string(mode: &str) -> TrackType {
        match mode.to_ascii_uppercase().as_str() {
            "AUDIO" => TrackType::Audio,
            "CDG" => TrackType::Cdg,
            "MODE1/2048" => TrackType::Mode1Cooked,
            "MODE1/2352" => TrackType::Mode1Raw,
            "MODE2/2048" => TrackType::Mode2Formless,
            "MODE2/2324" => TrackType::Mode2Cooked2324,
            "MODE2/2336" => TrackType::Mode2Cooked2336,
            "MODE2/2352" => TrackType::Mode2Raw,
            "CDI/2336" => TrackType::Cdi2336,
            "CDI/2352" => TrackType::Cdi2352,
            _ => TrackType::Unknown,
        }
    }
}

/// CD-TEXT key/value side-table (§1.2's "CD-TEXT fields").
#[derive(Debug, Clone, Default)]
pub struct CdText {
    pub title: Option<String>,
    pub performer: Option<String>,
    pub songwriter: Option<String>,
    pub composer: Option<String>,
    pub arranger: Option<String>,
    pub message: Option<String>,
    pub disc_id: Option<String>,
    pub genre: Option<String>,
    pub toc_info1: Option<String>,
    pub toc_info2: Option<String>,
    pub upc_ean: Option<String>,
    pub size_info: Option<String>,
}

impl CdText {
    pub fn set_field(&mut self, keyword: &str, value: String) -> bool {
        match keyword.to_ascii_uppercase().as_str() {
            "TITLE" => self.title = Some(value),
            "PERFORMER" => self.performer = Some(value),
            "SONGWRITER" => self.songwriter = Some(value),
            "COMPOSER" => self.composer = Some(value),
            "ARRANGER" => self.arranger = Some(value),
            "MESSAGE" => self.message = Some(value),
            "DISC_ID" => self.disc_id = Some(value),
            "GENRE" => self.genre = Some(value),
            "TOC_INFO1" => self.toc_info1 = Some(value),
            "TOC_INFO2" => self.toc_info2 = Some(value),
            "UPC_EAN" => self.upc_ean = Some(value),
            "SIZE_INFO" => self.size_info = Some(value),
            _ => return false,
        }
        true
    }
}

/// One `INDEX`/`PREGAP`-derived index point within a track, relative sector
/// per §4.10 ("00 = pre-gap start, 01 = track start, 02+ = sub-indexes").
#[derive(Debug, Clone, Copy)]
pub struct TrackIndex {
    pub number: u8,
    pub start_sector: u64,
}

/// A closed track, emitted by [`ParserState::close_track`] per §4.10.
#[derive(Debug, Clone)]
pub struct Track {
    pub number: u32,
    pub track_type: TrackType,
    pub start_sector: u64,
    pub number_of_sectors: u64,
    pub file_index: usize,
    pub file_sector_offset: u64,
    pub isrc: Option<String>,
    pub flags: Vec<String>,
    pub cdtext: CdText,
    pub indexes: Vec<TrackIndex>,
}

/// A closed session, emitted by [`ParserState::close_session`].
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub number: u32,
    pub start_sector: u64,
    pub number_of_sectors: u64,
}

/// One backing file referenced by a `FILE` clause.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: String,
    pub file_type: String,
}

/// Fully parsed descriptor: every file, session, and track discovered.
#[derive(Debug, Clone, Default)]
pub struct Descriptor {
    pub catalog: Option<String>,
    pub cdtextfile: Option<String>,
    pub cdtext: CdText,
    pub files: Vec<FileEntry>,
    pub sessions: Vec<Session>,
    pub tracks: Vec<Track>,
    pub lead_outs: Vec<u64>,
}

/// Semantic-action engine shared by the CUE and TOC front ends. Tracks the
/// running `file_sector`/`previous_file_sector` bookkeeping §4.10 requires
/// because `INDEX`/`PREGAP`/`LEAD-OUT` MSFs are relative to the enclosing
/// `FILE`, plus the strictly-increasing session/track/index numbering
/// invariants.
#[derive(Default)]
pub struct ParserState {
    pub descriptor: Descriptor,
    current_file_index: Option<usize>,
    file_sector: u64,

    previous_session: u32,
    current_session: u32,
    session_start_sector: u64,

    previous_track: u32,
    current_track: u32,
    track_start_sector: u64,
    track_file_index: usize,
    track_file_sector_offset: u64,
    track_type: TrackType,
    track_isrc: Option<String>,
    track_flags: Vec<String>,
    track_cdtext: CdText,
    track_indexes: Vec<TrackIndex>,
    track_open: bool,
}

impl ParserState {
    pub fn new() -> Self {
        ParserState {
            track_type: TrackType::Unknown,
            ..Default::default()
        }
    }

    pub fn begin_file(&mut self, path: &str, file_type: &str) {
        self.descriptor.files.push(FileEntry {
            path: path.to_string(),
            file_type: file_type.to_string(),
        });
        self.current_file_index = Some(self.descriptor.files.len() - 1);
        self.file_sector = 0;
    }

    pub fn begin_session(&mut self, number: u32) -> Result<(), Error> {
        if self.current_session != 0 {
            self.close_session(self.file_sector);
        }
        if number != 0 && number != self.previous_session + 1 {
            return Err(Error::invalid_value(format!(
                "session number {} is not one greater than the previous session {}",
                number, self.previous_session
            )));
        }
        self.current_session = number;
        self.session_start_sector = self.file_sector;
        Ok(())
    }

    fn close_session(&mut self, end_sector: u64) {
        if self.current_session == 0 {
            return;
        }
        self.descriptor.sessions.push(Session {
            number: self.current_session,
            start_sector: self.session_start_sector,
            number_of_sectors: end_sector.saturating_sub(self.session_start_sector),
        });
        self.previous_session = self.current_session;
        self.current_session = 0;
    }

    pub fn begin_track(&mut self, number: u32, mode: &str) -> Result<(), Error> {
        let file_index = self
            .current_file_index
            .ok_or_else(|| Error::invalid_value("TRACK declared with no enclosing FILE"))?;

        self.close_track_if_open();

        if number != 0 && number != self.previous_track + 1 {
            return Err(Error::invalid_value(format!(
                "track number {} is not one greater than the previous track {}",
                number, self.previous_track
            )));
        }

        self.current_track = number;
        self.track_start_sector = self.file_sector;
        self.track_file_index = file_index;
        self.track_file_sector_offset = self.file_sector;
        self.track_type = TrackType::from_mode_string(mode);
        self.track_isrc = None;
        self.track_flags.clear();
        self.track_cdtext = CdText::default();
        self.track_indexes.clear();
        self.track_open = true;
        Ok(())
    }

    fn close_track_if_open(&mut self) {
        if !self.track_open {
            return;
        }
        let number_of_sectors = self.file_sector.saturating_sub(self.track_start_sector);
        self.descriptor.tracks.push(Track {
            number: self.current_track,
            track_type: self.track_type,
            start_sector: self.track_start_sector,
            number_of_sectors,
            file_index: self.track_file_index,
            file_sector_offset: self.track_file_sector_offset,
            isrc: self.track_isrc.take(),
            flags: std::mem::take(&mut self.track_flags),
            cdtext: std::mem::take(&mut self.track_cdtext),
            indexes: std::mem::take(&mut self.track_indexes),
        });
        self.previous_track = self.current_track;
        self.track_open = false;
    }

    pub fn set_isrc(&mut self, code: &str) {
        self.track_isrc = Some(code.to_string());
    }

    pub fn add_flag(&mut self, flag: &str) {
        self.track_flags.push(flag.to_string());
    }

    pub fn set_cdtext(&mut self, keyword: &str, value: String, in_track: bool) -> bool {
        if in_track && self.track_open {
            self.track_cdtext.set_field(keyword, value)
        } else {
            self.descriptor.cdtext.set_field(keyword, value)
        }
    }

    /// Record an `INDEX <n> <msf>`; the MSF is relative to the enclosing
    /// `FILE`, so it advances `file_sector` per §4.10.
    pub fn add_index(&mut self, number: u8, msf: Msf) -> Result<(), Error> {
        let expected_min = self.track_indexes.last().map(|i| i.number + 1).unwrap_or(0);
        if number < expected_min {
            return Err(Error::invalid_value(format!(
                "index number {} is not increasing (expected >= {})",
                number, expected_min
            )));
        }
        let absolute = self.track_file_sector_offset + msf.to_frames();
        self.file_sector = absolute;
        self.track_indexes.push(TrackIndex {
            number,
            start_sector: absolute,
        });
        if number == 1 {
            self.track_start_sector = absolute;
        }
        Ok(())
    }

    pub fn add_pregap(&mut self, msf: Msf) {
        self.file_sector = self.track_file_sector_offset + msf.to_frames();
    }

    pub fn add_postgap(&mut self, msf: Msf) {
        self.file_sector += msf.to_frames();
    }

    pub fn set_lead_out(&mut self, msf: Msf) {
        let absolute = self.file_sector.max(msf.to_frames());
        self.descriptor.lead_outs.push(absolute);
        self.file_sector = absolute;
    }

    pub fn finish(mut self) -> Descriptor {
        self.close_track_if_open();
        self.close_session(self.file_sector);
        self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msf_roundtrips_known_value() {
        let msf = Msf::parse("01:02:03").unwrap();
        assert_eq!(msf.to_frames(), (62 * 75) + 3);
    }

    #[test]
    fn msf_rejects_out_of_range_fields() {
        assert!(Msf::parse("00:75:00").is_err());
        assert!(Msf::parse("00:00:75").is_err());
    }

    #[test]
    fn track_mode_maps_to_type() {
        assert_eq!(TrackType::from_mode_string("AUDIO"), TrackType::Audio);
        assert_eq!(TrackType::from_mode_string("MODE1/2352"), TrackType::Mode1Raw);
    }

    #[test]
    fn session_and_track_numbering_must_increase_by_one() {
        let mut state = ParserState::new();
        state.begin_file("a.bin", "BINARY");
        state.begin_session(1).unwrap();
        state.begin_track(1, "AUDIO").unwrap();
        assert!(state.begin_track(3, "AUDIO").is_err());
    }
}
