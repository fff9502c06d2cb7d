//! TOC front end: a second parser module sharing the session/track/index
//! semantic actions with [`super::cue`], differing only in a richer
//! keyword set, per `SPEC_FULL.md` §4.10/§1.2 ("TOC files differ only in a
//! slightly richer keyword set").
//!
//! Keywords added over CUE: `TOC`, `CD_DA`/`CD_ROM`/`CD_ROM_XA` mode/session
//! preambles, `SILENCE`, `START`, `ZERO`, `COPY`/`NO COPY`,
//! `PRE_EMPHASIS`/`NO PRE_EMPHASIS`. `TRACK` in TOC names its mode directly
//! (`AUDIO`, `MODE1`, `MODE2_FORM1`, …) without the CUE `MODE/size` form, so
//! mode strings are normalised before reaching the shared `TrackType`
//! mapping.

use super::{Msf, ParserState, TrackType};
use crate::error::Error;

fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace()
        .map(|s| s.trim_matches('"').to_string())
        .collect()
}

/// Normalise a TOC-style mode keyword to the CUE `MODE/size` spelling the
/// shared [`TrackType::from_mode_string`] understands.
fn normalise_mode(mode: &str) -> &'static str {
    match mode.to_ascii_uppercase().as_str() {
        "AUDIO" => "AUDIO",
        "MODE1" => "MODE1/2048",
        "MODE1_RAW" => "MODE1/2352",
        "MODE2" => "MODE2/2048",
        "MODE2_FORM1" => "MODE2/2324",
        "MODE2_FORM2" => "MODE2/2336",
        "MODE2_RAW" => "MODE2/2352",
        _ => "UNKNOWN",
    }
}

/// Parse an entire `.toc` sheet's text into a [`super::Descriptor`].
pub fn parse(text: &str) -> Result<super::Descriptor, Error> {
    let mut state = ParserState::new();
    let mut session_counter = 0u32;
    let mut track_counter = 0u32;
    let mut in_track = false;

    let text = text.trim_start_matches('\u{FEFF}');
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        let tokens = tokenize(line);
        if tokens.is_empty() {
            continue;
        }
        let keyword = tokens[0].to_ascii_uppercase();

        match keyword.as_str() {
            "TOC" => {
                // "TOC CD_DA"/"TOC CD_ROM"/"TOC CD_ROM_XA" preamble: informational.
            }
            "CD_DA" | "CD_ROM" | "CD_ROM_XA" => {
                session_counter += 1;
                state.begin_session(session_counter)?;
            }
            "CATALOG" => {
                state.descriptor.catalog = tokens.get(1).cloned();
            }
            "CD_TEXT" => {
                // CD-TEXT block opener; fields that follow use the shared
                // CD-TEXT keyword set already recognised below.
            }
            "TRACK" => {
                track_counter += 1;
                let mode = tokens
                    .get(1)
                    .ok_or_else(|| Error::invalid_value("TRACK requires a mode"))?;
                state.begin_track(track_counter, normalise_mode(mode))?;
                in_track = true;
            }
            "SILENCE" | "ZERO" => {
                // Inserted silence/zeroed run of sectors before the next
                // INDEX; TOC expresses its length directly in sectors.
                if let Some(count) = tokens.get(1).and_then(|s| s.parse::<u32>().ok()) {
                    state.add_pregap(Msf {
                        minutes: 0,
                        seconds: 0,
                        frames: count % super::FRAMES_PER_SECOND,
                    });
                }
            }
            "START" => {
                if let Some(msf_text) = tokens.get(1) {
                    let msf = Msf::parse(msf_text)?;
                    state.add_index(1, msf)?;
                }
            }
            "PREGAP" => {
                let msf = Msf::parse(
                    tokens
                        .get(1)
                        .ok_or_else(|| Error::invalid_value("PREGAP requires an MSF"))?,
                )?;
                state.add_pregap(msf);
            }
            "INDEX" => {
                let msf = Msf::parse(
                    tokens
                        .get(1)
                        .ok_or_else(|| Error::invalid_value("INDEX requires an MSF"))?,
                )?;
                let next_index = 2u8; // TOC's bare INDEX always introduces a sub-index after track-start.
                state.add_index(next_index, msf)?;
            }
            "ISRC" => {
                if let Some(code) = tokens.get(1) {
                    state.set_isrc(code);
                }
            }
            "COPY" | "NO" => {
                // "COPY"/"NO COPY"/"PRE_EMPHASIS"/"NO PRE_EMPHASIS" flags.
                state.add_flag(&tokens.join("_"));
            }
            "PRE_EMPHASIS" => {
                state.add_flag("PRE_EMPHASIS");
            }
            keyword if super::CdText::default().set_field(keyword, String::new()) => {
                let value = tokens.get(1).cloned().unwrap_or_default();
                state.set_cdtext(keyword, value, in_track);
            }
            _ => {}
        }
    }

    Ok(state.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toc() {
        let text = r#"
            TOC CD_DA
            TRACK AUDIO
            START 00:00:00
            TRACK AUDIO
            START 00:02:00
        "#;
        let descriptor = parse(text).unwrap();
        assert_eq!(descriptor.tracks.len(), 2);
        assert_eq!(descriptor.tracks[0].track_type, TrackType::Audio);
        assert_eq!(descriptor.sessions.len(), 1);
    }
}
