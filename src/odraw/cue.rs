//! CUE front end: tokenizes and parses `.cue` sheets into a [`Descriptor`]
//! via the shared [`ParserState`] semantic-action engine.
//!
//! Keyword set transcribed from the YACC token table in
//! `original_source/libodraw/libodraw_cue_parser.c` (`CUE_CATALOG`,
//! `CUE_CDTEXTFILE`, `CUE_FILE`, `CUE_TRACK`, `CUE_INDEX`, `CUE_ISRC`,
//! `CUE_FLAGS`, `CUE_PREGAP`, `CUE_POSTGAP`, `CUE_REMARK*`, and the
//! `CUE_CDTEXT_*` fields), implemented as a hand-written line scanner
//! instead of a generated LALR table per `SPEC_FULL.md` §1 Out-of-scope.

use super::{Msf, ParserState};
use crate::error::Error;

const CDTEXT_KEYWORDS: &[&str] = &[
    "TITLE",
    "PERFORMER",
    "SONGWRITER",
    "COMPOSER",
    "ARRANGER",
    "MESSAGE",
    "DISC_ID",
    "GENRE",
    "TOC_INFO1",
    "TOC_INFO2",
    "UPC_EAN",
    "SIZE_INFO",
];

/// Split a CUE line into whitespace-separated tokens, honoring
/// `"quoted strings"` as a single token, per §6 "CUE on-the-wire text".
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut s = String::new();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                s.push(c);
            }
            tokens.push(s);
            continue;
        }
        let mut s = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            s.push(c);
            chars.next();
        }
        tokens.push(s);
    }
    tokens
}

/// Parse an entire `.cue` sheet's text into a [`super::Descriptor`].
pub fn parse(text: &str) -> Result<super::Descriptor, Error> {
    let mut state = ParserState::new();
    let mut in_track = false;

    let text = text.trim_start_matches('\u{FEFF}');
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let tokens = tokenize(line);
        if tokens.is_empty() {
            continue;
        }
        let keyword = tokens[0].to_ascii_uppercase();

        if keyword == "REM" {
            // A bare REM is a pass-through comment unless it matches one
            // of the recognised REMARK forms handled below via REMARK.
            continue;
        }

        match keyword.as_str() {
            "CATALOG" => {
                state.descriptor.catalog = tokens.get(1).cloned();
            }
            "CDTEXTFILE" => {
                state.descriptor.cdtextfile = tokens.get(1).cloned();
            }
            "FILE" => {
                let path = tokens
                    .get(1)
                    .ok_or_else(|| Error::invalid_value("FILE requires a path"))?;
                let file_type = tokens.get(2).cloned().unwrap_or_default();
                state.begin_file(path, &file_type);
            }
            "TRACK" => {
                let number: u32 = tokens
                    .get(1)
                    .ok_or_else(|| Error::invalid_value("TRACK requires a number"))?
                    .parse()
                    .map_err(|_| Error::invalid_value("TRACK number is not numeric"))?;
                let mode = tokens
                    .get(2)
                    .ok_or_else(|| Error::invalid_value("TRACK requires a mode"))?;
                state.begin_track(number, mode)?;
                in_track = true;
            }
            "ISRC" => {
                let code = tokens
                    .get(1)
                    .ok_or_else(|| Error::invalid_value("ISRC requires a code"))?;
                state.set_isrc(code);
            }
            "FLAGS" => {
                for flag in &tokens[1..] {
                    state.add_flag(flag);
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
            "POSTGAP" => {
                let msf = Msf::parse(
                    tokens
                        .get(1)
                        .ok_or_else(|| Error::invalid_value("POSTGAP requires an MSF"))?,
                )?;
                state.add_postgap(msf);
            }
            "INDEX" => {
                let number: u8 = tokens
                    .get(1)
                    .ok_or_else(|| Error::invalid_value("INDEX requires a number"))?
                    .parse()
                    .map_err(|_| Error::invalid_value("INDEX number is not numeric"))?;
                let msf = Msf::parse(
                    tokens
                        .get(2)
                        .ok_or_else(|| Error::invalid_value("INDEX requires an MSF"))?,
                )?;
                state.add_index(number, msf)?;
            }
            "REMARK" => {
                parse_remark(&tokens, &mut state)?;
            }
            other if CDTEXT_KEYWORDS.contains(&other) => {
                let value = tokens.get(1).cloned().unwrap_or_default();
                state.set_cdtext(other, value, in_track);
            }
            _ => {
                // Unrecognised keyword: ignored, matching libodraw's
                // forward-compatible stance on unknown REM-prefixed lines.
            }
        }
    }

    Ok(state.finish())
}

fn parse_remark(tokens: &[String], state: &mut ParserState) -> Result<(), Error> {
    let sub = tokens.get(1).map(|s| s.to_ascii_uppercase()).unwrap_or_default();
    match sub.as_str() {
        "SESSION" => {
            let number: u32 = tokens
                .get(2)
                .ok_or_else(|| Error::invalid_value("REMARK SESSION requires a number"))?
                .parse()
                .map_err(|_| Error::invalid_value("REMARK SESSION number is not numeric"))?;
            state.begin_session(number)
        }
        "LEAD-OUT" => {
            let msf = Msf::parse(
                tokens
                    .get(2)
                    .ok_or_else(|| Error::invalid_value("REMARK LEAD-OUT requires an MSF"))?,
            )?;
            state.set_lead_out(msf);
            Ok(())
        }
        "RUN-OUT" => {
            let msf = Msf::parse(
                tokens
                    .get(2)
                    .ok_or_else(|| Error::invalid_value("REMARK RUN-OUT requires an MSF"))?,
            )?;
            state.set_lead_out(msf);
            Ok(())
        }
        "ORIGINAL" => Ok(()), // "REMARK ORIGINAL MEDIA TYPE ..." — informational only
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_session_two_track_sheet() {
        let text = r#"
            FILE "image.bin" BINARY
            REMARK SESSION 01
            TRACK 01 AUDIO
              INDEX 01 00:00:00
            TRACK 02 AUDIO
              INDEX 00 00:02:00
              INDEX 01 00:04:00
        "#;
        let descriptor = parse(text).unwrap();
        assert_eq!(descriptor.files.len(), 1);
        assert_eq!(descriptor.tracks.len(), 2);
        assert_eq!(descriptor.tracks[0].number, 1);
        assert_eq!(descriptor.tracks[1].indexes.len(), 2);
        assert_eq!(descriptor.sessions.len(), 1);
    }

    #[test]
    fn parses_cdtext_and_catalog() {
        let text = r#"
            CATALOG 1234567890123
            FILE "image.bin" BINARY
            TRACK 01 AUDIO
              TITLE "My Title"
              PERFORMER "An Artist"
              INDEX 01 00:00:00
        "#;
        let descriptor = parse(text).unwrap();
        assert_eq!(descriptor.catalog.as_deref(), Some("1234567890123"));
        assert_eq!(descriptor.tracks[0].cdtext.title.as_deref(), Some("My Title"));
    }

    #[test]
    fn rejects_non_increasing_track_numbers() {
        let text = r#"
            FILE "image.bin" BINARY
            TRACK 01 AUDIO
              INDEX 01 00:00:00
            TRACK 05 AUDIO
              INDEX 01 00:05:00
        "#;
        assert!(parse(text).is_err());
    }
}
