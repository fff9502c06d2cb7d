//! Segment file naming (`SPEC_FULL.md` §6) — the three-letter extension
//! rolling sequence shared by every EWF-family format and by delta overlays.
//!
//! The teacher discovers existing segment files with `glob` in `src/ewf.rs`
//! (`find_files`) but never generates names for new ones (read-only); the
//! generator half is new, grounded on the naming table in §6 and on
//! `original_source/libewf/libewf_filename.c`'s extension increment.

use crate::error::Error;

pub const MAX_SEGMENTS: u32 = 14_971;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFamily {
    Ewf,
    Smart,
    Logical,
    Delta,
}

impl FormatFamily {
    fn starting_letter(self) -> char {
        match self {
            FormatFamily::Ewf => 'E',
            FormatFamily::Smart => 's',
            FormatFamily::Logical => 'L',
            FormatFamily::Delta => 'd',
        }
    }
}

/// Compute the three-letter extension for the `segment_number`-th segment
/// (1-based) of the given format family.
///
/// Segments 1..=99 use `<letter>01`..`<letter>99`. Beyond that the two-digit
/// suffix becomes a two-letter `AA`..`ZZ` rolling field, and once that is
/// exhausted the leading letter itself advances, per §6.
pub fn extension_for(family: FormatFamily, segment_number: u32) -> Result<String, Error> {
    if segment_number == 0 || segment_number > MAX_SEGMENTS {
        return Err(Error::value_exceeds_maximum(format!(
            "segment number {} out of range 1..={}",
            segment_number, MAX_SEGMENTS
        )));
    }

    let letter = family.starting_letter();
    if segment_number <= 99 {
        return Ok(format!("{}{:02}", letter, segment_number));
    }

    // segment_number 100 is AA, 101 is AB, ... 125 is AZ, 126 is BA, ...
    let index = segment_number - 100; // 0-based position within the AA.. sequence
    let letters_per_leading = 26 * 26;
    let leading_advance = index / letters_per_leading;
    let within = index % letters_per_leading;
    let first = (b'A' + (within / 26) as u8) as char;
    let second = (b'A' + (within % 26) as u8) as char;

    let base_letter = letter as u8;
    let advanced_letter = (base_letter + leading_advance as u8) as char;

    Ok(format!("{}{}{}", advanced_letter, first, second))
}

/// Build the full segment filename for `base_name` (without extension).
pub fn segment_filename(base_name: &str, family: FormatFamily, segment_number: u32) -> Result<String, Error> {
    Ok(format!("{}.{}", base_name, extension_for(family, segment_number)?))
}

/// Glob pattern to discover every segment file belonging to an image,
/// mirroring the teacher's `find_files` in `src/ewf.rs`.
pub fn glob_pattern(base_name: &str, family: FormatFamily) -> String {
    let letter = family.starting_letter();
    format!("{}.{}??", base_name, letter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_segment_is_e01() {
        assert_eq!(extension_for(FormatFamily::Ewf, 1).unwrap(), "E01");
    }

    #[test]
    fn ninety_ninth_segment() {
        assert_eq!(extension_for(FormatFamily::Ewf, 99).unwrap(), "E99");
    }

    #[test]
    fn hundredth_segment_rolls_to_eaa() {
        assert_eq!(extension_for(FormatFamily::Ewf, 100).unwrap(), "EAA");
    }

    #[test]
    fn rolls_leading_letter_after_zz() {
        // 100 is EAA; EZZ is 100 + 25*26 + 25 = 100 + 675 = 775.
        assert_eq!(extension_for(FormatFamily::Ewf, 775).unwrap(), "EZZ");
        assert_eq!(extension_for(FormatFamily::Ewf, 776).unwrap(), "FAA");
    }

    #[test]
    fn rejects_out_of_range_segment_numbers() {
        assert!(extension_for(FormatFamily::Ewf, 0).is_err());
        assert!(extension_for(FormatFamily::Ewf, MAX_SEGMENTS + 1).is_err());
    }

    #[test]
    fn delta_uses_lowercase_d() {
        assert_eq!(extension_for(FormatFamily::Delta, 1).unwrap(), "d01");
    }
}
