//! End-to-end scenarios, `SPEC_FULL.md` §8 S1-S4 and S6 (S5 is covered as
//! a unit test alongside the resume-specific scratch-file helpers in
//! `src/handle.rs`, which needs `super::*` access to hand-assemble a
//! truncated segment).

use exhume_ewf::handle::EwfHandle;
use exhume_ewf::media_values::MediaValues;
use exhume_ewf::odraw;
use exhume_ewf::read_io::ErrorPolicy;
use exhume_ewf::segment::FormatVariant;
use exhume_ewf::write_io::{FormatClass, WriteIoConfig};
use std::path::PathBuf;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ewf_scenarios_{}_{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn config(chunk_size: u64, maximum_segment_size: u64) -> WriteIoConfig {
    WriteIoConfig {
        chunk_size,
        maximum_segment_size,
        unrestrict_offset_table: false,
        format_class: FormatClass::Modern,
    }
}

#[test]
fn s1_empty_image_round_trip() {
    let dir = scratch_dir("s1");
    let base = dir.join("t").to_string_lossy().into_owned();

    let media = MediaValues::new(512, 64); // chunk_size = 32768, media_size left at 0
    let mut handle = EwfHandle::create(&base, FormatVariant::Ewf, media, config(32768, 64 * 1024 * 1024)).unwrap();
    handle.finalize().unwrap();

    assert!(dir.join("t.E01").exists());
    assert!(!dir.join("t.E02").exists());

    let mut reader = EwfHandle::open_read(&format!("{}.E01", base), 4, ErrorPolicy::ZeroFill).unwrap();
    let mut out = vec![0u8; 1024];
    let n = reader.read_buffer(&mut out).unwrap();
    assert_eq!(n, 0);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn s2_one_chunk_zero_image_round_trips() {
    let dir = scratch_dir("s2");
    let base = dir.join("t").to_string_lossy().into_owned();

    let mut media = MediaValues::new(512, 64); // chunk_size = 32768
    media.set_media_size(32768).unwrap();
    let mut handle = EwfHandle::create(&base, FormatVariant::Ewf, media, config(32768, 64 * 1024 * 1024)).unwrap();

    let zeros = vec![0u8; 32768];
    handle.write_buffer(&zeros).unwrap();
    handle.finalize().unwrap();

    let mut reader = EwfHandle::open_read(&format!("{}.E01", base), 4, ErrorPolicy::ZeroFill).unwrap();
    let mut out = vec![0xFFu8; 32768];
    let n = reader.read_buffer(&mut out).unwrap();
    assert_eq!(n, 32768);
    assert!(out.iter().all(|&b| b == 0));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn s3_two_segment_split_reads_back_across_the_boundary() {
    let dir = scratch_dir("s3");
    let base = dir.join("t").to_string_lossy().into_owned();

    let mut media = MediaValues::new(512, 64); // chunk_size = 32768
    media.set_media_size(160 * 1024).unwrap();
    let mut handle = EwfHandle::create(&base, FormatVariant::Ewf, media, config(32768, 64 * 1024)).unwrap();

    let payload = vec![0xAAu8; 160 * 1024];
    handle.write_buffer(&payload).unwrap();
    handle.finalize().unwrap();

    assert!(dir.join("t.E01").exists());
    assert!(dir.join("t.E02").exists(), "160 KiB over a 64 KiB segment cap must split");

    let mut reader = EwfHandle::open_read(&format!("{}.E01", base), 4, ErrorPolicy::ZeroFill).unwrap();
    let mut out = vec![0u8; 16 * 1024];
    let n = reader.read_random(80 * 1024, &mut out).unwrap();
    assert_eq!(n, 16 * 1024);
    assert!(out.iter().all(|&b| b == 0xAA));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn s4_delta_overwrite_takes_precedence_over_the_base_chunk() {
    let dir = scratch_dir("s4");
    let base = dir.join("t").to_string_lossy().into_owned();

    let mut media = MediaValues::new(512, 64); // chunk_size = 32768
    media.set_media_size(160 * 1024).unwrap();
    let mut handle = EwfHandle::create(&base, FormatVariant::Ewf, media, config(32768, 64 * 1024)).unwrap();
    handle.write_buffer(&vec![0xAAu8; 160 * 1024]).unwrap();
    handle.finalize().unwrap();

    let mut reader = EwfHandle::open_read(&format!("{}.E01", base), 4, ErrorPolicy::ZeroFill).unwrap();
    let delta_path = format!("{}.d01", base);
    reader.create_delta_overlay(&delta_path).unwrap();
    // Chunk index 2 (64 KiB..96 KiB) gets overwritten.
    reader.write_delta_chunk(2, vec![0x55u8; 32768]).unwrap();

    let mut overwritten = vec![0u8; 32768];
    reader.read_random(64 * 1024, &mut overwritten).unwrap();
    assert!(overwritten.iter().all(|&b| b == 0x55));

    let mut untouched = vec![0u8; 32768];
    reader.read_random(32 * 1024, &mut untouched).unwrap();
    assert!(untouched.iter().all(|&b| b == 0xAA));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn s6_cue_arithmetic_accounts_the_pregap_to_the_following_track() {
    let text = "REMARK SESSION 01\n\
                FILE \"disc.bin\" BINARY\n\
                TRACK 01 MODE1/2048\n\
                  INDEX 01 00:00:00\n\
                TRACK 02 AUDIO\n\
                  PREGAP 00:02:00\n\
                  INDEX 01 00:02:00\n";

    let descriptor = odraw::cue::parse(text).unwrap();

    assert_eq!(descriptor.tracks.len(), 2);
    assert_eq!(descriptor.tracks[0].start_sector, 0);
    assert_eq!(descriptor.tracks[0].track_type, odraw::TrackType::Mode1Cooked);

    // The PREGAP is a 150-sector (2-second) run credited to track 2, so
    // its INDEX 01 position lands at absolute sector 150.
    assert_eq!(descriptor.tracks[1].start_sector, 150);
    assert_eq!(descriptor.tracks[1].track_type, odraw::TrackType::Audio);

    assert_eq!(descriptor.sessions.len(), 1);
    assert_eq!(descriptor.sessions[0].start_sector, 0);

    let total_track_sectors: u64 = descriptor.tracks.iter().map(|t| t.number_of_sectors).sum();
    assert_eq!(total_track_sectors + 150, descriptor.sessions[0].number_of_sectors);

    let mut previous_start = None;
    for session in &descriptor.sessions {
        if let Some(prev) = previous_start {
            assert!(session.start_sector > prev);
        }
        previous_start = Some(session.start_sector);
    }
}
