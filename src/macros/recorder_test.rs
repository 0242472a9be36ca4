use std::{
    error::Error,
    time::{Duration, Instant},
};

use tempfile::TempDir;

use crate::{
    drivers::procon2::hid_report::REPORT_SIZE,
    macros::{
        player::MacroPlayer,
        recorder::MacroRecorder,
        storage::{MacroError, MacroStore},
    },
};

#[test]
fn test_add_frame_ignored_when_not_recording() {
    let mut recorder = MacroRecorder::new();
    recorder.add_frame(&[1u8; REPORT_SIZE]);
    assert_eq!(recorder.frame_count(), 0);
    assert!(!recorder.is_recording());
}

#[test]
fn test_timestamps_are_relative_and_monotonic() {
    let mut recorder = MacroRecorder::new();
    let start = Instant::now();
    recorder.start_at(start);

    for ms in [0u64, 8, 16, 16, 40] {
        recorder.add_frame_at(&[ms as u8; REPORT_SIZE], start + Duration::from_millis(ms));
    }

    let timestamps: Vec<u64> = recorder.frames().iter().map(|(ts, _)| *ts).collect();
    assert_eq!(timestamps, vec![0, 8_000, 16_000, 16_000, 40_000]);
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(recorder.stop(), (5, 40_000));
    assert!(!recorder.is_recording());
}

#[test]
fn test_frames_are_copied() {
    let mut recorder = MacroRecorder::new();
    let start = Instant::now();
    recorder.start_at(start);

    let mut report = [0u8; REPORT_SIZE];
    recorder.add_frame_at(&report, start);
    report[5] = 0xFF;
    assert_eq!(recorder.frames()[0].1[5], 0);
}

#[test]
fn test_start_clears_buffer() {
    let mut recorder = MacroRecorder::new();
    let start = Instant::now();
    recorder.start_at(start);
    recorder.add_frame_at(&[0u8; REPORT_SIZE], start);
    recorder.stop();

    recorder.start_at(start);
    assert_eq!(recorder.frame_count(), 0);
}

#[test]
fn test_save_clears_buffer() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path());
    let mut recorder = MacroRecorder::new();
    let start = Instant::now();

    recorder.start_at(start);
    recorder.add_frame_at(&[0u8; REPORT_SIZE], start);
    recorder.add_frame_at(&[1u8; REPORT_SIZE], start + Duration::from_millis(10));
    recorder.stop();

    let id = recorder.save(&store, Some("dash"))?;
    assert_eq!(recorder.frame_count(), 0);
    let entry = store.get(id)?;
    assert_eq!(entry.frame_count, 2);
    assert_eq!(entry.duration_ms, 10);

    // Nothing left to save
    assert!(matches!(recorder.save(&store, None), Err(MacroError::NoData)));
    Ok(())
}

#[test]
fn test_recording_replays_same_payloads_in_order() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path());

    let mut recorder = MacroRecorder::new();
    let start = Instant::now();
    recorder.start_at(start);
    let offsets_ms = [0u64, 8, 17, 25, 60];
    for (i, ms) in offsets_ms.iter().enumerate() {
        let mut report = [0u8; REPORT_SIZE];
        report[0] = 0x09;
        report[1] = i as u8;
        report[6] = (ms * 3) as u8;
        recorder.add_frame_at(&report, start + Duration::from_millis(*ms));
    }
    recorder.stop();
    let recorded = recorder.frames().to_vec();
    let id = recorder.save(&store, Some("replay"))?;

    let mut player = MacroPlayer::new();
    player.load(&store, id)?;
    assert_eq!(player.frame_count(), offsets_ms.len());

    let playback_start = Instant::now();
    assert!(player.start_at(false, playback_start));
    let replayed: Vec<_> = recorded
        .iter()
        .map(|(timestamp, _)| {
            player.get_frame_at(playback_start + Duration::from_micros(*timestamp))
        })
        .collect();

    let expected: Vec<_> = recorded.iter().map(|(_, report)| Some(*report)).collect();
    assert_eq!(replayed, expected);
    assert_eq!(player.get_frame_at(playback_start + Duration::from_millis(100)), None);
    Ok(())
}
