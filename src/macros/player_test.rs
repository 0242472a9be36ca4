use std::{
    error::Error,
    fs,
    time::{Duration, Instant},
};

use tempfile::TempDir;

use crate::{
    drivers::procon2::hid_report::{RawFrame, REPORT_SIZE},
    macros::{
        player::{MacroPlayer, PlayerState, SPEED_PRESETS},
        storage::{MacroError, MacroStore},
    },
};

fn report(marker: u8) -> RawFrame {
    [marker; REPORT_SIZE]
}

/// Store holding one macro with frames at 0, 10, 20 and 50 ms
fn store_with_macro() -> Result<(TempDir, MacroStore, u32), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path());
    let frames = vec![
        (0, report(1)),
        (10_000, report(2)),
        (20_000, report(3)),
        (50_000, report(4)),
    ];
    let id = store.save(&frames, Some("test"))?;
    Ok((dir, store, id))
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[test]
fn test_load_and_state_transitions() -> Result<(), Box<dyn Error>> {
    let (_dir, store, id) = store_with_macro()?;
    let mut player = MacroPlayer::new();
    assert_eq!(player.state(), PlayerState::Idle);
    assert!(!player.start(false));

    player.load(&store, id)?;
    assert_eq!(player.state(), PlayerState::Loaded);
    assert_eq!(player.loaded_id(), Some(id));
    assert_eq!(player.frame_count(), 4);

    assert!(player.start(false));
    assert_eq!(player.state(), PlayerState::Playing);

    player.stop();
    assert_eq!(player.state(), PlayerState::Idle);
    assert_eq!(player.get_frame(), None);

    player.close();
    assert_eq!(player.loaded_id(), None);
    assert!(!player.start(false));
    Ok(())
}

#[test]
fn test_zero_order_hold_playback() -> Result<(), Box<dyn Error>> {
    let (_dir, store, id) = store_with_macro()?;
    let mut player = MacroPlayer::new();
    player.load(&store, id)?;
    let start = Instant::now();
    assert!(player.start_at(false, start));

    assert_eq!(player.get_frame_at(start), Some(report(1)));
    assert_eq!(player.get_frame_at(start + ms(5)), Some(report(1)));
    assert_eq!(player.get_frame_at(start + ms(10)), Some(report(2)));
    // Between timestamps the most recently due frame is held
    assert_eq!(player.get_frame_at(start + ms(30)), Some(report(3)));
    assert_eq!(player.get_frame_at(start + ms(49)), Some(report(3)));

    // The final frame is returned exactly once more, then nothing
    assert_eq!(player.get_frame_at(start + ms(50)), Some(report(4)));
    assert_eq!(player.state(), PlayerState::Idle);
    assert_eq!(player.get_frame_at(start + ms(60)), None);
    assert_eq!(player.get_frame_at(start + ms(1000)), None);
    Ok(())
}

#[test]
fn test_late_tick_jumps_to_last_frame() -> Result<(), Box<dyn Error>> {
    let (_dir, store, id) = store_with_macro()?;
    let mut player = MacroPlayer::new();
    player.load(&store, id)?;
    let start = Instant::now();
    player.start_at(false, start);

    assert_eq!(player.get_frame_at(start + ms(500)), Some(report(4)));
    assert_eq!(player.get_frame_at(start + ms(501)), None);
    Ok(())
}

#[test]
fn test_nothing_due_yet() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path());
    let id = store.save(&[(20_000, report(7))], None)?;

    let mut player = MacroPlayer::new();
    player.load(&store, id)?;
    let start = Instant::now();
    player.start_at(false, start);
    assert_eq!(player.get_frame_at(start + ms(10)), None);
    assert!(player.is_playing());
    assert_eq!(player.get_frame_at(start + ms(20)), Some(report(7)));
    assert!(!player.is_playing());
    Ok(())
}

#[test]
fn test_looping_restarts_clock() -> Result<(), Box<dyn Error>> {
    let (_dir, store, id) = store_with_macro()?;
    let mut player = MacroPlayer::new();
    player.load(&store, id)?;
    let start = Instant::now();
    player.start_at(true, start);

    // Reaching the end restarts the cursor and the clock at this instant
    assert_eq!(player.get_frame_at(start + ms(50)), Some(report(4)));
    assert_eq!(player.state(), PlayerState::Playing);
    assert_eq!(player.cursor(), 0);

    // Held until the first frame of the next pass is consumed
    let restart = start + ms(50);
    assert_eq!(player.get_frame_at(restart), Some(report(1)));
    assert_eq!(player.get_frame_at(restart + ms(10)), Some(report(2)));
    Ok(())
}

#[test]
fn test_restart_after_finish() -> Result<(), Box<dyn Error>> {
    let (_dir, store, id) = store_with_macro()?;
    let mut player = MacroPlayer::new();
    player.load(&store, id)?;
    let start = Instant::now();
    player.start_at(false, start);
    player.get_frame_at(start + ms(100));
    assert_eq!(player.state(), PlayerState::Idle);

    // The trace stays mapped, so it can be played again
    let again = start + ms(200);
    assert!(player.start_at(false, again));
    assert_eq!(player.get_frame_at(again), Some(report(1)));
    Ok(())
}

#[test]
fn test_speed_scales_time() -> Result<(), Box<dyn Error>> {
    let (_dir, store, id) = store_with_macro()?;
    let mut player = MacroPlayer::new();
    player.load(&store, id)?;
    player.set_speed(2.0);
    let start = Instant::now();
    player.start_at(false, start);

    assert_eq!(player.get_frame_at(start + ms(5)), Some(report(2)));
    assert_eq!(player.get_frame_at(start + ms(25)), Some(report(4)));
    Ok(())
}

#[test]
fn test_failed_load_leaves_player_idle() -> Result<(), Box<dyn Error>> {
    let (_dir, store, id) = store_with_macro()?;
    let mut player = MacroPlayer::new();
    player.load(&store, id)?;

    assert!(matches!(
        player.load(&store, 42),
        Err(MacroError::NotFound(42))
    ));
    assert_eq!(player.state(), PlayerState::Idle);
    assert_eq!(player.loaded_id(), None);

    // Corrupt trace
    let path = store.trace_path(&store.get(id)?);
    fs::write(&path, b"MAC2")?;
    assert!(player.load(&store, id).is_err());
    assert_eq!(player.state(), PlayerState::Idle);
    Ok(())
}

#[test]
fn test_truncated_trace_is_rejected() -> Result<(), Box<dyn Error>> {
    let (_dir, store, id) = store_with_macro()?;
    let path = store.trace_path(&store.get(id)?);
    let bytes = fs::read(&path)?;
    fs::write(&path, &bytes[..bytes.len() - 10])?;

    let mut player = MacroPlayer::new();
    assert!(matches!(
        player.load(&store, id),
        Err(MacroError::Truncated { .. })
    ));
    Ok(())
}

#[test]
fn test_set_speed_clamps() {
    let mut player = MacroPlayer::new();
    assert_eq!(player.speed(), 1.0);
    player.set_speed(10.0);
    assert_eq!(player.speed(), 4.0);
    player.set_speed(0.01);
    assert_eq!(player.speed(), 0.25);
    player.set_speed(f64::NAN);
    assert_eq!(player.speed(), 1.0);
}

#[test]
fn test_cycle_speed_wraps() {
    let mut player = MacroPlayer::new();
    let mut seen = Vec::new();
    for _ in 0..SPEED_PRESETS.len() {
        player.cycle_speed();
        seen.push(player.speed());
    }
    assert_eq!(seen, vec![2.0, 4.0, 0.25, 0.5, 1.0]);

    // Unknown speeds advance as if they were 1x
    player.set_speed(1.5);
    player.cycle_speed();
    assert_eq!(player.speed(), 2.0);
}
