use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::macros::player::DEFAULT_SPEED;

/// Bridge state exposed to the control surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub macro_mode: bool,
    pub recording: bool,
    pub playing: bool,
    pub current_slot: usize,
    pub slot_count: usize,
    pub current_macro_name: Option<String>,
    pub playback_speed: f64,
    pub connected: bool,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            macro_mode: false,
            recording: false,
            playing: false,
            current_slot: 0,
            slot_count: 0,
            current_macro_name: None,
            playback_speed: DEFAULT_SPEED,
            connected: false,
        }
    }
}

/// Poll a watch channel at a fixed interval and call `on_change` with the
/// latest value whenever it differs from the last one delivered. The first
/// poll always delivers. Values replaced between two polls are coalesced.
/// Returns once the sender is dropped. A zero interval polls every
/// millisecond.
pub async fn publish_changes<T, F, Fut>(
    mut rx: watch::Receiver<T>,
    interval: Duration,
    mut on_change: F,
) where
    T: Clone + PartialEq,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    // A zero period is not a valid interval
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last: Option<T> = None;
    loop {
        ticker.tick().await;
        let closed = rx.has_changed().is_err();
        let value = rx.borrow_and_update().clone();
        if last.as_ref() != Some(&value) {
            on_change(value.clone()).await;
            last = Some(value);
        }
        if closed {
            log::debug!("Sender closed, stopping publisher");
            return;
        }
    }
}
