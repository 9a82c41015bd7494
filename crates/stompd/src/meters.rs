//! Clip indicator with per-channel hold-off.
//!
//! The monitor fires a level sample per audio block; forwarding every
//! clipped block would flood the panel link. Each channel therefore
//! re-arms only after a hold-off once a clip has been reported.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::panel::ControlPanel;

const CLIP_HOLDOFF: Duration = Duration::from_secs(1);

/// Levels at or above this are a clip. The monitor reports in dBFS.
const CLIP_THRESHOLD: f32 = 0.0;

pub struct Clipmeter {
    panel: Arc<dyn ControlPanel>,
    last_report: Mutex<[Option<Instant>; 2]>,
}

impl Clipmeter {
    pub fn new(panel: Arc<dyn ControlPanel>) -> Self {
        Self {
            panel,
            last_report: Mutex::new([None, None]),
        }
    }

    /// Feed one level sample for a channel (0 = left, 1 = right).
    pub async fn set(&self, pos: u8, value: f32) {
        if value < CLIP_THRESHOLD {
            return;
        }
        let channel = match pos {
            0 | 1 => pos as usize,
            _ => {
                debug!(pos, "clip sample for unknown channel");
                return;
            }
        };

        {
            let mut last = self.last_report.lock().unwrap();
            let now = Instant::now();
            if let Some(at) = last[channel] {
                if now - at < CLIP_HOLDOFF {
                    return;
                }
            }
            last[channel] = Some(now);
        }

        self.panel.clipmeter(pos).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::advance;

    #[derive(Default)]
    struct CountingPanel {
        clips: AtomicUsize,
    }

    #[async_trait]
    impl ControlPanel for CountingPanel {
        async fn connect_ui(&self) -> bool {
            true
        }
        async fn disconnect_ui(&self) -> bool {
            true
        }
        async fn clear(&self) -> bool {
            true
        }
        async fn send_state(&self, _bank_id: i64, _pedalboard: &str, _extra: &str) -> bool {
            true
        }
        async fn ping(&self) -> bool {
            true
        }
        async fn tuner(&self, _freq: f32, _note: &str, _cents: i32) -> bool {
            true
        }
        async fn peakmeter(&self, _pos: u8, _value: f32, _peak: f32) -> bool {
            true
        }
        async fn clipmeter(&self, _pos: u8) -> bool {
            self.clips.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_clips_within_holdoff_report_once() {
        let panel = Arc::new(CountingPanel::default());
        let meter = Clipmeter::new(panel.clone());

        meter.set(0, 0.0).await;
        meter.set(0, 1.5).await;
        meter.set(0, 0.2).await;
        assert_eq!(panel.clips.load(Ordering::SeqCst), 1);

        advance(CLIP_HOLDOFF).await;
        meter.set(0, 0.0).await;
        assert_eq!(panel.clips.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn channels_hold_off_independently() {
        let panel = Arc::new(CountingPanel::default());
        let meter = Clipmeter::new(panel.clone());

        meter.set(0, 0.1).await;
        meter.set(1, 0.1).await;
        assert_eq!(panel.clips.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn levels_below_threshold_are_ignored() {
        let panel = Arc::new(CountingPanel::default());
        let meter = Clipmeter::new(panel.clone());

        meter.set(0, -6.0).await;
        meter.set(1, -0.1).await;
        assert_eq!(panel.clips.load(Ordering::SeqCst), 0);
    }
}
