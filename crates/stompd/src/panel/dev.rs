//! Stand-in panel for machines without the hardware.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::ControlPanel;

/// Acknowledges every operation and emits a single synthetic readiness
/// event at construction, so the orchestration path is identical with and
/// without the hardware.
pub struct DevPanel;

impl DevPanel {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<()>) {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        // The real panel announces readiness shortly after boot; the
        // stand-in is ready immediately.
        let _ = ready_tx.send(());
        (Arc::new(Self), ready_rx)
    }
}

#[async_trait]
impl ControlPanel for DevPanel {
    async fn connect_ui(&self) -> bool {
        debug!("dev panel: ui_con");
        true
    }

    async fn disconnect_ui(&self) -> bool {
        debug!("dev panel: ui_dis");
        true
    }

    async fn clear(&self) -> bool {
        debug!("dev panel: clear");
        true
    }

    async fn send_state(&self, bank_id: i64, pedalboard: &str, _extra: &str) -> bool {
        debug!(bank_id, pedalboard, "dev panel: initial_state");
        true
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn tuner(&self, freq: f32, note: &str, cents: i32) -> bool {
        debug!(freq, note, cents, "dev panel: tuner");
        true
    }

    async fn peakmeter(&self, _pos: u8, _value: f32, _peak: f32) -> bool {
        true
    }

    async fn clipmeter(&self, pos: u8) -> bool {
        debug!(pos, "dev panel: clip");
        true
    }
}
