//! Control panel (HMI) capability.
//!
//! The panel is the physical knob-and-footswitch device. It may be absent
//! entirely (development machines), so the capability is a trait with two
//! variants selected once at startup: [`SerialPanel`] talking to the panel
//! bridge, and [`DevPanel`] as the stand-in.
//!
//! The panel signals readiness exactly once after boot; both variants
//! surface that as a message on the readiness channel returned by their
//! constructors.

mod dev;
mod serial;

pub use dev::DevPanel;
pub use serial::SerialPanel;

use async_trait::async_trait;

/// The physical control panel, or its stand-in.
///
/// Every handshake operation resolves to the panel's acknowledgement;
/// `false` is a negative acknowledgement, not a fault. An absent panel is
/// handled by constructing [`DevPanel`] instead, never by failing these
/// calls.
#[async_trait]
pub trait ControlPanel: Send + Sync {
    /// Hand the panel over to UI control.
    async fn connect_ui(&self) -> bool;

    /// Release the panel back to standalone operation.
    async fn disconnect_ui(&self) -> bool;

    /// Clear the panel display and its addressings.
    async fn clear(&self) -> bool;

    /// Push a (bank, pedalboard) state to the panel. Bank `-1` with an empty
    /// pedalboard path means "nothing loaded".
    async fn send_state(&self, bank_id: i64, pedalboard: &str, extra: &str) -> bool;

    async fn ping(&self) -> bool;

    /// Tuner readout: reference frequency, note name, cents offset.
    async fn tuner(&self, freq: f32, note: &str, cents: i32) -> bool;

    /// Peak meter readout for one channel.
    async fn peakmeter(&self, pos: u8, value: f32, peak: f32) -> bool;

    /// Clip indicator for one channel.
    async fn clipmeter(&self, pos: u8) -> bool;
}
