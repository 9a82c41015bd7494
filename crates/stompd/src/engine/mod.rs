//! Audio engine (plugin host) capability.
//!
//! The engine is the external process that owns the real-time plugin graph.
//! The session never blocks on it and never looks inside it: every user
//! action maps to one engine operation with a result at the callback
//! boundary. Two variants, selected once at startup: [`RemoteEngine`]
//! talking to the host process, [`DevEngine`] as the stand-in.

mod dev;
mod remote;

pub use dev::DevEngine;
pub use remote::RemoteEngine;

use std::sync::Arc;

use async_trait::async_trait;

use crate::link::LinkError;
use crate::registry::{ClientConnection, MessageSink};
use crate::types::ParameterAddress;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine link: {0}")]
    Link(#[from] LinkError),

    #[error("engine refused command (code {0})")]
    Refused(i64),

    #[error("engine not connected")]
    NotConnected,

    #[error("no such plugin instance: {0}")]
    NoSuchInstance(String),

    #[error("malformed engine reply: {0}")]
    BadReply(String),
}

/// Plugin-graph service contract consumed by the session orchestrator.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Establish the engine connection if it is not already up. Idempotent;
    /// a second call while connected must not re-dial.
    async fn ensure_connected(&self) -> Result<(), EngineError>;

    /// Install the sink that receives the engine's feedback messages
    /// (parameter changes from hardware, xruns, ...). Installed once, before
    /// `initial_setup`.
    fn set_message_sink(&self, sink: Arc<dyn MessageSink>);

    /// One-time initialization handshake. The orchestrator guarantees this
    /// runs at most once per process.
    async fn initial_setup(&self) -> Result<(), EngineError>;

    /// Push a full state snapshot to one connection (late joiners get a
    /// snapshot, not just future deltas).
    async fn report_current_state(&self, connection: &dyn ClientConnection)
        -> Result<(), EngineError>;

    async fn add_plugin(&self, instance: &str, uri: &str, x: f32, y: f32)
        -> Result<(), EngineError>;

    /// Remove a plugin. `panel_ready` tells the host whether panel
    /// addressings exist to be torn down.
    async fn remove_plugin(&self, instance: &str, panel_ready: bool) -> Result<(), EngineError>;

    /// Bypass (true) or re-enable (false) a plugin, keeping it in the graph.
    async fn bypass(&self, instance: &str, bypassed: bool) -> Result<(), EngineError>;

    async fn param_set(&self, port: &str, value: f32) -> Result<(), EngineError>;

    async fn address(
        &self,
        instance: &str,
        symbol: &str,
        addressing: &ParameterAddress,
    ) -> Result<(), EngineError>;

    async fn midi_learn(&self, port: &str) -> Result<(), EngineError>;

    async fn preset_load(&self, instance: &str, uri: &str) -> Result<(), EngineError>;

    async fn preset_save(&self, instance: &str, name: &str) -> Result<(), EngineError>;

    async fn set_position(&self, instance: &str, x: f32, y: f32) -> Result<(), EngineError>;

    async fn connect_ports(&self, port_from: &str, port_to: &str) -> Result<(), EngineError>;

    async fn disconnect_ports(&self, port_from: &str, port_to: &str) -> Result<(), EngineError>;

    /// Save the current pedalboard; returns the saved bundle path.
    async fn save_pedalboard(&self, title: &str, as_new: bool) -> Result<String, EngineError>;

    /// Load a pedalboard bundle; returns its title.
    async fn load_pedalboard(&self, bundle_path: &str, bank_id: i64)
        -> Result<String, EngineError>;

    /// MIDI devices as `(in use, available)`.
    async fn midi_ports(&self) -> Result<(Vec<String>, Vec<String>), EngineError>;

    async fn set_midi_devices(&self, devices: &[String]) -> Result<(), EngineError>;

    async fn set_pedalboard_size(&self, width: u32, height: u32) -> Result<(), EngineError>;

    /// Drop the whole plugin graph.
    async fn reset(&self) -> Result<(), EngineError>;
}
