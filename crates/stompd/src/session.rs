//! Session orchestration core.
//!
//! One `Session` per process. It owns the session flags and injects all
//! sequencing between the panel, the engine, the recorder and the attached
//! clients; it holds no plugin-graph or audio state of its own. Every
//! method is one user action, and every failure terminates here as a
//! result value, never as a fault escaping to a collaborator.
//!
//! Callers share the session as `Arc<tokio::sync::Mutex<Session>>`; the
//! lock is held across a whole operation, which serializes the flag
//! mutations and keeps chained collaborator calls in issue order.

use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::{AudioEngine, EngineError};
use crate::lastboard::{LastBoard, LastBoardStore};
use crate::meters::Clipmeter;
use crate::panel::ControlPanel;
use crate::recording::{RecordingController, RecordingError};
use crate::registry::{ClientConnection, ClientRegistry};
use crate::tuner::find_freqnotecents;
use crate::types::{ParameterAddress, PedalboardChange, Recording};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error("panel handshake has not completed")]
    PanelNotReady,

    #[error("malformed port: {0:?}")]
    BadPort(String),
}

/// Observer for pedalboard changes, registered by the embedding app.
pub type ChangeCallback = Box<dyn Fn(&PedalboardChange) + Send + Sync>;

pub struct Session {
    engine: Arc<dyn AudioEngine>,
    panel: Arc<dyn ControlPanel>,
    registry: Arc<ClientRegistry>,
    recorder: RecordingController,
    lastboard: Arc<dyn LastBoardStore>,
    clipmeter: Clipmeter,

    host_initialized: bool,
    panel_initialized: bool,
    current_bank: Option<i64>,
    change_callback: Option<ChangeCallback>,
}

impl Session {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        panel: Arc<dyn ControlPanel>,
        registry: Arc<ClientRegistry>,
        recorder: RecordingController,
        lastboard: Arc<dyn LastBoardStore>,
    ) -> Self {
        let clipmeter = Clipmeter::new(panel.clone());
        Self {
            engine,
            panel,
            registry,
            recorder,
            lastboard,
            clipmeter,
            host_initialized: false,
            panel_initialized: false,
            current_bank: None,
            change_callback: None,
        }
    }

    pub fn set_change_callback(&mut self, callback: ChangeCallback) {
        self.change_callback = Some(callback);
    }

    pub fn panel_initialized(&self) -> bool {
        self.panel_initialized
    }

    /// Bank of the currently loaded pedalboard, when one came from a bank.
    pub fn current_bank(&self) -> Option<i64> {
        self.current_bank
    }

    /// Deliver a pedalboard change to the registered callback and to every
    /// attached client.
    async fn notify_change(&self, change: &PedalboardChange) {
        if let Some(callback) = &self.change_callback {
            callback(change);
        }
        let message = serde_json::json!({
            "type": "pedalboard_changed",
            "ok": change.ok,
            "bundle": change.bundle_path,
            "title": change.title,
        });
        self.registry.broadcast(&message.to_string()).await;
    }

    // -------------------------------------------------------------------
    // Client lifecycle

    /// A new client attached. Ensures the engine link is up and the
    /// one-time initialization has run, then pushes a full state snapshot
    /// to this connection specifically.
    pub async fn client_attach(
        &mut self,
        connection: Arc<dyn ClientConnection>,
    ) -> Result<(), SessionError> {
        self.registry.attach(connection.clone());
        self.engine.ensure_connected().await?;

        if !self.host_initialized {
            self.host_initialized = true;
            self.engine.set_message_sink(self.registry.clone());
            self.engine.initial_setup().await?;
            info!("engine initialized");
        }

        self.engine.report_current_state(connection.as_ref()).await?;
        Ok(())
    }

    pub fn client_detach(&mut self, id: uuid::Uuid) {
        self.registry.detach(id);
    }

    // -------------------------------------------------------------------
    // Panel handshake

    /// The panel announced readiness. Restores the last-used pedalboard,
    /// if any, before completing the handshake; the panel blocks until the
    /// state push is acknowledged.
    pub async fn panel_ready(&mut self) -> bool {
        info!("panel ready");
        self.panel_initialized = true;

        let (bank_id, bundle_path) = match self.lastboard.last() {
            Some(board) => match self.load_pedalboard(&board.bundle_path, board.bank_id).await {
                Ok(_) => (board.bank_id, board.bundle_path),
                Err(e) => {
                    warn!(bundle = %board.bundle_path, error = %e, "last pedalboard failed to load");
                    (-1, String::new())
                }
            },
            None => (-1, String::new()),
        };

        self.panel.send_state(bank_id, &bundle_path, "").await
    }

    /// Hand the panel over to UI control.
    ///
    /// A `false` result is the panel declining; the session stays usable.
    pub async fn start_session(&mut self) -> bool {
        self.panel.send_state(-1, "", "").await;
        self.panel.connect_ui().await
    }

    /// Release the panel back to standalone operation, restoring the
    /// last-used state on its display.
    ///
    /// The empty change notification fires before the disconnect
    /// acknowledgement resolves; the two are deliberately unordered.
    pub async fn end_session(&mut self) -> bool {
        let (bank_id, bundle_path) = match self.lastboard.last() {
            Some(board) => (board.bank_id, board.bundle_path),
            None => (-1, String::new()),
        };

        self.notify_change(&PedalboardChange::empty()).await;

        self.panel.send_state(bank_id, &bundle_path, "").await;
        self.panel.disconnect_ui().await
    }

    /// Drop the whole pedalboard: panel display first (when the handshake
    /// has completed), then the engine graph. The empty change
    /// notification fires unconditionally, not sequenced after either.
    pub async fn reset(&mut self) -> Result<(), SessionError> {
        self.notify_change(&PedalboardChange::empty()).await;

        if self.panel_initialized {
            // Ignore the ack, like every panel step outside the handshake.
            self.panel.clear().await;
        }
        self.engine.reset().await?;
        self.current_bank = None;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Pedalboard operations

    pub async fn load_pedalboard(
        &mut self,
        bundle_path: &str,
        bank_id: i64,
    ) -> Result<String, SessionError> {
        let title = self.engine.load_pedalboard(bundle_path, bank_id).await?;
        self.current_bank = (bank_id >= 0).then_some(bank_id);
        self.lastboard.remember(&LastBoard {
            bank_id,
            bundle_path: bundle_path.to_string(),
        });
        self.notify_change(&PedalboardChange::new(bundle_path, &title))
            .await;
        Ok(title)
    }

    /// Save the current pedalboard; returns the saved bundle path.
    pub async fn save_pedalboard(
        &mut self,
        title: &str,
        as_new: bool,
    ) -> Result<String, SessionError> {
        let bundle_path = self.engine.save_pedalboard(title, as_new).await?;
        self.notify_change(&PedalboardChange::new(&bundle_path, title))
            .await;
        Ok(bundle_path)
    }

    // -------------------------------------------------------------------
    // Plugin-graph operations, forwarded to the engine

    pub async fn add_plugin(
        &mut self,
        instance: &str,
        uri: &str,
        x: f32,
        y: f32,
    ) -> Result<(), SessionError> {
        Ok(self.engine.add_plugin(instance, uri, x, y).await?)
    }

    pub async fn remove_plugin(&mut self, instance: &str) -> Result<(), SessionError> {
        Ok(self
            .engine
            .remove_plugin(instance, self.panel_initialized)
            .await?)
    }

    /// Set one parameter. The `:bypass` pseudo-symbol carries the on/off
    /// state: values at or above 0.5 mean bypassed.
    pub async fn set_parameter(&mut self, port: &str, value: f32) -> Result<(), SessionError> {
        let (instance, symbol) = port
            .rsplit_once('/')
            .ok_or_else(|| SessionError::BadPort(port.to_string()))?;

        if symbol == ":bypass" {
            Ok(self.engine.bypass(instance, value >= 0.5).await?)
        } else {
            Ok(self.engine.param_set(port, value).await?)
        }
    }

    /// Bind a parameter to a hardware actuator. Panel actuators require
    /// the completed panel handshake; virtual `/midi-*` actuators do not.
    pub async fn address_parameter(
        &mut self,
        port: &str,
        addressing: &ParameterAddress,
    ) -> Result<(), SessionError> {
        if !(self.panel_initialized || addressing.actuator_uri.starts_with("/midi-")) {
            return Err(SessionError::PanelNotReady);
        }

        let (instance, symbol) = port
            .rsplit_once('/')
            .ok_or_else(|| SessionError::BadPort(port.to_string()))?;
        Ok(self.engine.address(instance, symbol, addressing).await?)
    }

    pub async fn midi_learn(&mut self, port: &str) -> Result<(), SessionError> {
        Ok(self.engine.midi_learn(port).await?)
    }

    pub async fn preset_load(&mut self, instance: &str, uri: &str) -> Result<(), SessionError> {
        Ok(self.engine.preset_load(instance, uri).await?)
    }

    pub async fn preset_save(&mut self, instance: &str, name: &str) -> Result<(), SessionError> {
        Ok(self.engine.preset_save(instance, name).await?)
    }

    pub async fn set_position(&mut self, instance: &str, x: f32, y: f32) -> Result<(), SessionError> {
        Ok(self.engine.set_position(instance, x, y).await?)
    }

    pub async fn connect_ports(&mut self, port_from: &str, port_to: &str) -> Result<(), SessionError> {
        Ok(self.engine.connect_ports(port_from, port_to).await?)
    }

    pub async fn disconnect_ports(
        &mut self,
        port_from: &str,
        port_to: &str,
    ) -> Result<(), SessionError> {
        Ok(self.engine.disconnect_ports(port_from, port_to).await?)
    }

    pub async fn midi_ports(&mut self) -> Result<(Vec<String>, Vec<String>), SessionError> {
        Ok(self.engine.midi_ports().await?)
    }

    pub async fn set_midi_devices(&mut self, devices: &[String]) -> Result<(), SessionError> {
        Ok(self.engine.set_midi_devices(devices).await?)
    }

    pub async fn pedalboard_size(&mut self, width: u32, height: u32) -> Result<(), SessionError> {
        Ok(self.engine.set_pedalboard_size(width, height).await?)
    }

    // -------------------------------------------------------------------
    // Panel readouts

    pub async fn ping(&self) -> bool {
        self.panel.ping().await
    }

    /// Forward a detected frequency to the panel's tuner display.
    pub async fn tuner(&self, detected: f32) -> bool {
        match find_freqnotecents(detected) {
            Some(reading) => {
                self.panel
                    .tuner(reading.freq, &reading.note, reading.cents)
                    .await
            }
            None => false,
        }
    }

    pub async fn peakmeter(&self, pos: u8, value: f32, peak: f32) -> bool {
        self.panel.peakmeter(pos, value, peak).await
    }

    pub async fn clipmeter(&self, pos: u8, value: f32) {
        self.clipmeter.set(pos, value).await;
    }

    // -------------------------------------------------------------------
    // Recording and playback

    pub async fn start_recording(&mut self) {
        self.recorder.start_recording().await;
    }

    pub async fn stop_recording(&mut self) -> Result<Recording, SessionError> {
        Ok(self.recorder.stop_recording().await?)
    }

    /// Start playback of the captured take. The returned channel resolves
    /// once playback has fully wound down (including the settling delay).
    pub async fn start_playing(
        &mut self,
    ) -> Result<tokio::sync::oneshot::Receiver<()>, SessionError> {
        Ok(self.recorder.start_playing().await?)
    }

    pub async fn stop_playing(&mut self) -> Result<(), SessionError> {
        Ok(self.recorder.stop_playing().await?)
    }

    pub fn reset_recording(&mut self) {
        self.recorder.reset_recording();
    }
}
