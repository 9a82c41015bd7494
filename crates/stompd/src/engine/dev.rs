//! Stand-in engine for development machines without the plugin host.
//!
//! Tracks just enough graph state (plugins, connections, current
//! pedalboard) to answer snapshot requests, so clients attaching against
//! the stand-in behave like clients attaching against the real host.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::registry::{ClientConnection, MessageSink};
use crate::types::ParameterAddress;

use super::{AudioEngine, EngineError};

#[derive(Debug, Clone, Serialize)]
struct PluginEntry {
    uri: String,
    x: f32,
    y: f32,
    bypassed: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, f32>,
}

#[derive(Default)]
struct GraphState {
    plugins: BTreeMap<String, PluginEntry>,
    connections: Vec<(String, String)>,
    pedalboard: Option<(String, String)>, // (bundle path, title)
    midi_in_use: Vec<String>,
    midi_available: Vec<String>,
    size: (u32, u32),
}

#[derive(Default)]
pub struct DevEngine {
    state: Mutex<GraphState>,
}

impl DevEngine {
    pub fn new() -> Self {
        let engine = Self::default();
        engine.state.lock().unwrap().midi_available = vec![
            "dev-midi-keyboard".to_string(),
            "dev-midi-pedal".to_string(),
        ];
        engine
    }

    fn with_plugin<T>(
        &self,
        instance: &str,
        f: impl FnOnce(&mut PluginEntry) -> T,
    ) -> Result<T, EngineError> {
        let mut state = self.state.lock().unwrap();
        state
            .plugins
            .get_mut(instance)
            .map(f)
            .ok_or_else(|| EngineError::NoSuchInstance(instance.to_string()))
    }
}

#[async_trait]
impl AudioEngine for DevEngine {
    async fn ensure_connected(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn set_message_sink(&self, _sink: Arc<dyn MessageSink>) {
        // The stand-in produces no spontaneous feedback.
    }

    async fn initial_setup(&self) -> Result<(), EngineError> {
        info!("dev engine: initial setup");
        Ok(())
    }

    async fn report_current_state(
        &self,
        connection: &dyn ClientConnection,
    ) -> Result<(), EngineError> {
        let snapshot = {
            let state = self.state.lock().unwrap();
            serde_json::json!({
                "type": "state",
                "pedalboard": state.pedalboard.as_ref().map(|(bundle, title)| {
                    serde_json::json!({ "bundle": bundle, "title": title })
                }),
                "plugins": state.plugins,
                "connections": state.connections,
                "size": { "width": state.size.0, "height": state.size.1 },
            })
        };
        connection
            .send(&snapshot.to_string())
            .await
            .map_err(|e| EngineError::BadReply(e.to_string()))
    }

    async fn add_plugin(
        &self,
        instance: &str,
        uri: &str,
        x: f32,
        y: f32,
    ) -> Result<(), EngineError> {
        debug!(instance, uri, "dev engine: add plugin");
        self.state.lock().unwrap().plugins.insert(
            instance.to_string(),
            PluginEntry {
                uri: uri.to_string(),
                x,
                y,
                bypassed: false,
                params: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn remove_plugin(&self, instance: &str, _panel_ready: bool) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.plugins.remove(instance).is_none() {
            return Err(EngineError::NoSuchInstance(instance.to_string()));
        }
        let prefix = format!("{}/", instance);
        state
            .connections
            .retain(|(from, to)| !from.starts_with(&prefix) && !to.starts_with(&prefix));
        Ok(())
    }

    async fn bypass(&self, instance: &str, bypassed: bool) -> Result<(), EngineError> {
        self.with_plugin(instance, |plugin| plugin.bypassed = bypassed)
    }

    async fn param_set(&self, port: &str, value: f32) -> Result<(), EngineError> {
        let (instance, symbol) = port
            .rsplit_once('/')
            .ok_or_else(|| EngineError::BadReply(format!("bad port: {}", port)))?;
        self.with_plugin(instance, |plugin| {
            plugin.params.insert(symbol.to_string(), value);
        })
    }

    async fn address(
        &self,
        instance: &str,
        symbol: &str,
        addressing: &ParameterAddress,
    ) -> Result<(), EngineError> {
        debug!(instance, symbol, actuator = %addressing.actuator_uri, "dev engine: address");
        self.with_plugin(instance, |_| ())
    }

    async fn midi_learn(&self, port: &str) -> Result<(), EngineError> {
        debug!(port, "dev engine: midi learn");
        Ok(())
    }

    async fn preset_load(&self, instance: &str, uri: &str) -> Result<(), EngineError> {
        debug!(instance, uri, "dev engine: preset load");
        self.with_plugin(instance, |_| ())
    }

    async fn preset_save(&self, instance: &str, name: &str) -> Result<(), EngineError> {
        debug!(instance, name, "dev engine: preset save");
        self.with_plugin(instance, |_| ())
    }

    async fn set_position(&self, instance: &str, x: f32, y: f32) -> Result<(), EngineError> {
        self.with_plugin(instance, |plugin| {
            plugin.x = x;
            plugin.y = y;
        })
    }

    async fn connect_ports(&self, port_from: &str, port_to: &str) -> Result<(), EngineError> {
        self.state
            .lock()
            .unwrap()
            .connections
            .push((port_from.to_string(), port_to.to_string()));
        Ok(())
    }

    async fn disconnect_ports(&self, port_from: &str, port_to: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let before = state.connections.len();
        state
            .connections
            .retain(|(from, to)| !(from == port_from && to == port_to));
        if state.connections.len() == before {
            return Err(EngineError::BadReply(format!(
                "no such connection: {} -> {}",
                port_from, port_to
            )));
        }
        Ok(())
    }

    async fn save_pedalboard(&self, title: &str, as_new: bool) -> Result<String, EngineError> {
        let slug: String = title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        let mut state = self.state.lock().unwrap();
        let bundle = match (&state.pedalboard, as_new) {
            (Some((bundle, _)), false) => bundle.clone(),
            _ => format!("pedalboards/{}.pedalboard", slug),
        };
        state.pedalboard = Some((bundle.clone(), title.to_string()));
        Ok(bundle)
    }

    async fn load_pedalboard(
        &self,
        bundle_path: &str,
        bank_id: i64,
    ) -> Result<String, EngineError> {
        let title = std::path::Path::new(bundle_path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(bundle_path, bank_id, title, "dev engine: load pedalboard");
        self.state.lock().unwrap().pedalboard =
            Some((bundle_path.to_string(), title.clone()));
        Ok(title)
    }

    async fn midi_ports(&self) -> Result<(Vec<String>, Vec<String>), EngineError> {
        let state = self.state.lock().unwrap();
        Ok((state.midi_in_use.clone(), state.midi_available.clone()))
    }

    async fn set_midi_devices(&self, devices: &[String]) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.midi_in_use = devices.to_vec();
        Ok(())
    }

    async fn set_pedalboard_size(&self, width: u32, height: u32) -> Result<(), EngineError> {
        self.state.lock().unwrap().size = (width, height);
        Ok(())
    }

    async fn reset(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.plugins.clear();
        state.connections.clear();
        state.pedalboard = None;
        info!("dev engine: graph reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClientSendError;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    struct CollectingClient {
        id: Uuid,
        messages: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl ClientConnection for CollectingClient {
        fn id(&self) -> Uuid {
            self.id
        }

        async fn send(&self, message: &str) -> Result<(), ClientSendError> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn snapshot_reflects_graph_mutations() {
        let engine = DevEngine::new();
        engine
            .add_plugin("effect_1", "urn:plug:reverb", 10.0, 20.0)
            .await
            .unwrap();
        engine
            .connect_ports("system/capture_1", "effect_1/in")
            .await
            .unwrap();
        engine.bypass("effect_1", true).await.unwrap();

        let client = CollectingClient {
            id: Uuid::new_v4(),
            messages: StdMutex::new(Vec::new()),
        };
        engine.report_current_state(&client).await.unwrap();

        let messages = client.messages.lock().unwrap();
        let snapshot: serde_json::Value = serde_json::from_str(&messages[0]).unwrap();
        assert_eq!(snapshot["type"], "state");
        assert_eq!(snapshot["plugins"]["effect_1"]["uri"], "urn:plug:reverb");
        assert_eq!(snapshot["plugins"]["effect_1"]["bypassed"], true);
        assert_eq!(snapshot["connections"][0][0], "system/capture_1");
    }

    #[tokio::test]
    async fn remove_plugin_drops_its_connections() {
        let engine = DevEngine::new();
        engine
            .add_plugin("effect_1", "urn:plug:delay", 0.0, 0.0)
            .await
            .unwrap();
        engine
            .connect_ports("effect_1/out", "system/playback_1")
            .await
            .unwrap();

        engine.remove_plugin("effect_1", false).await.unwrap();

        let state = engine.state.lock().unwrap();
        assert!(state.plugins.is_empty());
        assert!(state.connections.is_empty());
    }

    #[tokio::test]
    async fn unknown_instance_is_an_error() {
        let engine = DevEngine::new();
        let err = engine.bypass("effect_9", true).await.unwrap_err();
        assert!(matches!(err, EngineError::NoSuchInstance(_)));
    }

    #[tokio::test]
    async fn load_pedalboard_titles_from_bundle_stem() {
        let engine = DevEngine::new();
        let title = engine
            .load_pedalboard("/boards/Big Muff Wall.pedalboard", 2)
            .await
            .unwrap();
        assert_eq!(title, "Big Muff Wall");
    }
}
