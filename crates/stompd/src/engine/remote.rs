//! Real engine over the plugin host's TCP command port.
//!
//! Wire verbs follow the host's command set (`add`, `remove`, `bypass`,
//! `param_set`, `save`, `load`, ...). Acknowledgement detail payloads carry
//! the values the orchestrator needs back: the saved bundle path, the
//! loaded title, the MIDI port lists as JSON. Unsolicited lines from the
//! host (hardware-driven parameter changes, xrun notices) are forwarded
//! verbatim to the installed message sink.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::link::CommandLink;
use crate::registry::{ClientConnection, MessageSink};
use crate::types::ParameterAddress;

use super::{AudioEngine, EngineError};

type SharedSink = Arc<StdMutex<Option<Arc<dyn MessageSink>>>>;

pub struct RemoteEngine {
    addr: String,
    link: Mutex<Option<Arc<CommandLink>>>,
    sink: SharedSink,
}

impl RemoteEngine {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            link: Mutex::new(None),
            sink: Arc::new(StdMutex::new(None)),
        }
    }

    async fn command(&self, command: &str) -> Result<crate::link::Ack, EngineError> {
        let link = {
            let guard = self.link.lock().await;
            guard.clone().ok_or(EngineError::NotConnected)?
        };
        let ack = link.request(command).await?;
        if !ack.ok() {
            return Err(EngineError::Refused(ack.code));
        }
        Ok(ack)
    }

    async fn simple(&self, command: &str) -> Result<(), EngineError> {
        self.command(command).await.map(|_| ())
    }
}

#[async_trait]
impl AudioEngine for RemoteEngine {
    async fn ensure_connected(&self) -> Result<(), EngineError> {
        let mut guard = self.link.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let (link, mut events) = CommandLink::connect_tcp(&self.addr).await?;
        info!(addr = %self.addr, "connected to plugin host");

        let sink = self.sink.clone();
        tokio::spawn(async move {
            while let Some(line) = events.recv().await {
                let sink = sink.lock().unwrap().clone();
                match sink {
                    Some(sink) => sink.deliver(&line).await,
                    None => debug!(line, "host feedback before any client attached"),
                }
            }
            warn!("plugin host event stream ended");
        });

        *guard = Some(Arc::new(link));
        Ok(())
    }

    fn set_message_sink(&self, sink: Arc<dyn MessageSink>) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    async fn initial_setup(&self) -> Result<(), EngineError> {
        self.simple("init").await
    }

    async fn report_current_state(
        &self,
        connection: &dyn ClientConnection,
    ) -> Result<(), EngineError> {
        let ack = self.command("state").await?;
        let snapshot = ack
            .detail
            .ok_or_else(|| EngineError::BadReply("state ack without snapshot".into()))?;
        connection
            .send(&snapshot)
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
        self.simple(&format!("add {} {} {} {}", instance, uri, x, y))
            .await
    }

    async fn remove_plugin(&self, instance: &str, panel_ready: bool) -> Result<(), EngineError> {
        self.simple(&format!("remove {} {}", instance, panel_ready as u8))
            .await
    }

    async fn bypass(&self, instance: &str, bypassed: bool) -> Result<(), EngineError> {
        self.simple(&format!("bypass {} {}", instance, bypassed as u8))
            .await
    }

    async fn param_set(&self, port: &str, value: f32) -> Result<(), EngineError> {
        self.simple(&format!("param_set {} {}", port, value)).await
    }

    async fn address(
        &self,
        instance: &str,
        symbol: &str,
        addressing: &ParameterAddress,
    ) -> Result<(), EngineError> {
        self.simple(&format!(
            "address {} {} {} \"{}\" {} {} {} {}",
            instance,
            symbol,
            addressing.actuator_uri,
            addressing.label,
            addressing.minimum,
            addressing.maximum,
            addressing.value,
            addressing.steps,
        ))
        .await
    }

    async fn midi_learn(&self, port: &str) -> Result<(), EngineError> {
        self.simple(&format!("midi_learn {}", port)).await
    }

    async fn preset_load(&self, instance: &str, uri: &str) -> Result<(), EngineError> {
        self.simple(&format!("preset_load {} {}", instance, uri))
            .await
    }

    async fn preset_save(&self, instance: &str, name: &str) -> Result<(), EngineError> {
        self.simple(&format!("preset_save {} \"{}\"", instance, name))
            .await
    }

    async fn set_position(&self, instance: &str, x: f32, y: f32) -> Result<(), EngineError> {
        self.simple(&format!("position {} {} {}", instance, x, y))
            .await
    }

    async fn connect_ports(&self, port_from: &str, port_to: &str) -> Result<(), EngineError> {
        self.simple(&format!("connect {} {}", port_from, port_to))
            .await
    }

    async fn disconnect_ports(&self, port_from: &str, port_to: &str) -> Result<(), EngineError> {
        self.simple(&format!("disconnect {} {}", port_from, port_to))
            .await
    }

    async fn save_pedalboard(&self, title: &str, as_new: bool) -> Result<String, EngineError> {
        let ack = self
            .command(&format!("save \"{}\" {}", title, as_new as u8))
            .await?;
        ack.detail
            .ok_or_else(|| EngineError::BadReply("save ack without bundle path".into()))
    }

    async fn load_pedalboard(
        &self,
        bundle_path: &str,
        bank_id: i64,
    ) -> Result<String, EngineError> {
        let ack = self
            .command(&format!("load \"{}\" {}", bundle_path, bank_id))
            .await?;
        ack.detail
            .ok_or_else(|| EngineError::BadReply("load ack without title".into()))
    }

    async fn midi_ports(&self) -> Result<(Vec<String>, Vec<String>), EngineError> {
        let ack = self.command("midi_ports").await?;
        let detail = ack
            .detail
            .ok_or_else(|| EngineError::BadReply("midi_ports ack without payload".into()))?;
        serde_json::from_str(&detail).map_err(|e| EngineError::BadReply(e.to_string()))
    }

    async fn set_midi_devices(&self, devices: &[String]) -> Result<(), EngineError> {
        self.simple(&format!("midi_devices {}", devices.join(",")))
            .await
    }

    async fn set_pedalboard_size(&self, width: u32, height: u32) -> Result<(), EngineError> {
        self.simple(&format!("size {} {}", width, height)).await
    }

    async fn reset(&self) -> Result<(), EngineError> {
        self.simple("reset").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;

    fn test_engine() -> (
        RemoteEngine,
        tokio::io::WriteHalf<tokio::io::DuplexStream>,
        tokio::io::ReadHalf<tokio::io::DuplexStream>,
    ) {
        let (ours, theirs) = duplex(4096);
        let (our_read, our_write) = split(ours);
        let (their_read, their_write) = split(theirs);
        let (link, mut events) = CommandLink::from_parts(Box::new(our_read), Box::new(our_write));

        let engine = RemoteEngine::new("test");
        let sink = engine.sink.clone();
        tokio::spawn(async move {
            while let Some(line) = events.recv().await {
                let sink = sink.lock().unwrap().clone();
                if let Some(sink) = sink {
                    sink.deliver(&line).await;
                }
            }
        });
        *engine.link.try_lock().unwrap() = Some(Arc::new(link));
        (engine, their_write, their_read)
    }

    async fn read_command(read: &mut tokio::io::ReadHalf<tokio::io::DuplexStream>) -> String {
        let mut buf = [0u8; 512];
        let n = read.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).trim().to_string()
    }

    struct ChannelSink(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl MessageSink for ChannelSink {
        async fn deliver(&self, message: &str) {
            let _ = self.0.send(message.to_string());
        }
    }

    #[tokio::test]
    async fn save_returns_bundle_path_from_detail() {
        let (engine, mut peer_write, mut peer_read) = test_engine();

        let call = tokio::spawn(async move { engine.save_pedalboard("My Board", true).await });
        assert_eq!(read_command(&mut peer_read).await, "save \"My Board\" 1");
        peer_write
            .write_all(b"resp 0 /boards/my-board.pedalboard\n")
            .await
            .unwrap();

        assert_eq!(
            call.await.unwrap().unwrap(),
            "/boards/my-board.pedalboard"
        );
    }

    #[tokio::test]
    async fn refusal_surfaces_the_host_code() {
        let (engine, mut peer_write, mut peer_read) = test_engine();

        let call = tokio::spawn(async move {
            engine.add_plugin("effect_1", "urn:plug:bad", 0.0, 0.0).await
        });
        let _ = read_command(&mut peer_read).await;
        peer_write.write_all(b"resp -201\n").await.unwrap();

        assert!(matches!(
            call.await.unwrap(),
            Err(EngineError::Refused(-201))
        ));
    }

    #[tokio::test]
    async fn midi_ports_parses_json_detail() {
        let (engine, mut peer_write, mut peer_read) = test_engine();

        let call = tokio::spawn(async move { engine.midi_ports().await });
        assert_eq!(read_command(&mut peer_read).await, "midi_ports");
        peer_write
            .write_all(b"resp 0 [[\"keys\"],[\"keys\",\"pedal\"]]\n")
            .await
            .unwrap();

        let (in_use, available) = call.await.unwrap().unwrap();
        assert_eq!(in_use, vec!["keys"]);
        assert_eq!(available, vec!["keys", "pedal"]);
    }

    #[tokio::test]
    async fn host_feedback_reaches_the_sink() {
        let (engine, mut peer_write, _peer_read) = test_engine();
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.set_message_sink(Arc::new(ChannelSink(tx)));

        peer_write
            .write_all(b"param_set effect_1/gain 0.7\n")
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), "param_set effect_1/gain 0.7");
    }

    #[tokio::test]
    async fn commands_before_connect_fail_cleanly() {
        let engine = RemoteEngine::new("127.0.0.1:1");
        let err = engine.reset().await.unwrap_err();
        assert!(matches!(err, EngineError::NotConnected));
    }
}
