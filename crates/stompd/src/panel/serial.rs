//! Real panel over the bridge socket.
//!
//! The panel bridge owns the serial port and its byte framing; this side
//! speaks the line protocol of [`crate::link`]. Command vocabulary follows
//! the panel firmware: `ui_con`, `ui_dis`, `initial_state`, `clear`,
//! `ping`, `tuner`, `peakmeter`, `clipmeter`, and the unsolicited `ready`
//! line once the firmware has booted.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::link::{CommandLink, LinkError};

use super::ControlPanel;

pub struct SerialPanel {
    link: CommandLink,
}

impl SerialPanel {
    /// Connect to the panel bridge socket.
    ///
    /// The returned channel yields one message per `ready` announcement from
    /// the firmware (normally exactly one per boot).
    pub async fn connect(
        socket: &Path,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<()>), LinkError> {
        let (link, mut events) = CommandLink::connect_unix(socket).await?;
        info!(socket = %socket.display(), "connected to panel bridge");

        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(line) = events.recv().await {
                match line.as_str() {
                    "ready" => {
                        if ready_tx.send(()).is_err() {
                            break;
                        }
                    }
                    other => debug!(event = other, "unhandled panel event"),
                }
            }
            warn!("panel event stream ended");
        });

        Ok((Arc::new(Self { link }), ready_rx))
    }
}

#[async_trait]
impl ControlPanel for SerialPanel {
    async fn connect_ui(&self) -> bool {
        self.link.ack("ui_con").await
    }

    async fn disconnect_ui(&self) -> bool {
        self.link.ack("ui_dis").await
    }

    async fn clear(&self) -> bool {
        self.link.ack("clear").await
    }

    async fn send_state(&self, bank_id: i64, pedalboard: &str, extra: &str) -> bool {
        self.link
            .ack(&format!(
                "initial_state {} \"{}\" \"{}\"",
                bank_id, pedalboard, extra
            ))
            .await
    }

    async fn ping(&self) -> bool {
        self.link.ack("ping").await
    }

    async fn tuner(&self, freq: f32, note: &str, cents: i32) -> bool {
        self.link
            .ack(&format!("tuner {} {} {}", freq, note, cents))
            .await
    }

    async fn peakmeter(&self, pos: u8, value: f32, peak: f32) -> bool {
        self.link
            .ack(&format!("peakmeter {} {} {}", pos, value, peak))
            .await
    }

    async fn clipmeter(&self, pos: u8) -> bool {
        self.link.ack(&format!("clipmeter {}", pos)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::CommandLink;
    use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn send_state_formats_the_initial_state_command() {
        let (ours, theirs) = duplex(4096);
        let (our_read, our_write) = split(ours);
        let (mut their_read, mut their_write) = split(theirs);
        let (link, _events) = CommandLink::from_parts(Box::new(our_read), Box::new(our_write));
        let panel = SerialPanel { link };

        let call = tokio::spawn(async move { panel.send_state(3, "/pb/3", "").await });

        let mut buf = [0u8; 256];
        let n = their_read.read(&mut buf).await.unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buf[..n]).trim(),
            "initial_state 3 \"/pb/3\" \"\""
        );
        their_write.write_all(b"resp 0\n").await.unwrap();

        assert!(call.await.unwrap());
    }
}
