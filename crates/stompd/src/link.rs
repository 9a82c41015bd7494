//! Newline-delimited command link shared by the real collaborators.
//!
//! The panel bridge and the plugin host speak the same tiny wire contract:
//! one command per line, acknowledged in order by `resp N` where a negative
//! N is a collaborator-side error code and anything after the code is a
//! detail payload. Lines that are not acknowledgements are unsolicited
//! events (panel readiness, host feedback) and are handed to the event
//! channel as-is. The byte framing below this line protocol belongs to the
//! bridge processes, not to this daemon.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Errors on a command link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("link I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("link closed")]
    Closed,

    #[error("malformed acknowledgement: {0:?}")]
    Protocol(String),
}

/// A successful acknowledgement: status code plus optional detail payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Non-negative on success; collaborator error code otherwise.
    pub code: i64,
    /// Remainder of the `resp` line, if any.
    pub detail: Option<String>,
}

impl Ack {
    pub fn ok(&self) -> bool {
        self.code >= 0
    }
}

type PendingQueue = Arc<Mutex<VecDeque<oneshot::Sender<Result<Ack, LinkError>>>>>;

/// Duplex line-protocol client.
///
/// Requests are serialized: the writer lock is held while the pending reply
/// slot is enqueued, so acknowledgements always pair with commands in issue
/// order.
pub struct CommandLink {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: PendingQueue,
}

impl CommandLink {
    /// Connect to a collaborator over TCP (the plugin host).
    pub async fn connect_tcp(
        addr: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<String>), LinkError> {
        let stream = TcpStream::connect(addr).await?;
        let (read, write) = stream.into_split();
        Ok(Self::from_parts(Box::new(read), Box::new(write)))
    }

    /// Connect to a collaborator over a Unix socket (the panel bridge).
    pub async fn connect_unix(
        path: &Path,
    ) -> Result<(Self, mpsc::UnboundedReceiver<String>), LinkError> {
        let stream = UnixStream::connect(path).await?;
        let (read, write) = stream.into_split();
        Ok(Self::from_parts(Box::new(read), Box::new(write)))
    }

    /// Build a link from raw halves. Spawns the reader task.
    pub fn from_parts(
        read: Box<dyn AsyncRead + Send + Unpin>,
        write: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let pending: PendingQueue = Arc::new(Mutex::new(VecDeque::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let reader_pending = pending.clone();
        tokio::spawn(async move {
            read_loop(read, reader_pending, event_tx).await;
        });

        (
            Self {
                writer: tokio::sync::Mutex::new(write),
                pending,
            },
            event_rx,
        )
    }

    /// Send one command and wait for its acknowledgement.
    pub async fn request(&self, command: &str) -> Result<Ack, LinkError> {
        let rx = {
            let mut writer = self.writer.lock().await;
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().push_back(tx);

            let mut line = command.to_string();
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                // The reply slot we just queued will never be served.
                self.pending.lock().unwrap().pop_back();
                return Err(e.into());
            }
            if let Err(e) = writer.flush().await {
                self.pending.lock().unwrap().pop_back();
                return Err(e.into());
            }
            rx
        };

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(LinkError::Closed),
        }
    }

    /// Send one command and reduce the acknowledgement to a boolean.
    ///
    /// Link failures are reported as a negative acknowledgement, never as a
    /// fault: an unreachable collaborator degrades, it does not crash.
    pub async fn ack(&self, command: &str) -> bool {
        match self.request(command).await {
            Ok(ack) => ack.ok(),
            Err(e) => {
                warn!(command, error = %e, "command link failure");
                false
            }
        }
    }
}

async fn read_loop(
    read: Box<dyn AsyncRead + Send + Unpin>,
    pending: PendingQueue,
    event_tx: mpsc::UnboundedSender<String>,
) {
    let mut lines = BufReader::new(read).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if line == "resp" || line.starts_with("resp ") {
                    let reply = parse_resp(&line[4..], &line);
                    match pending.lock().unwrap().pop_front() {
                        Some(tx) => {
                            let _ = tx.send(reply);
                        }
                        None => warn!(line, "acknowledgement with no pending command"),
                    }
                } else if event_tx.send(line).is_err() {
                    // Event consumer went away; keep serving acknowledgements.
                    debug!("event channel closed");
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "command link read failed");
                break;
            }
        }
    }

    // Fail anything still waiting for a reply.
    let mut pending = pending.lock().unwrap();
    while let Some(tx) = pending.pop_front() {
        let _ = tx.send(Err(LinkError::Closed));
    }
}

fn parse_resp(rest: &str, full_line: &str) -> Result<Ack, LinkError> {
    let rest = rest.trim_start();
    let (code_str, detail) = match rest.split_once(char::is_whitespace) {
        Some((code, detail)) => (code, Some(detail.trim().to_string())),
        None => (rest, None),
    };
    let code: i64 = code_str
        .parse()
        .map_err(|_| LinkError::Protocol(full_line.to_string()))?;
    Ok(Ack {
        code,
        detail: detail.filter(|d| !d.is_empty()),
    })
}
