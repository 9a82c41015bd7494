//! Session control plane for an embedded pedalboard.
//!
//! The daemon sits between three collaborators: the hardware control panel,
//! the audio engine (plugin host) and the recorder. [`session::Session`] is
//! the single orchestrator; everything else is a capability it drives.
//! Request handling and wire transports for clients live outside this
//! crate; clients enter through [`registry::ClientConnection`].

pub mod engine;
pub mod lastboard;
pub mod link;
pub mod meters;
pub mod panel;
pub mod recording;
pub mod registry;
pub mod session;
pub mod tuner;
pub mod types;

pub use session::{Session, SessionError};
