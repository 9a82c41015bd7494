//! Shared data types for the session control plane.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque reference to captured audio held by the recorder backend.
///
/// The session never looks inside; it only hands the reference back to the
/// backend for playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordingHandle(pub Uuid);

impl RecordingHandle {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RecordingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata attached to a captured take.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingMetadata {
    /// Capture duration in seconds, when the backend knows it.
    pub duration_secs: Option<f64>,
    pub sample_rate: Option<u32>,
}

/// A captured take. Produced by `stop_recording`, consumed by
/// `start_playing`, cleared by `reset_recording`.
#[derive(Debug, Clone)]
pub struct Recording {
    pub handle: RecordingHandle,
    pub metadata: RecordingMetadata,
}

impl Recording {
    pub fn new(handle: RecordingHandle) -> Self {
        Self {
            handle,
            metadata: RecordingMetadata::default(),
        }
    }
}

/// Pedalboard change notification payload.
///
/// Delivered to the registered callback whenever the current pedalboard
/// changes; an empty payload signals "no pedalboard".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PedalboardChange {
    pub ok: bool,
    pub bundle_path: String,
    pub title: String,
}

impl PedalboardChange {
    pub fn new(bundle_path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            ok: true,
            bundle_path: bundle_path.into(),
            title: title.into(),
        }
    }

    /// The empty payload sent on reset and session end.
    pub fn empty() -> Self {
        Self {
            ok: true,
            bundle_path: String::new(),
            title: String::new(),
        }
    }
}

/// Hardware addressing request for one plugin parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterAddress {
    /// Actuator the parameter is bound to, e.g. a panel knob URI or
    /// `/midi-learn` style virtual actuator.
    pub actuator_uri: String,
    pub label: String,
    pub minimum: f32,
    pub maximum: f32,
    pub value: f32,
    pub steps: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_change_has_no_bundle() {
        let change = PedalboardChange::empty();
        assert!(change.ok);
        assert!(change.bundle_path.is_empty());
        assert!(change.title.is_empty());
    }

    #[test]
    fn recording_handles_are_unique() {
        assert_ne!(RecordingHandle::generate(), RecordingHandle::generate());
    }
}
