//! Record/play state machine.
//!
//! Three states, one captured take. Recording and playing are mutually
//! exclusive; entering one forcibly exits the other. Playback completion
//! is followed by a fixed settling delay before the output is unmuted and
//! the caller's stop signal fires; a `stop_playing` racing that pending
//! delay does not cancel it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::types::{Recording, RecordingHandle};

/// Settling period between playback completion and unmute.
pub const PLAYBACK_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("no captured recording to play")]
    NoCapturedRecording,

    #[error("{operation} is not valid while {mode:?}")]
    InvalidState {
        operation: &'static str,
        mode: RecorderMode,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderMode {
    Idle,
    Recording,
    Playing,
}

/// How a playback run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// The take played to its end.
    Completed,
    /// `stop_playback` interrupted it.
    Stopped,
}

/// The process that actually captures and replays audio.
#[async_trait]
pub trait RecorderBackend: Send + Sync {
    async fn start_capture(&self);

    /// Stop capturing and hand back the take.
    async fn stop_capture(&self) -> Recording;

    /// Play a captured take to the end, or until `stop_playback`. Resolves
    /// when playback ends, reporting which of the two happened.
    async fn play(&self, handle: RecordingHandle) -> PlaybackEnd;

    async fn stop_playback(&self);
}

// Output mute around playback. The audio path does not require it today,
// so both are empty, but the controller awaits them at the exact points a
// muting implementation would need.
async fn mute() {}
async fn unmute() {}

struct RecorderState {
    mode: RecorderMode,
    captured: Option<Recording>,
}

/// Owns the record/play state machine on top of a [`RecorderBackend`].
pub struct RecordingController {
    backend: Arc<dyn RecorderBackend>,
    state: Arc<Mutex<RecorderState>>,
}

impl RecordingController {
    pub fn new(backend: Arc<dyn RecorderBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(RecorderState {
                mode: RecorderMode::Idle,
                captured: None,
            })),
        }
    }

    pub fn mode(&self) -> RecorderMode {
        self.state.lock().unwrap().mode
    }

    pub fn captured(&self) -> Option<Recording> {
        self.state.lock().unwrap().captured.clone()
    }

    /// Begin capturing. Stops playback first if one is running.
    pub async fn start_recording(&self) {
        if self.mode() == RecorderMode::Playing {
            self.backend.stop_playback().await;
            self.state.lock().unwrap().mode = RecorderMode::Idle;
        }
        self.backend.start_capture().await;
        self.state.lock().unwrap().mode = RecorderMode::Recording;
        info!("recording started");
    }

    /// Stop capturing; the take becomes the captured recording, replacing
    /// any earlier one.
    pub async fn stop_recording(&self) -> Result<Recording, RecordingError> {
        if self.mode() != RecorderMode::Recording {
            return Err(RecordingError::InvalidState {
                operation: "stop_recording",
                mode: self.mode(),
            });
        }
        let recording = self.backend.stop_capture().await;
        info!(handle = %recording.handle, "recording captured");
        let mut state = self.state.lock().unwrap();
        state.mode = RecorderMode::Idle;
        state.captured = Some(recording.clone());
        Ok(recording)
    }

    /// Play the captured recording.
    ///
    /// A capture in progress is stopped first and its take becomes the one
    /// to play. The returned channel resolves once playback has completed
    /// naturally, the settling delay has elapsed, and the output has been
    /// unmuted; it never resolves if playback is interrupted by
    /// [`stop_playing`](Self::stop_playing).
    pub async fn start_playing(&self) -> Result<oneshot::Receiver<()>, RecordingError> {
        if self.mode() == RecorderMode::Recording {
            let recording = self.backend.stop_capture().await;
            let mut state = self.state.lock().unwrap();
            state.mode = RecorderMode::Idle;
            state.captured = Some(recording);
        }

        let handle = {
            let state = self.state.lock().unwrap();
            state
                .captured
                .as_ref()
                .map(|r| r.handle)
                .ok_or(RecordingError::NoCapturedRecording)?
        };

        mute().await;
        self.state.lock().unwrap().mode = RecorderMode::Playing;
        info!(%handle, "playback started");

        let (stopped_tx, stopped_rx) = oneshot::channel();
        let backend = self.backend.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            if backend.play(handle).await == PlaybackEnd::Completed {
                {
                    let mut state = state.lock().unwrap();
                    if state.mode == RecorderMode::Playing {
                        state.mode = RecorderMode::Idle;
                    }
                }
                sleep(PLAYBACK_SETTLE).await;
                unmute().await;
                let _ = stopped_tx.send(());
            }
            // An interrupted run is stop_playing's business; it already
            // moved the state machine and the caller gets no signal.
        });

        Ok(stopped_rx)
    }

    /// Interrupt playback. The pending stop signal from
    /// [`start_playing`](Self::start_playing) will not fire.
    pub async fn stop_playing(&self) -> Result<(), RecordingError> {
        if self.mode() != RecorderMode::Playing {
            return Err(RecordingError::InvalidState {
                operation: "stop_playing",
                mode: self.mode(),
            });
        }
        self.backend.stop_playback().await;
        self.state.lock().unwrap().mode = RecorderMode::Idle;
        debug!("playback stopped");
        Ok(())
    }

    /// Drop the captured recording. Current mode is unaffected.
    pub fn reset_recording(&self) {
        self.state.lock().unwrap().captured = None;
    }
}

/// Stand-in backend for machines without the audio capture process.
///
/// Captures nothing; a take remembers only how long the capture ran, and
/// playback sleeps for that long.
#[derive(Default)]
pub struct DevRecorder {
    capture_started: Mutex<Option<tokio::time::Instant>>,
    takes: Mutex<std::collections::HashMap<RecordingHandle, Duration>>,
    interrupt: tokio::sync::Notify,
}

impl DevRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecorderBackend for DevRecorder {
    async fn start_capture(&self) {
        *self.capture_started.lock().unwrap() = Some(tokio::time::Instant::now());
    }

    async fn stop_capture(&self) -> Recording {
        let elapsed = self
            .capture_started
            .lock()
            .unwrap()
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        let handle = RecordingHandle::generate();
        self.takes.lock().unwrap().insert(handle, elapsed);

        let mut recording = Recording::new(handle);
        recording.metadata.duration_secs = Some(elapsed.as_secs_f64());
        recording
    }

    async fn play(&self, handle: RecordingHandle) -> PlaybackEnd {
        let duration = self
            .takes
            .lock()
            .unwrap()
            .get(&handle)
            .copied()
            .unwrap_or_default();
        tokio::select! {
            _ = sleep(duration) => PlaybackEnd::Completed,
            _ = self.interrupt.notified() => PlaybackEnd::Stopped,
        }
    }

    async fn stop_playback(&self) {
        self.interrupt.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio::time::{advance, Instant};

    /// Backend double: capture produces fresh handles, playback runs until
    /// the test completes or interrupts it.
    struct ScriptedBackend {
        captures: AtomicUsize,
        played: Mutex<Vec<RecordingHandle>>,
        finish: Notify,
        interrupt: Notify,
    }

    impl ScriptedBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                captures: AtomicUsize::new(0),
                played: Mutex::new(Vec::new()),
                finish: Notify::new(),
                interrupt: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl RecorderBackend for ScriptedBackend {
        async fn start_capture(&self) {
            self.captures.fetch_add(1, Ordering::SeqCst);
        }

        async fn stop_capture(&self) -> Recording {
            Recording::new(RecordingHandle::generate())
        }

        async fn play(&self, handle: RecordingHandle) -> PlaybackEnd {
            self.played.lock().unwrap().push(handle);
            tokio::select! {
                _ = self.finish.notified() => PlaybackEnd::Completed,
                _ = self.interrupt.notified() => PlaybackEnd::Stopped,
            }
        }

        async fn stop_playback(&self) {
            self.interrupt.notify_one();
        }
    }

    #[tokio::test]
    async fn start_recording_interrupts_playback_first() {
        let backend = ScriptedBackend::new();
        let controller = RecordingController::new(backend.clone());

        controller.start_recording().await;
        controller.stop_recording().await.unwrap();
        let _stopped = controller.start_playing().await.unwrap();
        assert_eq!(controller.mode(), RecorderMode::Playing);

        controller.start_recording().await;
        assert_eq!(controller.mode(), RecorderMode::Recording);
        assert_eq!(backend.captures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn playing_without_a_capture_fails_and_leaves_state_alone() {
        let controller = RecordingController::new(ScriptedBackend::new());
        let err = controller.start_playing().await.unwrap_err();
        assert!(matches!(err, RecordingError::NoCapturedRecording));
        assert_eq!(controller.mode(), RecorderMode::Idle);
    }

    #[tokio::test]
    async fn playback_uses_the_just_captured_take() {
        let backend = ScriptedBackend::new();
        let controller = RecordingController::new(backend.clone());

        controller.start_recording().await;
        let captured = controller.stop_recording().await.unwrap();
        let _stopped = controller.start_playing().await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(backend.played.lock().unwrap()[0], captured.handle);
    }

    #[tokio::test]
    async fn start_playing_while_recording_captures_then_plays_that_take() {
        let backend = ScriptedBackend::new();
        let controller = RecordingController::new(backend.clone());

        controller.start_recording().await;
        let _stopped = controller.start_playing().await.unwrap();
        tokio::task::yield_now().await;

        let played = backend.played.lock().unwrap()[0];
        assert_eq!(controller.captured().unwrap().handle, played);
        assert_eq!(controller.mode(), RecorderMode::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_waits_out_the_settling_delay() {
        let backend = ScriptedBackend::new();
        let controller = RecordingController::new(backend.clone());

        controller.start_recording().await;
        controller.stop_recording().await.unwrap();
        let stopped = controller.start_playing().await.unwrap();

        let completion_at = Instant::now();
        backend.finish.notify_one();
        tokio::task::yield_now().await;

        advance(PLAYBACK_SETTLE).await;
        stopped.await.unwrap();
        assert!(Instant::now() - completion_at >= PLAYBACK_SETTLE);
        assert_eq!(controller.mode(), RecorderMode::Idle);
    }

    #[tokio::test]
    async fn stop_playing_suppresses_the_stop_signal() {
        let backend = ScriptedBackend::new();
        let controller = RecordingController::new(backend.clone());

        controller.start_recording().await;
        controller.stop_recording().await.unwrap();
        let stopped = controller.start_playing().await.unwrap();

        controller.stop_playing().await.unwrap();
        assert_eq!(controller.mode(), RecorderMode::Idle);

        // The playback task ends without resolving the channel.
        assert!(stopped.await.is_err());
    }

    #[tokio::test]
    async fn stop_playing_from_idle_is_an_error() {
        let controller = RecordingController::new(ScriptedBackend::new());
        let err = controller.stop_playing().await.unwrap_err();
        assert!(matches!(err, RecordingError::InvalidState { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn dev_recorder_replays_for_the_captured_duration() {
        let recorder = DevRecorder::new();
        recorder.start_capture().await;
        advance(Duration::from_secs(2)).await;
        let take = recorder.stop_capture().await;
        assert_eq!(take.metadata.duration_secs, Some(2.0));

        let started = Instant::now();
        assert_eq!(recorder.play(take.handle).await, PlaybackEnd::Completed);
        assert_eq!(Instant::now() - started, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn reset_drops_the_capture_but_keeps_the_mode() {
        let backend = ScriptedBackend::new();
        let controller = RecordingController::new(backend.clone());

        controller.start_recording().await;
        controller.stop_recording().await.unwrap();
        assert!(controller.captured().is_some());

        controller.reset_recording();
        assert!(controller.captured().is_none());
        assert_eq!(controller.mode(), RecorderMode::Idle);

        let err = controller.start_playing().await.unwrap_err();
        assert!(matches!(err, RecordingError::NoCapturedRecording));
    }
}
