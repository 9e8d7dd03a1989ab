//! Microphone bridge use case.
//!
//! The host owns at most one capture per microphone uid. Each capture holds
//! a session named `mic:<uid>` so the progress tray shows it and
//! `stop_msg_name("mic:<uid>")` cancels it.

use crate::ports::audio_capture::{AudioCapture, CaptureError, CaptureSession};
use crate::registry::{SessionGuard, SessionRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tooldesk_domain::{AudioFormat, MsgId};
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum MicrophoneError {
    #[error("microphone {0} is already recording")]
    AlreadyActive(String),

    #[error("microphone {0} is not recording")]
    NotActive(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

pub type Result<T> = std::result::Result<T, MicrophoneError>;

struct ActiveCapture {
    recording: Box<dyn CaptureSession>,
    session: SessionGuard,
}

pub struct MicrophoneBridge {
    capture: Arc<dyn AudioCapture>,
    sessions: Arc<SessionRegistry>,
    active: Mutex<HashMap<String, ActiveCapture>>,
}

impl MicrophoneBridge {
    pub fn new(capture: Arc<dyn AudioCapture>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            capture,
            sessions,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn session_name(mic_uid: &str) -> String {
        format!("mic:{}", mic_uid)
    }

    /// Open a capture for `mic_uid` on behalf of `msg_id`.
    pub async fn start(&self, msg_id: MsgId, mic_uid: &str) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.contains_key(mic_uid) {
            return Err(MicrophoneError::AlreadyActive(mic_uid.to_string()));
        }
        let recording = self.capture.start().await?;

        let parent = (!msg_id.is_none()).then_some(msg_id);
        let session = self.sessions.open("microphone", parent);
        // The guard was just opened, so naming it cannot fail.
        let _ = self
            .sessions
            .set_name(session.id(), &Self::session_name(mic_uid));
        info!(mic_uid, msg_id = %session.id(), "Microphone started");
        active.insert(mic_uid.to_string(), ActiveCapture { recording, session });
        Ok(())
    }

    /// Close the capture for `mic_uid`.
    ///
    /// Returns the audio in `format`, or an empty payload when `cancel` is
    /// set or the capture session was stopped from the tray.
    pub async fn stop(&self, mic_uid: &str, cancel: bool, format: AudioFormat) -> Result<Vec<u8>> {
        let capture = self
            .active
            .lock()
            .await
            .remove(mic_uid)
            .ok_or_else(|| MicrophoneError::NotActive(mic_uid.to_string()))?;

        let cancelled = cancel || capture.session.is_cancelled();
        if cancelled {
            capture.recording.cancel().await;
            debug!(mic_uid, "Microphone capture discarded");
            return Ok(Vec::new());
        }
        let bytes = capture.recording.finish(format).await?;
        info!(mic_uid, bytes = bytes.len(), ?format, "Microphone stopped");
        Ok(bytes)
    }

    pub async fn is_active(&self, mic_uid: &str) -> bool {
        self.active.lock().await.contains_key(mic_uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeCapture {
        cancelled: Arc<AtomicUsize>,
    }

    struct FakeRecording {
        cancelled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AudioCapture for FakeCapture {
        async fn start(&self) -> std::result::Result<Box<dyn CaptureSession>, CaptureError> {
            Ok(Box::new(FakeRecording {
                cancelled: self.cancelled.clone(),
            }))
        }
    }

    #[async_trait]
    impl CaptureSession for FakeRecording {
        async fn finish(
            self: Box<Self>,
            format: AudioFormat,
        ) -> std::result::Result<Vec<u8>, CaptureError> {
            Ok(format.extension().as_bytes().to_vec())
        }

        async fn cancel(self: Box<Self>) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn bridge() -> (MicrophoneBridge, Arc<SessionRegistry>, Arc<AtomicUsize>) {
        let capture = FakeCapture::default();
        let cancelled = capture.cancelled.clone();
        let sessions = SessionRegistry::new();
        (
            MicrophoneBridge::new(Arc::new(capture), sessions.clone()),
            sessions,
            cancelled,
        )
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let (mic, _, _) = bridge();
        mic.start(MsgId::NONE, "42").await.unwrap();
        let err = mic.start(MsgId::NONE, "42").await.unwrap_err();
        assert!(matches!(err, MicrophoneError::AlreadyActive(ref uid) if *uid == "42"));
        // A different microphone is independent.
        mic.start(MsgId::NONE, "43").await.unwrap();
    }

    #[tokio::test]
    async fn stop_returns_requested_container() {
        let (mic, sessions, _) = bridge();
        mic.start(MsgId::NONE, "42").await.unwrap();
        assert!(sessions.find_name("mic:42").is_some());

        let bytes = mic.stop("42", false, AudioFormat::Mp3).await.unwrap();
        assert_eq!(bytes, b"mp3");
        assert!(!mic.is_active("42").await);
        assert!(sessions.find_name("mic:42").is_none());
    }

    #[tokio::test]
    async fn cancel_returns_empty_payload() {
        let (mic, _, cancelled) = bridge();
        mic.start(MsgId::NONE, "42").await.unwrap();
        let bytes = mic.stop("42", true, AudioFormat::Wav).await.unwrap();
        assert!(bytes.is_empty());
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tray_stop_discards_audio() {
        let (mic, sessions, cancelled) = bridge();
        mic.start(MsgId::NONE, "7").await.unwrap();
        sessions.stop_by_name("mic:7").unwrap();
        let bytes = mic.stop("7", false, AudioFormat::Wav).await.unwrap();
        assert!(bytes.is_empty());
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_without_start_fails() {
        let (mic, _, _) = bridge();
        let err = mic.stop("42", false, AudioFormat::Wav).await.unwrap_err();
        assert_eq!(err.to_string(), "microphone 42 is not recording");
    }
}
