//! Audio capture port
//!
//! One [`CaptureSession`] per active microphone. The adapter records raw
//! PCM and encodes it into the requested container when stopped.

use async_trait::async_trait;
use thiserror::Error;
use tooldesk_domain::AudioFormat;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Recorder not available: {0}")]
    RecorderMissing(String),

    #[error("Recorder failed: {0}")]
    Recorder(String),

    #[error("Encoder failed: {0}")]
    Encoder(String),

    #[error("Capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait AudioCapture: Send + Sync {
    async fn start(&self) -> Result<Box<dyn CaptureSession>, CaptureError>;
}

#[async_trait]
pub trait CaptureSession: Send + Sync {
    /// Stop recording and return the audio in `format`.
    async fn finish(self: Box<Self>, format: AudioFormat) -> Result<Vec<u8>, CaptureError>;

    /// Stop recording and discard the audio.
    async fn cancel(self: Box<Self>);
}
