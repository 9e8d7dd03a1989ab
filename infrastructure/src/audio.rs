//! Microphone capture through external recorder and encoder commands.
//!
//! Recording runs `arecord` (or the configured replacement) writing raw
//! 16-bit mono little-endian PCM to stdout. On stop the PCM is wrapped in a
//! WAV header, or piped through the mp3 encoder command.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tooldesk_application::{AudioCapture, CaptureError, CaptureSession};
use tooldesk_domain::{AudioFormat, PcmSpec, wav_encode};
use tracing::{debug, warn};

pub struct CommandAudioCapture {
    record_command: String,
    record_args: Option<Vec<String>>,
    mp3_command: String,
    mp3_args: Option<Vec<String>>,
    sample_rate: u32,
}

impl CommandAudioCapture {
    pub fn new(
        record_command: impl Into<String>,
        sample_rate: u32,
        mp3_command: impl Into<String>,
    ) -> Self {
        Self {
            record_command: record_command.into(),
            record_args: None,
            mp3_command: mp3_command.into(),
            mp3_args: None,
            sample_rate,
        }
    }

    /// Replace the default `arecord` arguments.
    pub fn with_record_args(mut self, args: Vec<String>) -> Self {
        self.record_args = Some(args);
        self
    }

    /// Replace the default `ffmpeg` arguments.
    pub fn with_mp3_args(mut self, args: Vec<String>) -> Self {
        self.mp3_args = Some(args);
        self
    }

    fn record_args(&self) -> Vec<String> {
        self.record_args.clone().unwrap_or_else(|| {
            vec![
                "-q".into(),
                "-t".into(),
                "raw".into(),
                "-f".into(),
                "S16_LE".into(),
                "-c".into(),
                "1".into(),
                "-r".into(),
                self.sample_rate.to_string(),
            ]
        })
    }

    fn mp3_args(&self) -> Vec<String> {
        self.mp3_args.clone().unwrap_or_else(|| {
            vec![
                "-loglevel".into(),
                "error".into(),
                "-f".into(),
                "s16le".into(),
                "-ar".into(),
                self.sample_rate.to_string(),
                "-ac".into(),
                "1".into(),
                "-i".into(),
                "pipe:0".into(),
                "-f".into(),
                "mp3".into(),
                "pipe:1".into(),
            ]
        })
    }
}

fn locate(command: &str) -> Result<PathBuf, CaptureError> {
    which::which(command).map_err(|_| CaptureError::RecorderMissing(command.to_string()))
}

#[async_trait]
impl AudioCapture for CommandAudioCapture {
    async fn start(&self) -> Result<Box<dyn CaptureSession>, CaptureError> {
        let program = locate(&self.record_command)?;
        let mut child = Command::new(&program)
            .args(self.record_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Recorder("recorder stdout not captured".into()))?;

        let reader = tokio::spawn(async move {
            let mut pcm = Vec::new();
            stdout.read_to_end(&mut pcm).await.map(|_| pcm)
        });
        debug!(recorder = %program.display(), "Recording started");

        Ok(Box::new(CommandCaptureSession {
            child,
            reader,
            spec: PcmSpec::mono16(self.sample_rate),
            mp3_command: self.mp3_command.clone(),
            mp3_args: self.mp3_args(),
        }))
    }
}

struct CommandCaptureSession {
    child: Child,
    reader: JoinHandle<std::io::Result<Vec<u8>>>,
    spec: PcmSpec,
    mp3_command: String,
    mp3_args: Vec<String>,
}

impl CommandCaptureSession {
    async fn stop_recorder(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "Recorder already exited");
        }
        let _ = self.child.wait().await;
    }
}

async fn encode_mp3(
    command: &str,
    args: &[String],
    pcm: Vec<u8>,
) -> Result<Vec<u8>, CaptureError> {
    let program =
        locate(command).map_err(|_| CaptureError::Encoder(format!("{} not found", command)))?;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| CaptureError::Encoder("encoder stdin not captured".into()))?;
    let feeder = tokio::spawn(async move {
        stdin.write_all(&pcm).await?;
        stdin.shutdown().await
    });

    let output = child.wait_with_output().await?;
    if let Ok(Err(e)) = feeder.await {
        warn!(error = %e, "Encoder closed stdin early");
    }
    if !output.status.success() {
        return Err(CaptureError::Encoder(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(output.stdout)
}

#[async_trait]
impl CaptureSession for CommandCaptureSession {
    async fn finish(mut self: Box<Self>, format: AudioFormat) -> Result<Vec<u8>, CaptureError> {
        self.stop_recorder().await;
        let session = *self;
        let pcm = session
            .reader
            .await
            .map_err(|e| CaptureError::Recorder(e.to_string()))??;
        debug!(bytes = pcm.len(), format = format.extension(), "Recording stopped");

        match format {
            AudioFormat::Wav => Ok(wav_encode(&pcm, session.spec)),
            AudioFormat::Mp3 => encode_mp3(&session.mp3_command, &session.mp3_args, pcm).await,
        }
    }

    async fn cancel(mut self: Box<Self>) {
        self.stop_recorder().await;
        self.reader.abort();
        debug!("Recording cancelled");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn pcm_file(dir: &tempfile::TempDir) -> (PathBuf, Vec<u8>) {
        let pcm: Vec<u8> = (0..64u8).collect();
        let path = dir.path().join("input.pcm");
        std::fs::write(&path, &pcm).unwrap();
        (path, pcm)
    }

    async fn record_with_cat(capture: &CommandAudioCapture) -> Box<dyn CaptureSession> {
        let session = capture.start().await.unwrap();
        // `cat` exits on its own; give the reader time to drain it.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        session
    }

    #[tokio::test]
    async fn missing_recorder_is_reported() {
        let capture = CommandAudioCapture::new("tooldesk-no-such-recorder", 16_000, "ffmpeg");
        assert!(matches!(
            capture.start().await,
            Err(CaptureError::RecorderMissing(_))
        ));
    }

    #[tokio::test]
    async fn wav_wraps_recorded_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let (path, pcm) = pcm_file(&dir);
        let capture = CommandAudioCapture::new("cat", 16_000, "cat")
            .with_record_args(vec![path.display().to_string()]);

        let wav = record_with_cat(&capture)
            .await
            .finish(AudioFormat::Wav)
            .await
            .unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[44..], pcm.as_slice());
    }

    #[tokio::test]
    async fn mp3_pipes_through_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let (path, pcm) = pcm_file(&dir);
        let capture = CommandAudioCapture::new("cat", 16_000, "cat")
            .with_record_args(vec![path.display().to_string()])
            .with_mp3_args(Vec::new());

        let out = record_with_cat(&capture)
            .await
            .finish(AudioFormat::Mp3)
            .await
            .unwrap();
        assert_eq!(out, pcm);
    }

    #[tokio::test]
    async fn cancel_stops_long_recording() {
        let capture =
            CommandAudioCapture::new("sleep", 16_000, "cat").with_record_args(vec!["30".into()]);
        let session = capture.start().await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), session.cancel())
            .await
            .unwrap();
    }
}
