use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use crate::config::{PlaybackBackend, PlaybackConfig, RecordingBackend, RecordingConfig};
use crate::error::MediaError;

/// How long ffmpeg gets to finalize a recording after being asked to quit
const RECORDER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Plays local files or remote URLs
#[async_trait]
pub trait Player: Send {
    fn name(&self) -> &str;

    /// Start playing `source`, replacing whatever is currently playing
    async fn play(&mut self, source: &str) -> Result<(), MediaError>;

    /// Wait until the current playback ends on its own
    async fn wait(&mut self) -> Result<(), MediaError>;

    async fn stop(&mut self) -> Result<(), MediaError>;
}

/// Captures microphone input into a file
#[async_trait]
pub trait Recorder: Send {
    fn name(&self) -> &str;

    fn is_recording(&self) -> bool;

    async fn start(&mut self, output: &Path) -> Result<(), MediaError>;

    /// Finish the recording and return the path it was written to
    async fn stop(&mut self) -> Result<PathBuf, MediaError>;
}

pub fn player_from_config(config: &PlaybackConfig) -> Box<dyn Player> {
    match config.backend {
        PlaybackBackend::Ffplay => Box::new(FfplayPlayer::new(config.ffplay_path.clone())),
        PlaybackBackend::None => Box::new(NullPlayer),
    }
}

pub fn recorder_from_config(config: &RecordingConfig) -> Box<dyn Recorder> {
    match config.backend {
        RecordingBackend::Ffmpeg => Box::new(FfmpegRecorder::new(config.clone())),
        RecordingBackend::None => Box::new(NullRecorder::default()),
    }
}

fn spawn_failed(program: &str) -> impl FnOnce(std::io::Error) -> MediaError + '_ {
    move |e| MediaError::SpawnFailed {
        program: program.to_string(),
        source: e,
    }
}

/// Player that runs `ffplay` without a window
pub struct FfplayPlayer {
    program: String,
    child: Option<Child>,
}

impl FfplayPlayer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            child: None,
        }
    }
}

#[async_trait]
impl Player for FfplayPlayer {
    fn name(&self) -> &str {
        "ffplay"
    }

    async fn play(&mut self, source: &str) -> Result<(), MediaError> {
        self.stop().await?;

        let child = Command::new(&self.program)
            .args(["-nodisp", "-autoexit", "-loglevel", "quiet", source])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_failed(&self.program))?;

        debug!(source, "Playback started");
        self.child = Some(child);
        Ok(())
    }

    async fn wait(&mut self) -> Result<(), MediaError> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };

        let status = child.wait().await?;
        self.child = None;

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::PlaybackFailed {
                code: status.code(),
            })
        }
    }

    async fn stop(&mut self) -> Result<(), MediaError> {
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.kill().await
        {
            warn!(error = %e, "Failed to stop player");
        }
        Ok(())
    }
}

/// Player used when playback is disabled
#[derive(Debug, Default)]
pub struct NullPlayer;

#[async_trait]
impl Player for NullPlayer {
    fn name(&self) -> &str {
        "none"
    }

    async fn play(&mut self, source: &str) -> Result<(), MediaError> {
        info!(source, "Playback is disabled; not playing");
        Ok(())
    }

    async fn wait(&mut self) -> Result<(), MediaError> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), MediaError> {
        Ok(())
    }
}

struct ActiveRecording {
    child: Child,
    output: PathBuf,
}

/// Recorder that captures the configured input device with `ffmpeg`
pub struct FfmpegRecorder {
    config: RecordingConfig,
    active: Option<ActiveRecording>,
}

impl FfmpegRecorder {
    pub fn new(config: RecordingConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    fn build_args(&self, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-f".to_string(),
            self.config.input_format.clone(),
            "-i".to_string(),
            self.config.device.clone(),
            output.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl Recorder for FfmpegRecorder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    async fn start(&mut self, output: &Path) -> Result<(), MediaError> {
        if self.active.is_some() {
            return Err(MediaError::AlreadyRecording);
        }

        let child = Command::new(&self.config.ffmpeg_path)
            .args(self.build_args(output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_failed(&self.config.ffmpeg_path))?;

        info!(path = %output.display(), "Recording started");
        self.active = Some(ActiveRecording {
            child,
            output: output.to_path_buf(),
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<PathBuf, MediaError> {
        let ActiveRecording { mut child, output } =
            self.active.take().ok_or(MediaError::NotRecording)?;

        // `q` makes ffmpeg flush and close the container
        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(b"q").await
        {
            debug!(error = %e, "Recorder stdin closed before quit request");
        }

        let status = match timeout(RECORDER_STOP_TIMEOUT, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!("Recorder did not quit in time; killing it");
                child.kill().await?;
                return Err(MediaError::RecorderFailed { code: None });
            }
        };

        if !status.success() {
            return Err(MediaError::RecorderFailed {
                code: status.code(),
            });
        }

        info!(path = %output.display(), "Recording stopped");
        Ok(output)
    }
}

/// Recorder used when recording is disabled; never writes a file
#[derive(Debug, Default)]
pub struct NullRecorder {
    output: Option<PathBuf>,
}

#[async_trait]
impl Recorder for NullRecorder {
    fn name(&self) -> &str {
        "none"
    }

    fn is_recording(&self) -> bool {
        self.output.is_some()
    }

    async fn start(&mut self, output: &Path) -> Result<(), MediaError> {
        if self.output.is_some() {
            return Err(MediaError::AlreadyRecording);
        }
        info!("Recording is disabled; nothing will be captured");
        self.output = Some(output.to_path_buf());
        Ok(())
    }

    async fn stop(&mut self) -> Result<PathBuf, MediaError> {
        self.output.take().ok_or(MediaError::NotRecording)
    }
}
