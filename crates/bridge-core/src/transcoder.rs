use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::Mutex,
};
use tracing::{debug, info, warn};

const STDERR_TAIL_MAX_BYTES: usize = 16 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 200;

/// One conversion job. Consumed by `convert`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscodeRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// ffmpeg muxer name (`-f`), e.g. `mp3`, `ogg`.
    pub container: String,
    /// ffmpeg audio encoder (`-c:a`), e.g. `libmp3lame`, `libopus`.
    pub codec: String,
    pub bitrate_kbps: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscodeOutput {
    pub output_path: PathBuf,
    pub byte_size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg exited with {status}: {stderr}")]
    Engine { status: String, stderr: String },

    #[error("ffmpeg reported success but produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("i/o error while transcoding: {0}")]
    Io(#[from] std::io::Error),
}

/// Advisory progress from the conversion engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscodeProgress {
    /// Encoded media time so far.
    Encoded(Duration),
    Finished,
}

pub type ProgressObserver = Arc<dyn Fn(TranscodeProgress) + Send + Sync>;

/// Converts an audio file into another container/codec.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    async fn convert(
        &self,
        req: TranscodeRequest,
    ) -> std::result::Result<TranscodeOutput, TranscodeError>;
}

#[derive(Clone, Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_line(&mut self, line: String) {
        // +1 for the '\n' we join with later.
        self.bytes = self.bytes.saturating_add(line.len() + 1);
        self.lines.push_back(line);

        while self.lines.len() > STDERR_TAIL_MAX_LINES || self.bytes > STDERR_TAIL_MAX_BYTES {
            if let Some(front) = self.lines.pop_front() {
                self.bytes = self.bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
    }

    fn snapshot(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// Runs an external `ffmpeg` process per conversion.
///
/// The child is awaited through tokio, so a slow conversion only suspends the
/// task that asked for it.
#[derive(Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
    observer: ProgressObserver,
}

impl std::fmt::Debug for FfmpegTranscoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegTranscoder")
            .field("binary", &self.binary)
            .finish_non_exhaustive()
    }
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            observer: Arc::new(|p: TranscodeProgress| debug!("ffmpeg progress: {p:?}")),
        }
    }

    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Check that the configured binary runs at all.
    pub async fn probe(&self) -> std::result::Result<String, TranscodeError> {
        let out = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                program: self.binary.display().to_string(),
                source,
            })?;

        if !out.status.success() {
            return Err(TranscodeError::Engine {
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&out.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }

    async fn run(&self, req: &TranscodeRequest) -> std::result::Result<u64, TranscodeError> {
        let mut child = Command::new(&self.binary)
            .args(build_args(req))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: self.binary.display().to_string(),
                source,
            })?;

        // Drain stderr in background to avoid blocking on a full pipe.
        let stderr_tail: Arc<Mutex<StderrTail>> = Arc::new(Mutex::new(StderrTail::default()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let tail = stderr_tail.clone();
            tokio::spawn(async move {
                let mut r = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = r.next_line().await {
                    tail.lock().await.push_line(line);
                }
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut r = BufReader::new(stdout).lines();
            while let Some(line) = r.next_line().await? {
                if let Some(p) = parse_progress_line(&line) {
                    (self.observer)(p);
                }
            }
        }

        let status = child.wait().await?;
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        if !status.success() {
            let stderr = stderr_tail.lock().await.snapshot();
            return Err(engine_error(status, stderr));
        }

        match tokio::fs::metadata(&req.output_path).await {
            Ok(md) if md.len() > 0 => Ok(md.len()),
            _ => Err(TranscodeError::MissingOutput(req.output_path.clone())),
        }
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn convert(
        &self,
        req: TranscodeRequest,
    ) -> std::result::Result<TranscodeOutput, TranscodeError> {
        info!(
            input = %req.input_path.display(),
            output = %req.output_path.display(),
            container = %req.container,
            codec = %req.codec,
            bitrate_kbps = req.bitrate_kbps,
            "starting audio conversion"
        );

        match self.run(&req).await {
            Ok(byte_size) => {
                info!(output = %req.output_path.display(), byte_size, "audio conversion finished");
                Ok(TranscodeOutput {
                    output_path: req.output_path,
                    byte_size,
                })
            }
            Err(e) => {
                // Never leave a half-written output behind.
                if let Err(rm) = tokio::fs::remove_file(&req.output_path).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %req.output_path.display(), "failed to remove partial output: {rm}");
                    }
                }
                Err(e)
            }
        }
    }
}

fn engine_error(status: ExitStatus, stderr: String) -> TranscodeError {
    TranscodeError::Engine {
        status: status.to_string(),
        stderr,
    }
}

fn build_args(req: &TranscodeRequest) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        req.input_path.display().to_string(),
        "-vn".to_string(),
        "-c:a".to_string(),
        req.codec.clone(),
        "-b:a".to_string(),
        format!("{}k", req.bitrate_kbps),
        "-f".to_string(),
        req.container.clone(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-nostats".to_string(),
        req.output_path.display().to_string(),
    ]
}

/// Parse one `key=value` line of ffmpeg's `-progress` output.
fn parse_progress_line(line: &str) -> Option<TranscodeProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // Despite the name, ffmpeg reports microseconds here.
        "out_time_us" | "out_time_ms" => value
            .parse::<u64>()
            .ok()
            .map(|us| TranscodeProgress::Encoded(Duration::from_micros(us))),
        "progress" if value == "end" => Some(TranscodeProgress::Finished),
        _ => None,
    }
}
