use crate::transcode::cmd::CommandRunner;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;

/// Encoder selection passed to ffmpeg via `-c:a` plus any extra arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    pub encoder: &'static str,
    pub extra_args: &'static [&'static str],
    pub extension: &'static str,
}

impl Codec {
    pub fn flac() -> Self {
        Codec {
            encoder: "flac",
            extra_args: &["-compression_level", "5"],
            extension: ".flac",
        }
    }

    pub fn pcm_wav() -> Self {
        Codec {
            encoder: "pcm_s16le",
            extra_args: &[],
            extension: ".wav",
        }
    }

    pub fn mp3() -> Self {
        Codec {
            encoder: "libmp3lame",
            extra_args: &["-b:a", "192k"],
            extension: ".mp3",
        }
    }
}

/// Captured output of a successful tool run, lossily decoded.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
pub enum InvocationError {
    /// ffmpeg could not be resolved on the search path.
    ToolNotFound,
    Io(io::Error),
    TimedOut { secs: u64 },
    NonZeroExit { code: Option<i32>, stderr_tail: String },
    /// The tool exited cleanly but the destination is missing or zero bytes.
    EmptyOutput(PathBuf),
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationError::ToolNotFound => write!(f, "ffmpeg not found on PATH"),
            InvocationError::Io(e) => write!(f, "failed to run ffmpeg: {}", e),
            InvocationError::TimedOut { secs } => {
                write!(f, "ffmpeg timed out after {}s", secs)
            }
            InvocationError::NonZeroExit { code, stderr_tail } => match code {
                Some(code) => write!(f, "ffmpeg exited with code {}: {}", code, stderr_tail),
                None => write!(f, "ffmpeg killed by signal: {}", stderr_tail),
            },
            InvocationError::EmptyOutput(path) => {
                write!(f, "ffmpeg produced an empty output file: {}", path.display())
            }
        }
    }
}

impl std::error::Error for InvocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InvocationError::Io(e) => Some(e),
            _ => None,
        }
    }
}

const STDERR_TAIL_CHARS: usize = 800;

fn tail(text: &str, max_chars: usize) -> String {
    let start = text
        .char_indices()
        .rev()
        .nth(max_chars.saturating_sub(1))
        .map_or(0, |(i, _)| i);
    text[start..].to_string()
}

/// Builds and runs one ffmpeg command per segment or per whole-file
/// conversion, bounded by a wall-clock timeout.
pub struct TranscodeInvoker<R> {
    runner: R,
    tool_timeout: Duration,
}

impl<R: CommandRunner> TranscodeInvoker<R> {
    pub fn new(runner: R, tool_timeout: Duration) -> Self {
        Self {
            runner,
            tool_timeout,
        }
    }

    /// Cut `[start, start+duration)` out of `input` into `output` (duration
    /// `None` runs to end of source), re-encoding with `codec`. The
    /// destination is overwritten unconditionally.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        start_secs: f64,
        duration_secs: Option<f64>,
        codec: &Codec,
    ) -> Result<ToolOutput, InvocationError> {
        let args = build_args(input, output, start_secs, duration_secs, codec);
        tracing::debug!(?args, "running ffmpeg");

        let result = match timeout(self.tool_timeout, self.runner.run_ffmpeg(&args)).await {
            Ok(result) => result,
            Err(_) => {
                return Err(InvocationError::TimedOut {
                    secs: self.tool_timeout.as_secs(),
                })
            }
        };

        let out = match result {
            Ok(out) => out,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(InvocationError::ToolNotFound)
            }
            Err(e) => return Err(InvocationError::Io(e)),
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(InvocationError::NonZeroExit {
                code: out.status.code(),
                stderr_tail: tail(stderr.trim(), STDERR_TAIL_CHARS),
            });
        }

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

/// `-y -i <input> -ss <start> [-t <dur>] -c:a <encoder> <extra...> <output>`
///
/// A zero-length duration is treated like `None`: `-t 0` would make ffmpeg
/// write an empty file, so the cut runs to end of source instead.
fn build_args(
    input: &Path,
    output: &Path,
    start_secs: f64,
    duration_secs: Option<f64>,
    codec: &Codec,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-ss".to_string(),
        start_secs.to_string(),
    ];
    if let Some(duration) = duration_secs.filter(|d| *d > 0.0) {
        args.push("-t".to_string());
        args.push(duration.to_string());
    }
    args.push("-c:a".to_string());
    args.push(codec.encoder.to_string());
    args.extend(codec.extra_args.iter().map(|a| a.to_string()));
    args.push(output.display().to_string());
    args
}

/// Some ffmpeg failure modes exit 0 while writing nothing, so a clean exit
/// still has to be checked against the destination file.
pub async fn verify_output(path: &Path) -> Result<(), InvocationError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(InvocationError::EmptyOutput(path.to_path_buf())),
        Err(_) => Err(InvocationError::EmptyOutput(path.to_path_buf())),
    }
}
