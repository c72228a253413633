use async_trait::async_trait;
use std::io;
use std::process::Output;
use tokio::process::Command as TokioCommand;

/// Runs one external-tool command and hands back the raw process output.
/// Knows nothing about jobs or segments, only "run this argument vector".
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    async fn run_ffmpeg(&self, args: &[String]) -> io::Result<Output>;
}

/// The real runner: invokes `ffmpeg` from the search path, capturing
/// stdout/stderr in full. The child is killed if the future is dropped,
/// which is how the invoker's timeout tears it down.
pub struct FfmpegRunner;

#[async_trait]
impl CommandRunner for FfmpegRunner {
    async fn run_ffmpeg(&self, args: &[String]) -> io::Result<Output> {
        TokioCommand::new("ffmpeg")
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
    }
}
