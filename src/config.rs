//! Environment configuration.

use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Path of the task-state snapshot file
    pub state_file: PathBuf,
    /// Wall-clock timeout for one ffmpeg invocation, in seconds
    pub ffmpeg_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("3000")),
            state_file: env::var("STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("task_state.json")),
            ffmpeg_timeout_secs: env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }
}
