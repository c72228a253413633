//! trackcut - asynchronous audio-processing job service.
//!
//! Accepts split-by-cue-sheet and batch-convert requests, runs each as an
//! independent background job that shells out to ffmpeg, and persists job
//! state to a JSON snapshot after every mutation.
//!
//! - cue/: cue-sheet parsing and segment planning (pure)
//! - transcode/: ffmpeg invocation (command building, timeout, diagnostics)
//! - jobs/: job records, the persisted store, and the scheduler
//! - config: environment configuration

pub mod config;
pub mod cue;
pub mod jobs;
pub mod transcode;
