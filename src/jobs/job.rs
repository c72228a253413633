use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Parameters for splitting an album image by its cue sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitParams {
    pub audio_path: PathBuf,
    pub cue_path: PathBuf,
    pub output_dir: PathBuf,
}

/// Parameters for batch-converting `.m4s` segment files to MP3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConvertParams {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// The two supported job types with their parameter shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "camelCase")]
pub enum JobParams {
    Split(SplitParams),
    BatchConvert(BatchConvertParams),
}

impl JobParams {
    pub fn job_type(&self) -> &'static str {
        match self {
            JobParams::Split(_) => "split",
            JobParams::BatchConvert(_) => "batchConvert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// What a finished batch produced: counts plus enumerable successes and
/// failures, and the last invocation's captured tool output. Attached to
/// failed jobs too when part of the batch succeeded before the failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub processed_files: usize,
    pub written: Vec<String>,
    pub failed: Vec<String>,
    pub tool_output: String,
}

/// The persisted state of one job. The scheduler exclusively owns the
/// mutable fields; once `completed_at` is set the record never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    #[serde(flatten)]
    pub params: JobParams,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<JobOutcome>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(id: String, params: JobParams) -> Self {
        JobRecord {
            id,
            params,
            status: JobStatus::Pending,
            progress_percent: 0,
            message: "task created".to_string(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}
