use crate::cue::parser::{decode_cue_bytes, parse_cue_sheet, ParseError};
use crate::cue::planner::{codec_for_source, plan_segments, PlanError};
use crate::jobs::job::{BatchConvertParams, JobOutcome, JobParams, JobRecord, SplitParams};
use crate::jobs::store::JobStore;
use crate::transcode::cmd::CommandRunner;
use crate::transcode::invoker::{verify_output, Codec, InvocationError, TranscodeInvoker};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub enum JobError {
    Parse(ParseError),
    Plan(PlanError),
    Invocation(InvocationError),
    Io(io::Error),
    NoInputFiles(PathBuf),
    ItemsFailed { failed: usize, total: usize },
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::Parse(e) => write!(f, "cue parse error: {}", e),
            JobError::Plan(e) => write!(f, "segment plan error: {}", e),
            JobError::Invocation(e) => write!(f, "transcode error: {}", e),
            JobError::Io(e) => write!(f, "I/O error: {}", e),
            JobError::NoInputFiles(dir) => {
                write!(f, "no input files found in {}", dir.display())
            }
            JobError::ItemsFailed { failed, total } => {
                write!(f, "{} of {} files failed", failed, total)
            }
        }
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JobError::Parse(e) => Some(e),
            JobError::Plan(e) => Some(e),
            JobError::Invocation(e) => Some(e),
            JobError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for JobError {
    fn from(err: ParseError) -> Self {
        JobError::Parse(err)
    }
}

impl From<PlanError> for JobError {
    fn from(err: PlanError) -> Self {
        JobError::Plan(err)
    }
}

impl From<InvocationError> for JobError {
    fn from(err: InvocationError) -> Self {
        JobError::Invocation(err)
    }
}

impl From<io::Error> for JobError {
    fn from(err: io::Error) -> Self {
        JobError::Io(err)
    }
}

/// A pipeline failure, optionally carrying the partial outcome so the failed
/// record still enumerates what did succeed.
struct JobFailure {
    error: JobError,
    outcome: Option<JobOutcome>,
}

impl From<JobError> for JobFailure {
    fn from(error: JobError) -> Self {
        JobFailure {
            error,
            outcome: None,
        }
    }
}

impl From<ParseError> for JobFailure {
    fn from(err: ParseError) -> Self {
        JobError::from(err).into()
    }
}

impl From<PlanError> for JobFailure {
    fn from(err: PlanError) -> Self {
        JobError::from(err).into()
    }
}

/// Creates jobs, runs each on its own tokio task, and serializes all state
/// through the shared store. Pipeline errors never reach the caller of
/// `create`; they end up as a terminal failed record.
pub struct JobScheduler<R> {
    store: Arc<JobStore>,
    invoker: Arc<TranscodeInvoker<R>>,
    workers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl<R: CommandRunner + 'static> JobScheduler<R> {
    pub fn new(store: Arc<JobStore>, invoker: TranscodeInvoker<R>) -> Self {
        Self {
            store,
            invoker: Arc::new(invoker),
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Store a pending record and launch its worker. Never blocks on job
    /// execution; the returned id is immediately pollable via `get`.
    pub async fn create(&self, params: JobParams) -> String {
        let record = self.store.create(params.clone()).await;
        let id = record.id.clone();
        tracing::info!(id = %id, job_type = params.job_type(), "task created");

        let store = self.store.clone();
        let invoker = self.invoker.clone();
        let worker_id = id.clone();
        let handle = tokio::spawn(async move {
            run_job(store, invoker, worker_id, params).await;
        });
        self.workers.lock().await.insert(id.clone(), handle);
        id
    }

    pub async fn get(&self, id: &str) -> Option<JobRecord> {
        self.store.get(id).await
    }

    pub async fn list_all(&self) -> Vec<JobRecord> {
        self.store.list_all().await
    }

    /// Join the worker for one job, if it is still tracked. Used on shutdown
    /// and by tests to observe terminal state deterministically.
    pub async fn wait(&self, id: &str) {
        let handle = self.workers.lock().await.remove(id);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run_job<R: CommandRunner>(
    store: Arc<JobStore>,
    invoker: Arc<TranscodeInvoker<R>>,
    id: String,
    params: JobParams,
) {
    store.mark_running(&id).await;
    let result = match params {
        JobParams::Split(params) => run_split(&store, &invoker, &id, params).await,
        JobParams::BatchConvert(params) => run_batch_convert(&store, &invoker, &id, params).await,
    };
    match result {
        Ok(outcome) => {
            tracing::info!(id = %id, processed = outcome.processed_files, "task completed");
            store.complete(&id, outcome).await;
        }
        Err(failure) => {
            let error = failure.error.to_string();
            tracing::error!(id = %id, error = %error, "task failed");
            store.fail(&id, error, failure.outcome).await;
        }
    }
}

/// Split pipeline: parse the cue sheet, plan segments, cut each one.
/// Best-effort batch: a failed segment is recorded and the rest still run,
/// but any failure makes the whole job fail.
async fn run_split<R: CommandRunner>(
    store: &JobStore,
    invoker: &TranscodeInvoker<R>,
    id: &str,
    params: SplitParams,
) -> Result<JobOutcome, JobFailure> {
    store.progress(id, 10, "starting split").await;

    let raw = tokio::fs::read(&params.cue_path).await.map_err(JobError::Io)?;
    let text = decode_cue_bytes(&raw);
    let sheet = parse_cue_sheet(&text)?;

    let extension = params
        .audio_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();
    let codec = codec_for_source(&extension)?;
    let plans = plan_segments(&sheet.tracks, codec.extension)?;
    store
        .progress(id, 30, format!("planned {} tracks", plans.len()))
        .await;

    tokio::fs::create_dir_all(&params.output_dir)
        .await
        .map_err(JobError::Io)?;

    let total = plans.len();
    let mut outcome = JobOutcome::default();
    for (i, plan) in plans.iter().enumerate() {
        let percent = 30 + (50 * i / total) as u8;
        store
            .progress(id, percent, format!("cutting {}", plan.file_name))
            .await;

        let out_path = params.output_dir.join(&plan.file_name);
        match cut_segment(invoker, &params.audio_path, &out_path, plan, &codec).await {
            Ok(tool_output) => {
                outcome.processed_files += 1;
                outcome.written.push(plan.file_name.clone());
                outcome.tool_output = tool_output;
            }
            Err(e) => {
                tracing::warn!(id, file = %plan.file_name, error = %e, "segment failed");
                outcome.failed.push(format!("{}: {}", plan.file_name, e));
            }
        }
    }
    store.progress(id, 80, "split finished, verifying").await;

    if outcome.failed.is_empty() {
        Ok(outcome)
    } else {
        Err(JobFailure {
            error: JobError::ItemsFailed {
                failed: outcome.failed.len(),
                total,
            },
            outcome: Some(outcome),
        })
    }
}

async fn cut_segment<R: CommandRunner>(
    invoker: &TranscodeInvoker<R>,
    audio_path: &Path,
    out_path: &Path,
    plan: &crate::cue::planner::SegmentPlan,
    codec: &Codec,
) -> Result<String, InvocationError> {
    let tool = invoker
        .run(
            audio_path,
            out_path,
            plan.start_secs,
            plan.duration_secs,
            codec,
        )
        .await?;
    verify_output(out_path).await?;
    Ok(tool.stderr)
}

/// Batch-convert pipeline: every `.m4s` file in the source directory becomes
/// an MP3. The first failed file stops the batch; the partial outcome still
/// lists what succeeded.
async fn run_batch_convert<R: CommandRunner>(
    store: &JobStore,
    invoker: &TranscodeInvoker<R>,
    id: &str,
    params: BatchConvertParams,
) -> Result<JobOutcome, JobFailure> {
    store.progress(id, 10, "starting conversion").await;

    let inputs = list_m4s_files(&params.source_dir).await?;
    if inputs.is_empty() {
        return Err(JobError::NoInputFiles(params.source_dir.clone()).into());
    }
    store
        .progress(id, 30, format!("found {} files", inputs.len()))
        .await;

    tokio::fs::create_dir_all(&params.output_dir)
        .await
        .map_err(JobError::Io)?;

    let codec = Codec::mp3();
    let total = inputs.len();
    let mut outcome = JobOutcome::default();
    for (i, input) in inputs.iter().enumerate() {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("track");
        let out_name = format!("{}{}", stem, codec.extension);
        let out_path = params.output_dir.join(&out_name);
        let percent = 30 + (50 * i / total) as u8;
        store
            .progress(id, percent, format!("converting {}", out_name))
            .await;

        let converted = async {
            let tool = invoker.run(input, &out_path, 0.0, None, &codec).await?;
            verify_output(&out_path).await?;
            Ok::<String, InvocationError>(tool.stderr)
        }
        .await;

        match converted {
            Ok(tool_output) => {
                outcome.processed_files += 1;
                outcome.written.push(out_name);
                outcome.tool_output = tool_output;
            }
            Err(e) => {
                let input_name = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| input.display().to_string());
                tracing::warn!(id, file = %input_name, error = %e, "conversion failed");
                outcome.failed.push(format!("{}: {}", input_name, e));
                return Err(JobFailure {
                    error: JobError::ItemsFailed {
                        failed: 1,
                        total,
                    },
                    outcome: Some(outcome),
                });
            }
        }
    }
    store.progress(id, 80, "conversion finished").await;

    Ok(outcome)
}

async fn list_m4s_files(dir: &Path) -> Result<Vec<PathBuf>, JobError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(JobError::Io)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(JobError::Io)? {
        let path = entry.path();
        let is_m4s = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("m4s"));
        if is_m4s && entry.file_type().await.map_err(JobError::Io)?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
