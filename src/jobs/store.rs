use crate::jobs::job::{JobOutcome, JobParams, JobRecord, JobStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use tokio::sync::Mutex;

#[derive(Debug)]
pub enum PersistenceError {
    Io(io::Error),
    Serialization(serde_json::Error),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Io(e) => write!(f, "snapshot I/O error: {}", e),
            PersistenceError::Serialization(e) => write!(f, "snapshot serialization error: {}", e),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::Io(e) => Some(e),
            PersistenceError::Serialization(e) => Some(e),
        }
    }
}

impl From<io::Error> for PersistenceError {
    fn from(err: io::Error) -> Self {
        PersistenceError::Io(err)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err)
    }
}

/// On-disk snapshot shape: the whole task map plus the id counter.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    tasks: HashMap<String, JobRecord>,
    counter: u64,
}

/// The single source of truth for job state.
///
/// Every mutation happens under the store-wide lock and rewrites the JSON
/// snapshot before the lock is released, so readers always see a consistent
/// record and a crash loses at most the in-flight step. Save failures are
/// surfaced as warnings; the in-memory state stays authoritative for the
/// running process.
pub struct JobStore {
    state: Mutex<StoreState>,
    snapshot_path: PathBuf,
}

impl JobStore {
    /// Load the store from its snapshot file. A missing file is an empty
    /// store; an unreadable one is logged and replaced by an empty store.
    pub async fn load(snapshot_path: PathBuf) -> Self {
        let state = match tokio::fs::read(&snapshot_path).await {
            Ok(bytes) => match serde_json::from_slice::<StoreState>(&bytes) {
                Ok(state) => {
                    tracing::info!(
                        tasks = state.tasks.len(),
                        counter = state.counter,
                        "loaded task state"
                    );
                    state
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %snapshot_path.display(),
                        "task state file is unreadable, starting empty");
                    StoreState::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!("no task state file, starting empty");
                StoreState::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %snapshot_path.display(),
                    "failed to read task state file, starting empty");
                StoreState::default()
            }
        };
        JobStore {
            state: Mutex::new(state),
            snapshot_path,
        }
    }

    /// Allocate the next id and insert a pending record. Returns the new record.
    pub async fn create(&self, params: JobParams) -> JobRecord {
        let mut state = self.state.lock().await;
        state.counter += 1;
        let id = format!("task_{}", state.counter);
        let record = JobRecord::new(id.clone(), params);
        state.tasks.insert(id, record.clone());
        self.save(&state).await;
        record
    }

    pub async fn get(&self, id: &str) -> Option<JobRecord> {
        self.state.lock().await.tasks.get(id).cloned()
    }

    /// All records in creation order.
    pub async fn list_all(&self) -> Vec<JobRecord> {
        let state = self.state.lock().await;
        let mut records: Vec<JobRecord> = state.tasks.values().cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| id_sequence(&a.id).cmp(&id_sequence(&b.id)))
        });
        records
    }

    pub async fn mark_running(&self, id: &str) {
        self.update(id, |record| {
            record.status = JobStatus::Running;
            record.started_at = Some(Utc::now());
        })
        .await;
    }

    /// Progress is non-decreasing while a job runs; a smaller value than the
    /// current one is kept at the current value.
    pub async fn progress(&self, id: &str, percent: u8, message: impl Into<String>) {
        let message = message.into();
        self.update(id, move |record| {
            record.progress_percent = percent.max(record.progress_percent);
            record.message = message;
        })
        .await;
    }

    pub async fn complete(&self, id: &str, outcome: JobOutcome) {
        self.update(id, move |record| {
            record.status = JobStatus::Completed;
            record.progress_percent = 100;
            record.message = "task completed".to_string();
            record.completed_at = Some(Utc::now());
            record.result = Some(outcome);
        })
        .await;
    }

    pub async fn fail(&self, id: &str, error: String, outcome: Option<JobOutcome>) {
        self.update(id, move |record| {
            record.status = JobStatus::Failed;
            record.progress_percent = 0;
            record.message = format!("task failed: {}", error);
            record.completed_at = Some(Utc::now());
            record.error = Some(error);
            record.result = outcome;
        })
        .await;
    }

    /// Apply one mutation and persist it as a single atomic step. Updates
    /// against unknown or already terminal records are dropped with a warning.
    async fn update(&self, id: &str, mutate: impl FnOnce(&mut JobRecord)) {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(id) {
            Some(record) if record.status.is_terminal() => {
                tracing::warn!(id, "ignoring update to terminal task");
                return;
            }
            Some(record) => mutate(record),
            None => {
                tracing::warn!(id, "ignoring update to unknown task");
                return;
            }
        }
        self.save(&state).await;
    }

    /// Rewrite the snapshot in full: write a sibling temp file, then rename
    /// over the old snapshot so a crash mid-write keeps the previous state.
    async fn save(&self, state: &StoreState) {
        if let Err(e) = self.write_snapshot(state).await {
            tracing::warn!(error = %e, path = %self.snapshot_path.display(),
                "failed to save task state, in-memory state stays authoritative");
        }
    }

    async fn write_snapshot(&self, state: &StoreState) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp_path = self.snapshot_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &self.snapshot_path).await?;
        Ok(())
    }
}

/// Numeric part of a `task_N` id, so `task_10` sorts after `task_2`.
fn id_sequence(id: &str) -> u64 {
    id.rsplit('_')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{BatchConvertParams, SplitParams};
    use std::path::Path;

    fn split_params(dir: &Path) -> JobParams {
        JobParams::Split(SplitParams {
            audio_path: dir.join("album.flac"),
            cue_path: dir.join("album.cue"),
            output_dir: dir.join("out"),
        })
    }

    #[tokio::test]
    async fn create_assigns_monotonic_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::load(dir.path().join("state.json")).await;
        let a = store.create(split_params(dir.path())).await;
        let b = store.create(split_params(dir.path())).await;
        assert_eq!(a.id, "task_1");
        assert_eq!(b.id, "task_2");
        assert_eq!(a.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn reload_round_trips_records_and_counter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = JobStore::load(path.clone()).await;
        let a = store.create(split_params(dir.path())).await;
        store.mark_running(&a.id).await;
        store
            .complete(
                &a.id,
                JobOutcome {
                    processed_files: 3,
                    written: vec!["01. A.flac".into()],
                    failed: vec![],
                    tool_output: "size= 12kB".into(),
                },
            )
            .await;
        store
            .create(JobParams::BatchConvert(BatchConvertParams {
                source_dir: dir.path().join("m4s"),
                output_dir: dir.path().join("mp3"),
            }))
            .await;
        let before = store.list_all().await;

        let reloaded = JobStore::load(path).await;
        assert_eq!(reloaded.list_all().await, before);
        // Counter survives: the next id continues the sequence.
        let c = reloaded.create(split_params(dir.path())).await;
        assert_eq!(c.id, "task_3");
    }

    #[tokio::test]
    async fn missing_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::load(dir.path().join("absent.json")).await;
        assert!(store.list_all().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let store = JobStore::load(path).await;
        assert!(store.list_all().await.is_empty());
    }

    #[tokio::test]
    async fn terminal_records_are_immutable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::load(dir.path().join("state.json")).await;
        let a = store.create(split_params(dir.path())).await;
        store.mark_running(&a.id).await;
        store.fail(&a.id, "boom".to_string(), None).await;

        store.progress(&a.id, 50, "late update").await;
        let record = store.get(&a.id).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.progress_percent, 0);
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn progress_never_moves_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::load(dir.path().join("state.json")).await;
        let a = store.create(split_params(dir.path())).await;
        store.mark_running(&a.id).await;

        store.progress(&a.id, 30, "planned 3 tracks").await;
        store.progress(&a.id, 10, "stale update").await;
        let record = store.get(&a.id).await.unwrap();
        assert_eq!(record.progress_percent, 30);
        // The message still advances even when the percent is held.
        assert_eq!(record.message, "stale update");

        store.progress(&a.id, 80, "cutting done").await;
        assert_eq!(store.get(&a.id).await.unwrap().progress_percent, 80);
    }

    #[tokio::test]
    async fn list_all_is_in_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::load(dir.path().join("state.json")).await;
        for _ in 0..5 {
            store.create(split_params(dir.path())).await;
        }
        let ids: Vec<String> = store.list_all().await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["task_1", "task_2", "task_3", "task_4", "task_5"]);
    }

    #[tokio::test]
    async fn list_all_orders_ids_numerically() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::load(dir.path().join("state.json")).await;
        for _ in 0..12 {
            store.create(split_params(dir.path())).await;
        }
        // Collapse the timestamps so only the id decides the order. A
        // lexicographic tie-break would put task_10 before task_2.
        let now = Utc::now();
        {
            let mut state = store.state.lock().await;
            for record in state.tasks.values_mut() {
                record.created_at = now;
            }
        }
        let ids: Vec<String> = store.list_all().await.into_iter().map(|r| r.id).collect();
        let expected: Vec<String> = (1..=12).map(|n| format!("task_{}", n)).collect();
        assert_eq!(ids, expected);
    }
}
