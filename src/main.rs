use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use trackcut::config::Config;
use trackcut::jobs::{JobParams, JobScheduler, JobStore};
use trackcut::transcode::{FfmpegRunner, TranscodeInvoker};

type Scheduler = Arc<JobScheduler<FfmpegRunner>>;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let store = Arc::new(JobStore::load(config.state_file.clone()).await);
    let invoker = TranscodeInvoker::new(
        FfmpegRunner,
        Duration::from_secs(config.ffmpeg_timeout_secs),
    );
    let scheduler: Scheduler = Arc::new(JobScheduler::new(store, invoker));

    let app = Router::new()
        .route("/api/tasks", post(create_task).get(list_tasks))
        .route("/api/tasks/:id", get(task_status))
        .with_state(scheduler);

    let bind = format!("{}:{}", config.addr, config.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .expect("Failed to bind TCP listener");
    tracing::info!(addr = %bind, "listening");
    axum::serve(listener, app).await.expect("Server failed");
}

async fn create_task(
    State(scheduler): State<Scheduler>,
    Json(params): Json<JobParams>,
) -> Json<Value> {
    let task_id = scheduler.create(params).await;
    Json(json!({ "taskId": task_id, "message": "task started" }))
}

async fn task_status(
    State(scheduler): State<Scheduler>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match scheduler.get(&id).await {
        Some(record) => Ok(Json(json!(record))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "task not found" })),
        )),
    }
}

async fn list_tasks(State(scheduler): State<Scheduler>) -> Json<Value> {
    let tasks = scheduler.list_all().await;
    Json(json!({ "tasks": tasks }))
}
