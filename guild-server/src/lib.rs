pub mod jobs;
pub mod store;

use std::path::Path;
use std::time::Duration;

use axum::extract::{Path as UrlPath, Query};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json};
use axum::http::StatusCode;
use serde::Deserialize;

use guild_common::jobs::{Job, NewJob, Page};
use guild_common::{Profile, RecordWrite, UserId, UserRecord, WatchReply};

use crate::jobs::Jobs;
use crate::store::Records;

pub type Result<T> = std::result::Result<T, AppError>;

pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, format!("{:#}", self.error)).into_response()
    }
}

// This enables using `?` on functions that return `Result<_, anyhow::Error>` to turn them into
// `Result<_, AppError>`. That way you don't need to do that manually.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err.into(),
        }
    }
}

impl AppError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: anyhow::anyhow!("{what} not found"),
        }
    }
}

#[derive(Clone)]
pub struct State {
    records: Records,
    jobs: Jobs,
}

impl State {
    pub fn new(data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db = sled::open(data_dir.as_ref())?;
        Ok(Self {
            records: Records::new(&db)?,
            jobs: Jobs::new(&db)?,
        })
    }
}

pub fn router(state: State) -> axum::Router {
    axum::Router::new()
        .route("/", get(root))
        .route("/add-user/:id", post(add_user))
        .route("/records", get(list_records))
        .route("/records/:id", get(get_record))
        .route("/records/:id/apply", post(apply_writes))
        .route("/records/:id/watch/:version", get(watch_record))
        .route("/jobs", get(list_jobs).post(post_job))
        .layer(Extension(state))
}

async fn root() -> &'static str {
    "guild record store"
}

async fn add_user(
    Extension(state): Extension<State>,
    UrlPath(id): UrlPath<String>,
    Json(profile): Json<Profile>,
) -> Result<impl IntoResponse> {
    let id = UserId(id);
    state.records.create(&id, profile)?;
    tracing::info!(user = %id, "created user record");
    Ok(())
}

async fn list_records(Extension(state): Extension<State>) -> Result<Json<Vec<UserId>>> {
    Ok(Json(state.records.ids()?))
}

async fn get_record(
    Extension(state): Extension<State>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<UserRecord>> {
    let id = UserId(id);
    let record = state
        .records
        .get(&id)?
        .ok_or_else(|| AppError::not_found(format!("user {id}")))?;
    Ok(Json(record))
}

async fn apply_writes(
    Extension(state): Extension<State>,
    UrlPath(id): UrlPath<String>,
    Json(writes): Json<Vec<RecordWrite>>,
) -> Result<impl IntoResponse> {
    let id = UserId(id);
    tracing::debug!(user = %id, writes = writes.len(), "applying record writes");
    state
        .records
        .apply(&id, writes)?
        .ok_or_else(|| AppError::not_found(format!("user {id}")))?;
    Ok(())
}

// Long-poll: replies as soon as the record's version differs from the one the
// caller last saw, or after the park window with the unchanged state.
async fn watch_record(
    Extension(state): Extension<State>,
    UrlPath((id, version)): UrlPath<(String, u64)>,
) -> Result<Json<WatchReply>> {
    let id = UserId(id);
    let reply = state
        .records
        .wait_for_change(&id, version, Duration::from_secs(25))
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {id}")))?;
    Ok(Json(reply))
}

#[derive(Deserialize)]
struct JobQuery {
    offset: Option<usize>,
    limit: Option<usize>,
    q: Option<String>,
}

async fn post_job(
    Extension(state): Extension<State>,
    Json(new_job): Json<NewJob>,
) -> Result<Json<Job>> {
    let job = state.jobs.add(new_job)?;
    tracing::info!(job = %job.id, title = %job.title, "posted job");
    Ok(Json(job))
}

async fn list_jobs(
    Extension(state): Extension<State>,
    Query(query): Query<JobQuery>,
) -> Result<Json<Page<Job>>> {
    let page = state.jobs.page(
        query.offset.unwrap_or(0),
        query.limit.unwrap_or(20),
        query.q.as_deref(),
    )?;
    Ok(Json(page))
}
