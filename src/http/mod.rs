use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::Context;
use axum::{
    extract::{Multipart, Path},
    http::header,
    response::{Html, IntoResponse, Response},
    Extension, Json,
};
use axum_macros::debug_handler;
use serde::Deserialize;
use serde_json::json;
use tokio::fs;
use tracing::{debug, info};

use crate::{
    config::Config,
    error::AppError,
    media::{
        format::{calculate_reduction, download_name, format_filesize},
        params::{resolve, CompressSettings, Container, PLATFORM_PRESETS},
        probe::{probe, MediaInfo},
        run::{run_transcode, RunError},
    },
    session::{SessionRecord, SessionStore},
};

/// Shared application state: configuration, the scratch store and the
/// per-token progress of any in-flight encode.
pub struct AppState {
    pub config: Config,
    pub store: SessionStore,
    pub progress: Mutex<HashMap<String, f64>>,
}

impl AppState {
    fn set_progress(&self, token: &str, fraction: f64) {
        if let Ok(mut map) = self.progress.lock() {
            map.insert(token.to_owned(), fraction);
        }
    }

    fn clear_progress(&self, token: &str) {
        if let Ok(mut map) = self.progress.lock() {
            map.remove(token);
        }
    }
}

pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

pub async fn presets() -> Json<serde_json::Value> {
    Json(json!({ "presets": PLATFORM_PRESETS }))
}

#[debug_handler]
pub async fn upload(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    // Each new upload also sweeps anything another session left behind.
    state.store.sweep().await;

    let mut stored: Option<SessionRecord> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadUpload {
            detail: err.to_string(),
        })?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field
            .file_name()
            .map(str::to_owned)
            .ok_or(AppError::MissingFile)?;
        if SessionStore::allowed_extension(&original_name).is_none() {
            return Err(AppError::UnsupportedFormat);
        }
        let data = field.bytes().await.map_err(|err| AppError::BadUpload {
            detail: err.to_string(),
        })?;
        stored = Some(state.store.store_upload(&original_name, &data).await?);
        break;
    }

    let record = stored.ok_or(AppError::MissingFile)?;
    let media = probe(&state.config.ffprobe_bin, &record.file_path).await;
    info!(token = %record.token, name = %record.original_name, "upload stored");

    Ok(Json(session_payload(&record, media.as_ref())))
}

#[debug_handler]
pub async fn resume_session(
    Extension(state): Extension<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = state
        .store
        .lookup(&token)
        .await
        .ok_or(AppError::SessionExpired)?;
    let media = probe(&state.config.ffprobe_bin, &record.file_path).await;
    Ok(Json(session_payload(&record, media.as_ref())))
}

#[derive(Deserialize)]
pub struct CompressRequest {
    pub token: String,
    #[serde(flatten)]
    pub settings: CompressSettings,
}

#[debug_handler]
pub async fn compress(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<CompressRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = state
        .store
        .lookup(&req.token)
        .await
        .ok_or(AppError::SessionExpired)?;

    let media = probe(&state.config.ffprobe_bin, &record.file_path).await;
    let params = resolve(&req.settings, media.as_ref());
    let output = state.store.output_path(&record.token, params.container.ext());
    let palette = state.store.palette_path(&record.token);

    debug!(token = %record.token, ?params, "starting transcode");
    state.set_progress(&record.token, 0.0);

    let progress_state = Arc::clone(&state);
    let progress_token = record.token.clone();
    let result = run_transcode(
        &state.config.ffmpeg_bin,
        &record.file_path,
        &output,
        &palette,
        &params,
        move |fraction| progress_state.set_progress(&progress_token, fraction),
    )
    .await;

    // Terminal states drop the progress entry, keeping the map bounded by
    // in-flight encodes. The client learns completion from this response.
    match result {
        Ok(()) => state.clear_progress(&record.token),
        Err(RunError::Failed { tail }) => {
            state.clear_progress(&record.token);
            return Err(AppError::EncodeFailed { detail: tail });
        }
        Err(RunError::Io(err)) => {
            state.clear_progress(&record.token);
            return Err(AppError::Generic(err.into()));
        }
    }

    let compressed_size = fs::metadata(&output)
        .await
        .context("reading output size")?
        .len();
    let reduction = calculate_reduction(record.file_size, compressed_size);

    Ok(Json(json!({
        "token": record.token,
        "original_size": record.file_size,
        "original_size_text": format_filesize(record.file_size),
        "compressed_size": compressed_size,
        "compressed_size_text": format_filesize(compressed_size),
        "reduction_percent": (reduction * 10.0).round() / 10.0,
        "container": params.container.ext(),
        "download_name": download_name(&record.original_name, params.container.ext()),
    })))
}

#[debug_handler]
pub async fn progress(
    Extension(state): Extension<Arc<AppState>>,
    Path(token): Path<String>,
) -> Json<serde_json::Value> {
    let fraction = state
        .progress
        .lock()
        .ok()
        .and_then(|map| map.get(&token).copied())
        .unwrap_or(0.0);
    Json(json!({ "fraction": fraction }))
}

#[debug_handler]
pub async fn download(
    Extension(state): Extension<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let record = state
        .store
        .lookup(&token)
        .await
        .ok_or(AppError::SessionExpired)?;

    // The session keeps at most one output; find whichever container it was.
    let mut found = None;
    for container in [Container::Mp4, Container::Webm, Container::Gif] {
        let path = state.store.output_path(&token, container.ext());
        if fs::metadata(&path).await.is_ok() {
            found = Some((path, container));
            break;
        }
    }
    let (path, container) = found.ok_or(AppError::OutputMissing)?;

    let body = fs::read(&path).await.context("reading output file")?;
    let name = download_name(&record.original_name, container.ext());
    let disposition = format!("attachment; filename=\"{}\"", sanitize_header_name(&name));

    Ok((
        [
            (header::CONTENT_TYPE, container.mime().to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

#[debug_handler]
pub async fn release_session(
    Extension(state): Extension<Arc<AppState>>,
    Path(token): Path<String>,
) -> Json<serde_json::Value> {
    state.store.release(&token).await;
    state.clear_progress(&token);
    Json(json!({ "released": true }))
}

fn session_payload(record: &SessionRecord, media: Option<&MediaInfo>) -> serde_json::Value {
    json!({
        "token": record.token,
        "original_name": record.original_name,
        "size": record.file_size,
        "size_text": format_filesize(record.file_size),
        "media": media,
    })
}

/// Keep quoted-string header values parseable.
fn sanitize_header_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
