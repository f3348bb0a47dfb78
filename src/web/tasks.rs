//! Upload, status polling and download handlers.

use crate::state::AppState;
use crate::tasks::{TaskId, TaskState, TaskStatus, UPLOAD_SUFFIX};
use crate::web::error::{ApiError, ApiErrorCode, storage_error};
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Multipart field carrying the calendar.
const FILE_FIELD: &str = "file";
const DOWNLOAD_NAME: &str = "updated_calendar.ics";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub task_id: TaskId,
}

/// `POST /`
///
/// Stores the uploaded `.ics` file and queues it for enrichment.
pub(super) async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        debug!(error = %rejection, "Upload is not multipart");
        ApiError::new(ApiErrorCode::NoFilePart, "No file part")
    })?;

    let mut field = loop {
        let next = multipart.next_field().await.map_err(|e| {
            debug!(error = %e, "Malformed multipart body");
            ApiError::new(ApiErrorCode::InvalidUpload, e.body_text())
        })?;
        match next {
            Some(field) if field.name() == Some(FILE_FIELD) => break field,
            Some(_) => continue,
            None => return Err(ApiError::new(ApiErrorCode::NoFilePart, "No file part")),
        }
    };

    // A part without a filename is a form value, not a file.
    let Some(file_name) = field.file_name().map(str::to_owned) else {
        return Err(ApiError::new(ApiErrorCode::NoFilePart, "No file part"));
    };
    if file_name.is_empty() {
        return Err(ApiError::new(ApiErrorCode::NoSelectedFile, "No selected file"));
    }
    if !file_name.ends_with(".ics") {
        return Err(ApiError::new(
            ApiErrorCode::InvalidFileType,
            "Only .ics files are accepted",
        ));
    }

    let upload_path = state
        .work_dir
        .join(format!("{}{UPLOAD_SUFFIX}", ulid::Ulid::new()));
    let mut file = tokio::fs::File::create(&upload_path)
        .await
        .map_err(|e| storage_error("Creating upload file", e))?;

    let mut bytes = 0usize;
    let copied: Result<(), ApiError> = async {
        while let Some(chunk) = field.chunk().await.map_err(|e| {
            ApiError::new(ApiErrorCode::InvalidUpload, e.body_text())
        })? {
            bytes += chunk.len();
            file.write_all(&chunk)
                .await
                .map_err(|e| storage_error("Writing upload", e))?;
        }
        file.flush()
            .await
            .map_err(|e| storage_error("Flushing upload", e))
    }
    .await;
    if let Err(e) = copied {
        let _ = tokio::fs::remove_file(&upload_path).await;
        return Err(e);
    }

    let submission = state.tasks.submit(upload_path);
    for evicted in submission.evicted {
        if let Err(e) = tokio::fs::remove_file(&evicted.source_path).await {
            warn!(task_id = %evicted.id, error = ?e, "Failed to remove evicted upload");
        }
    }

    info!(task_id = %submission.id, file_name = %file_name, bytes, "Calendar queued");
    Ok(Json(UploadResponse {
        task_id: submission.id,
    }))
}

/// `GET /status/{task_id}`
pub(super) async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<TaskStatus> {
    let status = match task_id.parse::<TaskId>() {
        Ok(id) => state.tasks.status(id),
        Err(_) => TaskStatus {
            state: TaskState::Unknown,
            progress: 0,
        },
    };
    Json(status)
}

/// `GET /download/{task_id}`
///
/// Streams the enriched calendar as an attachment.
pub(super) async fn download(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let not_ready = || ApiError::new(ApiErrorCode::NotReady, "File not ready or task failed");

    let id = task_id.parse::<TaskId>().map_err(|_| not_ready())?;
    let path = state.tasks.result_path(id).ok_or_else(not_ready)?;
    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        warn!(task_id = %id, error = ?e, "Result artifact missing");
        not_ready()
    })?;

    let headers = [
        (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_owned()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{DOWNLOAD_NAME}\""),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}
