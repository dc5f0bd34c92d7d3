use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    routing::{delete, get},
};
use axum_extra::TypedHeader;
use headers::{ContentLength, ContentType};
use serde_json::json;
use tracing::{info, warn};

use crate::db::models::{NewAuditLog, NewStoredFile, StoredFile};
use crate::error::OpsError;
use crate::middleware::Caller;
use crate::middleware::request::multipart_error;
use crate::router::OpsState;
use crate::service::LocalBucket;
use crate::service::object_store::sanitize_file_name;
use crate::types::{ApiResponse, Capability};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub fn router() -> Router<OpsState> {
    Router::new()
        .route("/tasks/{id}/files", get(list_files).post(upload_file))
        .route("/files/{id}/download", get(download_file))
        .route("/files/{id}", delete(delete_file))
}

async fn list_files(
    State(state): State<OpsState>,
    caller: Caller,
    Path(task_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<StoredFile>>>, OpsError> {
    let task = state.storage.get_task(task_id).await?;
    caller.require(task.kitchen_id, Capability::Read)?;
    Ok(Json(ApiResponse::success(
        state.storage.list_task_files(task_id).await?,
    )))
}

/// A single `file` part read from a multipart body.
pub struct UploadedPart {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Reads the `file` part plus any plain text fields from a multipart body.
pub async fn read_upload(
    mut multipart: Multipart,
) -> Result<(UploadedPart, Vec<(String, String)>), OpsError> {
    let mut file = None;
    let mut fields = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("file").to_string();
            let content_type = field
                .content_type()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string();
            let bytes = field.bytes().await.map_err(multipart_error)?;
            file = Some(UploadedPart {
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            fields.push((name, value));
        }
    }

    let file = file.ok_or_else(|| OpsError::Validation("missing `file` part".into()))?;
    if file.bytes.is_empty() {
        return Err(OpsError::Validation("file is empty".into()));
    }
    Ok((file, fields))
}

async fn upload_file(
    State(state): State<OpsState>,
    caller: Caller,
    Path(task_id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<StoredFile>>, OpsError> {
    let task = state.storage.get_task(task_id).await?;
    caller.require(task.kitchen_id, Capability::Comment)?;

    let (part, _) = read_upload(multipart).await?;
    let file_name = sanitize_file_name(&part.file_name);
    let key = LocalBucket::object_key(task.kitchen_id, task.id, &file_name);
    state.objects.put(&key, &part.bytes).await?;

    let record = NewStoredFile {
        kitchen_id: task.kitchen_id,
        task_id: Some(task.id),
        bucket: state.objects.name().to_string(),
        object_key: key.clone(),
        file_name,
        content_type: part.content_type,
        size_bytes: part.bytes.len() as i64,
        uploaded_by: caller.profile_id(),
    };
    let stored = match state.storage.insert_file(&record).await {
        Ok(stored) => stored,
        Err(e) => {
            if let Err(cleanup) = state.objects.delete(&key).await {
                warn!(key, error = %cleanup, "orphaned object after failed insert");
            }
            return Err(e);
        }
    };

    state
        .storage
        .audit(
            NewAuditLog::new("file.uploaded", "file")
                .kitchen(task.kitchen_id)
                .by(caller.profile_id())
                .entity(stored.id)
                .details(json!({
                    "task_id": task.id,
                    "file_name": stored.file_name,
                    "size_bytes": stored.size_bytes,
                })),
        )
        .await;
    info!(file_id = stored.id, task_id, size = stored.size_bytes, "file uploaded");
    Ok(Json(ApiResponse::success(stored)))
}

async fn download_file(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, OpsError> {
    let file = state.storage.get_file(id).await?;
    caller.require(file.kitchen_id, Capability::Read)?;
    let bytes = state.objects.get(&file.object_key).await?;

    let content_type = file
        .content_type
        .parse::<ContentType>()
        .unwrap_or_else(|_| ContentType::octet_stream());
    let disposition = format!("attachment; filename=\"{}\"", file.file_name);
    Ok((
        TypedHeader(content_type),
        TypedHeader(ContentLength(bytes.len() as u64)),
        [(header::CONTENT_DISPOSITION, disposition)],
        bytes,
    ))
}

async fn delete_file(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, OpsError> {
    let file = state.storage.get_file(id).await?;
    let is_uploader = caller.profile_id().is_some() && caller.profile_id() == file.uploaded_by;
    if !is_uploader {
        caller.require(file.kitchen_id, Capability::EditTasks)?;
    }

    state.storage.delete_file_row(id).await?;
    if let Err(e) = state.objects.delete(&file.object_key).await {
        warn!(file_id = id, key = %file.object_key, error = %e, "failed to remove stored object");
    }
    state
        .storage
        .audit(
            NewAuditLog::new("file.deleted", "file")
                .kitchen(file.kitchen_id)
                .by(caller.profile_id())
                .entity(id)
                .details(json!({ "file_name": file.file_name, "task_id": file.task_id })),
        )
        .await;
    Ok(Json(ApiResponse::success(json!({ "id": id }))))
}
