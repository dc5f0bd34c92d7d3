use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    routing::{delete, get, post},
};
use serde_json::json;

use crate::db::models::AssistantFile;
use crate::error::OpsError;
use crate::handlers::files::read_upload;
use crate::middleware::{Caller, ValidJson};
use crate::router::OpsState;
use crate::service::assistant::{ChatReply, ChatRequest};
use crate::service::object_store::sanitize_file_name;
use crate::types::{ApiResponse, Capability};

pub fn router() -> Router<OpsState> {
    Router::new()
        .route("/assistant/chat", post(chat))
        .route("/assistant/files", post(upload_file))
        .route("/assistant/contracts/{id}", delete(remove_contract))
        .route("/kitchens/{id}/contracts", get(list_contracts))
}

async fn chat(
    State(state): State<OpsState>,
    caller: Caller,
    ValidJson(body): ValidJson<ChatRequest>,
) -> Result<Json<ApiResponse<ChatReply>>, OpsError> {
    caller.require(body.kitchen_id, Capability::Read)?;
    let kitchen = state.storage.get_kitchen(body.kitchen_id).await?;
    if !kitchen.is_active {
        return Err(OpsError::Validation(format!("kitchen {} is inactive", kitchen.code)));
    }
    let reply = state
        .assistant
        .chat(&kitchen, body, caller.profile_id())
        .await?;
    Ok(Json(ApiResponse::success(reply)))
}

/// Multipart fields: `kitchen_id`, optional `conversation_id`, `file`.
/// Without a conversation the upload becomes a kitchen contract.
async fn upload_file(
    State(state): State<OpsState>,
    caller: Caller,
    multipart: Multipart,
) -> Result<Json<ApiResponse<AssistantFile>>, OpsError> {
    let (part, fields) = read_upload(multipart).await?;
    let field = |name: &str| {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    };

    let kitchen_id: i64 = field("kitchen_id")
        .ok_or_else(|| OpsError::Validation("kitchen_id is required".into()))?
        .parse()
        .map_err(|_| OpsError::Validation("kitchen_id must be an integer".into()))?;
    let conversation_id = field("conversation_id");

    let needed = if conversation_id.is_some() {
        Capability::Comment
    } else {
        Capability::ManageKitchen
    };
    caller.require(kitchen_id, needed)?;
    state.storage.get_kitchen(kitchen_id).await?;

    let file = state
        .assistant
        .upload(
            kitchen_id,
            conversation_id,
            &sanitize_file_name(&part.file_name),
            &part.content_type,
            part.bytes,
            caller.profile_id(),
        )
        .await?;
    Ok(Json(ApiResponse::success(file)))
}

async fn list_contracts(
    State(state): State<OpsState>,
    caller: Caller,
    Path(kitchen_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<AssistantFile>>>, OpsError> {
    caller.require(kitchen_id, Capability::Read)?;
    Ok(Json(ApiResponse::success(
        state.storage.list_contracts(kitchen_id).await?,
    )))
}

async fn remove_contract(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, OpsError> {
    let file = state.storage.get_assistant_file(id).await?;
    caller.require(file.kitchen_id, Capability::ManageKitchen)?;
    state.assistant.remove_contract(&file, caller.profile_id()).await?;
    Ok(Json(ApiResponse::success(
        json!({ "id": id, "openai_file_id": file.openai_file_id }),
    )))
}
