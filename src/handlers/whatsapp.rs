use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Deserialize;

use crate::api::whatsapp_api::ConnectionState;
use crate::error::OpsError;
use crate::middleware::{Caller, ValidJson};
use crate::router::OpsState;
use crate::service::notifier::{DelegationReceipt, SendReceipt};
use crate::types::{ApiResponse, Capability};

pub fn router() -> Router<OpsState> {
    Router::new()
        .route("/whatsapp/test", post(send_test))
        .route("/whatsapp/send", post(send_manual))
        .route("/whatsapp/delegate", post(delegate_task))
        .route("/whatsapp/status", get(connection_status))
}

#[derive(Debug, Deserialize)]
pub struct TestBody {
    pub number: String,
}

async fn send_test(
    State(state): State<OpsState>,
    caller: Caller,
    ValidJson(body): ValidJson<TestBody>,
) -> Result<Json<ApiResponse<SendReceipt>>, OpsError> {
    caller.require_admin_somewhere()?;
    let receipt = state
        .notifier
        .send_test(&body.number, caller.profile_id())
        .await?;
    Ok(Json(ApiResponse::success(receipt)))
}

#[derive(Debug, Deserialize)]
pub struct SendBody {
    pub number: String,
    pub message: String,
    pub kitchen_id: Option<i64>,
}

async fn send_manual(
    State(state): State<OpsState>,
    caller: Caller,
    ValidJson(body): ValidJson<SendBody>,
) -> Result<Json<ApiResponse<SendReceipt>>, OpsError> {
    match body.kitchen_id {
        Some(kitchen_id) => caller.require(kitchen_id, Capability::ManageProjects)?,
        None => caller.require_admin_somewhere()?,
    }
    let receipt = state
        .notifier
        .send_manual(&body.number, &body.message, body.kitchen_id, caller.profile_id())
        .await?;
    Ok(Json(ApiResponse::success(receipt)))
}

#[derive(Debug, Deserialize)]
pub struct DelegateBody {
    pub task_id: i64,
}

async fn delegate_task(
    State(state): State<OpsState>,
    caller: Caller,
    ValidJson(body): ValidJson<DelegateBody>,
) -> Result<Json<ApiResponse<DelegationReceipt>>, OpsError> {
    let task = state.storage.get_task(body.task_id).await?;
    caller.require(task.kitchen_id, Capability::ManageProjects)?;
    if task.status.is_closed() {
        return Err(OpsError::Validation("task is already closed".into()));
    }
    let receipt = state.notifier.delegate(&task, caller.profile()).await?;
    Ok(Json(ApiResponse::success(receipt)))
}

async fn connection_status(
    State(state): State<OpsState>,
    caller: Caller,
) -> Result<Json<ApiResponse<ConnectionState>>, OpsError> {
    caller.require_admin_somewhere()?;
    Ok(Json(ApiResponse::success(
        state.notifier.whatsapp().connection_state().await?,
    )))
}
