use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::models::Reminder;
use crate::error::OpsError;
use crate::middleware::{Caller, ValidQuery};
use crate::router::OpsState;
use crate::service::ProcessSummary;
use crate::service::reminder_actor::ReminderStatus;
use crate::service::schedule;
use crate::types::{ApiResponse, Capability};

pub fn router() -> Router<OpsState> {
    Router::new()
        .route(
            "/tasks/{id}/reminders",
            get(list_task_reminders).post(plan_task_reminders),
        )
        .route("/reminders/process", post(process_reminders))
        .route("/reminders/status", get(reminder_status))
        .route("/reminders/times", get(reminder_times))
}

async fn list_task_reminders(
    State(state): State<OpsState>,
    caller: Caller,
    Path(task_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<Reminder>>>, OpsError> {
    let task = state.storage.get_task(task_id).await?;
    caller.require(task.kitchen_id, Capability::Read)?;
    Ok(Json(ApiResponse::success(
        state.storage.list_task_reminders(task_id).await?,
    )))
}

async fn plan_task_reminders(
    State(state): State<OpsState>,
    caller: Caller,
    Path(task_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<Reminder>>>, OpsError> {
    let task = state.storage.get_task(task_id).await?;
    caller.require(task.kitchen_id, Capability::ManageProjects)?;
    if task.assignee_id.is_none() {
        return Err(OpsError::Validation("task has no assignee".into()));
    }
    if task.status.is_closed() {
        return Err(OpsError::Validation("task is already closed".into()));
    }
    let planned = state.notifier.plan_reminders(&task, Utc::now()).await?;
    Ok(Json(ApiResponse::success(planned)))
}

/// Only the service itself (cron) or a kitchen admin may trigger a batch.
async fn process_reminders(
    State(state): State<OpsState>,
    caller: Caller,
) -> Result<Json<ApiResponse<ProcessSummary>>, OpsError> {
    caller.require_admin_somewhere()?;
    let summary = state.reminders.process_due().await?;
    Ok(Json(ApiResponse::success(summary)))
}

async fn reminder_status(
    State(state): State<OpsState>,
    caller: Caller,
) -> Result<Json<ApiResponse<ReminderStatus>>, OpsError> {
    caller.require_admin_somewhere()?;
    Ok(Json(ApiResponse::success(state.reminders.status().await?)))
}

#[derive(Debug, Deserialize)]
pub struct TimesQuery {
    pub start: String,
    pub end: String,
    pub frequency: i64,
}

#[derive(Debug, Serialize)]
pub struct TimesReply {
    pub start: String,
    pub end: String,
    pub frequency: u8,
    pub times: Vec<String>,
}

/// Previews the reminder schedule for a pair of work hours.
async fn reminder_times(
    ValidQuery(query): ValidQuery<TimesQuery>,
) -> Json<ApiResponse<TimesReply>> {
    let frequency = query.frequency.clamp(
        i64::from(schedule::MIN_FREQUENCY),
        i64::from(schedule::MAX_FREQUENCY),
    ) as u8;
    let times = schedule::reminder_times(&query.start, &query.end, frequency);
    Json(ApiResponse::success(TimesReply {
        frequency,
        start: query.start,
        end: query.end,
        times,
    }))
}
