use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::db::TaskFilter;
use crate::db::models::{CreateTask, NewAuditLog, StoredFile, Task, TaskComment, UpdateTask};
use crate::error::OpsError;
use crate::middleware::{Caller, ValidJson, ValidQuery};
use crate::router::OpsState;
use crate::types::{ApiResponse, Capability, TaskStatus};
use crate::validation::{self, MAX_COMMENT_LEN, MAX_NAME_LEN};

pub fn router() -> Router<OpsState> {
    Router::new()
        .route("/projects/{id}/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/tasks/{id}/comments", get(list_comments).post(add_comment))
        .route("/comments/{id}", delete(delete_comment))
}

#[derive(Debug, Default, Deserialize)]
pub struct TasksQuery {
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<i64>,
}

async fn list_tasks(
    State(state): State<OpsState>,
    caller: Caller,
    Path(project_id): Path<i64>,
    ValidQuery(query): ValidQuery<TasksQuery>,
) -> Result<Json<ApiResponse<Vec<Task>>>, OpsError> {
    let project = state.storage.get_project(project_id).await?;
    caller.require(project.kitchen_id, Capability::Read)?;
    let filter = TaskFilter {
        status: query.status,
        assignee_id: query.assignee_id,
    };
    Ok(Json(ApiResponse::success(
        state.storage.list_tasks(project_id, &filter).await?,
    )))
}

/// The assignee has to belong to the task's kitchen.
async fn ensure_assignable(
    state: &OpsState,
    kitchen_id: i64,
    assignee_id: i64,
) -> Result<(), OpsError> {
    let member = state
        .storage
        .memberships_of(assignee_id)
        .await?
        .iter()
        .any(|m| m.kitchen_id == kitchen_id);
    if member {
        Ok(())
    } else {
        Err(OpsError::Validation(format!(
            "profile {assignee_id} is not a member of this kitchen"
        )))
    }
}

async fn create_task(
    State(state): State<OpsState>,
    caller: Caller,
    Path(project_id): Path<i64>,
    ValidJson(body): ValidJson<CreateTask>,
) -> Result<Json<ApiResponse<Task>>, OpsError> {
    let project = state.storage.get_project(project_id).await?;
    caller.require(project.kitchen_id, Capability::EditTasks)?;
    if project.is_archived {
        return Err(OpsError::Validation("project is archived".into()));
    }
    if let Some(assignee_id) = body.assignee_id {
        ensure_assignable(&state, project.kitchen_id, assignee_id).await?;
    }

    let data = CreateTask {
        title: validation::required_text("title", &body.title, MAX_NAME_LEN)?,
        description: validation::optional_text(
            "description",
            body.description.as_deref(),
            MAX_COMMENT_LEN,
        )?,
        priority: body.priority,
        assignee_id: body.assignee_id,
        due_date: body.due_date,
    };
    let task = state
        .storage
        .create_task(project_id, project.kitchen_id, &data, caller.profile_id())
        .await?;
    state
        .storage
        .audit(
            NewAuditLog::new("task.created", "task")
                .kitchen(task.kitchen_id)
                .by(caller.profile_id())
                .entity(task.id)
                .details(json!({
                    "project_id": project_id,
                    "title": task.title,
                    "priority": task.priority,
                    "assignee_id": task.assignee_id,
                })),
        )
        .await;
    Ok(Json(ApiResponse::success(task)))
}

#[derive(Debug, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub comments: Vec<TaskComment>,
    pub files: Vec<StoredFile>,
}

async fn get_task(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<TaskDetail>>, OpsError> {
    let task = state.storage.get_task(id).await?;
    caller.require(task.kitchen_id, Capability::Read)?;
    let (comments, files) = futures::try_join!(
        state.storage.list_comments(id),
        state.storage.list_task_files(id)
    )?;
    Ok(Json(ApiResponse::success(TaskDetail {
        task,
        comments,
        files,
    })))
}

/// Full edit rights, or a status-only change by the task's own assignee.
fn ensure_can_update(caller: &Caller, task: &Task, patch: &UpdateTask) -> Result<(), OpsError> {
    if caller.can(task.kitchen_id, Capability::EditTasks) {
        return Ok(());
    }
    let is_assignee = caller.profile_id().is_some() && caller.profile_id() == task.assignee_id;
    if is_assignee && caller.can(task.kitchen_id, Capability::Read) && patch.is_status_only() {
        return Ok(());
    }
    if is_assignee {
        return Err(OpsError::Forbidden(
            "only the status of your own tasks may be changed".into(),
        ));
    }
    caller.require(task.kitchen_id, Capability::EditTasks)
}

async fn update_task(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<UpdateTask>,
) -> Result<Json<ApiResponse<Task>>, OpsError> {
    let task = state.storage.get_task(id).await?;
    ensure_can_update(&caller, &task, &body)?;
    if let Some(Some(assignee_id)) = body.assignee_id {
        ensure_assignable(&state, task.kitchen_id, assignee_id).await?;
    }

    let patch = UpdateTask {
        title: body
            .title
            .as_deref()
            .map(|t| validation::required_text("title", t, MAX_NAME_LEN))
            .transpose()?,
        description: body
            .description
            .map(|d| validation::optional_text("description", d.as_deref(), MAX_COMMENT_LEN))
            .transpose()?,
        status: body.status,
        priority: body.priority,
        assignee_id: body.assignee_id,
        due_date: body.due_date,
    };
    let updated = state.storage.update_task(id, &patch).await?;

    let action = if task.status != updated.status {
        "task.status_changed"
    } else {
        "task.updated"
    };
    state
        .storage
        .audit(
            NewAuditLog::new(action, "task")
                .kitchen(task.kitchen_id)
                .by(caller.profile_id())
                .entity(id)
                .details(json!({
                    "from_status": task.status,
                    "to_status": updated.status,
                    "assignee_id": updated.assignee_id,
                })),
        )
        .await;
    Ok(Json(ApiResponse::success(updated)))
}

async fn delete_task(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, OpsError> {
    let task = state.storage.get_task(id).await?;
    caller.require(task.kitchen_id, Capability::ManageProjects)?;

    let files = state.storage.list_task_files(id).await?;
    state.storage.delete_task(id).await?;
    for file in files {
        if let Err(e) = state.objects.delete(&file.object_key).await {
            warn!(file_id = file.id, error = %e, "failed to remove task attachment");
        }
    }

    state
        .storage
        .audit(
            NewAuditLog::new("task.deleted", "task")
                .kitchen(task.kitchen_id)
                .by(caller.profile_id())
                .entity(id)
                .details(json!({ "title": task.title })),
        )
        .await;
    Ok(Json(ApiResponse::success(json!({ "id": id }))))
}

async fn list_comments(
    State(state): State<OpsState>,
    caller: Caller,
    Path(task_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<TaskComment>>>, OpsError> {
    let task = state.storage.get_task(task_id).await?;
    caller.require(task.kitchen_id, Capability::Read)?;
    Ok(Json(ApiResponse::success(
        state.storage.list_comments(task_id).await?,
    )))
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub body: String,
}

async fn add_comment(
    State(state): State<OpsState>,
    caller: Caller,
    Path(task_id): Path<i64>,
    ValidJson(payload): ValidJson<CommentBody>,
) -> Result<Json<ApiResponse<TaskComment>>, OpsError> {
    let task = state.storage.get_task(task_id).await?;
    caller.require(task.kitchen_id, Capability::Comment)?;
    let body = validation::required_text("body", &payload.body, MAX_COMMENT_LEN)?;

    let comment = state
        .storage
        .add_comment(task_id, caller.profile_id(), &body)
        .await?;
    state
        .storage
        .audit(
            NewAuditLog::new("comment.created", "comment")
                .kitchen(task.kitchen_id)
                .by(caller.profile_id())
                .entity(comment.id)
                .details(json!({ "task_id": task_id })),
        )
        .await;
    Ok(Json(ApiResponse::success(comment)))
}

async fn delete_comment(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, OpsError> {
    let comment = state.storage.get_comment(id).await?;
    let task = state.storage.get_task(comment.task_id).await?;
    let is_author = caller.profile_id().is_some() && caller.profile_id() == comment.author_id;
    if !is_author {
        caller.require(task.kitchen_id, Capability::ManageKitchen)?;
    }

    state.storage.delete_comment(id).await?;
    state
        .storage
        .audit(
            NewAuditLog::new("comment.deleted", "comment")
                .kitchen(task.kitchen_id)
                .by(caller.profile_id())
                .entity(id)
                .details(json!({ "task_id": task.id })),
        )
        .await;
    Ok(Json(ApiResponse::success(json!({ "id": id }))))
}
