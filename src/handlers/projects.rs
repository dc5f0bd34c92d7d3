use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::{CreateProject, NewAuditLog, Project, UpdateProject};
use crate::error::OpsError;
use crate::middleware::{Caller, ValidJson, ValidQuery};
use crate::router::OpsState;
use crate::types::{ApiResponse, Capability};
use crate::validation::{self, MAX_COMMENT_LEN, MAX_NAME_LEN};

pub fn router() -> Router<OpsState> {
    Router::new()
        .route(
            "/kitchens/{id}/projects",
            get(list_projects).post(create_project),
        )
        .route(
            "/projects/{id}",
            get(get_project).patch(update_project).delete(archive_project),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectsQuery {
    #[serde(default)]
    pub include_archived: bool,
}

async fn list_projects(
    State(state): State<OpsState>,
    caller: Caller,
    Path(kitchen_id): Path<i64>,
    ValidQuery(query): ValidQuery<ProjectsQuery>,
) -> Result<Json<ApiResponse<Vec<Project>>>, OpsError> {
    caller.require(kitchen_id, Capability::Read)?;
    let projects = state
        .storage
        .list_projects(kitchen_id, query.include_archived)
        .await?;
    Ok(Json(ApiResponse::success(projects)))
}

async fn create_project(
    State(state): State<OpsState>,
    caller: Caller,
    Path(kitchen_id): Path<i64>,
    ValidJson(body): ValidJson<CreateProject>,
) -> Result<Json<ApiResponse<Project>>, OpsError> {
    caller.require(kitchen_id, Capability::ManageProjects)?;
    let kitchen = state.storage.get_kitchen(kitchen_id).await?;
    if !kitchen.is_active {
        return Err(OpsError::Validation(format!("kitchen {} is inactive", kitchen.code)));
    }

    let data = CreateProject {
        name: validation::required_text("name", &body.name, MAX_NAME_LEN)?,
        description: validation::optional_text(
            "description",
            body.description.as_deref(),
            MAX_COMMENT_LEN,
        )?,
        status: body.status,
    };
    let project = state
        .storage
        .create_project(kitchen_id, &data, caller.profile_id())
        .await?;
    state
        .storage
        .audit(
            NewAuditLog::new("project.created", "project")
                .kitchen(kitchen_id)
                .by(caller.profile_id())
                .entity(project.id)
                .details(json!({ "name": project.name })),
        )
        .await;
    Ok(Json(ApiResponse::success(project)))
}

async fn get_project(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Project>>, OpsError> {
    let project = state.storage.get_project(id).await?;
    caller.require(project.kitchen_id, Capability::Read)?;
    Ok(Json(ApiResponse::success(project)))
}

async fn update_project(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<UpdateProject>,
) -> Result<Json<ApiResponse<Project>>, OpsError> {
    let project = state.storage.get_project(id).await?;
    caller.require(project.kitchen_id, Capability::ManageProjects)?;

    let patch = UpdateProject {
        name: body
            .name
            .as_deref()
            .map(|n| validation::required_text("name", n, MAX_NAME_LEN))
            .transpose()?,
        description: body
            .description
            .map(|d| validation::optional_text("description", d.as_deref(), MAX_COMMENT_LEN))
            .transpose()?,
        status: body.status,
        is_archived: body.is_archived,
    };
    let updated = state.storage.update_project(id, &patch).await?;
    state
        .storage
        .audit(
            NewAuditLog::new("project.updated", "project")
                .kitchen(project.kitchen_id)
                .by(caller.profile_id())
                .entity(id)
                .details(json!({ "status": updated.status, "is_archived": updated.is_archived })),
        )
        .await;
    Ok(Json(ApiResponse::success(updated)))
}

async fn archive_project(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Project>>, OpsError> {
    let project = state.storage.get_project(id).await?;
    caller.require(project.kitchen_id, Capability::ManageProjects)?;
    let archived = state.storage.archive_project(id).await?;
    state
        .storage
        .audit(
            NewAuditLog::new("project.archived", "project")
                .kitchen(project.kitchen_id)
                .by(caller.profile_id())
                .entity(id),
        )
        .await;
    Ok(Json(ApiResponse::success(archived)))
}
