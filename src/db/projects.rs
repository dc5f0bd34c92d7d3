use chrono::Utc;

use crate::db::models::{CreateProject, Project, UpdateProject};
use crate::db::sqlite::OpsStorage;
use crate::error::OpsError;

const PROJECT_COLUMNS: &str =
    "id, kitchen_id, name, description, status, is_archived, created_by, created_at, updated_at";

impl OpsStorage {
    pub async fn create_project(
        &self,
        kitchen_id: i64,
        data: &CreateProject,
        created_by: Option<i64>,
    ) -> Result<Project, OpsError> {
        let now = Utc::now();
        let project = sqlx::query_as::<_, Project>(&format!(
            "INSERT INTO projects
                (kitchen_id, name, description, status, is_archived, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, 0, ?, ?, ?)
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(kitchen_id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(data.status)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(project)
    }

    pub async fn get_project(&self, id: i64) -> Result<Project, OpsError> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(OpsError::NotFound("project"))
    }

    pub async fn list_projects(
        &self,
        kitchen_id: i64,
        include_archived: bool,
    ) -> Result<Vec<Project>, OpsError> {
        let rows = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE kitchen_id = ? AND (? OR is_archived = 0)
             ORDER BY updated_at DESC"
        ))
        .bind(kitchen_id)
        .bind(include_archived)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn update_project(&self, id: i64, patch: &UpdateProject) -> Result<Project, OpsError> {
        let current = self.get_project(id).await?;
        let name = patch.name.clone().unwrap_or(current.name);
        let description = patch.description.clone().unwrap_or(current.description);
        let status = patch.status.unwrap_or(current.status);
        let is_archived = patch.is_archived.unwrap_or(current.is_archived);

        let project = sqlx::query_as::<_, Project>(&format!(
            "UPDATE projects SET name = ?, description = ?, status = ?, is_archived = ?, updated_at = ?
             WHERE id = ? RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(name)
        .bind(description)
        .bind(status)
        .bind(is_archived)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(self.pool())
        .await?;
        Ok(project)
    }

    /// Projects are archived, never removed.
    pub async fn archive_project(&self, id: i64) -> Result<Project, OpsError> {
        self.update_project(
            id,
            &UpdateProject {
                is_archived: Some(true),
                ..Default::default()
            },
        )
        .await
    }
}
