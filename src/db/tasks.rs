use chrono::Utc;

use crate::db::models::{CreateTask, Task, TaskComment, UpdateTask};
use crate::db::sqlite::{OpsStorage, expect_affected};
use crate::error::OpsError;
use crate::types::TaskStatus;

const TASK_COLUMNS: &str = "id, project_id, kitchen_id, title, description, status, priority, \
     assignee_id, due_date, created_by, completed_at, created_at, updated_at";

/// Optional filters for task listings.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<i64>,
}

impl OpsStorage {
    pub async fn create_task(
        &self,
        project_id: i64,
        kitchen_id: i64,
        data: &CreateTask,
        created_by: Option<i64>,
    ) -> Result<Task, OpsError> {
        let now = Utc::now();
        let task = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks
                (project_id, kitchen_id, title, description, status, priority, assignee_id,
                 due_date, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(project_id)
        .bind(kitchen_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(TaskStatus::Pending)
        .bind(data.priority)
        .bind(data.assignee_id)
        .bind(data.due_date)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(task)
    }

    pub async fn get_task(&self, id: i64) -> Result<Task, OpsError> {
        sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(OpsError::NotFound("task"))
    }

    pub async fn list_tasks(&self, project_id: i64, filter: &TaskFilter) -> Result<Vec<Task>, OpsError> {
        let rows = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE project_id = ?
               AND (? IS NULL OR status = ?)
               AND (? IS NULL OR assignee_id = ?)
             ORDER BY
               CASE priority WHEN 'HIGH' THEN 0 WHEN 'MEDIUM' THEN 1 ELSE 2 END,
               due_date IS NULL, due_date, id"
        ))
        .bind(project_id)
        .bind(filter.status)
        .bind(filter.status)
        .bind(filter.assignee_id)
        .bind(filter.assignee_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Applies a patch; `completed_at` follows transitions into and out of DONE.
    pub async fn update_task(&self, id: i64, patch: &UpdateTask) -> Result<Task, OpsError> {
        let current = self.get_task(id).await?;
        let now = Utc::now();
        let status = patch.status.unwrap_or(current.status);
        let completed_at = match (current.status, status) {
            (TaskStatus::Done, TaskStatus::Done) => current.completed_at,
            (_, TaskStatus::Done) => Some(now),
            _ => None,
        };

        let task = sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks SET title = ?, description = ?, status = ?, priority = ?,
                assignee_id = ?, due_date = ?, completed_at = ?, updated_at = ?
             WHERE id = ? RETURNING {TASK_COLUMNS}"
        ))
        .bind(patch.title.clone().unwrap_or(current.title))
        .bind(patch.description.clone().unwrap_or(current.description))
        .bind(status)
        .bind(patch.priority.unwrap_or(current.priority))
        .bind(patch.assignee_id.unwrap_or(current.assignee_id))
        .bind(patch.due_date.unwrap_or(current.due_date))
        .bind(completed_at)
        .bind(now)
        .bind(id)
        .fetch_one(self.pool())
        .await?;
        Ok(task)
    }

    pub async fn delete_task(&self, id: i64) -> Result<(), OpsError> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        expect_affected(res, "task")
    }

    pub async fn add_comment(
        &self,
        task_id: i64,
        author_id: Option<i64>,
        body: &str,
    ) -> Result<TaskComment, OpsError> {
        let comment = sqlx::query_as::<_, TaskComment>(
            "INSERT INTO task_comments (task_id, author_id, body, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id, task_id, author_id, body, created_at",
        )
        .bind(task_id)
        .bind(author_id)
        .bind(body)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;
        Ok(comment)
    }

    pub async fn list_comments(&self, task_id: i64) -> Result<Vec<TaskComment>, OpsError> {
        let rows = sqlx::query_as::<_, TaskComment>(
            "SELECT id, task_id, author_id, body, created_at
             FROM task_comments WHERE task_id = ? ORDER BY id",
        )
        .bind(task_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn get_comment(&self, id: i64) -> Result<TaskComment, OpsError> {
        sqlx::query_as::<_, TaskComment>(
            "SELECT id, task_id, author_id, body, created_at FROM task_comments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(OpsError::NotFound("comment"))
    }

    pub async fn delete_comment(&self, id: i64) -> Result<(), OpsError> {
        let res = sqlx::query("DELETE FROM task_comments WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        expect_affected(res, "comment")
    }
}
