use chrono::Utc;

use crate::db::models::{NewStoredFile, StoredFile};
use crate::db::sqlite::{OpsStorage, expect_affected};
use crate::error::OpsError;

const FILE_COLUMNS: &str = "id, kitchen_id, task_id, bucket, object_key, file_name, content_type, \
     size_bytes, uploaded_by, created_at";

impl OpsStorage {
    pub async fn insert_file(&self, file: &NewStoredFile) -> Result<StoredFile, OpsError> {
        let row = sqlx::query_as::<_, StoredFile>(&format!(
            "INSERT INTO files
                (kitchen_id, task_id, bucket, object_key, file_name, content_type, size_bytes,
                 uploaded_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(file.kitchen_id)
        .bind(file.task_id)
        .bind(&file.bucket)
        .bind(&file.object_key)
        .bind(&file.file_name)
        .bind(&file.content_type)
        .bind(file.size_bytes)
        .bind(file.uploaded_by)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn get_file(&self, id: i64) -> Result<StoredFile, OpsError> {
        sqlx::query_as::<_, StoredFile>(&format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(OpsError::NotFound("file"))
    }

    pub async fn list_task_files(&self, task_id: i64) -> Result<Vec<StoredFile>, OpsError> {
        let rows = sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE task_id = ? ORDER BY id"
        ))
        .bind(task_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn delete_file_row(&self, id: i64) -> Result<(), OpsError> {
        let res = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        expect_affected(res, "file")
    }
}
