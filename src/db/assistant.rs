use chrono::Utc;

use crate::db::models::{AssistantFile, AssistantThread};
use crate::db::sqlite::{OpsStorage, expect_affected};
use crate::error::OpsError;

const FILE_COLUMNS: &str =
    "id, kitchen_id, conversation_id, openai_file_id, file_name, size_bytes, created_at";

impl OpsStorage {
    pub async fn find_thread(&self, conversation_id: &str) -> Result<Option<AssistantThread>, OpsError> {
        let row = sqlx::query_as::<_, AssistantThread>(
            "SELECT id, kitchen_id, conversation_id, thread_id, created_at
             FROM assistant_threads WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn insert_thread(
        &self,
        kitchen_id: i64,
        conversation_id: &str,
        thread_id: &str,
    ) -> Result<AssistantThread, OpsError> {
        let row = sqlx::query_as::<_, AssistantThread>(
            "INSERT INTO assistant_threads (kitchen_id, conversation_id, thread_id, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id, kitchen_id, conversation_id, thread_id, created_at",
        )
        .bind(kitchen_id)
        .bind(conversation_id)
        .bind(thread_id)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn insert_assistant_file(
        &self,
        kitchen_id: i64,
        conversation_id: Option<&str>,
        openai_file_id: &str,
        file_name: &str,
        size_bytes: i64,
    ) -> Result<AssistantFile, OpsError> {
        let row = sqlx::query_as::<_, AssistantFile>(&format!(
            "INSERT INTO assistant_files
                (kitchen_id, conversation_id, openai_file_id, file_name, size_bytes, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(kitchen_id)
        .bind(conversation_id)
        .bind(openai_file_id)
        .bind(file_name)
        .bind(size_bytes)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn get_assistant_file(&self, id: i64) -> Result<AssistantFile, OpsError> {
        sqlx::query_as::<_, AssistantFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM assistant_files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(OpsError::NotFound("contract"))
    }

    /// Kitchen-wide files (contracts), oldest first.
    pub async fn list_contracts(&self, kitchen_id: i64) -> Result<Vec<AssistantFile>, OpsError> {
        let rows = sqlx::query_as::<_, AssistantFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM assistant_files
             WHERE kitchen_id = ? AND conversation_id IS NULL ORDER BY id"
        ))
        .bind(kitchen_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn list_conversation_files(
        &self,
        kitchen_id: i64,
        conversation_id: &str,
    ) -> Result<Vec<AssistantFile>, OpsError> {
        let rows = sqlx::query_as::<_, AssistantFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM assistant_files
             WHERE kitchen_id = ? AND conversation_id = ? ORDER BY id"
        ))
        .bind(kitchen_id)
        .bind(conversation_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn delete_assistant_file(&self, id: i64) -> Result<(), OpsError> {
        let res = sqlx::query("DELETE FROM assistant_files WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        expect_affected(res, "contract")
    }
}
