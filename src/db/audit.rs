use chrono::Utc;
use sqlx::types::Json;
use tracing::warn;

use crate::db::models::{AuditLog, NewAuditLog};
use crate::db::sqlite::OpsStorage;
use crate::error::OpsError;

impl OpsStorage {
    pub async fn insert_audit(&self, entry: NewAuditLog) -> Result<i64, OpsError> {
        let rec: (i64,) = sqlx::query_as(
            "INSERT INTO audit_logs (kitchen_id, profile_id, action, entity_type, entity_id, details, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(entry.kitchen_id)
        .bind(entry.profile_id)
        .bind(&entry.action)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(Json(&entry.details))
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;
        Ok(rec.0)
    }

    /// Audit writes must never fail the operation they describe.
    pub async fn audit(&self, entry: NewAuditLog) {
        let action = entry.action.clone();
        if let Err(e) = self.insert_audit(entry).await {
            warn!(action = %action, error = %e, "failed to write audit log");
        }
    }

    /// Newest first.
    pub async fn list_audit(&self, kitchen_id: i64, limit: u32) -> Result<Vec<AuditLog>, OpsError> {
        let rows = sqlx::query_as::<_, AuditLog>(
            "SELECT id, kitchen_id, profile_id, action, entity_type, entity_id, details, created_at
             FROM audit_logs WHERE kitchen_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(kitchen_id)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
