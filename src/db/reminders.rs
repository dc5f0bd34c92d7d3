use chrono::{DateTime, Utc};

use crate::db::models::{DueReminder, NewReminder, Reminder};
use crate::db::sqlite::OpsStorage;
use crate::error::OpsError;

const REMINDER_COLUMNS: &str =
    "id, task_id, profile_id, phone, message, scheduled_at, sent, sent_at, created_at";

/// Counters reported by the reminder status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, sqlx::FromRow)]
pub struct ReminderCounts {
    pub pending: i64,
    pub due: i64,
    pub sent_today: i64,
}

impl OpsStorage {
    /// Batch insert using a single transaction. Returns rows in input order.
    pub async fn insert_reminders(&self, items: &[NewReminder]) -> Result<Vec<Reminder>, OpsError> {
        let mut tx = self.pool().begin().await?;
        let mut rows = Vec::with_capacity(items.len());
        let now = Utc::now();

        for item in items {
            let row = sqlx::query_as::<_, Reminder>(&format!(
                "INSERT INTO reminders (task_id, profile_id, phone, message, scheduled_at, sent, created_at)
                 VALUES (?, ?, ?, ?, ?, 0, ?)
                 RETURNING {REMINDER_COLUMNS}"
            ))
            .bind(item.task_id)
            .bind(item.profile_id)
            .bind(&item.phone)
            .bind(&item.message)
            .bind(item.scheduled_at)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            rows.push(row);
        }

        tx.commit().await?;
        Ok(rows)
    }

    pub async fn list_task_reminders(&self, task_id: i64) -> Result<Vec<Reminder>, OpsError> {
        let rows = sqlx::query_as::<_, Reminder>(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders WHERE task_id = ? ORDER BY scheduled_at"
        ))
        .bind(task_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Scheduled times already planned for a task/profile pair, so planning
    /// twice does not duplicate rows.
    pub async fn unsent_reminder_times(
        &self,
        task_id: i64,
        profile_id: i64,
    ) -> Result<Vec<DateTime<Utc>>, OpsError> {
        let rows: Vec<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT scheduled_at FROM reminders WHERE task_id = ? AND profile_id = ? AND sent = 0",
        )
        .bind(task_id)
        .bind(profile_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Unsent reminders scheduled at or before `now`, oldest first.
    pub async fn due_reminders(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DueReminder>, OpsError> {
        let rows = sqlx::query_as::<_, DueReminder>(
            r#"
            SELECT r.id, r.task_id, r.profile_id, t.kitchen_id, r.phone, r.message,
                   r.scheduled_at, t.status AS task_status
            FROM reminders r
            JOIN tasks t ON t.id = r.task_id
            WHERE r.sent = 0 AND r.scheduled_at <= ?
            ORDER BY r.scheduled_at, r.id
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn mark_reminder_sent(&self, id: i64, at: DateTime<Utc>) -> Result<(), OpsError> {
        sqlx::query("UPDATE reminders SET sent = 1, sent_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn reminder_counts(
        &self,
        now: DateTime<Utc>,
        day_start: DateTime<Utc>,
    ) -> Result<ReminderCounts, OpsError> {
        let counts = sqlx::query_as::<_, ReminderCounts>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN sent = 0 THEN 1 ELSE 0 END), 0) AS pending,
                COALESCE(SUM(CASE WHEN sent = 0 AND scheduled_at <= ? THEN 1 ELSE 0 END), 0) AS due,
                COALESCE(SUM(CASE WHEN sent = 1 AND sent_at >= ? THEN 1 ELSE 0 END), 0) AS sent_today
            FROM reminders
            "#,
        )
        .bind(now)
        .bind(day_start)
        .fetch_one(self.pool())
        .await?;
        Ok(counts)
    }
}
