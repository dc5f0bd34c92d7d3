use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;

use crate::types::{Priority, ProjectStatus, Role, TaskStatus};

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Kitchen {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub city: Option<String>,
    pub assistant_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateKitchen {
    pub code: String,
    pub name: String,
    pub city: Option<String>,
    pub assistant_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateKitchen {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub city: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assistant_id: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Profile {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub work_start: Option<String>,
    pub work_end: Option<String>,
    pub whatsapp_enabled: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProfile {
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub work_start: Option<String>,
    pub work_end: Option<String>,
    pub whatsapp_enabled: Option<bool>,
    /// Optional initial membership.
    pub kitchen_id: Option<i64>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfile {
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub work_start: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub work_end: Option<Option<String>>,
    pub whatsapp_enabled: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Membership {
    pub id: i64,
    pub profile_id: i64,
    pub kitchen_id: i64,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, FromRow)]
pub struct MemberWithProfile {
    pub profile_id: i64,
    pub kitchen_id: i64,
    pub role: Role,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Project {
    pub id: i64,
    pub kitchen_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub is_archived: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
    pub is_archived: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub kitchen_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub created_by: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub assignee_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
}

impl UpdateTask {
    /// True when only `status` is set; the one edit an assignee without
    /// task-editing rights may make.
    pub fn is_status_only(&self) -> bool {
        self.status.is_some()
            && self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.assignee_id.is_none()
            && self.due_date.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct TaskComment {
    pub id: i64,
    pub task_id: i64,
    pub author_id: Option<i64>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct StoredFile {
    pub id: i64,
    pub kitchen_id: i64,
    pub task_id: Option<i64>,
    pub bucket: String,
    pub object_key: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStoredFile {
    pub kitchen_id: i64,
    pub task_id: Option<i64>,
    pub bucket: String,
    pub object_key: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Reminder {
    pub id: i64,
    pub task_id: i64,
    pub profile_id: i64,
    pub phone: String,
    pub message: String,
    pub scheduled_at: DateTime<Utc>,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReminder {
    pub task_id: i64,
    pub profile_id: i64,
    pub phone: String,
    pub message: String,
    pub scheduled_at: DateTime<Utc>,
}

/// A due reminder joined with the current state of its task.
#[derive(Debug, Clone, FromRow)]
pub struct DueReminder {
    pub id: i64,
    pub task_id: i64,
    pub profile_id: i64,
    pub kitchen_id: i64,
    pub phone: String,
    pub message: String,
    pub scheduled_at: DateTime<Utc>,
    pub task_status: TaskStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub kitchen_id: Option<i64>,
    pub profile_id: Option<i64>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<i64>,
    pub details: Json<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub kitchen_id: Option<i64>,
    pub profile_id: Option<i64>,
    pub action: String,
    pub entity_type: &'static str,
    pub entity_id: Option<i64>,
    pub details: Value,
}

impl NewAuditLog {
    pub fn new(action: impl Into<String>, entity_type: &'static str) -> Self {
        Self {
            kitchen_id: None,
            profile_id: None,
            action: action.into(),
            entity_type,
            entity_id: None,
            details: Value::Object(Default::default()),
        }
    }

    pub fn kitchen(mut self, kitchen_id: i64) -> Self {
        self.kitchen_id = Some(kitchen_id);
        self
    }

    pub fn by(mut self, profile_id: Option<i64>) -> Self {
        self.profile_id = profile_id;
        self
    }

    pub fn entity(mut self, entity_id: i64) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct AssistantThread {
    pub id: i64,
    pub kitchen_id: i64,
    pub conversation_id: String,
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct AssistantFile {
    pub id: i64,
    pub kitchen_id: i64,
    pub conversation_id: Option<String>,
    pub openai_file_id: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}
