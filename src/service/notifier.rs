use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::WhatsappApi;
use crate::config::ReminderConfig;
use crate::db::OpsStorage;
use crate::db::models::{NewAuditLog, NewReminder, Profile, Reminder, Task};
use crate::error::OpsError;
use crate::service::schedule;
use crate::types::Priority;
use crate::validation::{self, MAX_WHATSAPP_LEN};

pub fn test_message() -> String {
    "✅ Mensagem de teste do Kitchen Ops. A integração com o WhatsApp está funcionando.".to_string()
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "baixa",
        Priority::Medium => "média",
        Priority::High => "alta",
    }
}

pub fn delegation_message(task: &Task, project_name: &str, kitchen_name: &str, from: &str) -> String {
    let mut msg = format!(
        "📋 *Nova tarefa delegada*\n\n*{}*\nProjeto: {project_name}\nCozinha: {kitchen_name}\nPrioridade: {}",
        task.title,
        priority_label(task.priority),
    );
    if let Some(due) = task.due_date {
        msg.push_str(&format!("\nPrazo: {}", due.format("%d/%m/%Y")));
    }
    if let Some(desc) = task.description.as_deref().filter(|d| !d.is_empty()) {
        msg.push_str(&format!("\n\n{desc}"));
    }
    msg.push_str(&format!("\n\nDelegada por {from}."));
    msg
}

pub fn reminder_message(task: &Task, project_name: &str) -> String {
    let mut msg = format!(
        "⏰ *Lembrete de tarefa*\n\n*{}*\nProjeto: {project_name}\nPrioridade: {}",
        task.title,
        priority_label(task.priority),
    );
    if let Some(due) = task.due_date {
        msg.push_str(&format!("\nPrazo: {}", due.format("%d/%m/%Y")));
    }
    msg
}

#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub number: String,
    pub upstream: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct DelegationReceipt {
    pub task_id: i64,
    pub assignee_id: i64,
    pub number: String,
    pub reminders_planned: usize,
}

/// WhatsApp messages that are sent on demand: test, manual and delegation.
/// Also plans the reminders that the reminder actor later dispatches.
#[derive(Clone)]
pub struct Notifier {
    storage: OpsStorage,
    whatsapp: WhatsappApi,
    reminder_cfg: Arc<ReminderConfig>,
}

impl Notifier {
    pub fn new(storage: OpsStorage, whatsapp: WhatsappApi, reminder_cfg: ReminderConfig) -> Self {
        Self {
            storage,
            whatsapp,
            reminder_cfg: Arc::new(reminder_cfg),
        }
    }

    pub fn whatsapp(&self) -> &WhatsappApi {
        &self.whatsapp
    }

    pub fn reminder_config(&self) -> &ReminderConfig {
        &self.reminder_cfg
    }

    fn normalize(&self, number: &str) -> Result<String, OpsError> {
        Ok(validation::phone(number, self.whatsapp.country_code())?)
    }

    pub async fn send_test(&self, number: &str, actor: Option<i64>) -> Result<SendReceipt, OpsError> {
        let number = self.normalize(number)?;
        let upstream = self.whatsapp.send_text(&number, &test_message()).await?;
        self.storage
            .audit(
                NewAuditLog::new("whatsapp.test_sent", "whatsapp")
                    .by(actor)
                    .details(json!({ "number": number })),
            )
            .await;
        Ok(SendReceipt { number, upstream })
    }

    pub async fn send_manual(
        &self,
        number: &str,
        message: &str,
        kitchen_id: Option<i64>,
        actor: Option<i64>,
    ) -> Result<SendReceipt, OpsError> {
        let number = self.normalize(number)?;
        let message = validation::required_text("message", message, MAX_WHATSAPP_LEN)?;
        let upstream = self.whatsapp.send_text(&number, &message).await?;

        let mut entry = NewAuditLog::new("whatsapp.manual_sent", "whatsapp")
            .by(actor)
            .details(json!({ "number": number, "length": message.chars().count() }));
        if let Some(kitchen_id) = kitchen_id {
            entry = entry.kitchen(kitchen_id);
        }
        self.storage.audit(entry).await;
        Ok(SendReceipt { number, upstream })
    }

    /// Notifies a task's assignee and plans today's reminders for them.
    pub async fn delegate(
        &self,
        task: &Task,
        actor: Option<&Profile>,
    ) -> Result<DelegationReceipt, OpsError> {
        let assignee_id = task
            .assignee_id
            .ok_or_else(|| OpsError::Validation("task has no assignee".into()))?;
        let assignee = self.storage.get_profile(assignee_id).await?;
        let number = self.reachable_number(&assignee)?;

        let project = self.storage.get_project(task.project_id).await?;
        let kitchen = self.storage.get_kitchen(task.kitchen_id).await?;
        let from = actor.map(|p| p.full_name.as_str()).unwrap_or("Kitchen Ops");
        let text = delegation_message(task, &project.name, &kitchen.name, from);

        let entry = NewAuditLog::new("whatsapp.delegation_sent", "task")
            .kitchen(task.kitchen_id)
            .by(actor.map(|p| p.id))
            .entity(task.id);

        if let Err(e) = self.whatsapp.send_text(&number, &text).await {
            warn!(task_id = task.id, assignee_id, error = %e, "delegation message failed");
            self.storage
                .audit(
                    NewAuditLog {
                        action: "whatsapp.delegation_failed".into(),
                        ..entry
                    }
                    .details(json!({ "assignee_id": assignee_id, "error": e.to_string() })),
                )
                .await;
            return Err(e);
        }
        self.storage
            .audit(entry.details(json!({ "assignee_id": assignee_id, "number": number })))
            .await;

        let planned = self.plan_reminders(task, Utc::now()).await?;
        info!(task_id = task.id, assignee_id, planned = planned.len(), "task delegated");
        Ok(DelegationReceipt {
            task_id: task.id,
            assignee_id,
            number,
            reminders_planned: planned.len(),
        })
    }

    fn reachable_number(&self, profile: &Profile) -> Result<String, OpsError> {
        if !profile.is_active || !profile.whatsapp_enabled {
            return Err(OpsError::Validation(format!(
                "profile {} does not receive WhatsApp messages",
                profile.id
            )));
        }
        let phone = profile
            .phone
            .as_deref()
            .ok_or_else(|| OpsError::Validation(format!("profile {} has no phone", profile.id)))?;
        self.normalize(phone)
    }

    /// Creates the remaining reminders for today (kitchen local time) for the
    /// task's assignee. Times already planned and unsent are not duplicated.
    pub async fn plan_reminders(
        &self,
        task: &Task,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reminder>, OpsError> {
        if task.status.is_closed() {
            return Ok(Vec::new());
        }
        let Some(assignee_id) = task.assignee_id else {
            return Ok(Vec::new());
        };
        let assignee = self.storage.get_profile(assignee_id).await?;
        let number = self.reachable_number(&assignee)?;
        let project = self.storage.get_project(task.project_id).await?;

        let cfg = &self.reminder_cfg;
        let start = assignee.work_start.as_deref().unwrap_or(&cfg.default_work_start);
        let end = assignee.work_end.as_deref().unwrap_or(&cfg.default_work_end);
        let times =
            schedule::reminder_clock_times(start, end, schedule::frequency_for(task.priority));
        let day = schedule::local_today(now, cfg.utc_offset_minutes);

        let existing = self
            .storage
            .unsent_reminder_times(task.id, assignee_id)
            .await?;
        let message = reminder_message(task, &project.name);
        let items: Vec<NewReminder> = schedule::instants_on(day, &times, cfg.utc_offset_minutes, now)
            .into_iter()
            .filter(|at| !existing.contains(at))
            .map(|scheduled_at| NewReminder {
                task_id: task.id,
                profile_id: assignee_id,
                phone: number.clone(),
                message: message.clone(),
                scheduled_at,
            })
            .collect();

        if items.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.storage.insert_reminders(&items).await?;
        self.storage
            .audit(
                NewAuditLog::new("reminder.planned", "task")
                    .kitchen(task.kitchen_id)
                    .entity(task.id)
                    .details(json!({
                        "profile_id": assignee_id,
                        "times": rows.iter().map(|r| r.scheduled_at.to_rfc3339()).collect::<Vec<_>>(),
                    })),
            )
            .await;
        Ok(rows)
    }
}
