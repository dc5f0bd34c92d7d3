use chrono::{DateTime, Utc};
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::WhatsappApi;
use crate::config::ReminderConfig;
use crate::db::models::{DueReminder, NewAuditLog};
use crate::db::{OpsStorage, ReminderCounts};
use crate::error::OpsError;
use crate::service::schedule;

/// Outcome of one processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Rows dropped because their task was already closed.
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub at: DateTime<Utc>,
    pub summary: ProcessSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderStatus {
    #[serde(flatten)]
    pub counts: ReminderCounts,
    pub last_run: Option<LastRun>,
    pub ticker_enabled: bool,
}

#[derive(Debug)]
pub enum ReminderMessage {
    /// Send every reminder due now, up to the batch size.
    ProcessDue(RpcReplyPort<Result<ProcessSummary, OpsError>>),
    Status(RpcReplyPort<Result<ReminderStatus, OpsError>>),
    /// Periodic trigger from the interval timer; result is only logged.
    Tick,
}

/// Handle for interacting with the reminder actor.
///
/// All processing goes through one actor, so two overlapping triggers (the
/// ticker and a manual call) never pick up the same rows.
#[derive(Clone)]
pub struct ReminderHandle {
    actor: ActorRef<ReminderMessage>,
}

impl ReminderHandle {
    pub async fn process_due(&self) -> Result<ProcessSummary, OpsError> {
        ractor::call!(self.actor, ReminderMessage::ProcessDue)
            .map_err(|e| OpsError::RactorError(format!("ProcessDue RPC failed: {e}")))?
    }

    pub async fn status(&self) -> Result<ReminderStatus, OpsError> {
        ractor::call!(self.actor, ReminderMessage::Status)
            .map_err(|e| OpsError::RactorError(format!("Status RPC failed: {e}")))?
    }

    pub fn stop(&self) {
        self.actor.stop(None);
    }
}

pub struct ReminderArgs {
    pub storage: OpsStorage,
    pub whatsapp: WhatsappApi,
    pub cfg: ReminderConfig,
}

struct ReminderState {
    storage: OpsStorage,
    whatsapp: WhatsappApi,
    cfg: ReminderConfig,
    last_run: Option<LastRun>,
    ticker: Option<JoinHandle<()>>,
}

struct ReminderActor;

#[ractor::async_trait]
impl Actor for ReminderActor {
    type Msg = ReminderMessage;
    type State = ReminderState;
    type Arguments = ReminderArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let ticker = (args.cfg.poll_interval_secs > 0).then(|| {
            myself.send_interval(Duration::from_secs(args.cfg.poll_interval_secs), || {
                ReminderMessage::Tick
            })
        });
        info!(
            batch_size = args.cfg.batch_size,
            poll_interval_secs = args.cfg.poll_interval_secs,
            "ReminderActor started"
        );
        Ok(ReminderState {
            storage: args.storage,
            whatsapp: args.whatsapp,
            cfg: args.cfg,
            last_run: None,
            ticker,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        Ok(())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ReminderMessage::ProcessDue(rp) => {
                let result = process_due(state, Utc::now()).await;
                let _ = rp.send(result);
            }
            ReminderMessage::Status(rp) => {
                let now = Utc::now();
                let day_start = schedule::local_day_start(now, state.cfg.utc_offset_minutes);
                let result = state
                    .storage
                    .reminder_counts(now, day_start)
                    .await
                    .map(|counts| ReminderStatus {
                        counts,
                        last_run: state.last_run.clone(),
                        ticker_enabled: state.ticker.is_some(),
                    });
                let _ = rp.send(result);
            }
            ReminderMessage::Tick => match process_due(state, Utc::now()).await {
                Ok(summary) if summary.processed > 0 => {
                    info!(?summary, "scheduled reminder pass finished");
                }
                Ok(_) => debug!("no reminders due"),
                Err(e) => warn!(error = %e, "scheduled reminder pass failed"),
            },
        }
        Ok(())
    }
}

async fn process_due(
    state: &mut ReminderState,
    now: DateTime<Utc>,
) -> Result<ProcessSummary, OpsError> {
    let due = state.storage.due_reminders(now, state.cfg.batch_size).await?;
    let mut summary = ProcessSummary::default();

    for reminder in due {
        summary.processed += 1;

        if reminder.task_status.is_closed() {
            mark_sent(state, &reminder, now).await;
            summary.skipped += 1;
            debug!(reminder_id = reminder.id, task_id = reminder.task_id, "task closed; reminder dropped");
            continue;
        }

        let outcome = state.whatsapp.send_text(&reminder.phone, &reminder.message).await;
        // Marked sent either way so a broken number is not retried every pass.
        mark_sent(state, &reminder, Utc::now()).await;
        match outcome {
            Ok(_) => {
                summary.sent += 1;
                let details = json!({ "profile_id": reminder.profile_id, "phone": reminder.phone });
                audit(state, &reminder, "reminder.sent", details).await;
            }
            Err(e) => {
                summary.failed += 1;
                warn!(reminder_id = reminder.id, task_id = reminder.task_id, error = %e, "reminder send failed");
                audit(
                    state,
                    &reminder,
                    "reminder.failed",
                    json!({
                        "profile_id": reminder.profile_id,
                        "phone": reminder.phone,
                        "error": e.to_string(),
                    }),
                )
                .await;
            }
        }
    }

    state.last_run = Some(LastRun { at: now, summary });
    Ok(summary)
}

/// A failed update is logged; the pass goes on with the next row.
async fn mark_sent(state: &ReminderState, reminder: &DueReminder, at: DateTime<Utc>) {
    if let Err(e) = state.storage.mark_reminder_sent(reminder.id, at).await {
        warn!(reminder_id = reminder.id, error = %e, "failed to mark reminder sent");
    }
}

async fn audit(state: &ReminderState, reminder: &DueReminder, action: &str, details: serde_json::Value) {
    state
        .storage
        .audit(
            NewAuditLog::new(action, "reminder")
                .kitchen(reminder.kitchen_id)
                .entity(reminder.id)
                .details(details),
        )
        .await;
}

/// Spawns the reminder actor and returns a handle.
pub async fn spawn(args: ReminderArgs) -> Result<ReminderHandle, OpsError> {
    let (actor, _jh) = Actor::spawn(None, ReminderActor, args)
        .await
        .map_err(|e| OpsError::RactorError(format!("failed to spawn ReminderActor: {e}")))?;
    Ok(ReminderHandle { actor })
}
