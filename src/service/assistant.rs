use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::OpenAiApi;
use crate::api::openai_api::{RunObject, RunStatus};
use crate::db::OpsStorage;
use crate::db::models::{AssistantFile, Kitchen, NewAuditLog};
use crate::error::OpsError;
use crate::validation;

/// Upper bound on attachments per message accepted by the Assistants API.
pub const MAX_ATTACHMENTS: usize = 10;

const MAX_MESSAGE_LEN: usize = 32_000;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub kitchen_id: i64,
    pub conversation_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub conversation_id: String,
    pub thread_id: String,
    pub run_id: String,
    pub reply: String,
    pub file_ids: Vec<String>,
}

/// Runs conversations against the kitchen's OpenAI assistant and keeps track
/// of the files attached to them.
#[derive(Clone)]
pub struct AssistantService {
    storage: OpsStorage,
    openai: OpenAiApi,
}

impl AssistantService {
    pub fn new(storage: OpsStorage, openai: OpenAiApi) -> Self {
        Self { storage, openai }
    }

    pub async fn chat(
        &self,
        kitchen: &Kitchen,
        req: ChatRequest,
        actor: Option<i64>,
    ) -> Result<ChatReply, OpsError> {
        let message = validation::required_text("message", &req.message, MAX_MESSAGE_LEN)?;
        let assistant_id = kitchen
            .assistant_id
            .as_deref()
            .or_else(|| self.openai.default_assistant_id())
            .ok_or_else(|| {
                OpsError::Validation(format!("kitchen {} has no assistant configured", kitchen.id))
            })?
            .to_string();

        let conversation_id = req
            .conversation_id
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let thread_id = self.thread_for(kitchen.id, &conversation_id).await?;

        let conversation_files = self
            .storage
            .list_conversation_files(kitchen.id, &conversation_id)
            .await?;
        let contracts = self.storage.list_contracts(kitchen.id).await?;
        let file_ids = merge_file_ids(&req.file_ids, &conversation_files, &contracts);

        self.openai.add_message(&thread_id, &message, &file_ids).await?;
        let run = self.openai.create_run(&thread_id, &assistant_id).await?;
        let run = self.wait_for_run(&thread_id, run).await?;

        let reply = self
            .openai
            .latest_reply(&thread_id)
            .await?
            .unwrap_or_default();

        self.storage
            .audit(
                NewAuditLog::new("assistant.chat", "assistant")
                    .kitchen(kitchen.id)
                    .by(actor)
                    .details(json!({
                        "conversation_id": conversation_id,
                        "run_id": run.id,
                        "files": file_ids.len(),
                    })),
            )
            .await;

        Ok(ChatReply {
            conversation_id,
            thread_id,
            run_id: run.id,
            reply,
            file_ids,
        })
    }

    async fn thread_for(&self, kitchen_id: i64, conversation_id: &str) -> Result<String, OpsError> {
        if let Some(thread) = self.storage.find_thread(conversation_id).await? {
            if thread.kitchen_id != kitchen_id {
                return Err(OpsError::Forbidden(
                    "conversation belongs to another kitchen".into(),
                ));
            }
            return Ok(thread.thread_id);
        }
        let thread = self.openai.create_thread().await?;
        self.storage
            .insert_thread(kitchen_id, conversation_id, &thread.id)
            .await?;
        debug!(conversation_id, thread_id = %thread.id, "opened assistant thread");
        Ok(thread.id)
    }

    async fn wait_for_run(&self, thread_id: &str, mut run: RunObject) -> Result<RunObject, OpsError> {
        let timeout = self.openai.poll_timeout();
        let deadline = Instant::now() + timeout;

        while run.status.is_pending() {
            if Instant::now() >= deadline {
                warn!(thread_id, run_id = %run.id, "assistant run timed out");
                return Err(OpsError::AssistantTimeout(timeout.as_secs()));
            }
            sleep(self.openai.poll_interval()).await;
            run = self.openai.get_run(thread_id, &run.id).await?;
        }

        match run.status {
            RunStatus::Completed => Ok(run),
            status => {
                let detail = run
                    .last_error
                    .as_ref()
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("no details");
                Err(OpsError::Upstream(format!(
                    "assistant run ended as {status:?}: {detail}"
                )))
            }
        }
    }

    /// Uploads a file for the assistant. Without a conversation the file is a
    /// kitchen contract, attached to every conversation of the kitchen. A
    /// conversation seen here for the first time gets its thread now, so it
    /// belongs to `kitchen_id` from the start.
    pub async fn upload(
        &self,
        kitchen_id: i64,
        conversation_id: Option<&str>,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        actor: Option<i64>,
    ) -> Result<AssistantFile, OpsError> {
        if bytes.is_empty() {
            return Err(OpsError::Validation("file is empty".into()));
        }
        if let Some(conversation_id) = conversation_id {
            self.thread_for(kitchen_id, conversation_id).await?;
        }
        let size = bytes.len() as i64;
        let uploaded = self.openai.upload_file(file_name, content_type, bytes).await?;

        let row = match self
            .storage
            .insert_assistant_file(kitchen_id, conversation_id, &uploaded.id, file_name, size)
            .await
        {
            Ok(row) => row,
            Err(e) => {
                if let Err(cleanup) = self.openai.delete_file(&uploaded.id).await {
                    warn!(file_id = %uploaded.id, error = %cleanup, "orphaned OpenAI file");
                }
                return Err(e);
            }
        };

        self.storage
            .audit(
                NewAuditLog::new("assistant.file_uploaded", "assistant_file")
                    .kitchen(kitchen_id)
                    .by(actor)
                    .entity(row.id)
                    .details(json!({
                        "file_name": row.file_name,
                        "openai_file_id": row.openai_file_id,
                        "conversation_id": row.conversation_id,
                    })),
            )
            .await;
        info!(kitchen_id, file_id = %row.openai_file_id, "assistant file uploaded");
        Ok(row)
    }

    pub async fn remove_contract(&self, file: &AssistantFile, actor: Option<i64>) -> Result<(), OpsError> {
        if !self.openai.delete_file(&file.openai_file_id).await? {
            debug!(file_id = %file.openai_file_id, "file already gone upstream");
        }
        self.storage.delete_assistant_file(file.id).await?;
        self.storage
            .audit(
                NewAuditLog::new("assistant.contract_removed", "assistant_file")
                    .kitchen(file.kitchen_id)
                    .by(actor)
                    .entity(file.id)
                    .details(json!({ "openai_file_id": file.openai_file_id })),
            )
            .await;
        Ok(())
    }
}

/// Request ids first, then conversation files, then kitchen contracts;
/// duplicates and blanks dropped, capped at [`MAX_ATTACHMENTS`].
pub fn merge_file_ids(
    requested: &[String],
    conversation: &[AssistantFile],
    contracts: &[AssistantFile],
) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let candidates = requested.iter().map(String::as_str).chain(
        conversation
            .iter()
            .chain(contracts)
            .map(|f| f.openai_file_id.as_str()),
    );
    for id in candidates {
        let id = id.trim();
        if !id.is_empty() && !merged.iter().any(|m| m == id) {
            merged.push(id.to_string());
        }
    }
    if merged.len() > MAX_ATTACHMENTS {
        warn!(
            total = merged.len(),
            kept = MAX_ATTACHMENTS,
            "too many assistant files; extra attachments dropped"
        );
        merged.truncate(MAX_ATTACHMENTS);
    }
    merged
}
