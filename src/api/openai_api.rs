use crate::api::{default_retry_policy, endpoint};
use crate::config::OpenAiConfig;
use crate::error::OpsError;
use backon::Retryable;
use reqwest::{Method, StatusCode, multipart};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const ASSISTANTS_BETA: &str = "assistants=v2";

/// Thin client over the OpenAI Assistants v2 REST API.
#[derive(Clone)]
pub struct OpenAiApi {
    client: reqwest::Client,
    cfg: Arc<OpenAiConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub bytes: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ThreadObject {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RunObject {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<Value>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Cancelling,
    Completed,
    RequiresAction,
    Cancelled,
    Failed,
    Incomplete,
    Expired,
}

impl RunStatus {
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling
        )
    }
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    role: String,
    #[serde(default)]
    content: Vec<Value>,
}

impl MessageObject {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|part| part.pointer("/text/value").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl OpenAiApi {
    pub fn new(client: reqwest::Client, cfg: OpenAiConfig) -> Self {
        Self {
            client,
            cfg: Arc::new(cfg),
        }
    }

    pub fn default_assistant_id(&self) -> Option<&str> {
        self.cfg.assistant_id.as_deref()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.cfg.poll_interval_ms.max(1))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.cfg.poll_timeout_secs)
    }

    /// Sends one JSON request. GETs and DELETEs are retried on transient
    /// errors; other methods only when the upstream was never reached.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, OpsError> {
        let url = endpoint(&self.cfg.base_url, path)?;
        let idempotent = matches!(method, Method::GET | Method::DELETE);

        (|| async {
            let mut req = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(&self.cfg.api_key)
                .header("OpenAI-Beta", ASSISTANTS_BETA);
            if let Some(body) = body {
                req = req.json(body);
            }
            let resp = req.send().await?;
            let status = resp.status();
            if !status.is_success() {
                let detail = resp.text().await.unwrap_or_default();
                warn!(status = %status, path, detail = %detail, "OpenAI request failed");
                return Err(OpsError::UpstreamStatus(status));
            }
            Ok(resp.json::<T>().await?)
        })
        .retry(default_retry_policy())
        .when(|e: &OpsError| {
            if idempotent {
                e.is_retryable()
            } else {
                e.is_connect_failure()
            }
        })
        .notify(|err, dur: Duration| {
            warn!("OpenAI call retrying after error {}, sleeping {:?}", err, dur);
        })
        .await
    }

    /// `POST /files` with purpose `assistants`.
    pub async fn upload_file(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<FileObject, OpsError> {
        let url = endpoint(&self.cfg.base_url, "files")?;

        let file = (|| async {
            let part = multipart::Part::bytes(bytes.clone())
                .file_name(file_name.to_string())
                .mime_str(content_type)?;
            let form = multipart::Form::new()
                .text("purpose", "assistants")
                .part("file", part);
            let resp = self
                .client
                .post(url.clone())
                .bearer_auth(&self.cfg.api_key)
                .multipart(form)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(OpsError::UpstreamStatus(status));
            }
            Ok(resp.json::<FileObject>().await?)
        })
        .retry(default_retry_policy())
        .when(|e: &OpsError| e.is_connect_failure())
        .await?;

        debug!(file_id = %file.id, file_name, "uploaded file to OpenAI");
        Ok(file)
    }

    /// `DELETE /files/{id}`. Returns `false` when the file was already gone.
    pub async fn delete_file(&self, file_id: &str) -> Result<bool, OpsError> {
        match self
            .call::<Value>(Method::DELETE, &format!("files/{file_id}"), None)
            .await
        {
            Ok(_) => Ok(true),
            Err(OpsError::UpstreamStatus(StatusCode::NOT_FOUND)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn create_thread(&self) -> Result<ThreadObject, OpsError> {
        self.call(Method::POST, "threads", Some(&json!({}))).await
    }

    /// Adds a user message; each file id is attached for `file_search`.
    pub async fn add_message(
        &self,
        thread_id: &str,
        content: &str,
        file_ids: &[String],
    ) -> Result<Value, OpsError> {
        let body = message_body(content, file_ids);
        self.call(Method::POST, &format!("threads/{thread_id}/messages"), Some(&body))
            .await
    }

    pub async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunObject, OpsError> {
        self.call(
            Method::POST,
            &format!("threads/{thread_id}/runs"),
            Some(&json!({ "assistant_id": assistant_id })),
        )
        .await
    }

    pub async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject, OpsError> {
        self.call(Method::GET, &format!("threads/{thread_id}/runs/{run_id}"), None)
            .await
    }

    /// Text of the newest assistant message on the thread, if any.
    pub async fn latest_reply(&self, thread_id: &str) -> Result<Option<String>, OpsError> {
        let list: MessageList = self
            .call(
                Method::GET,
                &format!("threads/{thread_id}/messages?order=desc&limit=20"),
                None,
            )
            .await?;
        Ok(list
            .data
            .iter()
            .find(|m| m.role == "assistant")
            .map(MessageObject::text))
    }
}

fn message_body(content: &str, file_ids: &[String]) -> Value {
    let mut body = json!({ "role": "user", "content": content });
    if !file_ids.is_empty() {
        let attachments: Vec<Value> = file_ids
            .iter()
            .map(|id| json!({ "file_id": id, "tools": [{ "type": "file_search" }] }))
            .collect();
        body["attachments"] = Value::Array(attachments);
    }
    body
}
