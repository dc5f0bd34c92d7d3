#![allow(dead_code)]

use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{Path, State},
    http::{Request, StatusCode},
    routing::{delete, get, post},
};
use kitchen_ops::api::{OpenAiApi, WhatsappApi, build_http_client};
use kitchen_ops::config::Config;
use kitchen_ops::db::OpsStorage;
use kitchen_ops::router::{OpsState, ops_router};
use kitchen_ops::service::reminder_actor::{self, ReminderArgs};
use kitchen_ops::service::{AssistantService, LocalBucket, Notifier};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const OPS_KEY: &str = "test-key";
/// Numbers ending in this suffix make the fake gateway answer 500.
pub const FAILING_SUFFIX: &str = "0000";

pub struct TestApp {
    pub app: Router,
    pub storage: OpsStorage,
    pub sent: Arc<Mutex<Vec<Value>>>,
    pub openai_calls: Arc<Mutex<Vec<String>>>,
    /// Status the fake OpenAI reports when a run is polled.
    pub run_status: Arc<Mutex<String>>,
    /// Directory holding the task-file bucket.
    pub objects_root: PathBuf,
    _dir: TempDir,
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake upstream");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

async fn fake_send_text(
    State(sent): State<Arc<Mutex<Vec<Value>>>>,
    Path(_instance): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let number = body["number"].as_str().unwrap_or_default().to_string();
    if number.ends_with(FAILING_SUFFIX) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "gateway down" })),
        );
    }
    sent.lock().expect("sent lock").push(body);
    (StatusCode::CREATED, Json(json!({ "key": { "id": "MSG1" }, "status": "PENDING" })))
}

async fn fake_whatsapp(sent: Arc<Mutex<Vec<Value>>>) -> String {
    let router = Router::new()
        .route("/message/sendText/{instance}", post(fake_send_text))
        .route(
            "/instance/connectionState/{instance}",
            get(|Path(instance): Path<String>| async move {
                Json(json!({ "instance": { "instanceName": instance, "state": "open" } }))
            }),
        )
        .with_state(sent);
    serve(router).await
}

type Calls = Arc<Mutex<Vec<String>>>;

fn record(calls: &Calls, what: String) {
    calls.lock().expect("calls lock").push(what);
}

async fn fake_openai(calls: Calls, run_status: Arc<Mutex<String>>) -> String {
    let router = Router::new()
        .route(
            "/threads",
            post(|State(c): State<Calls>| async move {
                record(&c, "create_thread".into());
                Json(json!({ "id": "thread_1", "object": "thread" }))
            }),
        )
        .route(
            "/threads/{thread}/messages",
            post(
                |State(c): State<Calls>, Path(thread): Path<String>, Json(body): Json<Value>| async move {
                    let files: Vec<String> = body["attachments"]
                        .as_array()
                        .map(|a| {
                            a.iter()
                                .filter_map(|f| f["file_id"].as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    record(&c, format!("message:{thread}:{}", files.join(",")));
                    Json(json!({ "id": "msg_1", "role": "user" }))
                },
            )
            .get(|| async {
                Json(json!({
                    "data": [
                        { "role": "assistant", "content": [
                            { "type": "text", "text": { "value": "O contrato vence em março." } }
                        ] },
                        { "role": "user", "content": [
                            { "type": "text", "text": { "value": "Quando vence?" } }
                        ] }
                    ]
                }))
            }),
        )
        .route(
            "/threads/{thread}/runs",
            post(|State(c): State<Calls>, Json(body): Json<Value>| async move {
                record(&c, format!("run:{}", body["assistant_id"].as_str().unwrap_or_default()));
                Json(json!({ "id": "run_1", "status": "queued" }))
            }),
        )
        .route(
            "/threads/{thread}/runs/{run}",
            get(move || {
                let status = run_status.lock().expect("status lock").clone();
                async move {
                    Json(json!({
                        "id": "run_1",
                        "status": status,
                        "last_error": { "code": "server_error", "message": "run blew up" },
                    }))
                }
            }),
        )
        .route(
            "/files",
            post(|State(c): State<Calls>| async move {
                let n = {
                    let mut guard = c.lock().expect("calls lock");
                    guard.push("upload".into());
                    guard.iter().filter(|s| *s == "upload").count()
                };
                Json(json!({ "id": format!("file-{n}"), "filename": "x", "bytes": 3 }))
            }),
        )
        .route(
            "/files/{id}",
            delete(|State(c): State<Calls>, Path(id): Path<String>| async move {
                record(&c, format!("delete:{id}"));
                Json(json!({ "id": id, "deleted": true }))
            }),
        )
        .with_state(calls);
    serve(router).await
}

pub async fn spawn_app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let sent = Arc::new(Mutex::new(Vec::new()));
    let openai_calls = Arc::new(Mutex::new(Vec::new()));
    let run_status = Arc::new(Mutex::new("completed".to_string()));

    let mut cfg = Config::default();
    cfg.basic.ops_key = OPS_KEY.to_string();
    cfg.basic.database_url = format!("sqlite:{}", dir.path().join("ops.sqlite").display());
    cfg.whatsapp.base_url = fake_whatsapp(sent.clone()).await;
    cfg.whatsapp.api_key = "evo-key".to_string();
    cfg.whatsapp.sends_per_minute = 600;
    cfg.openai.base_url = fake_openai(openai_calls.clone(), run_status.clone()).await;
    cfg.openai.api_key = "sk-test".to_string();
    cfg.openai.assistant_id = Some("asst_default".to_string());
    cfg.openai.poll_interval_ms = 10;
    cfg.openai.poll_timeout_secs = 5;
    cfg.storage.root = dir.path().join("objects");
    tweak(&mut cfg);

    let storage = OpsStorage::open(&cfg.basic.database_url)
        .await
        .expect("open database");
    let client = build_http_client(None).expect("http client");
    let whatsapp = WhatsappApi::new(client.clone(), cfg.whatsapp.clone());
    let openai = OpenAiApi::new(client, cfg.openai.clone());
    let reminders = reminder_actor::spawn(ReminderArgs {
        storage: storage.clone(),
        whatsapp: whatsapp.clone(),
        cfg: cfg.reminders.clone(),
    })
    .await
    .expect("spawn reminder actor");

    let state = OpsState::new(
        storage.clone(),
        Notifier::new(storage.clone(), whatsapp, cfg.reminders.clone()),
        AssistantService::new(storage.clone(), openai),
        reminders,
        LocalBucket::new(&cfg.storage),
        Arc::from(OPS_KEY),
    );
    let app = ops_router(state, cfg.basic.body_limit_mb * 1024 * 1024);

    TestApp {
        app,
        storage,
        sent,
        openai_calls,
        run_status,
        objects_root: cfg.storage.root.join(&cfg.storage.bucket),
        _dir: dir,
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

impl TestApp {
    /// JSON request with the service key; `profile` sets `x-profile-id`.
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        profile: Option<i64>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-ops-key", OPS_KEY);
        if let Some(id) = profile {
            builder = builder.header("x-profile-id", id.to_string());
        }
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let req = builder.body(body).expect("build request");
        self.send(req).await
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app.clone().oneshot(req).await.expect("request failed");
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    pub fn sent_messages(&self) -> Vec<Value> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn set_run_status(&self, status: &str) {
        *self.run_status.lock().expect("status lock") = status.to_string();
    }

    pub fn openai_log(&self) -> Vec<String> {
        self.openai_calls.lock().expect("calls lock").clone()
    }

    /// Creates a kitchen as the service and returns its id.
    pub async fn kitchen(&self, code: &str) -> i64 {
        let (status, body) = self
            .call(
                "POST",
                "/api/kitchens",
                Some(json!({ "code": code, "name": format!("Cozinha {code}") })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["id"].as_i64().expect("kitchen id")
    }

    /// Creates a profile with a membership and returns its id.
    pub async fn member(&self, kitchen_id: i64, email: &str, role: &str, phone: Option<&str>) -> i64 {
        let (status, body) = self
            .call(
                "POST",
                "/api/profiles",
                Some(json!({
                    "email": email,
                    "full_name": email.split('@').next().unwrap_or(email),
                    "phone": phone,
                    "kitchen_id": kitchen_id,
                    "role": role,
                })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["id"].as_i64().expect("profile id")
    }

    pub async fn project(&self, kitchen_id: i64, name: &str) -> i64 {
        let (status, body) = self
            .call(
                "POST",
                &format!("/api/kitchens/{kitchen_id}/projects"),
                Some(json!({ "name": name })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["id"].as_i64().expect("project id")
    }

    pub async fn task(&self, project_id: i64, body: Value) -> Value {
        let (status, body) = self
            .call(
                "POST",
                &format!("/api/projects/{project_id}/tasks"),
                Some(body),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"].clone()
    }
}

/// Hand-built multipart body with text fields and one file part.
pub fn multipart_body(boundary: &str, fields: &[(&str, &str)], file: (&str, &str, &[u8])) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in fields {
        out.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    let (file_name, content_type, bytes) = file;
    out.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    out.extend_from_slice(bytes);
    out.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    out
}
