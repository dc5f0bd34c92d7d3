use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::get,
};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::db::OpsStorage;
use crate::handlers;
use crate::middleware::require_ops_key;
use crate::service::{AssistantService, LocalBucket, Notifier, ReminderHandle};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct OpsState {
    pub storage: OpsStorage,
    pub notifier: Notifier,
    pub assistant: AssistantService,
    pub reminders: ReminderHandle,
    pub objects: LocalBucket,
    pub ops_key: Arc<str>,
}

impl OpsState {
    pub fn new(
        storage: OpsStorage,
        notifier: Notifier,
        assistant: AssistantService,
        reminders: ReminderHandle,
        objects: LocalBucket,
        ops_key: Arc<str>,
    ) -> Self {
        Self {
            storage,
            notifier,
            assistant,
            reminders,
            objects,
            ops_key,
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

pub fn ops_router(state: OpsState, body_limit: usize) -> Router {
    let api = Router::new()
        .merge(handlers::kitchens::router())
        .merge(handlers::profiles::router())
        .merge(handlers::projects::router())
        .merge(handlers::tasks::router())
        .merge(handlers::files::router())
        .merge(handlers::reminders::router())
        .merge(handlers::whatsapp::router())
        .merge(handlers::assistant::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_ops_key));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
