use kitchen_ops::api::{OpenAiApi, WhatsappApi, build_http_client};
use kitchen_ops::config::Config;
use kitchen_ops::db::OpsStorage;
use kitchen_ops::router::{OpsState, ops_router};
use kitchen_ops::service::reminder_actor::{self, ReminderArgs};
use kitchen_ops::service::{AssistantService, LocalBucket, Notifier};
use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.basic.database_url,
        proxy = %cfg.basic.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.basic.loglevel,
        whatsapp_instance = %cfg.whatsapp.instance,
        reminder_poll_secs = cfg.reminders.poll_interval_secs,
    );
    if cfg.whatsapp.api_key.is_empty() {
        warn!("whatsapp.api_key is empty; gateway calls will be rejected");
    }
    if cfg.openai.api_key.is_empty() {
        warn!("openai.api_key is empty; assistant calls will be rejected");
    }

    let storage = OpsStorage::open(&cfg.basic.database_url).await?;
    let client = build_http_client(cfg.basic.proxy.as_ref())?;
    let whatsapp = WhatsappApi::new(client.clone(), cfg.whatsapp.clone());
    let openai = OpenAiApi::new(client, cfg.openai.clone());

    let reminders = reminder_actor::spawn(ReminderArgs {
        storage: storage.clone(),
        whatsapp: whatsapp.clone(),
        cfg: cfg.reminders.clone(),
    })
    .await?;

    let state = OpsState::new(
        storage.clone(),
        Notifier::new(storage.clone(), whatsapp, cfg.reminders.clone()),
        AssistantService::new(storage, openai),
        reminders.clone(),
        LocalBucket::new(&cfg.storage),
        Arc::from(cfg.basic.ops_key.as_str()),
    );
    let app = ops_router(state, cfg.basic.body_limit_mb * 1024 * 1024);

    let listener = TcpListener::bind(&cfg.basic.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.basic.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    reminders.stop();
    Ok(())
}
