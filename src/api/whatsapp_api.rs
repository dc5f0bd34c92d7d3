use crate::api::{default_retry_policy, endpoint};
use crate::config::WhatsappConfig;
use crate::error::OpsError;
use backon::Retryable;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Serialize;
use serde_json::{Value, json};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Client for the Evolution WhatsApp gateway.
#[derive(Clone)]
pub struct WhatsappApi {
    client: reqwest::Client,
    cfg: Arc<WhatsappConfig>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionState {
    pub instance: String,
    pub state: String,
}

impl WhatsappApi {
    pub fn new(client: reqwest::Client, cfg: WhatsappConfig) -> Self {
        let per_minute = NonZeroU32::new(cfg.sends_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            client,
            cfg: Arc::new(cfg),
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }

    pub fn country_code(&self) -> &str {
        &self.cfg.country_code
    }

    /// `POST /message/sendText/{instance}`. Throttled by the configured
    /// per-minute quota; resent only when the gateway was never reached.
    pub async fn send_text(&self, number: &str, text: &str) -> Result<Value, OpsError> {
        let url = endpoint(
            &self.cfg.base_url,
            &format!("message/sendText/{}", self.cfg.instance),
        )?;
        let body = json!({ "number": number, "text": text });

        self.limiter.until_ready().await;

        (|| async {
            let resp = self
                .client
                .post(url.clone())
                .header("apikey", &self.cfg.api_key)
                .json(&body)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let detail = resp.text().await.unwrap_or_default();
                warn!(status = %status, detail = %detail, "WhatsApp gateway rejected message");
                return Err(OpsError::UpstreamStatus(status));
            }
            Ok(resp.json::<Value>().await?)
        })
        .retry(default_retry_policy())
        .when(|e: &OpsError| e.is_connect_failure())
        .notify(|err, dur: Duration| {
            warn!("WhatsApp send retrying after error {}, sleeping {:?}", err, dur);
        })
        .await
        .inspect(|_| debug!(number, "WhatsApp message accepted"))
    }

    /// `GET /instance/connectionState/{instance}`.
    pub async fn connection_state(&self) -> Result<ConnectionState, OpsError> {
        let url = endpoint(
            &self.cfg.base_url,
            &format!("instance/connectionState/{}", self.cfg.instance),
        )?;

        let payload = (|| async {
            let resp = self
                .client
                .get(url.clone())
                .header("apikey", &self.cfg.api_key)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(OpsError::UpstreamStatus(status));
            }
            Ok(resp.json::<Value>().await?)
        })
        .retry(default_retry_policy())
        .when(|e: &OpsError| e.is_retryable())
        .await?;

        let state = payload
            .pointer("/instance/state")
            .or_else(|| payload.get("state"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        Ok(ConnectionState {
            instance: self.cfg.instance.clone(),
            state,
        })
    }
}
