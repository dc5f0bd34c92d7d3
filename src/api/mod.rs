pub mod openai_api;
pub mod whatsapp_api;

use crate::error::OpsError;
use backon::ExponentialBuilder;
use std::time::Duration;
use url::Url;

pub use openai_api::OpenAiApi;
pub use whatsapp_api::WhatsappApi;

/// Shared outbound client for both upstream APIs.
pub fn build_http_client(proxy: Option<&Url>) -> Result<reqwest::Client, OpsError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("kitchen-ops/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(30));
    // Only the configured proxy is used; `HTTP_PROXY` and friends are ignored.
    builder = match proxy {
        Some(proxy_url) => builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?),
        None => builder.no_proxy(),
    };
    Ok(builder.build()?)
}

pub(crate) fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Joins a configured base URL and a relative path without caring about
/// trailing or leading slashes.
pub(crate) fn endpoint(base: &str, path: &str) -> Result<Url, OpsError> {
    let url = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&url)?)
}
