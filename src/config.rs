use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Runtime configuration.
///
/// Layered as: built-in defaults, then `config.toml` (if present), then
/// `KOPS_`-prefixed environment variables using `__` between section and key,
/// e.g. `KOPS_WHATSAPP__API_KEY`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub whatsapp: WhatsappConfig,
    pub openai: OpenAiConfig,
    pub reminders: ReminderConfig,
    pub storage: StorageConfig,
}

impl Config {
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment("config.toml").extract()
    }

    fn figment(toml_path: &str) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed("KOPS_").split("__"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub listen_addr: String,
    /// Service key required on every `/api` route.
    pub ops_key: String,
    pub database_url: String,
    pub loglevel: String,
    pub proxy: Option<Url>,
    pub body_limit_mb: usize,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            ops_key: "kitchen-ops".to_string(),
            database_url: "sqlite://kitchen_ops.db".to_string(),
            loglevel: "info".to_string(),
            proxy: None,
            body_limit_mb: 25,
        }
    }
}

/// Evolution gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsappConfig {
    pub base_url: String,
    pub api_key: String,
    pub instance: String,
    pub country_code: String,
    pub sends_per_minute: u32,
}

impl Default for WhatsappConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: String::new(),
            instance: "kitchen-ops".to_string(),
            country_code: "55".to_string(),
            sends_per_minute: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    /// Used when the kitchen has no assistant of its own.
    pub assistant_id: Option<String>,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            assistant_id: None,
            poll_interval_ms: 1000,
            poll_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub batch_size: u32,
    /// 0 disables the background ticker; processing then only runs on demand.
    pub poll_interval_secs: u64,
    pub default_work_start: String,
    pub default_work_end: String,
    /// Fixed offset of the kitchens' wall clock; work hours are local times.
    pub utc_offset_minutes: i32,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval_secs: 0,
            default_work_start: "08:00".to_string(),
            default_work_end: "17:00".to_string(),
            utc_offset_minutes: -180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage"),
            bucket: "task-files".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.reminders.batch_size, 50);
        assert_eq!(cfg.openai.poll_interval_ms, 1000);
        assert_eq!(cfg.openai.poll_timeout_secs, 60);
        assert_eq!(cfg.whatsapp.country_code, "55");
        assert_eq!(cfg.basic.body_limit_mb, 25);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[whatsapp]\ninstance = \"cozinha-central\"\n[reminders]\nbatch_size = 10\n",
        )
        .expect("write config");

        let cfg: Config = Config::figment(path.to_str().expect("utf-8 path"))
            .extract()
            .expect("config should parse");
        assert_eq!(cfg.whatsapp.instance, "cozinha-central");
        assert_eq!(cfg.reminders.batch_size, 10);
        assert_eq!(cfg.basic.listen_addr, "0.0.0.0:8000");
    }
}
