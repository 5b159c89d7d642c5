use anyhow::{Context, Result};
use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use shm_client::auth::TelegramSettings;
use std::path::{Path, PathBuf};

const CONFIG_PATHS: [&str; 2] = ["/etc/shm-portal/portal.toml", "./portal.toml"];

#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    pub app_name: String,
    /// Backend origin; `/shm/v1` is appended by the client.
    pub api_url: String,
    /// Holds `cookies.json`.
    pub state_dir: PathBuf,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_name: Option<String>,
    #[serde(default)]
    pub bot_auth_enable: bool,
    #[serde(default)]
    pub webapp_auth_enable: bool,
    #[serde(default = "default_profile")]
    pub profile: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_name: None,
            bot_auth_enable: false,
            webapp_auth_enable: false,
            profile: default_profile(),
        }
    }
}

fn default_profile() -> String {
    "telegram_bot".to_string()
}

impl PortalConfig {
    /// Defaults, then the first TOML file found (or `explicit`), then
    /// `SHM_*` environment variables, e.g. `SHM_TELEGRAM__BOT_NAME`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("app_name", "SHM")?
            .set_default("api_url", "http://localhost:8081")?
            .set_default("state_dir", ".shm-portal")?
            .set_default("telegram.bot_auth_enable", false)?
            .set_default("telegram.webapp_auth_enable", false)?
            .set_default("telegram.profile", default_profile())?;

        match explicit {
            Some(path) => {
                tracing::info!("Loading config from {}", path.display());
                builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            }
            None => {
                for path in CONFIG_PATHS {
                    if Path::new(path).exists() {
                        tracing::info!("Loading config from {}", path);
                        builder = builder.add_source(File::new(path, FileFormat::Toml));
                        break;
                    }
                }
            }
        }

        builder
            .add_source(
                Environment::with_prefix("SHM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn telegram_settings(&self) -> TelegramSettings {
        TelegramSettings {
            bot_name: self.telegram.bot_name.clone(),
            bot_auth_enable: self.telegram.bot_auth_enable,
            webapp_auth_enable: self.telegram.webapp_auth_enable,
            profile: self.telegram.profile.clone(),
        }
    }

    pub fn cookie_path(&self) -> PathBuf {
        self.state_dir.join("cookies.json")
    }
}
