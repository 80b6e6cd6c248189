use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Upper bound on hydration attempts per (media type, message id).
pub const MAX_HYDRATION_ATTEMPTS: u32 = 6;
/// Lock hold after a failed attempt before a re-render may retry.
pub const RETRY_COOLDOWN_SECS: u64 = 4;
/// Lock hold after a successful hydration to absorb duplicate renders.
pub const SUCCESS_COOLDOWN_SECS: u64 = 60;
/// Default Evolution instance (and blob-store namespace).
pub const DEFAULT_INSTANCE: &str = "default";

/// Top-level config (wadesk.toml + WADESK_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WadeskConfig {
    #[serde(default)]
    pub evolution: EvolutionConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Credentials for the Evolution-compatible gateway.
///
/// Both `base_url` and `api_key` must be non-empty for remote lookups and
/// outbound sends to be attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_instance")]
    pub instance: String,
}

impl EvolutionConfig {
    pub fn has_credentials(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            instance: default_instance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_cooldown")]
    pub retry_cooldown_secs: u64,
    #[serde(default = "default_success_cooldown")]
    pub success_cooldown_secs: u64,
    /// Re-run failed lookups from the hydrator itself instead of waiting
    /// for the next render to reschedule them.
    #[serde(default = "bool_true")]
    pub auto_retry: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_HYDRATION_ATTEMPTS,
            retry_cooldown_secs: RETRY_COOLDOWN_SECS,
            success_cooldown_secs: SUCCESS_COOLDOWN_SECS,
            auto_retry: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Whether the console is served over HTTPS; decides the scheme
    /// inferred for bare links like `www.example.com`.
    #[serde(default = "bool_true")]
    pub secure_page: bool,
    #[serde(default = "default_preview_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            secure_page: true,
            timeout_secs: default_preview_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_instance() -> String {
    DEFAULT_INSTANCE.to_string()
}
fn default_max_attempts() -> u32 {
    MAX_HYDRATION_ATTEMPTS
}
fn default_retry_cooldown() -> u64 {
    RETRY_COOLDOWN_SECS
}
fn default_success_cooldown() -> u64 {
    SUCCESS_COOLDOWN_SECS
}
fn default_preview_timeout() -> u64 {
    8
}
fn default_user_agent() -> String {
    format!("wadesk/{}", env!("CARGO_PKG_VERSION"))
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.wadesk/wadesk.db", home)
}

impl WadeskConfig {
    /// Load config from a TOML file with WADESK_* env var overrides.
    ///
    /// Sections are separated by a double underscore so that snake_case keys
    /// survive: `WADESK_EVOLUTION__BASE_URL=http://evo:8080`. A missing file
    /// is not an error since every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: WadeskConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("WADESK_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.wadesk/wadesk.toml", home)
}
