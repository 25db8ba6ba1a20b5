use crate::platform::DEFAULT_PLATFORM_BASE_URL;
use crate::upload::DeletePolicy;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_APP_BASE_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_ACTIVITY_PAGE: &str = "https://www.openhumans.org/activity/seeq/";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {path}: {reason}")]
    FileNotFound { path: String, reason: String },

    #[error("Invalid session key: {0}")]
    InvalidSessionKey(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::error::Error),
}

/// Configuration file format (for deserialization)
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    client_id: String,

    #[serde(default)]
    client_secret: String,

    #[serde(default = "default_app_base_url")]
    app_base_url: String,

    #[serde(default = "default_platform_base_url")]
    platform_base_url: String,

    #[serde(default = "default_activity_page")]
    activity_page: String,

    /// 32-byte hex string
    session_key: String,

    #[serde(default)]
    delete_policy: DeletePolicy,

    #[serde(default)]
    member_store_path: Option<PathBuf>,

    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,

    #[serde(default = "default_max_upload_bytes")]
    max_upload_bytes: usize,

    #[serde(default = "default_port")]
    port: u16,
}

fn default_app_base_url() -> String {
    DEFAULT_APP_BASE_URL.to_string()
}

fn default_platform_base_url() -> String {
    DEFAULT_PLATFORM_BASE_URL.to_string()
}

fn default_activity_page() -> String {
    DEFAULT_ACTIVITY_PAGE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Application configuration.
///
/// Client credentials may be empty here; the code exchange refuses to run
/// without them.
#[derive(Clone)]
pub struct Config {
    /// Platform OAuth2 client ID
    pub client_id: String,

    /// Platform OAuth2 client secret
    pub client_secret: String,

    /// Public base URL of this application; the OAuth2 redirect lands on `/complete`
    pub app_base_url: String,

    /// Platform base URL
    pub platform_base_url: String,

    /// Project activity page shown to members after an upload
    pub activity_page: String,

    /// Session cookie encryption key (32 bytes)
    pub session_key: [u8; 32],

    pub delete_policy: DeletePolicy,

    /// JSON file holding member records
    pub member_store_path: PathBuf,

    /// Upper bound for each outbound platform call
    pub request_timeout_secs: u64,

    pub max_upload_bytes: usize,

    /// HTTP listen port
    pub port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("app_base_url", &self.app_base_url)
            .field("platform_base_url", &self.platform_base_url)
            .field("activity_page", &self.activity_page)
            .field("session_key", &"<redacted>")
            .field("delete_policy", &self.delete_policy)
            .field("member_store_path", &self.member_store_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    /// OAuth2 redirect URI registered with the platform
    pub fn redirect_uri(&self) -> String {
        format!("{}/complete", self.app_base_url.trim_end_matches('/'))
    }

    /// Load `.env`, then use environment variables when `SESSION_KEY` is set,
    /// otherwise the configuration file
    pub fn from_env_or_file() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        if std::env::var("SESSION_KEY").is_ok() {
            Self::from_env()
        } else {
            Self::from_file()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let session_key = lookup("SESSION_KEY").ok_or_else(|| {
            ConfigError::InvalidSessionKey("SESSION_KEY is not set".to_string())
        })?;

        let file = ConfigFile {
            client_id: lookup("OH_CLIENT_ID").unwrap_or_default(),
            client_secret: lookup("OH_CLIENT_SECRET").unwrap_or_default(),
            app_base_url: lookup("APP_BASE_URL").unwrap_or_else(default_app_base_url),
            platform_base_url: lookup("OH_BASE_URL").unwrap_or_else(default_platform_base_url),
            activity_page: lookup("OH_ACTIVITY_PAGE").unwrap_or_else(default_activity_page),
            session_key,
            delete_policy: match lookup("DELETE_POLICY") {
                Some(value) => value.parse().map_err(|reason| ConfigError::InvalidValue {
                    key: "DELETE_POLICY",
                    reason,
                })?,
                None => DeletePolicy::default(),
            },
            member_store_path: lookup("MEMBER_STORE_PATH").map(PathBuf::from),
            request_timeout_secs: parse_var(&lookup, "REQUEST_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_upload_bytes: parse_var(&lookup, "MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            port: parse_var(&lookup, "PORT")?.unwrap_or(DEFAULT_PORT),
        };

        Self::from_config_file(file)
    }

    /// Load configuration from file at ~/.config/oh-data-source/config.json
    pub fn from_file() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;

        let contents = fs::read_to_string(&config_path).map_err(|e| ConfigError::FileNotFound {
            path: config_path.display().to_string(),
            reason: format!(
                "{}. Either set SESSION_KEY and the OH_* variables in the environment, \
                 or create the file with client_id, client_secret and session_key.",
                e
            ),
        })?;

        Self::from_json(&contents)
    }

    /// Parse the JSON configuration file format
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config_file: ConfigFile = serde_json::from_str(contents)?;
        Self::from_config_file(config_file)
    }

    fn from_config_file(file: ConfigFile) -> Result<Self, ConfigError> {
        // Validate URLs
        let _ = url::Url::parse(&file.app_base_url)?;
        let _ = url::Url::parse(&file.platform_base_url)?;
        let _ = url::Url::parse(&file.activity_page)?;

        if file.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        let session_key = Self::parse_session_key(&file.session_key)?;

        Ok(Config {
            client_id: file.client_id,
            client_secret: file.client_secret,
            app_base_url: file.app_base_url,
            platform_base_url: file.platform_base_url,
            activity_page: file.activity_page,
            session_key,
            delete_policy: file.delete_policy,
            member_store_path: file.member_store_path.unwrap_or_else(default_member_store_path),
            request_timeout_secs: file.request_timeout_secs,
            max_upload_bytes: file.max_upload_bytes,
            port: file.port,
        })
    }

    /// Get the configuration file path: ~/.config/oh-data-source/config.json
    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .map(|home| home.join(".config/oh-data-source"))
            .ok_or_else(|| ConfigError::FileNotFound {
                path: "~/.config/oh-data-source/config.json".to_string(),
                reason: "Could not determine home directory".to_string(),
            })?;

        Ok(config_dir.join("config.json"))
    }

    /// Parse session key from hex string (must be 32 bytes)
    fn parse_session_key(hex_str: &str) -> Result<[u8; 32], ConfigError> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| ConfigError::InvalidSessionKey(format!("Invalid hex: {}", e)))?;

        if bytes.len() != 32 {
            return Err(ConfigError::InvalidSessionKey(format!(
                "Expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(key)
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn default_member_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("oh-data-source"))
        .unwrap_or_default()
        .join("members.json")
}
