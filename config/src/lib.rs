//! Configuration loading and resolution for girder.
//!
//! Raw TOML deserialization structs (with `Option` fields) stay private to
//! this crate. [`GirderConfig::resolve`] turns them into validated
//! [`Settings`] at the parse boundary, so existence of a `Settings` value is
//! the proof of its validity.
//!
//! The config file lives at `~/.girder/config.toml` (overridable via the
//! `GIRDER_CONFIG` environment variable) and tolerates being absent:
//!
//! ```toml
//! [app]
//! name = "girder"
//!
//! [api]
//! base_url = "https://api.example.com"
//! timeout_seconds = 10
//! max_attempts = 3
//! auth_token = "${GIRDER_API_TOKEN}"
//! ```
//!
//! String values support `${ENV_VAR}` expansion, and `GIRDER_API_BASE_URL` /
//! `GIRDER_API_TOKEN` override their file counterparts outright.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fmt, fs};
use url::Url;

const DEFAULT_APP_NAME: &str = "girder";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_ATTEMPTS: u32 = 1;

/// Raw, unvalidated config file contents.
#[derive(Debug, Default, Deserialize)]
pub struct GirderConfig {
    pub app: Option<AppSection>,
    pub api: Option<ApiSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct ApiSection {
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_attempts: Option<u32>,
    pub auth_token: Option<String>,
}

// Manual Debug impl to prevent leaking tokens in logs.
impl fmt::Debug for ApiSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSection")
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_attempts", &self.max_attempts)
            .field(
                "auth_token",
                &if self.auth_token.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("api.base_url is required (config.toml [api] section or GIRDER_API_BASE_URL)")]
    MissingBaseUrl,
    #[error("api.base_url is not a valid http(s) URL: {value}")]
    InvalidBaseUrl { value: String },
    #[error("api.timeout_seconds must be greater than zero")]
    ZeroTimeout,
}

/// Fully-resolved, validated application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    app_name: String,
    api: ApiSettings,
}

impl Settings {
    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    #[must_use]
    pub fn api(&self) -> &ApiSettings {
        &self.api
    }
}

/// Validated outbound API settings consumed by the client.
#[derive(Clone)]
pub struct ApiSettings {
    base_url: String,
    timeout: Duration,
    max_attempts: u32,
    auth_token: Option<String>,
}

impl ApiSettings {
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }
}

impl fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSettings")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field(
                "auth_token",
                &if self.auth_token.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .finish()
    }
}

impl GirderConfig {
    /// Load the config file, tolerating its absence.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = match config_path() {
            Some(path) => path,
            None => return Ok(None),
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read config");
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to parse config");
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    /// Resolve raw sections into validated [`Settings`], applying environment
    /// overrides and `${VAR}` expansion.
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let base_override = env::var("GIRDER_API_BASE_URL").ok();
        let token_override = env::var("GIRDER_API_TOKEN").ok();
        self.resolve_with(base_override, token_override)
    }

    fn resolve_with(
        self,
        base_override: Option<String>,
        token_override: Option<String>,
    ) -> Result<Settings, ConfigError> {
        let app = self.app.unwrap_or_default();
        let api = self.api.unwrap_or_default();

        let raw_base = base_override
            .or(api.base_url)
            .ok_or(ConfigError::MissingBaseUrl)?;
        let base_url = expand_env_vars(&raw_base).trim().to_string();
        if base_url.is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        let parsed = Url::parse(&base_url)
            .map_err(|_| ConfigError::InvalidBaseUrl {
                value: base_url.clone(),
            })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl { value: base_url });
        }

        let timeout_seconds = api.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_seconds == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let max_attempts = api.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1);

        let auth_token = token_override
            .or(api.auth_token)
            .map(|raw| expand_env_vars(&raw).trim().to_string())
            .filter(|token| !token.is_empty());

        let app_name = app
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_APP_NAME.to_string());

        Ok(Settings {
            app_name,
            api: ApiSettings {
                base_url,
                timeout: Duration::from_secs(timeout_seconds),
                max_attempts,
                auth_token,
            },
        })
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("GIRDER_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".girder").join("config.toml"))
}

/// Expand `${VAR}` references against the process environment.
///
/// Unknown and empty variable names expand to the empty string; an unclosed
/// `${` is preserved as-is.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if !name.is_empty()
                    && let Ok(replacement) = env::var(name)
                {
                    out.push_str(&replacement);
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}
