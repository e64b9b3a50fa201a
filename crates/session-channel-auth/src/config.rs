//! Server and auth configuration loaded from TOML.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding `server.baseUrlPath`.
pub const BASE_URL_PATH_ENV: &str = "SESSION_CHANNEL_SERVER_BASE_URL_PATH";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// `[auth]` section. Absent when login is not set up.
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

/// `[server]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Prefix for every served path, e.g. `"myapp"`. Empty by default.
    #[serde(default)]
    pub base_url_path: String,
}

/// `[auth]` section.
///
/// Named providers are sub-tables (`[auth.google]`). The `default` provider
/// may instead put its keys directly in `[auth]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    pub redirect_uri: Option<String>,
    pub cookie_secret: Option<String>,
    #[serde(flatten)]
    entries: BTreeMap<String, toml::Value>,
}

/// Credentials of one identity provider.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProviderCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub server_metadata_url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl Config {
    /// Load from a TOML file, then apply environment overrides.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env();
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load from `path` if it exists, else use defaults (plus env overrides).
    ///
    /// # Errors
    /// Returns error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            let mut config = Self::default();
            config.apply_env();
            Ok(config)
        }
    }

    /// Parse TOML text without consulting the environment.
    ///
    /// # Errors
    /// Returns error on invalid TOML or mistyped fields.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(&mut self) {
        if let Ok(base) = std::env::var(BASE_URL_PATH_ENV) {
            self.server.base_url_path = base;
        }
    }
}

/// Keys that make up a provider definition.
pub(crate) const PROVIDER_KEYS: [&str; 3] = ["client_id", "client_secret", "server_metadata_url"];

/// Name of the provider whose keys may live directly in `[auth]`.
pub const DEFAULT_PROVIDER: &str = "default";

impl AuthConfig {
    /// Credentials for `name`.
    ///
    /// `Ok(None)` if no such provider is declared.
    ///
    /// # Errors
    /// Returns the deserialization error of a mistyped provider table.
    pub fn provider(&self, name: &str) -> Result<Option<ProviderCredentials>, toml::de::Error> {
        match self.entries.get(name) {
            Some(value @ toml::Value::Table(_)) => value.clone().try_into().map(Some),
            Some(_) => Ok(None),
            None if name == DEFAULT_PROVIDER => Ok(self.inline_default()),
            None => Ok(None),
        }
    }

    fn inline_default(&self) -> Option<ProviderCredentials> {
        let field = |key: &str| {
            self.entries
                .get(key)
                .and_then(toml::Value::as_str)
                .map(str::to_owned)
        };
        if !PROVIDER_KEYS.iter().any(|k| self.entries.contains_key(*k)) {
            return None;
        }
        Some(ProviderCredentials {
            client_id: field("client_id"),
            client_secret: field("client_secret"),
            server_metadata_url: field("server_metadata_url"),
            extra: BTreeMap::new(),
        })
    }

    /// Names of declared providers, in order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, v)| v.is_table())
            .map(|(k, _)| k.clone())
            .collect();
        if !self.entries.contains_key(DEFAULT_PROVIDER) && self.inline_default().is_some() {
            names.insert(0, DEFAULT_PROVIDER.to_owned());
        }
        names
    }
}
