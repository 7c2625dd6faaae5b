//! Client settings loading.
//!
//! Settings come from an optional JSON file, by default in the platform
//! config directory (`shopkeep/settings.json`), and are then overridden by
//! `SHOPKEEP_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use shopkeep_domain::ClientSettings;
use tokio::fs;
use url::Url;

use crate::serialization::{SerializationError, from_json_bytes};

/// Overrides `base_url`.
pub const ENV_API_URL: &str = "SHOPKEEP_API_URL";
/// Overrides `request_timeout_ms`.
pub const ENV_REQUEST_TIMEOUT_MS: &str = "SHOPKEEP_REQUEST_TIMEOUT_MS";
/// Overrides `refresh_timeout_ms`.
pub const ENV_REFRESH_TIMEOUT_MS: &str = "SHOPKEEP_REFRESH_TIMEOUT_MS";
/// Overrides `monitor_interval_secs`.
pub const ENV_MONITOR_INTERVAL_SECS: &str = "SHOPKEEP_MONITOR_INTERVAL_SECS";
/// Overrides `refresh_threshold_secs`.
pub const ENV_REFRESH_THRESHOLD_SECS: &str = "SHOPKEEP_REFRESH_THRESHOLD_SECS";

/// Error type for settings operations.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON for `ClientSettings`.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// An override could not be parsed, or a setting is out of range.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable or field name.
        name: &'static str,
        /// Raw value.
        value: String,
    },

    /// The resulting base URL is not an absolute URL.
    #[error("Invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl {
        /// The configured URL.
        url: String,
        /// Parser message.
        reason: String,
    },
}

/// Loads `ClientSettings` from file and environment.
#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    path: Option<PathBuf>,
}

impl SettingsLoader {
    /// Loader reading the default settings file, if present.
    #[must_use]
    pub const fn new() -> Self {
        Self { path: None }
    }

    /// Loader reading `path`, which must exist.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Returns the default settings file location, if available.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("shopkeep").join("settings.json"))
    }

    /// Loads the file, then applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an override is
    /// malformed, the base URL is invalid, or a timeout or interval is zero.
    pub async fn load(&self) -> Result<ClientSettings, SettingsError> {
        let mut settings = self.load_file().await?;
        Self::apply_overrides(&mut settings, |name| std::env::var(name).ok())?;
        Self::validate(&settings)?;
        tracing::debug!(base_url = %settings.base_url, "settings loaded");
        Ok(settings)
    }

    /// Loads the settings file alone.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load_file(&self) -> Result<ClientSettings, SettingsError> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(ClientSettings::default()),
            },
        };

        let content = fs::read(&path).await?;
        tracing::debug!(path = %path.display(), "reading settings file");
        Ok(from_json_bytes(&content)?)
    }

    /// Applies `SHOPKEEP_*` overrides found through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` for a non-numeric duration.
    pub fn apply_overrides(
        settings: &mut ClientSettings,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SettingsError> {
        if let Some(url) = lookup(ENV_API_URL) {
            settings.base_url = url;
        }
        if let Some(value) = parse_override(&lookup, ENV_REQUEST_TIMEOUT_MS)? {
            settings.request_timeout_ms = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_REFRESH_TIMEOUT_MS)? {
            settings.refresh_timeout_ms = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_MONITOR_INTERVAL_SECS)? {
            settings.monitor_interval_secs = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_REFRESH_THRESHOLD_SECS)? {
            settings.refresh_threshold_secs = value;
        }
        Ok(())
    }

    fn validate(settings: &ClientSettings) -> Result<(), SettingsError> {
        Url::parse(&settings.base_url).map_err(|e| SettingsError::InvalidBaseUrl {
            url: settings.base_url.clone(),
            reason: e.to_string(),
        })?;

        let durations = [
            ("request_timeout_ms", settings.request_timeout_ms),
            ("refresh_timeout_ms", settings.refresh_timeout_ms),
            ("monitor_interval_secs", settings.monitor_interval_secs),
        ];
        match durations.into_iter().find(|(_, value)| *value == 0) {
            Some((name, value)) => Err(SettingsError::InvalidValue {
                name,
                value: value.to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn parse_override<T: FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, SettingsError> {
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| SettingsError::InvalidValue { name, value })
        })
        .transpose()
}
