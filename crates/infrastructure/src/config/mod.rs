//! Configuration loading.

mod settings_loader;

pub use settings_loader::{
    ENV_API_URL, ENV_MONITOR_INTERVAL_SECS, ENV_REFRESH_THRESHOLD_SECS, ENV_REFRESH_TIMEOUT_MS,
    ENV_REQUEST_TIMEOUT_MS, SettingsError, SettingsLoader,
};
