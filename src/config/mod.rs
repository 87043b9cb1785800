use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// How long a dispatch waits for handlers to signal completion.
    /// `None` (or 0) waits indefinitely.
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: Option<u64>,
    /// Event names the demo binary registers its handlers for.
    /// Empty means every name seen on input.
    #[serde(default = "default_event_names")]
    pub event_names: Vec<String>,
}

impl DispatcherConfig {
    /// The handler timeout as a duration, if one is set
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

// Default functions
fn default_handler_timeout_ms() -> Option<u64> {
    std::env::var("DISPATCHER_HANDLER_TIMEOUT_MS")
        .ok()
        .and_then(|val| val.parse().ok())
}

fn default_event_names() -> Vec<String> {
    std::env::var("DISPATCHER_EVENT_NAMES")
        .map(|val| parse_event_names(&val))
        .unwrap_or_default()
}

/// Split a comma-separated list of event names, ignoring blanks
pub fn parse_event_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: default_handler_timeout_ms(),
            event_names: default_event_names(),
        }
    }
}

/// Load the configuration.
///
/// Reads the file named by `DISPATCHER_CONFIG_PATH` when set, otherwise
/// falls back to defaults taken from the environment.
pub async fn load_config() -> Result<DispatcherConfig> {
    match get_config_path() {
        Some(path) => load_config_from(&path).await,
        None => {
            debug!("No configuration file set, using defaults");
            Ok(DispatcherConfig::default())
        }
    }
}

/// Load configuration from `path`, using defaults when the file does not
/// exist. Nothing is written.
pub async fn load_config_from(path: &Path) -> Result<DispatcherConfig> {
    if !path.exists() {
        debug!(
            "Configuration file {} not found, using defaults",
            path.display()
        );
        return Ok(DispatcherConfig::default());
    }

    read_config(path).await
}

/// Get the path to the configuration file
fn get_config_path() -> Option<PathBuf> {
    std::env::var("DISPATCHER_CONFIG_PATH")
        .ok()
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

/// Load configuration from file or create default
pub async fn load_or_create_config(path: &Path) -> Result<DispatcherConfig> {
    if !path.exists() {
        let default_config = DispatcherConfig::default();
        save_config(path, &default_config).await?;
        info!("Created default configuration at {}", path.display());
        return Ok(default_config);
    }

    read_config(path).await
}

async fn read_config(path: &Path) -> Result<DispatcherConfig> {
    let config_str = fs::read_to_string(path).await?;
    let config: DispatcherConfig = serde_json::from_str(&config_str)?;
    debug!("Loaded configuration from {}", path.display());

    Ok(config)
}

/// Save configuration to file
pub async fn save_config(path: &Path, config: &DispatcherConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(path, config_str).await?;
    debug!("Saved configuration to {}", path.display());

    Ok(())
}
