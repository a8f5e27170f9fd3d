// Server configuration: JSON file plus environment overrides

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "YCNODE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/ycnode.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Where the browser editor saves canvas files (`[input]`, the default).
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    /// `<model_dir>/<key>.onnx`
    pub model_dir: PathBuf,
    pub default_model: String,
    /// Download source per model key, used when the weights are missing.
    pub model_urls: HashMap<String, String>,
    pub use_gpu: bool,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub flow_history_per_node: usize,
    pub max_tracked_flows: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8188,
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            temp_dir: PathBuf::from("temp"),
            model_dir: PathBuf::from("models/matting"),
            default_model: "BiRefNet".to_string(),
            model_urls: HashMap::new(),
            use_gpu: false,
            log_dir: PathBuf::from("logs"),
            log_level: "info".to_string(),
            flow_history_per_node: 32,
            max_tracked_flows: 256,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read a config file. A missing file yields the defaults; a present but
/// malformed one is an error.
pub fn load_config_from(path: &Path) -> Result<ServerConfig, ConfigError> {
    if !path.exists() {
        return Ok(ServerConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Apply `YCNODE_HOST`, `YCNODE_PORT` and `YCNODE_MODEL_DIR`.
pub fn apply_env_overrides<F>(config: &mut ServerConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("YCNODE_HOST") {
        config.host = host;
    }
    if let Some(port) = lookup("YCNODE_PORT") {
        config.port = port.trim().parse().map_err(|_| ConfigError::Env {
            var: "YCNODE_PORT".to_string(),
            value: port.clone(),
        })?;
    }
    if let Some(dir) = lookup("YCNODE_MODEL_DIR") {
        config.model_dir = PathBuf::from(dir);
    }
    Ok(())
}

/// Load configuration from `$YCNODE_CONFIG` (or `config/ycnode.json`) and the
/// process environment.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = load_config_from(Path::new(&path))?;
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    Ok(config)
}
