use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "/config/scalewatch.yaml";

/// Top-level configuration for the scalewatch agent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub scaling: ScalingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Where the metrics API lives.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    #[serde(default = "BackendSettings::default_base_url")]
    pub base_url: String,
}

impl BackendSettings {
    fn default_base_url() -> String {
        "http://localhost:5000".to_string()
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
        }
    }
}

/// Refresh cadence and the initial aggregation window.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Used when the backend does not advertise `prometheus_query_interval_seconds`.
    #[serde(
        default = "PollingConfig::default_interval",
        with = "humantime_serde"
    )]
    pub default_interval: Duration,
    #[serde(default = "PollingConfig::default_period")]
    pub default_period: String,
}

impl PollingConfig {
    const fn default_interval() -> Duration {
        Duration::from_secs(30)
    }

    fn default_period() -> String {
        "5m".to_string()
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            default_interval: Self::default_interval(),
            default_period: Self::default_period(),
        }
    }
}

/// Growth applied by scale-up recommendations, in percent.
#[derive(Debug, Clone, Deserialize)]
pub struct ScalingConfig {
    #[serde(default = "ScalingConfig::default_percentage")]
    pub memory_scaling_percentage: f64,
    #[serde(default = "ScalingConfig::default_percentage")]
    pub throughput_scaling_percentage: f64,
}

impl ScalingConfig {
    const fn default_percentage() -> f64 {
        20.0
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            memory_scaling_percentage: Self::default_percentage(),
            throughput_scaling_percentage: Self::default_percentage(),
        }
    }
}

/// HTTP listener configuration (bind address).
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_bind")]
    pub bind: String,
    #[serde(default = "HttpConfig::default_static_dir")]
    pub static_dir: String,
}

impl HttpConfig {
    fn default_bind() -> String {
        "0.0.0.0:8282".to_string()
    }

    fn default_static_dir() -> String {
        "frontend/dist".to_string()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            static_dir: Self::default_static_dir(),
        }
    }
}

/// Load configuration from YAML disk file, falling back to defaults + env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let target_path = if let Some(path) = path {
        path.to_path_buf()
    } else if let Ok(env_path) = env::var("SCALEWATCH_CONFIG") {
        PathBuf::from(env_path)
    } else {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    };

    let mut config = match try_parse_file(&target_path)? {
        Some(cfg) => {
            info!(path = %target_path.display(), "loaded configuration");
            cfg
        }
        None => {
            warn!(path = %target_path.display(), "config file not found; using built-in defaults");
            AppConfig::default()
        }
    };

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

fn try_parse_file(path: &Path) -> Result<Option<AppConfig>> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let cfg = serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse YAML config at {}", path.display()))?;
            Ok(Some(cfg))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read config file at {}", path.display()))
        }
    }
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(url) = env::var("SCALEWATCH_BACKEND_URL") {
        if !url.trim().is_empty() {
            config.backend.base_url = url;
        }
    }

    if let Ok(bind) = env::var("SCALEWATCH_BIND") {
        if !bind.trim().is_empty() {
            config.http.bind = bind;
        }
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.backend.base_url.trim().is_empty() {
        bail!("backend.base_url must point at the metrics API (or set SCALEWATCH_BACKEND_URL)");
    }
    if config.polling.default_interval.is_zero() {
        bail!("polling.default_interval must be greater than zero");
    }
    Ok(())
}
