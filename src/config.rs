use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "tsrelay.toml";
const CONFIG_PATH_ENV: &str = "TSRELAY_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_reconnect_backoff")]
    pub backoff: f64,
}

fn default_reconnect_initial_ms() -> u64 {
    500
}

fn default_reconnect_max_ms() -> u64 {
    10_000
}

fn default_reconnect_backoff() -> f64 {
    2.0
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_reconnect_initial_ms(),
            max_ms: default_reconnect_max_ms(),
            backoff: default_reconnect_backoff(),
        }
    }
}

fn default_max_live_gap_ms() -> u64 {
    2000
}

fn default_min_consecutive_for_switch() -> u64 {
    10
}

fn default_idr_timeout_ms() -> u64 {
    15_000
}

fn default_ts_queue_size() -> usize {
    2048
}

fn default_http_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_input_source_file() -> String {
    "input_source.json".to_string()
}

/// Service configuration: TOML file, every key overridable through a
/// `TSRELAY_`-prefixed environment variable. Precedence: env, file, default.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub live_udp_port: Option<u16>,
    #[serde(default)]
    pub live_tcp_port: Option<u16>,
    #[serde(default)]
    pub fallback_udp_port: Option<u16>,
    #[serde(default)]
    pub fallback_tcp_port: Option<u16>,
    #[serde(default)]
    pub drone_udp_port: Option<u16>,
    #[serde(default)]
    pub rtmp_url: Option<String>,
    #[serde(default = "default_max_live_gap_ms")]
    pub max_live_gap_ms: u64,
    #[serde(default = "default_min_consecutive_for_switch")]
    pub min_consecutive_for_switch: u64,
    #[serde(default = "default_idr_timeout_ms")]
    pub live_idr_timeout_ms: u64,
    #[serde(default = "default_idr_timeout_ms")]
    pub fallback_idr_timeout_ms: u64,
    #[serde(default)]
    pub udp_rcvbuf_size: Option<usize>,
    #[serde(default = "default_ts_queue_size")]
    pub ts_queue_size: usize,
    #[serde(default)]
    pub rtmp_pacing_us: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub notify_base_url: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_input_source_file")]
    pub input_source_file: String,
}

fn parse_env<T: std::str::FromStr>(field: &'static str, value: String) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        field,
        reason: format!("{e} (from environment)"),
    })
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        macro_rules! env_override {
            ($field:ident, opt $name:literal) => {
                if let Some(value) = get(concat!("TSRELAY_", $name)) {
                    self.$field = Some(parse_env($name, value)?);
                }
            };
            ($field:ident, $name:literal) => {
                if let Some(value) = get(concat!("TSRELAY_", $name)) {
                    self.$field = parse_env($name, value)?;
                }
            };
        }

        env_override!(live_udp_port, opt "LIVE_UDP_PORT");
        env_override!(live_tcp_port, opt "LIVE_TCP_PORT");
        env_override!(fallback_udp_port, opt "FALLBACK_UDP_PORT");
        env_override!(fallback_tcp_port, opt "FALLBACK_TCP_PORT");
        env_override!(drone_udp_port, opt "DRONE_UDP_PORT");
        env_override!(rtmp_url, opt "RTMP_URL");
        env_override!(max_live_gap_ms, "MAX_LIVE_GAP_MS");
        env_override!(min_consecutive_for_switch, "MIN_CONSECUTIVE_FOR_SWITCH");
        env_override!(live_idr_timeout_ms, "LIVE_IDR_TIMEOUT_MS");
        env_override!(fallback_idr_timeout_ms, "FALLBACK_IDR_TIMEOUT_MS");
        env_override!(udp_rcvbuf_size, opt "UDP_RCVBUF_SIZE");
        env_override!(ts_queue_size, "TS_QUEUE_SIZE");
        env_override!(rtmp_pacing_us, "RTMP_PACING_US");
        env_override!(http_port, "HTTP_PORT");
        env_override!(notify_base_url, opt "NOTIFY_BASE_URL");
        env_override!(log_level, "LOG_LEVEL");
        env_override!(input_source_file, "INPUT_SOURCE_FILE");
        if let Some(value) = get("TSRELAY_RECONNECT_INITIAL_MS") {
            self.reconnect.initial_ms = parse_env("RECONNECT_INITIAL_MS", value)?;
        }
        if let Some(value) = get("TSRELAY_RECONNECT_MAX_MS") {
            self.reconnect.max_ms = parse_env("RECONNECT_MAX_MS", value)?;
        }
        if let Some(value) = get("TSRELAY_RECONNECT_BACKOFF") {
            self.reconnect.backoff = parse_env("RECONNECT_BACKOFF", value)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rtmp_url.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(ConfigError::Invalid {
                field: "rtmp_url",
                reason: "a sink URL or path is required".to_string(),
            });
        }
        if self.live_udp_port.is_some() && self.live_tcp_port.is_some() {
            return Err(ConfigError::Invalid {
                field: "live_tcp_port",
                reason: "live source takes one transport, not both".to_string(),
            });
        }
        if self.fallback_udp_port.is_some() && self.fallback_tcp_port.is_some() {
            return Err(ConfigError::Invalid {
                field: "fallback_tcp_port",
                reason: "fallback source takes one transport, not both".to_string(),
            });
        }
        if self.fallback_udp_port.is_none() && self.fallback_tcp_port.is_none() {
            return Err(ConfigError::Invalid {
                field: "fallback_udp_port",
                reason: "a fallback source is required".to_string(),
            });
        }
        if self.live_udp_port.is_none()
            && self.live_tcp_port.is_none()
            && self.drone_udp_port.is_none()
        {
            return Err(ConfigError::Invalid {
                field: "live_udp_port",
                reason: "a live or drone source is required".to_string(),
            });
        }
        Ok(())
    }
}
