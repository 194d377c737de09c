// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend endpoints
    pub api: ApiConfig,

    /// Fetching, retry and polling behaviour
    pub query: QueryConfig,

    /// Trade export settings
    pub export: ExportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP base URL (e.g., "http://localhost:8000")
    pub base_url: String,

    /// Push channel WebSocket URL
    pub ws_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Delay before reconnecting the push channel
    pub reconnect_delay_secs: u64,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Automatic retries before a fetch failure is surfaced
    pub retries: u32,

    /// Delay before the first retry, doubled on each further attempt
    pub retry_delay_ms: u64,

    /// Trading status polling interval
    pub poll_status_secs: u64,

    /// Open positions polling interval
    pub poll_positions_secs: u64,

    /// Trade history polling interval
    pub poll_trades_secs: u64,

    /// Backend health polling interval
    pub poll_health_secs: u64,
}

impl QueryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.poll_status_secs.max(1))
    }

    pub fn positions_interval(&self) -> Duration {
        Duration::from_secs(self.poll_positions_secs.max(1))
    }

    pub fn trades_interval(&self) -> Duration {
        Duration::from_secs(self.poll_trades_secs.max(1))
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.poll_health_secs.max(1))
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay_ms: 500,
            poll_status_secs: 5,
            poll_positions_secs: 10,
            poll_trades_secs: 30,
            poll_health_secs: 15,
        }
    }
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory exported files are written to
    pub dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let defaults = Config::default();

        let base_url = env::var("API_BASE_URL").unwrap_or(defaults.api.base_url);
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "API_BASE_URL must be an http(s) URL, got {}",
                base_url
            )));
        }

        let api_config = ApiConfig {
            base_url,
            ws_url: env::var("WS_URL").unwrap_or(defaults.api.ws_url),
            timeout_secs: env_or("API_TIMEOUT_SECS", defaults.api.timeout_secs),
            reconnect_delay_secs: env_or(
                "WS_RECONNECT_DELAY_SECS",
                defaults.api.reconnect_delay_secs,
            ),
        };

        let query_config = QueryConfig {
            retries: env_or("QUERY_RETRIES", defaults.query.retries),
            retry_delay_ms: env_or("QUERY_RETRY_DELAY_MS", defaults.query.retry_delay_ms),
            poll_status_secs: env_or("POLL_STATUS_SECS", defaults.query.poll_status_secs),
            poll_positions_secs: env_or(
                "POLL_POSITIONS_SECS",
                defaults.query.poll_positions_secs,
            ),
            poll_trades_secs: env_or("POLL_TRADES_SECS", defaults.query.poll_trades_secs),
            poll_health_secs: env_or("POLL_HEALTH_SECS", defaults.query.poll_health_secs),
        };

        let export_config = ExportConfig {
            dir: env::var("EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.export.dir),
        };

        let logging_config = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            to_file: env_or("LOG_TO_FILE", false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        Ok(Config {
            api: api_config,
            query: query_config,
            export: export_config,
            logging: logging_config,
        })
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!("Failed to open config file: {}", e))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file: {}", e))
        })?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            AppError::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, contents).map_err(|e| {
            AppError::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path).map_err(|e| {
                    AppError::Config(format!("Failed to create log file: {}", e))
                })?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        builder.init();

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:8000".to_string(),
                ws_url: "ws://localhost:8000/ws".to_string(),
                timeout_secs: 10,
                reconnect_delay_secs: 5,
            },
            query: QueryConfig::default(),
            export: ExportConfig {
                dir: PathBuf::from("."),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: false,
                file_path: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn status_polls_fastest_and_trades_slowest() {
        let query = QueryConfig::default();
        assert!(query.status_interval() < query.positions_interval());
        assert!(query.positions_interval() < query.trades_interval());
    }

    #[test]
    fn file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.query.retries = 7;
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.query.retries, 7);
        assert_eq!(loaded.api.base_url, config.api.base_url);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::from_file("/nonexistent/fx_dashboard.json").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
