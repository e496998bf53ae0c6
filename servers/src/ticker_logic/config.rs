use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "server_ticker.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Periodic timestamp WebSocket push server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "TICKER_HOST", help = "Address to bind for client connections.")]
    pub host: Option<String>,

    #[clap(long, env = "TICKER_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "TICKER_ENDPOINT", help = "WebSocket endpoint path clients connect to.")]
    pub endpoint: Option<String>,

    #[clap(long, env = "TICKER_INTERVAL_MS", help = "Milliseconds between two timestamps on a stream.")]
    pub interval_ms: Option<u64>,

    #[clap(long, env = "TICKER_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "TICKER_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "TICKER_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error, off).")]
    pub log_level: Option<String>,

    #[clap(long, env = "TICKER_SHUTDOWN_GRACE_MS", help = "Milliseconds TLS connections get to drain on shutdown.")]
    pub shutdown_grace_ms: Option<u64>,

    #[clap(long, env = "TLS_CERT_PATH", help = "Path to the TLS certificate file.")]
    pub tls_cert_path: Option<PathBuf>,

    #[clap(long, env = "TLS_KEY_PATH", help = "Path to the TLS private key file.")]
    pub tls_key_path: Option<PathBuf>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            endpoint: other.endpoint.or(self.endpoint),
            interval_ms: other.interval_ms.or(self.interval_ms),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            shutdown_grace_ms: other.shutdown_grace_ms.or(self.shutdown_grace_ms),
            tls_cert_path: other.tls_cert_path.or(self.tls_cert_path),
            tls_key_path: other.tls_key_path.or(self.tls_key_path),
        }
    }

    fn defaults() -> Config {
        Config {
            host: Some("0.0.0.0".to_string()),
            port: Some(5000),
            endpoint: Some("/chat".to_string()),
            interval_ms: Some(5000),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            shutdown_grace_ms: Some(5000),
            ..Default::default()
        }
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == Some(0) {
            bail!("intervalMs must be greater than zero");
        }
        if !self.endpoint().starts_with('/') {
            bail!("endpoint must start with '/', got {:?}", self.endpoint());
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            log::warn!("Only one of TLS certificate and key is set. Serving plain WebSocket.");
        }
        Ok(())
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or("0.0.0.0")
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(5000)
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or("/chat")
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.unwrap_or(5000))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms.unwrap_or(5000))
    }
}

pub fn load_config() -> Result<Config> {
    load_config_with(Config::parse())
}

/// Layers defaults, the JSON config file and the already parsed CLI/env values.
pub fn load_config_with(cli_args: Config) -> Result<Config> {
    // 1. Load defaults
    let mut current_config = Config::defaults();

    // 2. Load from config file if present. The CLI may point at another file.
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if config_file_path.exists() {
        let config_str = fs::read_to_string(&config_file_path)
            .with_context(|| format!("Failed to read config file: {}", config_file_path.display()))?;
        let file_config = serde_json::from_str::<Config>(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_file_path.display()))?;
        current_config = current_config.merge(file_config);
    } else if cli_args.config_path.is_some() {
        bail!("Config file not found at {}", config_file_path.display());
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    // 3. Override with environment variables and CLI arguments
    //    clap::Parser already folded env vars into the CLI values.
    current_config = current_config.merge(cli_args);
    current_config.validate()?;

    Ok(current_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp config");
        file.write_all(json.as_bytes()).expect("Failed to write temp config");
        file
    }

    #[test]
    fn test_defaults_and_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.conf");
        // An explicit but missing path is an error; the default name is not.
        assert!(load_config_with(Config { config_path: Some(missing), ..Default::default() }).is_err());

        let config = Config::defaults();
        assert_eq!(config.port(), 5000);
        assert_eq!(config.endpoint(), "/chat");
        assert_eq!(config.interval(), Duration::from_secs(5));
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_file_overrides_defaults_and_cli_overrides_file() {
        let file = write_config(r#"{ "port": 6100, "intervalMs": 250, "endpoint": "/ticks" }"#);
        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            port: Some(7200),
            ..Default::default()
        };

        let config = load_config_with(cli).expect("config should load");

        assert_eq!(config.port(), 7200);
        assert_eq!(config.interval(), Duration::from_millis(250));
        assert_eq!(config.endpoint(), "/ticks");
        assert_eq!(config.host(), "0.0.0.0");
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let file = write_config(r#"{ "intervalMs": 0 }"#);
        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };

        let err = load_config_with(cli).unwrap_err();
        assert!(err.to_string().contains("intervalMs"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let file = write_config("{ not json");
        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };

        assert!(load_config_with(cli).is_err());
    }

    #[test]
    fn test_endpoint_must_be_a_path() {
        let config = Config {
            endpoint: Some("chat".to_string()),
            ..Config::defaults()
        };
        assert!(config.validate().is_err());
    }
}
