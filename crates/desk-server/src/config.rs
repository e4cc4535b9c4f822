use std::{
    env,
    net::{AddrParseError, SocketAddr},
    time::Duration,
};

use reqwest::Url;
use runtime::{backend::DEFAULT_FEED_PORT, logging::DEFAULT_LOG_FILTER, DeskSettings};
use thiserror::Error;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_BACKEND_ORIGIN: &str = "http://localhost:8000";
const DEFAULT_API_BASE_PATH: &str = "/api";
const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_STOP_RETRY_DELAY_MS: u64 = 2_000;

const LISTEN_ADDR_KEY: &str = "DESK_LISTEN_ADDR";
const BACKEND_ORIGIN_KEY: &str = "DESK_BACKEND_ORIGIN";
const API_BASE_PATH_KEY: &str = "DESK_API_BASE_PATH";
const FEED_PORT_KEY: &str = "DESK_FEED_PORT";
const POLL_INTERVAL_KEY: &str = "DESK_POLL_INTERVAL_MS";
const POLL_TIMEOUT_KEY: &str = "DESK_POLL_TIMEOUT_MS";
const COMMAND_TIMEOUT_KEY: &str = "DESK_COMMAND_TIMEOUT_MS";
const STOP_RETRY_DELAY_KEY: &str = "DESK_STOP_RETRY_DELAY_MS";
const LOG_KEY: &str = "DESK_LOG";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub backend_origin: Url,
    pub api_base_path: String,
    pub feed_port: u16,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub command_timeout: Duration,
    pub stop_retry_delay: Duration,
    pub log_filter: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{LISTEN_ADDR_KEY} is not a valid socket address: {0}")]
    InvalidListenAddr(#[source] AddrParseError),
    #[error("{BACKEND_ORIGIN_KEY} must be an http or https url, got {0:?}")]
    InvalidBackendOrigin(String),
    #[error("{API_BASE_PATH_KEY} must be empty or start with '/', got {0:?}")]
    InvalidApiBasePath(String),
    #[error("{FEED_PORT_KEY} must be a port number between 1 and 65535")]
    InvalidFeedPort,
    #[error("{0} must be a positive number of milliseconds")]
    InvalidMillis(&'static str),
    #[error("{0} contains non-unicode data")]
    NonUnicode(&'static str),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr: SocketAddr = match read_var(LISTEN_ADDR_KEY)? {
            Some(value) => value.parse().map_err(ConfigError::InvalidListenAddr)?,
            None => DEFAULT_LISTEN_ADDR.parse().map_err(ConfigError::InvalidListenAddr)?,
        };

        let origin = read_var(BACKEND_ORIGIN_KEY)?.unwrap_or_else(|| DEFAULT_BACKEND_ORIGIN.to_owned());
        let backend_origin = match Url::parse(origin.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => url,
            _ => return Err(ConfigError::InvalidBackendOrigin(origin)),
        };

        let api_base_path =
            read_var(API_BASE_PATH_KEY)?.unwrap_or_else(|| DEFAULT_API_BASE_PATH.to_owned());
        if !(api_base_path.is_empty() || api_base_path.starts_with('/')) {
            return Err(ConfigError::InvalidApiBasePath(api_base_path));
        }

        let feed_port = match read_var(FEED_PORT_KEY)? {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or(ConfigError::InvalidFeedPort)?,
            None => DEFAULT_FEED_PORT,
        };

        let log_filter = read_var(LOG_KEY)?
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned());

        Ok(Self {
            listen_addr,
            backend_origin,
            api_base_path,
            feed_port,
            poll_interval: read_millis(POLL_INTERVAL_KEY, DEFAULT_POLL_INTERVAL_MS)?,
            poll_timeout: read_millis(POLL_TIMEOUT_KEY, DEFAULT_POLL_TIMEOUT_MS)?,
            command_timeout: read_millis(COMMAND_TIMEOUT_KEY, DEFAULT_COMMAND_TIMEOUT_MS)?,
            stop_retry_delay: read_millis(STOP_RETRY_DELAY_KEY, DEFAULT_STOP_RETRY_DELAY_MS)?,
            log_filter,
        })
    }

    pub fn desk_settings(&self) -> DeskSettings {
        DeskSettings {
            poll_interval: self.poll_interval,
            poll_timeout: self.poll_timeout,
            command_timeout: self.command_timeout,
            stop_retry_delay: self.stop_retry_delay,
            ..DeskSettings::default()
        }
    }
}

fn read_var(key: &'static str) -> Result<Option<String>, ConfigError> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::NonUnicode(key)),
    }
}

fn read_millis(key: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    match read_var(key)? {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or(ConfigError::InvalidMillis(key)),
        None => Ok(Duration::from_millis(default_ms)),
    }
}
