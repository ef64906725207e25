use thiserror::Error;

use crate::config_env::{env_or_default, parse_list_env, parse_u64_env, require_env};
use crate::schedule::parse_local_time_hhmm;
use crate::timezone::{DEFAULT_DISPLAY_TIME_ZONE, normalize_time_zone};

const DEFAULT_MESSAGING_API_BASE_URL: &str = "https://api.line.me";
const DEFAULT_SESSION_TTL_SECONDS: u64 = 86_400;
const DEFAULT_SESSION_SWEEP_SECONDS: u64 = 300;
const DEFAULT_REMINDER_LOCAL_TIME: &str = "06:00";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub channel_secret: String,
    pub channel_access_token: String,
    pub messaging_api_base_url: String,
    pub records_api_base_url: String,
    pub records_api_token: String,
    pub records_table_id: String,
    pub session_ttl_seconds: u64,
    pub session_sweep_seconds: u64,
    pub display_time_zone: String,
    pub reminder_recipients: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub channel_access_token: String,
    pub messaging_api_base_url: String,
    pub records_api_base_url: String,
    pub records_api_token: String,
    pub records_table_id: String,
    pub reminder_local_time_minutes: u16,
    pub reminder_time_zone: String,
    pub display_time_zone: String,
    pub reminder_recipients: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: env_or_default("API_BIND_ADDR", "127.0.0.1:8080"),
            channel_secret: require_env("CHANNEL_SECRET")?,
            channel_access_token: require_env("CHANNEL_ACCESS_TOKEN")?,
            messaging_api_base_url: env_or_default(
                "MESSAGING_API_BASE_URL",
                DEFAULT_MESSAGING_API_BASE_URL,
            ),
            records_api_base_url: require_env("RECORDS_API_BASE_URL")?,
            records_api_token: require_env("RECORDS_API_TOKEN")?,
            records_table_id: require_env("RECORDS_TABLE_ID")?,
            session_ttl_seconds: parse_u64_env("SESSION_TTL_SECONDS", DEFAULT_SESSION_TTL_SECONDS)?,
            session_sweep_seconds: parse_u64_env(
                "SESSION_SWEEP_SECONDS",
                DEFAULT_SESSION_SWEEP_SECONDS,
            )?,
            display_time_zone: validated_time_zone("DISPLAY_TIME_ZONE")?,
            reminder_recipients: parse_list_env("REMINDER_RECIPIENTS"),
        })
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let reminder_local_time = env_or_default("REMINDER_LOCAL_TIME", DEFAULT_REMINDER_LOCAL_TIME);
        let reminder_local_time_minutes =
            parse_local_time_hhmm(&reminder_local_time).ok_or_else(|| {
                ConfigError::InvalidConfiguration(format!(
                    "REMINDER_LOCAL_TIME must be HH:MM, got '{reminder_local_time}'"
                ))
            })?;

        Ok(Self {
            channel_access_token: require_env("CHANNEL_ACCESS_TOKEN")?,
            messaging_api_base_url: env_or_default(
                "MESSAGING_API_BASE_URL",
                DEFAULT_MESSAGING_API_BASE_URL,
            ),
            records_api_base_url: require_env("RECORDS_API_BASE_URL")?,
            records_api_token: require_env("RECORDS_API_TOKEN")?,
            records_table_id: require_env("RECORDS_TABLE_ID")?,
            reminder_local_time_minutes,
            reminder_time_zone: validated_time_zone("REMINDER_TIME_ZONE")?,
            display_time_zone: validated_time_zone("DISPLAY_TIME_ZONE")?,
            reminder_recipients: parse_list_env("REMINDER_RECIPIENTS"),
        })
    }
}

fn validated_time_zone(key: &str) -> Result<String, ConfigError> {
    let raw = env_or_default(key, DEFAULT_DISPLAY_TIME_ZONE);
    normalize_time_zone(&raw).ok_or_else(|| {
        ConfigError::InvalidConfiguration(format!("{key} is not a valid IANA timezone: '{raw}'"))
    })
}
