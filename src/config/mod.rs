/// 환경 변수 기반 설정
/// .env 파일이 있으면 먼저 읽는다.
// region:    --- Imports
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Config Error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is invalid: {value}")]
    Invalid { key: &'static str, value: String },
}
// endregion: --- Config Error

// region:    --- App Config
/// 애플리케이션 설정
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub kafka_brokers: String,
    pub kafka_group_prefix: String,
    pub http_addr: SocketAddr,
    pub finalize_interval: Duration,
    pub finalize_grace: Duration,
    pub finalize_batch_size: i64,
    pub outbox_interval: Duration,
    pub outbox_batch_size: i64,
    pub outbox_max_backoff: Duration,
    pub lock_timeout: Duration,
    pub publish_timeout: Duration,
}

impl AppConfig {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,
            kafka_brokers: env::var("KAFKA_BROKERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            kafka_group_prefix: env::var("KAFKA_GROUP_PREFIX")
                .unwrap_or_else(|_| "auction".to_string()),
            http_addr: parse_or("HTTP_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            finalize_interval: Duration::from_secs(parse_or("FINALIZE_INTERVAL_SECS", 5)?),
            finalize_grace: Duration::from_secs(parse_or("FINALIZE_GRACE_SECS", 30)?),
            finalize_batch_size: parse_or("FINALIZE_BATCH_SIZE", 50)?,
            outbox_interval: Duration::from_secs(parse_or("OUTBOX_INTERVAL_SECS", 10)?),
            outbox_batch_size: parse_or("OUTBOX_BATCH_SIZE", 100)?,
            outbox_max_backoff: Duration::from_secs(parse_or("OUTBOX_MAX_BACKOFF_SECS", 60)?),
            lock_timeout: Duration::from_millis(parse_or("LOCK_TIMEOUT_MS", 500)?),
            publish_timeout: Duration::from_millis(parse_or("PUBLISH_TIMEOUT_MS", 5000)?),
        })
    }
}

/// 값이 없으면 기본값, 있으면 파싱
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}
// endregion: --- App Config
