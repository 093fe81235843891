//! Configuration module
//!
//! Loads configuration from environment variables.

use chrono::Duration;
use std::env;
use std::str::FromStr;

/// Upper bound for OTP lifetime and rate-limit window (one day)
const MAX_OTP_POLICY_SECS: i64 = 86_400;

/// Upper bound for expired OTP retention (one year)
const MAX_RETENTION_SECS: i64 = 365 * 86_400;

/// OTP policy consumed by the workflow handlers
pub trait OtpConfig: Send + Sync {
    /// Number of digits in a generated code
    fn otp_length(&self) -> usize;

    /// Wrong codes tolerated before verification is locked
    fn otp_max_attempts(&self) -> u32;

    /// Time between issuance and expiry
    fn otp_lifetime(&self) -> Duration;

    /// OTPs allowed per phone or origin inside the rate-limit window
    fn otp_rate_limit_max_requests(&self) -> u32;

    fn otp_rate_limit_window(&self) -> Duration;
}

/// OTP settings
#[derive(Debug, Clone, PartialEq)]
pub struct OtpSettings {
    pub length: usize,
    pub max_attempts: u32,
    pub lifetime: Duration,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            length: 4,
            max_attempts: 3,
            lifetime: Duration::seconds(300),
            rate_limit_max_requests: 5,
            rate_limit_window: Duration::seconds(600),
        }
    }
}

impl OtpConfig for OtpSettings {
    fn otp_length(&self) -> usize {
        self.length
    }

    fn otp_max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn otp_lifetime(&self) -> Duration {
        self.lifetime
    }

    fn otp_rate_limit_max_requests(&self) -> u32 {
        self.rate_limit_max_requests
    }

    fn otp_rate_limit_window(&self) -> Duration {
        self.rate_limit_window
    }
}

/// Snowflake id generator settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnowflakeSettings {
    /// Custom epoch in milliseconds since the Unix epoch
    pub epoch_ms: u64,
    pub node_id: u64,
    pub worker_id: u64,
}

impl Default for SnowflakeSettings {
    fn default() -> Self {
        Self {
            // 2021-01-01 00:00:00 UTC
            epoch_ms: 1_609_459_200_000,
            node_id: 1,
            worker_id: 1,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    /// Key for hashing OTP codes
    pub hmac_secret_key: Vec<u8>,

    pub snowflake: SnowflakeSettings,

    pub otp: OtpSettings,

    /// How long expired, unused OTPs are kept before purging
    pub otp_retention: Duration,

    /// Interval between maintenance runs
    pub otp_cleanup_interval: std::time::Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let hmac_secret_key = match lookup("HMAC_SECRET_KEY") {
            Some(hex_key) => {
                let key = hex::decode(hex_key.trim())
                    .map_err(|_| ConfigError::InvalidValue("HMAC_SECRET_KEY"))?;
                if key.len() < 16 {
                    return Err(ConfigError::InvalidValue("HMAC_SECRET_KEY"));
                }
                key
            }
            None if environment == "production" => {
                return Err(ConfigError::MissingEnv("HMAC_SECRET_KEY"));
            }
            None => {
                tracing::warn!("HMAC_SECRET_KEY not set, using a random per-process key");
                random_key()
            }
        };

        let defaults = SnowflakeSettings::default();
        let snowflake = SnowflakeSettings {
            epoch_ms: parse_or(&lookup, "SNOWFLAKE_EPOCH_MS", defaults.epoch_ms)?,
            node_id: parse_or(&lookup, "SNOWFLAKE_NODE_ID", defaults.node_id)?,
            worker_id: parse_or(&lookup, "SNOWFLAKE_WORKER_ID", defaults.worker_id)?,
        };

        let otp = OtpSettings {
            length: parse_or(&lookup, "OTP_LENGTH", 4usize)?,
            max_attempts: parse_or(&lookup, "OTP_MAX_ATTEMPTS", 3u32)?,
            lifetime: parse_secs(&lookup, "OTP_LIFETIME_SECS", 300, MAX_OTP_POLICY_SECS)?,
            rate_limit_max_requests: parse_or(&lookup, "OTP_RATE_LIMIT_MAX_REQUESTS", 5u32)?,
            rate_limit_window: parse_secs(
                &lookup,
                "OTP_RATE_LIMIT_WINDOW_SECS",
                600,
                MAX_OTP_POLICY_SECS,
            )?,
        };

        if otp.length == 0 || otp.length > 12 {
            return Err(ConfigError::InvalidValue("OTP_LENGTH"));
        }
        if otp.max_attempts == 0 {
            return Err(ConfigError::InvalidValue("OTP_MAX_ATTEMPTS"));
        }
        if otp.lifetime <= Duration::zero() {
            return Err(ConfigError::InvalidValue("OTP_LIFETIME_SECS"));
        }

        let otp_retention = parse_secs(&lookup, "OTP_RETENTION_SECS", 86_400, MAX_RETENTION_SECS)?;

        let otp_cleanup_interval =
            std::time::Duration::from_secs(parse_or(&lookup, "OTP_CLEANUP_INTERVAL_SECS", 300u64)?);
        if otp_cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidValue("OTP_CLEANUP_INTERVAL_SECS"));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            environment,
            hmac_secret_key,
            snowflake,
            otp,
            otp_retention,
            otp_cleanup_interval,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl OtpConfig for Config {
    fn otp_length(&self) -> usize {
        self.otp.otp_length()
    }

    fn otp_max_attempts(&self) -> u32 {
        self.otp.otp_max_attempts()
    }

    fn otp_lifetime(&self) -> Duration {
        self.otp.otp_lifetime()
    }

    fn otp_rate_limit_max_requests(&self) -> u32 {
        self.otp.otp_rate_limit_max_requests()
    }

    fn otp_rate_limit_window(&self) -> Duration {
        self.otp.otp_rate_limit_window()
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name)),
        None => Ok(default),
    }
}

/// Seconds in `0..=max`
fn parse_secs<F>(lookup: &F, name: &'static str, default: i64, max: i64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: i64 = parse_or(lookup, name, default)?;
    if !(0..=max).contains(&secs) {
        return Err(ConfigError::InvalidValue(name));
    }
    Duration::try_seconds(secs).ok_or(ConfigError::InvalidValue(name))
}

fn random_key() -> Vec<u8> {
    use rand::RngCore;

    let mut key = vec![0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
