//! Configuration management
//!
//! Loads and validates configuration from environment variables, with support
//! for different environments (development, staging, production). Risk and
//! throttling policy knobs live here too so deployments can tune them without
//! a rebuild.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::geo::Coordinates;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Which image analysis strategy backs the risk pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageAnalyzerKind {
    /// Label classification through the vision service
    Labels,
    /// Format and size checks only, no ML
    #[default]
    Heuristic,
}

impl FromStr for ImageAnalyzerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "labels" | "vision" => Ok(ImageAnalyzerKind::Labels),
            "heuristic" | "basic" => Ok(ImageAnalyzerKind::Heuristic),
            other => Err(ConfigError::InvalidValue(format!(
                "Invalid IMAGE_ANALYZER: '{}'. Expected: labels or heuristic",
                other
            ))),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Postgres URL; in-memory stores are used when absent
    pub database_url: Option<String>,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// Salt mixed into identity hashes before they are used as keys
    pub identity_hash_salt: String,

    /// Google Places API key for hospital geocoding
    pub google_maps_api_key: Option<String>,

    /// Google Vision API key for label-based image analysis
    pub google_vision_api_key: Option<String>,

    /// Base URL of the IP geolocation service
    pub ip_geolocation_url: String,

    /// Base URL of the police FIR registry
    pub fir_registry_url: Option<String>,

    /// Image analysis strategy
    pub image_analyzer: ImageAnalyzerKind,

    /// Coordinate used when no applicant location can be resolved
    pub fallback_location: Coordinates,

    /// Whole-request processing budget
    pub request_timeout: Duration,

    /// Budget for a single image analysis call
    pub image_analysis_timeout: Duration,

    /// Generic per-IP throttle (requests per minute)
    pub ip_rate_limit_per_minute: u64,

    /// Identity-sensitive throttle (requests per hour)
    pub identity_rate_limit_per_hour: u64,

    /// Final approval attempts per loan per hour
    pub approval_attempts_per_hour: u64,

    /// Lifetime loan confirmation attempts per loan
    pub confirmation_attempt_cap: u64,

    /// Hospital geocode cache lifetime
    pub hospital_cache_ttl: Duration,

    /// Idempotent decision cache lifetime
    pub idempotency_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            port: 3001,
            database_url: None,
            db_max_connections: 5,
            cors_allowed_origins: None,
            log_level: "info".to_string(),
            identity_hash_salt: "development-salt-change-in-production".to_string(),
            google_maps_api_key: None,
            google_vision_api_key: None,
            ip_geolocation_url: "https://ipapi.co".to_string(),
            fir_registry_url: None,
            image_analyzer: ImageAnalyzerKind::Heuristic,
            fallback_location: Coordinates {
                lat: 28.6139,
                lng: 77.2090,
            },
            request_timeout: Duration::from_secs(10),
            image_analysis_timeout: Duration::from_secs(5),
            ip_rate_limit_per_minute: 10,
            identity_rate_limit_per_hour: 5,
            approval_attempts_per_hour: 3,
            confirmation_attempt_cap: 5,
            hospital_cache_ttl: Duration::from_secs(24 * 60 * 60),
            idempotency_ttl: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| defaults.port.to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let image_analyzer = match env::var("IMAGE_ANALYZER") {
            Ok(raw) => raw.parse::<ImageAnalyzerKind>()?,
            Err(_) => defaults.image_analyzer,
        };

        let fallback_location = Coordinates {
            lat: parse_or("FALLBACK_LAT", defaults.fallback_location.lat)?,
            lng: parse_or("FALLBACK_LNG", defaults.fallback_location.lng)?,
        };
        if !fallback_location.is_valid() {
            return Err(ConfigError::InvalidValue(
                "FALLBACK_LAT/FALLBACK_LNG out of range".to_string(),
            ));
        }

        let identity_hash_salt = match env::var("IDENTITY_HASH_SALT") {
            Ok(salt) => salt,
            Err(_) if environment.is_production() => {
                return Err(ConfigError::MissingEnvVar("IDENTITY_HASH_SALT".to_string()))
            }
            Err(_) => defaults.identity_hash_salt,
        };

        let fir_registry_url = env::var("FIR_REGISTRY_URL").ok();
        if environment.is_production() && fir_registry_url.is_none() {
            return Err(ConfigError::MissingEnvVar("FIR_REGISTRY_URL".to_string()));
        }

        Ok(Config {
            environment,
            port,
            database_url: env::var("DATABASE_URL").ok(),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok(),
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
            identity_hash_salt,
            google_maps_api_key: env::var("GOOGLE_MAPS_API_KEY").ok(),
            google_vision_api_key: env::var("GOOGLE_VISION_API_KEY").ok(),
            ip_geolocation_url: env::var("IP_GEOLOCATION_URL")
                .unwrap_or(defaults.ip_geolocation_url),
            fir_registry_url,
            image_analyzer,
            fallback_location,
            request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 10u64)?),
            image_analysis_timeout: Duration::from_secs(parse_or(
                "IMAGE_ANALYSIS_TIMEOUT_SECS",
                5u64,
            )?),
            ip_rate_limit_per_minute: parse_or(
                "IP_RATE_LIMIT_PER_MINUTE",
                defaults.ip_rate_limit_per_minute,
            )?,
            identity_rate_limit_per_hour: parse_or(
                "IDENTITY_RATE_LIMIT_PER_HOUR",
                defaults.identity_rate_limit_per_hour,
            )?,
            approval_attempts_per_hour: parse_or(
                "APPROVAL_ATTEMPTS_PER_HOUR",
                defaults.approval_attempts_per_hour,
            )?,
            confirmation_attempt_cap: parse_or(
                "CONFIRMATION_ATTEMPT_CAP",
                defaults.confirmation_attempt_cap,
            )?,
            hospital_cache_ttl: Duration::from_secs(parse_or(
                "HOSPITAL_CACHE_TTL_SECS",
                defaults.hospital_cache_ttl.as_secs(),
            )?),
            idempotency_ttl: Duration::from_secs(parse_or(
                "IDEMPOTENCY_TTL_SECS",
                defaults.idempotency_ttl.as_secs(),
            )?),
        })
    }

    /// Database URL with the password masked, for logging
    pub fn database_url_masked(&self) -> Option<String> {
        let url = self.database_url.as_ref()?;
        if let Some(at_pos) = url.find('@') {
            if let Some(colon_pos) = url[..at_pos].rfind(':') {
                let prefix = &url[..colon_pos + 1];
                let suffix = &url[at_pos..];
                return Some(format!("{}****{}", prefix, suffix));
            }
        }
        Some(url.clone())
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(format!("{} has an invalid value", key))),
        Err(_) => Ok(default),
    }
}
