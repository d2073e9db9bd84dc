use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::posting::InstitutionId;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine: EngineConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Posting engine scope and auto-post defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub institution_id: InstitutionId,
    /// Overrides the session cap for auto-posting when set.
    pub auto_post_max_per_supervisor: Option<u32>,
}

impl EngineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let institution = env::var("POSTING_INSTITUTION_ID").unwrap_or_else(|_| "demo".to_string());
        if institution.trim().is_empty() {
            return Err(ConfigError::MissingInstitution);
        }

        let auto_post_max_per_supervisor = match env::var("POSTING_AUTO_MAX_PER_SUPERVISOR") {
            Ok(raw) => {
                let value = raw
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| ConfigError::InvalidAutoPostLimit { value: raw.clone() })?;
                if value == 0 {
                    return Err(ConfigError::InvalidAutoPostLimit { value: raw });
                }
                Some(value)
            }
            Err(_) => None,
        };

        Ok(Self {
            institution_id: InstitutionId::new(institution.trim()),
            auto_post_max_per_supervisor,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingInstitution,
    InvalidAutoPostLimit { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingInstitution => {
                write!(f, "POSTING_INSTITUTION_ID must not be blank")
            }
            ConfigError::InvalidAutoPostLimit { value } => write!(
                f,
                "POSTING_AUTO_MAX_PER_SUPERVISOR must be a positive integer (found '{value}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::MissingInstitution
            | ConfigError::InvalidAutoPostLimit { .. } => None,
        }
    }
}
