use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::engagement::{
    DecisionConfig, OrchestratorSettings, RetryPolicy, ScoringConfig, UnscoredPolicy,
};

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

/// Top-level configuration for the engine and its collaborators.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub store: StoreConfig,
    pub generation: GenerationConfig,
    pub delivery: DeliveryConfig,
    pub engagement: OrchestratorSettings,
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
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidValue {
                key: "APP_LOG_FORMAT",
                value: raw,
            })?,
            Err(_) => LogFormat::Compact,
        };

        let store = StoreConfig {
            customers_table: env::var("USERS_TABLE_NAME")
                .unwrap_or_else(|_| "customers".to_string()),
            emails_table: env::var("EMAILS_TABLE_NAME").unwrap_or_else(|_| "emails".to_string()),
        };

        let generation = GenerationConfig {
            api_key: env::var("OPENROUTER_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            base_url: env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| GenerationConfig::DEFAULT_BASE_URL.to_string()),
            model: env::var("OPENROUTER_MODEL")
                .unwrap_or_else(|_| GenerationConfig::DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(parse_var("GENERATION_TIMEOUT_SECS", 30u64)?),
        };

        let delivery = DeliveryConfig {
            relay_url: env::var("MAIL_RELAY_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            from_address: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "noreply@example.com".to_string()),
            timeout: Duration::from_secs(parse_var("DELIVERY_TIMEOUT_SECS", 10u64)?),
        };

        let cooldown_days = parse_var("COOLDOWN_DAYS", 7i64)?;
        let score_threshold = parse_var("SCORE_THRESHOLD", 50.0f64)?;
        let bootstrap_score = parse_var("BOOTSTRAP_SCORE", 10.0f64)?;
        if !(0.0..=100.0).contains(&bootstrap_score) {
            return Err(ConfigError::InvalidValue {
                key: "BOOTSTRAP_SCORE",
                value: bootstrap_score.to_string(),
            });
        }
        let unscored = match env::var("UNSCORED_POLICY") {
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "at_risk" | "at-risk" => UnscoredPolicy::AtRiskDefault(bootstrap_score),
                "computed" => UnscoredPolicy::Computed,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "UNSCORED_POLICY",
                        value: raw,
                    })
                }
            },
            Err(_) => UnscoredPolicy::AtRiskDefault(bootstrap_score),
        };

        let engagement = OrchestratorSettings {
            scoring: ScoringConfig {
                frequency_window_days: cooldown_days,
                ..ScoringConfig::default()
            },
            decision: DecisionConfig {
                score_threshold,
                cooldown_days,
            },
            unscored,
            retry: RetryPolicy {
                max_attempts: parse_var("GENERATION_MAX_ATTEMPTS", 3u32)?.max(1),
                initial_backoff: Duration::from_millis(parse_var(
                    "GENERATION_BACKOFF_MS",
                    1000u64,
                )?),
            },
            generation_timeout: generation.timeout,
            delivery_timeout: delivery.timeout,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            store,
            generation,
            delivery,
            engagement,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(default),
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
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Collection identifiers for the record store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub customers_table: String,
    pub emails_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            customers_table: "customers".to_string(),
            emails_table: "emails".to_string(),
        }
    }
}

/// Credentials and endpoint for the text-generation capability.
#[derive(Clone)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl GenerationConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://openrouter.ai/api/v1";
    pub const DEFAULT_MODEL: &'static str = "openai/gpt-4o";
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Outbound mail settings. Without a relay URL sends are only logged.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub relay_url: Option<String>,
    pub from_address: String,
    pub timeout: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
