//! Meridian Configuration Management
//!
//! Settings come from environment variables or a TOML file, with defaults
//! suited to local development. Required values (`APP_SECRET_KEY`,
//! `DATABASE_URL`) have no default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSettings,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(&lookup)?;

        if config.app.secret_key.is_empty() {
            return Err(ConfigError::MissingRequired("APP_SECRET_KEY".to_string()));
        }
        if config.database.url.is_empty() {
            return Err(ConfigError::MissingRequired("DATABASE_URL".to_string()));
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Merge with an arbitrary variable lookup; set variables win
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.apply_overrides(&lookup)?;
        self.validate()?;
        Ok(self)
    }

    /// Check required values and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.secret_key.is_empty() {
            return Err(ConfigError::MissingRequired("app.secret_key".to_string()));
        }
        if self.database.url.is_empty() {
            return Err(ConfigError::MissingRequired("database.url".to_string()));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "database.pool_size".to_string(),
                value: "0".to_string(),
            });
        }
        if let Some(origin) = self
            .app
            .allowed_origins
            .iter()
            .find(|o| !(o.starts_with("http://") || o.starts_with("https://")))
        {
            return Err(ConfigError::InvalidValue {
                key: "app.allowed_origins".to_string(),
                value: origin.clone(),
            });
        }
        self.logging.filter_level()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.app.env == Environment::Production
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // App
        if let Some(env) = lookup("APP_ENV") {
            self.app.env = parse_var("APP_ENV", env)?;
        }
        if let Some(debug) = lookup("APP_DEBUG") {
            self.app.debug = parse_bool("APP_DEBUG", debug)?;
        }
        if let Some(secret) = lookup("APP_SECRET_KEY") {
            self.app.secret_key = secret;
        }
        if let Some(origins) = lookup("APP_ALLOWED_ORIGINS") {
            self.app.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Server
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.server.port = parse_var("API_PORT", port)?;
        }

        // Database
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(size) = lookup("DATABASE_POOL_SIZE") {
            self.database.pool_size = parse_var("DATABASE_POOL_SIZE", size)?;
        }
        if let Some(overflow) = lookup("DATABASE_MAX_OVERFLOW") {
            self.database.max_overflow = parse_var("DATABASE_MAX_OVERFLOW", overflow)?;
        }

        // Auth
        if let Some(minutes) = lookup("ACCESS_TOKEN_EXPIRE_MINUTES") {
            self.auth.access_token_expire_minutes =
                parse_var("ACCESS_TOKEN_EXPIRE_MINUTES", minutes)?;
        }
        if let Some(days) = lookup("REFRESH_TOKEN_EXPIRE_DAYS") {
            self.auth.refresh_token_expire_days = parse_var("REFRESH_TOKEN_EXPIRE_DAYS", days)?;
        }
        if let Some(algorithm) = lookup("ALGORITHM") {
            self.auth.algorithm = parse_var("ALGORITHM", algorithm)?;
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = parse_var("LOG_FORMAT", format)?;
        }

        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

fn parse_bool(key: &str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
    }
}

/// Application-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppSettings {
    pub env: Environment,

    pub debug: bool,

    /// HMAC key for signing tokens
    pub secret_key: String,

    /// CORS origins (absolute http/https URLs)
    pub allowed_origins: Vec<String>,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidValue {
                key: "APP_ENV".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Connections kept open
    pub pool_size: u32,

    /// Extra connections allowed under load
    pub max_overflow: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: 10,
            max_overflow: 20,
        }
    }
}

impl DatabaseConfig {
    pub fn max_connections(&self) -> u32 {
        self.pool_size.saturating_add(self.max_overflow)
    }
}

/// Token settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub algorithm: JwtAlgorithm,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
            algorithm: JwtAlgorithm::HS256,
        }
    }
}

/// Supported HMAC signing algorithms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JwtAlgorithm {
    #[default]
    HS256,
    HS384,
    HS512,
}

impl FromStr for JwtAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            _ => Err(ConfigError::InvalidValue {
                key: "ALGORITHM".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl LoggingConfig {
    /// Level as a `tracing` filter directive
    ///
    /// Accepts either spelling of warning and maps `critical`/`fatal` to
    /// `error`, the most severe `tracing` level.
    pub fn filter_level(&self) -> Result<&'static str, ConfigError> {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok("trace"),
            "debug" => Ok("debug"),
            "info" => Ok("info"),
            "warn" | "warning" => Ok("warn"),
            "error" | "critical" | "fatal" => Ok("error"),
            "off" => Ok("off"),
            _ => Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                value: self.level.clone(),
            }),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Console,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "console" => Ok(Self::Console),
            _ => Err(ConfigError::InvalidValue {
                key: "LOG_FORMAT".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("APP_SECRET_KEY", "test-secret"),
        ("DATABASE_URL", "postgres://localhost/meridian"),
    ];

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.database.pool_size, 10);
        assert_eq!(config.database.max_connections(), 30);
        assert_eq!(config.auth.access_token_expire_minutes, 30);
        assert_eq!(config.auth.algorithm, JwtAlgorithm::HS256);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.app.env, Environment::Development);
        assert!(!config.is_production());
    }

    #[test]
    fn test_missing_required() {
        let err = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(ref k) if k == "APP_SECRET_KEY"));

        let err = AppConfig::from_lookup(lookup(&[("APP_SECRET_KEY", "s")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(ref k) if k == "DATABASE_URL"));
    }

    #[test]
    fn test_env_values_are_parsed() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("APP_ENV", "production"),
            ("APP_DEBUG", "true"),
            ("APP_ALLOWED_ORIGINS", "https://a.example, http://b.example ,"),
            ("API_PORT", "9000"),
            ("DATABASE_POOL_SIZE", "4"),
            ("ALGORITHM", "hs512"),
            ("LOG_FORMAT", "console"),
        ]);
        let config = AppConfig::from_lookup(lookup(&vars)).unwrap();

        assert!(config.is_production());
        assert!(config.app.debug);
        assert_eq!(
            config.app.allowed_origins,
            vec!["https://a.example", "http://b.example"]
        );
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.max_connections(), 24);
        assert_eq!(config.auth.algorithm, JwtAlgorithm::HS512);
        assert_eq!(config.logging.format, LogFormat::Console);
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("API_PORT", "eighty"),
            ("APP_ENV", "qa"),
            ("ALGORITHM", "RS256"),
            ("APP_DEBUG", "maybe"),
            ("APP_ALLOWED_ORIGINS", "ftp://files.example"),
            ("DATABASE_POOL_SIZE", "0"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((key, value));
            let err = AppConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { .. }),
                "{key}={value} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_log_level_names() {
        for (raw, level) in [
            ("INFO", "info"),
            ("WARNING", "warn"),
            ("warn", "warn"),
            (" Critical ", "error"),
            ("DEBUG", "debug"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push(("LOG_LEVEL", raw));
            let config = AppConfig::from_lookup(lookup(&vars)).unwrap();
            assert_eq!(config.logging.filter_level().unwrap(), level, "{raw}");
        }

        let mut vars = REQUIRED.to_vec();
        vars.push(("LOG_LEVEL", "verbose"));
        let err = AppConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "logging.level"
        ));
    }

    #[test]
    fn test_toml_and_overrides() {
        let toml = r#"
            [app]
            env = "staging"
            secret_key = "from-file"

            [database]
            url = "postgres://file/meridian"
            pool_size = 2
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.app.env, Environment::Staging);
        assert_eq!(config.database.max_overflow, 20);
        assert_eq!(config.server.port, 8080);

        let config = config
            .with_overrides(lookup(&[("API_PORT", "7000"), ("APP_SECRET_KEY", "from-env")]))
            .unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.app.secret_key, "from-env");
        assert_eq!(config.database.url, "postgres://file/meridian");
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/meridian.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
