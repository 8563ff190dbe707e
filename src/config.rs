//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

/// Minimum length of the session cookie signing key
pub const MIN_SESSION_SECRET_BYTES: usize = 32;

/// Accepted `logging.format` values
const LOG_FORMATS: &[&str] = &["pretty", "json"];

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "quiz.example.com" or "localhost:8080")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the public base URL
    ///
    /// # Returns
    /// Full URL like "https://quiz.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Identity provider configuration (GoTrue-compatible auth service)
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Project base URL (e.g., "https://abcd.supabase.co")
    pub url: String,
    /// Public (anon) API key sent as `apikey` header
    pub anon_key: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

/// Session and route gating configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Name of the session cookie; the PKCE verifier cookie is derived from it
    pub cookie_name: String,
    /// Session cookie signing key (32+ bytes)
    pub session_secret: String,
    /// Paths reachable without a session (exact match)
    pub public_paths: Vec<String>,
    /// Minimum password length accepted by the sign-up form
    pub min_password_length: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Filter directives used when `RUST_LOG` is not set
    pub fn default_directives(&self) -> String {
        format!("quizgate={},tower_http=debug", self.level)
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (QUIZGATE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost:8080")?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/quizgate.db")?
            .set_default("provider.timeout_seconds", 10)?
            .set_default("auth.cookie_name", "quizgate-auth-token")?
            .set_default("auth.public_paths", vec!["/", "/about", "/contact"])?
            .set_default("auth.min_password_length", 6)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (QUIZGATE__*)
            .add_source(
                Environment::with_prefix("QUIZGATE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.public_paths")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if url::Url::parse(&self.provider.url).is_err() {
            return Err(crate::error::AppError::Config(format!(
                "provider.url must be an absolute URL, got {:?}",
                self.provider.url
            )));
        }

        if self.provider.anon_key.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "provider.anon_key must not be empty".to_string(),
            ));
        }

        if self.auth.cookie_name.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "auth.cookie_name must not be empty".to_string(),
            ));
        }

        if self.auth.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {MIN_SESSION_SECRET_BYTES} bytes"
            )));
        }

        if self.auth.min_password_length == 0 {
            return Err(crate::error::AppError::Config(
                "auth.min_password_length must be greater than 0".to_string(),
            ));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(crate::error::AppError::Config(format!(
                "logging.level must be one of trace, debug, info, warn, error, got {:?}",
                self.logging.level
            )));
        }

        if !LOG_FORMATS
            .iter()
            .any(|format| self.logging.format.eq_ignore_ascii_case(format))
        {
            return Err(crate::error::AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }

        if self.should_use_secure_cookies() && !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost:8080".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/quizgate-test.db"),
            },
            provider: ProviderConfig {
                url: "https://project.supabase.co".to_string(),
                anon_key: "anon-key".to_string(),
                timeout_seconds: 10,
            },
            auth: AuthConfig {
                cookie_name: "quizgate-auth-token".to_string(),
                session_secret: "x".repeat(MIN_SESSION_SECRET_BYTES),
                public_paths: vec!["/".to_string(), "/about".to_string()],
                min_password_length: 6,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
        assert_eq!(config.server.base_url(), "http://localhost:8080");
    }

    #[test]
    fn validate_rejects_relative_provider_url() {
        let mut config = valid_config();
        config.provider.url = "project.supabase.co".to_string();

        let error = config
            .validate()
            .expect_err("provider url without scheme must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("provider.url")
        ));
    }

    #[test]
    fn validate_rejects_blank_anon_key() {
        let mut config = valid_config();
        config.provider.anon_key = "  ".to_string();

        let error = config.validate().expect_err("blank anon key must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("provider.anon_key")
        ));
    }

    #[test]
    fn validate_rejects_http_for_non_local_domain() {
        let mut config = valid_config();
        config.server.domain = "quiz.example.com".to_string();
        config.server.protocol = "http".to_string();

        let error = config
            .validate()
            .expect_err("public domains must require https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("server.protocol must be https")
        ));
    }

    #[test]
    fn validate_rejects_short_session_secret() {
        let mut config = valid_config();
        config.auth.session_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("auth.session_secret")
        ));

        config.auth.session_secret = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_logging_settings() {
        let mut config = valid_config();
        config.logging.level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(crate::error::AppError::Config(message)) if message.contains("logging.level")
        ));

        let mut config = valid_config();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            config.validate(),
            Err(crate::error::AppError::Config(message)) if message.contains("logging.format")
        ));
    }

    #[test]
    fn logging_settings_drive_subscriber_setup() {
        let mut config = valid_config();
        config.logging.level = "debug".to_string();
        config.logging.format = "JSON".to_string();

        assert!(config.validate().is_ok());
        assert_eq!(
            config.logging.default_directives(),
            "quizgate=debug,tower_http=debug"
        );
        assert!(config.logging.is_json());
    }

    #[test]
    fn loopback_addresses_count_as_local() {
        assert!(is_local_server_domain("127.0.0.1:3000"));
        assert!(is_local_server_domain("app.localhost"));
        assert!(!is_local_server_domain("quiz.example.com"));
    }
}
