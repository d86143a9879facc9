/// Configuration management for the API server
///
/// Loaded once at startup from environment variables (and `.env` in
/// development) into a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: *)
/// - `JWT_SECRET`: HS256 key for identity tokens (required, >= 32 chars)
/// - `ENABLE_BILLING`: Enforce tier limits (default: false)
/// - `ENABLE_ADMIN`: Expose `/v1/admin/*` (default: false)
/// - `RETRY_MAX_ATTEMPTS`: Attempts for transient storage errors (default: 3)
/// - `RUST_LOG`: Log level (default: statusguard_api=debug,tower_http=debug)
///
/// # Example
///
/// ```no_run
/// use statusguard_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use statusguard_shared::db::retry::RetryPolicy;
use statusguard_shared::engine::EngineConfig;
use std::env;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// Feature toggles, read once per process
    pub features: FeatureToggles,

    /// Attempts for transient storage errors
    pub retry_max_attempts: u32,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; `*` is permissive
    pub cors_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HS256 key shared with the identity provider
    ///
    /// Must be at least 32 bytes. Generate with: `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,
}

/// Billing and admin switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggles {
    pub billing_enabled: bool,
    pub admin_enabled: bool,
}

/// Parses a boolean toggle
///
/// Accepts `true`, `1`, `yes` and `on` (case-insensitive); anything else is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn flag_from_env(name: &str) -> bool {
    env::var(name).map(|v| parse_flag(&v)).unwrap_or(false)
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `DATABASE_URL` or `JWT_SECRET` is missing
    /// - `JWT_SECRET` is shorter than 32 characters
    /// - A numeric variable doesn't parse
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let retry_max_attempts = env::var("RETRY_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()?;

        if retry_max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            api: ApiConfig {
                host: api_host,
                port: api_port,
                cors_origins,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig { secret: jwt_secret },
            features: FeatureToggles {
                billing_enabled: flag_from_env("ENABLE_BILLING"),
                admin_enabled: flag_from_env("ENABLE_ADMIN"),
            },
            retry_max_attempts,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Engine settings derived from the toggles and retry budget
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            billing_enabled: self.features.billing_enabled,
            admin_enabled: self.features.admin_enabled,
            retry: RetryPolicy {
                max_attempts: self.retry_max_attempts,
                ..RetryPolicy::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: vec!["*".to_string()],
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/test".to_string(),
                max_connections: 10,
            },
            jwt: JwtConfig {
                secret: "test-secret-key-at-least-32-bytes-long".to_string(),
            },
            features: FeatureToggles {
                billing_enabled: true,
                admin_enabled: false,
            },
            retry_max_attempts: 5,
        }
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(config().bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_parse_flag() {
        for on in ["true", "TRUE", "1", "yes", "On", " on "] {
            assert!(parse_flag(on), "{on:?} should enable");
        }
        for off in ["false", "0", "no", "off", "", "enabled"] {
            assert!(!parse_flag(off), "{off:?} should disable");
        }
    }

    #[test]
    fn test_engine_config_carries_toggles() {
        let engine = config().engine_config();
        assert!(engine.billing_enabled);
        assert!(!engine.admin_enabled);
        assert_eq!(engine.retry.max_attempts, 5);
    }

    #[test]
    fn test_secret_not_serialized() {
        let json = serde_json::to_string(&config()).unwrap();
        assert!(!json.contains("test-secret-key"));
    }
}
