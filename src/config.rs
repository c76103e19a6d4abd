/**
 * Configuration
 * Runtime settings read from the environment (and an optional .env file)
 */
use std::{env, fmt::Display, net::SocketAddr, str::FromStr};

use thiserror::Error;

/// Secret shipped as a fallback for local development only.
pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set to a secure, unique value in production")]
    InsecureSecret,

    #[error("invalid bind address {0}")]
    InvalidAddr(String),
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub production: bool,
    pub level: String,
    pub directory: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    /// `None` runs the service on the in-memory store.
    pub database: Option<DbConfig>,
    pub auth: AuthConfig,
    pub log: LogConfig,
    pub allowed_origins: Vec<String>,
}

impl LogConfig {
    /// Reads only plain string variables, so it can run before a subscriber
    /// exists without dropping any warning.
    pub fn from_env() -> Self {
        let production = var_or("ENVIRONMENT", "development".to_string()) == "production";
        Self {
            production,
            level: var_or(
                "LOG_LEVEL",
                if production { "info" } else { "debug" }.to_string(),
            ),
            directory: var_or("LOG_DIR", "logs".to_string()),
        }
    }
}

impl AppConfig {
    /// Call after `logging::init`; unparsable numeric settings are reported
    /// through `tracing`.
    pub fn from_env() -> Self {
        let environment = var_or("ENVIRONMENT", "development".to_string());

        let database = env::var("DATABASE_URL").ok().map(|url| DbConfig {
            url,
            max_connections: parse_or("DB_POOL_MAX", 10),
            min_connections: parse_or("DB_POOL_MIN", 2),
            connect_timeout_secs: parse_or("DB_CONNECT_TIMEOUT", 10),
            idle_timeout_secs: parse_or("DB_IDLE_TIMEOUT", 300),
        });

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .or_else(|| env::var("FRONTEND_ORIGIN").ok().map(|origin| vec![origin]))
            .unwrap_or_else(|| vec!["http://localhost:5173".to_string()]);

        Self {
            host: var_or("HOST", "127.0.0.1".to_string()),
            port: parse_or("PORT", 3000),
            database,
            auth: AuthConfig {
                jwt_secret: var_or("JWT_SECRET", DEFAULT_JWT_SECRET.to_string()),
                token_ttl_minutes: parse_or("TOKEN_TTL_MINUTES", 60),
                bcrypt_cost: parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST),
            },
            log: LogConfig::from_env(),
            allowed_origins,
            environment,
        }
    }

    pub fn is_production(&self) -> bool {
        self.log.production
    }

    /// Refuses settings that are only acceptable during development.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_production()
            && (self.auth.jwt_secret.is_empty() || self.auth.jwt_secret == DEFAULT_JWT_SECRET)
        {
            return Err(ConfigError::InsecureSecret);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddr(addr))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            database: None,
            auth: AuthConfig {
                jwt_secret: DEFAULT_JWT_SECRET.to_string(),
                token_ttl_minutes: 60,
                bcrypt_cost: bcrypt::DEFAULT_COST,
            },
            log: LogConfig {
                production: false,
                level: "debug".to_string(),
                directory: "logs".to_string(),
            },
            allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

fn var_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            tracing::warn!("Invalid {key} value {raw:?} ({e}), using default: {default}");
            default
        }),
        Err(_) => default,
    }
}
