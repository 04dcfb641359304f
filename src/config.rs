use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    Local,
    Prod,
}

impl Env {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Env::Prod,
            _ => Env::Local,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub max_retries: u32,
    pub retry_interval: Duration,
    pub connect_timeout: Duration,
    pub auto_migrate: bool,
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PasswordHashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: Env,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub password_hash: PasswordHashConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let database = DatabaseConfig {
            url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: parse_or(lookup("DB_MAX_CONNECTIONS"), 10),
            max_retries: parse_or(lookup("DB_MAX_RETRIES"), 10),
            retry_interval: Duration::from_secs(parse_or(lookup("DB_RETRY_INTERVAL_SECS"), 5)),
            connect_timeout: Duration::from_secs(parse_or(lookup("DB_CONNECT_TIMEOUT_SECS"), 30)),
            auto_migrate: parse_or(lookup("DB_AUTO_MIGRATE"), true),
        };

        let http = HttpConfig {
            host: or("APP_HOST", "0.0.0.0"),
            port: parse_or(lookup("APP_PORT"), 8080),
            request_timeout: Duration::from_secs(parse_or(lookup("HTTP_REQUEST_TIMEOUT_SECS"), 10)),
        };

        let defaults = PasswordHashConfig::default();
        let password_hash = PasswordHashConfig {
            memory_kib: parse_or(lookup("PASSWORD_HASH_MEMORY_KIB"), defaults.memory_kib),
            iterations: parse_or(lookup("PASSWORD_HASH_ITERATIONS"), defaults.iterations),
            parallelism: parse_or(lookup("PASSWORD_HASH_PARALLELISM"), defaults.parallelism),
        };

        Ok(Self {
            env: Env::parse(&or("APP_ENV", "local")),
            http,
            database,
            password_hash,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}
