use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Argon2 cost parameters. `iterations` is the work factor proper.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
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
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub host: String,
    pub port: u16,
    /// Broker endpoints; empty disables the NATS listener.
    pub nats_servers: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "auth-ms".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "auth-ms-clients".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 120)?,
        };
        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: env_or("PASSWORD_MEMORY_KIB", defaults.memory_kib)?,
            iterations: env_or("PASSWORD_ITERATIONS", defaults.iterations)?,
            parallelism: env_or("PASSWORD_PARALLELISM", defaults.parallelism)?,
        };

        Ok(Self {
            database_url,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            jwt,
            password,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("APP_PORT", 8080)?,
            nats_servers: split_servers(std::env::var("NATS_SERVERS").ok().as_deref()),
        })
    }
}

/// Reads `key` and parses it, falling back to `default` only when the variable is unset.
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_or(key, std::env::var(key).ok().as_deref(), default)
}

fn parse_or<T>(key: &str, raw: Option<&str>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

/// `nats://a:4222, nats://b:4222` -> two entries.
fn split_servers(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
