use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub api_key: String,
    pub api_url: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub db: DbConfig,
    pub jwt: JwtConfig,
    /// Shared secret for `/admin`, unrelated to session tokens.
    pub admin_api_key: String,
    pub storage: StorageConfig,
    pub mail: MailConfig,
}

fn required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var {key}"))
}

fn or_default<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let db = DbConfig {
            url: required("DATABASE_URL")?,
            max_connections: or_default("DB_MAX_CONNECTIONS", 15),
            min_connections: or_default("DB_MIN_CONNECTIONS", 3),
            acquire_timeout_secs: or_default("DB_ACQUIRE_TIMEOUT_SECS", 5),
            idle_timeout_secs: or_default("DB_IDLE_TIMEOUT_SECS", 30),
            max_lifetime_secs: or_default("DB_MAX_LIFETIME_SECS", 30 * 60),
        };
        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "touchly".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "touchly-users".into()),
            ttl_days: or_default("JWT_TTL_DAYS", 30),
        };
        let storage = StorageConfig {
            endpoint: required("S3_ENDPOINT")?,
            bucket: required("S3_BUCKET")?,
            access_key: required("S3_ACCESS_KEY")?,
            secret_key: required("S3_SECRET_KEY")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "auto".into()),
        };
        let mail = MailConfig {
            api_key: required("RESEND_API_KEY")?,
            api_url: std::env::var("MAIL_API_URL")
                .unwrap_or_else(|_| "https://api.resend.com".into()),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "hi@touchly.app".into()),
        };

        let admin_api_key = required("ADMIN_API_KEY")?;
        anyhow::ensure!(
            admin_api_key != jwt.secret,
            "ADMIN_API_KEY must differ from JWT_SECRET"
        );

        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: or_default("APP_PORT", 8080),
            request_timeout_secs: or_default("REQUEST_TIMEOUT_SECS", 30),
            db,
            jwt,
            admin_api_key,
            storage,
            mail,
        })
    }
}
