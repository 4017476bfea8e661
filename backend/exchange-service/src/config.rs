use crate::error::AppError;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub email: EmailSettings,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `None` runs the service against the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
}

/// SMTP settings for out-of-band notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    /// Empty host puts the notifier in no-op mode
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    #[serde(skip_serializing)]
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub use_starttls: bool,
    /// Base URL used for links inside emails
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Only accept reviews on transactions in COMPLETE status
    pub review_requires_completion: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            review_requires_completion: true,
        }
    }
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_from: "Bazaar Team <team@shareonbazaar.eu>".to_string(),
            use_starttls: true,
            public_base_url: "http://localhost:8000".to_string(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("invalid {name}: {raw}")))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let defaults = EmailSettings::default();

        Ok(Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                host: env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("APP_PORT", "8000")?,
            },
            database: DatabaseConfig {
                url: optional_var("DATABASE_URL"),
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "10")?,
            },
            email: EmailSettings {
                smtp_host: env::var("SMTP_HOST").unwrap_or_default(),
                smtp_port: parse_var("SMTP_PORT", "587")?,
                smtp_username: optional_var("SMTP_USERNAME"),
                smtp_password: optional_var("SMTP_PASSWORD"),
                smtp_from: env::var("SMTP_FROM").unwrap_or(defaults.smtp_from),
                use_starttls: parse_var("SMTP_STARTTLS", "true")?,
                public_base_url: env::var("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            },
            policy: PolicyConfig {
                review_requires_completion: parse_var("REVIEW_REQUIRES_COMPLETION", "true")?,
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }
}
