use std::str::FromStr;

use chrono::TimeDelta;
use thiserror::Error;
use wager_server_api::ApiSettings;
use wager_server_domain::{app::AppSettings, telegram::TelegramSettings};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got [{value}]")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Process settings read from `WAGER_*` environment variables.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub api: ApiSettings,
    pub app: AppSettings,
    /// SQLite file; in-memory storage when absent.
    pub db_path: Option<String>,
    pub jwt_secret: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut api = ApiSettings::default();
        if let Some(host) = var("WAGER_HTTP_HOST") {
            api.host = host;
        }
        if let Some(port) = var("WAGER_HTTP_PORT") {
            api.port = parse("WAGER_HTTP_PORT", "a port number", &port)?;
        }
        if let Some(development) = var("WAGER_DEVELOPMENT") {
            api.development = parse_flag("WAGER_DEVELOPMENT", &development)?;
        }
        if let Some(origins) = var("WAGER_CORS_ORIGINS") {
            api.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }

        let mut app = AppSettings::default();
        if let Some(hours) = var("WAGER_JWT_TTL_HOURS") {
            let hours: u32 = parse("WAGER_JWT_TTL_HOURS", "a whole number of hours", &hours)?;
            app.token_ttl = TimeDelta::hours(hours as i64);
        }
        let mut telegram = TelegramSettings {
            bot_token: var("WAGER_TELEGRAM_BOT_TOKEN"),
            ..Default::default()
        };
        if let Some(days) = var("WAGER_TELEGRAM_TOKEN_TTL_DAYS") {
            let days: u32 = parse(
                "WAGER_TELEGRAM_TOKEN_TTL_DAYS",
                "a whole number of days",
                &days,
            )?;
            telegram.token_ttl = TimeDelta::days(days as i64);
        }
        app.telegram = telegram;

        Ok(Self {
            api,
            app,
            db_path: var("WAGER_DB"),
            jwt_secret: var("WAGER_JWT_SECRET"),
        })
    }
}

fn parse<T: FromStr>(
    name: &'static str,
    expected: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        expected,
        value: value.to_string(),
    })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            expected: "true or false",
            value: value.to_string(),
        }),
    }
}
