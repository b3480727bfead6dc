//! Bot configuration, built from environment variables.

use std::path::PathBuf;

use chrono::Duration;
use secrecy::SecretString;

use crate::entitlement::DEFAULT_SUBSCRIPTION_DAYS;
use crate::error::ConfigError;
use crate::conversation::session::DEFAULT_IDLE_MINUTES;
use crate::summary::DEFAULT_SUMMARY_MODEL;

/// Runtime configuration for the bot.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: SecretString,
    /// Payment provider token; empty for Telegram Stars.
    pub provider_token: String,
    pub db_path: PathBuf,
    /// Open flows idle for this long are discarded.
    pub session_idle_timeout: Duration,
    pub subscription_days: i64,
    /// Usernames or numeric ids allowed to talk to the bot; `*` allows everyone.
    pub allowed_users: Vec<String>,
    /// Enables the Anthropic summarizer when set.
    pub anthropic_api_key: Option<SecretString>,
    pub summary_model: String,
    /// Also write daily-rolling log files here when set.
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let telegram_token = non_empty("TELEGRAM_BOT_TOKEN")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let provider_token = lookup("TELEGRAM_PROVIDER_TOKEN").unwrap_or_default();

        let db_path = non_empty("TEAM_FINDER_DB_PATH")
            .unwrap_or_else(|| "./data/teamfinder.db".to_string())
            .into();

        let idle_minutes = parse_positive(
            "TEAM_FINDER_SESSION_IDLE_MIN",
            non_empty("TEAM_FINDER_SESSION_IDLE_MIN"),
            DEFAULT_IDLE_MINUTES,
        )?;
        let subscription_days = parse_positive(
            "TEAM_FINDER_VIP_DAYS",
            non_empty("TEAM_FINDER_VIP_DAYS"),
            DEFAULT_SUBSCRIPTION_DAYS,
        )?;

        let allowed_users: Vec<String> = lookup("TEAM_FINDER_ALLOWED_USERS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let anthropic_api_key = non_empty("ANTHROPIC_API_KEY").map(SecretString::from);
        let summary_model = non_empty("TEAM_FINDER_SUMMARY_MODEL")
            .unwrap_or_else(|| DEFAULT_SUMMARY_MODEL.to_string());

        let log_dir = non_empty("TEAM_FINDER_LOG_DIR").map(PathBuf::from);

        Ok(Self {
            telegram_token,
            provider_token,
            db_path,
            session_idle_timeout: Duration::minutes(idle_minutes),
            subscription_days,
            allowed_users,
            anthropic_api_key,
            summary_model,
            log_dir,
        })
    }
}

fn parse_positive(key: &str, value: Option<String>, default: i64) -> Result<i64, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a positive integer, got {raw:?}"),
        }),
    }
}
