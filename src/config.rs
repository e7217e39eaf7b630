use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://comments.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_RISK_THRESHOLD: i64 = 50;
pub const DEFAULT_REPORT_WEIGHT: i64 = 20;
pub const DEFAULT_FLAG_WEIGHT: i64 = 30;

/// Scoring knobs for the deterministic auto-moderation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationSettings {
    /// A comment is flagged when its risk score is strictly greater than this.
    pub risk_threshold: i64,
    pub report_weight: i64,
    pub flag_weight: i64,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            risk_threshold: DEFAULT_RISK_THRESHOLD,
            report_weight: DEFAULT_REPORT_WEIGHT,
            flag_weight: DEFAULT_FLAG_WEIGHT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub require_approval: bool,
    pub moderation: ModerationSettings,
    pub auto_moderation_interval: Option<Duration>,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = std::env::var("SECRET_KEY").context("SECRET_KEY must be set in .env")?;

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        let require_approval = std::env::var("COMMENTS_REQUIRE_APPROVAL")
            .ok()
            .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let moderation = ModerationSettings {
            risk_threshold: env_i64("AUTO_MODERATION_THRESHOLD", DEFAULT_RISK_THRESHOLD),
            report_weight: env_i64("AUTO_MODERATION_REPORT_WEIGHT", DEFAULT_REPORT_WEIGHT),
            flag_weight: env_i64("AUTO_MODERATION_FLAG_WEIGHT", DEFAULT_FLAG_WEIGHT),
        };

        let auto_moderation_interval = std::env::var("AUTO_MODERATION_INTERVAL_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            database_url,
            bind_addr,
            jwt_secret,
            require_approval,
            moderation,
            auto_moderation_interval,
        })
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(default)
}
