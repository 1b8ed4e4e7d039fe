use std::time::Duration;

use crash_core::multiplier::TICK_INTERVAL;
use crash_core::{GameError, GameResult};

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub tick_interval: Duration,
    pub request_timeout: Duration,
    /// Fetch a seed commitment and send a fresh client seed with every round.
    pub provably_fair: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            token: None,
            tick_interval: TICK_INTERVAL,
            request_timeout: Duration::from_secs(10),
            provably_fair: true,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> GameResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> GameResult<Self> {
        let mut config = Self::default();
        if let Some(url) = get("BACKEND_URL").filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().trim_end_matches('/').to_string();
        }
        config.token = get("CRASH_API_TOKEN").filter(|v| !v.trim().is_empty());
        if let Some(raw) = get("CRASH_TICK_MS") {
            let ms = parse_positive(&raw, "CRASH_TICK_MS")?;
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(raw) = get("CRASH_TIMEOUT_SECS") {
            let secs = parse_positive(&raw, "CRASH_TIMEOUT_SECS")?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("CRASH_PROVABLY_FAIR") {
            config.provably_fair = parse_flag(&raw)?;
        }
        Ok(config)
    }
}

fn parse_positive(raw: &str, key: &str) -> GameResult<u64> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(GameError::invalid(format!(
            "{key} must be a positive integer, got '{raw}'"
        ))),
    }
}

fn parse_flag(raw: &str) -> GameResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(GameError::invalid(format!(
            "CRASH_PROVABLY_FAIR must be true or false, got '{other}'"
        ))),
    }
}
