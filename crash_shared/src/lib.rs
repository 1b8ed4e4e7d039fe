use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod timestamp;

/// Detail the server sends when a cashout arrives after the crash point.
pub const ALREADY_CRASHED_DETAIL: &str = "Game has already crashed";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StartCrashRequest {
    pub bet_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_seed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StartCrashResponse {
    pub id: i64,
    #[serde(default)]
    pub crash_multiplier: Option<f64>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub bet_amount: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CashoutRequest {
    pub round_id: i64,
    pub cash_out_multiplier: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CashoutResponse {
    pub cashed_out_at: f64,
    pub winnings: f64,
    #[serde(default)]
    pub credits: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RoundRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub bet_amount: Option<f64>,
    #[serde(default)]
    pub cashed_out_at: Option<f64>,
    #[serde(default)]
    pub crashed_at: Option<f64>,
    #[serde(default)]
    pub credits: Option<f64>,
    #[serde(default)]
    pub server_seed: Option<String>,
    #[serde(default)]
    pub client_seed: Option<String>,
    #[serde(default)]
    pub nonce: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerSeedResponse {
    pub seed_hash: String,
    pub seed_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VerifyRoundResponse {
    pub server_seed: String,
    pub client_seed: String,
    pub nonce: u64,
    pub crashed_at: f64,
    pub is_fair: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CoinflipRequest {
    pub bet_amount: f64,
    pub guess: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_seed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CoinflipResponse {
    pub result: String,
    pub win: bool,
    pub credits: f64,
    #[serde(default)]
    pub server_seed: Option<String>,
    #[serde(default)]
    pub client_seed: Option<String>,
    #[serde(default)]
    pub nonce: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RoundSummary {
    pub id: i64,
    pub bet_amount: f64,
    #[serde(default)]
    pub cashed_out_at: Option<f64>,
    #[serde(default)]
    pub crashed_at: Option<f64>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecentCrash {
    pub multiplier: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CrashStats {
    pub total_rounds: u64,
    pub cashed_out_rounds: u64,
    pub crashed_rounds: u64,
    pub win_rate: f64,
    pub total_bet: f64,
    pub total_won: f64,
    pub rtp: f64,
    pub average_crash: f64,
    pub highest_win: f64,
    pub profit: f64,
}

/// Error payload of any non-2xx response. `detail` is usually a string but
/// validation failures carry a list.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: serde_json::Value::String(detail.into()),
        }
    }

    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("server responded with {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(status: u16, detail: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            detail: detail.into(),
        }
    }

    /// The message to show the player.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Status { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_already_crashed(&self) -> bool {
        matches!(self, ApiError::Status { detail, .. } if detail == ALREADY_CRASHED_DETAIL)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
