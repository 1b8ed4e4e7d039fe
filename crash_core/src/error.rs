use crate::round::RoundStatus;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GameError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("round already resolved: {0}")]
    AlreadyResolved(String),
    #[error("verification mismatch: recomputed {recomputed}, server reported {reported}")]
    VerificationMismatch { recomputed: String, reported: String },
    #[error("illegal round transition from {from:?} to {to:?}")]
    IllegalTransition { from: RoundStatus, to: RoundStatus },
}

impl GameError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        GameError::InvalidInput(msg.into())
    }
}

pub type GameResult<T> = Result<T, GameError>;
