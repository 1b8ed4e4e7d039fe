use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GameError, GameResult};
use crate::fairness::verify_commitment;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RoundId(pub i64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Crash,
    Coinflip,
}

impl FromStr for GameType {
    type Err = GameError;

    fn from_str(s: &str) -> GameResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crash" => Ok(GameType::Crash),
            "coinflip" => Ok(GameType::Coinflip),
            other => Err(GameError::invalid(format!("unknown game type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CoinFace {
    Heads,
    Tails,
}

impl CoinFace {
    pub fn as_str(self) -> &'static str {
        match self {
            CoinFace::Heads => "heads",
            CoinFace::Tails => "tails",
        }
    }
}

impl fmt::Display for CoinFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoinFace {
    type Err = GameError;

    fn from_str(s: &str) -> GameResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heads" => Ok(CoinFace::Heads),
            "tails" => Ok(CoinFace::Tails),
            other => Err(GameError::invalid(format!(
                "coin face must be 'heads' or 'tails', got '{other}'"
            ))),
        }
    }
}

/// Result of a round as derived from its seed material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum Outcome {
    Crash { multiplier: f64 },
    Coinflip { face: CoinFace },
}

impl Outcome {
    pub fn game_type(&self) -> GameType {
        match self {
            Outcome::Crash { .. } => GameType::Crash,
            Outcome::Coinflip { .. } => GameType::Coinflip,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Crash { multiplier } => write!(f, "{multiplier:.2}x"),
            Outcome::Coinflip { face } => write!(f, "{face}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Pending,
    Active,
    Won,
    Crashed,
}

impl RoundStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundStatus::Won | RoundStatus::Crashed)
    }

    pub fn can_advance_to(self, next: RoundStatus) -> bool {
        matches!(
            (self, next),
            (RoundStatus::Pending, RoundStatus::Active)
                | (RoundStatus::Pending, RoundStatus::Crashed)
                | (RoundStatus::Active, RoundStatus::Won)
                | (RoundStatus::Active, RoundStatus::Crashed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoundKind {
    Crash {
        crash_multiplier: f64,
        cashed_out_at: Option<f64>,
    },
    Coinflip {
        guess: CoinFace,
        result: CoinFace,
        win: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub bet_amount: f64,
    pub created_at: DateTime<Utc>,
    pub status: RoundStatus,
    pub kind: RoundKind,
}

pub fn validate_bet(bet_amount: f64) -> GameResult<f64> {
    if !bet_amount.is_finite() || bet_amount <= 0.0 {
        return Err(GameError::invalid(format!(
            "bet amount must be a positive number, got {bet_amount}"
        )));
    }
    Ok(bet_amount)
}

impl Round {
    pub fn new_crash(
        id: RoundId,
        bet_amount: f64,
        created_at: DateTime<Utc>,
        crash_multiplier: f64,
    ) -> GameResult<Self> {
        validate_bet(bet_amount)?;
        if !crash_multiplier.is_finite() || crash_multiplier < 1.0 {
            return Err(GameError::invalid(format!(
                "crash multiplier must be at least 1.00, got {crash_multiplier}"
            )));
        }
        Ok(Self {
            id,
            bet_amount,
            created_at,
            status: RoundStatus::Pending,
            kind: RoundKind::Crash {
                crash_multiplier,
                cashed_out_at: None,
            },
        })
    }

    /// A coinflip resolves in the same response that creates it.
    pub fn resolved_coinflip(
        id: RoundId,
        bet_amount: f64,
        created_at: DateTime<Utc>,
        guess: CoinFace,
        result: CoinFace,
        win: bool,
    ) -> GameResult<Self> {
        validate_bet(bet_amount)?;
        let mut round = Self {
            id,
            bet_amount,
            created_at,
            status: RoundStatus::Pending,
            kind: RoundKind::Coinflip { guess, result, win },
        };
        round.advance(RoundStatus::Active)?;
        round.advance(if win {
            RoundStatus::Won
        } else {
            RoundStatus::Crashed
        })?;
        Ok(round)
    }

    fn advance(&mut self, next: RoundStatus) -> GameResult<()> {
        if !self.status.can_advance_to(next) {
            return Err(GameError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn activate(&mut self) -> GameResult<()> {
        self.advance(RoundStatus::Active)
    }

    pub fn mark_won(&mut self, multiplier: f64) -> GameResult<()> {
        match &self.kind {
            RoundKind::Crash {
                cashed_out_at: Some(_),
                ..
            } => {
                return Err(GameError::AlreadyResolved(format!(
                    "round {} already cashed out",
                    self.id
                )))
            }
            RoundKind::Crash { .. } => {}
            RoundKind::Coinflip { .. } => {
                return Err(GameError::invalid("coinflip rounds cannot be cashed out"))
            }
        }
        self.advance(RoundStatus::Won)?;
        if let RoundKind::Crash { cashed_out_at, .. } = &mut self.kind {
            *cashed_out_at = Some(multiplier);
        }
        Ok(())
    }

    pub fn mark_crashed(&mut self) -> GameResult<()> {
        self.advance(RoundStatus::Crashed)
    }

    pub fn crash_multiplier(&self) -> Option<f64> {
        match self.kind {
            RoundKind::Crash {
                crash_multiplier, ..
            } => Some(crash_multiplier),
            RoundKind::Coinflip { .. } => None,
        }
    }

    pub fn cashed_out_at(&self) -> Option<f64> {
        match self.kind {
            RoundKind::Crash { cashed_out_at, .. } => cashed_out_at,
            RoundKind::Coinflip { .. } => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RoundStatus::Active
    }
}

/// Provably-fair material for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedCommitment {
    pub seed_id: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: Option<u64>,
    pub revealed_server_seed: Option<String>,
}

impl SeedCommitment {
    pub fn new(
        seed_id: impl Into<String>,
        server_seed_hash: impl Into<String>,
        client_seed: impl Into<String>,
    ) -> Self {
        Self {
            seed_id: seed_id.into(),
            server_seed_hash: server_seed_hash.into(),
            client_seed: client_seed.into(),
            nonce: None,
            revealed_server_seed: None,
        }
    }

    /// Record the revealed server seed. Fails if it does not hash to the
    /// commitment published before the round.
    pub fn reveal(&mut self, server_seed: &str, nonce: u64) -> GameResult<()> {
        if !verify_commitment(&self.server_seed_hash, server_seed) {
            return Err(GameError::VerificationMismatch {
                recomputed: crate::fairness::derive_hash_hex(server_seed.as_bytes()),
                reported: self.server_seed_hash.clone(),
            });
        }
        self.revealed_server_seed = Some(server_seed.to_string());
        self.nonce = Some(nonce);
        Ok(())
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed_server_seed.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiplierSample {
    pub elapsed_seconds: f64,
    pub multiplier: f64,
    pub wall_clock_time: DateTime<Utc>,
}
