use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{GameError, GameResult};
use crate::round::{CoinFace, GameType, Outcome};

// Provably-fair outcome derivation, shared bit-for-bit with the server:
// "<server_seed>:<client_seed>:<nonce>" -> SHA-256 -> big-endian integer H

/// One game in twenty crashes instantly at 1.00x.
pub const INSTANT_CRASH_MODULUS: u64 = 20;
pub const MIN_CRASH_MULTIPLIER: f64 = 1.0;
pub const MAX_CRASH_MULTIPLIER: f64 = 1_000_000.0;
/// Crash multipliers are truncated to two decimals; anything closer than
/// half a step is the same outcome.
pub const CRASH_TOLERANCE: f64 = 0.005;
const FRACTION_SCALE: u64 = 10_000_000_000_000_000;

pub fn derive_hash_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

pub fn verify_commitment(server_seed_hash: &str, revealed_server_seed: &str) -> bool {
    derive_hash_hex(revealed_server_seed.as_bytes()).eq_ignore_ascii_case(server_seed_hash.trim())
}

// H mod m without materialising the 256-bit integer
fn digest_mod(bytes: &[u8], modulus: u64) -> u64 {
    let m = modulus as u128;
    bytes
        .iter()
        .fold(0u128, |acc, b| (acc * 256 + *b as u128) % m) as u64
}

pub fn crash_multiplier_from_digest(digest: &[u8; 32]) -> f64 {
    if digest_mod(digest, INSTANT_CRASH_MODULUS) == 0 {
        return MIN_CRASH_MULTIPLIER;
    }
    // H >> 8 drops the last digest byte
    let fraction = digest_mod(&digest[..31], FRACTION_SCALE) as f64 / FRACTION_SCALE as f64;
    let raw = ((1.0 / (1.0 - fraction)) * 100.0).floor() / 100.0;
    raw.min(MAX_CRASH_MULTIPLIER)
}

pub fn coin_face_from_digest(digest: &[u8; 32]) -> CoinFace {
    if digest[31] % 2 == 0 {
        CoinFace::Heads
    } else {
        CoinFace::Tails
    }
}

pub fn parse_nonce(raw: &str) -> GameResult<u64> {
    let trimmed = raw.trim();
    trimmed
        .parse::<u64>()
        .map_err(|_| GameError::invalid(format!("nonce must be a non-negative integer, got '{trimmed}'")))
}

/// A validated seed triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvablyFairSeeds {
    pub server_seed: String,
    pub client_seed: String,
    pub nonce: u64,
}

impl ProvablyFairSeeds {
    pub fn new(
        server_seed: impl Into<String>,
        client_seed: impl Into<String>,
        nonce: u64,
    ) -> GameResult<Self> {
        let server_seed = server_seed.into();
        let client_seed = client_seed.into();
        if server_seed.is_empty() {
            return Err(GameError::invalid("server seed must not be empty"));
        }
        if client_seed.is_empty() {
            return Err(GameError::invalid("client seed must not be empty"));
        }
        Ok(Self {
            server_seed,
            client_seed,
            nonce,
        })
    }

    pub fn parse(server_seed: &str, client_seed: &str, nonce: &str) -> GameResult<Self> {
        let nonce = parse_nonce(nonce)?;
        Self::new(server_seed, client_seed, nonce)
    }

    pub fn server_seed_hash_hex(&self) -> String {
        derive_hash_hex(self.server_seed.as_bytes())
    }

    pub fn verification_string(&self) -> String {
        format!("{}:{}:{}", self.server_seed, self.client_seed, self.nonce)
    }

    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.verification_string().as_bytes());
        hasher.finalize().into()
    }

    pub fn outcome(&self, game_type: GameType) -> Outcome {
        let digest = self.digest();
        match game_type {
            GameType::Crash => Outcome::Crash {
                multiplier: crash_multiplier_from_digest(&digest),
            },
            GameType::Coinflip => Outcome::Coinflip {
                face: coin_face_from_digest(&digest),
            },
        }
    }
}

pub fn derive_outcome(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    game_type: GameType,
) -> GameResult<Outcome> {
    Ok(ProvablyFairSeeds::new(server_seed, client_seed, nonce)?.outcome(game_type))
}

pub fn outcomes_match(a: &Outcome, b: &Outcome) -> bool {
    match (a, b) {
        (Outcome::Crash { multiplier: x }, Outcome::Crash { multiplier: y }) => {
            (x - y).abs() < CRASH_TOLERANCE
        }
        (Outcome::Coinflip { face: x }, Outcome::Coinflip { face: y }) => x == y,
        _ => false,
    }
}

/// Recompute the outcome and fail with `VerificationMismatch` if the server's
/// report disagrees.
pub fn check(
    reported: &Outcome,
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    game_type: GameType,
) -> GameResult<Outcome> {
    let recomputed = derive_outcome(server_seed, client_seed, nonce, game_type)?;
    if !outcomes_match(&recomputed, reported) {
        return Err(GameError::VerificationMismatch {
            recomputed: recomputed.to_string(),
            reported: reported.to_string(),
        });
    }
    Ok(recomputed)
}

pub fn verify(
    reported: &Outcome,
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    game_type: GameType,
) -> GameResult<bool> {
    match check(reported, server_seed, client_seed, nonce, game_type) {
        Ok(_) => Ok(true),
        Err(GameError::VerificationMismatch { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn generate_client_seed<R: Rng>(rng: &mut R) -> String {
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}
