//! In-process game server for offline play and tests. Validation rules and
//! error details follow the real server; outcomes come from the same
//! provably-fair derivation the client verifies against.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crash_core::fairness::{derive_hash_hex, generate_client_seed, outcomes_match};
use crash_core::{derive_outcome, Clock, CoinFace, GameType, Outcome};
use crash_shared::{
    ApiError, ApiResult, CashoutRequest, CashoutResponse, CoinflipRequest, CoinflipResponse,
    CrashStats, RecentCrash, RoundRecord, RoundSummary, ServerSeedResponse, StartCrashRequest,
    StartCrashResponse, VerifyRoundResponse, ALREADY_CRASHED_DETAIL,
};

use crate::api::GameServerApi;

pub const MIN_BET: f64 = 0.01;
pub const MAX_BET: f64 = 10_000.0;
pub const STARTING_CREDITS: f64 = 1_000.0;
const RECENT_LIMIT: usize = 20;

#[derive(Debug, Clone)]
struct SimRound {
    id: i64,
    bet_amount: f64,
    crash_multiplier: f64,
    cashed_out_at: Option<f64>,
    created_at: DateTime<Utc>,
    server_seed: String,
    client_seed: String,
    nonce: u64,
}

struct SimState {
    credits: f64,
    nonce: u64,
    next_round_id: i64,
    next_seed_id: u64,
    rng: StdRng,
    committed: HashMap<String, String>,
    rounds: Vec<SimRound>,
    #[cfg(test)]
    forced_crash: Option<f64>,
}

impl SimState {
    fn new_server_seed(&mut self) -> String {
        let bytes: [u8; 32] = self.rng.random();
        hex::encode(bytes)
    }

    /// Server seed for a new round: the committed one if the client names it,
    /// otherwise a fresh one. Committed seeds are single use.
    fn take_seed(&mut self, seed_id: Option<&str>) -> ApiResult<String> {
        match seed_id {
            Some(id) => self
                .committed
                .remove(id)
                .ok_or_else(|| ApiError::status(404, "Seed not found")),
            None => Ok(self.new_server_seed()),
        }
    }

    fn client_seed(&mut self, requested: Option<&str>) -> String {
        match requested.map(str::trim).filter(|s| !s.is_empty()) {
            Some(seed) => seed.to_string(),
            None => generate_client_seed(&mut self.rng),
        }
    }

    fn round(&self, round_id: i64) -> ApiResult<&SimRound> {
        self.rounds
            .iter()
            .find(|r| r.id == round_id)
            .ok_or_else(|| ApiError::status(404, "Round not found"))
    }
}

fn check_bet(bet_amount: f64, credits: f64) -> ApiResult<f64> {
    if !bet_amount.is_finite() || bet_amount <= 0.0 {
        return Err(ApiError::status(400, "Invalid bet amount"));
    }
    if bet_amount < MIN_BET {
        return Err(ApiError::status(400, format!("Minimum bet is ${MIN_BET}")));
    }
    if bet_amount > MAX_BET {
        return Err(ApiError::status(400, format!("Maximum bet is ${MAX_BET}")));
    }
    if bet_amount > credits {
        return Err(ApiError::status(400, "Insufficient credits"));
    }
    Ok(round2(bet_amount))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Clone)]
pub struct SimulatedServer<C> {
    clock: C,
    state: Arc<Mutex<SimState>>,
}

impl<C: Clock> SimulatedServer<C> {
    pub fn new(clock: C, credits: f64) -> Self {
        Self::with_rng(clock, credits, StdRng::from_os_rng())
    }

    /// Deterministic seeds, for reproducible sessions.
    pub fn seeded(clock: C, credits: f64, seed: u64) -> Self {
        Self::with_rng(clock, credits, StdRng::seed_from_u64(seed))
    }

    fn with_rng(clock: C, credits: f64, rng: StdRng) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(SimState {
                credits,
                nonce: 0,
                next_round_id: 1,
                next_seed_id: 1,
                rng,
                committed: HashMap::new(),
                rounds: Vec::new(),
                #[cfg(test)]
                forced_crash: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn credits(&self) -> f64 {
        self.state().credits
    }

    pub fn round_count(&self) -> usize {
        self.state().rounds.len()
    }

    /// Overrides the derived crash point of the next round. Such a round no
    /// longer verifies against its seeds.
    #[cfg(test)]
    pub(crate) fn force_next_crash(&self, multiplier: f64) {
        self.state().forced_crash = Some(multiplier);
    }

    /// Changes the crash point recorded for a round after it was started.
    #[cfg(test)]
    pub(crate) fn rewrite_crash(&self, round_id: i64, multiplier: f64) {
        if let Some(r) = self.state().rounds.iter_mut().find(|r| r.id == round_id) {
            r.crash_multiplier = multiplier;
        }
    }

    /// Drops a round, as a server that lost its state would.
    #[cfg(test)]
    pub(crate) fn forget_round(&self, round_id: i64) {
        self.state().rounds.retain(|r| r.id != round_id);
    }

    /// Changes the server seed revealed for a round.
    #[cfg(test)]
    pub(crate) fn replace_server_seed(&self, round_id: i64, server_seed: &str) {
        if let Some(r) = self.state().rounds.iter_mut().find(|r| r.id == round_id) {
            r.server_seed = server_seed.to_string();
        }
    }
}

impl<C: Clock> GameServerApi for SimulatedServer<C> {
    async fn start_crash(&self, req: &StartCrashRequest) -> ApiResult<StartCrashResponse> {
        let now = self.clock.now();
        let mut st = self.state();
        let bet_amount = check_bet(req.bet_amount, st.credits)?;
        let server_seed = st.take_seed(req.seed_id.as_deref())?;
        let client_seed = st.client_seed(req.client_seed.as_deref());
        st.nonce += 1;
        let nonce = st.nonce;
        let crash_multiplier = match derive_outcome(&server_seed, &client_seed, nonce, GameType::Crash)
        {
            Ok(Outcome::Crash { multiplier }) => multiplier,
            _ => return Err(ApiError::status(500, "Failed to generate crash point")),
        };
        #[cfg(test)]
        let crash_multiplier = st.forced_crash.take().unwrap_or(crash_multiplier);

        let id = st.next_round_id;
        st.next_round_id += 1;
        st.credits -= bet_amount;
        st.rounds.push(SimRound {
            id,
            bet_amount,
            crash_multiplier,
            cashed_out_at: None,
            created_at: now,
            server_seed,
            client_seed,
            nonce,
        });
        info!(round = id, bet_amount, crash_multiplier, "simulated round started");
        Ok(StartCrashResponse {
            id,
            crash_multiplier: Some(crash_multiplier),
            created_at: now,
            bet_amount: Some(bet_amount),
        })
    }

    async fn cash_out(&self, req: &CashoutRequest) -> ApiResult<CashoutResponse> {
        let mut st = self.state();
        let idx = st
            .rounds
            .iter()
            .position(|r| r.id == req.round_id)
            .ok_or_else(|| ApiError::status(404, "Round not found"))?;
        let round = &st.rounds[idx];
        if round.cashed_out_at.is_some() {
            return Err(ApiError::status(400, "Already cashed out"));
        }
        if !req.cash_out_multiplier.is_finite() || req.cash_out_multiplier < 1.0 {
            return Err(ApiError::status(400, "Invalid cash out multiplier"));
        }
        if req.cash_out_multiplier >= round.crash_multiplier {
            return Err(ApiError::status(400, ALREADY_CRASHED_DETAIL));
        }
        let winnings = round.bet_amount * req.cash_out_multiplier;
        let cashed_out_at = round2(req.cash_out_multiplier);
        st.rounds[idx].cashed_out_at = Some(cashed_out_at);
        st.credits += winnings;
        Ok(CashoutResponse {
            cashed_out_at,
            winnings,
            credits: Some(st.credits),
        })
    }

    async fn crash_round(&self, round_id: i64) -> ApiResult<RoundRecord> {
        let st = self.state();
        let round = st.round(round_id)?;
        Ok(RoundRecord {
            id: Some(round.id),
            bet_amount: Some(round.bet_amount),
            cashed_out_at: round.cashed_out_at,
            crashed_at: Some(round.crash_multiplier),
            credits: Some(st.credits),
            server_seed: Some(round.server_seed.clone()),
            client_seed: Some(round.client_seed.clone()),
            nonce: Some(round.nonce),
        })
    }

    async fn server_seed(&self) -> ApiResult<ServerSeedResponse> {
        let mut st = self.state();
        let seed = st.new_server_seed();
        let seed_id = format!("seed-{}", st.next_seed_id);
        st.next_seed_id += 1;
        let seed_hash = derive_hash_hex(seed.as_bytes());
        st.committed.insert(seed_id.clone(), seed);
        Ok(ServerSeedResponse { seed_hash, seed_id })
    }

    async fn verify_round(&self, round_id: i64) -> ApiResult<VerifyRoundResponse> {
        let st = self.state();
        let round = st.round(round_id)?;
        let reported = Outcome::Crash {
            multiplier: round.crash_multiplier,
        };
        let is_fair = derive_outcome(
            &round.server_seed,
            &round.client_seed,
            round.nonce,
            GameType::Crash,
        )
        .map(|o| outcomes_match(&o, &reported))
        .unwrap_or(false);
        Ok(VerifyRoundResponse {
            server_seed: round.server_seed.clone(),
            client_seed: round.client_seed.clone(),
            nonce: round.nonce,
            crashed_at: round.crash_multiplier,
            is_fair,
        })
    }

    async fn play_coinflip(&self, req: &CoinflipRequest) -> ApiResult<CoinflipResponse> {
        let guess: CoinFace = req
            .guess
            .parse()
            .map_err(|_| ApiError::status(400, "Guess must be 'heads' or 'tails'"))?;
        let mut st = self.state();
        if !req.bet_amount.is_finite() || req.bet_amount <= 0.0 || req.bet_amount > st.credits {
            return Err(ApiError::status(400, "Invalid bet amount"));
        }
        let server_seed = st.take_seed(req.seed_id.as_deref())?;
        let client_seed = st.client_seed(req.client_seed.as_deref());
        st.nonce += 1;
        let nonce = st.nonce;
        let face = match derive_outcome(&server_seed, &client_seed, nonce, GameType::Coinflip) {
            Ok(Outcome::Coinflip { face }) => face,
            _ => return Err(ApiError::status(500, "Failed to flip coin")),
        };
        let win = face == guess;
        if win {
            st.credits += req.bet_amount;
        } else {
            st.credits -= req.bet_amount;
        }
        Ok(CoinflipResponse {
            result: face.to_string(),
            win,
            credits: st.credits,
            server_seed: Some(server_seed),
            client_seed: Some(client_seed),
            nonce: Some(nonce),
        })
    }

    async fn rounds(&self) -> ApiResult<Vec<RoundSummary>> {
        let st = self.state();
        Ok(st
            .rounds
            .iter()
            .rev()
            .map(|r| RoundSummary {
                id: r.id,
                bet_amount: r.bet_amount,
                cashed_out_at: r.cashed_out_at,
                crashed_at: Some(r.crash_multiplier),
                created_at: r.created_at,
            })
            .collect())
    }

    async fn recent(&self) -> ApiResult<Vec<RecentCrash>> {
        let st = self.state();
        Ok(st
            .rounds
            .iter()
            .rev()
            .take(RECENT_LIMIT)
            .map(|r| RecentCrash {
                multiplier: r.crash_multiplier,
            })
            .collect())
    }

    async fn stats(&self) -> ApiResult<CrashStats> {
        let st = self.state();
        let rounds = &st.rounds;
        let total = rounds.len();
        let cashed: Vec<&SimRound> = rounds.iter().filter(|r| r.cashed_out_at.is_some()).collect();
        let total_bet: f64 = rounds.iter().map(|r| r.bet_amount).sum();
        let payouts = cashed
            .iter()
            .map(|r| r.bet_amount * r.cashed_out_at.unwrap_or(0.0));
        let total_won: f64 = payouts.clone().sum();
        let highest_win = payouts.fold(0.0, f64::max);
        let pct = |num: f64, den: f64| if den > 0.0 { num / den * 100.0 } else { 0.0 };
        let average_crash = if total > 0 {
            rounds.iter().map(|r| r.crash_multiplier).sum::<f64>() / total as f64
        } else {
            0.0
        };
        Ok(CrashStats {
            total_rounds: total as u64,
            cashed_out_rounds: cashed.len() as u64,
            crashed_rounds: (total - cashed.len()) as u64,
            win_rate: pct(cashed.len() as f64, total as f64),
            total_bet: round2(total_bet),
            total_won: round2(total_won),
            rtp: round2(pct(total_won, total_bet)),
            average_crash: round2(average_crash),
            highest_win: round2(highest_win),
            profit: round2(total_won - total_bet),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crash_core::fairness::verify_commitment;
    use crash_core::ManualClock;

    fn server(credits: f64) -> SimulatedServer<ManualClock> {
        SimulatedServer::seeded(ManualClock::new(Utc::now()), credits, 7)
    }

    fn start(bet_amount: f64) -> StartCrashRequest {
        StartCrashRequest {
            bet_amount,
            client_seed: Some("client".into()),
            seed_id: None,
        }
    }

    #[tokio::test]
    async fn start_validates_bet() {
        let srv = server(5.0);
        for (bet, detail) in [
            (0.0, "Invalid bet amount"),
            (0.001, "Minimum bet is $0.01"),
            (20_000.0, "Maximum bet is $10000"),
            (6.0, "Insufficient credits"),
        ] {
            let err = srv.start_crash(&start(bet)).await.unwrap_err();
            assert_eq!(err.detail(), detail);
        }
        assert_eq!(srv.round_count(), 0);
    }

    #[tokio::test]
    async fn committed_seed_is_used_and_revealed() {
        let srv = server(100.0);
        let commit = srv.server_seed().await.unwrap();
        let res = srv
            .start_crash(&StartCrashRequest {
                bet_amount: 1.0,
                client_seed: Some("mine".into()),
                seed_id: Some(commit.seed_id.clone()),
            })
            .await
            .unwrap();
        let record = srv.crash_round(res.id).await.unwrap();
        let revealed = record.server_seed.unwrap();
        assert!(verify_commitment(&commit.seed_hash, &revealed));
        assert_eq!(record.client_seed.as_deref(), Some("mine"));
        let derived = derive_outcome(&revealed, "mine", record.nonce.unwrap(), GameType::Crash).unwrap();
        assert_eq!(
            derived,
            Outcome::Crash {
                multiplier: res.crash_multiplier.unwrap()
            }
        );
        assert!(srv.verify_round(res.id).await.unwrap().is_fair);
        // single use
        let err = srv
            .start_crash(&StartCrashRequest {
                bet_amount: 1.0,
                client_seed: None,
                seed_id: Some(commit.seed_id),
            })
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "Seed not found");
    }

    #[tokio::test]
    async fn cashout_rules() {
        let srv = server(100.0);
        srv.force_next_crash(2.5);
        let res = srv.start_crash(&start(10.0)).await.unwrap();
        assert_eq!(srv.credits(), 90.0);
        let req = |m: f64| CashoutRequest {
            round_id: res.id,
            cash_out_multiplier: m,
        };
        assert!(srv.cash_out(&req(2.5)).await.unwrap_err().is_already_crashed());
        assert_eq!(
            srv.cash_out(&req(0.5)).await.unwrap_err().detail(),
            "Invalid cash out multiplier"
        );
        let ok = srv.cash_out(&req(2.0)).await.unwrap();
        assert_eq!(ok.cashed_out_at, 2.0);
        assert_eq!(ok.winnings, 20.0);
        assert_eq!(ok.credits, Some(110.0));
        assert_eq!(
            srv.cash_out(&req(2.1)).await.unwrap_err().detail(),
            "Already cashed out"
        );
        assert_eq!(
            srv.cash_out(&CashoutRequest {
                round_id: 99,
                cash_out_multiplier: 1.5
            })
            .await
            .unwrap_err()
            .detail(),
            "Round not found"
        );
        // forced crash points do not verify
        assert!(!srv.verify_round(res.id).await.unwrap().is_fair);
    }

    #[tokio::test]
    async fn coinflip_moves_credits_by_the_bet() {
        let srv = server(50.0);
        let bad = CoinflipRequest {
            bet_amount: 1.0,
            guess: "edge".into(),
            client_seed: None,
            seed_id: None,
        };
        assert_eq!(
            srv.play_coinflip(&bad).await.unwrap_err().detail(),
            "Guess must be 'heads' or 'tails'"
        );
        let res = srv
            .play_coinflip(&CoinflipRequest {
                guess: "heads".into(),
                ..bad
            })
            .await
            .unwrap();
        let expected = if res.win { 51.0 } else { 49.0 };
        assert_eq!(res.credits, expected);
        assert_eq!(res.win, res.result == "heads");
    }

    #[tokio::test]
    async fn stats_and_recent() {
        let srv = server(100.0);
        srv.force_next_crash(3.0);
        let a = srv.start_crash(&start(10.0)).await.unwrap();
        srv.cash_out(&CashoutRequest {
            round_id: a.id,
            cash_out_multiplier: 1.5,
        })
        .await
        .unwrap();
        srv.force_next_crash(1.0);
        srv.start_crash(&start(10.0)).await.unwrap();

        let stats = srv.stats().await.unwrap();
        assert_eq!(stats.total_rounds, 2);
        assert_eq!(stats.cashed_out_rounds, 1);
        assert_eq!(stats.crashed_rounds, 1);
        assert_eq!(stats.win_rate, 50.0);
        assert_eq!(stats.total_bet, 20.0);
        assert_eq!(stats.total_won, 15.0);
        assert_eq!(stats.rtp, 75.0);
        assert_eq!(stats.average_crash, 2.0);
        assert_eq!(stats.highest_win, 15.0);
        assert_eq!(stats.profit, -5.0);

        let recent: Vec<f64> = srv.recent().await.unwrap().iter().map(|r| r.multiplier).collect();
        assert_eq!(recent, vec![1.0, 3.0]);
        let rounds = srv.rounds().await.unwrap();
        assert_eq!(rounds[0].id, 2);
        assert_eq!(rounds[1].cashed_out_at, Some(1.5));
    }
}
