use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crash_core::fairness::{generate_client_seed, outcomes_match, verify_commitment};
use crash_core::round::validate_bet;
use crash_core::{
    derive_outcome, AutoCashout, CashoutController, CashoutPhase, CashoutRequest, CashoutTrigger,
    ChartAccumulator, ChartPhase, ClockState, Clock, CoinFace, GameError, GameResult, GameType,
    MultiplierClock, MultiplierSample, Outcome, Round, RoundId, RoundStatus, SeedCommitment,
    StopReason, Tick, Viewport,
};
use crash_shared as wire;

use crate::api::{api_error, GameServerApi};
use crate::config::ClientConfig;
use crate::history::HistorySummary;

/// Server and local crash points further apart than this are reported.
pub const CRASH_CONSISTENCY_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickEvent {
    Sample(MultiplierSample),
    /// Auto-cashout fired; hand the request to `resolve_cashout`.
    CashoutDue(CashoutRequest),
    Crashed(MultiplierSample),
    Stale,
    /// A cashout request is still outstanding.
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoundResolution {
    Won {
        round_id: RoundId,
        cashed_out_at: f64,
        winnings: f64,
        trigger: CashoutTrigger,
    },
    Crashed {
        round_id: RoundId,
        crash_multiplier: f64,
        /// Set when the server refused a cashout because the round had
        /// already crashed.
        rejected_cashout: Option<f64>,
        /// `None` when the server's record of the round could not be fetched.
        check: Option<CrashCheck>,
    },
}

/// What the server's record of a crashed round says about the local result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrashCheck {
    pub server_crash_multiplier: Option<f64>,
    /// False when the server's crash point is more than
    /// `CRASH_CONSISTENCY_TOLERANCE` away from the local one.
    pub consistent: bool,
    /// `None` without a commitment or without revealed seeds.
    pub commitment_ok: Option<bool>,
    /// `None` when the record carries no seed material.
    pub fair: Option<bool>,
}

impl CrashCheck {
    pub fn is_clean(&self) -> bool {
        self.consistent && self.commitment_ok != Some(false) && self.fair != Some(false)
    }
}

impl RoundResolution {
    pub fn round_id(&self) -> RoundId {
        match self {
            RoundResolution::Won { round_id, .. } | RoundResolution::Crashed { round_id, .. } => {
                *round_id
            }
        }
    }

    pub fn is_win(&self) -> bool {
        matches!(self, RoundResolution::Won { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    pub round_id: RoundId,
    pub server_seed: String,
    pub client_seed: String,
    pub nonce: u64,
    pub reported: Outcome,
    pub recomputed: Outcome,
    pub server_says_fair: bool,
    pub matches: bool,
    /// Whether the revealed seed hashes to the commitment this session saw
    /// before the round; `None` when the session holds no commitment for it.
    pub commitment_ok: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoinflipReport {
    pub round: Round,
    pub credits: f64,
    /// `None` when the server did not reveal its seed material.
    pub verified: Option<bool>,
}

/// One player's game state: the current round and everything that belongs to
/// it. Borrowed mutably by the runners for the length of a round.
pub struct GameSession<A, C> {
    api: A,
    clock: C,
    tick_interval: Duration,
    provably_fair: bool,
    balance: Option<f64>,
    round: Option<Round>,
    commitment: Option<SeedCommitment>,
    multiplier: MultiplierClock,
    chart: ChartAccumulator,
    cashout: CashoutController,
    auto_cashout: AutoCashout,
    last_nonce: Option<u64>,
}

impl<A: GameServerApi, C: Clock> GameSession<A, C> {
    pub fn new(api: A, clock: C, config: &ClientConfig) -> Self {
        Self {
            api,
            clock,
            tick_interval: config.tick_interval,
            provably_fair: config.provably_fair,
            balance: None,
            round: None,
            commitment: None,
            multiplier: MultiplierClock::new(),
            chart: ChartAccumulator::new(),
            cashout: CashoutController::new(),
            auto_cashout: AutoCashout::disabled(),
            last_nonce: None,
        }
    }

    pub fn with_balance(mut self, credits: f64) -> Self {
        self.balance = Some(credits);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn balance(&self) -> Option<f64> {
        self.balance
    }

    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    pub fn commitment(&self) -> Option<&SeedCommitment> {
        self.commitment.as_ref()
    }

    pub fn chart(&self) -> &ChartAccumulator {
        &self.chart
    }

    pub fn multiplier_clock(&self) -> &MultiplierClock {
        &self.multiplier
    }

    pub fn cashout_phase(&self) -> CashoutPhase {
        self.cashout.phase()
    }

    pub fn is_round_running(&self) -> bool {
        self.multiplier.is_running()
    }

    pub fn set_auto_cashout(&mut self, settings: AutoCashout) {
        self.auto_cashout = settings;
    }

    pub fn auto_cashout(&self) -> AutoCashout {
        self.auto_cashout
    }

    pub fn viewport(&self) -> Viewport {
        let phase = match &self.round {
            Some(r) if r.is_active() => ChartPhase::Active,
            Some(r) if r.status == RoundStatus::Crashed => r
                .crash_multiplier()
                .map(|crash_multiplier| ChartPhase::Crashed { crash_multiplier })
                .unwrap_or(ChartPhase::Idle),
            _ => ChartPhase::Idle,
        };
        self.chart.viewport(phase)
    }

    fn ensure_idle(&self) -> GameResult<()> {
        match &self.round {
            Some(r) if !r.status.is_terminal() => Err(GameError::invalid(format!(
                "round {} is still in progress",
                r.id
            ))),
            _ => Ok(()),
        }
    }

    /// Fetches a commitment for the next round and pairs it with a fresh
    /// client seed.
    async fn commit_seeds(&mut self) -> GameResult<Option<SeedCommitment>> {
        if !self.provably_fair {
            return Ok(None);
        }
        let seed = self.api.server_seed().await.map_err(api_error)?;
        let client_seed = generate_client_seed(&mut rand::rng());
        debug!(seed_id = %seed.seed_id, hash = %seed.seed_hash, "server seed committed");
        Ok(Some(SeedCommitment::new(
            seed.seed_id,
            seed.seed_hash,
            client_seed,
        )))
    }

    fn observe_nonce(&mut self, nonce: u64) {
        if let Some(prev) = self.last_nonce {
            if nonce <= prev {
                warn!(nonce, previous = prev, "server nonce did not increase");
            }
        }
        self.last_nonce = Some(nonce);
    }

    fn check_bet(&self, bet_amount: f64) -> GameResult<()> {
        validate_bet(bet_amount)?;
        match self.balance {
            Some(balance) if bet_amount > balance => Err(GameError::invalid(format!(
                "bet {bet_amount:.2} exceeds balance {balance:.2}"
            ))),
            _ => Ok(()),
        }
    }

    /// Starts a crash round. The previous round must be finished; its clock
    /// and chart are discarded.
    pub async fn start_round(&mut self, bet_amount: f64, auto: AutoCashout) -> GameResult<RoundId> {
        self.check_bet(bet_amount)?;
        self.ensure_idle()?;
        self.multiplier.stop_with_error();

        let commitment = self.commit_seeds().await?;
        let req = wire::StartCrashRequest {
            bet_amount,
            client_seed: commitment.as_ref().map(|c| c.client_seed.clone()),
            seed_id: commitment.as_ref().map(|c| c.seed_id.clone()),
        };
        let res = self.api.start_crash(&req).await.map_err(api_error)?;
        let crash = res.crash_multiplier.ok_or_else(|| {
            GameError::Network(format!("round {} started without a crash multiplier", res.id))
        })?;
        let id = RoundId(res.id);
        let bet_amount = res.bet_amount.unwrap_or(bet_amount);
        let mut round = Round::new_crash(id, bet_amount, res.created_at, crash)
            .map_err(|e| GameError::Network(format!("malformed round from server: {e}")))?;
        round.activate()?;

        let mut clock = MultiplierClock::new();
        clock.start(round.created_at, Some(crash))?;
        self.multiplier = clock;
        self.chart.reset(id);
        self.cashout.reset(id);
        self.auto_cashout = auto;
        self.commitment = commitment;
        self.round = Some(round);
        if let Some(balance) = self.balance.as_mut() {
            *balance -= bet_amount;
        }
        info!(round = %id, bet_amount, crash_multiplier = crash, "round started");
        Ok(id)
    }

    /// Samples the running round.
    pub fn tick(&mut self) -> GameResult<TickEvent> {
        if self.cashout.is_in_flight() {
            return Ok(TickEvent::Suspended);
        }
        let now = self.clock.now();
        match self.multiplier.tick(now)? {
            Tick::Stale => Ok(TickEvent::Stale),
            Tick::Sample(sample) => {
                self.chart.push(sample);
                debug!(
                    elapsed = sample.elapsed_seconds,
                    multiplier = sample.multiplier,
                    "tick"
                );
                match self.cashout.evaluate(&sample, &self.auto_cashout) {
                    Some(req) => {
                        info!(round = %req.round_id, multiplier = req.multiplier, "auto cashout triggered");
                        Ok(TickEvent::CashoutDue(req))
                    }
                    None => Ok(TickEvent::Sample(sample)),
                }
            }
            Tick::Crashed(sample) => {
                self.chart.push(sample);
                self.cashout.mark_crashed();
                Ok(TickEvent::Crashed(sample))
            }
        }
    }

    /// Manual cashout at the current multiplier.
    pub async fn cash_out(&mut self) -> GameResult<RoundResolution> {
        if !self.multiplier.is_running() {
            return Err(GameError::invalid("no running round to cash out"));
        }
        let req = self
            .cashout
            .request_manual(self.multiplier.current_multiplier())?;
        info!(round = %req.round_id, multiplier = req.multiplier, "manual cashout requested");
        self.resolve_cashout(req).await
    }

    /// Sends a cashout request issued by the controller and settles the round
    /// from the server's answer. A rejected cashout is never retried. Only the
    /// request currently in flight for the current round is accepted.
    pub async fn resolve_cashout(&mut self, req: CashoutRequest) -> GameResult<RoundResolution> {
        let current = self.round.as_ref().map(|r| r.id);
        if current != Some(req.round_id) || self.cashout.phase() != CashoutPhase::InFlight(req) {
            return Err(GameError::invalid(format!(
                "no cashout in flight for round {} at {:.2}x",
                req.round_id, req.multiplier
            )));
        }
        let body = wire::CashoutRequest {
            round_id: req.round_id.0,
            cash_out_multiplier: req.multiplier,
        };
        match self.api.cash_out(&body).await {
            Ok(res) => {
                self.cashout.resolve_cashed(res.cashed_out_at);
                if self.multiplier.is_running() {
                    self.multiplier.stop_as_cashed(res.cashed_out_at)?;
                }
                if let Some(round) = self.round.as_mut() {
                    round.mark_won(res.cashed_out_at)?;
                }
                self.balance = match (res.credits, self.balance) {
                    (Some(credits), _) => Some(credits),
                    (None, Some(balance)) => Some(balance + res.winnings),
                    (None, None) => None,
                };
                info!(
                    round = %req.round_id,
                    cashed_out_at = res.cashed_out_at,
                    winnings = res.winnings,
                    "cashed out"
                );
                Ok(RoundResolution::Won {
                    round_id: req.round_id,
                    cashed_out_at: res.cashed_out_at,
                    winnings: res.winnings,
                    trigger: req.trigger,
                })
            }
            Err(err) => match api_error(err) {
                GameError::AlreadyResolved(detail) => {
                    let crash = self.local_crash_point();
                    self.cashout.mark_crashed();
                    if self.multiplier.is_running() {
                        self.multiplier.stop_as_crashed(crash)?;
                    }
                    self.settle_crashed();
                    warn!(
                        round = %req.round_id,
                        requested = req.multiplier,
                        crash_multiplier = crash,
                        %detail,
                        "cashout rejected, round already crashed"
                    );
                    let check = self.fetch_and_check(req.round_id, crash).await;
                    Ok(RoundResolution::Crashed {
                        round_id: req.round_id,
                        crash_multiplier: crash,
                        rejected_cashout: Some(req.multiplier),
                        check,
                    })
                }
                other => {
                    self.abort_round();
                    Err(other)
                }
            },
        }
    }

    fn local_crash_point(&self) -> f64 {
        self.round
            .as_ref()
            .and_then(Round::crash_multiplier)
            .or(self.multiplier.target())
            .unwrap_or(1.0)
    }

    fn settle_crashed(&mut self) {
        if let Some(round) = self.round.as_mut() {
            if !round.status.is_terminal() {
                if let Err(e) = round.mark_crashed() {
                    warn!(error = %e, "could not mark round crashed");
                }
            }
        }
    }

    /// Puts the round into a terminal state after a failure.
    pub fn abort_round(&mut self) {
        self.multiplier.stop_with_error();
        self.cashout.mark_crashed();
        self.settle_crashed();
    }

    /// Releases the clock and abandons any round in progress.
    pub fn teardown(&mut self) {
        if self.multiplier.is_running() {
            info!("session torn down with a round in progress");
        }
        self.abort_round();
    }

    /// Settles a round whose clock reached the crash point, then checks the
    /// local result against the server's record. Disagreements are logged
    /// and reported in the resolution; the local result stands.
    pub async fn confirm_crash(&mut self) -> GameResult<RoundResolution> {
        if self.multiplier.state() != ClockState::Stopped(StopReason::Crashed) {
            return Err(GameError::invalid(format!(
                "clock has not reached the crash point (state {:?})",
                self.multiplier.state()
            )));
        }
        let round_id = self
            .round
            .as_ref()
            .map(|r| r.id)
            .ok_or_else(|| GameError::invalid("no round to confirm"))?;
        let local = self
            .multiplier
            .final_multiplier()
            .unwrap_or_else(|| self.local_crash_point());
        self.settle_crashed();
        info!(round = %round_id, crash_multiplier = local, "round crashed");

        let check = self.fetch_and_check(round_id, local).await;
        Ok(RoundResolution::Crashed {
            round_id,
            crash_multiplier: local,
            rejected_cashout: None,
            check,
        })
    }

    /// Fetches the server's record of a crashed round and checks it. A failed
    /// fetch is logged and yields `None`.
    async fn fetch_and_check(&mut self, round_id: RoundId, local: f64) -> Option<CrashCheck> {
        match self.api.crash_round(round_id.0).await {
            Ok(record) => Some(self.check_record(round_id, local, &record)),
            Err(e) => {
                warn!(round = %round_id, error = %e, "could not fetch crashed round");
                None
            }
        }
    }

    fn check_record(
        &mut self,
        round_id: RoundId,
        local: f64,
        record: &wire::RoundRecord,
    ) -> CrashCheck {
        if let Some(credits) = record.credits {
            self.balance = Some(credits);
        }
        let mut check = CrashCheck {
            server_crash_multiplier: record.crashed_at,
            consistent: true,
            commitment_ok: None,
            fair: None,
        };
        if let Some(server) = record.crashed_at {
            if (server - local).abs() > CRASH_CONSISTENCY_TOLERANCE {
                warn!(round = %round_id, local, server, "crash point differs from server record");
                check.consistent = false;
            }
        }
        let (Some(server_seed), Some(client_seed), Some(nonce)) =
            (&record.server_seed, &record.client_seed, record.nonce)
        else {
            return check;
        };
        self.observe_nonce(nonce);
        if let Some(commitment) = self.commitment.as_mut() {
            let revealed = commitment.reveal(server_seed, nonce);
            if let Err(e) = &revealed {
                warn!(round = %round_id, error = %e, "revealed server seed does not match commitment");
            }
            check.commitment_ok = Some(revealed.is_ok());
        }
        if let Some(server) = record.crashed_at {
            let reported = Outcome::Crash { multiplier: server };
            let verified =
                crash_core::fairness::check(&reported, server_seed, client_seed, nonce, GameType::Crash);
            if let Err(e) = &verified {
                warn!(round = %round_id, error = %e, "round failed verification");
            }
            check.fair = Some(verified.is_ok());
        }
        check
    }

    /// Asks the server for a round's seed material and recomputes the
    /// outcome locally.
    pub async fn verify_round(&mut self, round_id: RoundId) -> GameResult<VerificationReport> {
        let res = self.api.verify_round(round_id.0).await.map_err(api_error)?;
        let recomputed = derive_outcome(&res.server_seed, &res.client_seed, res.nonce, GameType::Crash)?;
        let reported = Outcome::Crash {
            multiplier: res.crashed_at,
        };
        let matches = outcomes_match(&recomputed, &reported);
        let commitment_ok = match (&self.round, &self.commitment) {
            (Some(r), Some(c)) if r.id == round_id => {
                Some(verify_commitment(&c.server_seed_hash, &res.server_seed))
            }
            _ => None,
        };
        if !matches {
            warn!(round = %round_id, %recomputed, %reported, "verification mismatch");
        }
        if !res.is_fair {
            warn!(round = %round_id, "server reports round as unfair");
        }
        if commitment_ok == Some(false) {
            warn!(round = %round_id, "revealed server seed does not match commitment");
        }
        Ok(VerificationReport {
            round_id,
            server_seed: res.server_seed,
            client_seed: res.client_seed,
            nonce: res.nonce,
            reported,
            recomputed,
            server_says_fair: res.is_fair,
            matches,
            commitment_ok,
        })
    }

    /// Plays one coinflip. The round is created already resolved.
    pub async fn play_coinflip(&mut self, bet_amount: f64, guess: CoinFace) -> GameResult<CoinflipReport> {
        self.check_bet(bet_amount)?;
        self.ensure_idle()?;
        let commitment = self.commit_seeds().await?;
        let req = wire::CoinflipRequest {
            bet_amount,
            guess: guess.to_string(),
            client_seed: commitment.as_ref().map(|c| c.client_seed.clone()),
            seed_id: commitment.as_ref().map(|c| c.seed_id.clone()),
        };
        let res = self.api.play_coinflip(&req).await.map_err(api_error)?;
        let result: CoinFace = res
            .result
            .parse()
            .map_err(|e| GameError::Network(format!("unexpected coin result: {e}")))?;
        // coinflip responses carry no round id; the nonce identifies the flip
        let round_id = RoundId(res.nonce.map(|n| n as i64).unwrap_or_default());
        let round = Round::resolved_coinflip(round_id, bet_amount, self.clock.now(), guess, result, res.win)?;

        let mut verified = None;
        if let (Some(server_seed), Some(client_seed), Some(nonce)) =
            (&res.server_seed, &res.client_seed, res.nonce)
        {
            self.observe_nonce(nonce);
            let recomputed = derive_outcome(server_seed, client_seed, nonce, GameType::Coinflip)?;
            let mut ok = outcomes_match(&recomputed, &Outcome::Coinflip { face: result });
            if let Some(c) = &commitment {
                ok &= verify_commitment(&c.server_seed_hash, server_seed);
            }
            if !ok {
                warn!(%recomputed, reported = %result, "coinflip failed verification");
            }
            verified = Some(ok);
        }

        self.balance = Some(res.credits);
        self.commitment = commitment;
        self.round = Some(round.clone());
        info!(%guess, %result, win = res.win, credits = res.credits, "coinflip settled");
        Ok(CoinflipReport {
            round,
            credits: res.credits,
            verified,
        })
    }

    pub async fn history(&self) -> GameResult<(Vec<wire::RoundSummary>, HistorySummary)> {
        let rounds = self.api.rounds().await.map_err(api_error)?;
        let summary = HistorySummary::from_rounds(&rounds);
        Ok((rounds, summary))
    }

    pub async fn recent_crashes(&self) -> GameResult<Vec<f64>> {
        let recent = self.api.recent().await.map_err(api_error)?;
        Ok(recent.into_iter().map(|r| r.multiplier).collect())
    }

    pub async fn stats(&self) -> GameResult<wire::CrashStats> {
        self.api.stats().await.map_err(api_error)
    }
}
