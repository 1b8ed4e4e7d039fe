use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crash_core::clock::seconds_between;
use crash_core::{
    AutoCashout, AutoPlayEvent, AutoPlayRoundResult, AutoPlayScheduler, AutoPlaySession, Clock,
    GameError, GameResult,
};

use crate::api::GameServerApi;
use crate::session::{GameSession, RoundResolution, TickEvent};

/// Drives the session's running round until it is cashed out or crashes.
/// `manual_cashout` resolving is treated as the player pressing cash out; pass
/// `std::future::pending()` for unattended rounds.
pub async fn run_round<A, C, F>(
    session: &mut GameSession<A, C>,
    manual_cashout: F,
) -> GameResult<RoundResolution>
where
    A: GameServerApi,
    C: Clock,
    F: Future<Output = ()>,
{
    if !session.is_round_running() {
        return Err(GameError::invalid("no running round"));
    }
    let mut ticker = tokio::time::interval(session.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(manual_cashout);
    let mut manual_armed = true;

    loop {
        tokio::select! {
            biased;
            _ = &mut manual_cashout, if manual_armed => {
                manual_armed = false;
                if session.is_round_running() {
                    return session.cash_out().await;
                }
            }
            _ = ticker.tick() => {
                match session.tick()? {
                    TickEvent::CashoutDue(req) => return session.resolve_cashout(req).await,
                    TickEvent::Crashed(_) => return session.confirm_crash().await,
                    TickEvent::Sample(_) | TickEvent::Stale | TickEvent::Suspended => {}
                }
            }
        }
    }
}

/// Starts a round and runs it to completion.
pub async fn play_round<A, C, F>(
    session: &mut GameSession<A, C>,
    bet_amount: f64,
    auto: AutoCashout,
    manual_cashout: F,
) -> GameResult<RoundResolution>
where
    A: GameServerApi,
    C: Clock,
    F: Future<Output = ()>,
{
    session.start_round(bet_amount, auto).await?;
    match run_round(session, manual_cashout).await {
        Ok(resolution) => Ok(resolution),
        Err(e) => {
            session.abort_round();
            Err(e)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoPlayPlan {
    pub games: u32,
    pub delay_seconds: f64,
    pub bet_amount: f64,
    pub auto_cashout: AutoCashout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoPlayProgress {
    pub round_number: u32,
    pub result: AutoPlayRoundResult,
    pub resolution: Option<RoundResolution>,
    pub completed: u32,
    pub total: u32,
}

/// Plays `plan.games` rounds back to back. Failed rounds are counted and the
/// sequence goes on. `stop` resolving ends the session between rounds.
pub async fn run_autoplay<A, C, P, S>(
    session: &mut GameSession<A, C>,
    plan: AutoPlayPlan,
    mut on_progress: P,
    stop: S,
) -> GameResult<AutoPlaySession>
where
    A: GameServerApi,
    C: Clock,
    P: FnMut(&AutoPlayProgress),
    S: Future<Output = ()>,
{
    let mut scheduler = AutoPlayScheduler::new();
    let available = session.balance().unwrap_or(f64::INFINITY);
    scheduler.start(
        plan.games,
        plan.delay_seconds,
        plan.bet_amount,
        available,
        session.now(),
    )?;
    info!(games = plan.games, bet_amount = plan.bet_amount, "auto play started");
    tokio::pin!(stop);

    loop {
        let Some(due) = scheduler.next_deadline() else {
            return Err(GameError::invalid("auto play lost its schedule"));
        };
        let wait = seconds_between(session.now(), due).max(0.0);
        tokio::select! {
            biased;
            _ = &mut stop => {
                let partial = scheduler.stop();
                info!("auto play stopped");
                return partial.ok_or_else(|| GameError::invalid("auto play was not running"));
            }
            _ = tokio::time::sleep(Duration::from_secs_f64(wait)) => {}
        }

        let Some(AutoPlayEvent::StartRound {
            bet_amount,
            round_number,
        }) = scheduler.poll(session.now())
        else {
            tokio::time::sleep(Duration::from_millis(1)).await;
            continue;
        };

        let (result, resolution) =
            match play_round(session, bet_amount, plan.auto_cashout, std::future::pending()).await {
                Ok(r) if r.is_win() => (AutoPlayRoundResult::Won, Some(r)),
                Ok(r) => (AutoPlayRoundResult::Lost, Some(r)),
                Err(e) => {
                    warn!(round_number, error = %e, "auto play round failed");
                    (AutoPlayRoundResult::Failed, None)
                }
            };

        let finished = scheduler.round_finished(result, session.now());
        let completed = match (&finished, scheduler.session()) {
            (Some(AutoPlayEvent::Finished(done)), _) => done.completed,
            (_, Some(running)) => running.completed,
            _ => round_number,
        };
        on_progress(&AutoPlayProgress {
            round_number,
            result,
            resolution,
            completed,
            total: plan.games,
        });
        if let Some(AutoPlayEvent::Finished(done)) = finished {
            info!(
                wins = done.wins,
                losses = done.losses,
                failures = done.failures,
                "auto play finished"
            );
            return Ok(done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::config::ClientConfig;
    use crate::simulator::SimulatedServer;
    use crash_core::{CashoutTrigger, RoundStatus};

    type Session = GameSession<SimulatedServer<TokioClock>, TokioClock>;

    fn session(credits: f64, known_balance: bool) -> Session {
        let clock = TokioClock::new();
        let server = SimulatedServer::seeded(clock, credits, 3);
        let s = GameSession::new(server, clock, &ClientConfig::default());
        if known_balance {
            s.with_balance(credits)
        } else {
            s
        }
    }

    #[tokio::test(start_paused = true)]
    async fn round_runs_to_crash() {
        let mut s = session(100.0, true);
        s.api().force_next_crash(2.04);
        let resolution = play_round(&mut s, 10.0, AutoCashout::disabled(), std::future::pending())
            .await
            .unwrap();
        assert!(matches!(
            resolution,
            RoundResolution::Crashed { crash_multiplier, rejected_cashout: None, .. } if crash_multiplier == 2.04
        ));
        let chart = s.chart();
        assert_eq!(chart.latest().unwrap().multiplier, 2.04);
        assert!(chart.len() > 200);
        assert!(chart
            .samples()
            .windows(2)
            .all(|w| w[0].elapsed_seconds < w[1].elapsed_seconds));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_cashout_ends_round_early() {
        let mut s = session(100.0, true);
        s.api().force_next_crash(5.0);
        let resolution = play_round(&mut s, 10.0, AutoCashout::at(1.5), std::future::pending())
            .await
            .unwrap();
        match resolution {
            RoundResolution::Won {
                cashed_out_at,
                trigger,
                ..
            } => {
                assert_eq!(trigger, CashoutTrigger::Auto);
                assert!((1.5..1.6).contains(&cashed_out_at));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(s.chart().peak() < 1.6);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_cashout_signal() {
        let mut s = session(100.0, true);
        s.api().force_next_crash(50.0);
        let press = tokio::time::sleep(Duration::from_secs(3));
        let resolution = play_round(&mut s, 10.0, AutoCashout::disabled(), press)
            .await
            .unwrap();
        match resolution {
            RoundResolution::Won {
                cashed_out_at,
                trigger,
                ..
            } => {
                assert_eq!(trigger, CashoutTrigger::Manual);
                assert!((1.25..=1.31).contains(&cashed_out_at), "{cashed_out_at}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn autoplay_counts_every_round() {
        let mut s = session(1_000.0, true);
        let mut seen = Vec::new();
        let plan = AutoPlayPlan {
            games: 5,
            delay_seconds: 2.0,
            bet_amount: 1.0,
            auto_cashout: AutoCashout::at(1.2),
        };
        let done = run_autoplay(&mut s, plan, |p| seen.push(p.clone()), std::future::pending())
            .await
            .unwrap();
        assert_eq!(done.completed, 5);
        assert_eq!(done.wins + done.losses + done.failures, 5);
        assert_eq!(done.failures, 0);
        assert_eq!(
            seen.iter().map(|p| p.completed).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(s.api().round_count(), 5);
        assert!(s.round().unwrap().status.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn autoplay_absorbs_failed_starts() {
        // the server has no credits, but the session does not know its balance
        let mut s = session(0.0, false);
        let plan = AutoPlayPlan {
            games: 5,
            delay_seconds: 1.0,
            bet_amount: 1.0,
            auto_cashout: AutoCashout::disabled(),
        };
        let mut results = Vec::new();
        let done = run_autoplay(&mut s, plan, |p| results.push(p.result), std::future::pending())
            .await
            .unwrap();
        assert_eq!(done.completed, 5);
        assert_eq!(done.failures, 5);
        assert_eq!(results, vec![AutoPlayRoundResult::Failed; 5]);
        assert_eq!(s.api().round_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn autoplay_rejects_bet_over_balance() {
        let mut s = session(5.0, true);
        let plan = AutoPlayPlan {
            games: 3,
            delay_seconds: 1.0,
            bet_amount: 10.0,
            auto_cashout: AutoCashout::disabled(),
        };
        let err = run_autoplay(&mut s, plan, |_| {}, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidInput(_)));
        assert_eq!(s.api().round_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn autoplay_stops_between_rounds() {
        let mut s = session(1_000.0, true);
        let plan = AutoPlayPlan {
            games: 10,
            delay_seconds: 30.0,
            bet_amount: 1.0,
            auto_cashout: AutoCashout::at(1.1),
        };
        // the first round settles within a few seconds, the second waits 30s
        let stop = tokio::time::sleep(Duration::from_secs(15));
        let partial = run_autoplay(&mut s, plan, |_| {}, stop).await.unwrap();
        assert_eq!(partial.completed, 1);
        assert_eq!(s.api().round_count(), 1);
        assert_ne!(s.round().unwrap().status, RoundStatus::Active);
    }
}
