use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::add_std;
use crate::error::{GameError, GameResult};
use crate::round::validate_bet;

/// Pause before the first round so the starting state settles.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPlayRoundResult {
    Won,
    Lost,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoPlaySession {
    pub total: u32,
    pub completed: u32,
    pub delay: Duration,
    pub bet_amount: f64,
    pub wins: u32,
    pub losses: u32,
    pub failures: u32,
}

impl AutoPlaySession {
    pub fn remaining_games(&self) -> u32 {
        self.total.saturating_sub(self.completed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutoPlayEvent {
    StartRound { bet_amount: f64, round_number: u32 },
    Finished(AutoPlaySession),
}

/// Sequences auto-play rounds. Holds at most one pending deadline; the
/// caller owns the actual timer and sleeps until `next_deadline`.
#[derive(Debug, Clone, Default)]
pub struct AutoPlayScheduler {
    session: Option<AutoPlaySession>,
    pending: Option<DateTime<Utc>>,
    in_round: bool,
}

impl AutoPlayScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &mut self,
        total_games: u32,
        delay_seconds: f64,
        bet_amount: f64,
        available_balance: f64,
        now: DateTime<Utc>,
    ) -> GameResult<()> {
        if total_games == 0 {
            return Err(GameError::invalid("auto play needs at least one game"));
        }
        if !delay_seconds.is_finite() || delay_seconds < 0.0 {
            return Err(GameError::invalid(format!(
                "auto play delay must be a non-negative number of seconds, got {delay_seconds}"
            )));
        }
        let delay = Duration::try_from_secs_f64(delay_seconds).map_err(|e| {
            GameError::invalid(format!("auto play delay {delay_seconds}s is out of range: {e}"))
        })?;
        validate_bet(bet_amount)?;
        if bet_amount > available_balance {
            return Err(GameError::invalid("insufficient credits for auto play"));
        }
        self.stop();
        self.session = Some(AutoPlaySession {
            total: total_games,
            completed: 0,
            delay,
            bet_amount,
            wins: 0,
            losses: 0,
            failures: 0,
        });
        self.schedule(add_std(now, SETTLE_DELAY));
        Ok(())
    }

    // replaces any earlier deadline
    fn schedule(&mut self, due: DateTime<Utc>) {
        self.pending = Some(due);
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.pending
    }

    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<AutoPlayEvent> {
        let session = self.session.as_ref()?;
        match self.pending {
            Some(due) if !self.in_round && due <= now => {
                self.pending = None;
                self.in_round = true;
                Some(AutoPlayEvent::StartRound {
                    bet_amount: session.bet_amount,
                    round_number: session.completed + 1,
                })
            }
            _ => None,
        }
    }

    /// Record the end of the round handed out by `poll`. Returns the final
    /// tally once the last game completes.
    pub fn round_finished(
        &mut self,
        result: AutoPlayRoundResult,
        now: DateTime<Utc>,
    ) -> Option<AutoPlayEvent> {
        if !self.in_round {
            return None;
        }
        self.in_round = false;
        let session = self.session.as_mut()?;
        session.completed += 1;
        match result {
            AutoPlayRoundResult::Won => session.wins += 1,
            AutoPlayRoundResult::Lost => session.losses += 1,
            AutoPlayRoundResult::Failed => session.failures += 1,
        }
        if session.completed >= session.total {
            let done = session.clone();
            self.stop();
            return Some(AutoPlayEvent::Finished(done));
        }
        let delay = session.delay;
        self.schedule(add_std(now, delay));
        None
    }

    /// Idempotent.
    pub fn stop(&mut self) -> Option<AutoPlaySession> {
        self.pending = None;
        self.in_round = false;
        self.session.take()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&AutoPlaySession> {
        self.session.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn ms(start: DateTime<Utc>, millis: i64) -> DateTime<Utc> {
        start + ChronoDuration::milliseconds(millis)
    }

    #[test]
    fn rejects_bet_above_balance() {
        let mut s = AutoPlayScheduler::new();
        let err = s.start(5, 2.0, 50.0, 10.0, Utc::now()).unwrap_err();
        assert!(matches!(err, GameError::InvalidInput(_)));
        assert!(!s.is_running());
        assert!(s.start(0, 2.0, 1.0, 10.0, Utc::now()).is_err());
        assert!(s.start(1, -1.0, 1.0, 10.0, Utc::now()).is_err());
    }

    #[test]
    fn rejects_delay_beyond_duration_range() {
        let mut s = AutoPlayScheduler::new();
        let err = s.start(2, 1e20, 1.0, 10.0, Utc::now()).unwrap_err();
        assert!(matches!(err, GameError::InvalidInput(_)));
        assert!(!s.is_running());
        assert!(s.next_deadline().is_none());
        // large but representable delays are accepted
        assert!(s.start(2, 1e9, 1.0, 10.0, Utc::now()).is_ok());
    }

    #[test]
    fn first_round_waits_for_settle_delay() {
        let t0 = Utc::now();
        let mut s = AutoPlayScheduler::new();
        s.start(3, 2.0, 1.0, 10.0, t0).unwrap();
        assert_eq!(s.poll(ms(t0, 50)), None);
        assert_eq!(
            s.poll(ms(t0, 100)),
            Some(AutoPlayEvent::StartRound {
                bet_amount: 1.0,
                round_number: 1
            })
        );
        // no second start while the round is running
        assert_eq!(s.poll(ms(t0, 10_000)), None);
    }

    #[test]
    fn five_games_with_mixed_results() {
        let t0 = Utc::now();
        let mut s = AutoPlayScheduler::new();
        s.start(5, 2.0, 1.0, 10.0, t0).unwrap();
        let results = [
            AutoPlayRoundResult::Won,
            AutoPlayRoundResult::Failed,
            AutoPlayRoundResult::Lost,
            AutoPlayRoundResult::Failed,
            AutoPlayRoundResult::Won,
        ];
        let mut now = ms(t0, 100);
        let mut finished = None;
        for (i, r) in results.iter().enumerate() {
            assert!(matches!(
                s.poll(now),
                Some(AutoPlayEvent::StartRound { round_number, .. }) if round_number == i as u32 + 1
            ));
            now = ms(now, 500);
            finished = s.round_finished(*r, now);
            if i < 4 {
                assert!(finished.is_none());
                assert_eq!(s.poll(ms(now, 1_999)), None);
                now = ms(now, 2_000);
            }
        }
        let Some(AutoPlayEvent::Finished(done)) = finished else {
            panic!("auto play did not finish");
        };
        assert_eq!(done.completed, 5);
        assert_eq!((done.wins, done.losses, done.failures), (2, 1, 2));
        assert!(!s.is_running());
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn stop_is_idempotent_and_cancels_pending() {
        let t0 = Utc::now();
        let mut s = AutoPlayScheduler::new();
        s.start(2, 1.0, 1.0, 10.0, t0).unwrap();
        assert!(s.next_deadline().is_some());
        assert!(s.stop().is_some());
        assert!(s.stop().is_none());
        assert_eq!(s.poll(ms(t0, 5_000)), None);
        assert_eq!(s.round_finished(AutoPlayRoundResult::Won, t0), None);
    }

    #[test]
    fn restart_replaces_previous_session() {
        let t0 = Utc::now();
        let mut s = AutoPlayScheduler::new();
        s.start(2, 1.0, 1.0, 10.0, t0).unwrap();
        s.poll(ms(t0, 100)).unwrap();
        s.start(4, 1.0, 2.0, 10.0, ms(t0, 200)).unwrap();
        let session = s.session().unwrap();
        assert_eq!((session.total, session.completed), (4, 0));
        assert_eq!(session.remaining_games(), 4);
        assert_eq!(s.next_deadline(), Some(ms(t0, 300)));
    }

    #[test]
    fn completion_without_poll_is_ignored() {
        let t0 = Utc::now();
        let mut s = AutoPlayScheduler::new();
        s.start(2, 1.0, 1.0, 10.0, t0).unwrap();
        assert_eq!(s.round_finished(AutoPlayRoundResult::Won, t0), None);
        assert_eq!(s.session().unwrap().completed, 0);
    }
}
