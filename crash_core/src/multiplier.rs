use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::seconds_between;
use crate::error::{GameError, GameResult};
use crate::round::MultiplierSample;

pub const TICK_INTERVAL: Duration = Duration::from_millis(50);
/// Multiplier gained per second of round time. The server schedules crashes
/// with the same constant.
pub const GROWTH_PER_SECOND: f64 = 0.1;

pub fn multiplier_at(elapsed_seconds: f64) -> f64 {
    (1.0 + GROWTH_PER_SECOND * elapsed_seconds).max(1.0)
}

/// Seconds of round time until `multiplier` is reached.
pub fn seconds_to_reach(multiplier: f64) -> f64 {
    ((multiplier - 1.0) / GROWTH_PER_SECOND).max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cashed,
    Crashed,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Idle,
    Running,
    Stopped(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    Sample(MultiplierSample),
    /// The target was reached; the sample carries exactly the target value.
    Crashed(MultiplierSample),
    /// Wall clock did not move forward since the last sample.
    Stale,
}

#[derive(Debug, Clone)]
pub struct MultiplierClock {
    state: ClockState,
    round_start: Option<DateTime<Utc>>,
    target: Option<f64>,
    last: Option<MultiplierSample>,
    final_multiplier: Option<f64>,
}

impl Default for MultiplierClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiplierClock {
    pub fn new() -> Self {
        Self {
            state: ClockState::Idle,
            round_start: None,
            target: None,
            last: None,
            final_multiplier: None,
        }
    }

    pub fn start(&mut self, round_start: DateTime<Utc>, target: Option<f64>) -> GameResult<()> {
        if self.state != ClockState::Idle {
            return Err(GameError::invalid(format!(
                "multiplier clock can only start from Idle, currently {:?}",
                self.state
            )));
        }
        if let Some(t) = target {
            if !t.is_finite() || t < 1.0 {
                return Err(GameError::invalid(format!(
                    "target crash multiplier must be at least 1.00, got {t}"
                )));
            }
        }
        self.round_start = Some(round_start);
        self.target = target;
        self.state = ClockState::Running;
        Ok(())
    }

    /// Sample the multiplier at `now`. Elapsed time is always measured from
    /// the round start, never accumulated between ticks.
    pub fn tick(&mut self, now: DateTime<Utc>) -> GameResult<Tick> {
        let start = match (self.state, self.round_start) {
            (ClockState::Running, Some(start)) => start,
            _ => {
                return Err(GameError::invalid(format!(
                    "cannot tick a clock in state {:?}",
                    self.state
                )))
            }
        };
        let elapsed = seconds_between(start, now);
        if let Some(prev) = self.last {
            if elapsed <= prev.elapsed_seconds {
                return Ok(Tick::Stale);
            }
        }
        let multiplier = multiplier_at(elapsed);
        match self.target {
            Some(target) if multiplier >= target => {
                let sample = MultiplierSample {
                    elapsed_seconds: elapsed,
                    multiplier: target,
                    wall_clock_time: now,
                };
                self.last = Some(sample);
                self.final_multiplier = Some(target);
                self.state = ClockState::Stopped(StopReason::Crashed);
                Ok(Tick::Crashed(sample))
            }
            _ => {
                let sample = MultiplierSample {
                    elapsed_seconds: elapsed,
                    multiplier,
                    wall_clock_time: now,
                };
                self.last = Some(sample);
                Ok(Tick::Sample(sample))
            }
        }
    }

    pub fn stop_as_cashed(&mut self, final_multiplier: f64) -> GameResult<()> {
        self.stop(StopReason::Cashed, Some(final_multiplier))
    }

    pub fn stop_as_crashed(&mut self, at: f64) -> GameResult<()> {
        self.stop(StopReason::Crashed, Some(at))
    }

    /// Release the clock after a failure or on teardown. A clock that is not
    /// running is left as it is.
    pub fn stop_with_error(&mut self) {
        if self.state == ClockState::Running {
            self.state = ClockState::Stopped(StopReason::Errored);
        }
    }

    fn stop(&mut self, reason: StopReason, at: Option<f64>) -> GameResult<()> {
        if self.state != ClockState::Running {
            return Err(GameError::invalid(format!(
                "clock is not running (state {:?})",
                self.state
            )));
        }
        self.state = ClockState::Stopped(reason);
        self.final_multiplier = at;
        Ok(())
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    pub fn target(&self) -> Option<f64> {
        self.target
    }

    pub fn round_start(&self) -> Option<DateTime<Utc>> {
        self.round_start
    }

    pub fn last_sample(&self) -> Option<&MultiplierSample> {
        self.last.as_ref()
    }

    pub fn current_multiplier(&self) -> f64 {
        self.last.map(|s| s.multiplier).unwrap_or(1.0)
    }

    pub fn final_multiplier(&self) -> Option<f64> {
        self.final_multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn at(start: DateTime<Utc>, secs: f64) -> DateTime<Utc> {
        start + ChronoDuration::microseconds((secs * 1_000_000.0) as i64)
    }

    #[test]
    fn growth_law() {
        assert_eq!(multiplier_at(0.0), 1.0);
        assert_eq!(multiplier_at(10.0), 2.0);
        assert_eq!(multiplier_at(-3.0), 1.0);
        assert_eq!(seconds_to_reach(2.0), 10.0);
        assert_eq!(seconds_to_reach(0.5), 0.0);
    }

    #[test]
    fn samples_measure_from_round_start() {
        let start = Utc::now();
        let mut clock = MultiplierClock::new();
        clock.start(start, Some(5.0)).unwrap();
        match clock.tick(at(start, 0.0)).unwrap() {
            Tick::Sample(s) => assert_eq!(s.multiplier, 1.0),
            other => panic!("unexpected {other:?}"),
        }
        match clock.tick(at(start, 10.0)).unwrap() {
            Tick::Sample(s) => {
                assert_eq!(s.elapsed_seconds, 10.0);
                assert!((s.multiplier - 2.0).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(clock.is_running());
    }

    #[test]
    fn clamps_to_target_and_stops() {
        let start = Utc::now();
        let mut clock = MultiplierClock::new();
        clock.start(start, Some(1.5)).unwrap();
        assert!(matches!(clock.tick(at(start, 4.0)).unwrap(), Tick::Sample(_)));
        match clock.tick(at(start, 5.37)).unwrap() {
            Tick::Crashed(s) => assert_eq!(s.multiplier, 1.5),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(clock.state(), ClockState::Stopped(StopReason::Crashed));
        assert_eq!(clock.final_multiplier(), Some(1.5));
        assert!(clock.tick(at(start, 6.0)).is_err());
    }

    #[test]
    fn instant_crash_on_first_tick() {
        let start = Utc::now();
        let mut clock = MultiplierClock::new();
        clock.start(start, Some(1.0)).unwrap();
        assert!(matches!(clock.tick(start).unwrap(), Tick::Crashed(_)));
    }

    #[test]
    fn backwards_wall_clock_is_stale() {
        let start = Utc::now();
        let mut clock = MultiplierClock::new();
        clock.start(start, None).unwrap();
        clock.tick(at(start, 2.0)).unwrap();
        assert_eq!(clock.tick(at(start, 1.0)).unwrap(), Tick::Stale);
        assert_eq!(clock.tick(at(start, 2.0)).unwrap(), Tick::Stale);
        assert_eq!(clock.last_sample().unwrap().elapsed_seconds, 2.0);
    }

    #[test]
    fn cash_stop_only_while_running() {
        let mut clock = MultiplierClock::new();
        assert!(clock.stop_as_cashed(1.2).is_err());
        clock.start(Utc::now(), None).unwrap();
        clock.stop_as_cashed(1.2).unwrap();
        assert_eq!(clock.state(), ClockState::Stopped(StopReason::Cashed));
        assert!(clock.stop_as_cashed(1.3).is_err());
        clock.stop_with_error();
        assert_eq!(clock.state(), ClockState::Stopped(StopReason::Cashed));
    }

    #[test]
    fn cannot_restart() {
        let mut clock = MultiplierClock::new();
        clock.start(Utc::now(), Some(2.0)).unwrap();
        assert!(clock.start(Utc::now(), Some(2.0)).is_err());
        assert!(MultiplierClock::new().start(Utc::now(), Some(0.5)).is_err());
    }
}
