use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crash_core::clock::add_std;
use crash_core::Clock;

/// Wall clock that advances with tokio time, so a paused test runtime drives
/// rounds and auto-play without real waiting.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: Instant,
    wall: DateTime<Utc>,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            anchor: Instant::now(),
            wall,
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        add_std(self.wall, self.anchor.elapsed())
    }
}
