pub mod autoplay;
pub mod cashout;
pub mod chart;
pub mod clock;
pub mod error;
pub mod fairness;
pub mod multiplier;
pub mod round;

pub use crate::autoplay::{AutoPlayEvent, AutoPlayRoundResult, AutoPlayScheduler, AutoPlaySession};
pub use crate::cashout::{AutoCashout, CashoutController, CashoutPhase, CashoutRequest, CashoutTrigger};
pub use crate::chart::{ChartAccumulator, ChartPhase, Viewport};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::error::{GameError, GameResult};
pub use crate::fairness::{derive_hash_hex, derive_outcome, verify, verify_commitment, ProvablyFairSeeds};
pub use crate::multiplier::{ClockState, MultiplierClock, StopReason, Tick};
pub use crate::round::{
    CoinFace, GameType, MultiplierSample, Outcome, Round, RoundId, RoundKind, RoundStatus, SeedCommitment,
};
