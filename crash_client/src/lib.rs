pub mod api;
pub mod clock;
pub mod config;
pub mod history;
pub mod http;
pub mod runner;
pub mod session;
pub mod simulator;

pub use crate::api::{api_error, GameServerApi};
pub use crate::clock::TokioClock;
pub use crate::config::ClientConfig;
pub use crate::history::HistorySummary;
pub use crate::http::HttpGameServer;
pub use crate::runner::{play_round, run_autoplay, run_round, AutoPlayPlan, AutoPlayProgress};
pub use crate::session::{
    CoinflipReport, CrashCheck, GameSession, RoundResolution, TickEvent, VerificationReport,
};
pub use crate::simulator::SimulatedServer;
