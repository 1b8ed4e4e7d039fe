use std::future::Future;

use crash_core::GameError;
use crash_shared::{
    ApiError, ApiResult, CashoutRequest, CashoutResponse, CoinflipRequest, CoinflipResponse,
    CrashStats, RecentCrash, RoundRecord, RoundSummary, ServerSeedResponse, StartCrashRequest,
    StartCrashResponse, VerifyRoundResponse,
};

/// The remote game server. Futures are not required to be `Send`; the client
/// runs on a single-threaded runtime.
pub trait GameServerApi {
    fn start_crash(
        &self,
        req: &StartCrashRequest,
    ) -> impl Future<Output = ApiResult<StartCrashResponse>>;

    fn cash_out(&self, req: &CashoutRequest) -> impl Future<Output = ApiResult<CashoutResponse>>;

    fn crash_round(&self, round_id: i64) -> impl Future<Output = ApiResult<RoundRecord>>;

    fn server_seed(&self) -> impl Future<Output = ApiResult<ServerSeedResponse>>;

    fn verify_round(&self, round_id: i64) -> impl Future<Output = ApiResult<VerifyRoundResponse>>;

    fn play_coinflip(
        &self,
        req: &CoinflipRequest,
    ) -> impl Future<Output = ApiResult<CoinflipResponse>>;

    fn rounds(&self) -> impl Future<Output = ApiResult<Vec<RoundSummary>>>;

    fn recent(&self) -> impl Future<Output = ApiResult<Vec<RecentCrash>>>;

    fn stats(&self) -> impl Future<Output = ApiResult<CrashStats>>;
}

/// Maps a transport failure into the game taxonomy. The server's
/// "already crashed" rejection is the only one that is not a network error.
pub fn api_error(err: ApiError) -> GameError {
    if err.is_already_crashed() {
        GameError::AlreadyResolved(err.detail())
    } else {
        GameError::Network(err.detail())
    }
}
