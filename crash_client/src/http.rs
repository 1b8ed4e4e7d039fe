use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crash_shared::{
    ApiError, ApiResult, CashoutRequest, CashoutResponse, CoinflipRequest, CoinflipResponse,
    CrashStats, ErrorBody, RecentCrash, RoundRecord, RoundSummary, ServerSeedResponse,
    StartCrashRequest, StartCrashResponse, VerifyRoundResponse,
};

use crate::api::GameServerApi;
use crate::config::ClientConfig;

#[derive(Clone)]
pub struct HttpGameServer {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpGameServer {
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.http.get(url)).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.http.post(url).json(body)).await
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<T> {
        let req = match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let res = req
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(format!("failed to read response body: {e}")))?;
        if !status.is_success() {
            let detail = error_detail(status, &bytes);
            debug!(%status, %detail, "game server rejected request");
            return Err(ApiError::status(status.as_u16(), detail));
        }
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn error_detail(status: StatusCode, body: &[u8]) -> String {
    if let Ok(err) = serde_json::from_slice::<ErrorBody>(body) {
        return err.message();
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        text
    }
}

impl GameServerApi for HttpGameServer {
    async fn start_crash(&self, req: &StartCrashRequest) -> ApiResult<StartCrashResponse> {
        self.post("/crash/start", req).await
    }

    async fn cash_out(&self, req: &CashoutRequest) -> ApiResult<CashoutResponse> {
        self.post("/crash/cashout", req).await
    }

    async fn crash_round(&self, round_id: i64) -> ApiResult<RoundRecord> {
        self.get(&format!("/crash/round/{round_id}")).await
    }

    async fn server_seed(&self) -> ApiResult<ServerSeedResponse> {
        self.post("/crash/get-server-seed", &serde_json::json!({}))
            .await
    }

    async fn verify_round(&self, round_id: i64) -> ApiResult<VerifyRoundResponse> {
        self.get(&format!("/crash/verify/{round_id}")).await
    }

    async fn play_coinflip(&self, req: &CoinflipRequest) -> ApiResult<CoinflipResponse> {
        self.post("/coinflip/play", req).await
    }

    async fn rounds(&self) -> ApiResult<Vec<RoundSummary>> {
        self.get("/crash/rounds").await
    }

    async fn recent(&self) -> ApiResult<Vec<RecentCrash>> {
        self.get("/crash/recent").await
    }

    async fn stats(&self) -> ApiResult<CrashStats> {
        self.get("/crash/stats").await
    }
}
