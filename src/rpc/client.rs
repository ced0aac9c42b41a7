use super::messages::{
    AuctionReply, AuctionRequest, RouteReply, RouteRequest, SelectReply, SelectRequest,
    GET_BIDS_PATH, SELECT_WINNER_PATH, WINNER_BID_PATH,
};
use super::{RpcCode, RpcError, DEADLINE_HEADER};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base: String,
}

impl RpcClient {
    pub fn connect(base: impl Into<String>) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(1))
            .pool_max_idle_per_host(256)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .tcp_keepalive(Some(Duration::from_secs(20)))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::none())
            .referer(false)
            .build()?;

        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }

        Ok(RpcClient { http, base })
    }

    pub async fn call<Req, Reply>(
        &self,
        path: &str,
        request: &Req,
        deadline: Duration,
    ) -> Result<Reply, RpcError>
    where
        Req: Serialize,
        Reply: DeserializeOwned,
    {
        let url = format!("{}{}", self.base, path);
        debug!(%url, deadline_ms = deadline.as_millis() as u64, "rpc call");

        let response = self
            .http
            .post(&url)
            .timeout(deadline)
            .header(DEADLINE_HEADER, deadline.as_millis().to_string())
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Reply>()
                .await
                .map_err(|e| RpcError::internal(format!("cannot decode reply from {url}: {e}")));
        }

        let body = response.bytes().await.unwrap_or_default();
        Err(serde_json::from_slice::<RpcError>(&body).unwrap_or_else(|_| {
            RpcError::new(
                RpcCode::from_http_status(
                actix_web::http::StatusCode::from_u16(status.as_u16())
                    .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            ),
                format!("{url} answered {status}"),
            )
        }))
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> RpcError {
    if err.is_timeout() {
        RpcError::deadline_exceeded(format!("{url} deadline exceeded: {err}"))
    } else if err.is_connect() {
        RpcError::unavailable(format!("{url} unreachable: {err}"))
    } else {
        RpcError::unknown(format!("{url} transport failure: {err}"))
    }
}

/// Client the SPP adapter uses to run one auction.
#[derive(Clone)]
pub struct OrchestratorClient {
    rpc: RpcClient,
}

impl OrchestratorClient {
    pub fn connect(base: impl Into<String>) -> Result<Self, anyhow::Error> {
        Ok(OrchestratorClient {
            rpc: RpcClient::connect(base)?,
        })
    }

    pub async fn winner_bid(
        &self,
        request: &AuctionRequest,
        deadline: Duration,
    ) -> Result<AuctionReply, RpcError> {
        self.rpc
            .call(WINNER_BID_PATH, request, deadline)
            .await
            .map_err(|e| RpcError::wrap("cannot get winner bid from orchestrator", e))
    }
}

/// Client the orchestrator uses to fan an auction out to DSPs.
#[derive(Clone)]
pub struct RouterClient {
    rpc: RpcClient,
}

impl RouterClient {
    pub fn connect(base: impl Into<String>) -> Result<Self, anyhow::Error> {
        Ok(RouterClient {
            rpc: RpcClient::connect(base)?,
        })
    }

    pub async fn get_bids(
        &self,
        request: &RouteRequest,
        deadline: Duration,
    ) -> Result<RouteReply, RpcError> {
        self.rpc
            .call(GET_BIDS_PATH, request, deadline)
            .await
            .map_err(|e| RpcError::wrap("cannot get bids from router", e))
    }
}

/// Client the orchestrator uses to settle collected bids.
#[derive(Clone)]
pub struct EngineClient {
    rpc: RpcClient,
}

impl EngineClient {
    pub fn connect(base: impl Into<String>) -> Result<Self, anyhow::Error> {
        Ok(EngineClient {
            rpc: RpcClient::connect(base)?,
        })
    }

    pub async fn select_winner(
        &self,
        request: &SelectRequest,
        deadline: Duration,
    ) -> Result<SelectReply, RpcError> {
        self.rpc
            .call(SELECT_WINNER_PATH, request, deadline)
            .await
            .map_err(|e| RpcError::wrap("cannot select winner via engine", e))
    }
}
