pub mod http;

use crate::ortb::BidResponse;
use crate::rpc::client::{EngineClient, RouterClient};
use crate::rpc::messages::{AuctionRequest, RouteRequest, SelectRequest};
use crate::rpc::RpcError;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub struct Orchestrator {
    router: RouterClient,
    engine: EngineClient,
    get_bids_timeout: Duration,
    select_winner_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        router: RouterClient,
        engine: EngineClient,
        get_bids_timeout: Duration,
        select_winner_timeout: Duration,
    ) -> Self {
        Orchestrator {
            router,
            engine,
            get_bids_timeout,
            select_winner_timeout,
        }
    }

    /// Sum of the configured child budgets; the most an auction can take
    /// here when the caller does not propagate a tighter deadline.
    pub fn total_budget(&self) -> Duration {
        self.get_bids_timeout + self.select_winner_timeout
    }

    /// Runs one auction: collect bids, then settle. Zero collected bids
    /// short-circuits into a well-formed no-bid answer; upstream RPC
    /// failures propagate with their codes intact.
    pub async fn winner_bid(
        &self,
        request: &AuctionRequest,
        budget: Duration,
    ) -> Result<BidResponse, RpcError> {
        let deadline = Instant::now() + budget;

        let route_budget = self.get_bids_timeout.min(remaining(deadline));
        let route = self
            .router
            .get_bids(
                &RouteRequest {
                    version: request.version,
                    bid_request: request.bid_request.clone(),
                    spp_endpoint: request.spp_endpoint.clone(),
                    global_id: request.global_id.clone(),
                },
                route_budget,
            )
            .await?;

        if route.bid_responses.is_empty() {
            debug!(global_id = %request.global_id, "no dsp responses, answering no-bid");
            return Ok(BidResponse::empty(&route.bid_request.id));
        }

        let select_budget = self.select_winner_timeout.min(remaining(deadline));
        if select_budget.is_zero() {
            return Err(RpcError::deadline_exceeded(
                "auction budget exhausted before settlement",
            ));
        }

        let select = self
            .engine
            .select_winner(
                &SelectRequest {
                    version: request.version,
                    bid_request: route.bid_request,
                    bid_responses: route.bid_responses,
                    global_id: route.global_id,
                },
                select_budget,
            )
            .await?;

        Ok(select.bid_response)
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
