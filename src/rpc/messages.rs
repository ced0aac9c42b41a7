use crate::ortb::{BidRequest, BidResponse, Version};
use serde::{Deserialize, Serialize};

pub const WINNER_BID_PATH: &str = "/rpc/winner_bid";
pub const GET_BIDS_PATH: &str = "/rpc/get_bids";
pub const SELECT_WINNER_PATH: &str = "/rpc/select_winner";

/// Ingress → orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionRequest {
    pub version: Version,
    pub bid_request: BidRequest,
    pub spp_endpoint: String,
    pub global_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionReply {
    pub bid_response: BidResponse,
}

/// Orchestrator → router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub version: Version,
    pub bid_request: BidRequest,
    pub spp_endpoint: String,
    pub global_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteReply {
    pub bid_request: BidRequest,
    pub bid_responses: Vec<BidResponse>,
    pub global_id: String,
}

/// Orchestrator → engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRequest {
    pub version: Version,
    pub bid_request: BidRequest,
    pub bid_responses: Vec<BidResponse>,
    pub global_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectReply {
    pub bid_response: BidResponse,
}
