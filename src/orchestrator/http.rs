use super::Orchestrator;
use crate::rpc::messages::{AuctionReply, AuctionRequest, WINNER_BID_PATH};
use crate::rpc::{inherited_deadline, RpcError};
use actix_web::{web, HttpRequest};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route(WINNER_BID_PATH, web::post().to(winner_bid));
}

async fn winner_bid(
    orchestrator: web::Data<Orchestrator>,
    http_req: HttpRequest,
    body: web::Json<AuctionRequest>,
) -> Result<web::Json<AuctionReply>, RpcError> {
    let request = body.into_inner();

    if request.bid_request.id.is_empty() {
        return Err(RpcError::invalid_argument("bid request id is required"));
    }

    let budget = inherited_deadline(&http_req, orchestrator.total_budget());
    let bid_response = orchestrator.winner_bid(&request, budget).await?;

    Ok(web::Json(AuctionReply { bid_response }))
}
