use super::select_winners;
use crate::rpc::messages::{SelectReply, SelectRequest, SELECT_WINNER_PATH};
use crate::rpc::RpcError;
use crate::stats::kv::StatsStore;
use crate::stats::columns;
use actix_web::web;
use std::time::Duration;
use tracing::warn;

pub struct EngineState {
    pub profit_percent: f64,
    pub hostname: String,
    pub stats: StatsStore,
    pub stats_write_budget: Duration,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route(SELECT_WINNER_PATH, web::post().to(select_winner));
}

async fn select_winner(
    state: web::Data<EngineState>,
    body: web::Json<SelectRequest>,
) -> Result<web::Json<SelectReply>, RpcError> {
    let request = body.into_inner();

    let pair = select_winners(
        &request.bid_request,
        &request.bid_responses,
        state.profit_percent,
        &state.hostname,
        &request.global_id,
    );

    spawn_winner_writes(&state, &request.global_id, &pair);

    Ok(web::Json(SelectReply {
        bid_response: pair.effective,
    }))
}

/// Records both winner views in the auction hash off the reply path.
fn spawn_winner_writes(state: &web::Data<EngineState>, global_id: &str, pair: &super::WinnerPair) {
    let effective = match serde_json::to_string(&pair.effective) {
        Ok(json) => json,
        Err(e) => {
            warn!(global_id, "cannot serialize effective winner: {e}");
            return;
        }
    };
    let by_dsp_price = match serde_json::to_string(&pair.by_dsp_price) {
        Ok(json) => json,
        Err(e) => {
            warn!(global_id, "cannot serialize dsp-price winner: {e}");
            return;
        }
    };

    let stats = state.stats.clone();
    let budget = state.stats_write_budget;
    let global_id = global_id.to_string();

    tokio::spawn(async move {
        let writes = async {
            stats
                .write_column(&global_id, columns::BID_RESPONSE_WINNER, effective)
                .await?;
            stats
                .write_column(
                    &global_id,
                    columns::BID_RESPONSE_WINNER_BY_DSP_PRICE,
                    by_dsp_price,
                )
                .await
        };

        match tokio::time::timeout(budget, writes).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(global_id, "winner stats write failed: {e}"),
            Err(_) => warn!(global_id, "winner stats write timed out"),
        }
    });
}
