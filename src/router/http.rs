use super::metadata::DspMetaData;
use super::Router;
use crate::filter::{FilterManager, RuleFile, Side};
use crate::rpc::messages::{RouteReply, RouteRequest, GET_BIDS_PATH};
use crate::rpc::{inherited_deadline, RpcError};
use crate::stats::columns;
use crate::stats::kv::StatsStore;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct RouterState {
    pub router: Router,
    pub filters: Arc<FilterManager>,
    pub stats: StatsStore,
    pub stats_write_budget: Duration,
    /// Budget used when a caller does not propagate one.
    pub default_budget: Duration,
    pub dsp_rules_path: PathBuf,
    pub spp_rules_path: PathBuf,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route(GET_BIDS_PATH, web::post().to(get_bids))
        .route("/rules/dsp", web::post().to(update_dsp_rules))
        .route("/rules/spp", web::post().to(update_spp_rules))
        .route("/rules/dsp", web::get().to(get_dsp_rules))
        .route("/rules/spp", web::get().to(get_spp_rules));
}

async fn get_bids(
    state: web::Data<RouterState>,
    http_req: HttpRequest,
    body: web::Json<RouteRequest>,
) -> Result<web::Json<RouteReply>, RpcError> {
    let request = body.into_inner();
    let budget = inherited_deadline(&http_req, state.default_budget);

    let shared = Arc::new(request.bid_request.clone());
    let result = state
        .router
        .fan_out(request.version, shared, &request.spp_endpoint, budget)
        .await
        .map_err(|e| RpcError::internal(format!("fan-out failed: {e}")))?;

    spawn_metadata_write(&state, &request.global_id, result.metadata);

    Ok(web::Json(RouteReply {
        bid_request: request.bid_request,
        bid_responses: result.responses,
        global_id: request.global_id,
    }))
}

/// Serializes call metadata into the auction hash, decoupled from the
/// reply path.
fn spawn_metadata_write(
    state: &web::Data<RouterState>,
    global_id: &str,
    metadata: Vec<DspMetaData>,
) {
    let payload = match serde_json::to_string(&metadata) {
        Ok(json) => json,
        Err(e) => {
            warn!(global_id, "cannot serialize dsp metadata: {e}");
            return;
        }
    };

    let stats = state.stats.clone();
    let budget = state.stats_write_budget;
    let global_id = global_id.to_string();

    tokio::spawn(async move {
        let write = stats.write_column(&global_id, columns::BID_RESPONSES, payload);
        match tokio::time::timeout(budget, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(global_id, "dsp metadata write failed: {e}"),
            Err(_) => warn!(global_id, "dsp metadata write timed out"),
        }
    });
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateRulesReply {
    pub success: bool,
    pub message: String,
}

async fn update_dsp_rules(state: web::Data<RouterState>, body: web::Bytes) -> HttpResponse {
    update_rules(&state, Side::Dsp, &body, state.dsp_rules_path.clone()).await
}

async fn update_spp_rules(state: web::Data<RouterState>, body: web::Bytes) -> HttpResponse {
    update_rules(&state, Side::Spp, &body, state.spp_rules_path.clone()).await
}

/// Validates, installs and persists one side of the rule config. A
/// validation failure answers `success: false` and leaves the active
/// snapshot untouched.
async fn update_rules(
    state: &web::Data<RouterState>,
    side: Side,
    body: &[u8],
    path: PathBuf,
) -> HttpResponse {
    let file = match RuleFile::parse(body) {
        Ok(file) => file,
        Err(e) => {
            return HttpResponse::Ok().json(UpdateRulesReply {
                success: false,
                message: format!("invalid rules json: {e}"),
            });
        }
    };

    if let Err(e) = state.filters.install(side, &file) {
        return HttpResponse::Ok().json(UpdateRulesReply {
            success: false,
            message: format!("validation error: {e}"),
        });
    }

    if let Err(e) = tokio::fs::write(&path, body).await {
        warn!(path = %path.display(), "cannot persist rules file: {e}");
        return HttpResponse::Ok().json(UpdateRulesReply {
            success: false,
            message: format!("rules active but not persisted: {e}"),
        });
    }

    HttpResponse::Ok().json(UpdateRulesReply {
        success: true,
        message: "rules updated".into(),
    })
}

#[derive(Debug, Serialize)]
struct SideRules {
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dsps: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spps: Option<serde_json::Value>,
}

async fn get_dsp_rules(state: web::Data<RouterState>) -> Result<HttpResponse, RpcError> {
    read_rules(state.dsp_rules_path.clone(), Side::Dsp).await
}

async fn get_spp_rules(state: web::Data<RouterState>) -> Result<HttpResponse, RpcError> {
    read_rules(state.spp_rules_path.clone(), Side::Spp).await
}

async fn read_rules(path: PathBuf, side: Side) -> Result<HttpResponse, RpcError> {
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| RpcError::internal(format!("cannot read rules file: {e}")))?;
    let file = RuleFile::parse(&data)
        .map_err(|e| RpcError::internal(format!("cannot parse rules file: {e}")))?;

    let reply = match side {
        Side::Dsp => SideRules {
            version: file.version,
            dsps: Some(serde_json::to_value(&file.dsps).unwrap_or_default()),
            spps: None,
        },
        Side::Spp => SideRules {
            version: file.version,
            dsps: None,
            spps: Some(serde_json::to_value(&file.spps).unwrap_or_default()),
        },
    };

    Ok(HttpResponse::Ok().json(reply))
}
