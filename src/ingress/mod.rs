pub mod background;
pub mod callbacks;

use crate::geo::{GeoError, GeoService};
use crate::ortb::{BidRequest, Geo, Version};
use crate::rpc::client::OrchestratorClient;
use crate::rpc::messages::AuctionRequest;
use crate::stats::kv::StatsStore;
use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct IngressState {
    pub orchestrator: OrchestratorClient,
    pub geo: Arc<GeoService>,
    pub stats: StatsStore,
    /// Client used to fire unwrapped notice URLs at DSPs.
    pub notice_client: reqwest::Client,
    pub get_winner_bid_timeout: Duration,
    pub nurl_timeout: Duration,
    pub burl_timeout: Duration,
}

impl IngressState {
    pub fn notice_client() -> Result<reqwest::Client, anyhow::Error> {
        Ok(reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(1))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::none())
            .referer(false)
            .build()?)
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/bid_v_2_4", web::post().to(post_bid_v24))
        .route("/bid_v_2_5", web::post().to(post_bid_v25))
        .route("/nurl", web::get().to(callbacks::get_nurl))
        .route("/burl", web::get().to(callbacks::get_burl))
        .route("/health", web::get().to(health));
}

async fn health() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

async fn post_bid_v24(
    state: web::Data<IngressState>,
    http_req: HttpRequest,
    body: web::Json<BidRequest>,
) -> HttpResponse {
    handle_bid(state, Version::V24, http_req, body.into_inner()).await
}

async fn post_bid_v25(
    state: web::Data<IngressState>,
    http_req: HttpRequest,
    body: web::Json<BidRequest>,
) -> HttpResponse {
    handle_bid(state, Version::V25, http_req, body.into_inner()).await
}

async fn handle_bid(
    state: web::Data<IngressState>,
    version: Version,
    http_req: HttpRequest,
    mut req: BidRequest,
) -> HttpResponse {
    let Some(device) = req.device.as_ref() else {
        return HttpResponse::BadRequest().body("there is no device object");
    };
    let Some(ip) = device.ip.clone().filter(|ip| !ip.is_empty()) else {
        return HttpResponse::BadRequest().body("there is no device ip");
    };
    if req.imp.is_empty() {
        return HttpResponse::BadRequest().body("there are no impressions");
    }

    match state.geo.is_bad(&ip) {
        Err(GeoError::BadIpFormat(_)) => {
            return HttpResponse::BadRequest().body("bad ip format");
        }
        Ok(Some(category)) => {
            debug!(ip, %category, "ip refused by reputation");
            return HttpResponse::BadRequest().body(format!("ip refused: {category}"));
        }
        Ok(None) => {}
    }

    let country = match state.geo.country_of(&ip) {
        Err(GeoError::BadIpFormat(_)) => {
            return HttpResponse::BadRequest().body("bad ip format");
        }
        Ok(country) => country,
    };

    let global_id = Uuid::new_v4().to_string();

    // The raw opportunity as received, recorded before enrichment.
    let raw_request = serde_json::to_vec(&req).unwrap_or_else(|e| {
        warn!(global_id, "cannot serialize inbound bid request: {e}");
        Vec::new()
    });

    overwrite_country(&mut req, &country);

    let spp_endpoint = http_req.connection_info().host().to_string();
    let auction = AuctionRequest {
        version,
        bid_request: req,
        spp_endpoint,
        global_id: global_id.clone(),
    };

    let result = state
        .orchestrator
        .winner_bid(&auction, state.get_winner_bid_timeout)
        .await;

    background::spawn_auction_stats(
        state.stats.clone(),
        state.get_winner_bid_timeout,
        global_id.clone(),
        raw_request,
        country,
    );

    match result {
        Err(e) => {
            warn!(global_id, code = %e.code, "auction failed: {}", e.message);
            HttpResponse::build(e.code.http_status()).body("cannot run auction")
        }
        Ok(reply) => {
            if reply.bid_response.bid_count() == 0 {
                HttpResponse::NoContent().finish()
            } else {
                HttpResponse::Ok().json(reply.bid_response)
            }
        }
    }
}

/// Overwrites the device country with the looked-up ISO code, creating the
/// geo object when the SPP sent none.
fn overwrite_country(req: &mut BidRequest, country: &str) {
    if let Some(device) = req.device.as_mut() {
        match device.geo.as_mut() {
            Some(geo) => geo.country = Some(country.to_string()),
            None => {
                device.geo = Some(Geo {
                    country: Some(country.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ortb::Device;

    #[test]
    fn overwrite_country_replaces_spp_supplied_geo() {
        let mut req = BidRequest {
            device: Some(Device {
                ip: Some("1.2.3.4".into()),
                geo: Some(Geo {
                    country: Some("US".into()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        overwrite_country(&mut req, "CA");

        assert_eq!(
            req.device.unwrap().geo.unwrap().country.as_deref(),
            Some("CA")
        );
    }

    #[test]
    fn overwrite_country_creates_missing_geo() {
        let mut req = BidRequest {
            device: Some(Device {
                ip: Some("1.2.3.4".into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        overwrite_country(&mut req, "DE");

        assert_eq!(
            req.device.unwrap().geo.unwrap().country.as_deref(),
            Some("DE")
        );
    }
}
