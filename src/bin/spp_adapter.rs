use actix_web::{web, App, HttpServer};
use anyhow::Context;
use midway::config::{from_env, SppAdapterConfig};
use midway::geo::GeoService;
use midway::ingress::{self, IngressState};
use midway::rpc::client::OrchestratorClient;
use midway::runtime;
use midway::stats::kv::StatsStore;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[actix_web::main]
async fn main() -> Result<(), anyhow::Error> {
    let cfg: SppAdapterConfig = from_env().context("cannot load spp-adapter config")?;
    runtime::init_logging(&cfg.log_level, cfg.log_json);

    let geo = Arc::new(GeoService::load(
        Path::new(&cfg.geo_country_db_path),
        Path::new(&cfg.ip_risk_db_path),
    )?);
    let stats = StatsStore::connect(&cfg.redis_url, cfg.stats_ttl).await?;
    let orchestrator = OrchestratorClient::connect(cfg.uri_of_orchestrator.clone())?;
    let notice_client = IngressState::notice_client()?;

    let state = web::Data::new(IngressState {
        orchestrator,
        geo,
        stats,
        notice_client,
        get_winner_bid_timeout: cfg.get_winner_bid_timeout,
        nurl_timeout: cfg.nurl_timeout,
        burl_timeout: cfg.burl_timeout,
    });

    info!(host = %cfg.host, port = cfg.port, "spp adapter listening");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(ingress::configure)
    })
    .bind((cfg.host.clone(), cfg.port))
    .with_context(|| format!("cannot bind {}:{}", cfg.host, cfg.port))?
    .run()
    .await?;

    info!("spp adapter stopped");
    Ok(())
}
