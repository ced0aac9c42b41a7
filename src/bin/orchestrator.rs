use actix_web::{web, App, HttpServer};
use anyhow::Context;
use midway::config::{from_env, OrchestratorConfig};
use midway::orchestrator::{self, Orchestrator};
use midway::rpc::client::{EngineClient, RouterClient};
use midway::runtime;
use tracing::info;

#[actix_web::main]
async fn main() -> Result<(), anyhow::Error> {
    let cfg: OrchestratorConfig = from_env().context("cannot load orchestrator config")?;
    runtime::init_logging(&cfg.log_level, cfg.log_json);

    let router = RouterClient::connect(cfg.uri_of_dsp_router.clone())?;
    let engine = EngineClient::connect(cfg.uri_of_bid_engine.clone())?;

    let state = web::Data::new(Orchestrator::new(
        router,
        engine,
        cfg.get_bids_timeout,
        cfg.select_winner_timeout,
    ));

    info!(host = %cfg.host, port = cfg.port, "orchestrator listening");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(orchestrator::http::configure)
            .route("/health", web::get().to(runtime::health))
    })
    .bind((cfg.host.clone(), cfg.port))
    .with_context(|| format!("cannot bind {}:{}", cfg.host, cfg.port))?
    .run()
    .await?;

    info!("orchestrator stopped");
    Ok(())
}
