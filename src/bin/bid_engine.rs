use actix_web::{web, App, HttpServer};
use anyhow::{bail, Context};
use midway::config::{from_env, BidEngineConfig};
use midway::engine::http::EngineState;
use midway::engine;
use midway::runtime;
use midway::stats::kv::StatsStore;
use tracing::info;

#[actix_web::main]
async fn main() -> Result<(), anyhow::Error> {
    let cfg: BidEngineConfig = from_env().context("cannot load bid-engine config")?;
    runtime::init_logging(&cfg.log_level, cfg.log_json);

    if !(0.0..1.0).contains(&cfg.profit_percent) {
        bail!(
            "profit_percent must be in [0, 1), got {}",
            cfg.profit_percent
        );
    }
    if cfg.system_hostname.is_empty() {
        bail!("system_hostname is required for notice url wrapping");
    }

    let stats = StatsStore::connect(&cfg.redis_url, cfg.stats_ttl).await?;

    let state = web::Data::new(EngineState {
        profit_percent: cfg.profit_percent,
        hostname: cfg.system_hostname.clone(),
        stats,
        stats_write_budget: cfg.stats_write_timeout,
    });

    info!(
        host = %cfg.host,
        port = cfg.port,
        margin = cfg.profit_percent,
        "bid engine listening"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(engine::http::configure)
            .route("/health", web::get().to(runtime::health))
    })
    .bind((cfg.host.clone(), cfg.port))
    .with_context(|| format!("cannot bind {}:{}", cfg.host, cfg.port))?
    .run()
    .await?;

    info!("bid engine stopped");
    Ok(())
}
