use actix_web::{web, App, HttpServer};
use anyhow::Context;
use midway::config::{from_env, RouterConfig};
use midway::filter::{FilterManager, RuleFile, Side};
use midway::router::client::DspClient;
use midway::router::http::RouterState;
use midway::router::{self, Router};
use midway::runtime;
use midway::stats::kv::StatsStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Loads one side of the rules file. A missing or broken file is a
/// warning, not a startup failure: the router then runs with no policy on
/// that side.
fn load_rules(filters: &FilterManager, side: Side, path: &str) {
    let result = std::fs::read(path)
        .map_err(Into::into)
        .and_then(|data| RuleFile::parse(&data))
        .and_then(|file| filters.install(side, &file));

    match result {
        Ok(rules) => info!(path, ?side, rules, "filter rules loaded"),
        Err(e) => warn!(path, ?side, "filter rules not loaded: {e}"),
    }
}

#[actix_web::main]
async fn main() -> Result<(), anyhow::Error> {
    let cfg: RouterConfig = from_env().context("cannot load dsp-router config")?;
    runtime::init_logging(&cfg.log_level, cfg.log_json);

    let filters = Arc::new(FilterManager::new());
    load_rules(&filters, Side::Dsp, &cfg.dsp_rules_config_path);
    load_rules(&filters, Side::Spp, &cfg.spp_rules_config_path);

    let stats = StatsStore::connect(&cfg.redis_url, cfg.stats_ttl).await?;
    let client = DspClient::new()?;

    let router = Router::new(
        Arc::clone(&filters),
        client,
        cfg.dsp_endpoints_v_2_4.clone(),
        cfg.dsp_endpoints_v_2_5.clone(),
        cfg.max_parallel,
        cfg.dsp_timeout,
    );

    let state = web::Data::new(RouterState {
        router,
        filters,
        stats,
        stats_write_budget: cfg.stats_write_timeout,
        default_budget: cfg.bid_responses_timeout,
        dsp_rules_path: PathBuf::from(&cfg.dsp_rules_config_path),
        spp_rules_path: PathBuf::from(&cfg.spp_rules_config_path),
    });

    info!(
        host = %cfg.host,
        port = cfg.port,
        dsps_v24 = cfg.dsp_endpoints_v_2_4.len(),
        dsps_v25 = cfg.dsp_endpoints_v_2_5.len(),
        "dsp router listening"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(router::http::configure)
            .route("/health", web::get().to(runtime::health))
    })
    .bind((cfg.host.clone(), cfg.port))
    .with_context(|| format!("cannot bind {}:{}", cfg.host, cfg.port))?
    .run()
    .await?;

    info!("dsp router stopped");
    Ok(())
}
