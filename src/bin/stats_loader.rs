use anyhow::Context;
use midway::config::{from_env, StatsLoaderConfig};
use midway::runtime;
use midway::stats::drain;
use midway::stats::kv::StatsStore;
use midway::stats::queue::StatsQueue;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cfg: StatsLoaderConfig = from_env().context("cannot load stats-loader config")?;
    runtime::init_logging(&cfg.log_level, cfg.log_json);

    let store = StatsStore::connect(&cfg.redis_url, cfg.stats_ttl).await?;
    let queue = StatsQueue::connect(&cfg.queue_broker, &cfg.queue_topic).await?;
    queue.ensure_topic().await?;

    info!(
        topic = %cfg.queue_topic,
        batch_size = cfg.batch_size,
        interval = ?cfg.flush_interval,
        "stats loader started"
    );

    let mut ticker = tokio::time::interval(cfg.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = runtime::shutdown_signal();
    tokio::pin!(shutdown);

    let mut total_drained = 0usize;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(total_drained, "stats loader stopping");
                break;
            }
            _ = ticker.tick() => {
                match drain::process_batch(&store, &queue, cfg.batch_size).await {
                    Ok(drained) => total_drained += drained,
                    Err(e) => error!("drain pass failed: {e}"),
                }
            }
        }
    }

    Ok(())
}
