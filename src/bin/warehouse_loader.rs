use anyhow::Context;
use midway::config::{from_env, WarehouseLoaderConfig};
use midway::runtime;
use midway::stats::queue::{self, StatsConsumer, StatsQueue};
use midway::stats::warehouse::Warehouse;
use midway::stats::StatisticsRecord;
use tracing::{error, info, warn};

/// One consume pass: hysteresis check, batch fetch, decode, insert,
/// then ack. Acks only go out after the whole batch is in the warehouse,
/// so a failed insert redelivers the batch (at-least-once).
async fn process_pass(
    cfg: &WarehouseLoaderConfig,
    queue: &StatsQueue,
    consumer: &StatsConsumer,
    warehouse: &Warehouse,
) -> Result<usize, anyhow::Error> {
    let pending = queue.pending_messages().await?;
    if pending < cfg.batch_size as u64 {
        return Ok(0);
    }

    let messages = consumer.fetch(cfg.batch_size, cfg.fetch_timeout).await?;
    if messages.is_empty() {
        return Ok(0);
    }

    let mut records = Vec::with_capacity(messages.len());
    for message in &messages {
        match serde_json::from_slice::<StatisticsRecord>(&message.payload) {
            Ok(record) if record.has_data() => records.push(record),
            Ok(_) => {}
            Err(e) => warn!("cannot parse queue message, skipping: {e}"),
        }
    }

    let inserted = warehouse.insert_batch(&records).await?;

    for message in &messages {
        queue::ack(message).await?;
    }

    Ok(inserted)
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cfg: WarehouseLoaderConfig = from_env().context("cannot load warehouse-loader config")?;
    runtime::init_logging(&cfg.log_level, cfg.log_json);

    let queue = StatsQueue::connect(&cfg.queue_broker, &cfg.queue_topic).await?;
    queue.ensure_topic().await?;
    let consumer = queue.consumer(&cfg.group_id).await?;

    let warehouse = Warehouse::connect(
        &cfg.clickhouse_url,
        &cfg.clickhouse_db,
        &cfg.clickhouse_username,
        &cfg.clickhouse_password,
        &cfg.clickhouse_table,
    );
    warehouse.ping().await?;
    warehouse.ensure_table().await?;

    info!(
        topic = %cfg.queue_topic,
        group = %cfg.group_id,
        table = %cfg.clickhouse_table,
        "warehouse loader started"
    );

    let shutdown = runtime::shutdown_signal();
    tokio::pin!(shutdown);

    let mut total_inserted = 0usize;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(total_inserted, "warehouse loader stopping");
                break;
            }
            result = process_pass(&cfg, &queue, &consumer, &warehouse) => {
                match result {
                    Ok(0) => tokio::time::sleep(cfg.idle_backoff).await,
                    Ok(inserted) => {
                        total_inserted += inserted;
                        info!(inserted, total_inserted, "stats rows loaded");
                    }
                    Err(e) => {
                        error!("consume pass failed: {e}");
                        tokio::time::sleep(cfg.idle_backoff).await;
                    }
                }
            }
        }
    }

    Ok(())
}
