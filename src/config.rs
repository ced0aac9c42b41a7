use config::{Config, Environment};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub fn from_env<T: DeserializeOwned>() -> Result<T, anyhow::Error> {
    let source = Environment::default()
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("dsp_endpoints_v_2_4")
        .with_list_parse_key("dsp_endpoints_v_2_5");

    let cfg = Config::builder().add_source(source).build()?;
    Ok(cfg.try_deserialize()?)
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_auction_timeout() -> Duration {
    Duration::from_millis(300)
}

fn default_fanout_timeout() -> Duration {
    Duration::from_millis(200)
}

fn default_dsp_timeout() -> Duration {
    Duration::from_millis(150)
}

fn default_engine_timeout() -> Duration {
    Duration::from_millis(50)
}

fn default_notice_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_stats_write_timeout() -> Duration {
    Duration::from_secs(1)
}

/// Keys that never see a billing notice still age out of the KV store.
fn default_stats_ttl() -> Duration {
    Duration::from_secs(6 * 60 * 60)
}

fn default_max_parallel() -> usize {
    128
}

fn default_profit_percent() -> f64 {
    0.2
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(1)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SppAdapterConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub uri_of_orchestrator: String,
    #[serde(with = "humantime_serde", default = "default_auction_timeout")]
    pub get_winner_bid_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_notice_timeout")]
    pub nurl_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_notice_timeout")]
    pub burl_timeout: Duration,
    pub geo_country_db_path: String,
    pub ip_risk_db_path: String,
    pub redis_url: String,
    #[serde(with = "humantime_serde", default = "default_stats_ttl")]
    pub stats_ttl: Duration,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub uri_of_dsp_router: String,
    pub uri_of_bid_engine: String,
    #[serde(with = "humantime_serde", default = "default_fanout_timeout")]
    pub get_bids_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_engine_timeout")]
    pub select_winner_timeout: Duration,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub dsp_endpoints_v_2_4: Vec<String>,
    #[serde(default)]
    pub dsp_endpoints_v_2_5: Vec<String>,
    pub dsp_rules_config_path: String,
    pub spp_rules_config_path: String,
    #[serde(with = "humantime_serde", default = "default_fanout_timeout")]
    pub bid_responses_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_dsp_timeout")]
    pub dsp_timeout: Duration,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    pub redis_url: String,
    #[serde(with = "humantime_serde", default = "default_stats_ttl")]
    pub stats_ttl: Duration,
    #[serde(with = "humantime_serde", default = "default_stats_write_timeout")]
    pub stats_write_timeout: Duration,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BidEngineConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_profit_percent")]
    pub profit_percent: f64,
    /// Public hostname the wrapped notice URLs point at.
    pub system_hostname: String,
    pub redis_url: String,
    #[serde(with = "humantime_serde", default = "default_stats_ttl")]
    pub stats_ttl: Duration,
    #[serde(with = "humantime_serde", default = "default_stats_write_timeout")]
    pub stats_write_timeout: Duration,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsLoaderConfig {
    pub redis_url: String,
    #[serde(with = "humantime_serde", default = "default_stats_ttl")]
    pub stats_ttl: Duration,
    pub queue_broker: String,
    pub queue_topic: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(with = "humantime_serde", default = "default_flush_interval")]
    pub flush_interval: Duration,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseLoaderConfig {
    pub queue_broker: String,
    pub queue_topic: String,
    pub group_id: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(with = "humantime_serde", default = "default_fetch_timeout")]
    pub fetch_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_flush_interval")]
    pub idle_backoff: Duration,
    pub clickhouse_url: String,
    pub clickhouse_db: String,
    #[serde(default)]
    pub clickhouse_username: String,
    #[serde(default)]
    pub clickhouse_password: String,
    pub clickhouse_table: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let cfg: RouterConfig = serde_json::from_value(serde_json::json!({
            "dsp_rules_config_path": "/etc/midway/dsp.json",
            "spp_rules_config_path": "/etc/midway/spp.json",
            "redis_url": "redis://127.0.0.1:6379"
        }))
        .unwrap();

        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_parallel, 128);
        assert!(cfg.dsp_endpoints_v_2_4.is_empty());
        assert_eq!(cfg.dsp_timeout, Duration::from_millis(150));
    }

    #[test]
    fn durations_parse_from_humantime_strings() {
        let cfg: OrchestratorConfig = serde_json::from_value(serde_json::json!({
            "uri_of_dsp_router": "http://127.0.0.1:8081",
            "uri_of_bid_engine": "http://127.0.0.1:8082",
            "get_bids_timeout": "20ms",
            "select_winner_timeout": "50ms"
        }))
        .unwrap();

        assert_eq!(cfg.get_bids_timeout, Duration::from_millis(20));
        assert_eq!(cfg.select_winner_timeout, Duration::from_millis(50));
    }
}
