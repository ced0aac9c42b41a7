use super::{columns, key_pattern, stat_key, SUCCESS};
use anyhow::Context;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct StatsStore {
    conn: ConnectionManager,
    ttl: Duration,
}

impl StatsStore {
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, anyhow::Error> {
        let client = redis::Client::open(url).context("invalid kv url")?;
        let mut conn = client
            .get_connection_manager()
            .await
            .context("cannot connect to kv store")?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("kv store did not answer ping")?;

        Ok(StatsStore { conn, ttl })
    }

    /// Writes one column of the auction hash.
    pub async fn write_column(
        &self,
        global_id: &str,
        column: &str,
        data: impl redis::ToRedisArgs + Send + Sync,
    ) -> Result<(), anyhow::Error> {
        let key = stat_key(global_id);
        let mut conn = self.conn.clone();

        let _: () = conn
            .hset(&key, column, data)
            .await
            .with_context(|| format!("cannot write {column} for {key}"))?;

        if !self.ttl.is_zero() {
            let _: () = conn
                .expire(&key, self.ttl.as_secs() as i64)
                .await
                .with_context(|| format!("cannot refresh ttl for {key}"))?;
        }

        Ok(())
    }

    /// Marks the auction billable. Idempotent: repeated billing notices
    /// land on the same value.
    pub async fn mark_success(&self, global_id: &str) -> Result<(), anyhow::Error> {
        self.write_column(global_id, columns::RESULT, SUCCESS).await
    }

    /// All auction hash keys currently present.
    pub async fn stat_keys(&self) -> Result<Vec<String>, anyhow::Error> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(key_pattern())
            .await
            .context("cannot list stats keys")?;
        Ok(keys)
    }

    /// Pipelined HGETALL over a batch of keys, in key order.
    pub async fn read_hashes(
        &self,
        keys: &[String],
    ) -> Result<Vec<HashMap<String, String>>, anyhow::Error> {
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.hgetall(key);
        }

        let mut conn = self.conn.clone();
        let rows: Vec<HashMap<String, String>> = pipe
            .query_async(&mut conn)
            .await
            .context("cannot read stats hashes")?;
        Ok(rows)
    }

    /// Pipelined HDEL of the consumed fields. The keys themselves stay:
    /// columns written after the drain selection must survive for the next
    /// pass.
    pub async fn delete_fields(
        &self,
        consumed: &HashMap<String, Vec<&'static str>>,
    ) -> Result<(), anyhow::Error> {
        if consumed.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for (key, fields) in consumed {
            if !fields.is_empty() {
                pipe.hdel(key, fields.as_slice());
            }
        }

        let mut conn = self.conn.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .context("cannot delete consumed stats fields")?;

        debug!(keys = consumed.len(), "consumed stats fields deleted");

        Ok(())
    }
}
