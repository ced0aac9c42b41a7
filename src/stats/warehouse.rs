use super::StatisticsRecord;
use anyhow::Context;
use clickhouse::Row;
use serde::Serialize;
use tracing::debug;

/// One warehouse row. Column names and order match the statistics table;
/// `uuid` is left to its server-side default so replayed records stay
/// distinguishable downstream.
#[derive(Row, Serialize)]
struct StatsRow<'a> {
    bid_request: &'a str,
    geo_column: &'a str,
    bid_responses: &'a str,
    bid_response_winner: &'a str,
    bid_response_winner_by_dsp_price: &'a str,
    success: &'a str,
}

impl<'a> From<&'a StatisticsRecord> for StatsRow<'a> {
    fn from(record: &'a StatisticsRecord) -> Self {
        StatsRow {
            bid_request: &record.bid_request,
            geo_column: &record.geo,
            bid_responses: &record.bid_responses,
            bid_response_winner: &record.bid_response_winner,
            bid_response_winner_by_dsp_price: &record.bid_response_winner_by_dsp_price,
            success: &record.result,
        }
    }
}

pub struct Warehouse {
    client: clickhouse::Client,
    table: String,
}

impl Warehouse {
    pub fn connect(
        url: &str,
        database: &str,
        username: &str,
        password: &str,
        table: &str,
    ) -> Self {
        let client = clickhouse::Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(username)
            .with_password(password);

        Warehouse {
            client,
            table: table.to_string(),
        }
    }

    pub async fn ping(&self) -> Result<(), anyhow::Error> {
        self.client
            .query("SELECT 1")
            .execute()
            .await
            .context("warehouse did not answer")
    }

    /// Creates the statistics table when absent.
    pub async fn ensure_table(&self) -> Result<(), anyhow::Error> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                 uuid String DEFAULT generateUUIDv4(),\
                 bid_request String,\
                 geo_column String,\
                 bid_responses String,\
                 bid_response_winner String,\
                 bid_response_winner_by_dsp_price String,\
                 success String\
             ) ENGINE = MergeTree()\
             ORDER BY uuid\
             SETTINGS index_granularity = 8192",
            self.table
        );

        self.client
            .query(&ddl)
            .execute()
            .await
            .with_context(|| format!("cannot ensure table {}", self.table))
    }

    /// Inserts the whole batch through one INSERT, finalized on `end()`:
    /// either every row lands or none does, so a failed batch can be
    /// redelivered without leaving a partial prefix behind. Returns how
    /// many rows were written.
    pub async fn insert_batch(
        &self,
        records: &[StatisticsRecord],
    ) -> Result<usize, anyhow::Error> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut insert = self
            .client
            .insert(&self.table)
            .with_context(|| format!("cannot open insert into {}", self.table))?;

        for record in records {
            insert
                .write(&StatsRow::from(record))
                .await
                .with_context(|| format!("cannot buffer stats row for {}", self.table))?;
        }

        insert
            .end()
            .await
            .with_context(|| format!("cannot commit stats batch into {}", self.table))?;

        debug!(inserted = records.len(), "stats batch written to warehouse");
        Ok(records.len())
    }
}
