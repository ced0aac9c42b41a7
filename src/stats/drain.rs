use super::kv::StatsStore;
use super::queue::StatsQueue;
use super::{columns, StatisticsRecord};
use anyhow::Context;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Builds a record from one hash row, returning the fields that were
/// present and are therefore consumed by this drain pass.
pub fn build_record(row: &HashMap<String, String>) -> (StatisticsRecord, Vec<&'static str>) {
    let mut record = StatisticsRecord::default();
    let mut consumed = Vec::new();

    if let Some(value) = row.get(columns::BID_REQUEST) {
        record.bid_request = value.clone();
        consumed.push(columns::BID_REQUEST);
    }
    if let Some(value) = row.get(columns::GEO) {
        record.geo = value.clone();
        consumed.push(columns::GEO);
    }
    if let Some(value) = row.get(columns::BID_RESPONSES) {
        record.bid_responses = value.clone();
        consumed.push(columns::BID_RESPONSES);
    }
    if let Some(value) = row.get(columns::BID_RESPONSE_WINNER) {
        record.bid_response_winner = value.clone();
        consumed.push(columns::BID_RESPONSE_WINNER);
    }
    if let Some(value) = row.get(columns::BID_RESPONSE_WINNER_BY_DSP_PRICE) {
        record.bid_response_winner_by_dsp_price = value.clone();
        consumed.push(columns::BID_RESPONSE_WINNER_BY_DSP_PRICE);
    }
    if let Some(value) = row.get(columns::RESULT) {
        record.result = value.clone();
        consumed.push(columns::RESULT);
    }

    (record, consumed)
}

/// One drain pass. Skips entirely while fewer than two batches are
/// waiting, so a trickle of auctions is not shipped as micro-batches.
/// Returns how many records were published.
pub async fn process_batch(
    store: &StatsStore,
    queue: &StatsQueue,
    batch_size: usize,
) -> Result<usize, anyhow::Error> {
    let keys = store.stat_keys().await?;
    if keys.len() < batch_size * 2 {
        debug!(waiting = keys.len(), batch_size, "not enough stats records, skipping drain");
        return Ok(0);
    }

    let selected = &keys[..batch_size];
    let rows = store.read_hashes(selected).await?;

    let mut consumed: HashMap<String, Vec<&'static str>> = HashMap::new();
    let mut payloads: Vec<Vec<u8>> = Vec::with_capacity(rows.len());

    for (key, row) in selected.iter().zip(rows.iter()) {
        let (record, fields) = build_record(row);

        if record.has_data() {
            payloads.push(serde_json::to_vec(&record).context("cannot serialize stats record")?);
        }
        if !fields.is_empty() {
            consumed.insert(key.clone(), fields);
        }
    }

    let mut published = 0usize;
    if !payloads.is_empty() {
        published = queue.publish_batch(payloads).await?;
        info!(published, "stats batch published");
    }

    // Consumed fields go away; the keys stay for columns that land later.
    if let Err(e) = store.delete_fields(&consumed).await {
        warn!("cannot delete consumed stats fields: {e}");
    }

    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{SUCCESS, UNSUCCESS};

    #[test]
    fn build_record_consumes_present_fields_only() {
        let mut row = HashMap::new();
        row.insert(columns::BID_REQUEST.to_string(), "{}".to_string());
        row.insert(columns::GEO.to_string(), "US".to_string());
        row.insert(columns::RESULT.to_string(), UNSUCCESS.to_string());

        let (record, consumed) = build_record(&row);

        assert_eq!(record.bid_request, "{}");
        assert_eq!(record.geo, "US");
        assert_eq!(record.result, UNSUCCESS);
        assert!(record.bid_responses.is_empty());

        assert_eq!(
            consumed,
            vec![columns::BID_REQUEST, columns::GEO, columns::RESULT]
        );
    }

    #[test]
    fn empty_row_builds_an_empty_record() {
        let (record, consumed) = build_record(&HashMap::new());

        assert!(!record.has_data());
        assert!(consumed.is_empty());
    }

    #[test]
    fn present_but_empty_fields_are_still_consumed() {
        let mut row = HashMap::new();
        row.insert(columns::GEO.to_string(), String::new());

        let (record, consumed) = build_record(&row);

        assert!(!record.has_data());
        assert_eq!(consumed, vec![columns::GEO]);
    }

    #[test]
    fn drained_record_round_trips_through_json() {
        let mut row = HashMap::new();
        row.insert(columns::BID_RESPONSE_WINNER.to_string(), "{\"id\":\"r\"}".to_string());
        row.insert(columns::RESULT.to_string(), SUCCESS.to_string());

        let (record, _) = build_record(&row);
        let bytes = serde_json::to_vec(&record).unwrap();
        let decoded: StatisticsRecord = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded, record);
    }
}
