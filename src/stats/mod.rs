pub mod drain;
pub mod kv;
pub mod queue;
pub mod warehouse;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

pub mod columns {
    pub const BID_REQUEST: &str = "BID_REQUEST";
    pub const GEO: &str = "GEO";
    pub const BID_RESPONSES: &str = "BID_RESPONSES";
    pub const BID_RESPONSE_WINNER: &str = "BID_RESPONSE_WINNER";
    pub const BID_RESPONSE_WINNER_BY_DSP_PRICE: &str = "BID_RESPONSE_WINNER_BY_DSP_PRICE";
    pub const RESULT: &str = "RESULT";
}

pub const SUCCESS: &str = "SUCCESS";
pub const UNSUCCESS: &str = "UNSUCCESS";

const KEY_PREFIX: &str = "stats:";

/// KV key for one auction's hash.
pub fn stat_key(global_id: &str) -> String {
    format!("{KEY_PREFIX}{global_id}")
}

pub fn key_pattern() -> String {
    format!("{KEY_PREFIX}*")
}

/// One auction's drained statistics, serialized onto the queue and into
/// the warehouse. Field names match the KV column layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
pub struct StatisticsRecord {
    #[serde(rename = "BID_REQUEST", default)]
    pub bid_request: String,
    #[serde(rename = "GEO_COLUMN", default)]
    pub geo: String,
    #[serde(rename = "BID_RESPONSES", default)]
    pub bid_responses: String,
    #[serde(rename = "BID_RESPONSE_WINNER", default)]
    pub bid_response_winner: String,
    #[serde(rename = "BID_RESPONSE_WINNER_BY_DSP_PRICE", default)]
    pub bid_response_winner_by_dsp_price: String,
    #[serde(rename = "SUCCESS", default)]
    pub result: String,
}

impl StatisticsRecord {
    pub fn has_data(&self) -> bool {
        !self.bid_request.is_empty()
            || !self.geo.is_empty()
            || !self.bid_responses.is_empty()
            || !self.bid_response_winner.is_empty()
            || !self.bid_response_winner_by_dsp_price.is_empty()
            || !self.result.is_empty()
    }
}
