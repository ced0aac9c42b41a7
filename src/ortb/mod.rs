use serde::{Deserialize, Serialize};
use strum::Display;

/// Sentinel floor value some SPPs send for "no floor".
pub const NEGATIVE_BIDFLOOR: f64 = -1.0;

/// ORTB dialect of an inbound opportunity. DSP endpoint lists are
/// partitioned by version; a 2.4 request is never routed to a 2.5 endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Version {
    #[serde(rename = "v2.4")]
    #[strum(serialize = "v2.4")]
    V24,
    #[serde(rename = "v2.5")]
    #[strum(serialize = "v2.5")]
    V25,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BidRequest {
    pub id: String,
    /// Auction type. First price unless the SPP says otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<i32>,
    pub imp: Vec<Imp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<Site>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<App>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmax: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Imp {
    pub id: String,
    pub bidfloor: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<Banner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<Native>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Banner {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Native {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Site {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct App {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ua: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<Geo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Geo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BidResponse {
    pub id: String,
    pub seatbid: Vec<SeatBid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeatBid {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat: Option<String>,
    pub bid: Vec<Bid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Bid {
    pub id: String,
    pub impid: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nurl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adm: Option<String>,
}

impl BidRequest {
    /// Normalized floor for the impression with the given id. Absent
    /// impressions and the `-1` sentinel both resolve to zero.
    pub fn floor_for(&self, impid: &str) -> f64 {
        let floor = self
            .imp
            .iter()
            .find(|imp| imp.id == impid)
            .map(|imp| imp.bidfloor)
            .unwrap_or(0.0);

        if floor == NEGATIVE_BIDFLOOR { 0.0 } else { floor }
    }
}

impl BidResponse {
    /// A well formed no-bid answer echoing the request id.
    pub fn empty(request_id: &str) -> Self {
        BidResponse {
            id: request_id.to_string(),
            seatbid: vec![SeatBid::default()],
        }
    }

    pub fn bid_count(&self) -> usize {
        self.seatbid.iter().map(|seat| seat.bid.len()).sum()
    }

    pub fn bids(&self) -> impl Iterator<Item = &Bid> {
        self.seatbid.iter().flat_map(|seat| seat.bid.iter())
    }
}
