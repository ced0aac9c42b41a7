use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Projection names a rule may reference. Request-side rules project the
/// BidRequest, response-side rules project the BidResponse; a rule that
/// references a field the evaluated payload does not carry never matches.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum Field {
    #[serde(rename = "bidfloor")]
    #[strum(serialize = "bidfloor")]
    BidFloor,
    #[serde(rename = "device.geo.country")]
    #[strum(serialize = "device.geo.country")]
    DeviceCountry,
    #[serde(rename = "device.ip")]
    #[strum(serialize = "device.ip")]
    DeviceIp,
    #[serde(rename = "app.id")]
    #[strum(serialize = "app.id")]
    AppId,
    #[serde(rename = "site.id")]
    #[strum(serialize = "site.id")]
    SiteId,
    #[serde(rename = "banner.w")]
    #[strum(serialize = "banner.w")]
    BannerW,
    #[serde(rename = "banner.h")]
    #[strum(serialize = "banner.h")]
    BannerH,
    #[serde(rename = "bid.price")]
    #[strum(serialize = "bid.price")]
    BidPrice,
    #[serde(rename = "bid.id")]
    #[strum(serialize = "bid.id")]
    BidId,
    #[serde(rename = "bid.adid")]
    #[strum(serialize = "bid.adid")]
    BidAdid,
    #[serde(rename = "bid.impid")]
    #[strum(serialize = "bid.impid")]
    BidImpid,
    #[serde(rename = "bid.nurl")]
    #[strum(serialize = "bid.nurl")]
    BidNurl,
    #[serde(rename = "bid.burl")]
    #[strum(serialize = "bid.burl")]
    BidBurl,
    #[serde(rename = "seatbid.seat")]
    #[strum(serialize = "seatbid.seat")]
    SeatBidSeat,
    #[serde(rename = "bid.array")]
    #[strum(serialize = "bid.array")]
    BidArray,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Condition {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Between,
    NotBetween,
    Exists,
}

impl Condition {
    /// Range conditions carry a two element value.
    pub fn is_range(self) -> bool {
        matches!(self, Condition::Between | Condition::NotBetween)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValueType {
    Int,
    Float,
    String,
}

/// A value projected out of a request or response, tagged with its type.
/// Absent paths extract as the zero value of the declared type; fields the
/// payload kind cannot carry at all extract as [`FieldValue::Absent`] and
/// fail every comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Int(i64),
    Float(f64),
    Str(&'a str),
    Absent,
}
