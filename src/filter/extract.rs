use super::value::{Field, FieldValue};
use crate::ortb::{BidRequest, BidResponse, Version};

pub fn request_value<'a>(version: Version, req: &'a BidRequest, field: Field) -> FieldValue<'a> {
    match field {
        Field::BidFloor => FieldValue::Float(req.imp.first().map(|i| i.bidfloor).unwrap_or(0.0)),
        Field::BannerW => FieldValue::Int(
            req.imp
                .iter()
                .find_map(|i| i.banner.as_ref().and_then(|b| b.w))
                .unwrap_or(0),
        ),
        Field::BannerH => FieldValue::Int(
            req.imp
                .iter()
                .find_map(|i| i.banner.as_ref().and_then(|b| b.h))
                .unwrap_or(0),
        ),
        Field::DeviceIp => FieldValue::Str(
            req.device
                .as_ref()
                .and_then(|d| d.ip.as_deref())
                .unwrap_or(""),
        ),
        Field::DeviceCountry => FieldValue::Str(
            req.device
                .as_ref()
                .and_then(|d| d.geo.as_ref())
                .and_then(|g| g.country.as_deref())
                .unwrap_or(""),
        ),
        // The 2.5 dialect never carries the app/site distribution objects.
        Field::AppId => match version {
            Version::V24 => FieldValue::Str(
                req.app
                    .as_ref()
                    .and_then(|a| a.id.as_deref())
                    .unwrap_or(""),
            ),
            Version::V25 => FieldValue::Str(""),
        },
        Field::SiteId => match version {
            Version::V24 => FieldValue::Str(
                req.site
                    .as_ref()
                    .and_then(|s| s.id.as_deref())
                    .unwrap_or(""),
            ),
            Version::V25 => FieldValue::Str(""),
        },
        _ => FieldValue::Absent,
    }
}

pub fn response_value<'a>(resp: &'a BidResponse, field: Field) -> FieldValue<'a> {
    match field {
        Field::BidPrice => FieldValue::Float(resp.bids().next().map(|b| b.price).unwrap_or(0.0)),
        Field::BidId => FieldValue::Str(resp.bids().next().map(|b| b.id.as_str()).unwrap_or("")),
        Field::BidImpid => {
            FieldValue::Str(resp.bids().next().map(|b| b.impid.as_str()).unwrap_or(""))
        }
        Field::BidAdid => {
            FieldValue::Str(resp.bids().find_map(|b| b.adid.as_deref()).unwrap_or(""))
        }
        Field::BidNurl => {
            FieldValue::Str(resp.bids().find_map(|b| b.nurl.as_deref()).unwrap_or(""))
        }
        Field::BidBurl => {
            FieldValue::Str(resp.bids().find_map(|b| b.burl.as_deref()).unwrap_or(""))
        }
        Field::SeatBidSeat => FieldValue::Str(
            resp.seatbid
                .iter()
                .find_map(|s| s.seat.as_deref())
                .unwrap_or(""),
        ),
        Field::BidArray => {
            if resp.bids().next().is_some() {
                FieldValue::Str("exists")
            } else {
                FieldValue::Str("")
            }
        }
        _ => FieldValue::Absent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ortb::{App, Banner, Bid, Device, Geo, Imp, SeatBid, Site};

    fn sample_request() -> BidRequest {
        BidRequest {
            id: "r1".into(),
            imp: vec![Imp {
                id: "1".into(),
                bidfloor: 0.75,
                banner: Some(Banner {
                    w: Some(320),
                    h: Some(50),
                }),
                ..Default::default()
            }],
            site: Some(Site {
                id: Some("site-9".into()),
            }),
            app: Some(App {
                id: Some("app-3".into()),
            }),
            device: Some(Device {
                ip: Some("1.2.3.4".into()),
                geo: Some(Geo {
                    country: Some("US".into()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn request_fields_project_first_occurrence() {
        let req = sample_request();

        assert_eq!(
            request_value(Version::V24, &req, Field::BidFloor),
            FieldValue::Float(0.75)
        );
        assert_eq!(
            request_value(Version::V24, &req, Field::BannerW),
            FieldValue::Int(320)
        );
        assert_eq!(
            request_value(Version::V24, &req, Field::DeviceCountry),
            FieldValue::Str("US")
        );
        assert_eq!(
            request_value(Version::V24, &req, Field::AppId),
            FieldValue::Str("app-3")
        );
    }

    #[test]
    fn absent_paths_extract_zero_values() {
        let req = BidRequest::default();

        assert_eq!(
            request_value(Version::V24, &req, Field::BidFloor),
            FieldValue::Float(0.0)
        );
        assert_eq!(
            request_value(Version::V24, &req, Field::BannerW),
            FieldValue::Int(0)
        );
        assert_eq!(
            request_value(Version::V24, &req, Field::DeviceIp),
            FieldValue::Str("")
        );
    }

    #[test]
    fn v25_never_projects_distribution_objects() {
        let req = sample_request();

        assert_eq!(
            request_value(Version::V25, &req, Field::AppId),
            FieldValue::Str("")
        );
        assert_eq!(
            request_value(Version::V25, &req, Field::SiteId),
            FieldValue::Str("")
        );
    }

    #[test]
    fn response_only_fields_are_absent_on_requests() {
        let req = sample_request();

        assert_eq!(
            request_value(Version::V24, &req, Field::BidPrice),
            FieldValue::Absent
        );
    }

    #[test]
    fn response_fields_project_first_bid() {
        let resp = BidResponse {
            id: "r1".into(),
            seatbid: vec![SeatBid {
                seat: Some("dsp-a".into()),
                bid: vec![Bid {
                    id: "b1".into(),
                    impid: "1".into(),
                    price: 2.5,
                    nurl: Some("http://dsp/win".into()),
                    ..Default::default()
                }],
            }],
        };

        assert_eq!(response_value(&resp, Field::BidPrice), FieldValue::Float(2.5));
        assert_eq!(response_value(&resp, Field::BidId), FieldValue::Str("b1"));
        assert_eq!(
            response_value(&resp, Field::BidNurl),
            FieldValue::Str("http://dsp/win")
        );
        assert_eq!(response_value(&resp, Field::BidBurl), FieldValue::Str(""));
        assert_eq!(
            response_value(&resp, Field::SeatBidSeat),
            FieldValue::Str("dsp-a")
        );
        assert_eq!(
            response_value(&resp, Field::BidArray),
            FieldValue::Str("exists")
        );
    }
}
